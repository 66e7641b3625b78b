//! Asynchronous reading of user-selected files in the browser.

use js_sys::Promise;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

use crate::error::GpxViewError;
use crate::viewer::FileRead;

/// Read a batch of files concurrently.
///
/// All reads are started before any is awaited (JS promises run eagerly)
/// and results are collected positionally, so the batch order matches
/// file-selection order no matter which read finishes first. A failed or
/// aborted read becomes a per-file `Read` error; it never fails the batch.
pub async fn read_files(files: &[web_sys::File]) -> Vec<FileRead> {
    let pending: Vec<(String, Promise)> = files
        .iter()
        .map(|file| (file.name(), file.text()))
        .collect();

    let mut reads = Vec::with_capacity(pending.len());
    for (name, promise) in pending {
        let result = match JsFuture::from(promise).await {
            Ok(value) => value
                .as_string()
                .ok_or_else(|| GpxViewError::Read("file contents are not text".to_string())),
            Err(e) => Err(GpxViewError::Read(js_error_message(&e))),
        };
        reads.push(FileRead { name, result });
    }

    reads
}

fn js_error_message(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}
