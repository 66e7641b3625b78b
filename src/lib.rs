pub mod error;
pub mod line_data;
#[cfg(target_arch = "wasm32")]
pub mod loader;
pub mod parser;
pub mod track;
pub mod viewer;

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::viewer::ViewerState;

/// Browser-facing handle over the viewer state container.
///
/// The UI drives it with open/clear/selectSegment/selectPoint and pulls the
/// derived collections after each action; timestamp display formatting is
/// left to the consuming grid.
#[wasm_bindgen]
pub struct GpxViewer {
    state: Rc<RefCell<ViewerState>>,
}

#[wasm_bindgen]
impl GpxViewer {
    #[wasm_bindgen(constructor)]
    pub fn new() -> GpxViewer {
        init_hooks();
        GpxViewer {
            state: Rc::new(RefCell::new(ViewerState::new())),
        }
    }

    /// Read, parse and merge the given File objects, replacing the current
    /// track on success. Resolves once the batch has been applied, or
    /// discarded if a newer open or a clear superseded it.
    #[cfg(target_arch = "wasm32")]
    pub fn open(&self, files: js_sys::Array) -> js_sys::Promise {
        use wasm_bindgen::JsCast;

        let state = Rc::clone(&self.state);
        let generation = state.borrow_mut().begin_load();
        let files: Vec<web_sys::File> = files
            .iter()
            .filter_map(|value| value.dyn_into::<web_sys::File>().ok())
            .collect();

        wasm_bindgen_futures::future_to_promise(async move {
            let reads = crate::loader::read_files(&files).await;
            state.borrow_mut().finish_load(generation, reads);
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn clear(&self) {
        self.state.borrow_mut().clear();
    }

    #[wasm_bindgen(js_name = selectSegment)]
    pub fn select_segment(&self, index: u32) {
        self.state.borrow_mut().select_segment(index as usize);
    }

    #[wasm_bindgen(js_name = selectPoint)]
    pub fn select_point(&self, index: u32) {
        self.state.borrow_mut().select_point(index as usize);
    }

    #[wasm_bindgen(js_name = hasTrack)]
    pub fn has_track(&self) -> bool {
        self.state.borrow().has_track()
    }

    /// Rows for the segments table: {id, start, end, count}.
    pub fn segments(&self) -> Result<JsValue, JsValue> {
        to_js(self.state.borrow().segment_rows())
    }

    /// Rows for the points table: {id, time, lat, lon, ele}.
    pub fn points(&self) -> Result<JsValue, JsValue> {
        to_js(self.state.borrow().point_rows())
    }

    /// Records for the map line layer, with the selected segment flagged
    /// for highlight coloring.
    #[wasm_bindgen(js_name = lineData)]
    pub fn line_data(&self) -> Result<JsValue, JsValue> {
        to_js(self.state.borrow().line_data())
    }

    /// Zero or one marker record for the icon layer.
    #[wasm_bindgen(js_name = iconData)]
    pub fn icon_data(&self) -> Result<JsValue, JsValue> {
        let state = self.state.borrow();
        let markers: Vec<_> = state.marker().into_iter().collect();
        to_js(&markers)
    }

    /// Files dropped from the last open, with the reason each was dropped.
    #[wasm_bindgen(js_name = failedFiles)]
    pub fn failed_files(&self) -> Result<JsValue, JsValue> {
        to_js(self.state.borrow().failed_files())
    }
}

impl Default for GpxViewer {
    fn default() -> Self {
        Self::new()
    }
}

fn to_js<T: serde::Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn init_hooks() {
    console_error_panic_hook::set_once();

    #[cfg(target_arch = "wasm32")]
    {
        use std::sync::Once;
        static TRACING: Once = Once::new();
        TRACING.call_once(tracing_wasm::set_as_global_default);
    }
}
