use std::num::ParseFloatError;
use wasm_bindgen::JsValue;

#[derive(Debug)]
pub enum GpxViewError {
    XmlParse(quick_xml::Error),
    MissingElement {
        parent: &'static str,
        element: &'static str,
    },
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
    InvalidElement {
        element: &'static str,
        value: String,
    },
    InvalidTimestamp {
        value: String,
    },
    Read(String),
}

impl std::fmt::Display for GpxViewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::XmlParse(e) => write!(f, "XML parse error: {e}"),
            Self::MissingElement { parent, element } => {
                write!(f, "Missing element <{element}> inside <{parent}>")
            }
            Self::MissingAttribute { element, attribute } => {
                write!(f, "Missing attribute '{attribute}' on <{element}>")
            }
            Self::InvalidAttribute {
                element,
                attribute,
                value,
            } => write!(
                f,
                "Invalid value '{value}' for attribute '{attribute}' on <{element}>"
            ),
            Self::InvalidElement { element, value } => {
                write!(f, "Invalid value '{value}' for element <{element}>")
            }
            Self::InvalidTimestamp { value } => write!(f, "Invalid timestamp '{value}'"),
            Self::Read(reason) => write!(f, "File read error: {reason}"),
        }
    }
}

impl std::error::Error for GpxViewError {}

impl From<quick_xml::Error> for GpxViewError {
    fn from(e: quick_xml::Error) -> Self {
        Self::XmlParse(e)
    }
}

impl From<ParseFloatError> for GpxViewError {
    fn from(e: ParseFloatError) -> Self {
        Self::InvalidElement {
            element: "trkpt",
            value: e.to_string(),
        }
    }
}

impl From<GpxViewError> for JsValue {
    fn from(e: GpxViewError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
