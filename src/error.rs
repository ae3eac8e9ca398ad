use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

/// Failures while loading or validating a segmentation network.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("could not read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("model file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model has no layers")]
    Empty,

    #[error("cannot infer per-pixel features for a first layer with {fan_in} inputs")]
    UnknownInput { fan_in: usize },

    #[error("invalid model shape: {0}")]
    Shape(String),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model input holds {actual} values, expected {expected}")]
    InputLength { expected: usize, actual: usize },

    #[error("model produced a non-finite value at pixel {0}")]
    NonFinite(usize),

    #[error("segmentation failed: {0}")]
    Model(String),
}

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("mask is {mask_width}x{mask_height} but image is {image_width}x{image_height}")]
    SizeMismatch {
        mask_width: u32,
        mask_height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("mask buffer holds {actual} values, expected {expected}")]
    BufferLength { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("image has no pixels to extract colors from")]
    NoPixels,

    #[error("n_colors must be at least 1")]
    ZeroColors,
}

#[derive(Debug, Error)]
pub enum AssignError {
    #[error("palette is empty")]
    EmptyPalette,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a request handler can fail with. Each variant maps to exactly
/// one HTTP status in `status()`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    InvalidInput {
        message: String,
        detail: Option<String>,
    },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("unable to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Palette(#[from] PaletteError),

    #[error(transparent)]
    Delegate(#[from] AssignError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("all {limit} pipeline workers are busy")]
    Busy { limit: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

const GENERIC_MESSAGE: &str = "Internal server error";

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidInput { message: message.into(), detail: None }
    }

    pub fn invalid_with(message: impl Into<String>, detail: impl Into<String>) -> Self {
        ServiceError::InvalidInput { message: message.into(), detail: Some(detail.into()) }
    }

    pub fn status(&self) -> u16 {
        match self {
            ServiceError::InvalidInput { .. } => 400,
            ServiceError::PayloadTooLarge { .. } => 413,
            ServiceError::Decode(_) => 422,
            ServiceError::Inference(_)
            | ServiceError::Mask(_)
            | ServiceError::Palette(_)
            | ServiceError::Delegate(_)
            | ServiceError::Internal(_) => 500,
            ServiceError::Busy { .. } => 503,
            ServiceError::Timeout(_) => 504,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput { .. } => "invalid_input",
            ServiceError::PayloadTooLarge { .. } => "payload_too_large",
            ServiceError::Decode(_) => "decode_error",
            ServiceError::Inference(_) | ServiceError::Mask(_) => "inference_error",
            ServiceError::Palette(_) => "palette_error",
            ServiceError::Delegate(_) => "delegate_error",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::Busy { .. } => "busy",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }

    /// JSON body sent to the client. With `expose_details` off, 5xx bodies
    /// never carry the underlying error text.
    pub fn body(&self, expose_details: bool) -> Value {
        match self {
            ServiceError::InvalidInput { message, detail: None } => json!({ "error": message }),
            ServiceError::InvalidInput { message, detail: Some(detail) } => {
                json!({ "error": message, "message": detail })
            }
            ServiceError::PayloadTooLarge { .. } => json!({ "error": "Request body too large" }),
            ServiceError::Decode(_) => json!({ "error": self.to_string(), "kind": self.kind() }),
            ServiceError::Timeout(_) => json!({ "error": "Request timed out", "kind": self.kind() }),
            ServiceError::Busy { .. } => json!({ "error": "Server busy", "kind": self.kind() }),
            ServiceError::Delegate(e) => {
                if expose_details {
                    json!({ "error": GENERIC_MESSAGE, "message": e.to_string(), "kind": self.kind() })
                } else {
                    json!({ "error": GENERIC_MESSAGE, "kind": self.kind() })
                }
            }
            _ => {
                let text = if expose_details { self.to_string() } else { GENERIC_MESSAGE.to_owned() };
                json!({ "error": text, "kind": self.kind() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(ServiceError::invalid("Invalid data").status(), 400);
        assert_eq!(ServiceError::PayloadTooLarge { limit: 10 }.status(), 413);
        let decode = image::load_from_memory(b"definitely not an image").unwrap_err();
        let err = ServiceError::from(decode);
        assert_eq!(err.status(), 422);
        assert_eq!(err.kind(), "decode_error");
        assert!(!err.body(false)["error"].as_str().unwrap().is_empty());
    }

    #[test]
    fn server_errors_map_to_5xx() {
        assert_eq!(ServiceError::from(InferenceError::NonFinite(3)).status(), 500);
        assert_eq!(ServiceError::from(PaletteError::NoPixels).status(), 500);
        assert_eq!(ServiceError::from(AssignError::EmptyPalette).status(), 500);
        assert_eq!(ServiceError::Timeout(Duration::from_secs(1)).status(), 504);
        let busy = ServiceError::Busy { limit: 4 };
        assert_eq!(busy.status(), 503);
        assert_eq!(busy.body(true), json!({ "error": "Server busy", "kind": "busy" }));
    }

    #[test]
    fn invalid_input_body_is_exact() {
        let body = ServiceError::invalid("No image data found in the request").body(true);
        assert_eq!(body, json!({ "error": "No image data found in the request" }));

        let body = ServiceError::invalid_with("Invalid data", "palette[0]: bad hex").body(true);
        assert_eq!(body["error"], "Invalid data");
        assert_eq!(body["message"], "palette[0]: bad hex");
    }

    #[test]
    fn delegate_error_keeps_generic_shape() {
        let err = ServiceError::from(AssignError::Other("boom".into()));
        let exposed = err.body(true);
        assert_eq!(exposed["error"], "Internal server error");
        assert_eq!(exposed["message"], "boom");
        let hidden = err.body(false);
        assert!(hidden.get("message").is_none());
    }

    #[test]
    fn hidden_details_do_not_leak() {
        let err = ServiceError::from(InferenceError::Model("cuda out of memory at 0xdeadbeef".into()));
        assert!(err.body(true)["error"].as_str().unwrap().contains("cuda"));
        assert_eq!(err.body(false)["error"], "Internal server error");
        assert_eq!(err.body(false)["kind"], "inference_error");
    }
}
