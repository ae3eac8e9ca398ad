use serde::{Deserialize, Serialize};

/// Describes which per-pixel features a segmentation network consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputType {
    /// `[r, g, b]`, each normalized to [0, 1].
    PixelRgb,
    /// `[r, g, b, x, y]` where `x` and `y` run from -1 (left/top) to 1.
    PixelRgbPosition,
}

impl InputType {
    pub fn feature_count(&self) -> usize {
        match self {
            InputType::PixelRgb => 3,
            InputType::PixelRgbPosition => 5,
        }
    }

    /// Guesses the input type from the first layer's fan-in.
    pub fn infer(fan_in: usize) -> Option<InputType> {
        match fan_in {
            3 => Some(InputType::PixelRgb),
            5 => Some(InputType::PixelRgbPosition),
            _ => None,
        }
    }
}

/// Optional annotations attached to a saved Network.
/// All fields are Option<> so bare weight files deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub description: Option<String>,
    pub input_type: Option<InputType>,
    /// Side length the network runs at; the mask is produced at this size
    /// and upsampled by the caller.
    pub resolution: Option<u32>,
}
