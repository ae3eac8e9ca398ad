pub mod border_contrast;
pub mod network_segmenter;

pub use border_contrast::BorderContrastSegmenter;
pub use network_segmenter::NetworkSegmenter;

use crate::error::InferenceError;
use crate::imaging::{Mask, ModelInput};

/// A foreground segmentation model.
///
/// `predict` takes `&self`: implementations hold no per-call state, so one
/// loaded model is shared read-only across request threads.
pub trait Segmenter: Send + Sync {
    /// Short identifier shown in logs and `/health`.
    fn name(&self) -> &str;

    /// Returns a foreground mask. It may come back at the model's native
    /// resolution rather than the input's; callers resize it.
    fn predict(&self, input: &ModelInput) -> Result<Mask, InferenceError>;
}

/// The network at `model_path` when configured, border contrast otherwise.
pub fn from_config(config: &crate::config::Config) -> Result<std::sync::Arc<dyn Segmenter>, crate::error::ModelError> {
    match &config.model_path {
        Some(path) => Ok(std::sync::Arc::new(NetworkSegmenter::load(path)?)),
        None => {
            tracing::info!("no model_path configured, using border-contrast segmentation");
            Ok(std::sync::Arc::new(BorderContrastSegmenter::default()))
        }
    }
}
