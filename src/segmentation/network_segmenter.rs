use std::path::Path;

use tracing::{info, warn};

use crate::error::{InferenceError, ModelError};
use crate::imaging::{Mask, ModelInput};
use crate::network::{InputType, Network};
use crate::segmentation::Segmenter;

/// Runs a dense network once per pixel to score foreground probability.
pub struct NetworkSegmenter {
    network: Network,
    input_type: InputType,
    name: String,
}

impl NetworkSegmenter {
    pub fn new(network: Network) -> Result<NetworkSegmenter, ModelError> {
        network.validate()?;
        let input_type = network.input_type().ok_or(ModelError::UnknownInput {
            fan_in: network.layers.first().map_or(0, |l| l.input_size()),
        })?;
        let name = network
            .metadata
            .as_ref()
            .and_then(|m| m.description.clone())
            .unwrap_or_else(|| "pixel-network".to_owned());
        if let Some(last) = network.layers.last() {
            if !last.activator.is_probabilistic() {
                warn!(model = %name, activation = ?last.activator, "output layer is not a probability; scores will be clamped to [0, 1]");
            }
        }
        Ok(NetworkSegmenter { network, input_type, name })
    }

    pub fn load(path: &Path) -> Result<NetworkSegmenter, ModelError> {
        let network = Network::load_json(path)?;
        info!(
            path = %path.display(),
            layers = network.layers.len(),
            resolution = ?network.metadata.as_ref().and_then(|m| m.resolution),
            "loaded segmentation network"
        );
        NetworkSegmenter::new(network)
    }

    fn features(&self, input: &ModelInput, i: usize) -> Vec<f64> {
        let [r, g, b] = input.pixel(i);
        let mut f = vec![r as f64, g as f64, b as f64];
        if self.input_type == InputType::PixelRgbPosition {
            let x = (i % input.width as usize) as f64;
            let y = (i / input.width as usize) as f64;
            f.push(centered(x, input.width));
            f.push(centered(y, input.height));
        }
        f
    }
}

/// Maps a pixel index onto [-1, 1].
fn centered(v: f64, extent: u32) -> f64 {
    if extent <= 1 {
        0.0
    } else {
        v / (extent - 1) as f64 * 2.0 - 1.0
    }
}

impl Segmenter for NetworkSegmenter {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, input: &ModelInput) -> Result<Mask, InferenceError> {
        let expected = input.pixel_count() * 3;
        if input.pixels.len() != expected {
            return Err(InferenceError::InputLength { expected, actual: input.pixels.len() });
        }

        let native = self.network.metadata.as_ref().and_then(|m| m.resolution);
        let input = match native {
            Some(size) => input.resized(size),
            None => input.clone(),
        };

        let mut data = Vec::with_capacity(input.pixel_count());
        for i in 0..input.pixel_count() {
            let out = self.network.forward(&self.features(&input, i));
            let p = out.first().copied().unwrap_or(f64::NAN);
            if !p.is_finite() {
                return Err(InferenceError::NonFinite(i));
            }
            data.push(p.clamp(0.0, 1.0) as f32);
        }

        Mask::new(input.width, input.height, data).map_err(|e| InferenceError::Model(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use crate::layers::dense::Layer;
    use crate::math::matrix::Matrix;
    use crate::network::ModelMetadata;
    use image::{Rgb, RgbImage};

    /// Scores "red minus blue": red pixels are foreground.
    fn redness(metadata: Option<ModelMetadata>) -> Network {
        Network::new(
            vec![Layer::from_parts(
                Matrix::from_data(vec![vec![20.0], vec![0.0], vec![-20.0]]),
                Matrix::row(&[0.0]),
                ActivationFunction::Sigmoid,
            )],
            metadata,
        )
    }

    fn half_red(size: u32) -> ModelInput {
        ModelInput::from_rgb(&RgbImage::from_fn(size, size, |x, _| {
            if x < size / 2 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
        }))
    }

    #[test]
    fn scores_each_pixel() {
        let seg = NetworkSegmenter::new(redness(None)).unwrap();
        let mask = seg.predict(&half_red(8)).unwrap();
        assert_eq!((mask.width, mask.height), (8, 8));
        assert!(mask.get(0, 0) > 0.99);
        assert!(mask.get(7, 7) < 0.01);
        assert_eq!(seg.name(), "pixel-network");
    }

    #[test]
    fn runs_at_native_resolution() {
        let meta = ModelMetadata { resolution: Some(4), description: Some("tiny".into()), ..Default::default() };
        let seg = NetworkSegmenter::new(redness(Some(meta))).unwrap();
        let mask = seg.predict(&half_red(16)).unwrap();
        assert_eq!((mask.width, mask.height), (4, 4));
        assert_eq!(seg.name(), "tiny");
    }

    #[test]
    fn position_features_are_centered() {
        // Output depends only on x: left half background, right half foreground.
        let net = Network::new(
            vec![Layer::from_parts(
                Matrix::from_data(vec![vec![0.0], vec![0.0], vec![0.0], vec![30.0], vec![0.0]]),
                Matrix::row(&[0.0]),
                ActivationFunction::Sigmoid,
            )],
            None,
        );
        let seg = NetworkSegmenter::new(net).unwrap();
        let input = ModelInput::from_rgb(&RgbImage::from_pixel(5, 5, Rgb([9, 9, 9])));
        let mask = seg.predict(&input).unwrap();
        assert!(mask.get(0, 2) < 0.01);
        assert!((mask.get(2, 2) - 0.5).abs() < 1e-6);
        assert!(mask.get(4, 2) > 0.99);
    }

    #[test]
    fn rejects_truncated_input() {
        let seg = NetworkSegmenter::new(redness(None)).unwrap();
        let mut input = half_red(4);
        input.pixels.pop();
        assert!(matches!(seg.predict(&input), Err(InferenceError::InputLength { .. })));
    }

    #[test]
    fn load_reports_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(NetworkSegmenter::load(&path), Err(ModelError::Parse(_))));
        assert!(matches!(
            NetworkSegmenter::load(&dir.path().join("missing.json")),
            Err(ModelError::Io(_))
        ));
    }
}
