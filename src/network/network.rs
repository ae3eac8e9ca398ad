use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::ModelError;
use crate::layers::dense::Layer;
use crate::network::metadata::{InputType, ModelMetadata};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl Network {
    pub fn new(layers: Vec<Layer>, metadata: Option<ModelMetadata>) -> Network {
        Network { layers, metadata }
    }

    /// Forward pass. Takes `&self`; no activations are cached, so one network
    /// can serve concurrent requests.
    pub fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut current = input.to_vec();
        for layer in &self.layers {
            current = layer.feed_from(&current);
        }
        current
    }

    /// Declared input type, falling back to a guess from the first layer.
    pub fn input_type(&self) -> Option<InputType> {
        self.metadata
            .as_ref()
            .and_then(|m| m.input_type)
            .or_else(|| self.layers.first().and_then(|l| InputType::infer(l.input_size())))
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.size)
    }

    /// Checks that layer shapes chain and that the network maps one pixel's
    /// features to a single foreground probability.
    pub fn validate(&self) -> Result<(), ModelError> {
        let first = self.layers.first().ok_or(ModelError::Empty)?;

        let input_type = self.input_type().ok_or(ModelError::UnknownInput {
            fan_in: first.input_size(),
        })?;
        if first.input_size() != input_type.feature_count() {
            return Err(ModelError::Shape(format!(
                "first layer expects {} inputs but {:?} provides {}",
                first.input_size(),
                input_type,
                input_type.feature_count()
            )));
        }

        for (i, layer) in self.layers.iter().enumerate() {
            if !layer.weights.is_consistent() || !layer.biases.is_consistent() {
                return Err(ModelError::Shape(format!("layer {} has ragged matrix data", i)));
            }
            if layer.weights.cols != layer.size || layer.biases.cols != layer.size || layer.biases.rows != 1 {
                return Err(ModelError::Shape(format!(
                    "layer {} declares {} neurons but weights are {}x{} and biases {}x{}",
                    i, layer.size, layer.weights.rows, layer.weights.cols,
                    layer.biases.rows, layer.biases.cols
                )));
            }
            if i > 0 && layer.input_size() != self.layers[i - 1].size {
                return Err(ModelError::Shape(format!(
                    "layer {} expects {} inputs but layer {} outputs {}",
                    i, layer.input_size(), i - 1, self.layers[i - 1].size
                )));
            }
        }

        if self.output_size() != 1 {
            return Err(ModelError::Shape(format!(
                "segmentation networks need exactly one output neuron, found {}",
                self.output_size()
            )));
        }

        // Softmax over a single neuron is constantly 1.0.
        if self.layers.last().map(|l| &l.activator) == Some(&ActivationFunction::Softmax) {
            return Err(ModelError::Shape(
                "softmax on a single output neuron always yields 1; use sigmoid".into(),
            ));
        }

        if let Some(0) = self.metadata.as_ref().and_then(|m| m.resolution) {
            return Err(ModelError::Shape("metadata.resolution must be positive".into()));
        }

        Ok(())
    }

    /// Serializes the network to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<(), ModelError> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Loads and validates a network written by `save_json` or any trainer
    /// emitting the same layout.
    pub fn load_json(path: &Path) -> Result<Network, ModelError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let network: Network = serde_json::from_reader(reader)?;
        network.validate()?;
        Ok(network)
    }
}
