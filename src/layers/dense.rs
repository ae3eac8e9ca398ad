use serde::{Serialize, Deserialize};
use crate::{math::matrix::Matrix, activation::activation::ActivationFunction};

/// Fully connected layer: `a = f(x · W + b)`.
///
/// `weights` has shape `(input_size, size)` and `biases` shape `(1, size)`.
/// Extra fields present in training checkpoints (cached activations) are
/// ignored on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer{
    pub size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction
}

impl Layer {
    pub fn from_parts(weights: Matrix, biases: Matrix, activation: ActivationFunction) -> Layer {
        Layer {
            size: weights.cols,
            weights,
            biases,
            activator: activation,
        }
    }

    /// Number of inputs this layer expects.
    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    /// Stateless forward pass, safe to call from many threads at once.
    pub fn feed_from(&self, input: &[f64]) -> Vec<f64> {
        let z = &(&Matrix::row(input) * &self.weights) + &self.biases;
        let a = z.map(|x| self.activator.function(x));
        let mut out = a.data.into_iter().next().unwrap_or_default();
        if self.activator == ActivationFunction::Softmax {
            softmax_in_place(&mut out);
        }
        out
    }
}

/// Numerically stable softmax (max-shifted).
fn softmax_in_place(values: &mut [f64]) {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_layer_is_affine() {
        let layer = Layer::from_parts(
            Matrix::from_data(vec![vec![2.0], vec![-1.0]]),
            Matrix::row(&[0.5]),
            ActivationFunction::Identity,
        );
        assert_eq!(layer.input_size(), 2);
        assert_eq!(layer.size, 1);
        assert_eq!(layer.feed_from(&[1.0, 1.0]), vec![1.5]);
    }

    #[test]
    fn softmax_layer_sums_to_one() {
        let layer = Layer::from_parts(
            Matrix::from_data(vec![vec![1.0, 2.0, 3.0]]),
            Matrix::row(&[0.0, 0.0, 0.0]),
            ActivationFunction::Softmax,
        );
        let out = layer.feed_from(&[1.0]);
        let total: f64 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(out[2] > out[1] && out[1] > out[0]);
    }
}
