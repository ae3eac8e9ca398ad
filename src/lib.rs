pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod imaging;
pub mod colors;
pub mod segmentation;
pub mod assign;
pub mod error;
pub mod config;
pub mod service;
pub mod http;
pub mod logging;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::network::Network;
pub use colors::{Color, ExtendedPalette};
pub use segmentation::{BorderContrastSegmenter, NetworkSegmenter, Segmenter};
pub use assign::{ColorAssigner, RoleAssigner};
pub use config::{Config, ConfigOverrides};
pub use error::ServiceError;
pub use service::PaletteService;
