pub mod metadata;
pub mod network;

pub use network::Network;
pub use metadata::{InputType, ModelMetadata};
