pub mod role;
pub mod schema;

pub use role::RoleAssigner;
pub use schema::{AssignRequest, Assignment, Layer, Layers, Role};

use crate::colors::Color;
use crate::error::AssignError;

/// Chooses one palette color per layer.
pub trait ColorAssigner: Send + Sync {
    fn assign(&self, palette: &[Color], layers: &Layers) -> Result<Assignment, AssignError>;
}
