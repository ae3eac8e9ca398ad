pub mod color;
pub mod extract;

pub use color::Color;
pub use extract::{extended_palette, EntryKind, ExtendedPalette, PaletteEntry, PaletteOptions};
