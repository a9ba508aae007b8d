/// Canvas, colors, presets and small value types.
pub mod core;
/// Error taxonomy.
pub mod error;
