//! Template model and placeholder syntax.

/// Template schema and validation.
pub mod model;
/// `{key}` placeholder parsing.
pub mod placeholder;
