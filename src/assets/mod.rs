//! Batch-scoped asset loading.
//!
//! [`loader`] turns a source reference into a prepared asset; [`cache`] makes sure each one is
//! loaded once per batch no matter how many renders ask for it.

/// Single-flight asset cache.
pub mod cache;
/// Asset keys and loaders.
pub mod loader;
