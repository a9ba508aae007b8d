//! Rendering one bound plan into an output file.

/// The external rendering capability seam.
pub mod backend;
/// Atomic publish, completion markers and per-item results.
pub mod executor;
/// `ffmpeg`-based backend (filter graph built per plan, system `ffmpeg` process).
pub mod ffmpeg;
