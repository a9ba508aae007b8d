//! vidstamp renders many videos from one template.
//!
//! A batch is driven by a JSON [`Template`] and a list of [`DataRecord`]s:
//!
//! - Each record is bound into the template, producing an immutable [`RenderPlan`]
//! - Plans are rendered concurrently by a [`BatchCoordinator`] through a [`RenderBackend`]
//!   (by default [`FfmpegBackend`]), sharing assets through a single-flight [`AssetCache`]
//! - Every item ends up in the [`BatchReport`], failed ones with their error
#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Asset loading and the batch-scoped cache.
pub mod assets;
/// Batch coordination and reporting.
pub mod batch;
/// Record-to-plan binding.
pub mod bind;
/// JSON batch configuration.
pub mod config;
/// Core types and errors.
pub mod foundation;
/// Data records and manifest loading.
pub mod record;
/// Render backends and the per-item executor.
pub mod render;
/// Template model.
pub mod template;

pub use crate::assets::cache::{AssetCache, AssetHandle};
pub use crate::assets::loader::{AssetKey, AssetKind, AssetLoader, FsAssetLoader, LoadedAsset};
pub use crate::batch::coordinator::{
    BatchCoordinator, BatchObserver, BatchOptions, CancelToken, ItemState,
};
pub use crate::batch::report::BatchReport;
pub use crate::bind::{BindContext, BoundLayer, PlanFingerprint, RenderPlan, bind};
pub use crate::config::BatchConfig;
pub use crate::foundation::core::{Canvas, OutputPreset, Rgb8};
pub use crate::foundation::error::{VidstampError, VidstampResult};
pub use crate::record::{DataRecord, FieldValue, load_records, parse_records};
pub use crate::render::backend::{FailureKind, RenderBackend, RenderFailure, RenderJob};
pub use crate::render::executor::{
    ErrorClass, ItemError, RenderExecutor, RenderResult, RenderStatus, SkipPolicy,
};
pub use crate::render::ffmpeg::{EncoderSettings, FfmpegBackend};
pub use crate::template::model::{Layer, LayerKind, Template};
