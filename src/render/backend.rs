use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assets::cache::AssetHandle;
use crate::bind::RenderPlan;

/// Whether a failed render may succeed if retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Resource pressure or a killed process; worth retrying.
    Transient,
    /// Bad input or a broken encoder; retrying gives the same result.
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        })
    }
}

/// Failure reported by a [`RenderBackend`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("({kind}) {message}")]
pub struct RenderFailure {
    /// Whether a retry may help.
    pub kind: FailureKind,
    /// Detail for the report, e.g. the encoder's last stderr lines.
    pub message: String,
}

impl RenderFailure {
    /// A failure worth retrying.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// A failure that retrying will not fix.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }
}

/// Everything a backend needs to produce one file.
#[derive(Debug)]
pub struct RenderJob<'a> {
    /// What to render.
    pub plan: &'a RenderPlan,
    /// Resolved asset for each plan layer, index-aligned with `plan.layers`.
    /// `None` for text layers without a font file.
    pub assets: &'a [Option<AssetHandle>],
    /// Where the backend must write. The executor publishes it to `plan.output_path` on success.
    pub output_path: &'a Path,
}

/// External rendering capability: composites a bound plan into a media file.
///
/// Called concurrently from worker threads for independent jobs; assets are shared read-only.
pub trait RenderBackend: Send + Sync {
    /// Write the rendered file to `job.output_path`.
    fn render(&self, job: &RenderJob<'_>) -> Result<(), RenderFailure>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}
