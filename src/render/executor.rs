use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::assets::cache::{AssetCache, AssetHandle};
use crate::assets::loader::AssetKey;
use crate::bind::{PlanFingerprint, RenderPlan};
use crate::foundation::error::{VidstampError, VidstampResult};
use crate::render::backend::{FailureKind, RenderBackend, RenderFailure, RenderJob};

/// Final state of one item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    /// The output was rendered and published.
    Succeeded,
    /// Binding, validation or rendering failed; see [`RenderResult::error`].
    Failed,
    /// A valid output from an earlier run was found.
    Skipped,
    /// Never dispatched because the batch was cancelled.
    Cancelled,
}

/// Which stage an item failed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// A placeholder had no matching record field.
    Binding,
    /// A bound value was out of range, or the output path was unusable.
    Validation,
    /// The backend, or an asset the render depends on, failed.
    Render,
    /// The batch was cancelled before the item started.
    Cancelled,
    /// Anything else.
    Internal,
}

/// Serializable failure detail attached to a [`RenderResult`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// Failing stage.
    pub class: ErrorClass,
    /// Whether a retry may succeed.
    pub transient: bool,
    /// Rendered error message.
    pub message: String,
}

impl ItemError {
    /// Classify `err` for reporting.
    pub fn from_error(err: &VidstampError) -> Self {
        let class = match err {
            VidstampError::Binding { .. } => ErrorClass::Binding,
            VidstampError::Validation(_) | VidstampError::Template(_) => ErrorClass::Validation,
            VidstampError::CacheLoad { .. } | VidstampError::Render(_) => ErrorClass::Render,
            VidstampError::Cancelled => ErrorClass::Cancelled,
            VidstampError::Config(_) | VidstampError::Other(_) => ErrorClass::Internal,
        };
        Self {
            class,
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one item, as reported at the end of a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderResult {
    /// Position of the record in the input.
    pub index: usize,
    /// Record id, or the index when the record has none.
    pub item_id: String,
    /// Final state.
    pub status: RenderStatus,
    /// Target path. `None` when the item failed before a path was bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Set for failed and cancelled items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
    /// Render attempts made. Zero for skipped items and items that failed before rendering.
    pub attempts: u32,
    /// Wall time spent rendering, summed over attempts.
    pub elapsed_ms: u64,
}

impl RenderResult {
    /// A published output after one attempt.
    pub fn succeeded(plan: &RenderPlan, elapsed_ms: u64) -> Self {
        Self {
            index: plan.index,
            item_id: plan.item_id.clone(),
            status: RenderStatus::Succeeded,
            output_path: Some(plan.output_path.clone()),
            error: None,
            attempts: 1,
            elapsed_ms,
        }
    }

    /// A valid output from an earlier run.
    pub fn skipped(plan: &RenderPlan) -> Self {
        Self {
            index: plan.index,
            item_id: plan.item_id.clone(),
            status: RenderStatus::Skipped,
            output_path: Some(plan.output_path.clone()),
            error: None,
            attempts: 0,
            elapsed_ms: 0,
        }
    }

    /// A failed item. `attempts` starts at zero; the caller sets it once rendering was tried.
    pub fn failed(
        index: usize,
        item_id: impl Into<String>,
        output_path: Option<PathBuf>,
        err: &VidstampError,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            index,
            item_id: item_id.into(),
            status: RenderStatus::Failed,
            output_path,
            error: Some(ItemError::from_error(err)),
            attempts: 0,
            elapsed_ms,
        }
    }

    /// An item never dispatched because the batch was cancelled.
    pub fn cancelled(plan: &RenderPlan) -> Self {
        Self {
            index: plan.index,
            item_id: plan.item_id.clone(),
            status: RenderStatus::Cancelled,
            output_path: Some(plan.output_path.clone()),
            error: Some(ItemError::from_error(&VidstampError::Cancelled)),
            attempts: 0,
            elapsed_ms: 0,
        }
    }

    /// Whether a retry may change the outcome.
    pub fn is_transient_failure(&self) -> bool {
        self.status == RenderStatus::Failed && self.error.as_ref().is_some_and(|e| e.transient)
    }
}

/// How to treat an output that already exists when a batch starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipPolicy {
    /// Always render.
    Never,
    /// Skip when a non-empty file exists at the output path.
    Exists,
    /// Skip when the output exists and its completion marker matches the plan fingerprint.
    #[default]
    Fingerprint,
}

impl std::str::FromStr for SkipPolicy {
    type Err = VidstampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "exists" => Ok(Self::Exists),
            "fingerprint" => Ok(Self::Fingerprint),
            other => Err(VidstampError::config(format!(
                "unknown skip policy '{other}' (expected never, exists or fingerprint)"
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CompletionMarker {
    item_id: String,
    fingerprint: String,
}

/// Sidecar written next to a finished output: `dir/.{file}.vidstamp.json`.
pub fn marker_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.vidstamp.json"))
}

fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!(".{stem}.partial.{}", ext.to_string_lossy()),
        None => format!(".{stem}.partial"),
    };
    output.with_file_name(name)
}

fn non_empty_file(p: &Path) -> bool {
    fs::metadata(p).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// Whether a prior run already produced a valid output for `plan`.
pub fn is_complete(plan: &RenderPlan, policy: SkipPolicy) -> bool {
    match policy {
        SkipPolicy::Never => false,
        SkipPolicy::Exists => non_empty_file(&plan.output_path),
        SkipPolicy::Fingerprint => {
            if !non_empty_file(&plan.output_path) {
                return false;
            }
            let Ok(fp) = plan.fingerprint() else {
                return false;
            };
            fs::read(marker_path(&plan.output_path))
                .ok()
                .and_then(|b| serde_json::from_slice::<CompletionMarker>(&b).ok())
                .is_some_and(|m| m.fingerprint == fp.to_string())
        }
    }
}

/// Runs one plan through a [`RenderBackend`], resolving its assets through a shared cache.
///
/// Outputs are written to a hidden sibling path and renamed into place only after the backend
/// succeeds, so the final path never holds a partial file.
pub struct RenderExecutor {
    backend: Arc<dyn RenderBackend>,
    cache: Arc<AssetCache>,
}

impl std::fmt::Debug for RenderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderExecutor")
            .field("backend", &self.backend.name())
            .field("cache", &self.cache)
            .finish()
    }
}

impl RenderExecutor {
    /// Executor rendering through `backend` with assets from `cache`.
    pub fn new(backend: Arc<dyn RenderBackend>, cache: Arc<AssetCache>) -> Self {
        Self { backend, cache }
    }

    /// The shared asset cache.
    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    /// [`RenderBackend::name`] of the backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Render `plan` once. Never panics or returns an error: every failure is captured in the
    /// result.
    #[tracing::instrument(level = "debug", skip(self, plan), fields(item = %plan.item_id))]
    pub fn render(&self, plan: &RenderPlan) -> RenderResult {
        let t0 = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.try_render(plan)))
            .unwrap_or_else(|_| Err(RenderFailure::permanent("render panicked").into()));
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                tracing::debug!(elapsed_ms, "render succeeded");
                RenderResult::succeeded(plan, elapsed_ms)
            }
            Err(e) => {
                tracing::debug!(error = %e, transient = e.is_transient(), "render failed");
                let mut r = RenderResult::failed(
                    plan.index,
                    &plan.item_id,
                    Some(plan.output_path.clone()),
                    &e,
                    elapsed_ms,
                );
                r.attempts = 1;
                r
            }
        }
    }

    fn resolve_assets(&self, plan: &RenderPlan) -> VidstampResult<Vec<Option<AssetHandle>>> {
        plan.layers
            .iter()
            .map(|layer| {
                AssetKey::for_layer(layer, plan.canvas)
                    .map(|key| self.cache.get(&key))
                    .transpose()
            })
            .collect()
    }

    fn try_render(&self, plan: &RenderPlan) -> VidstampResult<()> {
        let assets = self.resolve_assets(plan).map_err(asset_failure)?;

        let out = &plan.output_path;
        if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                io_failure(format!("create output directory '{}'", dir.display()), &e)
            })?;
        }
        let mut tmp = PartialFileGuard {
            path: partial_path(out),
            armed: true,
        };
        let tmp_path = tmp.path.clone();
        let _ = fs::remove_file(&tmp_path);

        let job = RenderJob {
            plan,
            assets: &assets,
            output_path: &tmp_path,
        };
        self.backend.render(&job)?;

        if !non_empty_file(&tmp_path) {
            return Err(RenderFailure::permanent(format!(
                "backend '{}' reported success but wrote no output",
                self.backend.name()
            ))
            .into());
        }
        let marker = marker_path(out);
        let _ = fs::remove_file(&marker);
        fs::rename(&tmp_path, out)
            .map_err(|e| io_failure(format!("publish '{}'", out.display()), &e))?;
        tmp.armed = false;
        write_marker(plan, &marker)
    }
}

/// Removes an unpublished partial output on drop.
struct PartialFileGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn write_marker(plan: &RenderPlan, marker: &Path) -> VidstampResult<()> {
    let fp: PlanFingerprint = plan.fingerprint()?;
    let body = serde_json::to_vec_pretty(&CompletionMarker {
        item_id: plan.item_id.clone(),
        fingerprint: fp.to_string(),
    })
    .map_err(|e| VidstampError::Other(anyhow::anyhow!("serialize completion marker: {e}")))?;
    // A missing marker only costs a re-render next time.
    if let Err(e) = fs::write(marker, body) {
        tracing::warn!(path = %marker.display(), error = %e, "failed to write completion marker");
    }
    Ok(())
}

/// A failed asset load fails the render that needed it, keeping the load's transient flag.
fn asset_failure(err: VidstampError) -> VidstampError {
    match err {
        VidstampError::CacheLoad {
            source_ref,
            message,
            transient,
        } => RenderFailure {
            kind: if transient {
                FailureKind::Transient
            } else {
                FailureKind::Permanent
            },
            message: format!("asset '{source_ref}': {message}"),
        }
        .into(),
        other => other,
    }
}

fn io_failure(what: String, e: &std::io::Error) -> VidstampError {
    let kind = if crate::assets::loader::is_transient_io(e.kind()) {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    };
    RenderFailure {
        kind,
        message: format!("{what}: {e}"),
    }
    .into()
}

#[cfg(test)]
#[path = "../../tests/unit/render/executor.rs"]
mod tests;
