use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assets::cache::AssetCache;
use crate::assets::loader::FsAssetLoader;
use crate::batch::coordinator::BatchOptions;
use crate::bind::BindContext;
use crate::foundation::error::{VidstampError, VidstampResult};
use crate::render::executor::SkipPolicy;
use crate::render::ffmpeg::EncoderSettings;

/// Batch settings, read from a JSON file. Every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Items rendered at once. Default 3.
    pub concurrency_limit: usize,
    /// Extra attempts for transient failures. Default 2.
    pub max_retries: u32,
    /// First retry delay. Default 500.
    pub retry_backoff_ms: u64,
    /// Retry delay cap. Default 10000.
    pub max_backoff_ms: u64,
    /// Output directory. Default `output`.
    pub output_root: PathBuf,
    /// Output extension. Default `mp4`.
    pub extension: String,
    /// Which existing outputs are skipped.
    pub skip_policy: SkipPolicy,
    /// Where fitted images are kept between runs.
    pub asset_cache_dir: Option<PathBuf>,
    /// Bound on resident assets; unbounded when unset.
    pub max_cached_assets: Option<usize>,
    /// ffmpeg settings.
    pub encoder: EncoderSettings,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            max_retries: 2,
            retry_backoff_ms: 500,
            max_backoff_ms: 10_000,
            output_root: PathBuf::from("output"),
            extension: "mp4".to_string(),
            skip_policy: SkipPolicy::Fingerprint,
            asset_cache_dir: None,
            max_cached_assets: None,
            encoder: EncoderSettings::default(),
        }
    }
}

impl BatchConfig {
    /// Read and validate a config file.
    pub fn from_path(path: impl AsRef<Path>) -> VidstampResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            VidstampError::config(format!("read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a config from JSON text.
    pub fn from_json_str(s: &str) -> VidstampResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| VidstampError::config(format!("config json parse failed: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> VidstampResult<()> {
        if self.concurrency_limit == 0 {
            return Err(VidstampError::config("concurrency_limit must be >= 1"));
        }
        let ext = self.extension.trim();
        if ext.is_empty() || ext.starts_with('.') || ext.contains(['/', '\\']) {
            return Err(VidstampError::config(format!(
                "extension '{}' must be a bare file extension like 'mp4'",
                self.extension
            )));
        }
        if self.max_cached_assets == Some(0) {
            return Err(VidstampError::config("max_cached_assets must be >= 1 when set"));
        }
        if self.encoder.timeout_secs == Some(0) {
            return Err(VidstampError::config("encoder.timeout_secs must be >= 1 when set"));
        }
        Ok(())
    }

    /// Coordinator options. The backoff cap is raised to the base backoff if configured lower.
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency_limit: self.concurrency_limit,
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.retry_backoff_ms)),
            skip_policy: self.skip_policy,
        }
    }

    /// Binding context resolving relative media against `assets_root`.
    pub fn bind_context(&self, assets_root: impl Into<PathBuf>) -> BindContext {
        BindContext::new(&self.output_root, assets_root).with_extension(self.extension.trim())
    }

    /// A disk-backed asset cache honoring `asset_cache_dir` and `max_cached_assets`.
    pub fn asset_cache(&self) -> AssetCache {
        let dir = self
            .asset_cache_dir
            .clone()
            .unwrap_or_else(FsAssetLoader::default_cache_dir);
        AssetCache::new(Arc::new(FsAssetLoader::new(dir))).with_max_entries(self.max_cached_assets)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
