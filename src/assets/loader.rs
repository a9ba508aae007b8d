use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::{ImageFormat, Rgba, RgbaImage, imageops};

use crate::bind::BoundLayer;
use crate::foundation::core::Canvas;
use crate::foundation::error::{VidstampError, VidstampResult};
use crate::template::model::{Fit, LayerKind};

/// What a cached asset is used as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Still image, fitted to its layer box.
    Image,
    /// Audio track.
    Audio,
    /// Video clip.
    Clip,
    /// Font file for a text layer.
    Font,
}

/// Target box an image is fitted into when it is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Resize {
    /// Box width in pixels.
    pub width: u32,
    /// Box height in pixels.
    pub height: u32,
    /// How the image fills the box.
    pub fit: Fit,
}

/// Identity of a cached asset: source plus load parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetKey {
    /// Asset role.
    pub kind: AssetKind,
    /// Resolved source path.
    pub source: PathBuf,
    /// Target box for images; `None` loads the image as is.
    pub resize: Option<Resize>,
}

impl AssetKey {
    /// Key for an image, optionally fitted to a box.
    pub fn image(source: impl Into<PathBuf>, resize: Option<Resize>) -> Self {
        Self {
            kind: AssetKind::Image,
            source: source.into(),
            resize,
        }
    }

    /// Key for a non-image asset.
    pub fn media(kind: AssetKind, source: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            source: source.into(),
            resize: None,
        }
    }

    /// Key for the asset a bound layer needs, if any.
    ///
    /// Images are fitted to the layer's box (or the full canvas) at load time; clips are scaled
    /// by the encoder.
    pub fn for_layer(layer: &BoundLayer, canvas: Canvas) -> Option<Self> {
        let source = layer.source.clone()?;
        let kind = match &layer.kind {
            LayerKind::Image { style } => {
                let (width, height) = layer
                    .size
                    .map_or((canvas.width, canvas.height), |s| (s.width, s.height));
                return Some(Self::image(
                    source,
                    Some(Resize {
                        width,
                        height,
                        fit: style.fit,
                    }),
                ));
            }
            LayerKind::Audio { .. } => AssetKind::Audio,
            LayerKind::Clip { .. } => AssetKind::Clip,
            LayerKind::Text { .. } => AssetKind::Font,
        };
        Some(Self::media(kind, source))
    }

    /// Source reference used in error messages.
    pub fn describe(&self) -> String {
        self.source.display().to_string()
    }
}

/// A fitted image ready for the encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedImage {
    /// Fitted file, or the source itself when no resize was requested.
    pub path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Metadata about an audio or video source.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    /// Source file.
    pub path: PathBuf,
    /// File size.
    pub bytes: u64,
    /// Probed duration; `None` without the `media-ffmpeg` feature.
    pub duration_secs: Option<f64>,
    /// Probed video width.
    pub width: Option<u32>,
    /// Probed video height.
    pub height: Option<u32>,
    /// Whether an audio stream was found.
    pub has_audio: bool,
}

/// A resident asset.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadedAsset {
    /// A fitted still image.
    Image(PreparedImage),
    /// An audio or video source.
    Media(MediaInfo),
    /// A font file.
    Font(PathBuf),
}

impl LoadedAsset {
    /// File the encoder should read.
    pub fn path(&self) -> &Path {
        match self {
            Self::Image(i) => &i.path,
            Self::Media(m) => &m.path,
            Self::Font(p) => p,
        }
    }
}

/// Loads one asset. Implementations must be callable from many worker threads.
pub trait AssetLoader: Send + Sync {
    /// Load the asset named by `key`. Failures should be [`VidstampError::CacheLoad`] so their
    /// transient flag survives.
    fn load(&self, key: &AssetKey) -> VidstampResult<LoadedAsset>;
}

/// Filesystem loader.
///
/// Fitted images are written into `cache_dir` under a name derived from the source path, its
/// size and mtime, and the target box, so later runs reuse earlier preprocessing.
#[derive(Clone, Debug)]
pub struct FsAssetLoader {
    cache_dir: PathBuf,
}

impl FsAssetLoader {
    /// Loader keeping fitted images under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// `vidstamp_asset_cache` under the system temp dir.
    pub fn default_cache_dir() -> PathBuf {
        std::env::temp_dir().join("vidstamp_asset_cache")
    }

    /// Directory holding fitted images.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn prepare_image(
        &self,
        key: &AssetKey,
        meta: &fs::Metadata,
    ) -> VidstampResult<PreparedImage> {
        let Some(resize) = key.resize else {
            let (width, height) = image::image_dimensions(&key.source)
                .map_err(|e| image_error(&key.source, e))?;
            return Ok(PreparedImage {
                path: key.source.clone(),
                width,
                height,
            });
        };

        let cached = self.cache_dir.join(disk_cache_name(key, meta));
        if let Ok((width, height)) = image::image_dimensions(&cached) {
            tracing::debug!(source = %key.source.display(), cached = %cached.display(), "fitted image reused from disk cache");
            return Ok(PreparedImage {
                path: cached,
                width,
                height,
            });
        }

        let src = image::open(&key.source)
            .map_err(|e| image_error(&key.source, e))?
            .to_rgba8();
        let fitted = fit_image(&src, resize);

        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| io_error(&self.cache_dir, "create asset cache dir", &e))?;
        let tmp = self.cache_dir.join(format!(
            ".{}.{}.{}.tmp",
            cached
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fitted
            .save_with_format(&tmp, ImageFormat::Png)
            .map_err(|e| image_error(&tmp, e))?;
        fs::rename(&tmp, &cached).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_error(&cached, "publish fitted image", &e)
        })?;

        Ok(PreparedImage {
            path: cached,
            width: fitted.width(),
            height: fitted.height(),
        })
    }
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

impl AssetLoader for FsAssetLoader {
    fn load(&self, key: &AssetKey) -> VidstampResult<LoadedAsset> {
        let meta = fs::metadata(&key.source).map_err(|e| io_error(&key.source, "open", &e))?;
        if !meta.is_file() {
            return Err(VidstampError::cache_load(
                key.describe(),
                "not a regular file",
                false,
            ));
        }
        if meta.len() == 0 {
            return Err(VidstampError::cache_load(key.describe(), "file is empty", false));
        }

        match key.kind {
            AssetKind::Image => Ok(LoadedAsset::Image(self.prepare_image(key, &meta)?)),
            AssetKind::Audio | AssetKind::Clip => {
                Ok(LoadedAsset::Media(probe_media(&key.source, meta.len())?))
            }
            AssetKind::Font => Ok(LoadedAsset::Font(key.source.clone())),
        }
    }
}

/// Fit `src` into `resize`'s box.
///
/// `Cover` scales to the box height, then center-crops a wider result or pads a narrower one
/// onto black. `Contain` scales to fit entirely and pads the rest.
pub fn fit_image(src: &RgbaImage, resize: Resize) -> RgbaImage {
    let (w, h) = src.dimensions();
    let (bw, bh) = (resize.width.max(1), resize.height.max(1));
    if w == 0 || h == 0 {
        return RgbaImage::from_pixel(bw, bh, Rgba([0, 0, 0, 255]));
    }

    if matches!(resize.fit, Fit::Cover) {
        // Source columns that survive the crop; only those are resampled.
        let keep = scaled(bw, h, bh);
        if keep < u64::from(w) {
            let keep = keep as u32;
            let cropped = imageops::crop_imm(src, (w - keep) / 2, 0, keep, h).to_image();
            return imageops::resize(&cropped, bw, bh, imageops::FilterType::Triangle);
        }
    }

    let (nw, nh) = match resize.fit {
        Fit::Cover => ((scaled(w, bh, h) as u32).min(bw), bh),
        Fit::Contain => {
            let scale = f64::min(f64::from(bw) / f64::from(w), f64::from(bh) / f64::from(h));
            (
                ((f64::from(w) * scale).round() as u32).clamp(1, bw),
                ((f64::from(h) * scale).round() as u32).clamp(1, bh),
            )
        }
    };

    let resized = if (nw, nh) == (w, h) {
        src.clone()
    } else {
        imageops::resize(src, nw, nh, imageops::FilterType::Triangle)
    };
    if (nw, nh) == (bw, bh) {
        return resized;
    }
    let mut canvas = RgbaImage::from_pixel(bw, bh, Rgba([0, 0, 0, 255]));
    imageops::overlay(
        &mut canvas,
        &resized,
        i64::from((bw - nw) / 2),
        i64::from((bh - nh) / 2),
    );
    canvas
}

/// `w * target / h`, rounded, at least 1.
fn scaled(w: u32, target: u32, h: u32) -> u64 {
    ((u64::from(w) * u64::from(target) + u64::from(h) / 2) / u64::from(h)).max(1)
}

fn disk_cache_name(key: &AssetKey, meta: &fs::Metadata) -> String {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let (w, h, fit) = key
        .resize
        .map_or((0, 0, "none"), |r| {
            (
                r.width,
                r.height,
                match r.fit {
                    Fit::Cover => "cover",
                    Fit::Contain => "contain",
                },
            )
        });
    let ident = format!(
        "{}|{}|{mtime}|{w}x{h}|{fit}",
        key.source.display(),
        meta.len()
    );
    format!("{:016x}.png", xxhash_rust::xxh3::xxh3_64(ident.as_bytes()))
}

pub(crate) fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ResourceBusy
    )
}

fn io_error(path: &Path, action: &str, e: &io::Error) -> VidstampError {
    VidstampError::cache_load(
        path.display().to_string(),
        format!("{action}: {e}"),
        is_transient_io(e.kind()),
    )
}

fn image_error(path: &Path, e: image::ImageError) -> VidstampError {
    match e {
        image::ImageError::IoError(io) => io_error(path, "read image", &io),
        other => VidstampError::cache_load(
            path.display().to_string(),
            format!("decode image: {other}"),
            false,
        ),
    }
}

#[cfg(feature = "media-ffmpeg")]
fn probe_media(path: &Path, bytes: u64) -> VidstampResult<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| io_error(path, "run ffprobe", &e))?;
    if !out.status.success() {
        return Err(VidstampError::cache_load(
            path.display().to_string(),
            format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            false,
        ));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout).map_err(|e| {
        VidstampError::cache_load(
            path.display().to_string(),
            format!("ffprobe json parse failed: {e}"),
            false,
        )
    })?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    Ok(MediaInfo {
        path: path.to_path_buf(),
        bytes,
        duration_secs: parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse().ok()),
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        has_audio: parsed
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
fn probe_media(path: &Path, bytes: u64) -> VidstampResult<MediaInfo> {
    Ok(MediaInfo {
        path: path.to_path_buf(),
        bytes,
        duration_secs: None,
        width: None,
        height: None,
        has_audio: false,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/assets/loader.rs"]
mod tests;
