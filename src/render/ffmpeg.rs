use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::assets::loader::is_transient_io;
use crate::bind::BoundLayer;
use crate::foundation::core::fmt_secs;
use crate::render::backend::{FailureKind, RenderBackend, RenderFailure, RenderJob};
use crate::template::model::{Fit, LayerKind, VisualStyle};

/// Encoder options passed to `ffmpeg`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Executable to run; looked up on `PATH` when not absolute.
    pub program: PathBuf,
    /// `-c:v`, default `libx264`.
    pub video_codec: String,
    /// `-c:a`, default `aac`.
    pub audio_codec: String,
    /// `-preset`, default `ultrafast`.
    pub preset: String,
    /// `-pix_fmt`, default `yuv420p`.
    pub pix_fmt: String,
    /// `-crf`; the codec default when unset.
    pub crf: Option<u8>,
    /// Kill the encoder after this many seconds and report a transient failure.
    pub timeout_secs: Option<u64>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "ultrafast".to_string(),
            pix_fmt: "yuv420p".to_string(),
            crf: None,
            timeout_secs: None,
        }
    }
}

/// Renders plans by spawning the system `ffmpeg` with a generated filter graph.
#[derive(Clone, Debug, Default)]
pub struct FfmpegBackend {
    settings: EncoderSettings,
}

impl FfmpegBackend {
    /// Backend running `ffmpeg` with `settings`.
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    /// Encoder settings in use.
    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Whether the configured encoder can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.settings.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Build the full argument list for `job`.
    pub fn build_args(&self, job: &RenderJob<'_>) -> Result<Vec<OsString>, RenderFailure> {
        let plan = job.plan;
        let s = &self.settings;
        let fps = plan.fps.to_string();

        let mut args: Vec<OsString> = ["-y", "-nostdin", "-loglevel", "error", "-f", "lavfi", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(
            format!(
                "color=c={}:s={}:r={fps}:d={}",
                plan.background.to_ffmpeg(),
                plan.canvas,
                fmt_secs(plan.duration)
            )
            .into(),
        );

        let mut filters: Vec<String> = Vec::new();
        let mut video = "[0:v]".to_string();
        let mut audio: Vec<String> = Vec::new();
        let mut next_input = 1usize;

        if job.assets.len() != plan.layers.len() {
            return Err(RenderFailure::permanent(
                "asset list does not match plan layers",
            ));
        }

        for (i, (layer, asset)) in plan.layers.iter().zip(job.assets).enumerate() {
            let missing = || RenderFailure::permanent(format!("layer {i}: asset not resolved"));
            let window = enable_window(layer);
            match &layer.kind {
                LayerKind::Image { style } => {
                    let asset = asset.as_ref().ok_or_else(missing)?;
                    args.extend(
                        ["-loop", "1", "-framerate", fps.as_str(), "-t"]
                            .into_iter()
                            .map(OsString::from),
                    );
                    args.push(fmt_secs(layer.duration).into());
                    args.push("-i".into());
                    args.push(asset.path().into());
                    filters.push(format!(
                        "[{next_input}:v]format=rgba,setpts=PTS-STARTPTS+{}/TB{}[l{i}]",
                        fmt_secs(layer.start),
                        fade_filters(layer, style)
                    ));
                    filters.push(format!(
                        "{video}[l{i}]overlay=x={}:y={}:{window}[v{i}]",
                        layer.position.x, layer.position.y
                    ));
                    next_input += 1;
                    video = format!("[v{i}]");
                }
                LayerKind::Clip { style } => {
                    let asset = asset.as_ref().ok_or_else(missing)?;
                    args.push("-i".into());
                    args.push(asset.path().into());
                    let (w, h) = layer
                        .size
                        .map_or((plan.canvas.width, plan.canvas.height), |s| (s.width, s.height));
                    let scale = match style.fit {
                        Fit::Cover => format!(
                            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}"
                        ),
                        Fit::Contain => format!(
                            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black"
                        ),
                    };
                    filters.push(format!(
                        "[{next_input}:v]trim=duration={},setpts=PTS-STARTPTS+{}/TB,{scale},format=rgba{}[l{i}]",
                        fmt_secs(layer.duration),
                        fmt_secs(layer.start),
                        fade_filters(layer, style)
                    ));
                    filters.push(format!(
                        "{video}[l{i}]overlay=x={}:y={}:eof_action=pass:{window}[v{i}]",
                        layer.position.x, layer.position.y
                    ));
                    next_input += 1;
                    video = format!("[v{i}]");
                }
                LayerKind::Text { style } => {
                    let font = match asset {
                        Some(a) => format!(
                            ":fontfile={}",
                            escape_filter_value(&a.path().to_string_lossy())
                        ),
                        None => String::new(),
                    };
                    filters.push(format!(
                        "{video}drawtext=text={}:expansion=none:fontsize={}:fontcolor={}:x={}:y={}{font}:{window}[v{i}]",
                        escape_filter_value(&layer.value),
                        style.font_size,
                        style.color.to_ffmpeg(),
                        layer.position.x,
                        layer.position.y
                    ));
                    video = format!("[v{i}]");
                }
                LayerKind::Audio { style } => {
                    let asset = asset.as_ref().ok_or_else(missing)?;
                    if style.looped {
                        args.extend(["-stream_loop", "-1"].into_iter().map(OsString::from));
                    }
                    args.push("-i".into());
                    args.push(asset.path().into());
                    let delay_ms = (layer.start * 1000.0).round() as u64;
                    filters.push(format!(
                        "[{next_input}:a]atrim=0:{},asetpts=PTS-STARTPTS,volume={},adelay={delay_ms}|{delay_ms}[a{i}]",
                        fmt_secs(layer.duration),
                        style.volume
                    ));
                    next_input += 1;
                    audio.push(format!("[a{i}]"));
                }
            }
        }

        let audio_out = match audio.len() {
            0 => None,
            1 => audio.pop(),
            n => {
                filters.push(format!(
                    "{}amix=inputs={n}:duration=longest[aout]",
                    audio.concat()
                ));
                Some("[aout]".to_string())
            }
        };

        if !filters.is_empty() {
            args.push("-filter_complex".into());
            args.push(filters.join(";").into());
        }
        args.push("-map".into());
        args.push(if video == "[0:v]" { "0:v".into() } else { video.into() });
        if let Some(a) = audio_out.as_ref() {
            args.push("-map".into());
            args.push(a.into());
        }

        args.extend(
            [
                "-c:v",
                s.video_codec.as_str(),
                "-preset",
                s.preset.as_str(),
                "-pix_fmt",
                s.pix_fmt.as_str(),
                "-r",
                fps.as_str(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        if let Some(crf) = s.crf {
            args.push("-crf".into());
            args.push(crf.to_string().into());
        }
        if audio_out.is_some() {
            args.push("-c:a".into());
            args.push(s.audio_codec.as_str().into());
        } else {
            args.push("-an".into());
        }
        args.push("-t".into());
        args.push(fmt_secs(plan.duration).into());

        let ext = plan
            .output_path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        if matches!(ext.as_deref(), Some("mp4" | "mov" | "m4v")) {
            args.extend(["-movflags", "+faststart"].into_iter().map(OsString::from));
        }
        args.push(job.output_path.into());
        Ok(args)
    }
}

impl RenderBackend for FfmpegBackend {
    fn render(&self, job: &RenderJob<'_>) -> Result<(), RenderFailure> {
        let args = self.build_args(job)?;

        let mut child = Command::new(&self.settings.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                let msg = format!(
                    "failed to spawn '{}' (is it installed and on PATH?): {e}",
                    self.settings.program.display()
                );
                if is_transient_io(e.kind()) {
                    RenderFailure::transient(msg)
                } else {
                    RenderFailure::permanent(msg)
                }
            })?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderFailure::permanent("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok::<_, std::io::Error>(bytes)
        });

        let started = Instant::now();
        let timeout = self.settings.timeout_secs.map(Duration::from_secs);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    return Err(RenderFailure::transient(format!(
                        "failed to wait for ffmpeg: {e}"
                    )));
                }
            }
            if let Some(limit) = timeout
                && started.elapsed() > limit
            {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RenderFailure::transient(format!(
                    "ffmpeg timed out after {}s",
                    limit.as_secs()
                )));
            }
            std::thread::sleep(Duration::from_millis(20));
        };

        let stderr_bytes = stderr_drain
            .join()
            .map_err(|_| RenderFailure::permanent("ffmpeg stderr reader panicked"))?
            .unwrap_or_default();

        if status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&stderr_bytes);
        let stderr = stderr.trim();
        let kind = classify_failure(stderr, status.code());
        Err(RenderFailure {
            kind,
            message: format!("ffmpeg exited with status {status}: {stderr}"),
        })
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Exit without a code means the encoder was killed; resource exhaustion may clear up too.
pub fn classify_failure(stderr: &str, code: Option<i32>) -> FailureKind {
    const TRANSIENT_MARKERS: [&str; 4] = [
        "Resource temporarily unavailable",
        "Cannot allocate memory",
        "Device or resource busy",
        "Too many open files",
    ];
    if code.is_none() || TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m)) {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

fn enable_window(layer: &BoundLayer) -> String {
    format!(
        "enable='between(t,{},{})'",
        fmt_secs(layer.start),
        fmt_secs(layer.end())
    )
}

fn fade_filters(layer: &BoundLayer, style: &VisualStyle) -> String {
    let mut out = String::new();
    if style.fade_in > 0.0 {
        out.push_str(&format!(
            ",fade=t=in:st={}:d={}:alpha=1",
            fmt_secs(layer.start),
            fmt_secs(style.fade_in)
        ));
    }
    if style.fade_out > 0.0 {
        out.push_str(&format!(
            ",fade=t=out:st={}:d={}:alpha=1",
            fmt_secs(layer.end() - style.fade_out),
            fmt_secs(style.fade_out)
        ));
    }
    out
}

/// Escape a value for use as a filter option inside `-filter_complex`.
///
/// Two levels: the option parser (`\`, `'`, `:`), then the graph parser (`\`, `'`, `[`, `]`,
/// `,`, `;`).
pub fn escape_filter_value(v: &str) -> String {
    let mut level1 = String::with_capacity(v.len());
    for c in v.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            level1.push('\\');
        }
        level1.push(c);
    }
    let mut level2 = String::with_capacity(level1.len());
    for c in level1.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            level2.push('\\');
        }
        level2.push(c);
    }
    level2
}

#[cfg(test)]
#[path = "../../tests/unit/render/ffmpeg.rs"]
mod tests;
