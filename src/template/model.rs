use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{Canvas, OutputPreset, Position, Rgb8, Size};
use crate::foundation::error::{VidstampError, VidstampResult};
use crate::template::placeholder::{NumberRef, ValueRef};

/// How a visual source is fitted into its target box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fit {
    /// Scale to the box height, then center-crop or pad the width.
    #[default]
    Cover,
    /// Scale to fit inside the box and letterbox the remainder.
    Contain,
}

/// Text layer styling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Point size, default 48.
    pub font_size: f64,
    /// Fill color, default white.
    pub color: Rgb8,
    /// Font file; `None` uses ffmpeg's default font.
    pub font: Option<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            color: Rgb8::WHITE,
            font: None,
        }
    }
}

/// Image and clip layer styling.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualStyle {
    /// Fade-in length in seconds.
    pub fade_in: f64,
    /// Fade-out length in seconds.
    pub fade_out: f64,
    /// How the source fills its box.
    pub fit: Fit,
}

/// Audio layer mixing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioStyle {
    /// Linear gain, default 1.
    pub volume: f64,
    /// Loop the source to fill the layer duration instead of stopping when it ends.
    #[serde(rename = "loop")]
    pub looped: bool,
}

impl Default for AudioStyle {
    fn default() -> Self {
        Self {
            volume: 1.0,
            looped: false,
        }
    }
}

/// Closed set of layer kinds, each carrying its own style.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerKind {
    /// Drawn text.
    Text {
        /// Font and color.
        #[serde(default)]
        style: TextStyle,
    },
    /// Still image.
    Image {
        /// Fades and fit.
        #[serde(default)]
        style: VisualStyle,
    },
    /// Audio track mixed into the output.
    Audio {
        /// Volume and looping.
        #[serde(default)]
        style: AudioStyle,
    },
    /// Video clip overlay.
    Clip {
        /// Fades and fit.
        #[serde(default)]
        style: VisualStyle,
    },
}

impl LayerKind {
    /// Lowercase kind name as written in templates.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Audio { .. } => "audio",
            Self::Clip { .. } => "clip",
        }
    }

    /// Whether the layer value names a media file rather than display text.
    pub fn is_media(&self) -> bool {
        !matches!(self, Self::Text { .. })
    }
}

/// One layer of a template timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Kind and style.
    #[serde(flatten)]
    pub kind: LayerKind,
    /// Display text for text layers, source path for media layers.
    pub value: ValueRef,
    /// Start time in seconds.
    #[serde(default)]
    pub start: NumberRef,
    /// Duration in seconds; `None` runs to the end of the video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<NumberRef>,
    /// Top-left corner on the canvas.
    #[serde(default)]
    pub position: Position,
    /// Target box; `None` uses the full canvas for visual layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
}

impl Layer {
    fn placeholder_keys(&self) -> impl Iterator<Item = &str> {
        self.value
            .keys()
            .into_iter()
            .chain(self.start.key())
            .chain(self.duration.as_ref().and_then(NumberRef::key))
    }
}

fn default_version() -> String {
    "1".to_string()
}

fn default_fps() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateDef {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    canvas: Option<Canvas>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preset: Option<OutputPreset>,
    #[serde(default = "default_fps")]
    fps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(default)]
    background: Rgb8,
    layers: Vec<Layer>,
}

/// A loaded, validated video template.
///
/// Templates are immutable once loaded: the same value is shared read-only by every bind in a
/// batch. Overrides such as [`Template::with_preset`] produce a new template.
#[derive(Debug, Clone)]
pub struct Template {
    def: TemplateDef,
}

impl Template {
    /// Parse and validate a template from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> VidstampResult<Self> {
        let def: TemplateDef = serde_json::from_reader(r)
            .map_err(|e| VidstampError::template(format!("parse template JSON: {e}")))?;
        let t = Self { def };
        t.validate()?;
        Ok(t)
    }

    /// Parse and validate a template from a JSON string.
    pub fn from_json_str(s: &str) -> VidstampResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Parse and validate a template from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> VidstampResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            VidstampError::template(format!("open template '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Check structural invariants. Every failure is a [`VidstampError::Template`].
    pub fn validate(&self) -> VidstampResult<()> {
        let def = &self.def;
        if def.version != "1" {
            return Err(VidstampError::template(format!(
                "unsupported template version '{}' (expected \"1\")",
                def.version
            )));
        }
        if def.canvas.is_some() && def.preset.is_some() {
            return Err(VidstampError::template(
                "template sets both 'canvas' and 'preset'; pick one",
            ));
        }
        self.canvas()
            .validate()
            .map_err(|e| VidstampError::template(e.to_string()))?;
        if def.fps == 0 || def.fps > 240 {
            return Err(VidstampError::template("fps must be in 1..=240"));
        }
        if let Some(d) = def.duration
            && !(d.is_finite() && d > 0.0)
        {
            return Err(VidstampError::template("template duration must be > 0"));
        }
        if def.layers.is_empty() {
            return Err(VidstampError::template("template has no layers"));
        }
        if !def
            .layers
            .iter()
            .any(|l| !matches!(l.kind, LayerKind::Audio { .. }))
        {
            return Err(VidstampError::template(
                "template needs at least one visual (text, image or clip) layer",
            ));
        }

        for (i, layer) in def.layers.iter().enumerate() {
            validate_layer(layer).map_err(|msg| {
                VidstampError::template(format!("layer {i} ({}): {msg}", layer.kind.name()))
            })?;
        }
        Ok(())
    }

    /// Every placeholder key referenced by any layer.
    pub fn placeholder_keys(&self) -> BTreeSet<String> {
        self.def
            .layers
            .iter()
            .flat_map(Layer::placeholder_keys)
            .map(str::to_string)
            .collect()
    }

    /// Return a copy rendered at `preset`'s resolution.
    pub fn with_preset(&self, preset: OutputPreset) -> Self {
        let mut def = self.def.clone();
        def.canvas = None;
        def.preset = Some(preset);
        Self { def }
    }

    /// Output size: explicit canvas, else the preset, else 1920x1080.
    pub fn canvas(&self) -> Canvas {
        match (self.def.canvas, self.def.preset) {
            (Some(c), _) => c,
            (None, Some(p)) => p.canvas(),
            (None, None) => OutputPreset::Landscape.canvas(),
        }
    }

    /// Output frame rate.
    pub fn fps(&self) -> u32 {
        self.def.fps
    }

    /// Video length set in the template, if any.
    pub fn declared_duration(&self) -> Option<f64> {
        self.def.duration
    }

    /// Background color.
    pub fn background(&self) -> Rgb8 {
        self.def.background
    }

    /// Layers in paint order.
    pub fn layers(&self) -> &[Layer] {
        &self.def.layers
    }

    /// Serialize back to pretty JSON.
    pub fn to_json_pretty(&self) -> VidstampResult<String> {
        serde_json::to_string_pretty(&self.def)
            .map_err(|e| VidstampError::template(format!("serialize template: {e}")))
    }
}

fn validate_layer(layer: &Layer) -> Result<(), String> {
    if let NumberRef::Literal(s) = layer.start
        && !(s.is_finite() && s >= 0.0)
    {
        return Err("start must be >= 0".to_string());
    }
    if let Some(NumberRef::Literal(d)) = layer.duration
        && !(d.is_finite() && d > 0.0)
    {
        return Err("duration must be > 0".to_string());
    }
    if let ValueRef::Literal(v) = &layer.value
        && v.trim().is_empty()
    {
        return Err("value must not be empty".to_string());
    }
    if let Some(size) = layer.size
        && (size.width == 0 || size.height == 0)
    {
        return Err("size width/height must be non-zero".to_string());
    }

    match &layer.kind {
        LayerKind::Text { style } => {
            if !(style.font_size.is_finite() && style.font_size > 0.0) {
                return Err("font_size must be > 0".to_string());
            }
            if style.font.as_deref().is_some_and(|f| f.trim().is_empty()) {
                return Err("font must not be empty when set".to_string());
            }
        }
        LayerKind::Image { style } | LayerKind::Clip { style } => {
            if !(style.fade_in >= 0.0 && style.fade_out >= 0.0) {
                return Err("fade_in/fade_out must be >= 0".to_string());
            }
            if let Some(NumberRef::Literal(d)) = layer.duration
                && style.fade_in + style.fade_out > d
            {
                return Err("fade_in + fade_out exceeds the layer duration".to_string());
            }
        }
        LayerKind::Audio { style } => {
            if !(style.volume.is_finite() && style.volume >= 0.0) {
                return Err("volume must be >= 0".to_string());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/template/model.rs"]
mod tests;
