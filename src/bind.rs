//! Data binding: one [`DataRecord`] plus a [`Template`] yields one [`RenderPlan`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::foundation::core::{Canvas, Position, Rgb8, Size};
use crate::foundation::error::{VidstampError, VidstampResult};
use crate::record::DataRecord;
use crate::template::model::{Layer, LayerKind, Template};
use crate::template::placeholder::{NumberRef, Segment, ValueRef};

/// Where bound plans write their output and resolve relative media paths.
#[derive(Clone, Debug)]
pub struct BindContext {
    /// Directory outputs are written to.
    pub output_root: PathBuf,
    /// Output file extension without the dot.
    pub extension: String,
    /// Base directory for relative asset paths (usually the template's directory).
    pub assets_root: PathBuf,
}

impl BindContext {
    /// Context writing `.mp4` files under `output_root`.
    pub fn new(output_root: impl Into<PathBuf>, assets_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            extension: "mp4".to_string(),
            assets_root: assets_root.into(),
        }
    }

    /// Use `extension` (without the dot) for outputs.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Deterministic output path for an item id.
    pub fn output_path_for(&self, item_id: &str) -> PathBuf {
        self.output_root
            .join(format!("{item_id}.{}", self.extension))
    }
}

/// A layer with every placeholder replaced and timing made absolute.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoundLayer {
    /// Layer kind and style.
    #[serde(flatten)]
    pub kind: LayerKind,
    /// Display text for text layers, the source string for media layers.
    pub value: String,
    /// Resolved media file (or font file for text layers).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Start time in seconds.
    pub start: f64,
    /// Visible length in seconds.
    pub duration: f64,
    /// Top-left corner on the canvas.
    pub position: Position,
    /// Box size; `None` fills the canvas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
}

impl BoundLayer {
    /// End time in seconds.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A template fully bound to one record. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderPlan {
    /// Position of the record in the input manifest.
    #[serde(skip)]
    pub index: usize,
    /// Name of the item; also the output file stem.
    pub item_id: String,
    /// Output frame size.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: u32,
    /// Color behind all layers.
    pub background: Rgb8,
    /// Total video length in seconds.
    pub duration: f64,
    /// Layers in paint order.
    pub layers: Vec<BoundLayer>,
    /// Final path of the rendered file.
    pub output_path: PathBuf,
}

/// Stable content hash of a [`RenderPlan`], used to validate prior outputs on re-runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlanFingerprint(pub u64);

impl fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl RenderPlan {
    /// Hash of the plan's canonical JSON. The input index is excluded so reordering a
    /// manifest does not invalidate finished outputs.
    pub fn fingerprint(&self) -> VidstampResult<PlanFingerprint> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| VidstampError::Other(anyhow::anyhow!("serialize plan: {e}")))?;
        Ok(PlanFingerprint(xxhash_rust::xxh3::xxh3_64(&bytes)))
    }
}

/// Item id used to name the output: the record's `id` field, or its manifest index.
pub fn item_id_for(record: &DataRecord, index: usize) -> VidstampResult<String> {
    let Some(id) = record.id() else {
        return Ok(index.to_string());
    };
    let id = id.trim().to_string();
    if id.starts_with('.')
        || id.contains(['/', '\\', '\0'])
        || id.chars().any(char::is_control)
    {
        return Err(VidstampError::validation(format!(
            "record id '{id}' cannot be used as a file name"
        )));
    }
    Ok(id)
}

/// Bind `record` into `template`.
///
/// Deterministic: the same inputs always produce an equal plan. Fails with
/// [`VidstampError::Binding`] when a placeholder has no field, and with
/// [`VidstampError::Validation`] when a bound value is out of range.
#[tracing::instrument(level = "debug", skip(template, record, ctx))]
pub fn bind(
    template: &Template,
    record: &DataRecord,
    index: usize,
    ctx: &BindContext,
) -> VidstampResult<RenderPlan> {
    if let Some(missing) = template
        .placeholder_keys()
        .into_iter()
        .find(|k| !record.contains(k))
    {
        return Err(VidstampError::binding(missing));
    }

    let item_id = item_id_for(record, index)?;

    let mut partial = Vec::with_capacity(template.layers().len());
    for (i, layer) in template.layers().iter().enumerate() {
        partial.push(bind_layer(layer, record, ctx).map_err(|e| prefix_layer(e, i, layer))?);
    }

    let duration = match template.declared_duration() {
        Some(d) => d,
        None => partial
            .iter()
            .filter_map(|(_, start, dur)| dur.map(|d| start + d))
            .fold(None, |acc: Option<f64>, end| Some(acc.map_or(end, |a| a.max(end))))
            .ok_or_else(|| {
                VidstampError::validation(
                    "cannot determine video length: set the template 'duration' or a layer duration",
                )
            })?,
    };

    let mut layers = Vec::with_capacity(partial.len());
    for (i, ((mut bound, start, dur), layer)) in
        partial.into_iter().zip(template.layers()).enumerate()
    {
        if start >= duration {
            return Err(prefix_layer(
                VidstampError::validation(format!(
                    "starts at {start}s, at or after the video end ({duration}s)"
                )),
                i,
                layer,
            ));
        }
        bound.start = start;
        bound.duration = dur.unwrap_or(duration - start).min(duration - start);
        check_fades(&bound).map_err(|e| prefix_layer(e, i, layer))?;
        layers.push(bound);
    }

    Ok(RenderPlan {
        index,
        output_path: ctx.output_path_for(&item_id),
        item_id,
        canvas: template.canvas(),
        fps: template.fps(),
        background: template.background(),
        duration,
        layers,
    })
}

fn prefix_layer(e: VidstampError, i: usize, layer: &Layer) -> VidstampError {
    match e {
        VidstampError::Validation(msg) => {
            VidstampError::validation(format!("layer {i} ({}): {msg}", layer.kind.name()))
        }
        other => other,
    }
}

fn bind_layer(
    layer: &Layer,
    record: &DataRecord,
    ctx: &BindContext,
) -> VidstampResult<(BoundLayer, f64, Option<f64>)> {
    let value = resolve_value(&layer.value, record)?;

    let start = resolve_number(&layer.start, record, "start")?;
    if !(start.is_finite() && start >= 0.0) {
        return Err(VidstampError::validation(format!("start must be >= 0, got {start}")));
    }
    let duration = match &layer.duration {
        Some(d) => {
            let d = resolve_number(d, record, "duration")?;
            if !(d.is_finite() && d > 0.0) {
                return Err(VidstampError::validation(format!(
                    "duration must be > 0, got {d}"
                )));
            }
            Some(d)
        }
        None => None,
    };

    let source = match &layer.kind {
        LayerKind::Text { style } => style
            .font
            .as_deref()
            .map(|f| resolve_path(&ctx.assets_root, f)),
        _ => {
            if value.trim().is_empty() {
                return Err(VidstampError::validation("media source is empty"));
            }
            Some(resolve_path(&ctx.assets_root, value.trim()))
        }
    };

    Ok((
        BoundLayer {
            kind: layer.kind.clone(),
            value,
            source,
            start: 0.0,
            duration: 0.0,
            position: layer.position,
            size: layer.size,
        },
        start,
        duration,
    ))
}

fn resolve_value(value: &ValueRef, record: &DataRecord) -> VidstampResult<String> {
    let field = |k: &str| {
        record
            .get(k)
            .map(ToString::to_string)
            .ok_or_else(|| VidstampError::binding(k))
    };
    match value {
        ValueRef::Literal(s) => Ok(s.clone()),
        ValueRef::Placeholder(k) => field(k),
        ValueRef::Interpolated(segs) => segs
            .iter()
            .map(|s| match s {
                Segment::Literal(t) => Ok(t.clone()),
                Segment::Key(k) => field(k),
            })
            .collect(),
    }
}

fn resolve_number(n: &NumberRef, record: &DataRecord, what: &str) -> VidstampResult<f64> {
    match n {
        NumberRef::Literal(v) => Ok(*v),
        NumberRef::Placeholder(k) => {
            let v = record.get(k).ok_or_else(|| VidstampError::binding(k))?;
            v.as_f64().ok_or_else(|| {
                VidstampError::validation(format!("field '{k}' used as {what} is not a number: '{v}'"))
            })
        }
    }
}

fn resolve_path(root: &Path, value: &str) -> PathBuf {
    let p = Path::new(value);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

fn check_fades(layer: &BoundLayer) -> VidstampResult<()> {
    if let LayerKind::Image { style } | LayerKind::Clip { style } = &layer.kind
        && style.fade_in + style.fade_out > layer.duration
    {
        return Err(VidstampError::validation(format!(
            "fade_in + fade_out ({}s) exceeds the layer duration ({}s)",
            style.fade_in + style.fade_out,
            layer.duration
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/bind.rs"]
mod tests;
