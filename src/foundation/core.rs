use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{VidstampError, VidstampResult};

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Create a canvas; see [`Canvas::validate`] for the accepted range.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions must be non-zero and even (yuv420p output).
    pub fn validate(self) -> VidstampResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VidstampError::validation("canvas width/height must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(VidstampError::validation(
                "canvas width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Named output resolutions for common social-media targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputPreset {
    /// 1080x1080.
    InstagramFeed,
    /// 1080x1920.
    InstagramStory,
    /// 1080x1920.
    InstagramReel,
    /// 1920x1080.
    YoutubeVideo,
    /// 1080x1920.
    YoutubeShorts,
    /// 1200x628.
    FacebookFeed,
    /// 1080x1920.
    FacebookStory,
    /// 1080x1920.
    FacebookReels,
    /// 1080x1920.
    Tiktok,
    /// 1080x1920.
    Portrait,
    /// 1920x1080.
    Landscape,
    /// 800x320 banner.
    Cover,
}

impl OutputPreset {
    /// Every preset, in declaration order.
    pub const ALL: [OutputPreset; 12] = [
        Self::InstagramFeed,
        Self::InstagramStory,
        Self::InstagramReel,
        Self::YoutubeVideo,
        Self::YoutubeShorts,
        Self::FacebookFeed,
        Self::FacebookStory,
        Self::FacebookReels,
        Self::Tiktok,
        Self::Portrait,
        Self::Landscape,
        Self::Cover,
    ];

    /// Output size of the preset.
    pub fn canvas(self) -> Canvas {
        match self {
            Self::InstagramFeed => Canvas::new(1080, 1080),
            Self::InstagramStory
            | Self::InstagramReel
            | Self::YoutubeShorts
            | Self::FacebookStory
            | Self::FacebookReels
            | Self::Tiktok
            | Self::Portrait => Canvas::new(1080, 1920),
            Self::YoutubeVideo | Self::Landscape => Canvas::new(1920, 1080),
            Self::FacebookFeed => Canvas::new(1200, 628),
            Self::Cover => Canvas::new(800, 320),
        }
    }

    /// Kebab-case name accepted by `FromStr` and used in JSON.
    pub fn name(self) -> &'static str {
        match self {
            Self::InstagramFeed => "instagram-feed",
            Self::InstagramStory => "instagram-story",
            Self::InstagramReel => "instagram-reel",
            Self::YoutubeVideo => "youtube-video",
            Self::YoutubeShorts => "youtube-shorts",
            Self::FacebookFeed => "facebook-feed",
            Self::FacebookStory => "facebook-story",
            Self::FacebookReels => "facebook-reels",
            Self::Tiktok => "tiktok",
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
            Self::Cover => "cover",
        }
    }
}

impl FromStr for OutputPreset {
    type Err = VidstampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|p| p.name()).collect();
                VidstampError::config(format!(
                    "unknown output preset '{s}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

impl fmt::Display for OutputPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Straight RGB8 color.
///
/// Accepts `[r, g, b]` or a `"#rrggbb"` string in JSON.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Rgb8(pub [u8; 3]);

impl Rgb8 {
    /// `#000000`.
    pub const BLACK: Rgb8 = Rgb8([0, 0, 0]);
    /// `#ffffff`.
    pub const WHITE: Rgb8 = Rgb8([255, 255, 255]);

    /// Render as ffmpeg's `0xRRGGBB` color syntax.
    pub fn to_ffmpeg(self) -> String {
        let [r, g, b] = self.0;
        format!("0x{r:02X}{g:02X}{b:02X}")
    }

    fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        Some(Self([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl<'de> Deserialize<'de> for Rgb8 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Arr([u8; 3]),
            Hex(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Arr(rgb) => Ok(Self(rgb)),
            Repr::Hex(s) => Self::parse_hex(&s).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid color '{s}' (expected \"#rrggbb\")"))
            }),
        }
    }
}

/// Top-left placement of a layer on the canvas, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Pixels from the left edge.
    pub x: f64,
    /// Pixels from the top edge.
    pub y: f64,
}

/// Explicit layer size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Format seconds the way ffmpeg filter expressions expect them.
pub(crate) fn fmt_secs(secs: f64) -> String {
    let s = format!("{secs:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
