use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Output orientation. Each format fixes the frame size and the caption
/// defaults that go with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Short,
    Long,
}

pub const SAFE_WIDTH_FRACTION: f32 = 0.8;

impl VideoFormat {
    pub fn from_keyword(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "short" | "shorts" | "vertical" => Ok(Self::Short),
            "long" | "horizontal" => Ok(Self::Long),
            _ => Err(anyhow!(
                "invalid video format '{value}' (expected one of: short, long)"
            )),
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
        }
    }

    pub fn dimensions_px(self) -> (u32, u32) {
        match self {
            Self::Short => (1080, 1920),
            Self::Long => (1920, 1080),
        }
    }

    pub fn base_font_px(self) -> f32 {
        match self {
            Self::Short => 100.0,
            Self::Long => 90.0,
        }
    }

    pub fn default_max_words(self) -> usize {
        match self {
            Self::Short => 3,
            Self::Long => 5,
        }
    }

    /// Widest a caption line may grow before wrapping.
    pub fn safe_width_px(self) -> f32 {
        let (width, _) = self.dimensions_px();
        width as f32 * SAFE_WIDTH_FRACTION
    }

    pub fn frame(self) -> FrameSpec {
        let (width, height) = self.dimensions_px();
        FrameSpec {
            width,
            height,
            base_font_px: self.base_font_px(),
            safe_width_fraction: SAFE_WIDTH_FRACTION,
        }
    }
}

/// Virtual canvas a caption or headline is laid out on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub base_font_px: f32,
    pub safe_width_fraction: f32,
}

impl FrameSpec {
    pub fn safe_width(&self) -> f32 {
        self.width as f32 * self.safe_width_fraction
    }
}
