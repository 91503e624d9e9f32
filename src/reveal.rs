use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tiny_skia::{Paint, Pixmap, PremultipliedColorU8, Rect, Transform};

use crate::layout::{
    CanvasBounds, GlyphCoverage, LaidOutWord, PhraseLayout, SHADOW_OFFSET_PX, STROKE_RADIUS_PX,
};
use crate::style::Rgba8;

/// Symmetric slack around a word's spoken interval for the active highlight.
pub const ACTIVE_BUFFER_SECONDS: f64 = 0.05;
pub const HIGHLIGHT_PADDING_PX: f32 = 5.0;
pub const HIGHLIGHT_FILL: Rgba8 = Rgba8::rgb(255, 255, 0);
pub const HIGHLIGHT_TEXT: Rgba8 = Rgba8::BLACK;
const SHADOW: Rgba8 = Rgba8::BLACK;

/// One rendered caption frame, sized to the layout's bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionFrame {
    pixmap: Pixmap,
    bounds: CanvasBounds,
}

impl CaptionFrame {
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Placement of the frame on the virtual canvas.
    pub fn bounds(&self) -> CanvasBounds {
        self.bounds
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Straight (non-premultiplied) RGB, three bytes per pixel.
    pub fn color(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.pixels().len() * 3);
        for pixel in self.pixmap.pixels() {
            let color = pixel.demultiply();
            out.extend_from_slice(&[color.red(), color.green(), color.blue()]);
        }
        out
    }

    pub fn alpha(&self) -> Vec<u8> {
        self.pixmap.pixels().iter().map(|pixel| pixel.alpha()).collect()
    }

    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.pixels().len() * 4);
        for pixel in self.pixmap.pixels() {
            let color = pixel.demultiply();
            out.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
        out
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let image = image::RgbaImage::from_raw(self.width(), self.height(), self.to_rgba())
            .ok_or_else(|| anyhow!("caption buffer does not match {}x{}", self.width(), self.height()))?;
        image
            .save(path)
            .with_context(|| format!("failed to write caption preview {}", path.display()))
    }
}

pub fn word_is_active(word: &LaidOutWord, t: f64) -> bool {
    word.highlight
        && t >= word.active_start - ACTIVE_BUFFER_SECONDS
        && t <= word.active_end + ACTIVE_BUFFER_SECONDS
}

/// Draw the caption as it looks `t` seconds into its window. Glyphs whose
/// reveal time has not come yet stay transparent.
pub fn render_caption(layout: &PhraseLayout, t: f64) -> Result<CaptionFrame> {
    let bounds = layout.bounds;
    let mut pixmap = Pixmap::new(bounds.width, bounds.height).ok_or_else(|| {
        anyhow!(
            "failed to allocate caption pixmap {}x{}",
            bounds.width,
            bounds.height
        )
    })?;

    for word in layout.words() {
        let active = word_is_active(word, t);
        if active {
            fill_highlight(&mut pixmap, word, bounds);
        }

        for glyph in &word.glyphs {
            if t < glyph.reveal_time {
                continue;
            }
            let Some(coverage_index) = glyph.coverage else {
                continue;
            };
            let coverage = layout.coverages.get(coverage_index).ok_or_else(|| {
                anyhow!(
                    "glyph '{}' references missing coverage {coverage_index}",
                    glyph.ch
                )
            })?;
            let x = glyph.x.round() as i32 - bounds.x;
            let y = glyph.y.round() as i32 - bounds.y;

            if active {
                blend_mask(&mut pixmap, &coverage.fill, coverage.width, x, y, HIGHLIGHT_TEXT);
                continue;
            }

            let shadow = SHADOW_OFFSET_PX as i32;
            blend_mask(&mut pixmap, &coverage.fill, coverage.width, x + shadow, y + shadow, SHADOW);
            draw_stroke(&mut pixmap, coverage, x, y, word.stroke);
            blend_mask(&mut pixmap, &coverage.fill, coverage.width, x, y, word.fill);
        }
    }

    Ok(CaptionFrame { pixmap, bounds })
}

fn fill_highlight(pixmap: &mut Pixmap, word: &LaidOutWord, bounds: CanvasBounds) {
    let rect = Rect::from_xywh(
        (word.rect.x - HIGHLIGHT_PADDING_PX).round() - bounds.x as f32,
        (word.rect.y - HIGHLIGHT_PADDING_PX).round() - bounds.y as f32,
        (word.rect.width + 2.0 * HIGHLIGHT_PADDING_PX).round(),
        (word.rect.height + 2.0 * HIGHLIGHT_PADDING_PX).round(),
    );
    let Some(rect) = rect else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color_rgba8(
        HIGHLIGHT_FILL.r,
        HIGHLIGHT_FILL.g,
        HIGHLIGHT_FILL.b,
        HIGHLIGHT_FILL.a,
    );
    paint.anti_alias = false;
    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
}

fn draw_stroke(pixmap: &mut Pixmap, coverage: &GlyphCoverage, x: i32, y: i32, color: Rgba8) {
    let radius = STROKE_RADIUS_PX as i32;
    blend_mask(
        pixmap,
        &coverage.stroke,
        coverage.stroke_width(),
        x - radius,
        y - radius,
        color,
    );
}

/// Source-over a coverage mask in a solid color, integer math only.
fn blend_mask(pixmap: &mut Pixmap, mask: &[u8], mask_width: usize, x: i32, y: i32, color: Rgba8) {
    if mask_width == 0 {
        return;
    }
    let width = pixmap.width() as i32;
    let height = pixmap.height() as i32;
    let pixels = pixmap.pixels_mut();

    for (row, mask_row) in mask.chunks_exact(mask_width).enumerate() {
        let py = y + row as i32;
        if py < 0 || py >= height {
            continue;
        }
        for (col, value) in mask_row.iter().enumerate() {
            let px = x + col as i32;
            if px < 0 || px >= width || *value == 0 {
                continue;
            }

            let alpha = mul_div255(u32::from(*value), u32::from(color.a));
            if alpha == 0 {
                continue;
            }
            let index = (py * width + px) as usize;
            let dst = pixels[index];
            let inverse = 255 - alpha;
            let out_r = mul_div255(u32::from(color.r), alpha) + mul_div255(u32::from(dst.red()), inverse);
            let out_g =
                mul_div255(u32::from(color.g), alpha) + mul_div255(u32::from(dst.green()), inverse);
            let out_b = mul_div255(u32::from(color.b), alpha) + mul_div255(u32::from(dst.blue()), inverse);
            let out_a = alpha + mul_div255(u32::from(dst.alpha()), inverse);

            if let Some(out) = PremultipliedColorU8::from_rgba(
                out_r.min(255) as u8,
                out_g.min(255) as u8,
                out_b.min(255) as u8,
                out_a.min(255) as u8,
            ) {
                pixels[index] = out;
            }
        }
    }
}

fn mul_div255(a: u32, b: u32) -> u32 {
    (a * b + 127) / 255
}
