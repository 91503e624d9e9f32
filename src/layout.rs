use std::collections::HashMap;

use crate::format::FrameSpec;
use crate::phrase::{Phrase, StyledWord};
use crate::style::Rgba8;

pub const WORD_SPACING_PX: f32 = 35.0;
pub const LINE_SPACING_PX: f32 = 60.0;
pub const PADDING_PX: f32 = 40.0;
pub const SHADOW_OFFSET_PX: f32 = 6.0;
pub const STROKE_RADIUS_PX: usize = 6;
pub const MIN_CANVAS_PX: u32 = 100;

/// Coverage mask for one glyph. `xmin` is the offset from the pen position to
/// the left edge, `ymin` the offset from the baseline up to the bottom edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphBitmap {
    pub width: usize,
    pub height: usize,
    pub xmin: i32,
    pub ymin: i32,
    pub coverage: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub ascent: f32,
    pub descent: f32,
}

impl LineMetrics {
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }
}

/// Where glyph shapes and metrics come from.
pub trait GlyphSource {
    fn advance(&self, ch: char, px: f32) -> f32;
    fn line_metrics(&self, px: f32) -> LineMetrics;
    fn rasterize(&self, ch: char, px: f32) -> GlyphBitmap;
}

/// Fixed-metric glyphs: every visible character is a solid block. Used for
/// dry runs and anywhere a real font file is not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxGlyphs;

impl GlyphSource for BoxGlyphs {
    fn advance(&self, _ch: char, px: f32) -> f32 {
        px * 0.6
    }

    fn line_metrics(&self, px: f32) -> LineMetrics {
        LineMetrics {
            ascent: px * 0.8,
            descent: px * 0.2,
        }
    }

    fn rasterize(&self, ch: char, px: f32) -> GlyphBitmap {
        if ch.is_whitespace() {
            return GlyphBitmap {
                width: 0,
                height: 0,
                xmin: 0,
                ymin: 0,
                coverage: Vec::new(),
            };
        }
        let width = (px * 0.5).round().max(1.0) as usize;
        let height = (px * 0.7).round().max(1.0) as usize;
        GlyphBitmap {
            width,
            height,
            xmin: (px * 0.05).round() as i32,
            ymin: 0,
            coverage: vec![255; width * height],
        }
    }
}

/// A word ready for layout: text, size and color are final, times are
/// relative to the owning window.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutWord {
    pub text: String,
    pub font_px: f32,
    pub fill: Rgba8,
    pub stroke: Rgba8,
    pub start: f64,
    pub duration: f64,
    pub highlight: bool,
    pub break_before: bool,
}

impl LayoutWord {
    pub fn caption(styled: &StyledWord, base_font_px: f32, window_start: f64, highlight: bool) -> Self {
        Self {
            text: styled.word.text.clone(),
            font_px: base_font_px * styled.style.size_multiplier,
            fill: styled.style.fill,
            stroke: styled.style.stroke,
            start: styled.word.start - window_start,
            duration: styled.word.duration,
            highlight,
            break_before: false,
        }
    }

    /// Static text shown in full from t = 0.
    pub fn headline(text: impl Into<String>, font_px: f32, fill: Rgba8, break_before: bool) -> Self {
        Self {
            text: text.into(),
            font_px,
            fill,
            stroke: Rgba8::BLACK,
            start: 0.0,
            duration: 0.0,
            highlight: false,
            break_before,
        }
    }
}

/// Fill coverage plus the stroke coverage dilated by [`STROKE_RADIUS_PX`]
/// on every side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphCoverage {
    pub width: usize,
    pub height: usize,
    pub fill: Vec<u8>,
    pub stroke: Vec<u8>,
}

impl GlyphCoverage {
    pub fn stroke_width(&self) -> usize {
        self.width + 2 * STROKE_RADIUS_PX
    }

    pub fn stroke_height(&self) -> usize {
        self.height + 2 * STROKE_RADIUS_PX
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionedGlyph {
    pub ch: char,
    /// Top-left of the fill bitmap on the virtual canvas.
    pub x: f32,
    pub y: f32,
    pub reveal_time: f64,
    pub coverage: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutWord {
    pub text: String,
    pub glyphs: Vec<PositionedGlyph>,
    pub rect: WordRect,
    pub fill: Rgba8,
    pub stroke: Rgba8,
    pub active_start: f64,
    pub active_end: f64,
    pub highlight: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutLine {
    pub words: Vec<LaidOutWord>,
    pub width: f32,
    pub height: f32,
    pub top: f32,
}

/// The render canvas, in virtual-canvas pixels. Always even-sized and at
/// least [`MIN_CANVAS_PX`] square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhraseLayout {
    pub lines: Vec<LaidOutLine>,
    pub coverages: Vec<GlyphCoverage>,
    pub bounds: CanvasBounds,
    pub frame: FrameSpec,
}

impl PhraseLayout {
    pub fn glyph_count(&self) -> usize {
        self.lines
            .iter()
            .flat_map(|line| &line.words)
            .map(|word| word.glyphs.len())
            .sum()
    }

    pub fn words(&self) -> impl Iterator<Item = &LaidOutWord> {
        self.lines.iter().flat_map(|line| line.words.iter())
    }
}

pub fn layout_phrase(
    phrase: &Phrase,
    glyphs: &dyn GlyphSource,
    frame: &FrameSpec,
    highlight: bool,
) -> PhraseLayout {
    let words = phrase
        .words
        .iter()
        .map(|styled| LayoutWord::caption(styled, frame.base_font_px, phrase.window_start, highlight))
        .collect::<Vec<_>>();
    layout_words(&words, glyphs, frame)
}

struct MeasuredWord<'a> {
    word: &'a LayoutWord,
    chars: Vec<char>,
    advances: Vec<f32>,
    /// Ink left of the pen start, pushed right so it stays inside the word box.
    lead: f32,
    /// Box width covering both the advances and the glyph ink.
    width: f32,
    metrics: LineMetrics,
}

fn measure_word<'a>(
    word: &'a LayoutWord,
    glyphs: &dyn GlyphSource,
    cache: &mut CoverageCache<'_>,
) -> MeasuredWord<'a> {
    let chars = word.text.chars().collect::<Vec<_>>();
    let advances = chars
        .iter()
        .map(|ch| glyphs.advance(*ch, word.font_px))
        .collect::<Vec<_>>();

    let mut ink_left = 0.0_f32;
    let mut ink_right = 0.0_f32;
    let mut pen = 0.0_f32;
    for (ch, advance) in chars.iter().zip(&advances) {
        if let Some((coverage_index, xmin, _)) = cache.get(*ch, word.font_px) {
            let left = pen + xmin as f32;
            ink_left = ink_left.min(left);
            ink_right = ink_right.max(left + cache.coverages[coverage_index].width as f32);
        }
        pen += advance;
    }

    let lead = -ink_left;
    MeasuredWord {
        word,
        chars,
        advances,
        lead,
        width: lead + pen.max(ink_right),
        metrics: glyphs.line_metrics(word.font_px),
    }
}

struct CoverageCache<'a> {
    glyphs: &'a dyn GlyphSource,
    index: HashMap<(char, u32), Option<(usize, i32, i32)>>,
    coverages: Vec<GlyphCoverage>,
}

impl CoverageCache<'_> {
    /// Index into `coverages` plus the bitmap offsets; `None` for blank glyphs.
    fn get(&mut self, ch: char, px: f32) -> Option<(usize, i32, i32)> {
        if let Some(entry) = self.index.get(&(ch, px.to_bits())) {
            return *entry;
        }

        let bitmap = self.glyphs.rasterize(ch, px);
        let entry = if bitmap.width == 0 || bitmap.height == 0 {
            None
        } else {
            let stroke = dilate(&bitmap.coverage, bitmap.width, bitmap.height, STROKE_RADIUS_PX);
            self.coverages.push(GlyphCoverage {
                width: bitmap.width,
                height: bitmap.height,
                fill: bitmap.coverage,
                stroke,
            });
            Some((self.coverages.len() - 1, bitmap.xmin, bitmap.ymin))
        };
        self.index.insert((ch, px.to_bits()), entry);
        entry
    }
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

impl Extent {
    fn empty() -> Self {
        Self {
            min_x: f32::INFINITY,
            min_y: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            max_y: f32::NEG_INFINITY,
        }
    }

    fn include(&mut self, x0: f32, y0: f32, x1: f32, y1: f32) {
        self.min_x = self.min_x.min(x0);
        self.min_y = self.min_y.min(y0);
        self.max_x = self.max_x.max(x1);
        self.max_y = self.max_y.max(y1);
    }

    fn is_empty(&self) -> bool {
        !(self.max_x > self.min_x && self.max_y > self.min_y)
    }
}

/// Greedy wrapped, centered layout on the frame's virtual canvas.
pub fn layout_words(words: &[LayoutWord], glyphs: &dyn GlyphSource, frame: &FrameSpec) -> PhraseLayout {
    let safe_width = frame.safe_width();
    let mut cache = CoverageCache {
        glyphs,
        index: HashMap::new(),
        coverages: Vec::new(),
    };
    let mut measured = Vec::with_capacity(words.len());
    for word in words.iter().filter(|word| !word.text.trim().is_empty()) {
        measured.push(measure_word(word, glyphs, &mut cache));
    }

    let mut line_groups: Vec<Vec<&MeasuredWord>> = Vec::new();
    let mut current: Vec<&MeasuredWord> = Vec::new();
    let mut current_width = 0.0_f32;
    for word in &measured {
        let fits = current_width + WORD_SPACING_PX + word.width <= safe_width;
        if !current.is_empty() && (word.word.break_before || !fits) {
            line_groups.push(std::mem::take(&mut current));
            current_width = 0.0;
        }
        current_width = if current.is_empty() {
            word.width
        } else {
            current_width + WORD_SPACING_PX + word.width
        };
        current.push(word);
    }
    if !current.is_empty() {
        line_groups.push(current);
    }

    let line_sizes = line_groups
        .iter()
        .map(|group| {
            let width = group.iter().map(|word| word.width).sum::<f32>()
                + WORD_SPACING_PX * group.len().saturating_sub(1) as f32;
            let height = group
                .iter()
                .map(|word| word.metrics.height())
                .fold(0.0_f32, f32::max);
            (width, height)
        })
        .collect::<Vec<_>>();
    let block_height = line_sizes.iter().map(|(_, height)| height).sum::<f32>()
        + LINE_SPACING_PX * line_sizes.len().saturating_sub(1) as f32;

    let canvas_width = frame.width as f32;
    let canvas_height = frame.height as f32;
    let mut extent = Extent::empty();
    let mut lines = Vec::with_capacity(line_groups.len());
    let mut line_top = ((canvas_height - block_height) / 2.0).floor();

    for (group, (line_width, line_height)) in line_groups.iter().zip(&line_sizes) {
        let mut pen_x = ((canvas_width - line_width) / 2.0).floor();
        let mut laid_words = Vec::with_capacity(group.len());

        for measured_word in group {
            let word = measured_word.word;
            let word_height = measured_word.metrics.height();
            let word_top = line_top + ((line_height - word_height) / 2.0).floor();
            let baseline = word_top + measured_word.metrics.ascent;
            let char_count = measured_word.chars.len().max(1);
            let per_char = word.duration / char_count as f64;

            let mut glyph_x = pen_x + measured_word.lead;
            let mut positioned = Vec::with_capacity(measured_word.chars.len());
            for (index, (ch, advance)) in measured_word
                .chars
                .iter()
                .zip(&measured_word.advances)
                .enumerate()
            {
                extent.include(glyph_x, word_top, glyph_x + advance, word_top + word_height);

                let (coverage, x, y) = match cache.get(*ch, word.font_px) {
                    Some((coverage_index, xmin, ymin)) => {
                        let bitmap = &cache.coverages[coverage_index];
                        let x = glyph_x + xmin as f32;
                        let y = baseline - ymin as f32 - bitmap.height as f32;
                        extent.include(x, y, x + bitmap.width as f32, y + bitmap.height as f32);
                        (Some(coverage_index), x, y)
                    }
                    None => (None, glyph_x, word_top),
                };

                positioned.push(PositionedGlyph {
                    ch: *ch,
                    x,
                    y,
                    reveal_time: word.start + index as f64 * per_char,
                    coverage,
                });
                glyph_x += advance;
            }

            laid_words.push(LaidOutWord {
                text: word.text.clone(),
                glyphs: positioned,
                rect: WordRect {
                    x: pen_x,
                    y: word_top,
                    width: measured_word.width,
                    height: word_height,
                },
                fill: word.fill,
                stroke: word.stroke,
                active_start: word.start,
                active_end: word.start + word.duration,
                highlight: word.highlight,
            });
            pen_x += measured_word.width + WORD_SPACING_PX;
        }

        lines.push(LaidOutLine {
            words: laid_words,
            width: *line_width,
            height: *line_height,
            top: line_top,
        });
        line_top += line_height + LINE_SPACING_PX;
    }

    PhraseLayout {
        lines,
        coverages: cache.coverages,
        bounds: canvas_bounds(&extent, frame),
        frame: *frame,
    }
}

fn canvas_bounds(extent: &Extent, frame: &FrameSpec) -> CanvasBounds {
    if extent.is_empty() {
        let floor = MIN_CANVAS_PX as i32;
        return CanvasBounds {
            x: (frame.width as i32 - floor) / 2,
            y: (frame.height as i32 - floor) / 2,
            width: MIN_CANVAS_PX,
            height: MIN_CANVAS_PX,
        };
    }

    let min_x = (extent.min_x - PADDING_PX).floor() as i32;
    let min_y = (extent.min_y - PADDING_PX).floor() as i32;
    let max_x = (extent.max_x + PADDING_PX + SHADOW_OFFSET_PX).ceil() as i32;
    let max_y = (extent.max_y + PADDING_PX + SHADOW_OFFSET_PX).ceil() as i32;

    let (x, width) = grow_span(min_x, (max_x - min_x).max(0) as u32);
    let (y, height) = grow_span(min_y, (max_y - min_y).max(0) as u32);
    CanvasBounds {
        x,
        y,
        width,
        height,
    }
}

/// Apply the size floor around the span's center, then round up to even.
fn grow_span(start: i32, length: u32) -> (i32, u32) {
    let (start, length) = if length < MIN_CANVAS_PX {
        let grow = MIN_CANVAS_PX - length;
        (start - (grow / 2) as i32, MIN_CANVAS_PX)
    } else {
        (start, length)
    };
    (start, length + length % 2)
}

/// Square max filter, done as a horizontal then a vertical pass. The output
/// is `radius` pixels larger than the input on every side.
pub fn dilate(coverage: &[u8], width: usize, height: usize, radius: usize) -> Vec<u8> {
    let out_width = width + 2 * radius;
    let out_height = height + 2 * radius;
    if width == 0 || height == 0 {
        return vec![0; out_width * out_height];
    }

    let mut horizontal = vec![0u8; out_width * height];
    for y in 0..height {
        let row = &coverage[y * width..(y + 1) * width];
        for x in 0..out_width {
            let lo = x.saturating_sub(2 * radius);
            let hi = x.min(width - 1);
            if lo <= hi {
                horizontal[y * out_width + x] = row[lo..=hi].iter().copied().max().unwrap_or(0);
            }
        }
    }

    let mut out = vec![0u8; out_width * out_height];
    for y in 0..out_height {
        let lo = y.saturating_sub(2 * radius);
        let hi = y.min(height - 1);
        if lo > hi {
            continue;
        }
        for x in 0..out_width {
            out[y * out_width + x] = (lo..=hi)
                .map(|source_y| horizontal[source_y * out_width + x])
                .max()
                .unwrap_or(0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{dilate, layout_phrase, layout_words, BoxGlyphs, LayoutWord, MIN_CANVAS_PX};
    use crate::format::VideoFormat;
    use crate::phrase::{chunk_phrases, style_words};
    use crate::style::{Rgba8, StyleTable};
    use crate::timing::{TimedWord, TimingSource};

    fn words(texts: &[&str], font_px: f32) -> Vec<LayoutWord> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| LayoutWord {
                text: (*text).to_owned(),
                font_px,
                fill: Rgba8::WHITE,
                stroke: Rgba8::BLACK,
                start: index as f64 * 0.5,
                duration: 0.5,
                highlight: true,
                break_before: false,
            })
            .collect()
    }

    #[test]
    fn lines_respect_safe_width() {
        let frame = VideoFormat::Short.frame();
        let layout = layout_words(
            &words(&["one", "two", "three", "four", "five", "six", "seven"], 100.0),
            &BoxGlyphs,
            &frame,
        );
        assert!(layout.lines.len() > 1);
        for line in &layout.lines {
            if line.words.len() > 1 {
                assert!(line.width <= frame.safe_width(), "line too wide: {}", line.width);
            }
        }
    }

    #[test]
    fn oversized_word_gets_its_own_line() {
        let frame = VideoFormat::Short.frame();
        let layout = layout_words(
            &words(&["a", "supercalifragilistic", "b"], 100.0),
            &BoxGlyphs,
            &frame,
        );
        let per_line = layout
            .lines
            .iter()
            .map(|line| line.words.len())
            .collect::<Vec<_>>();
        assert_eq!(per_line, [1, 1, 1]);
        assert!(layout.lines[1].width > frame.safe_width());
    }

    #[test]
    fn lines_are_centered_horizontally() {
        let frame = VideoFormat::Long.frame();
        let layout = layout_words(&words(&["centered"], 90.0), &BoxGlyphs, &frame);
        let word = &layout.lines[0].words[0];
        let left = word.rect.x;
        let right = frame.width as f32 - (word.rect.x + word.rect.width);
        assert!((left - right).abs() <= 1.0);
    }

    #[test]
    fn block_is_vertically_centered_with_line_gaps() {
        let frame = VideoFormat::Short.frame();
        let mut input = words(&["top", "bottom"], 100.0);
        input[1].break_before = true;
        let layout = layout_words(&input, &BoxGlyphs, &frame);
        assert_eq!(layout.lines.len(), 2);
        let gap = layout.lines[1].top - (layout.lines[0].top + layout.lines[0].height);
        assert_eq!(gap, 60.0);
        let block_bottom = layout.lines[1].top + layout.lines[1].height;
        let above = layout.lines[0].top;
        let below = frame.height as f32 - block_bottom;
        assert!((above - below).abs() <= 1.0);
    }

    #[test]
    fn reveal_times_span_one_word_duration() {
        let frame = VideoFormat::Short.frame();
        let timing = TimingSource::new(vec![
            TimedWord::new("Hello", 10.0, 1.0),
            TimedWord::new("there", 11.0, 0.5),
        ]);
        let styled = style_words(&timing, &StyleTable::default(), None);
        let phrase = &chunk_phrases(&styled, 3, 0.5)[0];
        let layout = layout_phrase(phrase, &BoxGlyphs, &frame, true);

        let first = &layout.lines[0].words[0];
        let times = first.glyphs.iter().map(|glyph| glyph.reveal_time).collect::<Vec<_>>();
        assert_eq!(times[0], 0.0);
        assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!((times[4] - 0.8).abs() < 1e-9);
        let second = &layout.lines[0].words[1];
        assert!((second.glyphs[0].reveal_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bounds_are_even_and_padded() {
        let frame = VideoFormat::Short.frame();
        let layout = layout_words(&words(&["Messi", "91"], 150.0), &BoxGlyphs, &frame);
        let bounds = layout.bounds;
        assert_eq!(bounds.width % 2, 0);
        assert_eq!(bounds.height % 2, 0);

        let word = &layout.lines[0].words[0];
        assert!(bounds.x as f32 <= word.rect.x - 40.0);
        assert!(bounds.y as f32 <= word.rect.y - 40.0);
    }

    #[test]
    fn empty_input_gets_centered_floor_box() {
        let frame = VideoFormat::Short.frame();
        let layout = layout_words(&[], &BoxGlyphs, &frame);
        assert!(layout.lines.is_empty());
        assert_eq!(layout.bounds.width, MIN_CANVAS_PX);
        assert_eq!(layout.bounds.height, MIN_CANVAS_PX);
        assert_eq!(layout.bounds.x, 490);
        assert_eq!(layout.bounds.y, 910);
    }

    #[test]
    fn identical_glyphs_share_coverage() {
        let frame = VideoFormat::Short.frame();
        let layout = layout_words(&words(&["aaa"], 100.0), &BoxGlyphs, &frame);
        assert_eq!(layout.coverages.len(), 1);
        assert_eq!(layout.glyph_count(), 3);
    }

    #[test]
    fn dilation_grows_a_single_pixel_into_a_square() {
        let out = dilate(&[255], 1, 1, 2);
        assert_eq!(out.len(), 25);
        assert!(out.iter().all(|value| *value == 255));

        let out = dilate(&[0, 0, 0, 0, 255, 0, 0, 0, 0], 3, 3, 1);
        assert_eq!(out.len(), 25);
        assert_eq!(out[0], 0);
        assert_eq!(out[6], 255);
        assert_eq!(out[18], 255);
        assert_eq!(out[24], 0);
    }
}
