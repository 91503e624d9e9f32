use anyhow::Result;

use crate::emphasis::tokenize_authoring;
use crate::format::FrameSpec;
use crate::layout::{layout_words, GlyphSource, LayoutWord};
use crate::reveal::{render_caption, CaptionFrame};
use crate::style::{Rgba8, StyleTable};

pub const CARD_UPPER_PX: f32 = 50.0;
pub const CARD_LOWER_PX: f32 = 110.0;
pub const HOOK_HEADLINE_PX: f32 = 110.0;

pub const CARD_UPPER_FILL: Rgba8 = Rgba8::rgb(200, 200, 200);
pub const CARD_LOWER_FILL: Rgba8 = Rgba8::WHITE;
pub const HOOK_FILL: Rgba8 = Rgba8::rgb(255, 165, 0);
const HOOK_EMPHASIS_FALLBACK: Rgba8 = Rgba8::rgb(255, 255, 0);

/// Static text drawn over a phase's visual, fully shown from the first frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Headline {
    pub words: Vec<LayoutWord>,
}

impl Headline {
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Small grey label over a large uppercased white title, e.g.
/// "CHAPTER 2" / "THE COMEBACK".
pub fn chapter_card(upper: &str, lower: &str) -> Headline {
    let mut words = upper
        .split_whitespace()
        .map(|word| LayoutWord::headline(word, CARD_UPPER_PX, CARD_UPPER_FILL, false))
        .collect::<Vec<_>>();
    let mut first_lower = !words.is_empty();
    for word in lower.split_whitespace() {
        words.push(LayoutWord::headline(
            word.to_uppercase(),
            CARD_LOWER_PX,
            CARD_LOWER_FILL,
            first_lower,
        ));
        first_lower = false;
    }
    Headline { words }
}

/// The short-form hook line: orange, with marked words in the caution color.
pub fn hook_card(text: &str, marker: char, styles: &StyleTable) -> Headline {
    let emphasis = styles
        .semantic_color("caution")
        .unwrap_or(HOOK_EMPHASIS_FALLBACK);
    let words = tokenize_authoring(text, marker)
        .into_iter()
        .filter(|token| !token.text.is_empty())
        .map(|token| {
            let fill = if token.emphasized { emphasis } else { HOOK_FILL };
            LayoutWord::headline(token.text, HOOK_HEADLINE_PX, fill, false)
        })
        .collect();
    Headline { words }
}

pub fn render_headline(
    headline: &Headline,
    glyphs: &dyn GlyphSource,
    frame: &FrameSpec,
) -> Result<CaptionFrame> {
    let layout = layout_words(&headline.words, glyphs, frame);
    render_caption(&layout, 0.0)
}

#[cfg(test)]
mod tests {
    use super::{chapter_card, hook_card, render_headline, CARD_LOWER_FILL, HOOK_FILL};
    use crate::format::VideoFormat;
    use crate::layout::BoxGlyphs;
    use crate::style::{Rgba8, StyleTable};

    #[test]
    fn chapter_card_breaks_before_the_title() {
        let card = chapter_card("CHAPTER 2", "The comeback");
        let texts = card.words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, ["CHAPTER", "2", "THE", "COMEBACK"]);
        let breaks = card.words.iter().map(|w| w.break_before).collect::<Vec<_>>();
        assert_eq!(breaks, [false, false, true, false]);
        assert_eq!(card.words[2].fill, CARD_LOWER_FILL);
    }

    #[test]
    fn hook_card_colors_marked_words() {
        let card = hook_card("Nobody saw *this* coming", '*', &StyleTable::default());
        assert_eq!(card.text(), "Nobody saw this coming");
        assert_eq!(card.words[0].fill, HOOK_FILL);
        assert_eq!(card.words[2].fill, Rgba8::rgb(0xFF, 0xFF, 0x00));
    }

    #[test]
    fn headline_renders_fully_at_time_zero() {
        let card = chapter_card("FOOTY BITEZ PRESENTS", "Invincibles");
        let frame = render_headline(&card, &BoxGlyphs, &VideoFormat::Long.frame())
            .expect("headline should render");
        assert!(frame.alpha().iter().any(|alpha| *alpha == 255));
    }
}
