use crate::style::{StyleDescriptor, StyleTable};
use crate::timing::{TimedWord, TimingSource};

/// Extra seconds the last phrase of an utterance stays on screen.
pub const TRAILING_BUFFER_SECONDS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct StyledWord {
    pub word: TimedWord,
    pub style: StyleDescriptor,
}

/// Words that share one caption window. Windows are bridged: a phrase stays
/// up until the next one starts, so there is never an empty caption gap.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    pub words: Vec<StyledWord>,
    pub window_start: f64,
    pub window_end: f64,
}

impl Phrase {
    pub fn duration(&self) -> f64 {
        (self.window_end - self.window_start).max(0.0)
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|styled| styled.word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Attach a style to every aligned word. With `override_set` every word takes
/// that set's color instead of its own classification.
pub fn style_words(
    timing: &TimingSource,
    table: &StyleTable,
    override_set: Option<&str>,
) -> Vec<StyledWord> {
    timing
        .words()
        .iter()
        .map(|word| {
            let style = match override_set {
                Some(name) => table.classify_with_override(&word.text, word.emphasized, name),
                None => table.classify(&word.text, word.emphasized),
            };
            StyledWord {
                word: word.clone(),
                style,
            }
        })
        .collect()
}

pub fn chunk_phrases(words: &[StyledWord], max_words: usize, trailing_buffer: f64) -> Vec<Phrase> {
    let max_words = max_words.max(1);
    let groups = words.chunks(max_words).collect::<Vec<_>>();
    let starts = groups
        .iter()
        .map(|group| group[0].word.start)
        .collect::<Vec<_>>();

    groups
        .iter()
        .enumerate()
        .map(|(index, group)| {
            let window_start = starts[index];
            let window_end = match starts.get(index + 1) {
                Some(next_start) => *next_start,
                None => {
                    let last = &group[group.len() - 1].word;
                    last.end() + trailing_buffer
                }
            };
            Phrase {
                words: group.to_vec(),
                window_start,
                window_end,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{chunk_phrases, style_words, StyledWord, TRAILING_BUFFER_SECONDS};
    use crate::style::{ColorCategory, StyleTable};
    use crate::timing::{TimedWord, TimingSource};

    fn styled(count: usize) -> Vec<StyledWord> {
        let table = StyleTable::default();
        let timing = TimingSource::new(
            (0..count)
                .map(|index| TimedWord::new(format!("w{index}"), index as f64 * 0.4, 0.3))
                .collect(),
        );
        style_words(&timing, &table, None)
    }

    #[test]
    fn seven_words_in_fours_make_two_bridged_phrases() {
        let phrases = chunk_phrases(&styled(7), 4, TRAILING_BUFFER_SECONDS);
        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0].words.len(), 4);
        assert_eq!(phrases[1].words.len(), 3);
        assert_eq!(phrases[0].window_end, phrases[1].window_start);
        assert!((phrases[1].window_start - 1.6).abs() < 1e-9);
        assert!((phrases[1].window_end - (2.4 + 0.3 + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn windows_are_contiguous_except_the_last() {
        let phrases = chunk_phrases(&styled(11), 3, 0.5);
        for pair in phrases.windows(2) {
            assert_eq!(pair[0].window_end, pair[1].window_start);
        }
        assert_eq!(phrases.first().map(|phrase| phrase.window_start), Some(0.0));
    }

    #[test]
    fn empty_input_yields_no_phrases() {
        assert!(chunk_phrases(&[], 3, 0.5).is_empty());
    }

    #[test]
    fn zero_max_words_is_treated_as_one() {
        let phrases = chunk_phrases(&styled(3), 0, 0.5);
        assert_eq!(phrases.len(), 3);
    }

    #[test]
    fn override_restyles_every_word() {
        let timing = TimingSource::uniform("plain 1999 words", 1.5);
        let words = style_words(&timing, &StyleTable::default(), Some("history"));
        assert!(words
            .iter()
            .all(|word| word.style.category == ColorCategory::Semantic("history".to_owned())));
    }
}
