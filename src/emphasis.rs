use crate::timing::TimingSource;

pub const DEFAULT_MARKER: char = '*';

/// How far past the cursor the aligner looks for a matching timing entry.
pub const LOOKAHEAD: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoringToken {
    pub text: String,
    pub key: String,
    pub emphasized: bool,
}

/// Remove every marker character; the result is what gets spoken.
pub fn strip_markers(text: &str, marker: char) -> String {
    text.chars().filter(|ch| *ch != marker).collect()
}

/// Lowercased alphanumerics only, so "Messi!" and "messi" compare equal.
pub fn comparison_key(token: &str) -> String {
    token
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split authoring text on whitespace, flagging tokens that carry a marker or
/// sit inside an open marker run such as `*Club Name*`.
pub fn tokenize_authoring(text: &str, marker: char) -> Vec<AuthoringToken> {
    let mut inside_run = false;
    let mut tokens = Vec::new();

    for raw in text.split_whitespace() {
        let marker_count = raw.chars().filter(|ch| *ch == marker).count();
        let emphasized = inside_run || marker_count > 0;
        if marker_count % 2 == 1 {
            inside_run = !inside_run;
        }
        tokens.push(AuthoringToken {
            text: strip_markers(raw, marker),
            key: comparison_key(raw),
            emphasized,
        });
    }

    tokens
}

/// Copy emphasis from the authoring markup onto speech-engine timing.
///
/// The timing entries keep their text, start and duration; only the
/// `emphasized` flag changes. Tokens without a match inside the lookahead
/// window are skipped, so the worst outcome is a missing highlight.
pub fn align(authoring_text: &str, timing: &TimingSource, marker: char) -> TimingSource {
    let mut aligned = timing.clone();
    let keys = aligned
        .words()
        .iter()
        .map(|word| comparison_key(&word.text))
        .collect::<Vec<_>>();

    let words = aligned.words_mut();
    let mut cursor = 0usize;

    for token in tokenize_authoring(authoring_text, marker) {
        if token.key.is_empty() {
            continue;
        }
        if cursor >= words.len() {
            break;
        }

        let window_end = (cursor + LOOKAHEAD).min(words.len());
        let found = (cursor..window_end).find(|&index| {
            let candidate = &keys[index];
            !candidate.is_empty()
                && (candidate.contains(token.key.as_str()) || token.key.contains(candidate.as_str()))
        });

        if let Some(index) = found {
            words[index].emphasized |= token.emphasized;
            cursor = index + 1;
        }
    }

    aligned
}
