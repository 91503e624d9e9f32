use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One spoken word with its speech-engine timing, in seconds.
///
/// `start` and `duration` are fixed at creation; only `emphasized` is ever
/// updated afterwards (by the emphasis aligner).
#[derive(Debug, Clone, PartialEq)]
pub struct TimedWord {
    pub text: String,
    pub start: f64,
    pub duration: f64,
    pub emphasized: bool,
}

impl TimedWord {
    pub fn new(text: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            start,
            duration,
            emphasized: false,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TimingRecord {
    word: String,
    start: f64,
    duration: f64,
}

/// Ordered per-word timing for one utterance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingSource {
    words: Vec<TimedWord>,
}

impl TimingSource {
    pub fn new(words: Vec<TimedWord>) -> Self {
        Self { words }
    }

    /// Degraded timing used when the speech engine reports none: the audio
    /// length is divided evenly across the words of `text`.
    pub fn uniform(text: &str, total_duration: f64) -> Self {
        let tokens = text.split_whitespace().collect::<Vec<_>>();
        if tokens.is_empty() {
            return Self::default();
        }

        let total = if total_duration.is_finite() {
            total_duration.max(0.0)
        } else {
            0.0
        };
        let per_word = total / tokens.len() as f64;
        let words = tokens
            .into_iter()
            .enumerate()
            .map(|(index, token)| TimedWord::new(token, index as f64 * per_word, per_word))
            .collect();
        Self { words }
    }

    /// Spread each subtitle cue evenly over the words it contains.
    pub fn from_cues(cues: &[Cue]) -> Self {
        let mut words = Vec::new();
        for cue in cues {
            let tokens = cue.text.split_whitespace().collect::<Vec<_>>();
            if tokens.is_empty() {
                continue;
            }
            let span = (cue.end - cue.start).max(0.0);
            let per_word = span / tokens.len() as f64;
            for (index, token) in tokens.into_iter().enumerate() {
                words.push(TimedWord::new(
                    token,
                    cue.start + index as f64 * per_word,
                    per_word,
                ));
            }
        }
        Self { words }
    }

    pub fn words(&self) -> &[TimedWord] {
        &self.words
    }

    pub(crate) fn words_mut(&mut self) -> &mut [TimedWord] {
        &mut self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Latest word end, or 0 for an empty source.
    pub fn end_time(&self) -> f64 {
        self.words
            .iter()
            .map(TimedWord::end)
            .fold(0.0_f64, f64::max)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let records: Vec<TimingRecord> =
            serde_json::from_str(contents).context("failed to parse timing records")?;

        let mut words = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            if !record.start.is_finite() || record.start < 0.0 {
                bail!(
                    "timing record {index} ('{}') has invalid start {}",
                    record.word,
                    record.start
                );
            }
            if !record.duration.is_finite() || record.duration < 0.0 {
                bail!(
                    "timing record {index} ('{}') has invalid duration {}",
                    record.word,
                    record.duration
                );
            }
            words.push(TimedWord::new(record.word, record.start, record.duration));
        }
        Ok(Self { words })
    }

    pub fn to_json(&self) -> Result<String> {
        let records = self
            .words
            .iter()
            .map(|word| TimingRecord {
                word: word.text.clone(),
                start: word.start,
                duration: word.duration,
            })
            .collect::<Vec<_>>();
        serde_json::to_string_pretty(&records).context("failed to serialize timing records")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read timing artifact {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("invalid timing artifact {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write timing artifact {}", path.display()))
    }
}

/// A subtitle cue as written by TTS engines (WebVTT or SRT).
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

fn cue_timing_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\S+)\s+-->\s+(\S+)").expect("cue timing pattern is valid")
    })
}

/// Parse WebVTT or SRT cues. Text lines following a timing line are joined
/// until the next blank line. Cues with unreadable timestamps are dropped.
pub fn parse_cues(contents: &str) -> Vec<Cue> {
    let pattern = cue_timing_pattern();
    let mut cues = Vec::new();
    let mut lines = contents.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(captures) = pattern.captures(line) else {
            continue;
        };

        let mut text_lines = Vec::new();
        while let Some(next) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            text_lines.push(next.trim().to_owned());
            lines.next();
        }

        let (Some(start), Some(end)) = (parse_timestamp(&captures[1]), parse_timestamp(&captures[2]))
        else {
            continue;
        };
        cues.push(Cue {
            start,
            end,
            text: text_lines.join(" "),
        });
    }

    cues
}

/// `HH:MM:SS.mmm`, `MM:SS.mmm` or plain seconds; comma decimal separators
/// (SRT) are accepted.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    let parts = normalized.split(':').collect::<Vec<_>>();
    let seconds = match parts.as_slice() {
        [h, m, s] => {
            h.parse::<u32>().ok()? as f64 * 3600.0
                + m.parse::<u32>().ok()? as f64 * 60.0
                + s.parse::<f64>().ok()?
        }
        [m, s] => m.parse::<u32>().ok()? as f64 * 60.0 + s.parse::<f64>().ok()?,
        [s] => s.parse::<f64>().ok()?,
        _ => return None,
    };
    seconds.is_finite().then_some(seconds)
}

/// Read a cue file and convert it to word timing.
pub fn load_cue_file(path: &Path) -> Result<TimingSource> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read subtitle file {}", path.display()))?;
    let cues = parse_cues(&contents);
    if cues.is_empty() && !contents.trim().is_empty() {
        return Err(anyhow!(
            "subtitle file {} contains no readable cues",
            path.display()
        ));
    }
    Ok(TimingSource::from_cues(&cues))
}
