use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::encoding::FfmpegMode;
use crate::format::VideoFormat;
use crate::style::{Rgba8, StyleConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub environment: Environment,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub captions: CaptionConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub style: StyleConfig,
    pub script: Script,
}

impl Manifest {
    pub fn format(&self) -> VideoFormat {
        self.script.format()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    #[serde(default = "default_fps")]
    pub fps: u32,
    pub font: PathBuf,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_background")]
    pub background: Rgba8,
}

impl Environment {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            bail!("fps must be > 0");
        }
        if self.fps > 120 {
            bail!("fps must be <= 120, got {}", self.fps);
        }
        if self.channel.trim().is_empty() {
            bail!("environment.channel cannot be empty");
        }
        Ok(())
    }
}

fn default_fps() -> u32 {
    30
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

fn default_channel() -> String {
    "FOOTY BITEZ".to_owned()
}

fn default_background() -> Rgba8 {
    Rgba8::BLACK
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceConfig {
    #[serde(default = "default_voice_program")]
    pub program: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_fallback_program")]
    pub fallback_program: Option<String>,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            program: default_voice_program(),
            voice: default_voice(),
            fallback_program: default_fallback_program(),
            attempts: default_attempts(),
        }
    }
}

impl VoiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            bail!("voice.program cannot be empty");
        }
        if self.voice.trim().is_empty() {
            bail!("voice.voice cannot be empty");
        }
        if matches!(&self.fallback_program, Some(program) if program.trim().is_empty()) {
            bail!("voice.fallback_program cannot be empty when set");
        }
        if self.attempts == 0 || self.attempts > 10 {
            bail!("voice.attempts must be in 1..=10, got {}", self.attempts);
        }
        Ok(())
    }
}

fn default_voice_program() -> String {
    "edge-tts".to_owned()
}

fn default_voice() -> String {
    "en-US-ChristopherNeural".to_owned()
}

fn default_fallback_program() -> Option<String> {
    Some("gtts-cli".to_owned())
}

fn default_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    #[serde(default)]
    pub library: Option<PathBuf>,
    #[serde(default = "default_generic_keyword")]
    pub generic_keyword: String,
    #[serde(default)]
    pub placeholder: Option<PathBuf>,
    #[serde(default = "default_per_keyword")]
    pub per_keyword: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            library: None,
            generic_keyword: default_generic_keyword(),
            placeholder: None,
            per_keyword: default_per_keyword(),
        }
    }
}

impl MediaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.per_keyword == 0 {
            bail!("media.per_keyword must be > 0");
        }
        Ok(())
    }
}

fn default_generic_keyword() -> String {
    "football stadium".to_owned()
}

fn default_per_keyword() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptionConfig {
    /// Words per caption phrase; the format's default when omitted.
    #[serde(default)]
    pub max_words: Option<usize>,
    #[serde(default = "default_trailing_buffer")]
    pub trailing_buffer: f64,
    #[serde(default = "default_marker")]
    pub marker: char,
    #[serde(default = "default_true")]
    pub highlight_active: bool,
    #[serde(default = "default_hook_color")]
    pub hook_color: String,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            max_words: None,
            trailing_buffer: default_trailing_buffer(),
            marker: default_marker(),
            highlight_active: true,
            hook_color: default_hook_color(),
        }
    }
}

impl CaptionConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.trailing_buffer.is_finite() || self.trailing_buffer < 0.0 {
            bail!(
                "captions.trailing_buffer must be finite and >= 0, got {}",
                self.trailing_buffer
            );
        }
        if self.marker.is_alphanumeric() || self.marker.is_whitespace() {
            bail!(
                "captions.marker must be a punctuation character, got {:?}",
                self.marker
            );
        }
        if self.hook_color.trim().is_empty() {
            bail!("captions.hook_color cannot be empty");
        }
        Ok(())
    }

    pub fn max_words_for(&self, format: VideoFormat) -> usize {
        self.max_words
            .unwrap_or_else(|| format.default_max_words())
            .max(1)
    }
}

fn default_trailing_buffer() -> f64 {
    crate::phrase::TRAILING_BUFFER_SECONDS
}

fn default_marker() -> char {
    crate::emphasis::DEFAULT_MARKER
}

fn default_true() -> bool {
    true
}

fn default_hook_color() -> String {
    "history".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncodingConfig {
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub ffmpeg: FfmpegMode,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            crf: default_crf(),
            preset: default_preset(),
            ffmpeg: FfmpegMode::default(),
        }
    }
}

const X264_PRESETS: [&str; 10] = [
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

impl EncodingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.crf > 51 {
            bail!("encoding.crf must be in 0..=51, got {}", self.crf);
        }
        if !X264_PRESETS.contains(&self.preset.as_str()) {
            bail!(
                "encoding.preset '{}' is not an x264 preset (expected one of: {})",
                self.preset,
                X264_PRESETS.join(", ")
            );
        }
        Ok(())
    }
}

fn default_crf() -> u8 {
    20
}

fn default_preset() -> String {
    "medium".to_owned()
}

/// Narration text paired with the media keyword used to find its visual.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Beat {
    pub text: String,
    pub visual_keyword: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    Text(String),
    Beat(Beat),
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Beat(beat) => &beat.text,
        }
    }

    pub fn visual_keyword(&self) -> Option<&str> {
        match self {
            Self::Text(_) => None,
            Self::Beat(beat) => Some(&beat.visual_keyword),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShortScript {
    #[serde(default)]
    pub title: Option<String>,
    pub hook: String,
    pub segments: Vec<Segment>,
    pub outro: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Chapter {
    pub chapter_title: String,
    pub facts: Vec<Beat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LongScript {
    pub metadata: Metadata,
    #[serde(default)]
    pub hook: Option<Beat>,
    pub intro: Beat,
    pub chapters: Vec<Chapter>,
    pub outro: Beat,
}

/// Vertical short (`segments`) or horizontal documentary (`chapters`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Script {
    Short(ShortScript),
    Long(LongScript),
}

impl Script {
    pub fn format(&self) -> VideoFormat {
        match self {
            Self::Short(_) => VideoFormat::Short,
            Self::Long(_) => VideoFormat::Long,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Short(script) => {
                require_text("script.hook", &script.hook)?;
                require_text("script.outro", &script.outro)?;
                for (index, segment) in script.segments.iter().enumerate() {
                    require_text(&format!("script.segments[{index}]"), segment.text())?;
                }
            }
            Self::Long(script) => {
                require_text("script.metadata.title", &script.metadata.title)?;
                if let Some(hook) = &script.hook {
                    require_text("script.hook.text", &hook.text)?;
                }
                require_text("script.intro.text", &script.intro.text)?;
                require_text("script.outro.text", &script.outro.text)?;
                for (index, chapter) in script.chapters.iter().enumerate() {
                    require_text(
                        &format!("script.chapters[{index}].chapter_title"),
                        &chapter.chapter_title,
                    )?;
                    if chapter.facts.is_empty() {
                        bail!("script.chapters[{index}] must contain at least one fact");
                    }
                    for (fact_index, fact) in chapter.facts.iter().enumerate() {
                        require_text(
                            &format!("script.chapters[{index}].facts[{fact_index}].text"),
                            &fact.text,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Every media keyword in script order, without duplicates.
    pub fn visual_keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        let mut push = |keyword: &str| {
            let keyword = keyword.trim();
            if !keyword.is_empty() && !keywords.iter().any(|known| known == keyword) {
                keywords.push(keyword.to_owned());
            }
        };

        match self {
            Self::Short(script) => {
                for segment in &script.segments {
                    if let Some(keyword) = segment.visual_keyword() {
                        push(keyword);
                    }
                }
            }
            Self::Long(script) => {
                if let Some(hook) = &script.hook {
                    push(&hook.visual_keyword);
                }
                push(&script.intro.visual_keyword);
                for chapter in &script.chapters {
                    for fact in &chapter.facts {
                        push(&fact.visual_keyword);
                    }
                }
                push(&script.outro.visual_keyword);
            }
        }
        keywords
    }

    /// All narration, for glyph coverage checks.
    pub fn all_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        match self {
            Self::Short(script) => {
                parts.extend(script.title.as_deref());
                parts.push(&script.hook);
                parts.extend(script.segments.iter().map(Segment::text));
                parts.push(&script.outro);
            }
            Self::Long(script) => {
                parts.push(&script.metadata.title);
                parts.extend(script.hook.as_ref().map(|hook| hook.text.as_str()));
                parts.push(&script.intro.text);
                for chapter in &script.chapters {
                    parts.push(&chapter.chapter_title);
                    parts.extend(chapter.facts.iter().map(|fact| fact.text.as_str()));
                }
                parts.push(&script.outro.text);
            }
        }
        parts.join(" ")
    }
}

fn require_text(label: &str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        bail!("{label} cannot be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CaptionConfig, Manifest, Script, Segment};
    use crate::format::VideoFormat;

    fn parse(yaml: &str) -> Manifest {
        serde_yaml::from_str(yaml).expect("manifest should parse")
    }

    #[test]
    fn short_script_accepts_plain_and_keyed_segments() {
        let manifest = parse(
            r#"
environment: { font: font.ttf }
script:
  hook: "Did you know *Messi* did this?"
  segments:
    - "He scored 91 goals in 2012."
    - { text: "Nobody has come close.", visual_keyword: messi celebration }
  outro: "Follow for more."
"#,
        );
        assert_eq!(manifest.format(), VideoFormat::Short);
        assert_eq!(manifest.environment.fps, 30);
        assert_eq!(manifest.voice.program, "edge-tts");
        let Script::Short(script) = &manifest.script else {
            panic!("expected short script");
        };
        assert!(matches!(script.segments[0], Segment::Text(_)));
        assert_eq!(script.segments[1].visual_keyword(), Some("messi celebration"));
        assert_eq!(manifest.script.visual_keywords(), ["messi celebration"]);
    }

    #[test]
    fn long_script_is_detected_by_shape() {
        let manifest = parse(
            r#"
environment: { font: font.ttf, fps: 25 }
script:
  metadata: { title: "The Invincibles" }
  intro: { text: "In 2004...", visual_keyword: arsenal }
  chapters:
    - chapter_title: "The Start"
      facts:
        - { text: "It began in August.", visual_keyword: highbury }
  outro: { text: "Thanks.", visual_keyword: arsenal }
"#,
        );
        assert_eq!(manifest.format(), VideoFormat::Long);
        assert_eq!(manifest.script.visual_keywords(), ["arsenal", "highbury"]);
        manifest.script.validate().expect("long script should validate");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_yaml::from_str::<Manifest>(
            r#"
environment: { font: font.ttf, resolution: 4k }
script: { hook: a, segments: [], outro: b }
"#,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("resolution"), "got: {err}");
    }

    #[test]
    fn zero_fps_fails_validation() {
        let manifest = parse(
            r#"
environment: { font: font.ttf, fps: 0 }
script: { hook: a, segments: [], outro: b }
"#,
        );
        let err = manifest.environment.validate().unwrap_err().to_string();
        assert!(err.contains("fps must be > 0"), "got: {err}");
    }

    #[test]
    fn chapters_need_facts() {
        let manifest = parse(
            r#"
environment: { font: font.ttf }
script:
  metadata: { title: T }
  intro: { text: i, visual_keyword: k }
  chapters: [ { chapter_title: Empty, facts: [] } ]
  outro: { text: o, visual_keyword: k }
"#,
        );
        assert!(manifest.script.validate().is_err());
    }

    #[test]
    fn caption_defaults_follow_format() {
        let captions = CaptionConfig::default();
        assert_eq!(captions.max_words_for(VideoFormat::Short), 3);
        assert_eq!(captions.max_words_for(VideoFormat::Long), 5);
        let custom = CaptionConfig {
            max_words: Some(0),
            ..CaptionConfig::default()
        };
        assert_eq!(custom.max_words_for(VideoFormat::Long), 1);
        let bad_marker = CaptionConfig {
            marker: 'x',
            ..CaptionConfig::default()
        };
        assert!(bad_marker.validate().is_err());
    }
}
