use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::card::{chapter_card, hook_card, Headline};
use crate::emphasis::{align, strip_markers};
use crate::format::VideoFormat;
use crate::media::{source_media, MediaDeck, MediaSource, Visual};
use crate::phrase::{chunk_phrases, style_words, Phrase};
use crate::schema::{Beat, LongScript, Manifest, Script, ShortScript};
use crate::style::{Rgba8, StyleTable};
use crate::synthesis::SpeechSynthesizer;
use crate::timing::TimingSource;

pub const TITLE_CARD_SECONDS: f64 = 4.0;
pub const TRANSITION_CARD_SECONDS: f64 = 2.5;
pub const SHORT_CUT_SECONDS: f64 = 3.0;

pub const SHORT_CUT_ZOOM: f32 = 0.1;
pub const LONG_ZOOM: f32 = 0.04;
pub const TITLE_ZOOM: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Title,
    Narrated,
    Transition,
    Outro,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Title => "title",
            Self::Narrated => "narrated",
            Self::Transition => "transition",
            Self::Outro => "outro",
        })
    }
}

/// One visual shown for part of a phase. `offset` is relative to the phase
/// start; `zoom` is the extra scale reached by the end of the cut.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualCut {
    pub visual: Visual,
    pub offset: f64,
    pub duration: f64,
    pub zoom: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionClip {
    pub start: f64,
    pub duration: f64,
    pub phrase: Phrase,
}

impl CaptionClip {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoPhase {
    pub id: String,
    pub kind: PhaseKind,
    pub label: Option<String>,
    pub audio: Option<PathBuf>,
    pub cuts: Vec<VisualCut>,
    pub start: f64,
    pub duration: f64,
    pub headline: Option<Headline>,
    pub captions: Vec<CaptionClip>,
}

impl VideoPhase {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Index of the cut showing at `local_t` seconds into the phase.
    pub fn cut_index_at(&self, local_t: f64) -> Option<usize> {
        if self.cuts.is_empty() {
            return None;
        }
        Some(
            self.cuts
                .iter()
                .position(|cut| local_t < cut.offset + cut.duration)
                .unwrap_or(self.cuts.len() - 1),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePlan {
    pub format: VideoFormat,
    pub fps: u32,
    pub phases: Vec<VideoPhase>,
    pub total_duration: f64,
    /// Whether the word being spoken gets the highlight box.
    pub highlight: bool,
}

impl TimelinePlan {
    pub fn total_frames(&self) -> u64 {
        (self.total_duration * f64::from(self.fps)).ceil() as u64
    }

    /// Index of the phase covering absolute time `t`; times past the end
    /// belong to the last phase.
    pub fn phase_at(&self, t: f64) -> Option<usize> {
        if self.phases.is_empty() {
            return None;
        }
        Some(
            self.phases
                .iter()
                .position(|phase| t < phase.end())
                .unwrap_or(self.phases.len() - 1),
        )
    }

    pub fn caption_count(&self) -> usize {
        self.phases.iter().map(|phase| phase.captions.len()).sum()
    }

    /// Video chapter list (`MM:SS - title`) from the real transition start
    /// times. Empty for short-form plans.
    pub fn chapter_markers(&self) -> Vec<String> {
        if self.format != VideoFormat::Long {
            return Vec::new();
        }
        let mut markers = vec!["00:00 - Intro".to_owned()];
        for phase in &self.phases {
            if phase.kind != PhaseKind::Transition {
                continue;
            }
            let whole = phase.start.max(0.0).floor() as u64;
            let title = phase.label.as_deref().unwrap_or(&phase.id);
            markers.push(format!("{:02}:{:02} - {title}", whole / 60, whole % 60));
        }
        markers
    }
}

/// Manifest values the composer needs, flattened.
#[derive(Debug, Clone)]
pub struct ComposerSettings {
    pub format: VideoFormat,
    pub fps: u32,
    pub channel: String,
    pub marker: char,
    pub max_words: usize,
    pub trailing_buffer: f64,
    pub highlight_active: bool,
    pub hook_color: String,
    pub generic_keyword: String,
    pub per_keyword: usize,
    pub placeholder: Option<PathBuf>,
    pub background: Rgba8,
}

impl ComposerSettings {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let format = manifest.format();
        Self {
            format,
            fps: manifest.environment.fps,
            channel: manifest.environment.channel.clone(),
            marker: manifest.captions.marker,
            max_words: manifest.captions.max_words_for(format),
            trailing_buffer: manifest.captions.trailing_buffer,
            highlight_active: manifest.captions.highlight_active,
            hook_color: manifest.captions.hook_color.clone(),
            generic_keyword: manifest.media.generic_keyword.clone(),
            per_keyword: manifest.media.per_keyword,
            placeholder: manifest.media.placeholder.clone(),
            background: manifest.environment.background,
        }
    }
}

struct Narration {
    audio: Option<PathBuf>,
    duration: f64,
    captions: Vec<CaptionClip>,
}

/// Turns a script into a [`TimelinePlan`], voicing narrated phases in order.
pub struct TimelineComposer<'a> {
    settings: ComposerSettings,
    styles: &'a StyleTable,
    synthesizer: &'a mut dyn SpeechSynthesizer,
    media: &'a dyn MediaSource,
    deck: MediaDeck,
    sourced: HashMap<String, MediaDeck>,
    phases: Vec<VideoPhase>,
    cursor: f64,
}

impl<'a> TimelineComposer<'a> {
    pub fn new(
        settings: ComposerSettings,
        styles: &'a StyleTable,
        synthesizer: &'a mut dyn SpeechSynthesizer,
        media: &'a dyn MediaSource,
    ) -> Self {
        let deck = MediaDeck::new(Vec::new(), settings.placeholder.clone(), settings.background);
        Self {
            settings,
            styles,
            synthesizer,
            media,
            deck,
            sourced: HashMap::new(),
            phases: Vec::new(),
            cursor: 0.0,
        }
    }

    pub fn compose(mut self, script: &Script) -> Result<TimelinePlan> {
        if script.format() != self.settings.format {
            bail!(
                "script is {} form but the composer was configured for {}",
                script.format().keyword(),
                self.settings.format.keyword()
            );
        }
        match script {
            Script::Short(short) => self.compose_short(short)?,
            Script::Long(long) => self.compose_long(long)?,
        }

        let total_duration: f64 = self.phases.iter().map(|phase| phase.duration).sum();
        info!(
            phases = self.phases.len(),
            seconds = total_duration,
            "timeline composed"
        );
        Ok(TimelinePlan {
            format: self.settings.format,
            fps: self.settings.fps,
            phases: self.phases,
            total_duration,
            highlight: self.settings.highlight_active,
        })
    }

    fn compose_short(&mut self, script: &ShortScript) -> Result<()> {
        let title_keyword = script.title.clone();
        let narration = self.narrate("hook", &script.hook, false, None)?;
        let visuals = self.visuals_for(title_keyword.as_deref(), 1);
        let headline = hook_card(&script.hook, self.settings.marker, self.styles);
        self.push_phase(
            "hook",
            PhaseKind::Narrated,
            None,
            narration,
            single_cut(visuals, TITLE_ZOOM),
            Some(headline),
        );

        for (index, segment) in script.segments.iter().enumerate() {
            let id = format!("segment_{index}");
            let narration = self.narrate(&id, segment.text(), true, None)?;
            let cuts = self.short_cuts(segment.visual_keyword(), narration.duration);
            self.push_phase(&id, PhaseKind::Narrated, None, narration, cuts, None);
        }

        let narration = self.narrate("outro", &script.outro, true, None)?;
        let cuts = self.short_cuts(None, narration.duration);
        self.push_phase("outro", PhaseKind::Outro, None, narration, cuts, None);
        Ok(())
    }

    fn compose_long(&mut self, script: &LongScript) -> Result<()> {
        if let Some(hook) = &script.hook {
            let hook_color = self.settings.hook_color.clone();
            self.push_narrated_beat(
                "hook",
                PhaseKind::Narrated,
                hook,
                Some(hook_color.as_str()),
                None,
            )?;
        }

        let visuals = self.visuals_for(Some(&script.intro.visual_keyword), 1);
        let upper = format!("{} PRESENTS", self.settings.channel);
        self.push_card(
            "title",
            PhaseKind::Title,
            Some(script.metadata.title.clone()),
            TITLE_CARD_SECONDS,
            single_cut(visuals, TITLE_ZOOM),
            chapter_card(&upper, &script.metadata.title),
        );

        self.push_narrated_beat("intro", PhaseKind::Narrated, &script.intro, None, None)?;

        for (chapter_index, chapter) in script.chapters.iter().enumerate() {
            let keyword = chapter.facts.first().map(|fact| fact.visual_keyword.clone());
            let visuals = self.visuals_for(keyword.as_deref(), 1);
            let upper = format!("CHAPTER {}", chapter_index + 1);
            self.push_card(
                &format!("chapter_{}", chapter_index + 1),
                PhaseKind::Transition,
                Some(chapter.chapter_title.clone()),
                TRANSITION_CARD_SECONDS,
                single_cut(visuals, LONG_ZOOM),
                chapter_card(&upper, &chapter.chapter_title),
            );

            for (fact_index, fact) in chapter.facts.iter().enumerate() {
                let id = format!("chap_{chapter_index}_fact_{fact_index}");
                self.push_narrated_beat(&id, PhaseKind::Narrated, fact, None, None)?;
            }
        }

        let outro_card = chapter_card("THANKS FOR WATCHING", "SUBSCRIBE FOR MORE");
        self.push_narrated_beat(
            "outro",
            PhaseKind::Outro,
            &script.outro,
            None,
            Some(outro_card),
        )?;
        Ok(())
    }

    fn push_narrated_beat(
        &mut self,
        id: &str,
        kind: PhaseKind,
        beat: &Beat,
        override_set: Option<&str>,
        headline: Option<Headline>,
    ) -> Result<()> {
        let narration = self.narrate(id, &beat.text, true, override_set)?;
        let visuals = self.visuals_for(Some(&beat.visual_keyword), 1);
        self.push_phase(id, kind, None, narration, single_cut(visuals, LONG_ZOOM), headline);
        Ok(())
    }

    fn push_card(
        &mut self,
        id: &str,
        kind: PhaseKind,
        label: Option<String>,
        duration: f64,
        cuts: Vec<VisualCut>,
        headline: Headline,
    ) {
        let narration = Narration {
            audio: None,
            duration,
            captions: Vec::new(),
        };
        self.push_phase(id, kind, label, narration, cuts, Some(headline));
    }

    fn push_phase(
        &mut self,
        id: &str,
        kind: PhaseKind,
        label: Option<String>,
        narration: Narration,
        mut cuts: Vec<VisualCut>,
        headline: Option<Headline>,
    ) {
        if let [only] = cuts.as_mut_slice() {
            only.duration = narration.duration;
        }
        info!(
            phase = id,
            kind = %kind,
            start = self.cursor,
            seconds = narration.duration,
            captions = narration.captions.len(),
            visual = %cuts.first().map(|cut| cut.visual.label()).unwrap_or_default(),
            "phase planned"
        );
        let phase = VideoPhase {
            id: id.to_owned(),
            kind,
            label,
            audio: narration.audio,
            cuts,
            start: self.cursor,
            duration: narration.duration,
            headline,
            captions: narration.captions,
        };
        self.cursor += phase.duration;
        self.phases.push(phase);
    }

    /// Voice one phase and build its caption track from the persisted
    /// timing artifact. Caption failures only cost this phase its captions.
    fn narrate(
        &mut self,
        id: &str,
        authoring: &str,
        with_captions: bool,
        override_set: Option<&str>,
    ) -> Result<Narration> {
        let marker = self.settings.marker;
        let spoken = strip_markers(authoring, marker);
        let synthesis = self
            .synthesizer
            .synthesize(id, &spoken)
            .with_context(|| format!("failed to voice phase '{id}'"))?;
        if !synthesis.duration.is_finite() || synthesis.duration <= 0.0 {
            bail!(
                "phase '{id}' has unusable audio duration {}",
                synthesis.duration
            );
        }

        let start = self.cursor;
        let captions = if !with_captions {
            Vec::new()
        } else {
            match &synthesis.timing_path {
                None => {
                    warn!(phase = id, "no timing artifact, captions disabled");
                    Vec::new()
                }
                Some(path) => match TimingSource::load(path) {
                    Ok(timing) => self.caption_track(authoring, &timing, override_set, start),
                    Err(error) => {
                        warn!(phase = id, "captions disabled: {error:#}");
                        Vec::new()
                    }
                },
            }
        };

        Ok(Narration {
            audio: synthesis.audio,
            duration: synthesis.duration,
            captions,
        })
    }

    fn caption_track(
        &self,
        authoring: &str,
        timing: &TimingSource,
        override_set: Option<&str>,
        phase_start: f64,
    ) -> Vec<CaptionClip> {
        let aligned = align(authoring, timing, self.settings.marker);
        let styled = style_words(&aligned, self.styles, override_set);
        chunk_phrases(&styled, self.settings.max_words, self.settings.trailing_buffer)
            .into_iter()
            .map(|phrase| CaptionClip {
                start: phase_start + phrase.window_start,
                duration: phrase.duration(),
                phrase,
            })
            .collect()
    }

    /// `count` visuals for a keyword. Unknown or empty keywords use the
    /// generic keyword; keywords with no media draw from the shared deck.
    fn visuals_for(&mut self, keyword: Option<&str>, count: usize) -> Vec<Visual> {
        let generic = self.settings.generic_keyword.clone();
        let keyword = keyword
            .map(str::trim)
            .filter(|keyword| !keyword.is_empty())
            .unwrap_or(generic.as_str())
            .to_owned();

        if !self.sourced.contains_key(&keyword) {
            let found = source_media(self.media, &keyword, &generic, self.settings.per_keyword);
            self.deck.extend(found.iter().cloned());
            let keyword_deck = MediaDeck::new(found, None, self.settings.background);
            self.sourced.insert(keyword.clone(), keyword_deck);
        }

        let mut visuals = Vec::with_capacity(count);
        for _ in 0..count {
            let visual = match self.sourced.get_mut(&keyword) {
                Some(deck) if !deck.is_empty() => deck.next_visual(),
                _ => self.deck.next_visual(),
            };
            visuals.push(visual);
        }
        visuals
    }

    fn short_cuts(&mut self, keyword: Option<&str>, duration: f64) -> Vec<VisualCut> {
        let count = ((duration / SHORT_CUT_SECONDS).ceil() as usize).max(1);
        let visuals = self.visuals_for(keyword, count);
        visuals
            .into_iter()
            .enumerate()
            .map(|(index, visual)| {
                let offset = index as f64 * SHORT_CUT_SECONDS;
                VisualCut {
                    visual,
                    offset,
                    duration: (duration - offset).min(SHORT_CUT_SECONDS),
                    zoom: SHORT_CUT_ZOOM,
                }
            })
            .collect()
    }
}

fn single_cut(visuals: Vec<Visual>, zoom: f32) -> Vec<VisualCut> {
    visuals
        .into_iter()
        .take(1)
        .map(|visual| VisualCut {
            visual,
            offset: 0.0,
            duration: 0.0,
            zoom,
        })
        .collect()
}
