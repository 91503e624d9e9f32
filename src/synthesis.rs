use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};

use crate::audio::probe_duration;
use crate::encoding::last_n_chars;
use crate::retry::{with_retry, RetryPolicy};
use crate::schema::VoiceConfig;
use crate::timing::{load_cue_file, TimingSource};

/// Result of voicing one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub audio: Option<PathBuf>,
    pub duration: f64,
    pub timing_path: Option<PathBuf>,
}

pub trait SpeechSynthesizer {
    /// Voice `text` for the phase `phase_id`. Implementations persist a
    /// timing artifact and report where it is.
    fn synthesize(&mut self, phase_id: &str, text: &str) -> Result<Synthesis>;
}

pub fn timing_artifact_path(work_dir: &Path, phase_id: &str) -> PathBuf {
    work_dir.join(format!("{phase_id}.json"))
}

pub fn primary_tts_args(voice: &str, text: &str, audio: &Path, subtitles: &Path) -> Vec<String> {
    vec![
        "--voice".to_owned(),
        voice.to_owned(),
        "--text".to_owned(),
        text.to_owned(),
        "--write-media".to_owned(),
        audio.to_string_lossy().into_owned(),
        "--write-subtitles".to_owned(),
        subtitles.to_string_lossy().into_owned(),
    ]
}

pub fn fallback_tts_args(text: &str, audio: &Path) -> Vec<String> {
    vec![
        text.to_owned(),
        "--output".to_owned(),
        audio.to_string_lossy().into_owned(),
    ]
}

/// Shells out to an installed TTS CLI, falling back to a second engine
/// without word timing.
pub struct CommandSynthesizer {
    voice: VoiceConfig,
    work_dir: PathBuf,
    retry: RetryPolicy,
}

impl CommandSynthesizer {
    pub fn new(voice: VoiceConfig, work_dir: &Path) -> Self {
        let retry = RetryPolicy::with_attempts(voice.attempts);
        Self {
            voice,
            work_dir: work_dir.to_path_buf(),
            retry,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn primary(&self, phase_id: &str, text: &str) -> Result<(PathBuf, f64, TimingSource)> {
        let audio = self.work_dir.join(format!("{phase_id}.mp3"));
        let subtitles = self.work_dir.join(format!("{phase_id}.vtt"));
        let args = primary_tts_args(&self.voice.voice, text, &audio, &subtitles);

        with_retry(&self.retry, &self.voice.program, |_| {
            run_tts(&self.voice.program, &args)?;
            if !audio.is_file() {
                bail!("{} produced no audio at {}", self.voice.program, audio.display());
            }
            Ok(())
        })?;

        let duration = probe_duration(&audio)?;
        let timing = match load_cue_file(&subtitles) {
            Ok(timing) if !timing.is_empty() => timing,
            Ok(_) => {
                warn!(phase = phase_id, "no subtitle cues, using uniform timing");
                TimingSource::uniform(text, duration)
            }
            Err(error) => {
                warn!(phase = phase_id, "unusable subtitles, using uniform timing: {error:#}");
                TimingSource::uniform(text, duration)
            }
        };
        Ok((audio, duration, timing))
    }

    fn fallback(&self, program: &str, phase_id: &str, text: &str) -> Result<(PathBuf, f64, TimingSource)> {
        let audio = self.work_dir.join(format!("{phase_id}.fallback.mp3"));
        let args = fallback_tts_args(text, &audio);
        with_retry(&self.retry, program, |_| run_tts(program, &args))?;
        let duration = probe_duration(&audio)?;
        Ok((audio, duration, TimingSource::uniform(text, duration)))
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn synthesize(&mut self, phase_id: &str, text: &str) -> Result<Synthesis> {
        fs::create_dir_all(&self.work_dir)
            .with_context(|| format!("failed to create work dir {}", self.work_dir.display()))?;

        let (audio, duration, timing) = match self.primary(phase_id, text) {
            Ok(result) => result,
            Err(primary_error) => {
                let Some(program) = self.voice.fallback_program.clone() else {
                    return Err(primary_error.context(format!("speech synthesis failed for {phase_id}")));
                };
                warn!(phase = phase_id, "primary speech engine failed, trying {program}: {primary_error:#}");
                self.fallback(&program, phase_id, text)
                    .with_context(|| format!("speech synthesis failed for {phase_id}"))?
            }
        };

        let timing_path = timing_artifact_path(&self.work_dir, phase_id);
        timing.save(&timing_path)?;
        info!(phase = phase_id, words = timing.len(), seconds = duration, "synthesized");

        Ok(Synthesis {
            audio: Some(audio),
            duration,
            timing_path: Some(timing_path),
        })
    }
}

fn run_tts(program: &str, args: &[String]) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!("speech engine '{program}' not found on PATH")
            } else {
                anyhow!("failed to spawn speech engine '{program}': {error}")
            }
        })?;
    if !output.status.success() {
        bail!(
            "{program} exited with status {} (stderr_tail='{}')",
            output.status,
            last_n_chars(&String::from_utf8_lossy(&output.stderr), 300)
        );
    }
    Ok(())
}

pub const ESTIMATED_WORDS_PER_SECOND: f64 = 2.5;
pub const MIN_ESTIMATED_SECONDS: f64 = 1.0;

/// Silent stand-in for dry runs: durations come from word count and timing
/// is uniform.
pub struct EstimatedSpeech {
    work_dir: PathBuf,
    words_per_second: f64,
}

impl EstimatedSpeech {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            words_per_second: ESTIMATED_WORDS_PER_SECOND,
        }
    }

    pub fn estimate(&self, text: &str) -> f64 {
        let words = text.split_whitespace().count() as f64;
        (words / self.words_per_second).max(MIN_ESTIMATED_SECONDS)
    }
}

impl SpeechSynthesizer for EstimatedSpeech {
    fn synthesize(&mut self, phase_id: &str, text: &str) -> Result<Synthesis> {
        let duration = self.estimate(text);
        let timing_path = timing_artifact_path(&self.work_dir, phase_id);
        TimingSource::uniform(text, duration).save(&timing_path)?;
        Ok(Synthesis {
            audio: None,
            duration,
            timing_path: Some(timing_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::{
        fallback_tts_args, primary_tts_args, CommandSynthesizer, EstimatedSpeech,
        SpeechSynthesizer,
    };
    use crate::retry::RetryPolicy;
    use crate::schema::VoiceConfig;
    use crate::timing::TimingSource;

    #[test]
    fn primary_args_request_media_and_subtitles() {
        let args = primary_tts_args(
            "en-US-ChristopherNeural",
            "Hello there",
            Path::new("work/intro.mp3"),
            Path::new("work/intro.vtt"),
        );
        assert_eq!(
            args,
            [
                "--voice",
                "en-US-ChristopherNeural",
                "--text",
                "Hello there",
                "--write-media",
                "work/intro.mp3",
                "--write-subtitles",
                "work/intro.vtt",
            ]
        );
        assert_eq!(
            fallback_tts_args("Hello", Path::new("a.mp3")),
            ["Hello", "--output", "a.mp3"]
        );
    }

    #[test]
    fn estimate_uses_word_rate_with_floor() {
        let speech = EstimatedSpeech::new(Path::new("work"));
        assert!((speech.estimate("one two three four five") - 2.0).abs() < 1e-9);
        assert!((speech.estimate("hi") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn estimated_speech_persists_uniform_timing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut speech = EstimatedSpeech::new(dir.path());
        let synthesis = speech
            .synthesize("intro", "Five words are spoken here")
            .expect("estimate should succeed");
        assert!(synthesis.audio.is_none());
        assert!((synthesis.duration - 2.0).abs() < 1e-9);

        let path = synthesis.timing_path.expect("timing artifact written");
        let timing = TimingSource::load(&path).expect("artifact should load");
        assert_eq!(timing.len(), 5);
        assert!((timing.end_time() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn missing_engines_fail_after_primary_and_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let voice = VoiceConfig {
            program: "reelcast-missing-tts".to_owned(),
            fallback_program: Some("reelcast-missing-fallback".to_owned()),
            ..VoiceConfig::default()
        };
        let mut speech = CommandSynthesizer::new(voice, dir.path()).with_retry_policy(RetryPolicy {
            attempts: 2,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        });

        let err = speech
            .synthesize("intro", "Hello there")
            .expect_err("no engine is installed")
            .to_string();
        assert!(err.contains("speech synthesis failed for intro"), "got: {err}");
        assert!(!dir.path().join("intro.json").exists());
    }
}
