use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

use crate::encoding::last_n_chars;
use crate::timeline::TimelinePlan;

pub const SAMPLE_RATE: u32 = 44_100;

pub fn ffprobe_duration_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_owned(),
        "error".to_owned(),
        "-show_entries".to_owned(),
        "format=duration".to_owned(),
        "-of".to_owned(),
        "default=noprint_wrappers=1:nokey=1".to_owned(),
        path.to_string_lossy().into_owned(),
    ]
}

/// Length of a media file in seconds, as reported by ffprobe.
pub fn probe_duration(path: &Path) -> Result<f64> {
    let args = ffprobe_duration_args(path);
    let output = Command::new("ffprobe")
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!("ffprobe executable not found; install ffmpeg to probe audio durations")
            } else {
                anyhow!("failed to spawn ffprobe for {}: {error}", path.display())
            }
        })?;
    if !output.status.success() {
        bail!(
            "ffprobe failed for {} with status {} (stderr_tail='{}')",
            path.display(),
            output.status,
            last_n_chars(&String::from_utf8_lossy(&output.stderr), 300)
        );
    }
    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("unreadable ffprobe duration for {}", path.display()))
}

pub fn parse_probe_output(stdout: &str) -> Result<f64> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("ffprobe printed no duration"))?;
    let seconds = line
        .parse::<f64>()
        .with_context(|| format!("'{line}' is not a number"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("duration must be > 0, got {seconds}");
    }
    Ok(seconds)
}

/// One phase's slice of the soundtrack.
#[derive(Debug, Clone, PartialEq)]
pub enum SoundtrackSegment {
    Audio { path: PathBuf, duration: f64 },
    Silence { duration: f64 },
}

impl SoundtrackSegment {
    pub fn duration(&self) -> f64 {
        match self {
            Self::Audio { duration, .. } | Self::Silence { duration } => *duration,
        }
    }
}

pub fn soundtrack_segments(plan: &TimelinePlan) -> Vec<SoundtrackSegment> {
    plan.phases
        .iter()
        .map(|phase| match &phase.audio {
            Some(path) => SoundtrackSegment::Audio {
                path: path.clone(),
                duration: phase.duration,
            },
            None => SoundtrackSegment::Silence {
                duration: phase.duration,
            },
        })
        .collect()
}

/// ffmpeg arguments that pad or trim every segment to its exact phase length
/// and concatenate them into one stereo PCM track.
pub fn soundtrack_args(segments: &[SoundtrackSegment], output_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
    ];

    for segment in segments {
        match segment {
            SoundtrackSegment::Audio { path, .. } => {
                args.push("-i".to_owned());
                args.push(path.to_string_lossy().into_owned());
            }
            SoundtrackSegment::Silence { duration } => {
                args.push("-f".to_owned());
                args.push("lavfi".to_owned());
                args.push("-t".to_owned());
                args.push(format!("{duration:.3}"));
                args.push("-i".to_owned());
                args.push(format!("anullsrc=r={SAMPLE_RATE}:cl=stereo"));
            }
        }
    }

    let mut filter = String::new();
    for (index, segment) in segments.iter().enumerate() {
        let duration = segment.duration();
        filter.push_str(&format!(
            "[{index}:a]aresample={SAMPLE_RATE},aformat=sample_fmts=s16:channel_layouts=stereo,apad=whole_dur={duration:.3},atrim=0:{duration:.3},asetpts=N/SR/TB[a{index}];"
        ));
    }
    for index in 0..segments.len() {
        filter.push_str(&format!("[a{index}]"));
    }
    filter.push_str(&format!("concat=n={}:v=0:a=1[out]", segments.len()));

    args.extend([
        "-filter_complex".to_owned(),
        filter,
        "-map".to_owned(),
        "[out]".to_owned(),
        "-c:a".to_owned(),
        "pcm_s16le".to_owned(),
        output_path.to_string_lossy().into_owned(),
    ]);
    args
}

pub fn build_soundtrack(plan: &TimelinePlan, output_path: &Path) -> Result<()> {
    let segments = soundtrack_segments(plan);
    if segments.is_empty() {
        bail!("cannot build a soundtrack for an empty timeline");
    }
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let args = soundtrack_args(&segments, output_path);
    info!(
        segments = segments.len(),
        seconds = plan.total_duration,
        "building soundtrack {}",
        output_path.display()
    );
    let output = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .context("failed to spawn ffmpeg for soundtrack")?;
    if !output.status.success() {
        bail!(
            "ffmpeg soundtrack build failed with status {} (stderr_tail='{}')",
            output.status,
            last_n_chars(&String::from_utf8_lossy(&output.stderr), 500)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{parse_probe_output, soundtrack_args, SoundtrackSegment};

    #[test]
    fn probe_output_is_parsed() {
        assert_eq!(parse_probe_output("12.480000\n").ok(), Some(12.48));
        assert!(parse_probe_output("N/A\n").is_err());
        assert!(parse_probe_output("").is_err());
        assert!(parse_probe_output("0.0").is_err());
    }

    #[test]
    fn soundtrack_args_mix_voice_and_silence() {
        let segments = vec![
            SoundtrackSegment::Audio {
                path: PathBuf::from("work/intro.mp3"),
                duration: 10.25,
            },
            SoundtrackSegment::Silence { duration: 2.5 },
        ];
        let args = soundtrack_args(&segments, Path::new("work/soundtrack.wav"));

        assert_eq!(&args[4..6], ["-i", "work/intro.mp3"]);
        assert_eq!(
            &args[6..12],
            ["-f", "lavfi", "-t", "2.500", "-i", "anullsrc=r=44100:cl=stereo"]
        );
        let filter_index = args
            .iter()
            .position(|arg| arg == "-filter_complex")
            .expect("filter graph present");
        let filter = &args[filter_index + 1];
        assert!(filter.contains("[0:a]aresample=44100"));
        assert!(filter.contains("apad=whole_dur=10.250,atrim=0:10.250"));
        assert!(filter.ends_with("[a0][a1]concat=n=2:v=0:a=1[out]"));
        assert_eq!(args.last().map(String::as_str), Some("work/soundtrack.wav"));
    }
}
