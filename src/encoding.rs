use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::schema::EncodingConfig;

pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FfmpegMode {
    #[default]
    Auto,
    System,
    Sidecar,
}

/// Everything the encoder needs besides the frames themselves.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub crf: u8,
    pub preset: String,
    pub audio: Option<PathBuf>,
}

impl EncoderSettings {
    pub fn new(width: u32, height: u32, fps: u32, encoding: &EncodingConfig) -> Self {
        Self {
            width,
            height,
            fps,
            crf: encoding.crf,
            preset: encoding.preset.clone(),
            audio: None,
        }
    }

    pub fn with_audio(mut self, audio: &Path) -> Self {
        self.audio = Some(audio.to_path_buf());
        self
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

trait VideoEncoderBackend: Send {
    fn mode_label(&self) -> &'static str;
    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()>;
}

struct SystemFfmpegBackend {
    settings: EncoderSettings,
    output_path: PathBuf,
}

#[cfg(feature = "sidecar_ffmpeg")]
struct SidecarFfmpegBackend {
    settings: EncoderSettings,
    output_path: PathBuf,
}

impl FfmpegPipe {
    pub fn spawn(settings: &EncoderSettings, output_path: &Path) -> Result<Self> {
        Self::spawn_with_mode(settings, output_path, FfmpegMode::Auto)
    }

    pub fn spawn_with_mode(
        settings: &EncoderSettings,
        output_path: &Path,
        mode: FfmpegMode,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let backend = select_backend(mode, settings.clone(), output_path.to_path_buf())?;
        let worker_name = format!("reelcast-ffmpeg-encoder-{}", backend.mode_label());

        let worker = thread::Builder::new()
            .name(worker_name)
            .spawn(move || backend.run(receiver))
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn write_frame(&self, rgba_frame: Vec<u8>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        sender
            .send(rgba_frame)
            .map_err(|_| anyhow!("failed to enqueue frame for ffmpeg"))
    }

    pub fn finish(mut self) -> Result<()> {
        drop(self.sender.take());

        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("ffmpeg worker thread panicked")),
        }
    }
}

fn select_backend(
    mode: FfmpegMode,
    settings: EncoderSettings,
    output_path: PathBuf,
) -> Result<Box<dyn VideoEncoderBackend>> {
    match mode {
        FfmpegMode::Auto | FfmpegMode::System => Ok(Box::new(SystemFfmpegBackend {
            settings,
            output_path,
        })),
        FfmpegMode::Sidecar => {
            #[cfg(feature = "sidecar_ffmpeg")]
            {
                Ok(Box::new(SidecarFfmpegBackend {
                    settings,
                    output_path,
                }))
            }
            #[cfg(not(feature = "sidecar_ffmpeg"))]
            {
                let _ = (settings, output_path);
                Err(anyhow!(
                    "ffmpeg sidecar mode requested but reelcast was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`."
                ))
            }
        }
    }
}

impl VideoEncoderBackend for SystemFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "system"
    }

    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        run_ffmpeg_process(
            Path::new("ffmpeg"),
            receiver,
            &self.settings,
            &self.output_path,
            self.mode_label(),
        )
    }
}

#[cfg(feature = "sidecar_ffmpeg")]
impl VideoEncoderBackend for SidecarFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "sidecar"
    }

    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            ffmpeg_sidecar::download::auto_download()
                .context("failed to auto-download ffmpeg sidecar binary")?;
        }
        run_ffmpeg_process(
            &path,
            receiver,
            &self.settings,
            &self.output_path,
            self.mode_label(),
        )
    }
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    receiver: mpsc::Receiver<Vec<u8>>,
    settings: &EncoderSettings,
    output_path: &Path,
    mode_label: &str,
) -> Result<()> {
    let path_str = output_path.to_string_lossy();
    if path_str.len() > 1024 {
        bail!("Output path is suspiciously long");
    }
    if path_str.chars().any(|c| c.is_control()) {
        bail!("Output path contains invalid control characters");
    }

    let args = ffmpeg_args(settings, output_path);
    debug!(mode = mode_label, "ffmpeg {}", args.join(" "));
    let mut command = Command::new(ffmpeg_path);
    command
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "ffmpeg executable not found (mode={mode_label}, resolved_path={}). Install ffmpeg (system mode) or use sidecar mode with `--features sidecar_ffmpeg`.",
                    ffmpeg_path.display()
                )
            } else {
                anyhow!(
                    "failed to spawn ffmpeg process (mode={mode_label}, resolved_path={}, args='{}'): {error}",
                    ffmpeg_path.display(),
                    args.join(" ")
                )
            }
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();
    let expected_len = settings.frame_len();

    while let Ok(frame) = receiver.recv() {
        if frame.len() != expected_len {
            bail!(
                "frame has {} bytes, expected {} for {}x{} rgba",
                frame.len(),
                expected_len,
                settings.width,
                settings.height
            );
        }
        stdin
            .write_all(&frame)
            .context("failed to write frame to ffmpeg stdin")?;
    }

    stdin.flush().context("failed to flush ffmpeg stdin")?;
    drop(stdin);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        return Err(anyhow!(
            "ffmpeg failed with status {status} (mode={mode_label}, resolved_path={}, args='{}', stderr_tail='{}')",
            ffmpeg_path.display(),
            args.join(" "),
            stderr_tail
        ));
    }

    Ok(())
}

pub fn ffmpeg_args(settings: &EncoderSettings, output_path: &Path) -> Vec<String> {
    let size = format!("{}x{}", settings.width, settings.height);
    let mut args = ffmpeg_rawvideo_input_args(&size, &settings.fps.to_string());
    if let Some(audio) = &settings.audio {
        args.extend(ffmpeg_audio_input_args(audio));
    }
    args.extend(ffmpeg_h264_output_args(settings));
    args.extend(ffmpeg_container_output_args(output_path));

    args.push(output_path.to_string_lossy().into_owned());
    args
}

pub fn ffmpeg_rawvideo_input_args(size: &str, fps: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        size.to_owned(),
        "-r".to_owned(),
        fps.to_owned(),
        "-i".to_owned(),
        "-".to_owned(),
    ]
}

pub fn ffmpeg_audio_input_args(audio: &Path) -> Vec<String> {
    vec![
        "-i".to_owned(),
        audio.to_string_lossy().into_owned(),
        "-map".to_owned(),
        "0:v:0".to_owned(),
        "-map".to_owned(),
        "1:a:0".to_owned(),
    ]
}

pub fn ffmpeg_h264_output_args(settings: &EncoderSettings) -> Vec<String> {
    let mut args = vec![
        "-c:v".to_owned(),
        "libx264".to_owned(),
        "-preset".to_owned(),
        settings.preset.clone(),
        "-crf".to_owned(),
        settings.crf.to_string(),
        "-pix_fmt".to_owned(),
        "yuv420p".to_owned(),
    ];
    if settings.audio.is_some() {
        args.extend([
            "-c:a".to_owned(),
            "aac".to_owned(),
            "-b:a".to_owned(),
            "192k".to_owned(),
            "-shortest".to_owned(),
        ]);
    } else {
        args.push("-an".to_owned());
    }
    args
}

pub fn ffmpeg_container_output_args(output_path: &Path) -> Vec<String> {
    let ext = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(ext.as_str(), "mov" | "mp4" | "m4v") {
        vec!["-movflags".to_owned(), "+faststart".to_owned()]
    } else {
        Vec::new()
    }
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

pub(crate) fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{ffmpeg_args, last_n_chars, EncoderSettings, FfmpegMode};
    use crate::schema::EncodingConfig;

    fn settings() -> EncoderSettings {
        EncoderSettings::new(1080, 1920, 30, &EncodingConfig::default())
    }

    #[test]
    fn silent_encode_args_are_stable() {
        let args = ffmpeg_args(&settings(), Path::new("out/short.mp4"));
        assert_eq!(
            args.join(" "),
            "-hide_banner -loglevel error -y -f rawvideo -pix_fmt rgba -s:v 1080x1920 -r 30 -i - \
             -c:v libx264 -preset medium -crf 20 -pix_fmt yuv420p -an -movflags +faststart out/short.mp4"
        );
    }

    #[test]
    fn soundtrack_is_mapped_and_encoded_as_aac() {
        let args = ffmpeg_args(
            &settings().with_audio(Path::new("work/soundtrack.wav")),
            Path::new("out/short.mkv"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-i - -i work/soundtrack.wav -map 0:v:0 -map 1:a:0"));
        assert!(joined.contains("-c:a aac -b:a 192k -shortest"));
        assert!(!joined.contains("-movflags"));
        assert!(!joined.contains("-an"));
    }

    #[test]
    fn frame_len_is_rgba() {
        assert_eq!(settings().frame_len(), 1080 * 1920 * 4);
    }

    #[test]
    fn mode_parses_from_yaml() {
        let mode: FfmpegMode = serde_yaml::from_str("sidecar").expect("mode should parse");
        assert_eq!(mode, FfmpegMode::Sidecar);
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        assert_eq!(last_n_chars("  abcdef  ", 4), "ef");
        assert_eq!(last_n_chars("abc", 10), "abc");
    }
}
