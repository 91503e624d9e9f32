use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

/// Streams a looped, cover-cropped clip from ffmpeg as RGBA frames.
pub struct FfmpegInput {
    receiver: mpsc::Receiver<Vec<u8>>,
    worker: Option<JoinHandle<Result<()>>>,
    child: Child,
}

impl FfmpegInput {
    pub fn spawn(
        input_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        duration: f64,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let args = decoder_args(input_path, width, height, fps, duration);
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn ffmpeg decoder for {}", input_path.display()))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture ffmpeg stdout"))?;
        let frame_size = width as usize * height as usize * 4;

        let worker = thread::Builder::new()
            .name("reelcast-ffmpeg-decoder".to_owned())
            .spawn(move || {
                loop {
                    let mut buffer = vec![0u8; frame_size];
                    match stdout.read_exact(&mut buffer) {
                        Ok(()) => {
                            if sender.send(buffer).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                        Err(e) => return Err(anyhow!("failed to read from ffmpeg: {e}")),
                    }
                }
                Ok(())
            })
            .context("failed to spawn ffmpeg reader thread")?;

        Ok(Self {
            receiver,
            worker: Some(worker),
            child,
        })
    }

    /// Next frame, or `None` once the clip has ended.
    pub fn read_frame(&self) -> Option<Vec<u8>> {
        self.receiver.recv().ok()
    }

    pub fn finish(self) -> Result<()> {
        let Self {
            receiver,
            mut worker,
            mut child,
        } = self;
        drop(receiver);
        let _ = child.kill();
        let _ = child.wait();

        match worker.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow!("ffmpeg reader thread panicked")),
            },
            None => Ok(()),
        }
    }
}

pub fn decoder_args(input_path: &Path, width: u32, height: u32, fps: u32, duration: f64) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-stream_loop".to_owned(),
        "-1".to_owned(),
        "-i".to_owned(),
        input_path.to_string_lossy().into_owned(),
        "-t".to_owned(),
        format!("{duration:.3}"),
        "-an".to_owned(),
        "-vf".to_owned(),
        format!(
            "scale={width}:{height}:force_original_aspect_ratio=increase,crop={width}:{height}"
        ),
        "-r".to_owned(),
        fps.to_string(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-".to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::decoder_args;

    #[test]
    fn clips_are_looped_and_cover_cropped() {
        let args = decoder_args(Path::new("media/goal.mp4"), 1920, 1080, 30, 2.5);
        let joined = args.join(" ");
        assert!(joined.starts_with("-hide_banner -loglevel error -stream_loop -1 -i media/goal.mp4 -t 2.500"));
        assert!(joined.contains(
            "scale=1920:1080:force_original_aspect_ratio=increase,crop=1920:1080"
        ));
        assert!(joined.ends_with("-r 30 -f rawvideo -pix_fmt rgba -"));
    }
}
