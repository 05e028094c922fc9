use crate::{Codec, Frame, RenderError};
use glam::UVec2;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::Receiver;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EncodeSettings {
    /// Size of the raw frames received.
    pub input_size: UVec2,
    /// Size of the encoded video.
    pub output_size: UVec2,
    pub fps: f32,
    pub codec: Codec,
}

/// Consumes frames until the sender hangs up and writes them to `output`.
///
/// Returning early drops the receiver, which stops the producer.
pub trait FrameEncoder: Sync {
    fn encode(
        &self,
        frames: Receiver<Frame>,
        output: &Path,
        settings: &EncodeSettings,
    ) -> Result<(), RenderError>;
}

/// Streams raw RGBA frames into an `ffmpeg` child process over stdin.
#[derive(Clone, Debug)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn args(&self, output: &Path, settings: &EncodeSettings) -> Vec<String> {
        let input = settings.input_size;
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.extend([
            "-s".to_string(),
            format!("{}x{}", input.x, input.y),
            "-r".to_string(),
            settings.fps.to_string(),
            "-i".to_string(),
            "-".to_string(),
        ]);
        args.extend(settings.codec.output_args(settings.output_size));
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn encode(
        &self,
        frames: Receiver<Frame>,
        output: &Path,
        settings: &EncodeSettings,
    ) -> Result<(), RenderError> {
        let args = self.args(output, settings);
        log::debug!("{} {}", self.program.display(), args.join(" "));
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RenderError::Encoder {
                message: format!("failed to start {}: {e}", self.program.display()),
            })?;

        // Drain stderr concurrently so a chatty encoder cannot block on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let mut written = 0usize;
        let mut write_error = None;
        if let Some(mut stdin) = child.stdin.take() {
            for frame in frames.iter() {
                if let Err(e) = stdin.write_all(&frame.pixels) {
                    write_error = Some(e);
                    break;
                }
                written += 1;
            }
        }

        let status = child.wait()?;
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(RenderError::Encoder {
                message: format!("ffmpeg exited with {status}: {}", stderr.trim()),
            });
        }
        if let Some(e) = write_error {
            return Err(RenderError::Encoder {
                message: format!("failed to write frame {written}: {e}"),
            });
        }
        log::debug!("encoded {written} frames to {}", output.display());
        Ok(())
    }
}
