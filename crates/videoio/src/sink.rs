use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{ensure, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use pipeline::{ChannelLayout, CompletionNotifier, Geometry, PixelView, RecordingSink, SinkState};

use crate::error::VideoError;

#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub path: PathBuf,
    pub fps: f64,
    pub codec: String,
    pub overwrite: bool,
    /// Frames buffered between the render thread and ffmpeg.
    pub queue_depth: usize,
}

impl SinkSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fps: 30.0,
            codec: "libx264".into(),
            overwrite: true,
            queue_depth: 4,
        }
    }
}

/// Recording sink that streams RGBA frames into an `ffmpeg` child process.
///
/// Writes are queued to an encoder thread that owns ffmpeg's stdin. If ffmpeg
/// dies or a pipe write fails, the sink stops reporting `good()` and the
/// render loop carries on without it.
pub struct FfmpegSink {
    settings: SinkSettings,
    geometry: Option<Geometry>,
    state: SinkState,
    healthy: Arc<AtomicBool>,
    frames: Option<Sender<Vec<u8>>>,
    finish: Option<Sender<CompletionNotifier>>,
    written: u64,
}

impl FfmpegSink {
    pub fn new(settings: SinkSettings) -> Result<Self, VideoError> {
        if !is_ffmpeg_on_path() {
            return Err(VideoError::Spawn {
                program: "ffmpeg",
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "ffmpeg is required for movie output but was not found on PATH",
                ),
            });
        }
        if !has_encoder(&settings.codec) {
            return Err(VideoError::Encode(format!(
                "ffmpeg has no '{}' encoder",
                settings.codec
            )));
        }
        Ok(Self::with_settings(settings))
    }

    fn with_settings(settings: SinkSettings) -> Self {
        Self {
            settings,
            geometry: None,
            state: SinkState::Unopened,
            healthy: Arc::new(AtomicBool::new(true)),
            frames: None,
            finish: None,
            written: 0,
        }
    }

    fn expect_state(&self, expected: SinkState) -> Result<(), VideoError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(VideoError::SinkState {
                expected,
                actual: self.state,
            })
        }
    }
}

impl RecordingSink for FfmpegSink {
    fn set_geometry(&mut self, width: u32, height: u32) -> Result<()> {
        self.expect_state(SinkState::Unopened)?;
        ensure!(
            width > 0 && height > 0,
            "recording geometry must be non-zero, got {width}x{height}"
        );
        self.geometry = Some(Geometry::new(width, height));
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.expect_state(SinkState::Unopened)?;
        let Some(geometry) = self.geometry else {
            anyhow::bail!("recording geometry must be set before begin");
        };

        let mut child = Command::new("ffmpeg")
            .args(encoder_args(&self.settings, geometry))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                self.state = SinkState::Failed;
                VideoError::Spawn {
                    program: "ffmpeg",
                    source,
                }
            })?;
        let (Some(stdin), Some(stderr)) = (child.stdin.take(), child.stderr.take()) else {
            let _ = child.kill();
            self.state = SinkState::Failed;
            return Err(VideoError::Encode("failed to open ffmpeg pipes".into()).into());
        };

        let (frame_tx, frame_rx) = bounded(self.settings.queue_depth.max(1));
        let (finish_tx, finish_rx) = bounded(1);
        let encoder = Encoder {
            child,
            stdin,
            stderr,
            frames: frame_rx,
            finish: finish_rx,
            healthy: self.healthy.clone(),
            path: self.settings.path.clone(),
        };
        thread::Builder::new()
            .name("hci-encode".into())
            .spawn(move || encoder.run())
            .map_err(|err| {
                self.state = SinkState::Failed;
                VideoError::Io(err)
            })?;

        self.frames = Some(frame_tx);
        self.finish = Some(finish_tx);
        self.state = SinkState::Recording;
        tracing::info!(
            path = %self.settings.path.display(),
            %geometry,
            fps = self.settings.fps,
            codec = %self.settings.codec,
            "recording started"
        );
        Ok(())
    }

    fn good(&self) -> bool {
        self.state == SinkState::Recording && self.healthy.load(Ordering::SeqCst)
    }

    fn write(&mut self, pixels: PixelView<'_>) -> Result<()> {
        self.expect_state(SinkState::Recording)?;
        if let Some(expected) = self.geometry {
            if pixels.geometry != expected {
                return Err(VideoError::Geometry {
                    path: self.settings.path.clone(),
                    expected,
                    actual: pixels.geometry,
                }
                .into());
            }
        }
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(VideoError::Encode("encoder is no longer accepting frames".into()).into());
        }

        let mut rgba = Vec::with_capacity(pixels.data.len());
        pixels.copy_as(ChannelLayout::Rgba8, &mut rgba);
        let sent = self
            .frames
            .as_ref()
            .map(|frames| frames.send(rgba).is_ok())
            .unwrap_or(false);
        if !sent {
            self.healthy.store(false, Ordering::SeqCst);
            return Err(VideoError::Encode("encoder thread has stopped".into()).into());
        }
        self.written += 1;
        Ok(())
    }

    fn end(mut self: Box<Self>, done: CompletionNotifier) {
        let Some(finish) = self.finish.take() else {
            // Never started, so there is nothing to flush.
            self.state = SinkState::Closed;
            done.notify();
            return;
        };
        self.state = SinkState::Finalizing;
        tracing::debug!(frames = self.written, "finalizing recording");
        // The encoder owns the notifier from here and fires it after ffmpeg exits.
        if let Err(err) = finish.send(done) {
            tracing::warn!("encoder exited before finalization");
            err.into_inner().notify();
        }
        drop(self.frames.take());
    }

    fn state(&self) -> SinkState {
        self.state
    }
}

struct Encoder {
    child: Child,
    stdin: ChildStdin,
    stderr: std::process::ChildStderr,
    frames: Receiver<Vec<u8>>,
    finish: Receiver<CompletionNotifier>,
    healthy: Arc<AtomicBool>,
    path: PathBuf,
}

impl Encoder {
    fn run(self) {
        let Encoder {
            mut child,
            mut stdin,
            mut stderr,
            frames,
            finish,
            healthy,
            path,
        } = self;

        let drain = thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = stderr.read_to_end(&mut bytes);
            bytes
        });

        let mut encoded = 0u64;
        for frame in frames.iter() {
            if let Err(err) = stdin.write_all(&frame) {
                healthy.store(false, Ordering::SeqCst);
                tracing::warn!(error = %err, frames = encoded, "ffmpeg stopped accepting frames");
                break;
            }
            encoded += 1;
        }
        drop(frames);
        drop(stdin);

        let status = child.wait();
        let stderr = drain.join().unwrap_or_default();
        match status {
            Ok(status) if status.success() => {
                tracing::info!(path = %path.display(), frames = encoded, "recording finalized");
            }
            Ok(status) => {
                healthy.store(false, Ordering::SeqCst);
                tracing::warn!(
                    %status,
                    stderr = %String::from_utf8_lossy(&stderr).trim(),
                    "ffmpeg exited with an error"
                );
            }
            Err(err) => {
                healthy.store(false, Ordering::SeqCst);
                tracing::warn!(error = %err, "failed to wait for ffmpeg");
            }
        }

        // Dropped without a notifier when the sink itself was dropped.
        if let Ok(done) = finish.recv() {
            done.notify();
        }
    }
}

fn encoder_args(settings: &SinkSettings, geometry: Geometry) -> Vec<String> {
    let mut args = vec![
        if settings.overwrite { "-y" } else { "-n" }.to_string(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        geometry.to_string(),
        "-r".into(),
        settings.fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-an".into(),
    ];
    // yuv420p needs even dimensions.
    args.extend([
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
        "-c:v".into(),
        settings.codec.clone(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);
    args.push(settings.path.display().to_string());
    args
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Asks ffmpeg whether `codec` names an encoder it was built with.
fn has_encoder(codec: &str) -> bool {
    let codec = codec.trim();
    if codec.is_empty() {
        return false;
    }
    Command::new("ffmpeg")
        .args(["-hide_banner", "-h"])
        .arg(format!("encoder={codec}"))
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map(|output| {
            output.status.success()
                && lists_encoder(&String::from_utf8_lossy(&output.stdout), codec)
        })
        .unwrap_or(false)
}

/// `ffmpeg -h encoder=NAME` opens with `Encoder NAME [...]` when the encoder
/// exists and prints a "not recognized" notice otherwise.
fn lists_encoder(help: &str, codec: &str) -> bool {
    help.lines().any(|line| {
        line.trim_start()
            .strip_prefix("Encoder ")
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|name| name == codec)
    })
}
