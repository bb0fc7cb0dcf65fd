use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use pipeline::{ChannelLayout, Frame, FrameSource};

use crate::error::VideoError;
use crate::probe::{probe_stream, StreamInfo};

/// Decoded frames buffered ahead of the pipeline.
const DECODE_QUEUE: usize = 3;

type Packet = Result<Vec<u8>, VideoError>;

/// Movie decoder backed by an `ffmpeg` child process.
///
/// ffmpeg writes raw four-channel frames to stdout; a reader thread slices
/// them into frames and hands them over through a bounded channel, so decoding
/// runs at most a few frames ahead of the render loop.
pub struct FfmpegSource {
    path: PathBuf,
    info: StreamInfo,
    layout: ChannelLayout,
    frames: Receiver<Packet>,
    next: u64,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path, layout: ChannelLayout) -> Result<Self, VideoError> {
        if !path.is_file() {
            return Err(VideoError::Open {
                path: path.to_path_buf(),
                reason: "not a file".into(),
            });
        }
        let info = probe_stream(path)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(decode_args(path, layout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = cmd.spawn().map_err(|source| VideoError::Spawn {
            program: "ffmpeg",
            source,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| VideoError::Open {
            path: path.to_path_buf(),
            reason: "failed to capture ffmpeg stdout".into(),
        })?;

        let (tx, rx) = bounded(DECODE_QUEUE);
        let frame_bytes = info.geometry.byte_len();
        thread::Builder::new()
            .name("hci-decode".into())
            .spawn(move || decode_loop(stdout, child, frame_bytes, tx))?;

        tracing::info!(
            path = %path.display(),
            geometry = %info.geometry,
            %layout,
            "decoding movie with ffmpeg"
        );
        Ok(Self {
            path: path.to_path_buf(),
            info,
            layout,
            frames: rx,
            next: 0,
            finished: false,
        })
    }

    pub fn stream(&self) -> StreamInfo {
        self.info
    }
}

impl FrameSource for FfmpegSource {
    fn pull(&mut self, index: u64) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        if index != self.next {
            return Err(VideoError::Decode {
                index,
                reason: format!("frames are decoded in order; next is {}", self.next),
            }
            .into());
        }

        match self.frames.recv() {
            Ok(Ok(data)) => {
                let geometry = self.info.geometry;
                let frame = Frame::new(index, geometry.width, geometry.height, self.layout, data)?;
                self.next += 1;
                Ok(Some(frame))
            }
            Ok(Err(err)) => {
                self.finished = true;
                Err(err.into())
            }
            Err(_) => {
                self.finished = true;
                tracing::debug!(frames = self.next, path = %self.path.display(), "end of movie");
                Ok(None)
            }
        }
    }
}

fn decode_args(path: &Path, layout: ChannelLayout) -> Vec<String> {
    let pix_fmt = match layout {
        ChannelLayout::Rgba8 => "rgba",
        ChannelLayout::Bgra8 => "bgra",
    };
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostdin".into(),
        // Keep the coded size ffprobe reported; rotation metadata is ignored.
        "-noautorotate".into(),
        "-i".into(),
        path.display().to_string(),
        "-an".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        pix_fmt.into(),
        "-".into(),
    ]
}

fn decode_loop(mut stdout: impl Read, mut child: Child, frame_bytes: usize, tx: Sender<Packet>) {
    let mut index = 0u64;
    loop {
        let mut buffer = vec![0u8; frame_bytes];
        match read_frame(&mut stdout, &mut buffer) {
            Ok(true) => {
                if tx.send(Ok(buffer)).is_err() {
                    // Consumer is gone; stop decoding.
                    break;
                }
                index += 1;
            }
            Ok(false) => {
                match child.wait() {
                    Ok(status) if !status.success() => {
                        let _ = tx.send(Err(VideoError::Decode {
                            index,
                            reason: format!("ffmpeg exited with {status}"),
                        }));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let _ = tx.send(Err(err.into()));
                    }
                }
                return;
            }
            Err(err) => {
                let _ = tx.send(Err(VideoError::Decode {
                    index,
                    reason: err.to_string(),
                }));
                break;
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Fills `buf` with exactly one frame.
///
/// Returns `Ok(false)` on a clean end of stream (no bytes at a frame boundary)
/// and an error when the stream stops partway through a frame.
fn read_frame(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    match filled {
        0 => Ok(false),
        n if n == buf.len() => Ok(true),
        n => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("truncated frame: {n} of {} bytes", buf.len()),
        )),
    }
}
