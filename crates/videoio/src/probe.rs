use std::path::Path;
use std::process::{Command, Stdio};

use pipeline::Geometry;
use serde::Deserialize;

use crate::error::VideoError;

/// What ffprobe reports about the first video stream of a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub geometry: Geometry,
    pub fps: Option<f64>,
    pub frame_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    // ffprobe emits this as a string.
    nb_frames: Option<String>,
}

fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-select_streams".into(),
        "v:0".into(),
        "-show_entries".into(),
        "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames".into(),
        "-of".into(),
        "json".into(),
        path.display().to_string(),
    ]
}

/// Runs ffprobe on `path`.
pub(crate) fn probe_stream(path: &Path) -> Result<StreamInfo, VideoError> {
    let output = Command::new("ffprobe")
        .args(probe_args(path))
        .stdin(Stdio::null())
        .output()
        .map_err(|source| VideoError::Spawn {
            program: "ffprobe",
            source,
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VideoError::Probe(format!(
            "{} exited with {}: {}",
            path.display(),
            output.status,
            stderr.trim()
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let info = parse_probe(&stdout)?;
    tracing::debug!(
        path = %path.display(),
        geometry = %info.geometry,
        fps = ?info.fps,
        frames = ?info.frame_count,
        "probed video stream"
    );
    Ok(info)
}

fn parse_probe(json: &str) -> Result<StreamInfo, VideoError> {
    let output: ProbeOutput =
        serde_json::from_str(json).map_err(|err| VideoError::Probe(err.to_string()))?;
    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| VideoError::Probe("no video stream".into()))?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        (w, h) => {
            return Err(VideoError::Probe(format!(
                "video stream has no usable size ({w:?}x{h:?})"
            )))
        }
    };
    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));
    let frame_count = stream.nb_frames.as_deref().and_then(|n| n.parse().ok());

    Ok(StreamInfo {
        geometry: Geometry::new(width, height),
        fps,
        frame_count,
    })
}

/// Parses an ffmpeg rational such as `30000/1001`. `0/0` means unknown.
fn parse_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
