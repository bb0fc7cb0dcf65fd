use std::path::Path;

use pipeline::{ChannelLayout, FrameSource};

use crate::error::VideoError;
use crate::ffmpeg::FfmpegSource;
use crate::images::{is_image_path, ImageSequenceSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Movie,
    Images,
}

/// A frame source chosen from the input path, plus what is known about its
/// timing.
pub struct OpenedSource {
    pub source: Box<dyn FrameSource>,
    pub kind: SourceKind,
    /// Native frame rate when the container reports one.
    pub fps: Option<f64>,
}

fn source_kind(path: &Path) -> SourceKind {
    let is_list = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    if path.is_dir() || is_list || is_image_path(path) {
        SourceKind::Images
    } else {
        SourceKind::Movie
    }
}

/// Opens `path` as a movie, an image directory, a `.txt` image list, or a
/// single image.
pub fn open_source(path: &Path, layout: ChannelLayout) -> Result<OpenedSource, VideoError> {
    let kind = source_kind(path);
    let opened = match kind {
        SourceKind::Images => OpenedSource {
            source: Box::new(ImageSequenceSource::open(path, layout)?),
            kind,
            fps: None,
        },
        SourceKind::Movie => {
            let movie = FfmpegSource::open(path, layout)?;
            let fps = movie.stream().fps;
            OpenedSource {
                source: Box::new(movie),
                kind,
                fps,
            }
        }
    };
    tracing::debug!(path = %path.display(), ?kind, "selected frame source");
    Ok(opened)
}
