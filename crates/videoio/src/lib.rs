//! Frame sources and the movie sink for hci.
//!
//! Movies are decoded and encoded by `ffmpeg` child processes talking raw
//! RGBA/BGRA over pipes; still images go through the `image` crate.

mod error;
mod ffmpeg;
mod images;
mod probe;
mod sink;
mod source;

pub use error::VideoError;
pub use ffmpeg::FfmpegSource;
pub use images::ImageSequenceSource;
pub use probe::StreamInfo;
pub use sink::{FfmpegSink, SinkSettings};
pub use source::{open_source, OpenedSource, SourceKind};
