use anyhow::Result;

use crate::completion::CompletionNotifier;
use crate::frame::{ChannelLayout, Frame, Geometry, PixelView};
use crate::texture::TextureHandle;

/// Pull-based decoder producing one frame per request.
///
/// Indices are requested in increasing order starting at 0. `Ok(None)` marks
/// end of stream and every later call must keep returning it.
pub trait FrameSource {
    fn pull(&mut self, index: u64) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn pull(&mut self, index: u64) -> Result<Option<Frame>> {
        (**self).pull(index)
    }
}

/// Uploads host pixels into a GPU texture.
///
/// Single-buffered: each upload may overwrite the storage behind the handle it
/// returned last time.
pub trait TextureStage {
    fn upload(&mut self, frame: &Frame, layout: ChannelLayout) -> Result<TextureHandle>;
}

/// Consumes an uploaded texture and produces a processed one.
pub trait AnalysisStage {
    fn process(&mut self, input: &TextureHandle) -> Result<TextureHandle>;

    /// Delivers the most recent output of [`AnalysisStage::process`] as host
    /// pixels. The callback runs before this returns.
    fn extract_pixels(&mut self, deliver: &mut dyn FnMut(PixelView<'_>)) -> Result<()>;
}

/// Presents a texture to screen.
pub trait DisplaySurface {
    fn present(&mut self, texture: &TextureHandle) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Unopened,
    Recording,
    Finalizing,
    Closed,
    Failed,
}

/// Encodes analysed frames to a persisted movie.
///
/// `end` consumes the sink so it can only be finalized once; the notifier must
/// fire when the output is fully flushed.
pub trait RecordingSink {
    fn set_geometry(&mut self, width: u32, height: u32) -> Result<()>;

    fn begin(&mut self) -> Result<()>;

    /// True only while recording and no write has failed.
    fn good(&self) -> bool;

    fn write(&mut self, pixels: PixelView<'_>) -> Result<()>;

    fn end(self: Box<Self>, done: CompletionNotifier);

    fn state(&self) -> SinkState;
}

/// Frame source whose first frame has already been pulled to learn the run's
/// geometry. Index 0 is served from the stored frame.
pub struct PrimedSource<S> {
    inner: S,
    first: Option<Frame>,
    geometry: Geometry,
}

impl<S: FrameSource> PrimedSource<S> {
    /// Pulls index 0 from `inner`. Returns `None` when the source is empty.
    pub fn probe(mut inner: S) -> Result<Option<Self>> {
        let Some(first) = inner.pull(0)? else {
            return Ok(None);
        };
        let geometry = first.geometry();
        Ok(Some(Self {
            inner,
            first: Some(first),
            geometry,
        }))
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }
}

impl<S: FrameSource> FrameSource for PrimedSource<S> {
    fn pull(&mut self, index: u64) -> Result<Option<Frame>> {
        if index == 0 {
            if let Some(frame) = self.first.take() {
                return Ok(Some(frame));
            }
        }
        self.first = None;
        let frame = self.inner.pull(index)?;
        if let Some(frame) = &frame {
            anyhow::ensure!(
                frame.geometry() == self.geometry,
                "frame {} is {} but the stream started at {}",
                frame.index(),
                frame.geometry(),
                self.geometry
            );
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        total: u64,
        pulls: Vec<u64>,
    }

    impl FrameSource for Counting {
        fn pull(&mut self, index: u64) -> Result<Option<Frame>> {
            self.pulls.push(index);
            if index >= self.total {
                return Ok(None);
            }
            Ok(Some(Frame::new(index, 2, 2, ChannelLayout::Rgba8, vec![0; 16])?))
        }
    }

    #[test]
    fn probe_replays_the_first_frame() {
        let inner = Counting {
            total: 2,
            pulls: Vec::new(),
        };
        let mut primed = PrimedSource::probe(inner).unwrap().unwrap();
        assert_eq!(primed.geometry(), Geometry::new(2, 2));
        assert_eq!(primed.pull(0).unwrap().unwrap().index(), 0);
        assert_eq!(primed.pull(1).unwrap().unwrap().index(), 1);
        assert!(primed.pull(2).unwrap().is_none());
        assert_eq!(primed.inner.pulls, vec![0, 1, 2]);
    }

    #[test]
    fn probe_of_empty_source_pulls_once() {
        let inner = Counting {
            total: 0,
            pulls: Vec::new(),
        };
        assert!(PrimedSource::probe(inner).unwrap().is_none());
    }

    #[test]
    fn geometry_changes_mid_stream_are_rejected() {
        struct Shrinking(u64);
        impl FrameSource for Shrinking {
            fn pull(&mut self, index: u64) -> Result<Option<Frame>> {
                self.0 += 1;
                let side = if index == 0 { 2 } else { 1 };
                let len = (side * side * 4) as usize;
                Ok(Some(Frame::new(index, side, side, ChannelLayout::Rgba8, vec![0; len])?))
            }
        }
        let mut primed = PrimedSource::probe(Shrinking(0)).unwrap().unwrap();
        primed.pull(0).unwrap();
        assert!(primed.pull(1).is_err());
    }
}
