use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, trace, warn, Level};

use crate::frame::ChannelLayout;
use crate::stage::{AnalysisStage, DisplaySurface, FrameSource, RecordingSink, TextureStage};

const THROUGHPUT_INTERVAL: Duration = Duration::from_secs(1);

/// The per-frame body shared by every render context.
///
/// Each [`FramePipeline::step`] pulls one frame and pushes it through upload,
/// analysis, the optional display and the optional sink, in that order.
pub struct FramePipeline {
    source: Box<dyn FrameSource>,
    textures: Box<dyn TextureStage>,
    analysis: Box<dyn AnalysisStage>,
    display: Option<Box<dyn DisplaySurface>>,
    sink: Option<Box<dyn RecordingSink>>,
    layout: ChannelLayout,
    counter: u64,
    exhausted: bool,
    sink_degraded: bool,
    throughput: Throughput,
}

impl FramePipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        textures: Box<dyn TextureStage>,
        analysis: Box<dyn AnalysisStage>,
    ) -> Self {
        Self {
            source,
            textures,
            analysis,
            display: None,
            sink: None,
            layout: ChannelLayout::platform(),
            counter: 0,
            exhausted: false,
            sink_degraded: false,
            throughput: Throughput::new(),
        }
    }

    pub fn with_display(mut self, display: Option<Box<dyn DisplaySurface>>) -> Self {
        self.display = display;
        self
    }

    /// Attaches an already opened sink.
    pub fn with_sink(mut self, sink: Option<Box<dyn RecordingSink>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Number of frames successfully pulled so far.
    pub fn frames_processed(&self) -> u64 {
        self.counter
    }

    /// Detaches the sink so it can be finalized.
    pub fn take_sink(&mut self) -> Option<Box<dyn RecordingSink>> {
        self.sink.take()
    }

    /// Processes one frame. Returns `Ok(false)` once the source is exhausted,
    /// including on every call after that.
    pub fn step(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }

        let index = self.counter;
        let frame = self
            .source
            .pull(index)
            .with_context(|| format!("failed to pull frame {index}"))?;
        let Some(frame) = frame else {
            self.exhausted = true;
            debug!(frames = self.counter, "frame source exhausted");
            return Ok(false);
        };
        self.counter += 1;

        if tracing::enabled!(Level::TRACE) {
            let [r, g, b, a] = frame.channel_means();
            trace!(index, r, g, b, a, "frame mean");
        }

        let uploaded = self
            .textures
            .upload(&frame, self.layout)
            .with_context(|| format!("failed to upload frame {index}"))?;
        let analysed = self
            .analysis
            .process(&uploaded)
            .with_context(|| format!("analysis failed on frame {index}"))?;

        if let Some(display) = self.display.as_mut() {
            display
                .present(&analysed)
                .with_context(|| format!("failed to present frame {index}"))?;
        }

        self.record(index)?;
        self.throughput.tick(self.counter);
        Ok(true)
    }

    fn record(&mut self, index: u64) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        if self.sink_degraded || !sink.good() {
            if !self.sink_degraded {
                warn!(index, state = ?sink.state(), "recording sink unhealthy; skipping further writes");
                self.sink_degraded = true;
            }
            return Ok(());
        }

        let mut written = Ok(());
        self.analysis
            .extract_pixels(&mut |pixels| written = sink.write(pixels))
            .with_context(|| format!("failed to read back frame {index}"))?;
        if let Err(err) = written {
            warn!(index, error = %err, "recording sink rejected frame; skipping further writes");
            self.sink_degraded = true;
        }
        Ok(())
    }
}

struct Throughput {
    window_start: Instant,
    window_frames: u64,
}

impl Throughput {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            window_frames: 0,
        }
    }

    fn tick(&mut self, total: u64) {
        self.window_frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= THROUGHPUT_INTERVAL {
            let fps = self.window_frames as f64 / elapsed.as_secs_f64();
            debug!(frames = total, fps = format_args!("{fps:.1}"), "frames processed");
            self.window_start = Instant::now();
            self.window_frames = 0;
        }
    }
}
