use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::completion::{self, CompletionError};
use crate::context::{LoopExit, RenderContext};
use crate::frame::{ChannelLayout, Geometry};
use crate::pipeline::FramePipeline;
use crate::stage::{
    AnalysisStage, DisplaySurface, FrameSource, PrimedSource, RecordingSink, TextureStage,
};

/// GPU stages built once the render context is current.
pub struct Stages {
    pub textures: Box<dyn TextureStage>,
    pub analysis: Box<dyn AnalysisStage>,
    pub display: Option<Box<dyn DisplaySurface>>,
}

/// Outcome of a run that got past setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed { frames: u64, exit: LoopExit },
    /// The first pull was already empty; nothing was sized or allocated.
    NoFrames,
}

impl RunStatus {
    pub const NO_FRAMES_EXIT_CODE: u8 = 2;

    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Completed { .. } => 0,
            RunStatus::NoFrames => Self::NO_FRAMES_EXIT_CODE,
        }
    }
}

/// One end-to-end run: probe the source, size the context, wire the stages,
/// drive the loop and finalize the sink.
pub struct Session {
    source: Box<dyn FrameSource>,
    sink: Option<Box<dyn RecordingSink>>,
    layout: ChannelLayout,
}

impl Session {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            sink: None,
            layout: ChannelLayout::platform(),
        }
    }

    /// Sink to open once the stream geometry is known. It must be unopened.
    pub fn with_sink(mut self, sink: Option<Box<dyn RecordingSink>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Runs to completion on `context`. `build` receives the current device
    /// and the stream geometry and returns the GPU stages.
    ///
    /// A sink that was begun is always finalized, even when the loop fails,
    /// and this only returns after its completion signal has fired.
    pub fn run<C, F>(self, context: &mut C, build: F) -> Result<RunStatus>
    where
        C: RenderContext,
        F: FnOnce(&mut C, C::Device, Geometry) -> Result<Stages>,
    {
        let Session {
            source,
            sink,
            layout,
        } = self;

        let Some(source) = PrimedSource::probe(source).context("failed to read the first frame")?
        else {
            warn!("no frames available in input");
            return Ok(RunStatus::NoFrames);
        };
        let geometry = source.geometry();
        info!(%geometry, %layout, "stream geometry");

        context
            .resize(geometry.width, geometry.height)
            .context("failed to size render surface")?;
        let device = context.make_current()?;
        let stages = build(context, device, geometry)?;

        let sink = sink.and_then(|mut sink| match open_sink(sink.as_mut(), geometry) {
            Ok(()) => Some(sink),
            Err(err) => {
                warn!(error = %err, "recording disabled; sink failed to start");
                None
            }
        });

        let mut pipeline = FramePipeline::new(Box::new(source), stages.textures, stages.analysis)
            .with_display(stages.display)
            .with_sink(sink)
            .with_layout(layout);

        let outcome = context.run(&mut || pipeline.step());
        let frames = pipeline.frames_processed();
        let finalized = pipeline.take_sink().map(finalize_sink).transpose();

        let exit = outcome?;
        finalized.context("recording sink did not finish")?;
        info!(frames, ?exit, "run complete");
        Ok(RunStatus::Completed { frames, exit })
    }
}

fn open_sink(sink: &mut dyn RecordingSink, geometry: Geometry) -> Result<()> {
    sink.set_geometry(geometry.width, geometry.height)?;
    sink.begin()
}

/// Ends the sink and blocks until its flush completes.
fn finalize_sink(sink: Box<dyn RecordingSink>) -> Result<(), CompletionError> {
    let (done, waiter) = completion::channel();
    debug!("finalizing recording sink");
    sink.end(done);
    waiter.wait()?;
    debug!("recording sink finalized");
    Ok(())
}
