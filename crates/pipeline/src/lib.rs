//! Frame-loop orchestration for the analysis pipeline.
//!
//! ```text
//!  FrameSource ──pull──▶ TextureStage ──upload──▶ AnalysisStage ──process──┬─▶ DisplaySurface
//!                                                                         └─extract─▶ RecordingSink
//! ```
//!
//! A [`RenderContext`] owns the scheduling: windowed contexts run the
//! [`FramePipeline`] from their event loop, headless ones [`pump`] it. The
//! pipeline body itself never knows which.

pub mod completion;
pub mod context;
pub mod frame;
pub mod pipeline;
pub mod session;
pub mod stage;
pub mod texture;

pub use completion::{CompletionError, CompletionNotifier, CompletionWaiter};
pub use context::{
    pump, ContextError, ContextState, FrameCallback, Lifecycle, LoopExit, RenderContext,
};
pub use frame::{swap_red_blue, ChannelLayout, Frame, FrameError, Geometry, PixelView};
pub use pipeline::FramePipeline;
pub use session::{RunStatus, Session, Stages};
pub use stage::{
    AnalysisStage, DisplaySurface, FrameSource, PrimedSource, RecordingSink, SinkState,
    TextureStage,
};
pub use texture::{TextureError, TextureHandle, TextureSlots};
