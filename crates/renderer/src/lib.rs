//! wgpu renderer for the hci frame loop.
//!
//! Provides both render contexts and the GPU stages they hand to the pipeline:
//!
//! ```text
//!   WindowedContext ─┐                 UploadStage ──▶ GpuAnalyzer ──▶ SurfaceDisplay
//!                    ├─ make_current ─▶      (TextureHandle)     │
//!   HeadlessContext ─┘     GpuDevice                             └─▶ readback ─▶ sink
//! ```
//!
//! Windowed runs are driven by a winit event loop and present through the
//! window swapchain; headless runs pump the callback with no surface at all.

mod compile;
mod gpu;
mod headless;
mod types;
mod window;

pub use gpu::{
    AnalyzerSettings, GpuAnalyzer, GpuDevice, GpuTexture, ModelPaths, SurfaceDisplay, UploadStage,
};
pub use headless::HeadlessContext;
pub use types::{AdapterProfile, DisplayTransform, GpuPowerPreference, WindowConfig};
pub use window::WindowedContext;
