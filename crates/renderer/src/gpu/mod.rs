//! wgpu implementation of the pipeline stages.
//!
//! - `context` owns adapter/device creation and the window swapchain, plus the
//!   texture table that backs every `TextureHandle`.
//! - `textures` uploads host frames, choosing the texture format from the
//!   channel layout.
//! - `analysis` renders the stand-in analysis pass and reads its output back.
//! - `display` draws the analysed texture into the window.
//! - `pipeline` holds the shared full-screen pipeline and bind layout helpers.
//! - `readback` copies textures into host memory with padded rows.
//! - `uniforms` mirrors the GLSL uniform blocks.

mod analysis;
mod context;
mod display;
mod pipeline;
mod readback;
mod textures;
mod uniforms;

pub use analysis::{AnalyzerSettings, GpuAnalyzer, ModelPaths};
pub use context::{GpuDevice, GpuTexture};
pub(crate) use context::SurfaceState;
pub use display::SurfaceDisplay;
pub use textures::UploadStage;
