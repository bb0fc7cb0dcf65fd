use anyhow::Result;
use pipeline::{pump, ContextState, FrameCallback, Lifecycle, LoopExit, RenderContext};

use crate::gpu::GpuDevice;
use crate::types::GpuPowerPreference;

/// Render context without a window, for offline batch runs.
///
/// `run` spins on the frame callback on the calling thread until it reports
/// exhaustion; nothing is presented.
pub struct HeadlessContext {
    gpu: GpuDevice,
    lifecycle: Lifecycle,
    frames: u64,
}

impl HeadlessContext {
    pub fn new(power: GpuPowerPreference) -> Result<Self> {
        let gpu = GpuDevice::headless(power)?;
        let mut lifecycle = Lifecycle::new();
        lifecycle.ready();
        tracing::info!(adapter = %gpu.profile().name, "headless render context ready");
        Ok(Self {
            gpu,
            lifecycle,
            frames: 0,
        })
    }

    /// Callback invocations performed by the last run.
    pub fn callbacks(&self) -> u64 {
        self.frames
    }
}

impl RenderContext for HeadlessContext {
    type Device = GpuDevice;

    fn state(&self) -> ContextState {
        self.lifecycle.state()
    }

    fn make_current(&mut self) -> Result<GpuDevice> {
        self.lifecycle.mark_current()?;
        Ok(self.gpu.clone())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.lifecycle.ensure_resizable()?;
        tracing::trace!(width, height, "headless context ignores resize");
        Ok(())
    }

    fn run(&mut self, frame: &mut FrameCallback<'_>) -> Result<LoopExit> {
        self.lifecycle.begin_run()?;
        let result = pump(frame);
        self.lifecycle.finish_run();
        self.frames = result?;
        Ok(LoopExit::Exhausted)
    }
}
