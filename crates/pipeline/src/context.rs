use anyhow::Result;

/// Lifecycle of a render context. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Ready,
    Running,
    Stopped,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("render context has stopped and cannot be reused")]
    Stopped,
    #[error("render context is already running")]
    AlreadyRunning,
    #[error("render context has not been made current")]
    NotCurrent,
    #[error("render context is not initialised")]
    Uninitialized,
}

/// Why a run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The frame callback reported that the source ran dry.
    Exhausted,
    /// The user closed the window before the source ran dry.
    Closed,
}

/// Per-frame callback driven by a render context. `Ok(false)` ends the run.
pub type FrameCallback<'a> = dyn FnMut() -> Result<bool> + 'a;

/// Owner of the GPU context and the iteration discipline for one run.
///
/// Implementations differ only in scheduling: a windowed context lets its
/// event loop invoke the callback once per redraw, a headless one spins on it.
/// The per-frame code is written once against this trait.
pub trait RenderContext {
    /// Handle to GPU resources, only obtainable once the context is current.
    type Device;

    fn state(&self) -> ContextState;

    /// Activates the GPU context for the calling thread.
    fn make_current(&mut self) -> Result<Self::Device>;

    /// Resizes the drawable surface. Headless contexts ignore this.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Drives `frame` until it returns `false`, errors, or the loop is closed.
    fn run(&mut self, frame: &mut FrameCallback<'_>) -> Result<LoopExit>;
}

/// State bookkeeping shared by render context implementations.
#[derive(Debug)]
pub struct Lifecycle {
    state: ContextState,
    current: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_current(&self) -> bool {
        self.current
    }

    /// Construction finished: `Uninitialized → Ready`.
    pub fn ready(&mut self) {
        if self.state == ContextState::Uninitialized {
            self.state = ContextState::Ready;
        }
    }

    pub fn mark_current(&mut self) -> Result<(), ContextError> {
        match self.state {
            ContextState::Uninitialized => Err(ContextError::Uninitialized),
            ContextState::Stopped => Err(ContextError::Stopped),
            ContextState::Ready | ContextState::Running => {
                self.current = true;
                Ok(())
            }
        }
    }

    pub fn ensure_resizable(&self) -> Result<(), ContextError> {
        match self.state {
            ContextState::Ready | ContextState::Running => Ok(()),
            ContextState::Uninitialized => Err(ContextError::Uninitialized),
            ContextState::Stopped => Err(ContextError::Stopped),
        }
    }

    /// `Ready → Running`. The context must already be current.
    pub fn begin_run(&mut self) -> Result<(), ContextError> {
        match self.state {
            ContextState::Uninitialized => Err(ContextError::Uninitialized),
            ContextState::Running => Err(ContextError::AlreadyRunning),
            ContextState::Stopped => Err(ContextError::Stopped),
            ContextState::Ready if !self.current => Err(ContextError::NotCurrent),
            ContextState::Ready => {
                self.state = ContextState::Running;
                Ok(())
            }
        }
    }

    /// Terminal transition; the context cannot run again.
    pub fn finish_run(&mut self) {
        self.state = ContextState::Stopped;
        self.current = false;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: ContextState::Uninitialized,
            current: false,
        }
    }
}

/// Calls `frame` back to back until it returns `false`, with no yielding.
///
/// Returns the number of invocations, including the final one.
pub fn pump(frame: &mut FrameCallback<'_>) -> Result<u64> {
    let mut calls = 0u64;
    loop {
        calls += 1;
        if !frame()? {
            return Ok(calls);
        }
    }
}
