use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use pipeline::{ContextError, ContextState, FrameCallback, Lifecycle, LoopExit, RenderContext};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::gpu::{GpuDevice, SurfaceDisplay, SurfaceState};
use crate::types::{DisplayTransform, GpuPowerPreference, WindowConfig};

/// Render context that owns a native window and its event loop.
///
/// The event loop schedules the frame callback once per redraw and presents
/// whatever the display surface rendered during that callback. Closing the
/// window or pressing Escape ends the run early.
pub struct WindowedContext {
    // Declared before `window` so the swapchain is dropped first.
    surface: Rc<RefCell<SurfaceState>>,
    gpu: GpuDevice,
    window: Arc<Window>,
    event_loop: Option<EventLoop<()>>,
    lifecycle: Lifecycle,
}

impl WindowedContext {
    pub fn new(config: &WindowConfig, power: GpuPowerPreference) -> Result<Self> {
        let mut builder = EventLoopBuilder::new();
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            use winit::platform::wayland::EventLoopBuilderExtWayland;
            EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
        }

        #[cfg(any(
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        ))]
        {
            use winit::platform::x11::EventLoopBuilderExtX11;
            EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
        }
        let event_loop = builder
            .build()
            .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

        let (width, height) = config.initial_size;
        let window = WindowBuilder::new()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(width, height))
            .with_visible(config.visible)
            .build(&event_loop)
            .map_err(|err| anyhow!("failed to create display window: {err}"))?;
        let window = Arc::new(window);

        let size = window.inner_size();
        let (gpu, surface) =
            GpuDevice::with_surface(window.as_ref(), (size.width, size.height), power)?;
        tracing::info!(
            adapter = %gpu.profile().name,
            width = size.width,
            height = size.height,
            "windowed render context ready"
        );

        let mut lifecycle = Lifecycle::new();
        lifecycle.ready();
        Ok(Self {
            surface: Rc::new(RefCell::new(surface)),
            gpu,
            window,
            event_loop: Some(event_loop),
            lifecycle,
        })
    }

    /// Display surface drawing into this window with a fixed transform.
    pub fn display_surface(&self, transform: DisplayTransform) -> Result<SurfaceDisplay> {
        if !self.lifecycle.is_current() {
            return Err(ContextError::NotCurrent.into());
        }
        Ok(SurfaceDisplay::new(
            self.gpu.clone(),
            self.surface.clone(),
            transform,
        ))
    }
}

impl RenderContext for WindowedContext {
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
        self.gpu.check_dimensions(width, height)?;
        // Some platforms apply the size later and report it through `Resized`.
        if let Some(applied) = self.window.request_inner_size(PhysicalSize::new(width, height)) {
            self.surface
                .borrow_mut()
                .resize(applied.width, applied.height);
        }
        tracing::debug!(width, height, "requested window size");
        Ok(())
    }

    fn run(&mut self, frame: &mut FrameCallback<'_>) -> Result<LoopExit> {
        self.lifecycle.begin_run()?;
        let Some(event_loop) = self.event_loop.take() else {
            self.lifecycle.finish_run();
            return Err(ContextError::Stopped.into());
        };

        let window = self.window.clone();
        let surface = self.surface.clone();
        let mut exit = LoopExit::Closed;
        let mut failure = None;

        window.request_redraw();
        let run_result = event_loop.run(|event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    tracing::info!("window closed");
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } if is_escape(&event) => {
                    tracing::info!("escape pressed; closing window");
                    elwt.exit();
                }
                WindowEvent::Resized(new_size) => {
                    surface
                        .borrow_mut()
                        .resize(new_size.width, new_size.height);
                }
                WindowEvent::RedrawRequested => {
                    if elwt.exiting() {
                        return;
                    }
                    match frame() {
                        Ok(true) => {
                            window.pre_present_notify();
                            surface.borrow_mut().present_pending();
                        }
                        Ok(false) => {
                            exit = LoopExit::Exhausted;
                            elwt.exit();
                        }
                        Err(err) => {
                            failure = Some(err);
                            elwt.exit();
                        }
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                if !elwt.exiting() {
                    window.request_redraw();
                    elwt.set_control_flow(ControlFlow::Wait);
                }
            }
            _ => {}
        });
        self.lifecycle.finish_run();

        if let Some(err) = failure {
            return Err(err);
        }
        run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;
        Ok(exit)
    }
}

fn is_escape(event: &KeyEvent) -> bool {
    event.state == ElementState::Pressed
        && !event.repeat
        && matches!(event.logical_key, Key::Named(NamedKey::Escape))
}
