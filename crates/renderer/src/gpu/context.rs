use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use pipeline::TextureSlots;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::types::{AdapterProfile, GpuPowerPreference};

/// GPU storage behind a [`pipeline::TextureHandle`].
pub struct GpuTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
}

impl GpuTexture {
    pub(crate) fn new(texture: wgpu::Texture) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

pub(crate) type TexturePool = Rc<RefCell<TextureSlots<GpuTexture>>>;

/// Device, queue and texture table shared by every stage of one run.
///
/// Only handed out by a render context once it is current.
#[derive(Clone)]
pub struct GpuDevice {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) textures: TexturePool,
    profile: AdapterProfile,
}

impl GpuDevice {
    /// Creates a device with no presentation surface.
    pub(crate) fn headless(power: GpuPowerPreference) -> Result<Self> {
        let instance = create_instance();
        let adapter = request_adapter(&instance, power, None)?;
        Self::from_adapter(&adapter, "hci headless device")
    }

    /// Creates a device together with a surface for `target`.
    pub(crate) fn with_surface<T>(
        target: &T,
        size: (u32, u32),
        power: GpuPowerPreference,
    ) -> Result<(Self, SurfaceState)>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = create_instance();

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        // The caller keeps the window alive for as long as the surface exists.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let adapter = request_adapter(&instance, power, Some(&surface))?;
        let gpu = Self::from_adapter(&adapter, "hci device")?;
        let state = SurfaceState::new(instance, surface, &adapter, &gpu, size)?;
        Ok((gpu, state))
    }

    fn from_adapter(adapter: &wgpu::Adapter, label: &str) -> Result<Self> {
        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        let profile = AdapterProfile::from_wgpu(&adapter_info, &limits);
        tracing::debug!(
            name = %profile.name,
            backend = ?profile.backend,
            device_type = ?profile.device_type,
            is_software = profile.is_software(),
            "selected GPU adapter"
        );
        if profile.is_software() {
            tracing::warn!(adapter = %profile.name, "software rasterizer detected; expect low throughput");
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            device,
            queue,
            textures: Rc::new(RefCell::new(TextureSlots::new())),
            profile,
        })
    }

    pub fn profile(&self) -> &AdapterProfile {
        &self.profile
    }

    /// Fails when a `width` x `height` texture exceeds the adapter limit.
    pub(crate) fn check_dimensions(&self, width: u32, height: u32) -> Result<()> {
        let max_dimension = self.profile.max_texture_dimension;
        if width > max_dimension || height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested texture is {width}x{height}"
            );
        }
        Ok(())
    }

    pub(crate) fn allocate_slot(&self) -> u32 {
        self.textures.borrow_mut().allocate()
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_adapter(
    instance: &wgpu::Instance,
    power: GpuPowerPreference,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<wgpu::Adapter> {
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: power.to_wgpu(),
        compatible_surface: surface,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")
}

/// Swapchain of the display window plus the frame waiting to be presented.
pub(crate) struct SurfaceState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    config: wgpu::SurfaceConfiguration,
    pending: Option<wgpu::SurfaceTexture>,
    _instance: wgpu::Instance,
}

impl SurfaceState {
    fn new(
        instance: wgpu::Instance,
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        gpu: &GpuDevice,
        size: (u32, u32),
    ) -> Result<Self> {
        let (width, height) = (size.0.max(1), size.1.max(1));
        gpu.check_dimensions(width, height)?;

        let caps = surface.get_capabilities(adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let present_mode = caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| caps.present_modes.first().copied())
            .context("surface reports no present modes")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::debug!(?format, ?present_mode, width, height, "configuring surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        Ok(Self {
            surface,
            device: gpu.device.clone(),
            config,
            pending: None,
            _instance: instance,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if (width, height) == self.size() {
            return;
        }
        // A pending frame belongs to the old swapchain.
        self.pending = None;
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        tracing::debug!(width, height, "reconfigured surface");
    }

    /// Acquires the next swapchain image. `Ok(None)` means skip this frame.
    pub fn acquire(&mut self) -> Result<Option<wgpu::SurfaceTexture>> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                match self.surface.get_current_texture() {
                    Ok(frame) => Ok(Some(frame)),
                    Err(wgpu::SurfaceError::Timeout) => Ok(None),
                    Err(err) => Err(anyhow!("surface unavailable after reconfigure: {err}")),
                }
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timeout; skipping frame");
                Ok(None)
            }
            Err(err) => Err(anyhow!("surface error: {err}")),
        }
    }

    /// Queues `frame` for presentation, presenting any frame still waiting.
    pub fn set_pending(&mut self, frame: wgpu::SurfaceTexture) {
        if let Some(previous) = self.pending.replace(frame) {
            previous.present();
        }
    }

    /// Presents the waiting frame. Returns whether there was one.
    pub fn present_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(frame) => {
                frame.present();
                true
            }
            None => false,
        }
    }
}
