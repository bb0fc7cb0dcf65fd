use std::path::PathBuf;

use anyhow::{Context, Result};
use pipeline::{AnalysisStage, ChannelLayout, Geometry, PixelView, TextureHandle};

use super::context::{GpuDevice, GpuTexture};
use super::pipeline::{
    draw_fullscreen, frame_sampler, fullscreen_pipeline, sampler_entry, texture_entry,
    uniform_entry,
};
use super::readback::Readback;
use super::textures::extent;
use super::uniforms::AnalysisUniforms;
use crate::compile::compile_analysis_shader;

const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Model files a detector would load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: Option<PathBuf>,
    pub detector_mean: Option<PathBuf>,
    pub regressor: Option<PathBuf>,
    pub eye: Option<PathBuf>,
}

/// Parameters of the analysis stage.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    /// Weight of the previous output when blending a new frame, in `[0, 1]`.
    pub smoothing: f32,
    /// Cascade calibration handed to the detector.
    pub calibration: f32,
    /// Scale from detection box to regression crop.
    pub crop_scale: f32,
    pub models: ModelPaths,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            smoothing: 0.0,
            calibration: 0.0,
            crop_scale: 1.0,
            models: ModelPaths::default(),
        }
    }
}

struct Targets {
    geometry: Geometry,
    history: wgpu::Texture,
    history_view: wgpu::TextureView,
    readback: Readback,
}

/// GPU analysis stage: renders each uploaded frame into an RGBA output,
/// temporally smoothed against the previous output.
pub struct GpuAnalyzer {
    gpu: GpuDevice,
    settings: AnalyzerSettings,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    output_slot: u32,
    targets: Option<Targets>,
    has_history: bool,
    last_output: Option<TextureHandle>,
    pixels: Vec<u8>,
}

impl GpuAnalyzer {
    pub fn new(gpu: GpuDevice, settings: AnalyzerSettings) -> Result<Self> {
        let device = &gpu.device;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("analysis layout"),
            entries: &[
                uniform_entry(0),
                texture_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });
        let fragment = compile_analysis_shader(device);
        let pipeline = fullscreen_pipeline(
            device,
            "analysis pipeline",
            &bind_group_layout,
            &fragment,
            OUTPUT_FORMAT,
        );
        let sampler = frame_sampler(device, wgpu::FilterMode::Nearest);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("analysis uniforms"),
            size: std::mem::size_of::<AnalysisUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let output_slot = gpu.allocate_slot();

        tracing::info!(
            smoothing = settings.smoothing,
            calibration = settings.calibration,
            crop_scale = settings.crop_scale,
            detector = ?settings.models.detector,
            regressor = ?settings.models.regressor,
            eye = ?settings.models.eye,
            "analysis stage ready"
        );

        Ok(Self {
            gpu,
            settings,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            output_slot,
            targets: None,
            has_history: false,
            last_output: None,
            pixels: Vec::new(),
        })
    }

    fn ensure_targets(&mut self, geometry: Geometry) -> Result<()> {
        if self.targets.as_ref().map(|t| t.geometry) == Some(geometry) {
            return Ok(());
        }
        self.gpu.check_dimensions(geometry.width, geometry.height)?;
        let device = &self.gpu.device;
        let output = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("analysis output"),
            size: extent(geometry),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let history = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("analysis history"),
            size: extent(geometry),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let history_view = history.create_view(&wgpu::TextureViewDescriptor::default());
        let readback = Readback::new(device, geometry);

        *self.gpu.textures.borrow_mut().payload_mut(self.output_slot)? =
            Some(GpuTexture::new(output));
        self.targets = Some(Targets {
            geometry,
            history,
            history_view,
            readback,
        });
        self.has_history = false;
        self.last_output = None;
        tracing::debug!(%geometry, "allocated analysis targets");
        Ok(())
    }
}

impl AnalysisStage for GpuAnalyzer {
    fn process(&mut self, input: &TextureHandle) -> Result<TextureHandle> {
        let geometry = input.geometry();
        self.ensure_targets(geometry)?;

        let uniforms = AnalysisUniforms::new(self.settings.smoothing, self.has_history);
        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let targets = self
            .targets
            .as_ref()
            .context("analysis targets missing")?;
        {
            let textures = self.gpu.textures.borrow();
            let source = textures.resolve(input)?;
            let output = textures
                .payload(self.output_slot)?
                .context("analysis output texture missing")?;

            let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("analysis bind group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&source.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&targets.history_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });

            let mut encoder =
                self.gpu
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("analysis encoder"),
                    });
            draw_fullscreen(
                &mut encoder,
                "analysis pass",
                &output.view,
                &self.pipeline,
                &bind_group,
            );
            encoder.copy_texture_to_texture(
                output.texture.as_image_copy(),
                targets.history.as_image_copy(),
                extent(geometry),
            );
            self.gpu.queue.submit(Some(encoder.finish()));
        }

        self.has_history = true;
        let handle =
            self.gpu
                .textures
                .borrow_mut()
                .publish(self.output_slot, geometry, ChannelLayout::Rgba8)?;
        self.last_output = Some(handle);
        Ok(handle)
    }

    fn extract_pixels(&mut self, deliver: &mut dyn FnMut(PixelView<'_>)) -> Result<()> {
        let handle = self
            .last_output
            .context("extract_pixels called before any frame was processed")?;
        let targets = self
            .targets
            .as_ref()
            .context("analysis targets missing")?;
        {
            let textures = self.gpu.textures.borrow();
            let output = textures.resolve(&handle)?;
            targets.readback.read(
                &self.gpu.device,
                &self.gpu.queue,
                &output.texture,
                &mut self.pixels,
            )?;
        }
        deliver(PixelView::new(
            targets.readback.geometry(),
            handle.layout(),
            &self.pixels,
        ));
        Ok(())
    }
}
