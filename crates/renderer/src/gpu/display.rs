use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use pipeline::{DisplaySurface, TextureHandle};

use super::context::{GpuDevice, SurfaceState};
use super::pipeline::{
    draw_fullscreen, frame_sampler, fullscreen_pipeline, sampler_entry, texture_entry,
    uniform_entry,
};
use super::uniforms::DisplayUniforms;
use crate::compile::compile_display_shader;
use crate::types::DisplayTransform;

/// Draws analysed frames into the window surface.
///
/// The rendered swapchain image is left pending on the surface; the windowed
/// context presents it once the frame callback has returned.
pub struct SurfaceDisplay {
    gpu: GpuDevice,
    surface: Rc<RefCell<SurfaceState>>,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
}

impl SurfaceDisplay {
    pub(crate) fn new(
        gpu: GpuDevice,
        surface: Rc<RefCell<SurfaceState>>,
        transform: DisplayTransform,
    ) -> Self {
        let device = &gpu.device;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("display layout"),
            entries: &[uniform_entry(0), texture_entry(1), sampler_entry(2)],
        });
        let fragment = compile_display_shader(device);
        let format = surface.borrow().format();
        let pipeline = fullscreen_pipeline(
            device,
            "display pipeline",
            &bind_group_layout,
            &fragment,
            format,
        );
        let sampler = frame_sampler(device, wgpu::FilterMode::Linear);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("display uniforms"),
            size: std::mem::size_of::<DisplayUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        // Fixed for the life of the display.
        let uniforms = DisplayUniforms::from(transform);
        gpu.queue
            .write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        tracing::debug!(?transform, ?format, "display surface ready");

        Self {
            gpu,
            surface,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
        }
    }
}

impl DisplaySurface for SurfaceDisplay {
    fn present(&mut self, texture: &TextureHandle) -> Result<()> {
        let mut surface = self.surface.borrow_mut();
        let Some(frame) = surface.acquire()? else {
            return Ok(());
        };
        let target = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        {
            let textures = self.gpu.textures.borrow();
            let source = textures.resolve(texture)?;
            let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("display bind group"),
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
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            let mut encoder =
                self.gpu
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("display encoder"),
                    });
            draw_fullscreen(
                &mut encoder,
                "display pass",
                &target,
                &self.pipeline,
                &bind_group,
            );
            self.gpu.queue.submit(Some(encoder.finish()));
        }

        surface.set_pending(frame);
        Ok(())
    }
}
