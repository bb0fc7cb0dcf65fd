use anyhow::{anyhow, Context, Result};
use crossbeam_channel::bounded;
use pipeline::{ChannelLayout, Geometry};

use super::textures::extent;

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Row pitch of a texture-to-buffer copy for a four-channel image.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    align_to(
        width * ChannelLayout::BYTES_PER_PIXEL as u32,
        wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
    )
}

/// Copies `height` rows of `row_bytes` out of a buffer with `padded_row` pitch.
pub(crate) fn unpad_rows(
    padded: &[u8],
    row_bytes: usize,
    padded_row: usize,
    height: usize,
    out: &mut Vec<u8>,
) {
    out.clear();
    out.reserve(row_bytes * height);
    for row in 0..height {
        let start = row * padded_row;
        out.extend_from_slice(&padded[start..start + row_bytes]);
    }
}

/// Mappable staging buffer sized for one frame.
pub(crate) struct Readback {
    buffer: wgpu::Buffer,
    geometry: Geometry,
    padded_row: u32,
}

impl Readback {
    pub fn new(device: &wgpu::Device, geometry: Geometry) -> Self {
        let padded_row = padded_bytes_per_row(geometry.width);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame readback"),
            size: u64::from(padded_row) * u64::from(geometry.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            geometry,
            padded_row,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Copies `texture` into host memory, blocking until the GPU is done.
    pub fn read(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &wgpu::Texture,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_row),
                    rows_per_image: Some(self.geometry.height),
                },
            },
            extent(self.geometry),
        );
        queue.submit(Some(encoder.finish()));

        let slice = self.buffer.slice(..);
        let (tx, rx) = bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("wgpu poll failed: {err:?}"))?;
        rx.recv()
            .context("readback channel closed")?
            .map_err(|err| anyhow!("readback map failed: {err:?}"))?;

        {
            let mapped = slice.get_mapped_range();
            unpad_rows(
                &mapped,
                self.geometry.width as usize * ChannelLayout::BYTES_PER_PIXEL,
                self.padded_row as usize,
                self.geometry.height as usize,
                out,
            );
        }
        self.buffer.unmap();
        Ok(())
    }
}
