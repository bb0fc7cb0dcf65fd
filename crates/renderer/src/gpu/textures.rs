use anyhow::Result;
use pipeline::{ChannelLayout, Frame, Geometry, TextureHandle, TextureStage};

use super::context::{GpuDevice, GpuTexture};

pub(crate) fn texture_format(layout: ChannelLayout) -> wgpu::TextureFormat {
    match layout {
        ChannelLayout::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        ChannelLayout::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
    }
}

/// Texture stage that writes each frame into one reusable GPU texture.
///
/// The texture format follows the requested layout, so sampling it always
/// yields RGBA regardless of the byte order on the host.
pub struct UploadStage {
    gpu: GpuDevice,
    slot: u32,
    allocated: Option<(Geometry, ChannelLayout)>,
    scratch: Vec<u8>,
}

impl UploadStage {
    pub fn new(gpu: GpuDevice) -> Self {
        let slot = gpu.allocate_slot();
        Self {
            gpu,
            slot,
            allocated: None,
            scratch: Vec::new(),
        }
    }

    fn ensure_texture(&mut self, geometry: Geometry, layout: ChannelLayout) -> Result<()> {
        if self.allocated == Some((geometry, layout)) {
            return Ok(());
        }
        self.gpu.check_dimensions(geometry.width, geometry.height)?;
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("uploaded frame"),
            size: extent(geometry),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(layout),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        *self.gpu.textures.borrow_mut().payload_mut(self.slot)? = Some(GpuTexture::new(texture));
        tracing::debug!(%geometry, %layout, "allocated upload texture");
        self.allocated = Some((geometry, layout));
        Ok(())
    }
}

impl TextureStage for UploadStage {
    fn upload(&mut self, frame: &Frame, layout: ChannelLayout) -> Result<TextureHandle> {
        let geometry = frame.geometry();
        self.ensure_texture(geometry, layout)?;

        let data = if frame.layout() == layout {
            frame.data()
        } else {
            frame.view().copy_as(layout, &mut self.scratch);
            self.scratch.as_slice()
        };

        let mut textures = self.gpu.textures.borrow_mut();
        if let Some(target) = textures.payload_mut(self.slot)?.as_ref() {
            self.gpu.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(geometry.width * ChannelLayout::BYTES_PER_PIXEL as u32),
                    rows_per_image: Some(geometry.height),
                },
                extent(geometry),
            );
        }
        Ok(textures.publish(self.slot, geometry, layout)?)
    }
}

pub(crate) fn extent(geometry: Geometry) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: geometry.width,
        height: geometry.height,
        depth_or_array_layers: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_map_to_matching_unorm_formats() {
        assert_eq!(
            texture_format(ChannelLayout::Rgba8),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            texture_format(ChannelLayout::Bgra8),
            wgpu::TextureFormat::Bgra8Unorm
        );
    }
}
