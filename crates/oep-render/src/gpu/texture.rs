//! Render texture with upload and read-back.

use super::GpuContext;
use oep_core::{FrameBuffer, FrameFormat, OepError, Result};

/// Row pitch of a texture-to-buffer copy, rounded up to wgpu's alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

/// An RGBA8 texture the engine output is drawn into.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl GpuTexture {
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: Option<&str>,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: Self::extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
            format,
        }
    }

    /// Texture that can be drawn into, uploaded to and copied out of.
    pub fn render_target(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self::new(
            device,
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            Some("OEP Render Target"),
        )
    }

    fn extent(width: u32, height: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    /// Upload an RGBA8 frame of the texture's size.
    pub fn upload_frame(&self, queue: &wgpu::Queue, frame: &FrameBuffer) -> Result<()> {
        if frame.format != FrameFormat::Rgba8 {
            return Err(OepError::Gpu(
                "Only RGBA8 format supported for upload".to_string(),
            ));
        }
        if frame.width != self.width || frame.height != self.height {
            return Err(OepError::Gpu(format!(
                "Frame size {}x{} doesn't match texture size {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let plane = frame.primary_plane();
        queue.write_texture(
            self.texture.as_image_copy(),
            &plane.data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(plane.stride as u32),
                rows_per_image: Some(self.height),
            },
            Self::extent(self.width, self.height),
        );
        Ok(())
    }

    /// Copy the texture into a mapped staging buffer and return its pixels.
    /// Blocks until the GPU has finished.
    pub fn read_back(&self, ctx: &GpuContext) -> Result<FrameBuffer> {
        let padded = padded_bytes_per_row(self.width);
        let row_bytes = self.width as usize * 4;

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("OEP Readback"),
            size: padded as u64 * self.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("OEP Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            Self::extent(self.width, self.height),
        );
        ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        ctx.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| OepError::Gpu("readback channel closed".to_string()))?
            .map_err(|e| OepError::Gpu(format!("readback map failed: {}", e)))?;

        let mut frame = FrameBuffer::new(self.width, self.height, FrameFormat::Rgba8);
        {
            let mapped = slice.get_mapped_range();
            let plane = frame.primary_plane_mut();
            for y in 0..self.height {
                let start = y as usize * padded as usize;
                plane
                    .row_mut(y)
                    .copy_from_slice(&mapped[start..start + row_bytes]);
            }
        }
        staging.unmap();
        Ok(frame)
    }

    /// Memory usage estimate in bytes.
    pub fn memory_size(&self) -> usize {
        (self.width * self.height) as usize * 4
    }
}
