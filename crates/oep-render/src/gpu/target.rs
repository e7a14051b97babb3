//! Render target backed by a `wgpu` texture.

use super::{GpuContext, GpuTexture};
use crate::orient::{flip_vertical, orient_frame};
use crate::target::{OffscreenRenderTarget, OutputImageFormat, RenderedImage, SurfaceData};
use oep_core::{encode_nv12, FrameBuffer, OepError, OrientFormat, Result, YuvEncoding};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Draws engine output into a GPU texture and reads it back through a
/// staging buffer.
///
/// Rows are uploaded bottom-up, matching the software target, so the same
/// orientation requests produce the same images on both.
pub struct GpuRenderTarget {
    ctx: Arc<GpuContext>,
    width: u32,
    height: u32,
    texture: Option<Arc<GpuTexture>>,
    oriented: Option<FrameBuffer>,
}

impl GpuRenderTarget {
    pub fn new(ctx: Arc<GpuContext>, width: u32, height: u32) -> Self {
        Self {
            ctx,
            width,
            height,
            texture: None,
            oriented: None,
        }
    }

    /// Create a target on a fresh headless context.
    pub fn new_blocking(width: u32, height: u32) -> Result<Self> {
        Ok(Self::new(Arc::new(GpuContext::new_blocking()?), width, height))
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    fn texture(&self) -> Result<&Arc<GpuTexture>> {
        self.texture
            .as_ref()
            .ok_or_else(|| OepError::Gpu("GPU render target not initialized".to_string()))
    }

    fn allocate(&mut self) {
        self.texture = Some(Arc::new(GpuTexture::render_target(
            &self.ctx.device,
            self.width,
            self.height,
        )));
    }
}

impl OffscreenRenderTarget for GpuRenderTarget {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn init(&mut self) -> Result<()> {
        if self.texture.is_some() {
            return Err(OepError::Gpu("GPU render target already initialized".to_string()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(OepError::Gpu(format!(
                "cannot create a {}x{} render texture",
                self.width, self.height
            )));
        }
        self.allocate();
        info!(width = self.width, height = self.height, "GPU render target initialized");
        Ok(())
    }

    fn surface_changed(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(OepError::Gpu(format!(
                "cannot resize render texture to {}x{}",
                width, height
            )));
        }
        self.width = width;
        self.height = height;
        self.oriented = None;
        if self.texture.is_some() {
            self.allocate();
        }
        debug!(width, height, "GPU render texture resized");
        Ok(())
    }

    fn activate_context(&mut self) -> Result<()> {
        // wgpu has no current-context notion; only check the texture exists.
        self.texture().map(|_| ())
    }

    fn prepare_rendering(&mut self) -> Result<()> {
        self.texture()?;
        self.oriented = None;
        Ok(())
    }

    fn draw_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        let texture = self.texture()?;
        texture.upload_frame(&self.ctx.queue, &flip_vertical(frame))
    }

    fn orient_image(&mut self, orient: OrientFormat) -> Result<()> {
        let raw = self.texture()?.read_back(&self.ctx)?;
        self.oriented = Some(orient_frame(&raw, orient));
        Ok(())
    }

    fn read_current_buffer(&mut self) -> Option<FrameBuffer> {
        let texture = self.texture.as_ref()?;
        match texture.read_back(&self.ctx) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "GPU read-back failed");
                None
            }
        }
    }

    fn get_image(&mut self, format: OutputImageFormat) -> Option<RenderedImage> {
        if format == OutputImageFormat::Texture {
            return self.texture.clone().map(RenderedImage::Texture);
        }
        let Some(oriented) = self.oriented.as_ref() else {
            warn!("get_image called before orient_image");
            return None;
        };
        match format {
            OutputImageFormat::Nv12 => match encode_nv12(oriented, YuvEncoding::BT601_VIDEO) {
                Ok(nv12) => Some(RenderedImage::Frame(nv12)),
                Err(e) => {
                    warn!(error = %e, "NV12 read-back failed");
                    None
                }
            },
            _ => Some(RenderedImage::Frame(oriented.clone())),
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn render_surface(&self) -> Option<SurfaceData> {
        let surface: SurfaceData = self.ctx.clone();
        Some(surface)
    }
}
