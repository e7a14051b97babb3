//! CPU render target.
//!
//! Stores the surface bottom-up like a GL framebuffer, so the default y-flip
//! on read yields an upright image.

use crate::orient::{flip_vertical, orient_frame};
use crate::target::{OffscreenRenderTarget, OutputImageFormat, RenderedImage};
use oep_core::{encode_nv12, FrameBuffer, FrameFormat, OepError, OrientFormat, Result, YuvEncoding};
use tracing::{debug, info, warn};

/// Render target backed by a CPU frame buffer.
pub struct SoftwareRenderTarget {
    width: u32,
    height: u32,
    surface: Option<FrameBuffer>,
    oriented: Option<FrameBuffer>,
    context_active: bool,
    frames_drawn: u64,
}

impl SoftwareRenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            surface: None,
            oriented: None,
            context_active: false,
            frames_drawn: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.surface.is_some()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    fn surface_mut(&mut self) -> Result<&mut FrameBuffer> {
        self.surface
            .as_mut()
            .ok_or_else(|| OepError::RenderTarget("software target not initialized".to_string()))
    }
}

impl OffscreenRenderTarget for SoftwareRenderTarget {
    fn name(&self) -> &'static str {
        "software"
    }

    fn init(&mut self) -> Result<()> {
        if self.surface.is_some() {
            return Err(OepError::RenderTarget(
                "software target already initialized".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(OepError::RenderTarget(format!(
                "cannot create a {}x{} surface",
                self.width, self.height
            )));
        }
        self.surface = Some(FrameBuffer::new(self.width, self.height, FrameFormat::Rgba8));
        info!(width = self.width, height = self.height, "Software render target initialized");
        Ok(())
    }

    fn surface_changed(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(OepError::RenderTarget(format!(
                "cannot resize surface to {}x{}",
                width, height
            )));
        }
        self.width = width;
        self.height = height;
        self.oriented = None;
        if self.surface.is_some() {
            self.surface = Some(FrameBuffer::new(width, height, FrameFormat::Rgba8));
        }
        debug!(width, height, "Software surface resized");
        Ok(())
    }

    fn activate_context(&mut self) -> Result<()> {
        self.surface_mut()?;
        self.context_active = true;
        Ok(())
    }

    fn prepare_rendering(&mut self) -> Result<()> {
        if !self.context_active {
            self.activate_context()?;
        }
        self.oriented = None;
        self.surface_mut()?.planes[0].data.fill(0);
        Ok(())
    }

    fn draw_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        if frame.format != FrameFormat::Rgba8 {
            return Err(OepError::RenderTarget(format!(
                "software target draws RGBA8 frames, got {:?}",
                frame.format
            )));
        }
        let (w, h) = (self.width, self.height);
        if frame.width != w || frame.height != h {
            return Err(OepError::RenderTarget(format!(
                "frame is {}x{}, surface is {}x{}",
                frame.width, frame.height, w, h
            )));
        }
        *self.surface_mut()? = flip_vertical(frame);
        self.frames_drawn += 1;
        Ok(())
    }

    fn orient_image(&mut self, orient: OrientFormat) -> Result<()> {
        let surface = self.surface_mut()?;
        let oriented = orient_frame(surface, orient);
        self.oriented = Some(oriented);
        Ok(())
    }

    fn read_current_buffer(&mut self) -> Option<FrameBuffer> {
        self.surface.clone()
    }

    fn get_image(&mut self, format: OutputImageFormat) -> Option<RenderedImage> {
        let Some(oriented) = self.oriented.as_ref() else {
            warn!("get_image called before orient_image");
            return None;
        };
        match format {
            OutputImageFormat::Rgba => Some(RenderedImage::Frame(oriented.clone())),
            OutputImageFormat::Nv12 => match encode_nv12(oriented, YuvEncoding::BT601_VIDEO) {
                Ok(nv12) => Some(RenderedImage::Frame(nv12)),
                Err(e) => {
                    warn!(error = %e, "NV12 read-back failed");
                    None
                }
            },
            OutputImageFormat::Texture => {
                debug!("software target has no texture to return");
                None
            }
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
