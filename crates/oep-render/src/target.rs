//! The render target contract.
//!
//! A render target owns the surface the engine draws into and knows how to
//! orient and read it back. All calls happen on the player's worker thread,
//! in this order: `init` once, then repeated
//! `prepare_rendering` → `draw_frame` → `orient_image` → `get_image`, with
//! `surface_changed` allowed between cycles.

use oep_core::{FrameBuffer, OrientFormat, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// Format a caller asks for when reading a rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputImageFormat {
    /// Packed RGBA8.
    #[default]
    Rgba,
    /// Biplanar YUV 4:2:0, BT.601 video range.
    Nv12,
    /// The GPU texture itself. Only GPU targets can answer this.
    Texture,
}

/// Opaque platform surface handed from the target to the engine.
pub type SurfaceData = Arc<dyn Any + Send + Sync>;

/// A frame read back from a render target.
#[derive(Clone)]
pub enum RenderedImage {
    Frame(FrameBuffer),
    #[cfg(feature = "gpu")]
    Texture(Arc<crate::gpu::GpuTexture>),
}

impl RenderedImage {
    pub fn width(&self) -> u32 {
        match self {
            Self::Frame(frame) => frame.width,
            #[cfg(feature = "gpu")]
            Self::Texture(texture) => texture.width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Frame(frame) => frame.height,
            #[cfg(feature = "gpu")]
            Self::Texture(texture) => texture.height,
        }
    }

    pub fn as_frame(&self) -> Option<&FrameBuffer> {
        match self {
            Self::Frame(frame) => Some(frame),
            #[cfg(feature = "gpu")]
            Self::Texture(_) => None,
        }
    }

    pub fn into_frame(self) -> Option<FrameBuffer> {
        match self {
            Self::Frame(frame) => Some(frame),
            #[cfg(feature = "gpu")]
            Self::Texture(_) => None,
        }
    }
}

impl std::fmt::Debug for RenderedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(frame) => f
                .debug_struct("Frame")
                .field("format", &frame.format)
                .field("width", &frame.width)
                .field("height", &frame.height)
                .finish(),
            #[cfg(feature = "gpu")]
            Self::Texture(texture) => f
                .debug_struct("Texture")
                .field("width", &texture.width)
                .field("height", &texture.height)
                .finish(),
        }
    }
}

/// Surface the engine renders into and the player reads back from.
pub trait OffscreenRenderTarget: Send {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Allocate the surface. Called once, on the worker thread.
    fn init(&mut self) -> Result<()>;

    /// Resize the surface. Frames read before the resize are invalid.
    fn surface_changed(&mut self, width: u32, height: u32) -> Result<()>;

    /// Make the target's context current. Idempotent.
    fn activate_context(&mut self) -> Result<()>;

    /// Reset per-frame state before the engine draws.
    fn prepare_rendering(&mut self) -> Result<()>;

    /// Receive the engine's composed RGBA frame.
    fn draw_frame(&mut self, frame: &FrameBuffer) -> Result<()>;

    /// Apply the y-flip and rotation for the next read.
    fn orient_image(&mut self, orient: OrientFormat) -> Result<()>;

    /// Raw RGBA surface as rendered, rows bottom-up.
    fn read_current_buffer(&mut self) -> Option<FrameBuffer>;

    /// Oriented frame in the requested format.
    fn get_image(&mut self, format: OutputImageFormat) -> Option<RenderedImage>;

    /// Current surface size.
    fn size(&self) -> (u32, u32);

    /// Platform surface to hand to the engine, if the backend has one.
    fn render_surface(&self) -> Option<SurfaceData> {
        None
    }
}

/// Render target shared between the caller and the player.
pub type SharedRenderTarget = Arc<Mutex<dyn OffscreenRenderTarget>>;

/// Wrap a target for sharing.
pub fn shared<T: OffscreenRenderTarget + 'static>(target: T) -> SharedRenderTarget {
    Arc::new(Mutex::new(target))
}
