//! OEP Render - render targets for the offscreen effect player
//!
//! The player never touches a GPU API directly. It drives an
//! [`OffscreenRenderTarget`] from its worker thread: the engine draws into
//! the target, the target orients the result and reads it back.
//!
//! Backends:
//! - [`SoftwareRenderTarget`]: CPU surface, always available
//! - `GpuRenderTarget`: `wgpu` texture with staging-buffer read-back
//!   (feature `gpu`)

#[cfg(feature = "gpu")]
pub mod gpu;
pub mod orient;
pub mod software;
pub mod target;

#[cfg(feature = "gpu")]
pub use gpu::{GpuContext, GpuRenderTarget, GpuTexture};
pub use orient::{flip_vertical, orient_frame, oriented_size, rotate};
pub use software::SoftwareRenderTarget;
pub use target::{
    shared, OffscreenRenderTarget, OutputImageFormat, RenderedImage, SharedRenderTarget,
    SurfaceData,
};
