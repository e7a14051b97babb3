//! `wgpu` render target, available with the `gpu` feature.

mod context;
mod target;
mod texture;

pub use context::GpuContext;
pub use target::GpuRenderTarget;
pub use texture::{padded_bytes_per_row, GpuTexture};
