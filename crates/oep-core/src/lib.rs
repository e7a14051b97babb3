//! OEP Core - Foundation types for the offscreen effect player
//!
//! This crate provides the types shared by every layer of the pipeline:
//! - Image descriptors and the engine-facing image model (`FullImage`)
//! - Conversion of host buffer layouts into `FullImage` with copy elision
//! - YUV/RGB color math
//! - CPU frame buffers used for read-back results

pub mod color;
pub mod convert;
pub mod error;
pub mod frame;
pub mod image;

pub use color::{decode_to_rgba, encode_nv12, pack_rgba, ColorRange, ColorStandard, YuvEncoding};
pub use convert::{
    from_biplanar_yuv, from_biplanar_yuv_no_copy, from_packed_no_copy, from_packed_planes,
    from_triplanar_yuv, from_triplanar_yuv_no_copy, gather_packed_planes, ChannelPlane,
    ExternalPlane,
};
pub use error::{OepError, Result};
pub use frame::{FrameBuffer, FrameFormat, FramePlane, SharedFrameBuffer};
pub use image::{
    Bpc8Image, CameraOrientation, ColorPlane, DetectionHint, FullImage, ImageFormat,
    OrientFormat, PixelFormat, ReleaseFn, YuvImage, YuvLayout,
};
