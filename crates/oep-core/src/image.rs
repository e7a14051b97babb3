//! Engine-facing image model.
//!
//! A `FullImage` is what the effect engine consumes: either one packed
//! 8-bit-per-channel plane or a set of YUV planes. Planes either own a heap
//! copy of the pixels or wrap caller memory that is handed back through a
//! release callback when the plane is dropped.

use crate::color::YuvEncoding;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Rotation of the camera sensor relative to the upright image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraOrientation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl CameraOrientation {
    /// All orientations in clockwise order.
    pub const ALL: [CameraOrientation; 4] = [Self::Deg0, Self::Deg90, Self::Deg180, Self::Deg270];

    /// Rotation in degrees.
    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Parse a rotation in degrees. Negative and >360 values are normalized;
    /// anything that is not a multiple of 90 yields `None`.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    /// Rotation that undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg0,
            Self::Deg90 => Self::Deg270,
            Self::Deg180 => Self::Deg180,
            Self::Deg270 => Self::Deg90,
        }
    }

    /// Whether rotating by this amount swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Requested orientation of a rendered frame on read-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OrientFormat {
    pub orientation: CameraOrientation,
    pub is_y_flip: bool,
}

impl OrientFormat {
    pub const fn new(orientation: CameraOrientation, is_y_flip: bool) -> Self {
        Self {
            orientation,
            is_y_flip,
        }
    }
}

/// Face detection hint forwarded to the engine with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionHint {
    /// Expected face orientation in degrees.
    pub face_orientation: i32,
    /// Horizontal field of view of the camera, if known.
    pub fov_degrees: Option<f32>,
}

/// Descriptor attached to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageFormat {
    pub width: u32,
    pub height: u32,
    pub orientation: CameraOrientation,
    /// Mirror the image vertically before processing.
    pub require_mirroring: bool,
    pub detection_hint: Option<DetectionHint>,
}

impl ImageFormat {
    pub fn new(width: u32, height: u32, orientation: CameraOrientation) -> Self {
        Self {
            width,
            height,
            orientation,
            require_mirroring: false,
            detection_hint: None,
        }
    }

    pub fn with_mirroring(mut self, require_mirroring: bool) -> Self {
        self.require_mirroring = require_mirroring;
        self
    }

    pub fn with_detection_hint(mut self, hint: DetectionHint) -> Self {
        self.detection_hint = Some(hint);
        self
    }

    /// Number of pixels in the image.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Byte order of a packed 8-bit-per-channel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Argb,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra | Self::Argb => 4,
        }
    }

    /// Byte offsets of the red, green and blue channels within one pixel.
    pub fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            Self::Rgb | Self::Rgba => (0, 1, 2),
            Self::Bgr | Self::Bgra => (2, 1, 0),
            Self::Argb => (1, 2, 3),
        }
    }

    /// Byte offset of the alpha channel, if the format has one.
    pub fn alpha_offset(self) -> Option<usize> {
        match self {
            Self::Rgb | Self::Bgr => None,
            Self::Rgba | Self::Bgra => Some(3),
            Self::Argb => Some(0),
        }
    }
}

/// Plane arrangement of a 4:2:0 YUV image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YuvLayout {
    /// Luma plane + one interleaved UV plane.
    Nv12,
    /// Luma plane + separate U and V planes.
    I420,
}

impl YuvLayout {
    pub fn plane_count(self) -> usize {
        match self {
            Self::Nv12 => 2,
            Self::I420 => 3,
        }
    }
}

/// Callback returning externally owned memory to its owner.
pub type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// Memory wrapped without copying. `release` fires when this is dropped.
struct ExternalStorage {
    buffer: Box<dyn AsRef<[u8]> + Send + Sync>,
    release: Option<ReleaseFn>,
}

impl Drop for ExternalStorage {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

enum PlaneStorage {
    Owned(Vec<u8>),
    External(ExternalStorage),
}

/// One plane of pixel data with its row stride.
pub struct ColorPlane {
    storage: PlaneStorage,
    row_stride: usize,
}

impl ColorPlane {
    /// A plane owning a heap copy of its pixels.
    pub fn owned(data: Vec<u8>, row_stride: usize) -> Self {
        Self {
            storage: PlaneStorage::Owned(data),
            row_stride,
        }
    }

    /// A plane wrapping caller memory without copying.
    ///
    /// `release` is invoked exactly once, when the plane is dropped.
    pub fn external<B, F>(buffer: B, row_stride: usize, release: F) -> Self
    where
        B: AsRef<[u8]> + Send + Sync + 'static,
        F: FnOnce() + Send + 'static,
    {
        Self {
            storage: PlaneStorage::External(ExternalStorage {
                buffer: Box::new(buffer),
                release: Some(Box::new(release)),
            }),
            row_stride,
        }
    }

    /// Wrap caller memory whose release callback is already boxed.
    pub(crate) fn from_external_parts(
        buffer: Box<dyn AsRef<[u8]> + Send + Sync>,
        row_stride: usize,
        release: Option<ReleaseFn>,
    ) -> Self {
        Self {
            storage: PlaneStorage::External(ExternalStorage { buffer, release }),
            row_stride,
        }
    }

    /// All bytes of the plane.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.storage {
            PlaneStorage::Owned(data) => data,
            PlaneStorage::External(ext) => (*ext.buffer).as_ref(),
        }
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the plane wraps caller memory rather than owning a copy.
    pub fn is_external(&self) -> bool {
        matches!(self.storage, PlaneStorage::External(_))
    }

    /// Row `y`, `row_bytes` long.
    #[inline]
    pub fn row(&self, y: u32, row_bytes: usize) -> &[u8] {
        let start = y as usize * self.row_stride;
        &self.as_bytes()[start..start + row_bytes]
    }
}

impl fmt::Debug for ColorPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorPlane")
            .field("len", &self.len())
            .field("row_stride", &self.row_stride)
            .field("external", &self.is_external())
            .finish()
    }
}

/// Packed 8-bit-per-channel image.
#[derive(Debug)]
pub struct Bpc8Image {
    pub plane: ColorPlane,
    pub pixel_format: PixelFormat,
    pub format: ImageFormat,
}

/// Planar 4:2:0 YUV image.
#[derive(Debug)]
pub struct YuvImage {
    /// Y then UV (NV12), or Y, U, V (I420).
    pub planes: SmallVec<[ColorPlane; 3]>,
    pub layout: YuvLayout,
    pub encoding: YuvEncoding,
    pub format: ImageFormat,
}

impl YuvImage {
    pub fn luma(&self) -> &ColorPlane {
        &self.planes[0]
    }
}

/// An input frame in any supported layout.
#[derive(Debug)]
pub enum FullImage {
    Bpc8(Bpc8Image),
    Yuv(YuvImage),
}

impl FullImage {
    pub fn format(&self) -> &ImageFormat {
        match self {
            Self::Bpc8(img) => &img.format,
            Self::Yuv(img) => &img.format,
        }
    }

    pub fn width(&self) -> u32 {
        self.format().width
    }

    pub fn height(&self) -> u32 {
        self.format().height
    }

    /// Total bytes referenced by all planes.
    pub fn memory_size(&self) -> usize {
        match self {
            Self::Bpc8(img) => img.plane.len(),
            Self::Yuv(img) => img.planes.iter().map(|p| p.len()).sum(),
        }
    }

    /// Whether any plane wraps caller memory.
    pub fn is_zero_copy(&self) -> bool {
        match self {
            Self::Bpc8(img) => img.plane.is_external(),
            Self::Yuv(img) => img.planes.iter().any(|p| p.is_external()),
        }
    }
}
