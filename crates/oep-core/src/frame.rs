//! Frame buffer types for rendered frames in CPU memory.
//!
//! Read-back results are handed to callers as `FrameBuffer`s. Rows are
//! padded to 64 bytes so the same buffer can be uploaded to a GPU texture or
//! passed to SIMD color conversion without re-packing.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

/// Pixel layout of a read-back frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit RGBA (32 bits per pixel)
    #[default]
    Rgba8,
    /// NV12 YUV 4:2:0 (luma plane + interleaved UV plane)
    Nv12,
}

impl FrameFormat {
    /// Number of planes for this format.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Rgba8 => 1,
            Self::Nv12 => 2,
        }
    }

    /// Tightly packed size of a frame of this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Rgba8 => w * h * 4,
            // Y plane + UV interleaved (half resolution)
            Self::Nv12 => w * h + (w / 2) * (h / 2) * 2,
        }
    }
}

/// A plane of pixel data with stride information.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlane {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Bytes per row (may include padding)
    pub stride: usize,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per pixel
    pub bytes_per_pixel: usize,
}

impl FramePlane {
    /// Create a zeroed plane with the given dimensions.
    pub fn new(width: u32, height: u32, bytes_per_pixel: usize) -> Self {
        // Align stride to 64 bytes for SIMD and GPU compatibility
        let min_stride = (width as usize) * bytes_per_pixel;
        let stride = (min_stride + 63) & !63;
        let data = vec![0u8; stride * height as usize];
        Self {
            data,
            stride,
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Bytes of visible pixels per row (without padding).
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + self.row_bytes();
        &mut self.data[start..end]
    }

    /// Copy the visible pixels into a tightly packed vector.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}

/// A rendered frame in CPU memory.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    /// Pixel format
    pub format: FrameFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel data planes (1-2 depending on format)
    pub planes: SmallVec<[FramePlane; 2]>,
}

impl FrameBuffer {
    /// Create a zeroed frame buffer with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: FrameFormat) -> Self {
        let planes = match format {
            FrameFormat::Rgba8 => smallvec::smallvec![FramePlane::new(width, height, 4)],
            FrameFormat::Nv12 => smallvec::smallvec![
                FramePlane::new(width, height, 1),         // Y
                FramePlane::new(width / 2, height / 2, 2), // UV interleaved
            ],
        };

        Self {
            format,
            width,
            height,
            planes,
        }
    }

    /// Build an RGBA8 frame from tightly packed pixels.
    pub fn from_rgba(width: u32, height: u32, pixels: &[u8]) -> Option<Self> {
        let row_bytes = width as usize * 4;
        if pixels.len() < row_bytes * height as usize {
            return None;
        }
        let mut frame = Self::new(width, height, FrameFormat::Rgba8);
        let plane = frame.primary_plane_mut();
        for (y, src) in pixels.chunks_exact(row_bytes).take(height as usize).enumerate() {
            plane.row_mut(y as u32).copy_from_slice(src);
        }
        Some(frame)
    }

    /// Total memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }

    /// Get the primary plane (plane 0).
    #[inline]
    pub fn primary_plane(&self) -> &FramePlane {
        &self.planes[0]
    }

    /// Get the primary plane mutably.
    #[inline]
    pub fn primary_plane_mut(&mut self) -> &mut FramePlane {
        &mut self.planes[0]
    }

    /// RGBA value of one pixel, for RGBA8 frames.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if self.format != FrameFormat::Rgba8 || x >= self.width || y >= self.height {
            return None;
        }
        let row = self.primary_plane().row(y);
        let i = x as usize * 4;
        Some([row[i], row[i + 1], row[i + 2], row[i + 3]])
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let mut frame = Self::new(width, height, FrameFormat::Rgba8);
        let plane = frame.primary_plane_mut();
        let colors: [[u8; 4]; 8] = [
            [255, 255, 255, 255], // White
            [255, 255, 0, 255],   // Yellow
            [0, 255, 255, 255],   // Cyan
            [0, 255, 0, 255],     // Green
            [255, 0, 255, 255],   // Magenta
            [255, 0, 0, 255],     // Red
            [0, 0, 255, 255],     // Blue
            [0, 0, 0, 255],       // Black
        ];

        for y in 0..height {
            let row = plane.row_mut(y);
            for x in 0..width {
                let i = (x * 4) as usize;
                let bar = (x as u64 * 8 / width as u64) as usize;
                row[i..i + 4].copy_from_slice(&colors[bar]);
            }
        }

        frame
    }
}

/// Arc-wrapped frame buffer for shared ownership.
pub type SharedFrameBuffer = Arc<FrameBuffer>;
