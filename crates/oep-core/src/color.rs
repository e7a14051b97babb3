//! YUV ↔ RGB color math.
//!
//! Covers the encodings camera pipelines hand us: BT.601 and BT.709, each in
//! full (0-255) or video (16-235 luma, 16-240 chroma) range.

use crate::frame::{FrameBuffer, FrameFormat};
use crate::image::{FullImage, PixelFormat, YuvImage, YuvLayout};
use crate::{OepError, Result};
use serde::{Deserialize, Serialize};

/// Luma/chroma matrix standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorStandard {
    #[default]
    Bt601,
    Bt709,
}

impl ColorStandard {
    /// (Kr, Kb) luma coefficients.
    pub fn coefficients(self) -> (f32, f32) {
        match self {
            Self::Bt601 => (0.299, 0.114),
            Self::Bt709 => (0.2126, 0.0722),
        }
    }
}

/// Quantization range of YUV samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorRange {
    #[default]
    Full,
    Video,
}

/// Color standard and range of a YUV image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct YuvEncoding {
    pub standard: ColorStandard,
    pub range: ColorRange,
}

impl YuvEncoding {
    pub const BT601_FULL: Self = Self::new(ColorStandard::Bt601, ColorRange::Full);
    pub const BT601_VIDEO: Self = Self::new(ColorStandard::Bt601, ColorRange::Video);
    pub const BT709_FULL: Self = Self::new(ColorStandard::Bt709, ColorRange::Full);
    pub const BT709_VIDEO: Self = Self::new(ColorStandard::Bt709, ColorRange::Video);

    pub const fn new(standard: ColorStandard, range: ColorRange) -> Self {
        Self { standard, range }
    }

    /// Convert one YUV sample triple to RGB.
    pub fn to_rgb(self, y: u8, u: u8, v: u8) -> [u8; 3] {
        let (kr, kb) = self.standard.coefficients();
        let kg = 1.0 - kr - kb;

        let (y, cb, cr) = match self.range {
            ColorRange::Full => (y as f32, u as f32 - 128.0, v as f32 - 128.0),
            ColorRange::Video => (
                (y as f32 - 16.0) * 255.0 / 219.0,
                (u as f32 - 128.0) * 255.0 / 224.0,
                (v as f32 - 128.0) * 255.0 / 224.0,
            ),
        };

        let r = y + 2.0 * (1.0 - kr) * cr;
        let b = y + 2.0 * (1.0 - kb) * cb;
        let g = (y - kr * r - kb * b) / kg;
        [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
    }

    /// Convert one RGB triple to YUV samples.
    pub fn from_rgb(self, r: u8, g: u8, b: u8) -> [u8; 3] {
        let (kr, kb) = self.standard.coefficients();
        let kg = 1.0 - kr - kb;
        let (r, g, b) = (r as f32, g as f32, b as f32);

        let y = kr * r + kg * g + kb * b;
        let cb = (b - y) / (2.0 * (1.0 - kb));
        let cr = (r - y) / (2.0 * (1.0 - kr));

        match self.range {
            ColorRange::Full => [clamp_u8(y), clamp_u8(cb + 128.0), clamp_u8(cr + 128.0)],
            ColorRange::Video => [
                clamp_u8(16.0 + y * 219.0 / 255.0),
                clamp_u8(128.0 + cb * 224.0 / 255.0),
                clamp_u8(128.0 + cr * 224.0 / 255.0),
            ],
        }
    }
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Decode any input image into an RGBA8 frame.
pub fn decode_to_rgba(image: &FullImage) -> Result<FrameBuffer> {
    match image {
        FullImage::Bpc8(img) => {
            let fmt = &img.format;
            let bpp = img.pixel_format.bytes_per_pixel();
            let row_bytes = fmt.width as usize * bpp;
            ensure_plane(img.plane.len(), img.plane.row_stride(), row_bytes, fmt.height)?;

            let (ro, go, bo) = img.pixel_format.rgb_offsets();
            let ao = img.pixel_format.alpha_offset();
            let mut frame = FrameBuffer::new(fmt.width, fmt.height, FrameFormat::Rgba8);
            let plane = frame.primary_plane_mut();
            for y in 0..fmt.height {
                let src = img.plane.row(y, row_bytes);
                let dst = plane.row_mut(y);
                for (px, out) in src.chunks_exact(bpp).zip(dst.chunks_exact_mut(4)) {
                    out[0] = px[ro];
                    out[1] = px[go];
                    out[2] = px[bo];
                    out[3] = ao.map_or(255, |a| px[a]);
                }
            }
            Ok(frame)
        }
        FullImage::Yuv(img) => decode_yuv(img),
    }
}

fn decode_yuv(img: &YuvImage) -> Result<FrameBuffer> {
    let fmt = &img.format;
    let (w, h) = (fmt.width, fmt.height);
    if img.planes.len() != img.layout.plane_count() {
        return Err(OepError::InvalidArgument(format!(
            "{:?} image needs {} planes, got {}",
            img.layout,
            img.layout.plane_count(),
            img.planes.len()
        )));
    }

    let luma = &img.planes[0];
    ensure_plane(luma.len(), luma.row_stride(), w as usize, h)?;
    let chroma_w = (w / 2) as usize;
    match img.layout {
        YuvLayout::Nv12 => {
            let uv = &img.planes[1];
            ensure_plane(uv.len(), uv.row_stride(), chroma_w * 2, h / 2)?;
        }
        YuvLayout::I420 => {
            for plane in &img.planes[1..] {
                ensure_plane(plane.len(), plane.row_stride(), chroma_w, h / 2)?;
            }
        }
    }

    // 1-pixel-wide or -tall images carry no chroma samples.
    let has_chroma = h / 2 > 0 && chroma_w > 0;
    let mut frame = FrameBuffer::new(w, h, FrameFormat::Rgba8);
    let out = frame.primary_plane_mut();
    for y in 0..h {
        let luma_row = luma.row(y, w as usize);
        // Chroma rows past the last full pair reuse the final chroma row.
        let cy = (y / 2).min((h / 2).saturating_sub(1));
        let dst = out.row_mut(y);
        for x in 0..w as usize {
            let cx = (x / 2).min(chroma_w.saturating_sub(1));
            let (u, v) = match img.layout {
                _ if !has_chroma => (128, 128),
                YuvLayout::Nv12 => {
                    let uv = img.planes[1].row(cy, chroma_w * 2);
                    (uv[cx * 2], uv[cx * 2 + 1])
                }
                YuvLayout::I420 => (
                    img.planes[1].row(cy, chroma_w)[cx],
                    img.planes[2].row(cy, chroma_w)[cx],
                ),
            };
            let [r, g, b] = img.encoding.to_rgb(luma_row[x], u, v);
            dst[x * 4..x * 4 + 4].copy_from_slice(&[r, g, b, 255]);
        }
    }
    Ok(frame)
}

/// Encode an RGBA8 frame as NV12, averaging chroma over 2×2 blocks.
pub fn encode_nv12(rgba: &FrameBuffer, encoding: YuvEncoding) -> Result<FrameBuffer> {
    if rgba.format != FrameFormat::Rgba8 {
        return Err(OepError::UnsupportedFormat(format!(
            "NV12 encoding needs an RGBA8 source, got {:?}",
            rgba.format
        )));
    }

    let (w, h) = (rgba.width, rgba.height);
    let mut out = FrameBuffer::new(w, h, FrameFormat::Nv12);
    let src = rgba.primary_plane();

    for y in 0..h {
        let row = src.row(y);
        let dst = out.planes[0].row_mut(y);
        for x in 0..w as usize {
            let p = &row[x * 4..x * 4 + 3];
            dst[x] = encoding.from_rgb(p[0], p[1], p[2])[0];
        }
    }

    for cy in 0..h / 2 {
        let top = src.row(cy * 2);
        let bottom = src.row(cy * 2 + 1);
        let dst = out.planes[1].row_mut(cy);
        for cx in 0..(w / 2) as usize {
            let mut acc = [0u32; 3];
            for row in [top, bottom] {
                for px in [cx * 2, cx * 2 + 1] {
                    for c in 0..3 {
                        acc[c] += row[px * 4 + c] as u32;
                    }
                }
            }
            let avg = acc.map(|v| ((v + 2) / 4) as u8);
            let [_, u, v] = encoding.from_rgb(avg[0], avg[1], avg[2]);
            dst[cx * 2] = u;
            dst[cx * 2 + 1] = v;
        }
    }

    Ok(out)
}

/// Pack an RGBA8 frame into the given byte order.
pub fn pack_rgba(rgba: &FrameBuffer, pixel_format: PixelFormat) -> Result<Vec<u8>> {
    if rgba.format != FrameFormat::Rgba8 {
        return Err(OepError::UnsupportedFormat(format!(
            "packing needs an RGBA8 source, got {:?}",
            rgba.format
        )));
    }
    let bpp = pixel_format.bytes_per_pixel();
    let (ro, go, bo) = pixel_format.rgb_offsets();
    let ao = pixel_format.alpha_offset();
    let mut out = vec![0u8; rgba.width as usize * rgba.height as usize * bpp];
    let plane = rgba.primary_plane();
    for (y, dst_row) in out.chunks_exact_mut(rgba.width as usize * bpp).enumerate() {
        for (src, dst) in plane.row(y as u32).chunks_exact(4).zip(dst_row.chunks_exact_mut(bpp)) {
            dst[ro] = src[0];
            dst[go] = src[1];
            dst[bo] = src[2];
            if let Some(a) = ao {
                dst[a] = src[3];
            }
        }
    }
    Ok(out)
}

fn ensure_plane(len: usize, row_stride: usize, row_bytes: usize, rows: u32) -> Result<()> {
    if rows == 0 {
        return Ok(());
    }
    let needed = row_stride * (rows as usize - 1) + row_bytes;
    if row_stride < row_bytes || len < needed {
        return Err(OepError::InvalidArgument(format!(
            "plane of {} bytes (stride {}) cannot hold {} rows of {} bytes",
            len, row_stride, rows, row_bytes
        )));
    }
    Ok(())
}
