//! Host buffer conversion.
//!
//! Builds `FullImage`s from whatever layout the host hands us: three RGB
//! channel planes with arbitrary strides, a packed 8-bit buffer, or biplanar
//! (NV12) / triplanar (I420) YUV planes. The `*_no_copy` builders wrap caller
//! memory when its layout is already tight and copy otherwise; either way the
//! caller's release callback fires exactly once.
//!
//! Strides are `i32` because host APIs report them as signed ints. Zero or
//! negative strides are rejected before any buffer is touched.

use crate::color::YuvEncoding;
use crate::image::{
    Bpc8Image, ColorPlane, FullImage, ImageFormat, PixelFormat, ReleaseFn, YuvImage, YuvLayout,
};
use crate::{OepError, Result};
use smallvec::smallvec;
use tracing::trace;

/// One color channel inside a caller buffer.
///
/// `data` starts at the channel's first sample; sample `(x, y)` lives at
/// `y * row_stride + x * pixel_stride`.
#[derive(Debug, Clone, Copy)]
pub struct ChannelPlane<'a> {
    pub data: &'a [u8],
    pub row_stride: i32,
    pub pixel_stride: i32,
}

impl<'a> ChannelPlane<'a> {
    pub fn new(data: &'a [u8], row_stride: i32, pixel_stride: i32) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    fn addr(&self) -> usize {
        self.data.as_ptr() as usize
    }
}

/// Fires a release callback on drop unless it was handed off to a plane.
struct ReleaseGuard(Option<ReleaseFn>);

impl ReleaseGuard {
    fn new<F: FnOnce() + Send + 'static>(release: F) -> Self {
        Self(Some(Box::new(release)))
    }

    fn take(&mut self) -> Option<ReleaseFn> {
        self.0.take()
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

fn positive_stride(name: &str, stride: i32) -> Result<usize> {
    if stride <= 0 {
        return Err(OepError::InvalidArgument(format!(
            "{name} must be positive, got {stride}"
        )));
    }
    Ok(stride as usize)
}

fn check_dimensions(format: &ImageFormat) -> Result<()> {
    if format.width == 0 || format.height == 0 {
        return Err(OepError::InvalidArgument(format!(
            "image size must be non-zero, got {}x{}",
            format.width, format.height
        )));
    }
    Ok(())
}

fn check_len(name: &str, len: usize, needed: usize) -> Result<()> {
    if len < needed {
        return Err(OepError::InvalidArgument(format!(
            "{name} holds {len} bytes, {needed} required"
        )));
    }
    Ok(())
}

/// Bytes needed for `rows` rows of `row_bytes` at `stride`.
fn span(stride: usize, row_bytes: usize, rows: usize) -> usize {
    stride * (rows - 1) + row_bytes
}

/// Copy `rows` rows into a tightly packed vector, in one pass when the
/// source is already tight.
fn copy_rows(src: &[u8], stride: usize, row_bytes: usize, rows: usize) -> Vec<u8> {
    if stride == row_bytes {
        return src[..row_bytes * rows].to_vec();
    }
    let mut out = Vec::with_capacity(row_bytes * rows);
    for y in 0..rows {
        let start = y * stride;
        out.extend_from_slice(&src[start..start + row_bytes]);
    }
    out
}

/// Byte order of three channel planes that share one interleaved buffer.
fn interleaved_order(r: &ChannelPlane, g: &ChannelPlane, b: &ChannelPlane) -> Option<bool> {
    if r.pixel_stride != g.pixel_stride
        || g.pixel_stride != b.pixel_stride
        || !matches!(r.pixel_stride, 3 | 4)
        || r.row_stride != g.row_stride
        || g.row_stride != b.row_stride
    {
        return None;
    }
    let (ra, ga, ba) = (r.addr(), g.addr(), b.addr());
    if ra.checked_add(1) == Some(ga) && ga.checked_add(1) == Some(ba) {
        Some(true)
    } else if ba.checked_add(1) == Some(ga) && ga.checked_add(1) == Some(ra) {
        Some(false)
    } else {
        None
    }
}

/// Build a packed image from three RGB channel planes.
///
/// Interleaved sources (R, G, B one byte apart, shared strides, 3 or 4 bytes
/// per pixel) are copied row-wise into an RGB(A) or BGR(A) image. Anything
/// else is gathered pixel by pixel into RGB. The result always owns its
/// pixels.
pub fn from_packed_planes(
    format: ImageFormat,
    r: ChannelPlane<'_>,
    g: ChannelPlane<'_>,
    b: ChannelPlane<'_>,
) -> Result<FullImage> {
    validate_channel_planes(&format, &r, &g, &b)?;

    if let Some(ascending) = interleaved_order(&r, &g, &b) {
        let channels = r.pixel_stride as usize;
        let stride = r.row_stride as usize;
        let row_bytes = format.width as usize * channels;
        let base = if ascending { r.data } else { b.data };
        let rows = format.height as usize;

        if stride >= row_bytes && base.len() >= span(stride, row_bytes, rows) {
            let pixel_format = match (ascending, channels) {
                (true, 3) => PixelFormat::Rgb,
                (true, _) => PixelFormat::Rgba,
                (false, 3) => PixelFormat::Bgr,
                (false, _) => PixelFormat::Bgra,
            };
            trace!(?pixel_format, stride, "interleaved planes, row copy");
            return Ok(FullImage::Bpc8(Bpc8Image {
                plane: ColorPlane::owned(copy_rows(base, stride, row_bytes, rows), row_bytes),
                pixel_format,
                format,
            }));
        }
    }

    Ok(gather(format, &r, &g, &b))
}

/// Build a packed RGB image by gathering every pixel from the three planes.
///
/// Same result as `from_packed_planes` minus any alpha channel, without the
/// interleaved shortcut.
pub fn gather_packed_planes(
    format: ImageFormat,
    r: ChannelPlane<'_>,
    g: ChannelPlane<'_>,
    b: ChannelPlane<'_>,
) -> Result<FullImage> {
    validate_channel_planes(&format, &r, &g, &b)?;
    Ok(gather(format, &r, &g, &b))
}

fn validate_channel_planes(
    format: &ImageFormat,
    r: &ChannelPlane<'_>,
    g: &ChannelPlane<'_>,
    b: &ChannelPlane<'_>,
) -> Result<()> {
    for (name, plane) in [("red", r), ("green", g), ("blue", b)] {
        positive_stride(&format!("{name} row stride"), plane.row_stride)?;
        positive_stride(&format!("{name} pixel stride"), plane.pixel_stride)?;
    }
    check_dimensions(format)?;
    for (name, plane) in [("red plane", r), ("green plane", g), ("blue plane", b)] {
        let last = plane.row_stride as usize * (format.height as usize - 1)
            + plane.pixel_stride as usize * (format.width as usize - 1);
        check_len(name, plane.data.len(), last + 1)?;
    }
    Ok(())
}

fn gather(
    format: ImageFormat,
    r: &ChannelPlane<'_>,
    g: &ChannelPlane<'_>,
    b: &ChannelPlane<'_>,
) -> FullImage {
    let (w, h) = (format.width as usize, format.height as usize);
    let mut out = vec![0u8; w * h * 3];
    for (y, dst_row) in out.chunks_exact_mut(w * 3).enumerate() {
        for (x, dst) in dst_row.chunks_exact_mut(3).enumerate() {
            for (c, plane) in [r, g, b].into_iter().enumerate() {
                dst[c] = plane.data
                    [y * plane.row_stride as usize + x * plane.pixel_stride as usize];
            }
        }
    }
    trace!(width = w, height = h, "gathered channel planes");
    FullImage::Bpc8(Bpc8Image {
        plane: ColorPlane::owned(out, w * 3),
        pixel_format: PixelFormat::Rgb,
        format,
    })
}

/// Wrap a packed 8-bit buffer, copying only if rows are padded.
///
/// A tight buffer (`row_stride == width * bytes_per_pixel`) becomes the
/// image's plane and `release` runs when the image is dropped. A padded
/// buffer is copied and `release` runs before this returns, also when the
/// conversion fails.
pub fn from_packed_no_copy<B, F>(
    format: ImageFormat,
    pixel_format: PixelFormat,
    buffer: B,
    row_stride: i32,
    release: F,
) -> Result<FullImage>
where
    B: AsRef<[u8]> + Send + Sync + 'static,
    F: FnOnce() + Send + 'static,
{
    let mut guard = ReleaseGuard::new(release);
    let stride = positive_stride("row stride", row_stride)?;
    check_dimensions(&format)?;

    let bpp = pixel_format.bytes_per_pixel();
    let row_bytes = format.width as usize * bpp;
    if stride == row_bytes {
        check_len(
            "packed buffer",
            buffer.as_ref().len(),
            row_bytes * format.height as usize,
        )?;
        trace!(?pixel_format, "wrapping packed buffer without copy");
        return Ok(FullImage::Bpc8(Bpc8Image {
            plane: ColorPlane::from_external_parts(Box::new(buffer), stride, guard.take()),
            pixel_format,
            format,
        }));
    }

    let bytes = buffer.as_ref();
    let (ro, go, bo) = pixel_format.rgb_offsets();
    let plane = |offset: usize| ChannelPlane {
        data: bytes.get(offset..).unwrap_or_default(),
        row_stride,
        pixel_stride: bpp as i32,
    };
    let (r, g, b) = (plane(ro), plane(go), plane(bo));
    trace!(?pixel_format, stride, "copying padded packed buffer");

    // Leading alpha would shift an interleaved row copy by one byte.
    if pixel_format.alpha_offset() == Some(0) {
        gather_packed_planes(format, r, g, b)
    } else {
        from_packed_planes(format, r, g, b)
    }
}

/// Copy an NV12 image out of a luma plane and an interleaved UV plane.
pub fn from_biplanar_yuv(
    format: ImageFormat,
    encoding: YuvEncoding,
    luma: &[u8],
    luma_stride: i32,
    chroma: &[u8],
    chroma_stride: i32,
) -> Result<FullImage> {
    let luma_stride = positive_stride("luma stride", luma_stride)?;
    let chroma_stride = positive_stride("chroma stride", chroma_stride)?;
    let geometry = YuvGeometry::new(&format, YuvLayout::Nv12)?;
    geometry.check_luma(luma.len(), luma_stride)?;
    geometry.check_chroma("chroma plane", chroma.len(), chroma_stride)?;

    Ok(geometry.build(
        format,
        encoding,
        smallvec![
            geometry.copy_luma(luma, luma_stride),
            geometry.copy_chroma(chroma, chroma_stride),
        ],
    ))
}

/// NV12 from caller planes, wrapped without copy when both strides equal
/// the natural row width. Each release callback fires exactly once.
#[allow(clippy::too_many_arguments)]
pub fn from_biplanar_yuv_no_copy<B1, F1, B2, F2>(
    format: ImageFormat,
    encoding: YuvEncoding,
    luma: B1,
    luma_stride: i32,
    luma_release: F1,
    chroma: B2,
    chroma_stride: i32,
    chroma_release: F2,
) -> Result<FullImage>
where
    B1: AsRef<[u8]> + Send + Sync + 'static,
    F1: FnOnce() + Send + 'static,
    B2: AsRef<[u8]> + Send + Sync + 'static,
    F2: FnOnce() + Send + 'static,
{
    let mut luma_guard = ReleaseGuard::new(luma_release);
    let mut chroma_guard = ReleaseGuard::new(chroma_release);

    let luma_stride = positive_stride("luma stride", luma_stride)?;
    let chroma_stride = positive_stride("chroma stride", chroma_stride)?;
    let geometry = YuvGeometry::new(&format, YuvLayout::Nv12)?;
    geometry.check_luma(luma.as_ref().len(), luma_stride)?;
    geometry.check_chroma("chroma plane", chroma.as_ref().len(), chroma_stride)?;

    let planes = if luma_stride == geometry.width && chroma_stride == geometry.chroma_row_bytes {
        trace!(width = geometry.width, "wrapping NV12 planes without copy");
        smallvec![
            ColorPlane::from_external_parts(Box::new(luma), luma_stride, luma_guard.take()),
            ColorPlane::from_external_parts(Box::new(chroma), chroma_stride, chroma_guard.take()),
        ]
    } else {
        trace!(luma_stride, chroma_stride, "copying padded NV12 planes");
        smallvec![
            geometry.copy_luma(luma.as_ref(), luma_stride),
            geometry.copy_chroma(chroma.as_ref(), chroma_stride),
        ]
    };
    Ok(geometry.build(format, encoding, planes))
}

/// Copy an I420 image out of separate Y, U and V planes.
#[allow(clippy::too_many_arguments)]
pub fn from_triplanar_yuv(
    format: ImageFormat,
    encoding: YuvEncoding,
    y: &[u8],
    y_stride: i32,
    u: &[u8],
    u_stride: i32,
    v: &[u8],
    v_stride: i32,
) -> Result<FullImage> {
    let y_stride = positive_stride("Y stride", y_stride)?;
    let u_stride = positive_stride("U stride", u_stride)?;
    let v_stride = positive_stride("V stride", v_stride)?;
    let geometry = YuvGeometry::new(&format, YuvLayout::I420)?;
    geometry.check_luma(y.len(), y_stride)?;
    geometry.check_chroma("U plane", u.len(), u_stride)?;
    geometry.check_chroma("V plane", v.len(), v_stride)?;

    Ok(geometry.build(
        format,
        encoding,
        smallvec![
            geometry.copy_luma(y, y_stride),
            geometry.copy_chroma(u, u_stride),
            geometry.copy_chroma(v, v_stride),
        ],
    ))
}

/// One caller-owned plane for the triplanar no-copy builder.
pub struct ExternalPlane<B, F> {
    pub buffer: B,
    pub row_stride: i32,
    pub release: F,
}

impl<B, F> ExternalPlane<B, F> {
    pub fn new(buffer: B, row_stride: i32, release: F) -> Self {
        Self {
            buffer,
            row_stride,
            release,
        }
    }
}

/// I420 from caller planes, wrapped without copy when every stride equals
/// its natural row width. Each release callback fires exactly once.
pub fn from_triplanar_yuv_no_copy<B, F>(
    format: ImageFormat,
    encoding: YuvEncoding,
    y: ExternalPlane<B, F>,
    u: ExternalPlane<B, F>,
    v: ExternalPlane<B, F>,
) -> Result<FullImage>
where
    B: AsRef<[u8]> + Send + Sync + 'static,
    F: FnOnce() + Send + 'static,
{
    let mut guards = [
        ReleaseGuard::new(y.release),
        ReleaseGuard::new(u.release),
        ReleaseGuard::new(v.release),
    ];

    let strides = [
        positive_stride("Y stride", y.row_stride)?,
        positive_stride("U stride", u.row_stride)?,
        positive_stride("V stride", v.row_stride)?,
    ];
    let geometry = YuvGeometry::new(&format, YuvLayout::I420)?;
    geometry.check_luma(y.buffer.as_ref().len(), strides[0])?;
    geometry.check_chroma("U plane", u.buffer.as_ref().len(), strides[1])?;
    geometry.check_chroma("V plane", v.buffer.as_ref().len(), strides[2])?;

    let tight = strides[0] == geometry.width
        && strides[1] == geometry.chroma_row_bytes
        && strides[2] == geometry.chroma_row_bytes;

    let planes = if tight {
        trace!(width = geometry.width, "wrapping I420 planes without copy");
        let [gy, gu, gv] = &mut guards;
        smallvec![
            ColorPlane::from_external_parts(Box::new(y.buffer), strides[0], gy.take()),
            ColorPlane::from_external_parts(Box::new(u.buffer), strides[1], gu.take()),
            ColorPlane::from_external_parts(Box::new(v.buffer), strides[2], gv.take()),
        ]
    } else {
        trace!(?strides, "copying padded I420 planes");
        smallvec![
            geometry.copy_luma(y.buffer.as_ref(), strides[0]),
            geometry.copy_chroma(u.buffer.as_ref(), strides[1]),
            geometry.copy_chroma(v.buffer.as_ref(), strides[2]),
        ]
    };
    Ok(geometry.build(format, encoding, planes))
}

/// Plane sizes of a 4:2:0 image. Dimensions are assumed even.
struct YuvGeometry {
    layout: YuvLayout,
    width: usize,
    height: usize,
    chroma_row_bytes: usize,
    chroma_rows: usize,
}

impl YuvGeometry {
    fn new(format: &ImageFormat, layout: YuvLayout) -> Result<Self> {
        check_dimensions(format)?;
        let (width, height) = (format.width as usize, format.height as usize);
        let components = match layout {
            YuvLayout::Nv12 => 2,
            YuvLayout::I420 => 1,
        };
        Ok(Self {
            layout,
            width,
            height,
            chroma_row_bytes: (width / 2) * components,
            chroma_rows: height / 2,
        })
    }

    fn check_luma(&self, len: usize, stride: usize) -> Result<()> {
        if stride < self.width {
            return Err(OepError::InvalidArgument(format!(
                "luma stride {stride} is shorter than width {}",
                self.width
            )));
        }
        check_len("luma plane", len, span(stride, self.width, self.height))
    }

    fn check_chroma(&self, name: &str, len: usize, stride: usize) -> Result<()> {
        if self.chroma_rows == 0 {
            return Ok(());
        }
        if stride < self.chroma_row_bytes {
            return Err(OepError::InvalidArgument(format!(
                "{name} stride {stride} is shorter than {} bytes",
                self.chroma_row_bytes
            )));
        }
        check_len(
            name,
            len,
            span(stride, self.chroma_row_bytes, self.chroma_rows),
        )
    }

    fn copy_luma(&self, src: &[u8], stride: usize) -> ColorPlane {
        ColorPlane::owned(copy_rows(src, stride, self.width, self.height), self.width)
    }

    fn copy_chroma(&self, src: &[u8], stride: usize) -> ColorPlane {
        if self.chroma_rows == 0 {
            return ColorPlane::owned(Vec::new(), self.chroma_row_bytes);
        }
        ColorPlane::owned(
            copy_rows(src, stride, self.chroma_row_bytes, self.chroma_rows),
            self.chroma_row_bytes,
        )
    }

    fn build(
        &self,
        format: ImageFormat,
        encoding: YuvEncoding,
        planes: smallvec::SmallVec<[ColorPlane; 3]>,
    ) -> FullImage {
        FullImage::Yuv(YuvImage {
            planes,
            layout: self.layout,
            encoding,
            format,
        })
    }
}
