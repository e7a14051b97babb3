//! CPU orientation of RGBA frames.
//!
//! Orientation is a vertical flip followed by a clockwise rotation. Rotating
//! by 90 or 270 degrees swaps width and height.

use oep_core::{CameraOrientation, FrameBuffer, FrameFormat, OrientFormat};

/// Size of a `width`×`height` frame after rotation.
pub fn oriented_size(width: u32, height: u32, orientation: CameraOrientation) -> (u32, u32) {
    if orientation.swaps_dimensions() {
        (height, width)
    } else {
        (width, height)
    }
}

/// Flip rows top to bottom.
pub fn flip_vertical(frame: &FrameBuffer) -> FrameBuffer {
    let mut out = FrameBuffer::new(frame.width, frame.height, frame.format);
    for (src, dst) in frame.planes.iter().zip(out.planes.iter_mut()) {
        for y in 0..src.height {
            dst.row_mut(src.height - 1 - y).copy_from_slice(src.row(y));
        }
    }
    out
}

/// Rotate clockwise. Only RGBA8 frames can be rotated; other formats are
/// returned unchanged.
pub fn rotate(frame: &FrameBuffer, orientation: CameraOrientation) -> FrameBuffer {
    if orientation == CameraOrientation::Deg0 || frame.format != FrameFormat::Rgba8 {
        return frame.clone();
    }

    let (w, h) = (frame.width, frame.height);
    let (ow, oh) = oriented_size(w, h, orientation);
    let mut out = FrameBuffer::new(ow, oh, FrameFormat::Rgba8);
    let src = frame.primary_plane();
    let dst = out.primary_plane_mut();

    for yd in 0..oh {
        let row = dst.row_mut(yd);
        for xd in 0..ow {
            let (xs, ys) = match orientation {
                CameraOrientation::Deg90 => (yd, h - 1 - xd),
                CameraOrientation::Deg180 => (w - 1 - xd, h - 1 - yd),
                CameraOrientation::Deg270 => (w - 1 - yd, xd),
                CameraOrientation::Deg0 => (xd, yd),
            };
            let i = xs as usize * 4;
            let o = xd as usize * 4;
            row[o..o + 4].copy_from_slice(&src.row(ys)[i..i + 4]);
        }
    }
    out
}

/// Apply `orient` to an RGBA frame: y-flip first, then rotation.
pub fn orient_frame(frame: &FrameBuffer, orient: OrientFormat) -> FrameBuffer {
    let flipped;
    let source = if orient.is_y_flip {
        flipped = flip_vertical(frame);
        &flipped
    } else {
        frame
    };
    rotate(source, orient.orientation)
}
