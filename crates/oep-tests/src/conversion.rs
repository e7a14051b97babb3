//! Host buffers through the whole pipeline.

use crate::support::{reference_player, TIMEOUT};
use oep_core::{
    from_biplanar_yuv_no_copy, from_packed_no_copy, from_packed_planes, CameraOrientation,
    ChannelPlane, FrameBuffer, ImageFormat, PixelFormat, YuvEncoding,
};
use oep_player::OepConfig;
use oep_render::OutputImageFormat;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn release_counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, move || {
        c.fetch_add(1, Ordering::SeqCst);
    })
}

fn render_rgba(t: &crate::support::TestPlayer, image: oep_core::FullImage) -> FrameBuffer {
    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player.process_image_async(
        image,
        move |buffer| {
            buffer.unwrap().get_image(OutputImageFormat::Rgba, move |image| {
                tx.send(image.and_then(|i| i.into_frame())).unwrap();
            });
        },
        None,
    );
    rx.recv_timeout(TIMEOUT).unwrap().unwrap()
}

#[test]
fn zero_copy_bgra_is_released_once_after_render() {
    let t = reference_player(OepConfig::new(8, 4), 0, None);
    let expected = FrameBuffer::test_pattern(8, 4);
    let mut bgra = expected.primary_plane().to_packed();
    for px in bgra.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let (released, release) = release_counter();
    let image = from_packed_no_copy(
        ImageFormat::new(8, 4, CameraOrientation::Deg0),
        PixelFormat::Bgra,
        bgra,
        32,
        release,
    )
    .unwrap();
    assert!(image.is_zero_copy());

    let frame = render_rgba(&t, image);
    assert_eq!(frame, expected);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn padded_nv12_renders_gray() {
    let t = reference_player(OepConfig::new(8, 8), 0, None);
    let (luma_count, luma_release) = release_counter();
    let (chroma_count, chroma_release) = release_counter();

    // Mid gray in video range, rows padded to 16 bytes.
    let image = from_biplanar_yuv_no_copy(
        ImageFormat::new(8, 8, CameraOrientation::Deg0),
        YuvEncoding::BT709_VIDEO,
        vec![126u8; 16 * 8],
        16,
        luma_release,
        vec![128u8; 16 * 4],
        16,
        chroma_release,
    )
    .unwrap();
    assert!(!image.is_zero_copy());
    assert_eq!(luma_count.load(Ordering::SeqCst), 1);
    assert_eq!(chroma_count.load(Ordering::SeqCst), 1);

    let frame = render_rgba(&t, image);
    let [r, g, b, a] = frame.pixel(3, 3).unwrap();
    assert_eq!(a, 255);
    assert!(r == g && g == b, "expected gray, got {:?}", (r, g, b));
    assert!((r as i32 - 128).abs() <= 2);
}

#[test]
fn planar_rgb_with_rotation_renders_upright() {
    let t = reference_player(OepConfig::new(4, 2), 0, None);
    // Sensor delivers the 4x2 upright image rotated a quarter turn: 2x4.
    let upright = FrameBuffer::test_pattern(4, 2);
    let sensor = oep_render::rotate(&upright, CameraOrientation::Deg90);
    let packed = sensor.primary_plane().to_packed();
    let stride = sensor.width as i32 * 4;

    let image = from_packed_planes(
        ImageFormat::new(sensor.width, sensor.height, CameraOrientation::Deg90),
        ChannelPlane::new(&packed[0..], stride, 4),
        ChannelPlane::new(&packed[1..], stride, 4),
        ChannelPlane::new(&packed[2..], stride, 4),
    )
    .unwrap();

    // Default orientation rotates the output back to the sensor layout.
    let frame = render_rgba(&t, image);
    assert_eq!((frame.width, frame.height), (2, 4));
    assert_eq!(frame, sensor);
}
