//! End-to-end frame pipeline: rendering, backpressure, resize, teardown.

use crate::support::{color_bars, flush, reference_player, InstrumentedTarget, TIMEOUT};
use oep_core::{CameraOrientation, FrameBuffer, FrameFormat, OepError, OrientFormat};
use oep_player::{DrawRetryPolicy, OepConfig, SharedPixelBuffer};
use oep_render::{shared, OutputImageFormat};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn renders_640x480_rgba_frame_end_to_end() {
    let t = reference_player(OepConfig::new(640, 480), 0, None);
    let (tx, rx) = crossbeam_channel::bounded(1);

    t.player.process_image_async(
        color_bars(640, 480),
        move |buffer| {
            let buffer = buffer.expect("frame should render");
            assert!(buffer.is_locked());
            assert_eq!((buffer.width(), buffer.height()), (640, 480));
            // Synchronous on the worker thread.
            buffer.get_image(OutputImageFormat::Rgba, move |image| {
                tx.send(image.and_then(|i| i.into_frame())).unwrap();
            });
        },
        None,
    );

    let frame = rx.recv_timeout(TIMEOUT).unwrap().expect("image read back");
    assert_eq!(frame.format, FrameFormat::Rgba8);
    assert_eq!((frame.width, frame.height), (640, 480));
    assert_eq!(frame, FrameBuffer::test_pattern(640, 480));
    assert_eq!(t.monitor.frames_drawn(), 1);
}

#[test]
fn reads_nv12_and_rotated_output() {
    let t = reference_player(OepConfig::new(64, 32), 0, None);
    let (tx, rx) = crossbeam_channel::bounded(2);

    t.player.process_image_async(
        color_bars(64, 32),
        move |buffer| {
            let buffer = buffer.unwrap();
            for format in [OutputImageFormat::Nv12, OutputImageFormat::Texture] {
                let tx = tx.clone();
                buffer.get_image(format, move |image| {
                    tx.send(image.map(|i| (i.width(), i.height(), i.as_frame().map(|f| f.format))))
                        .unwrap();
                });
            }
        },
        Some(OrientFormat::new(CameraOrientation::Deg90, true)),
    );

    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        Some((32, 64, Some(FrameFormat::Nv12)))
    );
    // The software target has no texture.
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), None);
}

#[test]
fn locked_buffer_rejects_new_frames() {
    let t = reference_player(OepConfig::new(32, 32), 0, None);
    let (tx, rx) = crossbeam_channel::bounded::<SharedPixelBuffer>(1);

    t.player.process_image_async(
        color_bars(32, 32),
        move |buffer| {
            let buffer = buffer.unwrap();
            // Hold the frame past the callback.
            buffer.lock();
            tx.send(buffer).unwrap();
        },
        None,
    );
    let held = rx.recv_timeout(TIMEOUT).unwrap();
    flush(&t.player);
    assert_eq!(held.lock_count(), 1);

    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    t.player.process_image_async(
        color_bars(32, 32),
        move |_| flag.store(true, Ordering::SeqCst),
        None,
    );
    assert_eq!(t.player.frames_in_flight(), 0);
    flush(&t.player);
    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(t.monitor.frames_pushed(), 1);

    // Reading a held buffer from another thread is queued to the worker.
    let (img_tx, img_rx) = crossbeam_channel::bounded(1);
    held.get_image(OutputImageFormat::Rgba, move |image| {
        img_tx.send(image.is_some()).unwrap();
    });
    assert!(img_rx.recv_timeout(TIMEOUT).unwrap());

    held.unlock().unwrap();
    assert!(matches!(held.unlock(), Err(OepError::Usage(_))));

    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player.process_image_async(
        color_bars(32, 32),
        move |buffer| tx.send(buffer.is_some()).unwrap(),
        None,
    );
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    assert_eq!(t.monitor.frames_pushed(), 2);
}

#[test]
fn surface_change_renders_at_new_size_with_new_buffer() {
    let t = reference_player(OepConfig::new(64, 48), 0, None);
    let (tx, rx) = crossbeam_channel::bounded::<SharedPixelBuffer>(1);

    t.player.process_image_async(
        color_bars(64, 48),
        move |buffer| {
            let buffer = buffer.unwrap();
            buffer.lock();
            tx.send(buffer).unwrap();
        },
        None,
    );
    let old = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(old.generation(), 0);

    t.player.surface_changed(32, 24).unwrap();
    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player.process_image_async(
        color_bars(64, 48),
        move |buffer| {
            let buffer = buffer.unwrap();
            let generation = buffer.generation();
            buffer.get_image(OutputImageFormat::Rgba, move |image| {
                tx.send((generation, image.map(|i| (i.width(), i.height()))))
                    .unwrap();
            });
        },
        None,
    );

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), (1, Some((32, 24))));
    flush(&t.player);
    assert_eq!(t.player.surface_size(), (32, 24));
    assert!(!Arc::ptr_eq(&old, &t.player.current_pixel_buffer().unwrap()));

    // The old handle can no longer be read.
    let (tx, rx) = crossbeam_channel::bounded(1);
    old.get_image(OutputImageFormat::Rgba, move |image| {
        tx.send(image.is_none()).unwrap();
    });
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    old.unlock().unwrap();
}

#[test]
fn engine_that_never_finishes_times_out() {
    let mut config = OepConfig::new(16, 16);
    config.draw_retry = DrawRetryPolicy {
        max_attempts: 8,
        spin_attempts: 4,
        initial_backoff_us: 10,
        max_backoff_us: 100,
    };
    let t = reference_player(config, u32::MAX, None);

    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player.process_image_async(
        color_bars(16, 16),
        move |buffer| tx.send(buffer.is_none()).unwrap(),
        None,
    );
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    flush(&t.player);
    assert_eq!(t.monitor.frames_drawn(), 0);
    assert!(!t.player.current_pixel_buffer().unwrap().is_locked());
    assert_eq!(t.player.frames_in_flight(), 0);
}

#[test]
fn panicking_frame_callback_does_not_stall_later_frames() {
    let t = reference_player(OepConfig::new(16, 16), 0, None);
    t.player
        .process_image_async(color_bars(16, 16), |_| panic!("callback failed"), None);
    flush(&t.player);
    assert_eq!(t.player.frames_in_flight(), 0);
    assert!(!t.player.current_pixel_buffer().unwrap().is_locked());

    // A panicking callback for a superseded frame is survived too.
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);
    t.player.read_current_buffer(move |_| {
        let _ = gate_rx.recv_timeout(TIMEOUT);
    });
    t.player
        .process_image_async(color_bars(16, 16), |_| panic!("callback failed"), None);
    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player.process_image_async(
        color_bars(16, 16),
        move |buffer| tx.send(buffer.is_some()).unwrap(),
        None,
    );
    gate_tx.send(()).unwrap();
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    flush(&t.player);
    assert_eq!(t.player.frames_in_flight(), 0);

    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player.process_image_async(
        color_bars(16, 16),
        move |buffer| tx.send(buffer.is_some()).unwrap(),
        None,
    );
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    assert_eq!(t.monitor.frames_drawn(), 3);
}

#[test]
fn rejected_draw_fails_the_frame_without_waiting() {
    let target = InstrumentedTarget::new(16, 16);
    let stats = Arc::clone(&target.stats);
    stats.reject_draws.store(true, Ordering::Release);
    // Default retry policy: treating the failure as pending would wait ~10s.
    let t = reference_player(OepConfig::new(16, 16), 0, Some(shared(target)));

    let start = Instant::now();
    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player.process_image_async(
        color_bars(16, 16),
        move |buffer| tx.send(buffer.is_none()).unwrap(),
        None,
    );
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(t.monitor.frames_drawn(), 0);

    stats.reject_draws.store(false, Ordering::Release);
    flush(&t.player);
    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player.process_image_async(
        color_bars(16, 16),
        move |buffer| tx.send(buffer.is_some()).unwrap(),
        None,
    );
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
}

#[test]
fn slow_engine_is_waited_for() {
    let t = reference_player(OepConfig::new(16, 16), 200, None);
    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player.process_image_async(
        color_bars(16, 16),
        move |buffer| tx.send(buffer.is_some()).unwrap(),
        None,
    );
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
}

#[test]
fn dropping_player_destroys_surface_and_detaches_buffers() {
    let t = reference_player(OepConfig::new(16, 16), 0, None);
    let (tx, rx) = crossbeam_channel::bounded::<SharedPixelBuffer>(1);
    t.player.process_image_async(
        color_bars(16, 16),
        move |buffer| {
            let buffer = buffer.unwrap();
            buffer.lock();
            tx.send(buffer).unwrap();
        },
        None,
    );
    let held = rx.recv_timeout(TIMEOUT).unwrap();
    assert!(held.is_attached());

    drop(t.player);
    assert!(t.monitor.is_destroyed());
    assert!(!held.is_attached());

    let (tx, rx) = crossbeam_channel::bounded(1);
    held.get_image(OutputImageFormat::Rgba, move |image| {
        tx.send(image.is_none()).unwrap();
    });
    assert_eq!(rx.try_recv(), Ok(true));
}

#[test]
fn reads_queued_before_destruction_are_dropped() {
    let t = reference_player(OepConfig::new(16, 16), 0, None);
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);

    // Park the worker inside a frame callback.
    t.player.process_image_async(
        color_bars(16, 16),
        move |_| {
            let _ = gate_rx.recv_timeout(TIMEOUT);
        },
        None,
    );

    let read = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&read);
    t.player
        .read_current_buffer(move |_| flag.store(true, Ordering::SeqCst));

    let opener = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        gate_tx.send(()).unwrap();
    });
    drop(t.player);
    opener.join().unwrap();

    assert!(!read.load(Ordering::SeqCst));
    assert!(t.monitor.is_destroyed());
}
