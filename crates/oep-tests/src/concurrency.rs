//! Concurrent submissions never render two frames at once.

use crate::support::{color_bars, flush, reference_player, InstrumentedTarget, TIMEOUT};
use oep_player::OepConfig;
use oep_render::shared;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn concurrent_submissions_never_overlap() {
    let target = InstrumentedTarget::new(48, 32);
    let stats = Arc::clone(&target.stats);
    let t = reference_player(OepConfig::new(48, 32), 2, Some(shared(target)));

    let rendered = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicUsize::new(0));
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let player = Arc::clone(&t.player);
            let rendered = Arc::clone(&rendered);
            let dropped = Arc::clone(&dropped);
            thread::spawn(move || {
                for _ in 0..25 {
                    let rendered = Arc::clone(&rendered);
                    let dropped = Arc::clone(&dropped);
                    player.process_image_async(
                        color_bars(48, 32),
                        move |buffer| match buffer {
                            Some(buffer) => {
                                assert!(buffer.is_locked());
                                rendered.fetch_add(1, Ordering::SeqCst);
                            }
                            None => {
                                dropped.fetch_add(1, Ordering::SeqCst);
                            }
                        },
                        None,
                    );
                }
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }
    flush(&t.player);

    assert_eq!(stats.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(stats.thread_count(), 1, "target touched from several threads");
    assert_eq!(
        stats.renders.load(Ordering::SeqCst),
        rendered.load(Ordering::SeqCst)
    );
    assert!(rendered.load(Ordering::SeqCst) >= 1);
    assert!(rendered.load(Ordering::SeqCst) + dropped.load(Ordering::SeqCst) <= 200);
    assert_eq!(t.player.frames_in_flight(), 0);
}

#[test]
fn last_of_a_burst_is_rendered() {
    let t = reference_player(OepConfig::new(16, 16), 0, None);
    let (tx, rx) = crossbeam_channel::unbounded();

    // Park the worker so the burst queues up behind it.
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);
    t.player.read_current_buffer(move |_| {
        let _ = gate_rx.recv_timeout(TIMEOUT);
    });
    for i in 0..5 {
        let tx = tx.clone();
        t.player.process_image_async(
            color_bars(16, 16),
            move |buffer| tx.send((i, buffer.is_some())).unwrap(),
            None,
        );
    }
    gate_tx.send(()).unwrap();

    let results: Vec<_> = (0..5).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
    assert_eq!(
        results,
        vec![(0, false), (1, false), (2, false), (3, false), (4, true)]
    );
}
