//! Shared helpers: player construction and an instrumented render target.

use oep_core::{
    Bpc8Image, CameraOrientation, ColorPlane, FrameBuffer, FullImage, ImageFormat, OepError,
    OrientFormat, PixelFormat, Result,
};
use oep_player::{
    EffectPlayer, EngineMonitor, OepConfig, OffscreenEffectPlayer, ReferenceEffectManager,
    ReferenceEffectPlayer,
};
use oep_render::{
    OffscreenRenderTarget, OutputImageFormat, RenderedImage, SharedRenderTarget,
    SoftwareRenderTarget,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestPlayer {
    pub player: Arc<OffscreenEffectPlayer>,
    pub monitor: Arc<EngineMonitor>,
    pub manager: Arc<ReferenceEffectManager>,
}

/// Player running the reference engine.
pub fn reference_player(
    config: OepConfig,
    pending_draws: u32,
    target: Option<SharedRenderTarget>,
) -> TestPlayer {
    let mut handles = None;
    let player = OffscreenEffectPlayer::create(
        config,
        |cfg| {
            let engine = ReferenceEffectPlayer::new(cfg).with_pending_draws(pending_draws);
            handles = Some((engine.monitor(), engine.manager()));
            Ok(Box::new(engine) as Box<dyn EffectPlayer>)
        },
        target,
    )
    .unwrap();
    let (monitor, manager) = handles.unwrap();
    TestPlayer {
        player,
        monitor,
        manager,
    }
}

/// Owned RGBA image of the color bar pattern.
pub fn color_bars(width: u32, height: u32) -> FullImage {
    let frame = FrameBuffer::test_pattern(width, height);
    FullImage::Bpc8(Bpc8Image {
        plane: ColorPlane::owned(frame.primary_plane().to_packed(), width as usize * 4),
        pixel_format: PixelFormat::Rgba,
        format: ImageFormat::new(width, height, CameraOrientation::Deg0),
    })
}

/// Block until every task queued so far has run.
pub fn flush(player: &OffscreenEffectPlayer) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    player.read_current_buffer(move |_| {
        let _ = tx.send(());
    });
    rx.recv_timeout(TIMEOUT).unwrap();
}

/// Software target that records how it is driven.
pub struct InstrumentedTarget {
    inner: SoftwareRenderTarget,
    pub stats: Arc<TargetStats>,
}

#[derive(Default)]
pub struct TargetStats {
    rendering: AtomicBool,
    pub overlaps: AtomicUsize,
    pub renders: AtomicUsize,
    pub threads: Mutex<HashSet<ThreadId>>,
    /// While set, `draw_frame` fails.
    pub reject_draws: AtomicBool,
}

impl TargetStats {
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    fn touch(&self) {
        self.threads.lock().insert(thread::current().id());
    }
}

impl InstrumentedTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: SoftwareRenderTarget::new(width, height),
            stats: Arc::new(TargetStats::default()),
        }
    }
}

impl OffscreenRenderTarget for InstrumentedTarget {
    fn name(&self) -> &'static str {
        "instrumented"
    }

    fn init(&mut self) -> Result<()> {
        self.stats.touch();
        self.inner.init()
    }

    fn surface_changed(&mut self, width: u32, height: u32) -> Result<()> {
        self.stats.touch();
        self.inner.surface_changed(width, height)
    }

    fn activate_context(&mut self) -> Result<()> {
        self.stats.touch();
        self.inner.activate_context()
    }

    fn prepare_rendering(&mut self) -> Result<()> {
        self.stats.touch();
        if self.stats.rendering.swap(true, Ordering::AcqRel) {
            self.stats.overlaps.fetch_add(1, Ordering::AcqRel);
        }
        // Widen the window in which an overlapping render would show up.
        thread::sleep(Duration::from_micros(200));
        self.inner.prepare_rendering()
    }

    fn draw_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        self.stats.touch();
        if self.stats.reject_draws.load(Ordering::Acquire) {
            self.stats.rendering.store(false, Ordering::Release);
            return Err(OepError::RenderTarget("draw rejected".to_string()));
        }
        self.inner.draw_frame(frame)
    }

    fn orient_image(&mut self, orient: OrientFormat) -> Result<()> {
        self.stats.touch();
        let result = self.inner.orient_image(orient);
        self.stats.renders.fetch_add(1, Ordering::AcqRel);
        self.stats.rendering.store(false, Ordering::Release);
        result
    }

    fn read_current_buffer(&mut self) -> Option<FrameBuffer> {
        self.stats.touch();
        self.inner.read_current_buffer()
    }

    fn get_image(&mut self, format: OutputImageFormat) -> Option<RenderedImage> {
        self.stats.touch();
        self.inner.get_image(format)
    }

    fn size(&self) -> (u32, u32) {
        self.inner.size()
    }
}
