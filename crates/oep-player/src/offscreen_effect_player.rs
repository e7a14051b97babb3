//! The offscreen effect player.
//!
//! Callers submit frames from any thread; everything that touches the
//! engine or the render target runs on one worker thread. At most one frame
//! is rendered at a time: a submission is rejected up front while the
//! caller still holds the previous result locked, and on the worker a frame
//! is only rendered if it is the sole one in flight and it wins the render
//! slot. Older frames that lose are answered with `None`.

use crate::config::{DrawRetryPolicy, OepConfig};
use crate::effect_player::{EffectManager, EffectPlayer, EffectPlayerConfig, JsCallback};
use crate::pixel_buffer::{PixelBuffer, SharedPixelBuffer};
use crate::scheduler::Scheduler;
use oep_core::{FrameBuffer, FullImage, OepError, OrientFormat, Result};
use oep_render::{
    shared, OutputImageFormat, RenderedImage, SharedRenderTarget, SoftwareRenderTarget,
    SurfaceData,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Receives the locked pixel buffer of a rendered frame, or `None` if the
/// frame was dropped or failed.
pub type FrameCallback = Box<dyn FnOnce(Option<SharedPixelBuffer>) + Send + 'static>;

/// Receives an image read from the render target.
pub type ImageCallback = Box<dyn FnOnce(Option<RenderedImage>) + Send + 'static>;

/// Receives the raw render surface.
pub type BufferCallback = Box<dyn FnOnce(Option<FrameBuffer>) + Send + 'static>;

/// State shared between the player and the tasks it queues.
struct Pipeline {
    engine: Mutex<Box<dyn EffectPlayer>>,
    target: SharedRenderTarget,
    effect_manager: Option<Arc<dyn EffectManager>>,
    retry: DrawRetryPolicy,
    in_flight: AtomicUsize,
    rendering: AtomicBool,
    /// Bumped by callers on every resize request.
    requested_generation: AtomicU64,
    /// Generation the render target currently holds.
    surface_generation: AtomicU64,
    surface_size: Mutex<(u32, u32)>,
    current_buffer: Mutex<Option<SharedPixelBuffer>>,
}

/// Counts a frame task as in flight until it is dropped, also when the
/// frame callback panics.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Releases the render slot and the buffer lock once a frame is done.
struct RenderSlot<'a> {
    rendering: &'a AtomicBool,
    buffer: SharedPixelBuffer,
}

impl Drop for RenderSlot<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.buffer.unlock() {
            error!(error = %e, "Render slot released an unlocked buffer");
        }
        self.rendering.store(false, Ordering::Release);
    }
}

impl Pipeline {
    fn initialize(&self) {
        let (width, height) = *self.surface_size.lock();
        let mut engine = self.engine.lock();
        let mut target = self.target.lock();

        if let Err(e) = target.init() {
            error!(error = %e, target = target.name(), "Render target init failed");
            return;
        }
        if let Err(e) = target.activate_context() {
            error!(error = %e, target = target.name(), "Failed to activate render context");
        }
        if let (Some(surface), Some(manager)) = (target.render_surface(), &self.effect_manager) {
            manager.set_render_surface(Some(surface));
        }
        engine.surface_created(width, height);
        info!(width, height, target = target.name(), "Offscreen effect player initialized");
    }

    fn process_frame(
        &self,
        image: FullImage,
        orient: OrientFormat,
        buffer: SharedPixelBuffer,
        callback: FrameCallback,
    ) {
        let _in_flight = InFlight(&self.in_flight);
        let admitted = self.in_flight.load(Ordering::Acquire) == 1
            && self
                .rendering
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();

        if !admitted {
            debug!("Frame superseded by a newer submission");
            drop(image);
            callback(None);
            return;
        }

        buffer.lock();
        let slot = RenderSlot {
            rendering: &self.rendering,
            buffer: Arc::clone(&buffer),
        };
        match self.render(image, orient) {
            Ok(index) => {
                debug!(frame = index, "Frame rendered");
                callback(Some(buffer));
            }
            Err(e) => {
                error!(error = %e, "Frame render failed");
                callback(None);
            }
        }
        drop(slot);
    }

    fn render(&self, image: FullImage, orient: OrientFormat) -> Result<i64> {
        let mut engine = self.engine.lock();
        let mut target = self.target.lock();

        target.activate_context()?;
        target.prepare_rendering()?;
        engine.push_frame(image)?;
        let index = self.retry.run(|| engine.draw(&mut *target))?;
        target.orient_image(orient)?;
        Ok(index)
    }

    fn resize(&self, width: u32, height: u32, generation: u64) {
        let mut engine = self.engine.lock();
        engine.surface_changed(width, height);
        if let Some(manager) = &self.effect_manager {
            manager.set_effect_size(width, height);
        }

        {
            let mut current = self.current_buffer.lock();
            if current.as_ref().is_some_and(|b| b.generation() < generation) {
                *current = None;
            }
        }

        let mut target = self.target.lock();
        if let Err(e) = target.surface_changed(width, height) {
            error!(error = %e, width, height, "Render target resize failed");
        }
        *self.surface_size.lock() = (width, height);
        self.surface_generation.store(generation, Ordering::Release);
        info!(width, height, generation, "Surface changed");
    }

    fn read_image(&self, generation: Option<u64>, format: OutputImageFormat) -> Option<RenderedImage> {
        if let Some(generation) = generation {
            let current = self.surface_generation.load(Ordering::Acquire);
            if generation != current {
                warn!(
                    buffer_generation = generation,
                    surface_generation = current,
                    "Pixel buffer predates a surface change"
                );
                return None;
            }
        }
        self.target.lock().get_image(format)
    }

    fn destroy(&self) {
        self.engine.lock().surface_destroyed();
        self.current_buffer.lock().take();
        info!("Offscreen effect player destroyed");
    }
}

/// Runs an effect engine off-screen on a dedicated worker thread.
pub struct OffscreenEffectPlayer {
    self_ref: Weak<Self>,
    scheduler: Scheduler,
    pipeline: Arc<Pipeline>,
}

impl OffscreenEffectPlayer {
    /// Create the player and queue its initialization on the worker.
    ///
    /// `factory` builds the engine from the config. Without an external
    /// `target`, a software render target of the configured size is used.
    pub fn create<F>(
        config: OepConfig,
        factory: F,
        target: Option<SharedRenderTarget>,
    ) -> Result<Arc<Self>>
    where
        F: FnOnce(&EffectPlayerConfig) -> Result<Box<dyn EffectPlayer>>,
    {
        config.validate()?;
        let engine = factory(&config.effect_player_config())?;
        let effect_manager = engine.effect_manager();
        let target =
            target.unwrap_or_else(|| shared(SoftwareRenderTarget::new(config.width, config.height)));

        let scheduler = Scheduler::new(config.worker_name.clone())?;
        let pipeline = Arc::new(Pipeline {
            engine: Mutex::new(engine),
            target,
            effect_manager,
            retry: config.draw_retry,
            in_flight: AtomicUsize::new(0),
            rendering: AtomicBool::new(false),
            requested_generation: AtomicU64::new(0),
            surface_generation: AtomicU64::new(0),
            surface_size: Mutex::new((config.width, config.height)),
            current_buffer: Mutex::new(None),
        });

        let init = Arc::clone(&pipeline);
        if !scheduler.enqueue(move || init.initialize()) {
            return Err(OepError::Internal(
                "scheduler rejected the init task".to_string(),
            ));
        }

        info!(
            width = config.width,
            height = config.height,
            worker = %config.worker_name,
            "Offscreen effect player created"
        );
        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            scheduler,
            pipeline,
        }))
    }

    /// Render `image` and hand the locked result to `callback`.
    ///
    /// Returns without queuing anything, and without calling `callback`,
    /// while the previous result is still locked by the caller.
    /// `target_orientation` defaults to the image's orientation with a
    /// y-flip.
    pub fn process_image_async<F>(
        &self,
        image: FullImage,
        callback: F,
        target_orientation: Option<OrientFormat>,
    ) where
        F: FnOnce(Option<SharedPixelBuffer>) + Send + 'static,
    {
        let buffer = {
            let mut current = self.pipeline.current_buffer.lock();
            let buffer = current.get_or_insert_with(|| {
                let format = image.format();
                Arc::new(PixelBuffer::new(
                    self.self_ref.clone(),
                    format.width,
                    format.height,
                    format.orientation,
                    self.pipeline.requested_generation.load(Ordering::Acquire),
                ))
            });
            Arc::clone(buffer)
        };

        if buffer.is_locked() {
            warn!(
                lock_count = buffer.lock_count(),
                "Previous frame still locked, dropping submission"
            );
            return;
        }

        let orient = target_orientation
            .unwrap_or_else(|| OrientFormat::new(image.format().orientation, true));

        self.pipeline.in_flight.fetch_add(1, Ordering::AcqRel);
        let pipeline = Arc::clone(&self.pipeline);
        let callback: FrameCallback = Box::new(callback);
        if !self
            .scheduler
            .enqueue(move || pipeline.process_frame(image, orient, buffer, callback))
        {
            self.pipeline.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Resize the surface. Pixel buffers from before the resize can no
    /// longer be read.
    pub fn surface_changed(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(OepError::InvalidArgument(format!(
                "surface size must be non-zero, got {}x{}",
                width, height
            )));
        }
        let generation = self.pipeline.requested_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.pipeline.current_buffer.lock().take();

        let pipeline = Arc::clone(&self.pipeline);
        self.scheduler
            .enqueue(move || pipeline.resize(width, height, generation));
        Ok(())
    }

    /// Load an effect on the worker.
    pub fn load_effect(&self, path: &str) {
        let Some(manager) = self.pipeline.effect_manager.clone() else {
            error!(path, "Engine has no effect manager, cannot load effect");
            return;
        };
        let path = path.to_string();
        self.scheduler.enqueue(move || match manager.load(&path) {
            Ok(Some(effect)) => info!(url = effect.url(), "Effect loaded"),
            Ok(None) => info!("Effect unloaded"),
            Err(e) => error!(error = %e, path = %path, "Failed to load effect"),
        });
    }

    pub fn unload_effect(&self) {
        self.load_effect("");
    }

    /// Call a method of the loaded effect's script, on the calling thread.
    pub fn call_js_method(&self, method: &str, params: &str) {
        let Some(manager) = &self.pipeline.effect_manager else {
            error!(method, "Engine has no effect manager");
            return;
        };
        let Some(effect) = manager.current() else {
            error!(method, "No effect loaded");
            return;
        };
        if let Err(e) = effect.call_js_method(method, params) {
            error!(error = %e, method, "call_js_method failed");
        }
    }

    /// Evaluate a script in the loaded effect, on the calling thread.
    pub fn eval_js<F>(&self, script: &str, callback: Option<F>)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let Some(manager) = &self.pipeline.effect_manager else {
            error!("Engine has no effect manager");
            return;
        };
        let Some(effect) = manager.current() else {
            error!("No effect loaded");
            return;
        };
        let callback = callback.map(|cb| -> JsCallback { Box::new(cb) });
        if let Err(e) = effect.eval_js(script, callback) {
            error!(error = %e, "eval_js failed");
        }
    }

    pub fn pause(&self) {
        let pipeline = Arc::clone(&self.pipeline);
        self.scheduler
            .enqueue(move || pipeline.engine.lock().playback_pause());
    }

    pub fn resume(&self) {
        let pipeline = Arc::clone(&self.pipeline);
        self.scheduler
            .enqueue(move || pipeline.engine.lock().playback_play());
    }

    pub fn stop(&self) {
        let pipeline = Arc::clone(&self.pipeline);
        self.scheduler
            .enqueue(move || pipeline.engine.lock().playback_stop());
    }

    /// Hand a platform surface to the engine's effect manager.
    pub fn set_render_surface(&self, surface: Option<SurfaceData>) {
        let Some(manager) = self.pipeline.effect_manager.clone() else {
            error!("Engine has no effect manager");
            return;
        };
        self.scheduler
            .enqueue(move || manager.set_render_surface(surface));
    }

    pub fn disable_surface_presentation(&self) {
        let Some(manager) = self.pipeline.effect_manager.clone() else {
            error!("Engine has no effect manager");
            return;
        };
        self.scheduler
            .enqueue(move || manager.disable_surface_presentation());
    }

    /// Read the raw render surface.
    ///
    /// Synchronous on the worker thread. Elsewhere the read is queued; if the
    /// player is destroyed before it runs, `callback` is dropped unseen.
    pub fn read_current_buffer<F>(&self, callback: F)
    where
        F: FnOnce(Option<FrameBuffer>) + Send + 'static,
    {
        if self.scheduler.is_worker_thread() {
            let frame = self.pipeline.target.lock().read_current_buffer();
            callback(frame);
            return;
        }
        let player = self.self_ref.clone();
        let callback: BufferCallback = Box::new(callback);
        self.scheduler.enqueue(move || {
            let Some(frame) = player
                .upgrade()
                .map(|p| p.pipeline.target.lock().read_current_buffer())
            else {
                return;
            };
            callback(frame);
        });
    }

    /// Read the oriented output frame in `format`. Same threading as
    /// `read_current_buffer`.
    pub fn read_pixel_buffer<F>(&self, format: OutputImageFormat, callback: F)
    where
        F: FnOnce(Option<RenderedImage>) + Send + 'static,
    {
        self.read_pixel_buffer_for(None, format, Box::new(callback));
    }

    pub(crate) fn read_pixel_buffer_for(
        &self,
        generation: Option<u64>,
        format: OutputImageFormat,
        callback: ImageCallback,
    ) {
        if self.scheduler.is_worker_thread() {
            callback(self.pipeline.read_image(generation, format));
            return;
        }
        let player = self.self_ref.clone();
        self.scheduler.enqueue(move || {
            let Some(image) = player
                .upgrade()
                .map(|p| p.pipeline.read_image(generation, format))
            else {
                return;
            };
            callback(image);
        });
    }

    /// Frames submitted and not yet finished.
    pub fn frames_in_flight(&self) -> usize {
        self.pipeline.in_flight.load(Ordering::Acquire)
    }

    /// Surface size as last applied on the worker.
    pub fn surface_size(&self) -> (u32, u32) {
        *self.pipeline.surface_size.lock()
    }

    /// Tasks queued or running on the worker.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn is_worker_thread(&self) -> bool {
        self.scheduler.is_worker_thread()
    }

    /// The current pixel buffer, if one exists.
    pub fn current_pixel_buffer(&self) -> Option<SharedPixelBuffer> {
        self.pipeline.current_buffer.lock().clone()
    }
}

impl Drop for OffscreenEffectPlayer {
    fn drop(&mut self) {
        let pipeline = Arc::clone(&self.pipeline);
        self.scheduler.enqueue(move || pipeline.destroy());
        self.scheduler.shutdown();
    }
}
