//! CPU reference engine.
//!
//! Renders every pushed frame unmodified: decode to RGBA, undo the camera
//! rotation, scale to the surface and hand it to the render target. There
//! are no effects, tracking or scripting; loaded "effects" only record the
//! calls made on them. Useful for running the pipeline without the real
//! engine.

use crate::effect_player::{Effect, EffectManager, EffectPlayer, EffectPlayerConfig, JsCallback};
use oep_core::{decode_to_rgba, FrameBuffer, FrameFormat, FullImage, OepError, Result};
use oep_render::{flip_vertical, rotate, OffscreenRenderTarget, SurfaceData};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Playback state set through `playback_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Playing,
    Paused,
    Stopped,
}

/// Observable engine state, shared with whoever created the engine.
#[derive(Debug, Default)]
pub struct EngineMonitor {
    surface: Mutex<Option<(u32, u32)>>,
    destroyed: AtomicBool,
    frames_pushed: AtomicU64,
    frames_drawn: AtomicU64,
    playback: Mutex<PlaybackState>,
}

impl EngineMonitor {
    /// Surface size, once created and until destroyed.
    pub fn surface(&self) -> Option<(u32, u32)> {
        *self.surface.lock()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed.load(Ordering::Acquire)
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn.load(Ordering::Acquire)
    }

    pub fn playback(&self) -> PlaybackState {
        *self.playback.lock()
    }
}

/// Pass-through effect engine.
pub struct ReferenceEffectPlayer {
    width: u32,
    height: u32,
    pending: Option<FullImage>,
    not_ready_draws: u32,
    remaining_not_ready: u32,
    frame_index: i64,
    manager: Arc<ReferenceEffectManager>,
    monitor: Arc<EngineMonitor>,
}

impl ReferenceEffectPlayer {
    pub fn new(config: &EffectPlayerConfig) -> Self {
        info!(
            width = config.width,
            height = config.height,
            resource_paths = config.resource_paths.len(),
            "Reference effect player created"
        );
        Self {
            width: config.width,
            height: config.height,
            pending: None,
            not_ready_draws: 0,
            remaining_not_ready: 0,
            frame_index: 0,
            manager: Arc::new(ReferenceEffectManager::default()),
            monitor: Arc::new(EngineMonitor::default()),
        }
    }

    /// Report every pushed frame as not ready for the first `draws` calls to
    /// `draw`, like an engine that renders asynchronously.
    pub fn with_pending_draws(mut self, draws: u32) -> Self {
        self.not_ready_draws = draws;
        self
    }

    pub fn monitor(&self) -> Arc<EngineMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn manager(&self) -> Arc<ReferenceEffectManager> {
        Arc::clone(&self.manager)
    }

    /// Engine factory for `OffscreenEffectPlayer::create`.
    pub fn factory(config: &EffectPlayerConfig) -> Result<Box<dyn EffectPlayer>> {
        Ok(Box::new(Self::new(config)))
    }

    fn compose(&self, image: &FullImage, width: u32, height: u32) -> Result<FrameBuffer> {
        let mut frame = decode_to_rgba(image)?;
        let format = image.format();
        if format.require_mirroring {
            frame = flip_vertical(&frame);
        }
        frame = rotate(&frame, format.orientation.inverse());
        if frame.width != width || frame.height != height {
            frame = resample_nearest(&frame, width, height);
        }
        Ok(frame)
    }
}

impl EffectPlayer for ReferenceEffectPlayer {
    fn surface_created(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        *self.monitor.surface.lock() = Some((width, height));
        self.manager.set_effect_size(width, height);
        debug!(width, height, "Engine surface created");
    }

    fn surface_changed(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        *self.monitor.surface.lock() = Some((width, height));
        debug!(width, height, "Engine surface changed");
    }

    fn surface_destroyed(&mut self) {
        self.pending = None;
        *self.monitor.surface.lock() = None;
        self.monitor.destroyed.store(true, Ordering::Release);
        debug!("Engine surface destroyed");
    }

    fn push_frame(&mut self, image: FullImage) -> Result<()> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OepError::InvalidArgument("empty frame".to_string()));
        }
        self.pending = Some(image);
        self.remaining_not_ready = self.not_ready_draws;
        self.monitor.frames_pushed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn draw(&mut self, target: &mut dyn OffscreenRenderTarget) -> Result<i64> {
        if self.pending.is_none() {
            return Ok(-1);
        }
        if self.remaining_not_ready > 0 {
            self.remaining_not_ready -= 1;
            return Ok(-1);
        }
        let Some(image) = self.pending.take() else {
            return Ok(-1);
        };

        let (width, height) = target.size();
        if (width, height) != (self.width, self.height) {
            debug!(
                target_width = width,
                target_height = height,
                surface_width = self.width,
                surface_height = self.height,
                "Render target and engine surface differ, scaling to the target"
            );
        }
        let frame = self.compose(&image, width, height).map_err(|e| {
            error!(error = %e, "Failed to compose frame");
            e
        })?;
        drop(image);

        target.draw_frame(&frame).map_err(|e| {
            error!(error = %e, target = target.name(), "Render target rejected frame");
            e
        })?;

        let index = self.frame_index;
        self.frame_index += 1;
        self.monitor.frames_drawn.fetch_add(1, Ordering::AcqRel);
        Ok(index)
    }

    fn effect_manager(&self) -> Option<Arc<dyn EffectManager>> {
        let manager: Arc<dyn EffectManager> = self.manager.clone();
        Some(manager)
    }

    fn playback_play(&mut self) {
        *self.monitor.playback.lock() = PlaybackState::Playing;
    }

    fn playback_pause(&mut self) {
        *self.monitor.playback.lock() = PlaybackState::Paused;
    }

    fn playback_stop(&mut self) {
        *self.monitor.playback.lock() = PlaybackState::Stopped;
    }
}

/// Nearest-neighbor scale of an RGBA8 frame.
pub fn resample_nearest(frame: &FrameBuffer, width: u32, height: u32) -> FrameBuffer {
    let mut out = FrameBuffer::new(width, height, FrameFormat::Rgba8);
    if frame.width == 0 || frame.height == 0 {
        return out;
    }
    let src = frame.primary_plane();
    let dst = out.primary_plane_mut();
    for y in 0..height {
        let sy = (y as u64 * frame.height as u64 / height as u64) as u32;
        let src_row = src.row(sy);
        let dst_row = dst.row_mut(y);
        for x in 0..width as usize {
            let sx = x * frame.width as usize / width as usize;
            dst_row[x * 4..x * 4 + 4].copy_from_slice(&src_row[sx * 4..sx * 4 + 4]);
        }
    }
    out
}

/// Effect manager of the reference engine.
#[derive(Default)]
pub struct ReferenceEffectManager {
    current: Mutex<Option<Arc<ReferenceEffect>>>,
    effect_size: Mutex<(u32, u32)>,
    render_surface: Mutex<Option<SurfaceData>>,
    presentation_disabled: AtomicBool,
}

impl ReferenceEffectManager {
    pub fn effect_size(&self) -> (u32, u32) {
        *self.effect_size.lock()
    }

    pub fn has_render_surface(&self) -> bool {
        self.render_surface.lock().is_some()
    }

    pub fn presentation_enabled(&self) -> bool {
        !self.presentation_disabled.load(Ordering::Acquire)
    }

    /// The loaded effect with its recorded calls.
    pub fn current_effect(&self) -> Option<Arc<ReferenceEffect>> {
        self.current.lock().clone()
    }
}

impl EffectManager for ReferenceEffectManager {
    fn load(&self, path: &str) -> Result<Option<Arc<dyn Effect>>> {
        let mut current = self.current.lock();
        if path.is_empty() {
            *current = None;
            return Ok(None);
        }
        let effect = Arc::new(ReferenceEffect::new(path));
        *current = Some(Arc::clone(&effect));
        Ok(Some(effect))
    }

    fn current(&self) -> Option<Arc<dyn Effect>> {
        let effect = self.current.lock().clone()?;
        Some(effect)
    }

    fn set_effect_size(&self, width: u32, height: u32) {
        *self.effect_size.lock() = (width, height);
    }

    fn set_render_surface(&self, surface: Option<SurfaceData>) {
        *self.render_surface.lock() = surface;
    }

    fn disable_surface_presentation(&self) {
        self.presentation_disabled.store(true, Ordering::Release);
    }
}

/// An effect of the reference engine. Records script calls.
#[derive(Debug)]
pub struct ReferenceEffect {
    url: String,
    js_calls: Mutex<Vec<(String, String)>>,
    scripts: Mutex<Vec<String>>,
}

impl ReferenceEffect {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            js_calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
        }
    }

    /// `(method, params)` of every `call_js_method`.
    pub fn js_calls(&self) -> Vec<(String, String)> {
        self.js_calls.lock().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().clone()
    }
}

impl Effect for ReferenceEffect {
    fn url(&self) -> &str {
        &self.url
    }

    fn call_js_method(&self, method: &str, params: &str) -> Result<()> {
        if method.is_empty() {
            return Err(OepError::Effect("empty method name".to_string()));
        }
        self.js_calls
            .lock()
            .push((method.to_string(), params.to_string()));
        Ok(())
    }

    fn eval_js(&self, script: &str, callback: Option<JsCallback>) -> Result<()> {
        self.scripts.lock().push(script.to_string());
        // No script runtime, every evaluation yields `undefined`.
        if let Some(callback) = callback {
            callback("undefined".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oep_core::{Bpc8Image, CameraOrientation, ColorPlane, ImageFormat, PixelFormat};
    use oep_render::SoftwareRenderTarget;

    fn config(w: u32, h: u32) -> EffectPlayerConfig {
        EffectPlayerConfig {
            width: w,
            height: h,
            manual_audio: false,
            resource_paths: Vec::new(),
            client_token: String::new(),
        }
    }

    fn rgba_image(frame: &FrameBuffer, orientation: CameraOrientation) -> FullImage {
        FullImage::Bpc8(Bpc8Image {
            plane: ColorPlane::owned(frame.primary_plane().to_packed(), frame.width as usize * 4),
            pixel_format: PixelFormat::Rgba,
            format: ImageFormat::new(frame.width, frame.height, orientation),
        })
    }

    fn ready_target(w: u32, h: u32) -> SoftwareRenderTarget {
        let mut target = SoftwareRenderTarget::new(w, h);
        target.init().unwrap();
        target.prepare_rendering().unwrap();
        target
    }

    #[test]
    fn test_draw_without_frame_is_pending() {
        let mut engine = ReferenceEffectPlayer::new(&config(4, 4));
        let mut target = ready_target(4, 4);
        assert!(engine.draw(&mut target).unwrap() < 0);
    }

    #[test]
    fn test_draw_renders_pushed_frame() {
        let mut engine = ReferenceEffectPlayer::new(&config(8, 4));
        let monitor = engine.monitor();
        let mut target = ready_target(8, 4);
        let frame = FrameBuffer::test_pattern(8, 4);

        engine.push_frame(rgba_image(&frame, CameraOrientation::Deg0)).unwrap();
        assert_eq!(engine.draw(&mut target).unwrap(), 0);
        assert_eq!(monitor.frames_drawn(), 1);
        // Consumed, next draw waits for a new frame.
        assert!(engine.draw(&mut target).unwrap() < 0);
        assert_eq!(target.frames_drawn(), 1);
    }

    #[test]
    fn test_pending_draws_delay_the_frame() {
        let mut engine = ReferenceEffectPlayer::new(&config(4, 4)).with_pending_draws(3);
        let mut target = ready_target(4, 4);
        engine
            .push_frame(rgba_image(&FrameBuffer::test_pattern(4, 4), CameraOrientation::Deg0))
            .unwrap();
        for _ in 0..3 {
            assert!(engine.draw(&mut target).unwrap() < 0);
        }
        assert_eq!(engine.draw(&mut target).unwrap(), 0);
    }

    #[test]
    fn test_rotated_input_is_drawn_upright() {
        let mut engine = ReferenceEffectPlayer::new(&config(8, 4));
        let mut target = ready_target(8, 4);
        let upright = FrameBuffer::test_pattern(8, 4);
        let sensor = rotate(&upright, CameraOrientation::Deg90);
        assert_eq!((sensor.width, sensor.height), (4, 8));

        engine
            .push_frame(rgba_image(&sensor, CameraOrientation::Deg90))
            .unwrap();
        assert!(engine.draw(&mut target).unwrap() >= 0);
        let drawn = flip_vertical(&target.read_current_buffer().unwrap());
        assert_eq!(drawn, upright);
    }

    #[test]
    fn test_rejected_frame_is_an_error_not_pending() {
        let mut engine = ReferenceEffectPlayer::new(&config(4, 4));
        let monitor = engine.monitor();
        // Never initialized, so draw_frame fails.
        let mut target = SoftwareRenderTarget::new(4, 4);
        engine
            .push_frame(rgba_image(&FrameBuffer::test_pattern(4, 4), CameraOrientation::Deg0))
            .unwrap();
        assert!(matches!(
            engine.draw(&mut target),
            Err(OepError::RenderTarget(_))
        ));
        assert_eq!(monitor.frames_drawn(), 0);
    }

    #[test]
    fn test_resample_nearest() {
        let frame = FrameBuffer::test_pattern(8, 2);
        let scaled = resample_nearest(&frame, 16, 4);
        assert_eq!(scaled.pixel(0, 0), frame.pixel(0, 0));
        assert_eq!(scaled.pixel(15, 3), frame.pixel(7, 1));
    }

    #[test]
    fn test_effect_manager_load_and_unload() {
        let manager = ReferenceEffectManager::default();
        let effect = manager.load("effects/test").unwrap().unwrap();
        assert_eq!(effect.url(), "effects/test");
        assert!(manager.current().is_some());
        effect.call_js_method("setColor", "{\"r\":1}").unwrap();
        assert!(effect.call_js_method("", "").is_err());
        assert_eq!(manager.current_effect().unwrap().js_calls().len(), 1);

        assert!(manager.load("").unwrap().is_none());
        assert!(manager.current().is_none());
    }

    #[test]
    fn test_eval_js_invokes_callback() {
        let effect = ReferenceEffect::new("e");
        let (tx, rx) = crossbeam_channel::bounded(1);
        effect
            .eval_js("1 + 1", Some(Box::new(move |r| tx.send(r).unwrap())))
            .unwrap();
        assert_eq!(rx.recv().unwrap(), "undefined");
        assert_eq!(effect.scripts(), vec!["1 + 1".to_string()]);
    }

    #[test]
    fn test_playback_state() {
        let mut engine = ReferenceEffectPlayer::new(&config(4, 4));
        let monitor = engine.monitor();
        engine.playback_pause();
        assert_eq!(monitor.playback(), PlaybackState::Paused);
        engine.playback_stop();
        assert_eq!(monitor.playback(), PlaybackState::Stopped);
        engine.playback_play();
        assert_eq!(monitor.playback(), PlaybackState::Playing);
    }
}
