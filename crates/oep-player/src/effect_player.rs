//! Contract of the effect engine driven by the player.
//!
//! The engine itself (effects, tracking, scripting) lives outside this
//! workspace. The player only needs the calls below, and only ever makes
//! them from its worker thread, except for the effect manager which callers
//! may reach synchronously.

use oep_core::{FullImage, Result};
use oep_render::{OffscreenRenderTarget, SurfaceData};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Receives the result of a script evaluation.
pub type JsCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// Parameters the engine is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectPlayerConfig {
    pub width: u32,
    pub height: u32,
    /// Audio is driven by the host instead of the engine.
    pub manual_audio: bool,
    pub resource_paths: Vec<PathBuf>,
    pub client_token: String,
}

/// The effect engine.
pub trait EffectPlayer: Send {
    fn surface_created(&mut self, width: u32, height: u32);
    fn surface_changed(&mut self, width: u32, height: u32);
    fn surface_destroyed(&mut self);

    /// Queue an input frame for the next `draw`.
    fn push_frame(&mut self, image: FullImage) -> Result<()>;

    /// Render into `target`. Returns the index of the drawn frame, or a
    /// negative value while the frame is not ready yet. An error means the
    /// frame can never be drawn and is not retried.
    fn draw(&mut self, target: &mut dyn OffscreenRenderTarget) -> Result<i64>;

    fn effect_manager(&self) -> Option<Arc<dyn EffectManager>>;

    fn playback_play(&mut self);
    fn playback_pause(&mut self);
    fn playback_stop(&mut self);
}

/// Loads effects and routes surface settings to them.
pub trait EffectManager: Send + Sync {
    /// Load the effect at `path`. An empty path unloads the current one.
    fn load(&self, path: &str) -> Result<Option<Arc<dyn Effect>>>;
    fn current(&self) -> Option<Arc<dyn Effect>>;
    fn set_effect_size(&self, width: u32, height: u32);
    fn set_render_surface(&self, surface: Option<SurfaceData>);
    fn disable_surface_presentation(&self);
}

/// A loaded effect.
pub trait Effect: Send + Sync {
    fn url(&self) -> &str;
    fn call_js_method(&self, method: &str, params: &str) -> Result<()>;
    fn eval_js(&self, script: &str, callback: Option<JsCallback>) -> Result<()>;
}
