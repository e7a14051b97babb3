//! OEP Player - offscreen effect player
//!
//! Pushes camera frames through an effect engine and hands the rendered
//! result back without a window:
//! - [`Scheduler`]: the single worker thread all engine and GPU work runs on
//! - [`OffscreenEffectPlayer`]: frame submission with backpressure, effect
//!   control, surface resize and read-back
//! - [`PixelBuffer`]: lock-counted handle to a rendered frame
//! - [`EffectPlayer`]: the engine contract, with [`ReferenceEffectPlayer`]
//!   as a CPU pass-through implementation

pub mod config;
pub mod effect_player;
pub mod offscreen_effect_player;
pub mod pixel_buffer;
pub mod reference;
pub mod scheduler;

pub use config::{DrawRetryPolicy, OepConfig};
pub use effect_player::{Effect, EffectManager, EffectPlayer, EffectPlayerConfig, JsCallback};
pub use offscreen_effect_player::{
    BufferCallback, FrameCallback, ImageCallback, OffscreenEffectPlayer,
};
pub use pixel_buffer::{PixelBuffer, SharedPixelBuffer};
pub use reference::{
    resample_nearest, EngineMonitor, PlaybackState, ReferenceEffect, ReferenceEffectManager,
    ReferenceEffectPlayer,
};
pub use scheduler::Scheduler;
