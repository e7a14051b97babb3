//! Player configuration.

use crate::effect_player::EffectPlayerConfig;
use oep_core::{OepError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Upper bound for `max_backoff_us`: one second.
pub const MAX_BACKOFF_LIMIT_US: u64 = 1_000_000;

/// How long the worker keeps calling `draw` for one frame.
///
/// The first `spin_attempts` retries only yield the thread; after that each
/// retry sleeps, doubling from `initial_backoff_us` up to `max_backoff_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawRetryPolicy {
    pub max_attempts: u32,
    pub spin_attempts: u32,
    pub initial_backoff_us: u64,
    pub max_backoff_us: u64,
}

impl Default for DrawRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2000,
            spin_attempts: 64,
            initial_backoff_us: 50,
            max_backoff_us: 5_000,
        }
    }
}

impl DrawRetryPolicy {
    /// Call `draw` until it returns a non-negative frame index. An error
    /// from `draw` ends the wait immediately.
    pub fn run<F>(&self, mut draw: F) -> Result<i64>
    where
        F: FnMut() -> Result<i64>,
    {
        let cap = self.max_backoff_us.clamp(1, MAX_BACKOFF_LIMIT_US);
        let mut backoff = self.initial_backoff_us.clamp(1, cap);
        for attempt in 0..self.max_attempts {
            let index = draw()?;
            if index >= 0 {
                return Ok(index);
            }
            if attempt < self.spin_attempts {
                thread::yield_now();
            } else {
                thread::sleep(Duration::from_micros(backoff));
                backoff = backoff.saturating_mul(2).min(cap);
            }
        }
        Err(OepError::DrawTimeout {
            attempts: self.max_attempts,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(OepError::Config(
                "draw_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_backoff_us > MAX_BACKOFF_LIMIT_US {
            return Err(OepError::Config(format!(
                "draw_retry.max_backoff_us ({}) exceeds {}",
                self.max_backoff_us, MAX_BACKOFF_LIMIT_US
            )));
        }
        if self.initial_backoff_us > self.max_backoff_us {
            return Err(OepError::Config(format!(
                "draw_retry.initial_backoff_us ({}) exceeds max_backoff_us ({})",
                self.initial_backoff_us, self.max_backoff_us
            )));
        }
        Ok(())
    }
}

/// Settings of an `OffscreenEffectPlayer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OepConfig {
    /// Directories the engine loads effects and resources from.
    pub resource_paths: Vec<PathBuf>,
    /// License token passed to the engine.
    pub client_token: String,
    pub width: u32,
    pub height: u32,
    /// Audio is driven by the host instead of the engine.
    pub manual_audio: bool,
    /// Name of the worker thread.
    pub worker_name: String,
    pub draw_retry: DrawRetryPolicy,
}

impl Default for OepConfig {
    fn default() -> Self {
        Self {
            resource_paths: Vec::new(),
            client_token: String::new(),
            width: 1280,
            height: 720,
            manual_audio: false,
            worker_name: "oep-render".to_string(),
            draw_retry: DrawRetryPolicy::default(),
        }
    }
}

impl OepConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(OepError::Config(format!(
                "surface size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.worker_name.is_empty() {
            return Err(OepError::Config("worker_name must not be empty".to_string()));
        }
        self.draw_retry.validate()
    }

    /// Parameters for the engine factory.
    pub fn effect_player_config(&self) -> EffectPlayerConfig {
        EffectPlayerConfig {
            width: self.width,
            height: self.height,
            manual_audio: self.manual_audio,
            resource_paths: self.resource_paths.clone(),
            client_token: self.client_token.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| OepError::Serialization(e.to_string()))
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| OepError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
