//! Handle to a rendered frame.
//!
//! A `PixelBuffer` stands for the frame the player renders for a caller. It
//! is lock-counted: the player locks it while rendering and while the frame
//! callback runs, and a caller that wants to read the frame later locks it
//! again. While it is locked the player rejects new frames, so the rendered
//! pixels stay put until the caller is done.

use crate::offscreen_effect_player::OffscreenEffectPlayer;
use oep_core::{CameraOrientation, OepError, Result};
use oep_render::{OutputImageFormat, RenderedImage};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, warn};

/// Lock-counted handle to the player's current output frame.
pub struct PixelBuffer {
    player: Weak<OffscreenEffectPlayer>,
    width: u32,
    height: u32,
    orientation: CameraOrientation,
    generation: u64,
    lock_count: AtomicU32,
}

impl PixelBuffer {
    pub(crate) fn new(
        player: Weak<OffscreenEffectPlayer>,
        width: u32,
        height: u32,
        orientation: CameraOrientation,
        generation: u64,
    ) -> Self {
        Self {
            player,
            width,
            height,
            orientation,
            generation,
            lock_count: AtomicU32::new(0),
        }
    }

    pub fn lock(&self) {
        self.lock_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one lock. Unlocking a buffer that is not locked is an error
    /// and leaves the count at zero.
    #[must_use = "unlocking an unlocked buffer is a usage error"]
    pub fn unlock(&self) -> Result<()> {
        self.lock_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map(|_| ())
            .map_err(|_| {
                error!("Pixel buffer already unlocked");
                OepError::Usage("pixel buffer already unlocked".to_string())
            })
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count() != 0
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count.load(Ordering::Acquire)
    }

    /// Width of the input frame this buffer was created for.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn orientation(&self) -> CameraOrientation {
        self.orientation
    }

    /// Surface generation this buffer belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Read the rendered frame.
    ///
    /// The buffer must be locked. On the player's worker thread the read is
    /// synchronous; elsewhere it is queued and `callback` runs on the worker.
    /// Gets `None` if the buffer is unlocked, the player is gone, or the
    /// surface was resized since this buffer was created.
    pub fn get_image<F>(&self, format: OutputImageFormat, callback: F)
    where
        F: FnOnce(Option<RenderedImage>) + Send + 'static,
    {
        if !self.is_locked() {
            warn!("get_image on an unlocked pixel buffer");
            callback(None);
            return;
        }
        let Some(player) = self.player.upgrade() else {
            warn!("get_image after the player was destroyed");
            callback(None);
            return;
        };
        player.read_pixel_buffer_for(Some(self.generation), format, Box::new(callback));
    }

    /// Whether the owning player is still alive.
    pub fn is_attached(&self) -> bool {
        self.player.strong_count() > 0
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("orientation", &self.orientation)
            .field("generation", &self.generation)
            .field("lock_count", &self.lock_count())
            .finish()
    }
}

/// Shared handle passed to frame callbacks.
pub type SharedPixelBuffer = Arc<PixelBuffer>;
