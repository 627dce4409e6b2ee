use crate::error::BackendError;
use crate::models::TrackRef;

/// Trait for audio output backends.
///
/// Pull-only by contract: a backend exposes busy-state and position but
/// never pushes progress or completion. The engine's position monitor
/// turns these queries into events.
///
/// All methods take `&self`: backends manage their own concurrency.
/// `start` positions in whole seconds; sub-second seek offsets are an
/// accepted approximation at this boundary.
pub trait AudioBackend: Send + Sync {
    /// Open `track` for playback, replacing anything open before, and
    /// return its duration in milliseconds. On error nothing is left open.
    fn open(&self, track: &TrackRef) -> Result<u64, BackendError>;
    /// Begin (or restart) output of the opened track at `from_secs`.
    fn start(&self, from_secs: u64) -> Result<(), BackendError>;
    fn pause(&self);
    fn resume(&self);
    /// Halt output. The track stays open and can be started again.
    fn halt(&self);
    fn set_volume(&self, volume: f32);
    /// True while audio is being produced. False once the stream ended,
    /// after `halt`, and (like most mixers) while paused.
    fn is_busy(&self) -> bool;
    /// Live position within the track.
    fn position_ms(&self) -> u64;
    /// Take the latched runtime error, if one occurred since the last call.
    fn take_error(&self) -> Option<BackendError>;
}

pub mod catalog;
pub mod metadata;
#[cfg(feature = "native")]
pub mod audio;
pub mod probe;
pub mod simulated;

#[cfg(feature = "native")]
pub use audio::NativeBackend;
pub use simulated::SimulatedBackend;
