//! Error taxonomy for the playback core.
//!
//! Foreground commands return these synchronously. Failures inside the
//! position monitor never surface as `Err`: they become a forced stop plus
//! a [`PlayerEvent::Error`](crate::PlayerEvent) notification.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::TrackRef;

/// Failures reported by an [`AudioBackend`](crate::effects::AudioBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported container/codec, or a corrupt stream.
    #[error("cannot decode: {0}")]
    Decode(String),

    /// Output device missing, busy or rejected the stream config.
    #[error("audio device error: {0}")]
    Device(String),

    #[error("no track opened")]
    NotOpened,
}

impl From<symphonia::core::errors::Error> for BackendError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        match e {
            symphonia::core::errors::Error::IoError(io) => BackendError::Io(io),
            other => BackendError::Decode(other.to_string()),
        }
    }
}

/// A track could not be loaded. The engine is left stopped with no track.
#[derive(Debug, Error)]
#[error("failed to load {track}: {source}")]
pub struct LoadError {
    pub track: TrackRef,
    #[source]
    pub source: BackendError,
}

/// The position monitor did not acknowledge termination in time.
///
/// Non-fatal: the engine is already stopped and the detached monitor can no
/// longer write to it.
#[derive(Debug, Error)]
#[error("position monitor did not acknowledge termination within {0:?}")]
pub struct MonitorTimeout(pub Duration);

/// Umbrella error for engine and controller commands.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("playlist is empty")]
    EmptyPlaylist,

    #[error("index {index} out of range for playlist of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Rejected configuration input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("initial_volume must be within 0.0..=1.0, got {0}")]
    Volume(f32),
}
