//! Cadenza data models.
//!
//! Tagged enums for dispatch and notifications, a path newtype for tracks.
//! Mutable playback state lives inside the engine, never here.

pub mod playback;
pub mod track;

pub use playback::{PlaybackCommand, PlaybackSnapshot, PlaybackState, PlayerEvent};
pub use track::TrackRef;
