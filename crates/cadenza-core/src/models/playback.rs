//! Playback state, notifications and the command surface.
//!
//! PlaybackCommand is a tagged enum so a UI can drive the controller with
//! plain JSON (`{"action": "seek", "position_ms": 5000}`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TrackRef;

/// Engine transport state. Stopped whenever no track is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Read snapshot of the engine, taken under its lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub track: Option<TrackRef>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub volume: f32,
}

/// Notifications delivered to the caller, in the order they were generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    TrackLoaded { track: TrackRef, duration_ms: u64 },
    StateChanged { state: PlaybackState },
    PositionChanged { position_ms: u64 },
    /// Natural end of track. `generation` identifies the playback run.
    TrackFinished { generation: u64 },
    Error { message: String },
    PlaylistEnded,
}

/// Command accepted by [`PlaylistController::execute`](crate::PlaylistController::execute).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PlaybackCommand {
    Load { path: TrackRef },
    Play,
    Pause,
    Stop,
    Seek { position_ms: i64 },
    Volume { volume: f32 },
    Playlist {
        tracks: Vec<TrackRef>,
        #[serde(default)]
        start_index: usize,
    },
    Next,
    Previous,
    Shuffle,
    Repeat,
    Loop,
}

impl PlaybackCommand {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(v: &Value) -> Option<Self> {
        serde_json::from_value(v.clone()).ok()
    }
}
