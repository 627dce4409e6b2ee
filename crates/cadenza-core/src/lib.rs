//! cadenza-core: personal audio playback engine.
//!
//! One engine, one monitor thread, one playlist. Commands are synchronous;
//! progress and completion arrive as events on a channel.
//!
//! # Architecture
//!
//! ```text
//! Layer 0: Effects    (audio backend, probe, catalog, tags)
//! Layer 1: Engine     (transport state machine + position monitor)
//! Layer 2: Controller (playlist sequencing, auto-advance)
//! Layer 3: Agents     (CLI, or any UI draining events)
//! ```

pub mod config;
pub mod controller;
pub mod effects;
pub mod engine;
pub mod error;
pub mod models;
mod monitor;
pub mod playlist;

pub use config::EngineConfig;
pub use controller::PlaylistController;
pub use engine::PlaybackEngine;
pub use error::{BackendError, ConfigError, LoadError, MonitorTimeout, PlayerError};
pub use models::*;
pub use playlist::Playlist;
