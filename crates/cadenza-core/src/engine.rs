//! Playback engine: one loaded track, one transport state machine.
//!
//! ```text
//! Stopped --load(ok)--> Stopped(ready) --play--> Playing --pause--> Paused
//!    ^                                             |  ^               |
//!    |                                             |  +-----play------+
//!    +------------- stop / natural finish ---------+
//! ```
//!
//! All session fields sit behind one mutex; the position monitor reads and
//! writes them under the same lock. Every `play` from Stopped and every
//! `stop` bumps the session generation, which is what retires old monitors.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::effects::AudioBackend;
use crate::error::{LoadError, PlayerError};
use crate::models::{PlaybackSnapshot, PlaybackState, PlayerEvent, TrackRef};
use crate::monitor::PositionMonitor;

/// Mutable engine state, shared with the position monitor.
pub(crate) struct Session {
    pub(crate) state: PlaybackState,
    pub(crate) track: Option<TrackRef>,
    /// Last recorded position; authoritative unless Playing.
    pub(crate) position_ms: u64,
    pub(crate) duration_ms: u64,
    pub(crate) volume: f32,
    pub(crate) generation: u64,
    monitor: Option<PositionMonitor>,
}

impl Session {
    /// Change state, announcing it if it actually changed.
    pub(crate) fn transition(&mut self, to: PlaybackState, events: &Sender<PlayerEvent>) {
        if self.state != to {
            log::debug!("cadenza: {:?} -> {:?}", self.state, to);
            self.state = to;
            let _ = events.send(PlayerEvent::StateChanged { state: to });
        }
    }
}

/// The playback engine.
pub struct PlaybackEngine {
    backend: Arc<dyn AudioBackend>,
    session: Arc<Mutex<Session>>,
    events: Sender<PlayerEvent>,
    receiver: Receiver<PlayerEvent>,
    /// Held for the whole of `load`, including the backend open.
    loading: Mutex<()>,
    config: EngineConfig,
}

impl PlaybackEngine {
    /// Engine over the native (cpal) audio backend.
    #[cfg(feature = "native")]
    pub fn native(config: EngineConfig) -> Self {
        Self::with_backend(Arc::new(crate::effects::NativeBackend::new()), config)
    }

    /// Engine over a custom backend.
    ///
    /// Use `SimulatedBackend` for headless runs and tests.
    ///
    /// Out-of-range config fields are replaced, see [`EngineConfig::sanitized`].
    pub fn with_backend(backend: Arc<dyn AudioBackend>, config: EngineConfig) -> Self {
        let config = config.sanitized();
        let volume = config.initial_volume;
        backend.set_volume(volume);
        let (events, receiver) = crossbeam_channel::unbounded();
        Self {
            backend,
            session: Arc::new(Mutex::new(Session {
                state: PlaybackState::Stopped,
                track: None,
                position_ms: 0,
                duration_ms: 0,
                volume,
                generation: 0,
                monitor: None,
            })),
            events,
            receiver,
            loading: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The notification stream. All clones share one queue, so a single
    /// consumer should drain it.
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.receiver.clone()
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// Stop, discard the current track, open `track` and reset position.
    ///
    /// On failure the engine is left stopped with no track loaded. The
    /// backend open runs outside the session lock, so queries and `stop`
    /// stay responsive while a long stream is probed; loads themselves are
    /// serialized.
    pub fn load(&self, track: TrackRef) -> Result<(), LoadError> {
        let _loading = self.loading.lock();
        let stale = {
            let mut s = self.session.lock();
            let stale = self.stop_locked(&mut s);
            s.track = None;
            s.duration_ms = 0;
            s.position_ms = 0;
            stale
        };
        self.reap(stale);

        // No track is set, so play and seek are no-ops until the commit.
        let opened = self.backend.open(&track);

        let mut s = self.session.lock();
        match opened {
            Ok(duration_ms) => {
                log::info!("cadenza: loaded {} ({} ms)", track, duration_ms);
                s.track = Some(track.clone());
                s.duration_ms = duration_ms;
                s.position_ms = 0;
                let _ = self.events.send(PlayerEvent::TrackLoaded { track, duration_ms });
                Ok(())
            }
            Err(source) => {
                log::warn!("cadenza: failed to load {}: {}", track, source);
                Err(LoadError { track, source })
            }
        }
    }

    /// [`load`](Self::load) reporting success as a flag.
    pub fn load_track(&self, path: impl Into<TrackRef>) -> bool {
        self.load(path.into()).is_ok()
    }

    /// Start or resume playback.
    ///
    /// No-op without a track or when already playing. From Paused the
    /// backend resumes in place; from Stopped output starts at the recorded
    /// position (so seek-then-play works) and a fresh monitor is spawned.
    pub fn play(&self) -> Result<(), PlayerError> {
        let stale = {
            let mut s = self.session.lock();
            if s.track.is_none() {
                return Ok(());
            }
            match s.state {
                PlaybackState::Playing => return Ok(()),
                PlaybackState::Paused => {
                    self.backend.resume();
                    s.transition(PlaybackState::Playing, &self.events);
                    return Ok(());
                }
                PlaybackState::Stopped => s.monitor.take(),
            }
        };
        // A monitor left over from a natural finish has already exited.
        self.reap(stale);

        let mut s = self.session.lock();
        if s.track.is_none() || s.state != PlaybackState::Stopped {
            return Ok(());
        }
        if let Err(e) = self.backend.start(s.position_ms / 1000) {
            log::warn!("cadenza: cannot start playback: {}", e);
            return Err(e.into());
        }
        s.generation += 1;
        s.transition(PlaybackState::Playing, &self.events);
        s.monitor = Some(PositionMonitor::spawn(
            s.generation,
            Arc::clone(&self.session),
            Arc::clone(&self.backend),
            self.events.clone(),
            self.config.poll_interval(),
        ));
        Ok(())
    }

    /// Suspend output. Only meaningful while Playing; the monitor idles.
    pub fn pause(&self) {
        let mut s = self.session.lock();
        if s.state != PlaybackState::Playing {
            return;
        }
        let position_ms = self.backend.position_ms().min(s.duration_ms);
        self.backend.pause();
        s.position_ms = position_ms;
        s.transition(PlaybackState::Paused, &self.events);
    }

    /// Halt output, retire the monitor and rewind to 0. Idempotent.
    ///
    /// Blocks until the monitor acknowledges, or the configured timeout
    /// passes, whichever comes first.
    pub fn stop(&self) {
        let stale = {
            let mut s = self.session.lock();
            if s.state == PlaybackState::Stopped && s.monitor.is_none() {
                s.position_ms = 0;
                return;
            }
            self.stop_locked(&mut s)
        };
        self.reap(stale);
    }

    /// Move to `position_ms`, clamped to `[0, duration]`.
    ///
    /// Stops the current run, records the new position and restarts if the
    /// engine was playing. The backend starts on whole seconds, so the live
    /// position after a playing seek may trail the target by under a second.
    /// A paused engine is left Stopped at the new position.
    pub fn seek(&self, position_ms: i64) -> Result<(), PlayerError> {
        let (stale, resume) = {
            let mut s = self.session.lock();
            if s.track.is_none() {
                return Ok(());
            }
            let resume = s.state == PlaybackState::Playing;
            let stale = self.stop_locked(&mut s);
            s.position_ms = position_ms.clamp(0, s.duration_ms as i64) as u64;
            (stale, resume)
        };
        self.reap(stale);
        if resume {
            self.play()?;
        }
        Ok(())
    }

    /// Clamp to `[0.0, 1.0]` and apply immediately. NaN is ignored.
    pub fn set_volume(&self, volume: f32) {
        if volume.is_nan() {
            log::warn!("cadenza: ignoring NaN volume");
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        let mut s = self.session.lock();
        s.volume = volume;
        self.backend.set_volume(volume);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Live backend position while Playing, the recorded one otherwise.
    pub fn get_position(&self) -> u64 {
        let s = self.session.lock();
        self.position_locked(&s)
    }

    pub fn get_duration(&self) -> u64 {
        self.session.lock().duration_ms
    }

    pub fn state(&self) -> PlaybackState {
        self.session.lock().state
    }

    pub fn volume(&self) -> f32 {
        self.session.lock().volume
    }

    pub fn track(&self) -> Option<TrackRef> {
        self.session.lock().track.clone()
    }

    /// Current playback-run counter, as carried by `TrackFinished`.
    pub fn generation(&self) -> u64 {
        self.session.lock().generation
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let s = self.session.lock();
        PlaybackSnapshot {
            state: s.state,
            track: s.track.clone(),
            position_ms: self.position_locked(&s),
            duration_ms: s.duration_ms,
            volume: s.volume,
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Queue a notification behind everything the engine already emitted.
    pub(crate) fn emit(&self, event: PlayerEvent) {
        let _s = self.session.lock();
        let _ = self.events.send(event);
    }

    fn position_locked(&self, s: &Session) -> u64 {
        if s.state == PlaybackState::Playing {
            self.backend.position_ms().min(s.duration_ms)
        } else {
            s.position_ms
        }
    }

    /// State half of `stop`: invalidate the run and hand back the monitor,
    /// which the caller must reap after releasing the lock.
    fn stop_locked(&self, s: &mut Session) -> Option<PositionMonitor> {
        s.generation += 1;
        self.backend.halt();
        s.position_ms = 0;
        s.transition(PlaybackState::Stopped, &self.events);
        s.monitor.take()
    }

    fn reap(&self, monitor: Option<PositionMonitor>) {
        if let Some(monitor) = monitor {
            if let Err(e) = monitor.shutdown(self.config.stop_timeout()) {
                log::warn!("cadenza: {}, detaching", e);
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
