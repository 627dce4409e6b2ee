//! Simulated audio backend: no decoding, no device.
//!
//! Tracks are registered with a duration up front; anything else fails to
//! open, which exercises the engine's load-failure path. Time either follows
//! the wall clock or is advanced by hand, so tests can drive a track to its
//! end deterministically.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::Mutex;

use super::AudioBackend;
use crate::error::BackendError;
use crate::models::TrackRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clock {
    Realtime,
    Manual,
}

pub struct SimulatedBackend {
    clock: Clock,
    state: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    library: HashMap<PathBuf, u64>,
    /// Duration of the opened track.
    opened: Option<u64>,
    running: bool,
    paused: bool,
    /// Position at the start of the current run segment.
    base_ms: u64,
    segment_start: Option<Instant>,
    manual_elapsed_ms: u64,
    volume: f32,
    pending_error: Option<String>,
    start_failure: Option<String>,
    starts: usize,
}

impl SimState {
    fn elapsed_ms(&self, clock: Clock) -> u64 {
        if !self.running || self.paused {
            return 0;
        }
        match clock {
            Clock::Realtime => self
                .segment_start
                .map(|t| t.elapsed().as_millis() as u64)
                .unwrap_or(0),
            Clock::Manual => self.manual_elapsed_ms,
        }
    }

    fn position_ms(&self, clock: Clock) -> u64 {
        let duration = self.opened.unwrap_or(0);
        (self.base_ms + self.elapsed_ms(clock)).min(duration)
    }

    fn begin_segment(&mut self) {
        self.segment_start = Some(Instant::now());
        self.manual_elapsed_ms = 0;
    }
}

impl SimulatedBackend {
    /// Backend whose clock follows wall time.
    pub fn new() -> Self {
        Self::with_clock(Clock::Realtime)
    }

    /// Backend whose clock only moves through [`advance`](Self::advance).
    pub fn manual() -> Self {
        Self::with_clock(Clock::Manual)
    }

    fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            state: Mutex::new(SimState {
                volume: 1.0,
                ..SimState::default()
            }),
        }
    }

    /// Register a playable track.
    pub fn add_track(&self, path: impl Into<PathBuf>, duration_ms: u64) {
        self.state.lock().library.insert(path.into(), duration_ms);
    }

    pub fn with_track(self, path: impl Into<PathBuf>, duration_ms: u64) -> Self {
        self.add_track(path, duration_ms);
        self
    }

    /// Move the manual clock forward. Ignored while halted or paused.
    pub fn advance(&self, ms: u64) {
        let mut s = self.state.lock();
        if s.running && !s.paused {
            s.manual_elapsed_ms += ms;
        }
    }

    /// Latch a runtime failure, as a device disappearing mid-playback would.
    /// Cleared by the next `start`.
    pub fn inject_error(&self, message: impl Into<String>) {
        self.state.lock().pending_error = Some(message.into());
    }

    /// Make the next `start` fail with a device error.
    pub fn fail_next_start(&self, message: impl Into<String>) {
        self.state.lock().start_failure = Some(message.into());
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Number of successful `start` calls so far.
    pub fn start_count(&self) -> usize {
        self.state.lock().starts
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for SimulatedBackend {
    fn open(&self, track: &TrackRef) -> Result<u64, BackendError> {
        let mut s = self.state.lock();
        s.running = false;
        s.paused = false;
        s.base_ms = 0;
        s.opened = s.library.get(track.path()).copied();
        match s.opened {
            Some(duration) => Ok(duration),
            None if !track.path().exists() => Err(BackendError::NotFound(track.path().to_path_buf())),
            None => Err(BackendError::Decode(format!("unrecognised stream: {}", track))),
        }
    }

    fn start(&self, from_secs: u64) -> Result<(), BackendError> {
        let mut s = self.state.lock();
        let duration = s.opened.ok_or(BackendError::NotOpened)?;
        if let Some(message) = s.start_failure.take() {
            s.running = false;
            return Err(BackendError::Device(message));
        }
        s.running = true;
        s.paused = false;
        s.pending_error = None;
        s.base_ms = from_secs.saturating_mul(1000).min(duration);
        s.begin_segment();
        s.starts += 1;
        Ok(())
    }

    fn pause(&self) {
        let mut s = self.state.lock();
        if s.running && !s.paused {
            s.base_ms = s.position_ms(self.clock);
            s.paused = true;
        }
    }

    fn resume(&self) {
        let mut s = self.state.lock();
        if s.running && s.paused {
            s.paused = false;
            s.begin_segment();
        }
    }

    fn halt(&self) {
        let mut s = self.state.lock();
        s.running = false;
        s.paused = false;
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume;
    }

    fn is_busy(&self) -> bool {
        let s = self.state.lock();
        s.running && !s.paused && s.position_ms(self.clock) < s.opened.unwrap_or(0)
    }

    fn position_ms(&self) -> u64 {
        self.state.lock().position_ms(self.clock)
    }

    fn take_error(&self) -> Option<BackendError> {
        self.state.lock().pending_error.take().map(BackendError::Device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_track_fails_to_open() {
        let backend = SimulatedBackend::manual();
        let err = backend.open(&TrackRef::from("/definitely/missing.mp3")).unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
        assert!(matches!(backend.start(0), Err(BackendError::NotOpened)));
    }

    #[test]
    fn manual_clock_reaches_end() {
        let backend = SimulatedBackend::manual().with_track("/a.mp3", 3_000);
        assert_eq!(backend.open(&TrackRef::from("/a.mp3")).unwrap(), 3_000);
        backend.start(1).unwrap();
        assert_eq!(backend.position_ms(), 1_000);
        assert!(backend.is_busy());

        backend.advance(5_000);
        assert_eq!(backend.position_ms(), 3_000);
        assert!(!backend.is_busy());
    }

    #[test]
    fn pause_freezes_position() {
        let backend = SimulatedBackend::manual().with_track("/a.mp3", 10_000);
        backend.open(&TrackRef::from("/a.mp3")).unwrap();
        backend.start(0).unwrap();
        backend.advance(2_500);
        backend.pause();
        backend.advance(4_000);
        assert_eq!(backend.position_ms(), 2_500);
        assert!(!backend.is_busy());

        backend.resume();
        backend.advance(500);
        assert_eq!(backend.position_ms(), 3_000);
    }

    #[test]
    fn injected_error_is_taken_once() {
        let backend = SimulatedBackend::manual();
        backend.inject_error("unplugged");
        assert!(matches!(backend.take_error(), Some(BackendError::Device(_))));
        assert!(backend.take_error().is_none());
    }
}
