//! Playlist controller: sequencing over an owned [`Playlist`].
//!
//! Navigation commands load and play through the engine. Auto-advance is
//! driven by the caller draining events: [`poll_events`] and
//! [`wait_events`] react to `TrackFinished` before handing every event on.
//!
//! [`poll_events`]: PlaylistController::poll_events
//! [`wait_events`]: PlaylistController::wait_events

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::engine::PlaybackEngine;
use crate::error::PlayerError;
use crate::models::{PlaybackCommand, PlaybackSnapshot, PlayerEvent, TrackRef};
use crate::playlist::{Advance, Playlist};

pub struct PlaylistController {
    engine: Arc<PlaybackEngine>,
    playlist: Playlist,
    events: Receiver<PlayerEvent>,
}

impl PlaylistController {
    pub fn new(engine: Arc<PlaybackEngine>, playlist: Playlist) -> Self {
        let events = engine.events();
        Self {
            engine,
            playlist,
            events,
        }
    }

    pub fn engine(&self) -> &Arc<PlaybackEngine> {
        &self.engine
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.engine.snapshot()
    }

    // -----------------------------------------------------------------------
    // Playlist
    // -----------------------------------------------------------------------

    /// Replace the playlist and start playing `start_index`.
    ///
    /// An out-of-range start selects the first track without playing. In
    /// both that case and an empty list, current playback stops.
    pub fn set_playlist(&mut self, tracks: Vec<TrackRef>, start_index: usize) -> Result<(), PlayerError> {
        let len = tracks.len();
        if self.playlist.replace(tracks, start_index) {
            log::info!("cadenza: playlist of {} tracks, starting at {}", len, start_index);
            return self.play_current();
        }
        self.engine.stop();
        if len > 0 {
            log::warn!(
                "cadenza: start index {} out of range for {} tracks, selecting first",
                start_index,
                len
            );
        }
        Ok(())
    }

    /// Replace the playlist and start playing a track picked at random.
    ///
    /// With shuffle on, the shuffle order is anchored on that pick.
    pub fn set_playlist_random(&mut self, tracks: Vec<TrackRef>) -> Result<(), PlayerError> {
        let start = self.playlist.random_index(tracks.len()).unwrap_or(0);
        self.set_playlist(tracks, start)
    }

    /// Jump to `index` and play it.
    pub fn play_index(&mut self, index: usize) -> Result<(), PlayerError> {
        if !self.playlist.select(index) {
            return Err(PlayerError::IndexOutOfRange {
                index,
                len: self.playlist.len(),
            });
        }
        self.play_current()
    }

    pub fn next(&mut self) -> Result<(), PlayerError> {
        self.playlist.step_forward().ok_or(PlayerError::EmptyPlaylist)?;
        self.play_current()
    }

    pub fn previous(&mut self) -> Result<(), PlayerError> {
        self.playlist.step_back().ok_or(PlayerError::EmptyPlaylist)?;
        self.play_current()
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        let on = self.playlist.toggle_shuffle();
        log::debug!("cadenza: shuffle {}", on);
        on
    }

    pub fn toggle_repeat(&mut self) -> bool {
        let on = self.playlist.toggle_repeat();
        log::debug!("cadenza: repeat {}", on);
        on
    }

    pub fn toggle_loop(&mut self) -> bool {
        let on = self.playlist.toggle_loop();
        log::debug!("cadenza: loop {}", on);
        on
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// Play or resume. With nothing loaded, starts the current playlist track.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        if self.engine.track().is_none() && self.playlist.current().is_some() {
            return self.play_current();
        }
        self.engine.play()
    }

    pub fn pause(&self) {
        self.engine.pause();
    }

    pub fn stop(&self) {
        self.engine.stop();
    }

    pub fn seek(&self, position_ms: i64) -> Result<(), PlayerError> {
        self.engine.seek(position_ms)
    }

    pub fn set_volume(&self, volume: f32) {
        self.engine.set_volume(volume);
    }

    /// Load a single track outside the playlist, without playing it.
    pub fn load_track(&self, path: impl Into<TrackRef>) -> bool {
        self.engine.load_track(path)
    }

    /// Dispatch one command.
    pub fn execute(&mut self, command: PlaybackCommand) -> Result<(), PlayerError> {
        match command {
            PlaybackCommand::Load { path } => {
                self.engine.load(path)?;
            }
            PlaybackCommand::Play => self.play()?,
            PlaybackCommand::Pause => self.pause(),
            PlaybackCommand::Stop => self.stop(),
            PlaybackCommand::Seek { position_ms } => self.seek(position_ms)?,
            PlaybackCommand::Volume { volume } => self.set_volume(volume),
            PlaybackCommand::Playlist { tracks, start_index } => {
                self.set_playlist(tracks, start_index)?
            }
            PlaybackCommand::Next => self.next()?,
            PlaybackCommand::Previous => self.previous()?,
            PlaybackCommand::Shuffle => {
                self.toggle_shuffle();
            }
            PlaybackCommand::Repeat => {
                self.toggle_repeat();
            }
            PlaybackCommand::Loop => {
                self.toggle_loop();
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Drain pending events without blocking, auto-advancing on finish.
    pub fn poll_events(&mut self) -> Vec<PlayerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            self.observe(&event);
            out.push(event);
        }
        out
    }

    /// Block up to `timeout` for the next event, then drain the rest.
    pub fn wait_events(&mut self, timeout: Duration) -> Vec<PlayerEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.observe(&event);
                let mut out = vec![event];
                out.extend(self.poll_events());
                out
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Vec::new(),
        }
    }

    fn observe(&mut self, event: &PlayerEvent) {
        if let PlayerEvent::TrackFinished { generation } = *event {
            if generation == self.engine.generation() {
                self.on_track_finished();
            } else {
                log::debug!("cadenza: ignoring finish of superseded run {}", generation);
            }
        }
    }

    fn on_track_finished(&mut self) {
        let mut step = self.playlist.advance_after_finish();
        // Each track gets one chance; unplayable ones are reported and skipped.
        for _ in 0..self.playlist.len() {
            let result = match step {
                Advance::Replay => self.engine.play(),
                Advance::Play(_) => self.play_current(),
                Advance::End => break,
            };
            match result {
                Ok(()) => return,
                Err(e) => {
                    log::warn!("cadenza: skipping unplayable track: {}", e);
                    self.engine.emit(PlayerEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
            if step == Advance::Replay {
                break;
            }
            step = self.playlist.advance_after_finish();
        }
        self.engine.stop();
        log::info!("cadenza: playlist ended");
        self.engine.emit(PlayerEvent::PlaylistEnded);
    }

    fn play_current(&mut self) -> Result<(), PlayerError> {
        let track = self.playlist.current().cloned().ok_or(PlayerError::EmptyPlaylist)?;
        self.engine.load(track)?;
        self.engine.play()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::effects::SimulatedBackend;
    use crate::models::PlaybackState;

    fn controller() -> (Arc<SimulatedBackend>, PlaylistController) {
        let backend = Arc::new(
            SimulatedBackend::manual()
                .with_track("/a.mp3", 10_000)
                .with_track("/b.mp3", 20_000)
                .with_track("/c.mp3", 30_000),
        );
        let config = EngineConfig {
            poll_interval_ms: 5,
            ..EngineConfig::default()
        };
        let engine = Arc::new(PlaybackEngine::with_backend(backend.clone(), config));
        (backend, PlaylistController::new(engine, Playlist::with_seed(11)))
    }

    fn abc() -> Vec<TrackRef> {
        vec!["/a.mp3".into(), "/b.mp3".into(), "/c.mp3".into()]
    }

    #[test]
    fn set_playlist_plays_start_index() {
        let (_backend, mut ctl) = controller();
        ctl.set_playlist(abc(), 1).unwrap();
        assert_eq!(ctl.playlist().current_index(), Some(1));
        assert_eq!(ctl.engine().track(), Some("/b.mp3".into()));
        assert_eq!(ctl.engine().state(), PlaybackState::Playing);
        ctl.stop();
    }

    #[test]
    fn random_start_plays_the_chosen_track() {
        let (_backend, mut ctl) = controller();
        ctl.toggle_shuffle();
        ctl.set_playlist_random(abc()).unwrap();

        let current = ctl.playlist().current_index().unwrap();
        assert_eq!(ctl.engine().track(), Some(abc()[current].clone()));
        assert_eq!(ctl.playlist().shuffle_order()[0], current);
        assert_eq!(ctl.engine().state(), PlaybackState::Playing);
        ctl.stop();

        ctl.set_playlist_random(Vec::new()).unwrap();
        assert_eq!(ctl.playlist().current_index(), None);
        assert_eq!(ctl.engine().state(), PlaybackState::Stopped);
    }

    #[test]
    fn out_of_range_start_selects_first_without_playing() {
        let (_backend, mut ctl) = controller();
        ctl.set_playlist(abc(), 9).unwrap();
        assert_eq!(ctl.playlist().current_index(), Some(0));
        assert_eq!(ctl.engine().state(), PlaybackState::Stopped);

        // Play picks up the selected track.
        ctl.play().unwrap();
        assert_eq!(ctl.engine().track(), Some("/a.mp3".into()));
        ctl.stop();
    }

    #[test]
    fn navigation_on_empty_playlist_errors() {
        let (_backend, mut ctl) = controller();
        assert!(matches!(ctl.next(), Err(PlayerError::EmptyPlaylist)));
        assert!(matches!(ctl.previous(), Err(PlayerError::EmptyPlaylist)));
        assert!(matches!(
            ctl.play_index(0),
            Err(PlayerError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn previous_wraps_to_last() {
        let (_backend, mut ctl) = controller();
        ctl.set_playlist(abc(), 0).unwrap();
        ctl.previous().unwrap();
        assert_eq!(ctl.playlist().current_index(), Some(2));
        assert_eq!(ctl.engine().track(), Some("/c.mp3".into()));
        ctl.stop();
    }

    #[test]
    fn toggles_do_not_touch_playback() {
        let (backend, mut ctl) = controller();
        ctl.set_playlist(abc(), 0).unwrap();
        let starts = backend.start_count();
        assert!(ctl.toggle_shuffle());
        assert!(ctl.toggle_repeat());
        assert!(ctl.toggle_loop());
        assert_eq!(backend.start_count(), starts);
        assert_eq!(ctl.engine().track(), Some("/a.mp3".into()));
        assert_eq!(ctl.engine().state(), PlaybackState::Playing);
        ctl.stop();
    }

    #[test]
    fn failed_navigation_reports_load_error() {
        let (_backend, mut ctl) = controller();
        ctl.set_playlist(vec!["/a.mp3".into(), "/gone.mp3".into()], 0).unwrap();
        let err = ctl.next().unwrap_err();
        assert!(matches!(err, PlayerError::Load(_)));
        assert_eq!(ctl.engine().state(), PlaybackState::Stopped);
        assert_eq!(ctl.engine().track(), None);
    }

    #[test]
    fn execute_dispatches_json_commands() {
        let (_backend, mut ctl) = controller();
        let cmd = PlaybackCommand::from_value(&serde_json::json!({
            "action": "playlist",
            "tracks": ["/a.mp3", "/b.mp3"],
            "start_index": 1
        }))
        .unwrap();
        ctl.execute(cmd).unwrap();
        assert_eq!(ctl.engine().track(), Some("/b.mp3".into()));

        ctl.execute(PlaybackCommand::Volume { volume: 0.25 }).unwrap();
        assert_eq!(ctl.engine().volume(), 0.25);

        ctl.execute(PlaybackCommand::Pause).unwrap();
        assert_eq!(ctl.engine().state(), PlaybackState::Paused);

        ctl.execute(PlaybackCommand::Stop).unwrap();
        assert_eq!(ctl.engine().state(), PlaybackState::Stopped);

        let err = ctl
            .execute(PlaybackCommand::Load {
                path: "/nope.mp3".into(),
            })
            .unwrap_err();
        assert!(matches!(err, PlayerError::Load(_)));
    }

    #[test]
    fn poll_events_forwards_engine_events() {
        let (_backend, mut ctl) = controller();
        ctl.set_playlist(abc(), 0).unwrap();
        ctl.stop();
        let events = ctl.poll_events();
        assert!(events.contains(&PlayerEvent::TrackLoaded {
            track: "/a.mp3".into(),
            duration_ms: 10_000,
        }));
        assert!(events.contains(&PlayerEvent::StateChanged {
            state: PlaybackState::Playing
        }));
        assert_eq!(
            events.last(),
            Some(&PlayerEvent::StateChanged {
                state: PlaybackState::Stopped
            })
        );
    }
}
