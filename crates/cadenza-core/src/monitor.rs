//! Position monitor: turns a pull-only backend into push events.
//!
//! One monitor thread per playback run. Each tick it snapshots the session,
//! queries the backend without holding the session lock, then re-locks and
//! commits only if its generation is still current. A superseded monitor
//! therefore exits silently and can never touch a newer session.
//!
//! Cancellation is a dropped channel sender, observed at the next wake-up
//! (at most one poll interval). The loop acknowledges exit on a second
//! channel so `stop()` can wait for real completion with a bound.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::effects::AudioBackend;
use crate::engine::Session;
use crate::error::MonitorTimeout;
use crate::models::{PlaybackState, PlayerEvent};

/// Handle to a running monitor. Dropping it cancels without waiting.
pub(crate) struct PositionMonitor {
    cancel: Sender<()>,
    ack: Receiver<()>,
    thread: JoinHandle<()>,
}

impl PositionMonitor {
    pub(crate) fn spawn(
        generation: u64,
        session: Arc<Mutex<Session>>,
        backend: Arc<dyn AudioBackend>,
        events: Sender<PlayerEvent>,
        interval: Duration,
    ) -> Self {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);

        let monitor = MonitorLoop {
            generation,
            session,
            backend,
            events,
            interval,
            cancel: cancel_rx,
        };
        let thread = thread::spawn(move || {
            monitor.run();
            let _ = ack_tx.send(());
        });

        Self {
            cancel: cancel_tx,
            ack: ack_rx,
            thread,
        }
    }

    /// Request termination and wait up to `timeout` for acknowledgment.
    ///
    /// On timeout the thread is detached; its generation is already stale,
    /// so it will exit on its next tick without side effects.
    pub(crate) fn shutdown(self, timeout: Duration) -> Result<(), MonitorTimeout> {
        let PositionMonitor { cancel, ack, thread } = self;
        drop(cancel);
        match ack.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(MonitorTimeout(timeout)),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct MonitorLoop {
    generation: u64,
    session: Arc<Mutex<Session>>,
    backend: Arc<dyn AudioBackend>,
    events: Sender<PlayerEvent>,
    interval: Duration,
    cancel: Receiver<()>,
}

impl MonitorLoop {
    fn run(&self) {
        log::debug!("cadenza: monitor {} started", self.generation);
        loop {
            match self.cancel.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if self.tick() == Flow::Exit {
                break;
            }
        }
        log::debug!("cadenza: monitor {} exited", self.generation);
    }

    fn tick(&self) -> Flow {
        let (state, duration_ms) = {
            let s = self.session.lock();
            if s.generation != self.generation {
                return Flow::Exit;
            }
            (s.state, s.duration_ms)
        };
        match state {
            PlaybackState::Paused => return Flow::Continue,
            PlaybackState::Stopped => return Flow::Exit,
            PlaybackState::Playing => {}
        }

        // Backend queries may block; keep the session lock free meanwhile.
        let busy = self.backend.is_busy();
        let position_ms = self.backend.position_ms().min(duration_ms);

        let mut s = self.session.lock();
        if s.generation != self.generation {
            return Flow::Exit;
        }
        if s.state != PlaybackState::Playing {
            return Flow::Continue;
        }

        // Taken only once this run is known to be current and playing, so a
        // pause or stop in the window above leaves the error latched.
        if let Some(e) = self.backend.take_error() {
            log::error!("cadenza: playback of {:?} failed: {}", s.track, e);
            let _ = self.events.send(PlayerEvent::Error {
                message: e.to_string(),
            });
            self.backend.halt();
            s.position_ms = 0;
            s.transition(PlaybackState::Stopped, &self.events);
            return Flow::Exit;
        }

        // Re-check under the lock: a pause/resume between the two reads can
        // make the first answer stale.
        if !busy && !self.backend.is_busy() {
            log::info!("cadenza: finished {:?}", s.track);
            let _ = self.events.send(PlayerEvent::TrackFinished {
                generation: self.generation,
            });
            self.backend.halt();
            s.position_ms = 0;
            s.transition(PlaybackState::Stopped, &self.events);
            return Flow::Exit;
        }

        s.position_ms = position_ms;
        let _ = self.events.send(PlayerEvent::PositionChanged { position_ms });
        Flow::Continue
    }
}
