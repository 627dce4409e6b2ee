//! Playlist: ordered tracks, a current pointer and the navigation modes.
//!
//! Pure sequencing, no I/O. Navigation wraps modulo the length in both
//! directions. With shuffle on, navigation walks a random permutation of
//! the indices that starts at the track that was current when the
//! permutation was drawn; walking it N times lands back where it began.
//!
//! Auto-advance after a natural finish differs from `next` only at the end
//! of the order: it stops there unless the loop flag is set.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::models::TrackRef;

pub struct Playlist {
    tracks: Vec<TrackRef>,
    current: Option<usize>,
    shuffle: bool,
    repeat: bool,
    looping: bool,
    /// Permutation of indices, current first; empty unless shuffling.
    order: Vec<usize>,
    /// Position of `current` within `order`.
    cursor: usize,
    rng: StdRng,
}

/// What auto-advance should do after the current track finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Replay the current track (repeat).
    Replay,
    /// Play the track at this index.
    Play(usize),
    /// End of a non-looping playlist.
    End,
}

impl Playlist {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic shuffle order, for reproducible sessions and tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tracks: Vec::new(),
            current: None,
            shuffle: false,
            repeat: false,
            looping: false,
            order: Vec::new(),
            cursor: 0,
            rng,
        }
    }

    pub fn from_tracks(tracks: Vec<TrackRef>) -> Self {
        let mut playlist = Self::new();
        playlist.replace(tracks, 0);
        playlist
    }

    // -----------------------------------------------------------------------
    // Contents
    // -----------------------------------------------------------------------

    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&TrackRef> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    /// Replace all tracks. Selects `start_index` when it is in range and
    /// returns true; otherwise selects the first track (if any) and
    /// returns false.
    pub fn replace(&mut self, tracks: Vec<TrackRef>, start_index: usize) -> bool {
        self.tracks = tracks;
        let in_range = start_index < self.tracks.len();
        self.current = if in_range {
            Some(start_index)
        } else if self.tracks.is_empty() {
            None
        } else {
            Some(0)
        };
        self.reshuffle();
        in_range
    }

    /// Uniform index below `len` from this playlist's generator.
    pub fn random_index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.rng.gen_range(0..len))
    }

    /// Append a track. The first track added becomes current.
    pub fn push(&mut self, track: TrackRef) {
        self.tracks.push(track);
        if self.current.is_none() {
            self.current = Some(0);
        }
        self.reshuffle();
    }

    /// Remove the track at `index`. The current pointer keeps following
    /// the same track; if that track is the one removed, it moves to the
    /// track that slid into its place (or the new last one).
    pub fn remove(&mut self, index: usize) -> Option<TrackRef> {
        if index >= self.tracks.len() {
            return None;
        }
        let removed = self.tracks.remove(index);
        self.current = match self.current {
            _ if self.tracks.is_empty() => None,
            Some(c) if c > index => Some(c - 1),
            Some(c) => Some(c.min(self.tracks.len() - 1)),
            None => None,
        };
        self.reshuffle();
        Some(removed)
    }

    /// Point at `index` without changing modes.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.current = Some(index);
        if self.shuffle {
            match self.order.iter().position(|&i| i == index) {
                Some(pos) => self.cursor = pos,
                None => self.reshuffle(),
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Modes
    // -----------------------------------------------------------------------

    pub fn is_shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn is_repeat(&self) -> bool {
        self.repeat
    }

    pub fn is_loop(&self) -> bool {
        self.looping
    }

    /// Flip shuffle. Switching on draws a new permutation anchored at the
    /// current track; the current track itself never changes.
    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        self.reshuffle();
        self.shuffle
    }

    pub fn toggle_repeat(&mut self) -> bool {
        self.repeat = !self.repeat;
        self.repeat
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.looping = !self.looping;
        self.looping
    }

    /// The current shuffle permutation (empty when not shuffling).
    pub fn shuffle_order(&self) -> &[usize] {
        &self.order
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Step forward, wrapping at the end. Returns the new current index.
    pub fn step_forward(&mut self) -> Option<usize> {
        self.step(1)
    }

    /// Step back, wrapping at the start. Returns the new current index.
    pub fn step_back(&mut self) -> Option<usize> {
        let len = self.tracks.len();
        self.step(len.saturating_sub(1))
    }

    /// Decide and apply what follows a natural finish.
    pub fn advance_after_finish(&mut self) -> Advance {
        let Some(current) = self.current else {
            return Advance::End;
        };
        if self.repeat {
            return Advance::Replay;
        }
        let at_end = if self.shuffle {
            self.cursor + 1 >= self.order.len()
        } else {
            current + 1 >= self.tracks.len()
        };
        if at_end && !self.looping {
            return Advance::End;
        }
        match self.step_forward() {
            Some(index) => Advance::Play(index),
            None => Advance::End,
        }
    }

    fn step(&mut self, by: usize) -> Option<usize> {
        let len = self.tracks.len();
        let current = self.current?;
        let next = if self.shuffle && self.order.len() == len {
            self.cursor = (self.cursor + by) % len;
            self.order[self.cursor]
        } else {
            (current + by) % len
        };
        self.current = Some(next);
        Some(next)
    }

    fn reshuffle(&mut self) {
        match (self.shuffle, self.current) {
            (true, Some(current)) => {
                self.order = shuffle_order(self.tracks.len(), current, &mut self.rng);
                self.cursor = 0;
            }
            _ => {
                self.order.clear();
                self.cursor = 0;
            }
        }
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}

/// Random permutation of `0..len` with `first` at position 0.
pub fn shuffle_order(len: usize, first: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut rest: Vec<usize> = (0..len).filter(|&i| i != first).collect();
    rest.shuffle(rng);

    let mut order = Vec::with_capacity(len);
    if first < len {
        order.push(first);
    }
    order.extend(rest);
    order
}
