// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Media whose playhead follows the tokio clock. Used to audition a mix's transport and
//! region behavior without an output device.

use std::fmt;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{EndedCallback, MediaError};

struct State {
    /// The position at the last time the playhead was rebased.
    anchor_position: f64,
    /// When the playhead was rebased. Only set while playing.
    anchor_time: Option<Instant>,
    rate: f64,
    volume: f64,
    released: bool,
    ended: Option<EndedCallback>,
}

impl State {
    fn position(&self, duration: f64) -> f64 {
        match self.anchor_time {
            Some(anchor_time) => {
                let elapsed = anchor_time.elapsed().as_secs_f64();
                (self.anchor_position + elapsed * self.rate).min(duration)
            }
            None => self.anchor_position,
        }
    }

    /// Folds elapsed playback into the anchor position.
    fn rebase(&mut self, duration: f64) {
        self.anchor_position = self.position(duration);
        if self.anchor_time.is_some() {
            self.anchor_time = Some(Instant::now());
        }
    }
}

pub struct Media {
    uri: String,
    duration: f64,
    state: Mutex<State>,
}

impl Media {
    pub fn new(uri: &str, duration: f64) -> Media {
        Media {
            uri: uri.to_string(),
            duration,
            state: Mutex::new(State {
                anchor_position: 0.0,
                anchor_time: None,
                rate: 1.0,
                volume: 1.0,
                released: false,
                ended: None,
            }),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().anchor_time.is_some()
    }

    pub fn volume(&self) -> f64 {
        self.state.lock().volume
    }
}

impl super::Media for Media {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn play(&self) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(MediaError::Released);
        }
        if state.anchor_time.is_none() {
            state.anchor_time = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.rebase(self.duration);
        state.anchor_time = None;
    }

    fn seek(&self, time: f64) {
        let mut state = self.state.lock();
        state.rebase(self.duration);
        state.anchor_position = time.clamp(0.0, self.duration);
    }

    fn set_volume(&self, gain: f64) {
        self.state.lock().volume = gain;
    }

    fn set_playback_rate(&self, rate: f64) {
        let mut state = self.state.lock();
        state.rebase(self.duration);
        state.rate = rate;
    }

    fn current_time(&self) -> f64 {
        let (position, ended) = {
            let mut state = self.state.lock();
            let position = state.position(self.duration);
            if state.anchor_time.is_some() && position >= self.duration {
                // Reached the end: stop like a media element would.
                state.anchor_position = self.duration;
                state.anchor_time = None;
                (position, state.ended.clone())
            } else {
                (position, None)
            }
        };

        if let Some(ended) = ended {
            debug!(uri = self.uri, "Media ended.");
            ended();
        }
        position
    }

    fn on_ended(&self, callback: EndedCallback) {
        self.state.lock().ended = Some(callback);
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        state.anchor_time = None;
        state.ended = None;
    }
}

impl fmt::Display for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}s)", self.uri, self.duration)
    }
}
