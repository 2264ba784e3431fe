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
use std::{collections::HashMap, collections::HashSet, fmt, sync::Arc, thread, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

use super::{EndedCallback, MediaError};

/// The duration given to URIs the backend wasn't told about.
const DEFAULT_DURATION: f64 = 180.0;

#[derive(Default)]
struct Behavior {
    durations: HashMap<String, f64>,
    failed_loads: HashSet<String>,
    failed_plays: HashSet<String>,
    play_delays: HashMap<String, Duration>,
}

/// A mock backend. Hands out mock media and keeps them around so tests can drive them.
pub struct Backend {
    name: String,
    behavior: Mutex<Behavior>,
    loaded: Mutex<HashMap<String, Arc<Media>>>,
}

impl Backend {
    /// Gets the given mock backend.
    pub fn get(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            behavior: Mutex::new(Behavior::default()),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Media loaded from this URI will have the given duration.
    pub fn with_duration(&self, uri: &str, duration: f64) -> &Backend {
        self.behavior
            .lock()
            .durations
            .insert(uri.to_string(), duration);
        self
    }

    /// Loading this URI will fail.
    pub fn with_failed_load(&self, uri: &str) -> &Backend {
        self.behavior.lock().failed_loads.insert(uri.to_string());
        self
    }

    /// Media loaded from this URI will reject every play request.
    pub fn with_failed_play(&self, uri: &str) -> &Backend {
        self.behavior.lock().failed_plays.insert(uri.to_string());
        self
    }

    /// Media loaded from this URI will block for the given time on each play request.
    pub fn with_play_delay(&self, uri: &str, delay: Duration) -> &Backend {
        self.behavior
            .lock()
            .play_delays
            .insert(uri.to_string(), delay);
        self
    }

    /// Gets the most recent media loaded from the given URI.
    pub fn media(&self, uri: &str) -> Option<Arc<Media>> {
        self.loaded.lock().get(uri).cloned()
    }
}

impl super::Backend for Backend {
    fn load(&self, uri: &str) -> Result<Arc<dyn super::Media>, MediaError> {
        let behavior = self.behavior.lock();
        if behavior.failed_loads.contains(uri) {
            return Err(MediaError::NotFound(uri.to_string()));
        }

        let media = Arc::new(Media::new(
            uri,
            behavior
                .durations
                .get(uri)
                .copied()
                .unwrap_or(DEFAULT_DURATION),
            behavior.failed_plays.contains(uri),
            behavior
                .play_delays
                .get(uri)
                .copied()
                .unwrap_or(Duration::ZERO),
        ));
        self.loaded.lock().insert(uri.to_string(), media.clone());

        info!(backend = self.name, uri, duration = media.duration, "Loaded mock media.");
        Ok(media)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

struct State {
    position: f64,
    playing: bool,
    volume: f64,
    rate: f64,
    released: bool,
    play_calls: usize,
    seeks: Vec<f64>,
    ended: Option<EndedCallback>,
}

/// A mock media. Doesn't actually play anything and its position only moves when a test
/// moves it.
pub struct Media {
    uri: String,
    duration: f64,
    fail_play: bool,
    play_delay: Duration,
    state: Mutex<State>,
}

impl Media {
    fn new(uri: &str, duration: f64, fail_play: bool, play_delay: Duration) -> Media {
        Media {
            uri: uri.to_string(),
            duration,
            fail_play,
            play_delay,
            state: Mutex::new(State {
                position: 0.0,
                playing: false,
                volume: 1.0,
                rate: 1.0,
                released: false,
                play_calls: 0,
                seeks: Vec::new(),
                ended: None,
            }),
        }
    }

    /// Moves the playhead as if playback had progressed.
    pub fn set_position(&self, position: f64) {
        self.state.lock().position = position.clamp(0.0, self.duration);
    }

    /// Plays through to the end of the media, stopping it and firing the ended callback.
    pub fn finish(&self) {
        let ended = {
            let mut state = self.state.lock();
            state.position = self.duration;
            state.playing = false;
            state.ended.clone()
        };
        if let Some(ended) = ended {
            ended();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    pub fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    /// Every position this media has been asked to seek to.
    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }
}

impl super::Media for Media {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn play(&self) -> Result<(), MediaError> {
        let span = span!(Level::INFO, "play media (mock)");
        let _enter = span.enter();

        if self.state.lock().released {
            return Err(MediaError::Released);
        }
        if !self.play_delay.is_zero() {
            thread::sleep(self.play_delay);
        }

        let mut state = self.state.lock();
        state.play_calls += 1;
        if state.released {
            return Err(MediaError::Released);
        }
        if self.fail_play {
            return Err(MediaError::Rejected(format!("{} refused to play", self.uri)));
        }
        state.playing = true;
        debug!(uri = self.uri, position = state.position, "Playing.");
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().playing = false;
    }

    fn seek(&self, time: f64) {
        let mut state = self.state.lock();
        state.position = time.clamp(0.0, self.duration);
        state.seeks.push(time);
    }

    fn set_volume(&self, gain: f64) {
        self.state.lock().volume = gain;
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
    }

    fn current_time(&self) -> f64 {
        self.state.lock().position
    }

    fn on_ended(&self, callback: EndedCallback) {
        self.state.lock().ended = Some(callback);
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        state.playing = false;
        state.ended = None;
    }
}

impl fmt::Display for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.uri)
    }
}
