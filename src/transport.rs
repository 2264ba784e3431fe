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

//! The master transport. Fans play/pause/stop out to every track and reports the aggregate
//! state of the mix.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, span, warn, Level};

use crate::error::{self, MixerError};
use crate::event::{Emitter, Event};
use crate::media::{Media, MediaError};
use crate::mixer::State;
use crate::tracks::{PlayState, Track, TrackId};
use crate::util::format_time;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TransportState {
    Idle,
    Playing,
    Paused,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            TransportState::Idle => "idle",
            TransportState::Playing => "playing",
            TransportState::Paused => "paused",
        };
        write!(f, "{}", state)
    }
}

/// The controls shared by every track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Master {
    pub volume: f64,
    pub playback_rate: f64,
    pub state: TransportState,
}

impl Master {
    pub fn new(volume: f64, playback_rate: f64) -> Master {
        Master {
            volume,
            playback_rate,
            state: TransportState::Idle,
        }
    }
}

impl Default for Master {
    fn default() -> Self {
        Master::new(1.0, 1.0)
    }
}

/// A track that couldn't be started. The track is paused and the rest of the mix carries on.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PlaybackError {
    #[error("{id} refused to play: {reason}")]
    Rejected { id: TrackId, reason: String },

    #[error("{id} didn't start within {timeout:?}")]
    TimedOut { id: TrackId, timeout: Duration },

    #[error("Starting {id} was aborted: {reason}")]
    Aborted { id: TrackId, reason: String },
}

impl PlaybackError {
    pub fn id(&self) -> &TrackId {
        match self {
            PlaybackError::Rejected { id, .. } => id,
            PlaybackError::TimedOut { id, .. } => id,
            PlaybackError::Aborted { id, .. } => id,
        }
    }
}

/// What happened when tracks were asked to start.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayReport {
    pub started: Vec<TrackId>,
    pub failed: Vec<PlaybackError>,
}

/// A snapshot of the transport.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Status {
    pub state: TransportState,
    pub master_volume: f64,
    pub master_playback_rate: f64,
    /// The furthest playhead among all tracks.
    pub position: f64,
    pub tracks: Vec<(TrackId, f64)>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} (volume {:.2}, rate {:.2}x)",
            self.state,
            format_time(self.position),
            self.master_volume,
            self.master_playback_rate
        )?;
        for (id, position) in self.tracks.iter() {
            write!(f, "\n  {}: {}", id, format_time(*position))?;
        }
        Ok(())
    }
}

pub struct Transport {
    state: Arc<Mutex<State>>,
    events: Emitter,
    /// Serializes transport commands. Never held by the scheduler.
    commands: tokio::sync::Mutex<()>,
    start_timeout: Duration,
    span: tracing::Span,
}

impl Transport {
    pub(crate) fn new(
        state: Arc<Mutex<State>>,
        events: Emitter,
        start_timeout: Duration,
    ) -> Transport {
        Transport {
            state,
            events,
            commands: tokio::sync::Mutex::new(()),
            start_timeout,
            span: span!(Level::INFO, "transport"),
        }
    }

    /// Starts every loaded or paused track from the start of its region. Starts are issued
    /// concurrently and the transport is playing once at least one of them succeeded.
    pub async fn play(&self) -> PlayReport {
        let _guard = self.commands.lock().await;
        let pending = {
            let _enter = self.span.enter();
            let mut state = self.state.lock();
            if state.master.state == TransportState::Playing {
                info!("Transport is already playing.");
                return PlayReport::default();
            }

            let master = state.master;
            let pending: Vec<_> = state
                .store
                .tracks_mut()
                .filter(|track| {
                    matches!(track.play_state(), PlayState::Loaded | PlayState::Paused)
                })
                .filter_map(|track| prepare(track, master.volume, master.playback_rate))
                .collect();
            pending
        };

        let report = self.start(pending).await;

        let _enter = self.span.enter();
        if !report.started.is_empty() {
            self.set_state(TransportState::Playing);
        }
        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "Play requested."
        );
        report
    }

    /// Pauses every playing track.
    pub async fn pause(&self) {
        let _guard = self.commands.lock().await;
        let _enter = self.span.enter();

        let paused = {
            let mut state = self.state.lock();
            let mut paused = 0;
            for track in state.store.tracks_mut().filter(|track| track.is_playing()) {
                if let Some(media) = track.media() {
                    media.pause();
                }
                track.set_play_state(PlayState::Paused);
                paused += 1;
            }
            paused
        };

        if self.current_state() == TransportState::Playing {
            self.set_state(TransportState::Paused);
        }
        info!(paused, "Paused.");
    }

    /// Pauses every track and moves each back to the start of its region.
    pub async fn stop(&self) {
        let _guard = self.commands.lock().await;
        let _enter = self.span.enter();

        {
            let mut state = self.state.lock();
            let volume = state.master.volume;
            for track in state.store.tracks_mut() {
                let Some(media) = track.media().cloned() else {
                    continue;
                };
                if track.is_playing() {
                    media.pause();
                    track.set_play_state(PlayState::Paused);
                }
                let start = track.region().start();
                media.seek(start);
                track.apply_gain(volume, start);
            }
        }

        self.set_state(TransportState::Idle);
        info!("Stopped.");
    }

    /// Starts a single track from the start of its region. The transport state is unchanged.
    pub async fn play_track(&self, id: &TrackId) -> Result<PlayReport, MixerError> {
        let _guard = self.commands.lock().await;
        let pending = {
            let mut state = self.state.lock();
            let master = state.master;
            let track = state.store.get_mut(id)?;
            if !matches!(track.play_state(), PlayState::Loaded | PlayState::Paused) {
                return Ok(PlayReport::default());
            }
            prepare(track, master.volume, master.playback_rate)
        };

        Ok(self.start(pending.into_iter().collect()).await)
    }

    /// Pauses a single track. The transport state is unchanged.
    pub async fn pause_track(&self, id: &TrackId) -> Result<(), MixerError> {
        let _guard = self.commands.lock().await;
        let mut state = self.state.lock();
        let track = state.store.get_mut(id)?;
        if track.is_playing() {
            if let Some(media) = track.media() {
                media.pause();
            }
            track.set_play_state(PlayState::Paused);
        }
        Ok(())
    }

    /// Moves every track's playhead by the given number of seconds, kept within its region.
    pub async fn skip(&self, delta: f64) {
        let _guard = self.commands.lock().await;
        let _enter = self.span.enter();

        let mut state = self.state.lock();
        let volume = state.master.volume;
        for track in state.store.tracks_mut() {
            let Some(media) = track.media().cloned() else {
                continue;
            };
            let region = track.region();
            let position = (media.current_time() + delta).clamp(region.start(), region.end());
            media.seek(position);
            track.apply_gain(volume, position);
        }
        info!(delta, "Skipped.");
    }

    pub fn set_master_volume(&self, volume: f64) -> Result<(), MixerError> {
        let volume = error::check_volume(volume)?;
        let mut state = self.state.lock();
        state.master.volume = volume;
        for track in state.store.tracks_mut() {
            track.refresh_gain(volume);
        }
        Ok(())
    }

    /// Sets the master rate. Each track plays at its own rate times this one.
    pub fn set_master_playback_rate(&self, rate: f64) -> Result<(), MixerError> {
        let rate = error::check_rate(rate)?;
        let mut state = self.state.lock();
        state.master.playback_rate = rate;
        for track in state.store.tracks() {
            track.apply_rate(rate);
        }
        Ok(())
    }

    pub fn status(&self) -> Status {
        let state = self.state.lock();
        let tracks: Vec<(TrackId, f64)> = state
            .store
            .list()
            .into_iter()
            .map(|track| (track.id().clone(), track.position()))
            .collect();
        let position = tracks
            .iter()
            .map(|(_, position)| *position)
            .fold(0.0, f64::max);

        Status {
            state: state.master.state,
            master_volume: state.master.volume,
            master_playback_rate: state.master.playback_rate,
            position,
            tracks,
        }
    }

    pub fn current_state(&self) -> TransportState {
        self.state.lock().master.state
    }

    fn set_state(&self, transport_state: TransportState) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.master.state != transport_state;
            state.master.state = transport_state;
            changed
        };
        if changed {
            self.events.emit(Event::TransportChanged(transport_state));
        }
    }

    /// Issues every start concurrently outside the state lock. Each outcome is recorded as soon
    /// as that start resolves, so a started track is under the scheduler while slower ones are
    /// still pending.
    async fn start(&self, pending: Vec<(TrackId, Arc<dyn Media>)>) -> PlayReport {
        let timeout = self.start_timeout;
        let starts = pending.into_iter().map(|(id, media)| async move {
            let mut handle = {
                let media = media.clone();
                tokio::task::spawn_blocking(move || media.play())
            };
            let outcome = match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(rejected(&id, e)),
                Ok(Err(e)) => Err(PlaybackError::Aborted {
                    id: id.clone(),
                    reason: e.to_string(),
                }),
                Err(_) => Err(PlaybackError::TimedOut {
                    id: id.clone(),
                    timeout,
                }),
            };
            self.record(id, media, handle, outcome)
        });

        let mut report = PlayReport::default();
        for result in join_all(starts).await.into_iter().flatten() {
            match result {
                Ok(id) => report.started.push(id),
                Err(e) => report.failed.push(e),
            }
        }
        report
    }

    /// Applies the outcome of one start to its track. Returns nothing if the track was removed
    /// while starting.
    fn record(
        &self,
        id: TrackId,
        media: Arc<dyn Media>,
        handle: JoinHandle<Result<(), MediaError>>,
        outcome: Result<(), PlaybackError>,
    ) -> Option<Result<TrackId, PlaybackError>> {
        let e = {
            let mut state = self.state.lock();
            // Removed while starting. Its media was already released.
            let track = state.store.get_mut(&id).ok()?;
            match outcome {
                Ok(()) => {
                    track.set_play_state(PlayState::Playing);
                    track.set_last_error(None);
                    return Some(Ok(id));
                }
                Err(e) => {
                    media.pause();
                    track.set_play_state(PlayState::Paused);
                    track.set_last_error(Some(e.clone()));
                    e
                }
            }
        };

        let _enter = self.span.enter();
        warn!(track = id.as_str(), err = e.to_string(), "Track failed to start.");
        self.events.emit(Event::PlaybackFailed {
            id: id.clone(),
            reason: e.to_string(),
        });
        if matches!(e, PlaybackError::TimedOut { .. }) {
            self.watch_late_start(id, media, handle);
        }
        Some(Err(e))
    }

    /// A start that timed out may still succeed later. Pause it if the track isn't meant to
    /// be playing by then.
    fn watch_late_start(
        &self,
        id: TrackId,
        media: Arc<dyn Media>,
        handle: JoinHandle<Result<(), MediaError>>,
    ) {
        let state = self.state.clone();
        tokio::spawn(async move {
            if let Ok(Ok(())) = handle.await {
                let playing = state
                    .lock()
                    .store
                    .get(&id)
                    .map(|track| track.is_playing())
                    .unwrap_or(false);
                if !playing {
                    info!(track = id.as_str(), "Late start, pausing.");
                    media.pause();
                }
            }
        });
    }
}

/// Positions a track at its region start with the current gain and rate. Returns the media to
/// start, if the track has any.
fn prepare(track: &mut Track, volume: f64, rate: f64) -> Option<(TrackId, Arc<dyn Media>)> {
    let media = track.media()?.clone();
    let start = track.region().start();
    media.seek(start);
    track.apply_rate(rate);
    track.apply_gain(volume, start);
    Some((track.id().clone(), media))
}

fn rejected(id: &TrackId, e: MediaError) -> PlaybackError {
    PlaybackError::Rejected {
        id: id.clone(),
        reason: e.to_string(),
    }
}
