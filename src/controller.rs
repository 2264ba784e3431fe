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
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, span, warn, Level};

use crate::error::MixerError;
use crate::mixer::Mixer;
use crate::tracks::TrackId;

pub mod keyboard;

/// How far forward and back skip.
const SKIP_SECONDS: f64 = 30.0;
/// How often mixer events are reported while waiting for input.
const EVENT_POLL_PERIOD: Duration = Duration::from_millis(250);

/// Controller events that will trigger behavior in the mixer. Tracks are referred to by their
/// 1-based position in the track listing.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Starts every track from the start of its region.
    Play,

    Pause,

    /// Pauses every track and rewinds each to the start of its region.
    Stop,

    Forward,

    Back,

    /// Clears the volume envelope of every track.
    ClearEnvelopes,

    /// Reports the transport position.
    Status,

    /// Lists the tracks.
    List,

    ToggleLoop(usize),

    ToggleMute(usize),

    Remove(usize),
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a mixer from a driver's events.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(mixer: Arc<Mixer>, driver: Arc<dyn Driver>) -> Controller {
        Controller {
            handle: tokio::spawn(async move { Controller::trigger_events(mixer, driver).await }),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers mixer operations by watching the driver and getting events from it.
    async fn trigger_events(mixer: Arc<Mixer>, driver: Arc<dyn Driver>) {
        let span = span!(Level::INFO, "controller");

        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);
        let mixer_events = mixer.events();
        let mut poll = tokio::time::interval(EVENT_POLL_PERIOD);

        span.in_scope(|| info!(tracks = mixer.len(), "Controller started."));

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    span.in_scope(|| info!(event = format!("{:?}", event), "Received event."));

                    match Controller::handle(&mixer, event).await {
                        Ok(Some(report)) => println!("{}", report),
                        Ok(None) => {}
                        Err(e) => span.in_scope(|| error!(err = e.to_string(), "Error talking to mixer.")),
                    }
                }
                _ = poll.tick() => {
                    for event in mixer_events.try_iter() {
                        span.in_scope(|| info!(event = format!("{:?}", event), "Mixer event."));
                    }
                }
            }
        }

        span.in_scope(|| info!("Controller closing."));
        match join_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => span.in_scope(|| warn!(err = e.to_string(), "Event monitor failed.")),
            Err(e) => span.in_scope(|| {
                error!(err = e.to_string(), "Error waiting for event monitor to stop.")
            }),
        }
    }

    /// Applies a single event. Returns anything worth showing the user.
    async fn handle(mixer: &Mixer, event: Event) -> Result<Option<String>, MixerError> {
        let transport = mixer.transport();
        match event {
            Event::Play => {
                let report = transport.play().await;
                for failure in report.failed.iter() {
                    warn!(err = failure.to_string(), "Track didn't start.");
                }
                Ok(None)
            }
            Event::Pause => {
                transport.pause().await;
                Ok(None)
            }
            Event::Stop => {
                transport.stop().await;
                Ok(None)
            }
            Event::Forward => {
                transport.skip(SKIP_SECONDS).await;
                Ok(None)
            }
            Event::Back => {
                transport.skip(-SKIP_SECONDS).await;
                Ok(None)
            }
            Event::ClearEnvelopes => {
                mixer.clear_all_envelopes();
                Ok(None)
            }
            Event::Status => Ok(Some(transport.status().to_string())),
            Event::List => Ok(Some(
                mixer
                    .list()
                    .iter()
                    .enumerate()
                    .map(|(i, track)| format!("{}. {}", i + 1, track))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
            Event::ToggleLoop(n) => {
                let id = track_at(mixer, n)?;
                let looping = mixer.toggle_loop(&id)?;
                Ok(Some(format!("{} looping: {}", id, looping)))
            }
            Event::ToggleMute(n) => {
                let id = track_at(mixer, n)?;
                let muted = mixer.toggle_mute(&id)?;
                Ok(Some(format!("{} muted: {}", id, muted)))
            }
            Event::Remove(n) => {
                let id = track_at(mixer, n)?;
                mixer.remove(&id)?;
                Ok(Some(format!("{} removed", id)))
            }
        }
    }
}

/// Finds the track at a 1-based position in the listing.
fn track_at(mixer: &Mixer, n: usize) -> Result<TrackId, MixerError> {
    n.checked_sub(1)
        .and_then(|i| mixer.list().into_iter().nth(i))
        .map(|track| track.id)
        .ok_or_else(|| MixerError::UnknownTrack(TrackId::from(n.to_string())))
}
