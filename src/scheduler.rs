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

//! The loop scheduler. One periodic tick enforces the region of every playing track.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, span, warn, Level};

use crate::event::{Emitter, Event};
use crate::mixer::State;
use crate::tracks::{PlayState, TrackId};
use crate::transport::{PlaybackError, TransportState};

/// What a single tick did.
#[derive(Debug, Default, PartialEq)]
pub struct Tick {
    pub looped: Vec<TrackId>,
    pub ended: Vec<TrackId>,
    pub failed: Vec<TrackId>,
}

/// Drains the media end notifications and runs one tick under the state lock.
pub(crate) fn run_once(
    state: &Mutex<State>,
    ended: &Receiver<TrackId>,
    events: &Emitter,
) -> Tick {
    let pending: HashSet<TrackId> = ended.try_iter().collect();
    let mut state = state.lock();
    let summary = tick(&mut state, &pending, events);
    // Media that reached its end while being polled has already been looped or paused above.
    let stale = ended.try_iter().count();
    if stale > 0 {
        debug!(stale, "Dropped end notifications handled by this tick.");
    }
    summary
}

/// Runs one pass over the playing tracks. A track at or past the end of its region goes back to
/// the region start if it loops and is paused otherwise. Every other playing track gets its gain
/// refreshed for the current position.
///
/// `ended` holds the tracks whose media reported reaching their natural end since the last tick.
/// Ids that aren't in the store are ignored.
pub(crate) fn tick(state: &mut State, ended: &HashSet<TrackId>, events: &Emitter) -> Tick {
    let mut summary = Tick::default();
    let volume = state.master.volume;

    for track in state.store.tracks_mut().filter(|track| track.is_playing()) {
        let Some(media) = track.media().cloned() else {
            continue;
        };

        let region = track.region();
        let position = media.current_time();
        let media_ended = ended.contains(track.id());
        if position < region.end() && !media_ended {
            track.apply_gain(volume, position);
            continue;
        }

        let id = track.id().clone();
        if !track.looping() {
            media.pause();
            track.set_play_state(PlayState::Paused);
            debug!(track = id.as_str(), position, "Reached the end of the region.");
            events.emit(Event::TrackEnded(id.clone()));
            summary.ended.push(id);
            continue;
        }

        media.seek(region.start());
        track.apply_gain(volume, region.start());

        // Media that hit its own end has stopped and needs to be started again.
        if media_ended || position >= media.duration() {
            if let Err(e) = media.play() {
                let e = PlaybackError::Rejected {
                    id: id.clone(),
                    reason: e.to_string(),
                };
                warn!(track = id.as_str(), err = e.to_string(), "Unable to restart loop.");
                track.set_play_state(PlayState::Paused);
                track.set_last_error(Some(e.clone()));
                events.emit(Event::PlaybackFailed {
                    id: id.clone(),
                    reason: e.to_string(),
                });
                summary.failed.push(id);
                continue;
            }
        }

        debug!(track = id.as_str(), start = region.start(), "Looped.");
        events.emit(Event::TrackLooped(id.clone()));
        summary.looped.push(id);
    }

    if state.master.state == TransportState::Playing
        && !state.store.tracks().any(|track| track.is_playing())
    {
        info!("No tracks left playing, pausing the transport.");
        state.master.state = TransportState::Paused;
        events.emit(Event::TransportChanged(TransportState::Paused));
    }

    summary
}

/// The background task that ticks on a fixed period.
pub struct Scheduler {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl Scheduler {
    pub(crate) fn spawn(
        state: Arc<Mutex<State>>,
        ended: Receiver<TrackId>,
        events: Emitter,
        period: Duration,
    ) -> Scheduler {
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let span = span!(Level::INFO, "scheduler");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            {
                let _enter = span.enter();
                info!(period = format!("{:?}", period), "Scheduler started.");
            }

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        let _enter = span.enter();
                        run_once(&state, &ended, &events);
                    }
                }
            }

            let _enter = span.enter();
            info!("Scheduler stopped.");
        });

        Scheduler { shutdown, join }
    }

    /// Stops the task. No tick runs after this returns.
    pub async fn shutdown(self) {
        // The task may already be gone if the runtime is shutting down.
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            warn!(err = e.to_string(), "Scheduler task failed.");
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::event::{self, Event};
    use crate::media::{clock, mock, Media as _};
    use crate::mixer::State;
    use crate::region::{Layout, Region};
    use crate::store::{self, Store};
    use crate::tracks::{Descriptor, GroupLabel, PlayState, Track, TrackId};
    use crate::transport::{Master, TransportState};

    use super::{run_once, tick, Scheduler};

    async fn state(backend: Arc<mock::Backend>, tracks: &[(&str, f64)]) -> State {
        let descriptors = tracks
            .iter()
            .map(|(id, duration)| {
                backend.with_duration(id, *duration);
                Descriptor {
                    id: TrackId::from(*id),
                    group: GroupLabel::Other,
                    uri: id.to_string(),
                    original_name: "song.mp3".to_string(),
                }
            })
            .collect();
        let (tracks, _) = store::load(backend, descriptors).await;

        let mut store = Store::new(Layout::default());
        for track in tracks {
            store.insert(track).expect("insert");
        }
        State {
            store,
            master: Master::default(),
        }
    }

    /// Marks every track as playing, the way the transport would after a successful start.
    fn play_all(state: &mut State) {
        for track in state.store.tracks_mut() {
            if let Some(media) = track.media() {
                media.seek(track.region().start());
                media.play().expect("play");
            }
            track.set_play_state(PlayState::Playing);
        }
        state.master.state = TransportState::Playing;
    }

    fn set_region(state: &mut State, id: &str, start: f64, end: f64) {
        let track = state.store.get_mut(&TrackId::from(id)).expect("track");
        let eps = Layout::default().epsilon(track.duration());
        let region = Region::clamped(start, end, track.duration(), eps, track.region());
        track.set_region(region);
    }

    #[tokio::test]
    async fn test_loop_seeks_back_to_region_start() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mut state = state(backend.clone(), &[("a", 60.0)]).await;
        set_region(&mut state, "a", 2.0, 5.0);
        state
            .store
            .get_mut(&TrackId::from("a"))
            .expect("track")
            .set_looping(true);
        play_all(&mut state);

        let media = backend.media("a").expect("media");
        let (tx, rx) = event::channel();

        media.set_position(4.0);
        let summary = tick(&mut state, &HashSet::new(), &tx);
        assert!(summary.looped.is_empty());

        media.set_position(5.0);
        let summary = tick(&mut state, &HashSet::new(), &tx);
        assert_eq!(summary.looped, vec![TrackId::from("a")]);
        assert_eq!(media.current_time(), 2.0);
        assert!(media.is_playing());
        assert_eq!(rx.try_recv(), Ok(Event::TrackLooped(TrackId::from("a"))));
    }

    #[tokio::test]
    async fn test_loop_restarts_ended_media() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mut state = state(backend.clone(), &[("a", 30.0)]).await;
        state
            .store
            .get_mut(&TrackId::from("a"))
            .expect("track")
            .set_looping(true);
        play_all(&mut state);

        let media = backend.media("a").expect("media");
        media.finish();
        assert!(!media.is_playing());

        let (tx, _rx) = event::channel();
        let ended = HashSet::from([TrackId::from("a")]);
        tick(&mut state, &ended, &tx);
        assert_eq!(media.current_time(), 0.0);
        assert!(media.is_playing());
        assert_eq!(media.play_calls(), 2);
    }

    #[tokio::test]
    async fn test_end_of_region_pauses() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mut state = state(backend.clone(), &[("a", 60.0), ("b", 60.0)]).await;
        set_region(&mut state, "a", 0.0, 10.0);
        play_all(&mut state);

        let (tx, rx) = event::channel();
        backend.media("a").expect("media").set_position(10.5);
        let summary = tick(&mut state, &HashSet::new(), &tx);
        assert_eq!(summary.ended, vec![TrackId::from("a")]);
        assert!(!backend.media("a").expect("media").is_playing());
        assert_eq!(
            state
                .store
                .get(&TrackId::from("a"))
                .expect("track")
                .play_state(),
            PlayState::Paused
        );
        assert_eq!(rx.try_recv(), Ok(Event::TrackEnded(TrackId::from("a"))));

        // B is still playing so the transport is too.
        assert_eq!(state.master.state, TransportState::Playing);

        backend.media("b").expect("media").set_position(60.0);
        tick(&mut state, &HashSet::new(), &tx);
        assert_eq!(state.master.state, TransportState::Paused);
        let events: Vec<Event> = rx.try_iter().collect();
        assert!(events.contains(&Event::TransportChanged(TransportState::Paused)));
    }

    #[tokio::test]
    async fn test_removed_track_is_never_touched() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mut state = state(backend.clone(), &[("a", 60.0), ("b", 60.0)]).await;
        play_all(&mut state);

        let media = backend.media("a").expect("media");
        state.store.remove(&TrackId::from("a")).expect("remove");
        let seeks = media.seeks().len();

        media.set_position(60.0);
        let (tx, rx) = event::channel();
        let ended = HashSet::from([TrackId::from("a")]);
        let summary = tick(&mut state, &ended, &tx);
        assert_eq!(summary, Default::default());
        assert_eq!(media.seeks().len(), seeks);
        assert_eq!(media.play_calls(), 1);
        assert!(rx.try_iter().all(|e| !matches!(e, Event::TrackEnded(_))));
    }

    #[tokio::test]
    async fn test_three_track_scenario() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mut state = state(
            backend.clone(),
            &[("vocals", 120.0), ("drums", 90.0), ("bass", 150.0)],
        )
        .await;
        set_region(&mut state, "vocals", 10.0, 20.0);
        state
            .store
            .get_mut(&TrackId::from("vocals"))
            .expect("track")
            .set_looping(true);
        play_all(&mut state);

        let (tx, _rx) = event::channel();
        let vocals = backend.media("vocals").expect("media");
        let drums = backend.media("drums").expect("media");
        let bass = backend.media("bass").expect("media");
        assert_eq!(vocals.current_time(), 10.0);

        // Step through the first 90 seconds of the mix.
        for second in 1..=90 {
            let t = second as f64;
            let v = 10.0 + (vocals.current_time() - 10.0 + 1.0);
            vocals.set_position(v);
            drums.set_position(t);
            bass.set_position(t);
            tick(&mut state, &HashSet::new(), &tx);

            let v = vocals.current_time();
            assert!((10.0..20.0).contains(&v), "vocals at {} after {}s", v, t);
        }

        // Drums ran out at 90s. The others keep going.
        assert!(!drums.is_playing());
        assert!(vocals.is_playing());
        assert!(bass.is_playing());
        assert_eq!(state.master.state, TransportState::Playing);

        for second in 91..=150 {
            bass.set_position(second as f64);
            tick(&mut state, &HashSet::new(), &tx);
        }
        assert!(!bass.is_playing());
        assert!(vocals.is_playing());
    }

    #[tokio::test]
    async fn test_gain_follows_envelope() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mut state = state(backend.clone(), &[("a", 60.0)]).await;
        {
            let track = state.store.get_mut(&TrackId::from("a")).expect("track");
            track
                .envelope_mut()
                .insert_breakpoint(0.0, 0.0)
                .expect("breakpoint");
            track
                .envelope_mut()
                .insert_breakpoint(10.0, 1.0)
                .expect("breakpoint");
        }
        play_all(&mut state);

        let (tx, _rx) = event::channel();
        let media = backend.media("a").expect("media");
        media.set_position(5.0);
        tick(&mut state, &HashSet::new(), &tx);
        assert!((media.volume() - 0.5).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_at_media_end_restarts_on_same_tick() {
        let media = Arc::new(clock::Media::new("clock", 1.0));
        let mut track = Track::unloaded(Descriptor {
            id: TrackId::from("a"),
            group: GroupLabel::Other,
            uri: "clock".to_string(),
            original_name: "song.mp3".to_string(),
        });
        track.attach(media.clone());
        track.set_looping(true);

        let (ended_tx, ended_rx) = crossbeam_channel::unbounded();
        media.on_ended(Arc::new(move || {
            let _ = ended_tx.send(TrackId::from("a"));
        }));

        let mut store = Store::new(Layout::default());
        store.insert(track).expect("insert");
        let mut state = State {
            store,
            master: Master::default(),
        };
        play_all(&mut state);
        let state = Mutex::new(state);
        let (tx, rx) = event::channel();

        tokio::time::advance(Duration::from_millis(1050)).await;
        let summary = run_once(&state, &ended_rx, &tx);
        assert_eq!(summary.looped, vec![TrackId::from("a")]);
        assert!(media.is_playing());
        assert!(ended_rx.is_empty());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!((media.current_time() - 0.1).abs() < 1e-6);

        // The next tick is an ordinary one.
        let summary = run_once(&state, &ended_rx, &tx);
        assert!(summary.looped.is_empty());
        let looped = rx
            .try_iter()
            .filter(|e| matches!(e, Event::TrackLooped(_)))
            .count();
        assert_eq!(looped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_task_ticks_until_shutdown() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mut state = state(backend.clone(), &[("a", 60.0)]).await;
        set_region(&mut state, "a", 0.0, 10.0);
        play_all(&mut state);
        let state = Arc::new(Mutex::new(state));

        let (ended_tx, ended_rx) = crossbeam_channel::unbounded();
        let (tx, rx) = event::channel();
        let scheduler = Scheduler::spawn(
            state.clone(),
            ended_rx.clone(),
            tx.clone(),
            Duration::from_millis(10),
        );

        backend.media("a").expect("media").set_position(12.0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.try_recv(), Ok(Event::TrackEnded(TrackId::from("a"))));

        scheduler.shutdown().await;

        // Nothing ticks once the scheduler is gone.
        state
            .lock()
            .store
            .get_mut(&TrackId::from("a"))
            .expect("track")
            .set_play_state(PlayState::Playing);
        ended_tx.send(TrackId::from("a")).expect("send");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            state
                .lock()
                .store
                .get(&TrackId::from("a"))
                .expect("track")
                .play_state(),
            PlayState::Playing
        );
        assert_eq!(ended_rx.len(), 1);

        // A manual tick still works and drains the notification.
        run_once(&state, &ended_rx, &tx);
        assert!(ended_rx.is_empty());
    }
}
