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

//! The mixer: owns the tracks, the master transport and the loop scheduler, and is the entry
//! point for every edit.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{info, span, warn, Level};

use crate::error::{self, MixerError};
use crate::event::{self, Emitter, Event};
use crate::media::Backend;
use crate::region::{DragHandle, DragSession, Layout, Region};
use crate::scheduler::{self, Scheduler, Tick};
use crate::source::Provider;
use crate::store::{self, LoadError, Store};
use crate::tracks::{Descriptor, GroupLabel, Track, TrackId, TrackInfo};
use crate::transport::{Master, Transport, TransportState};

/// Tunables for a mixer.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// How often the loop scheduler runs.
    pub tick_period: Duration,
    /// How long a track may take to start before it's reported as failed.
    pub start_timeout: Duration,
    pub layout: Layout,
    pub master_volume: f64,
    pub master_playback_rate: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tick_period: Duration::from_millis(10),
            start_timeout: Duration::from_secs(5),
            layout: Layout::default(),
            master_volume: 1.0,
            master_playback_rate: 1.0,
        }
    }
}

/// Everything the scheduler and the edit operations share. Always accessed under one lock.
pub(crate) struct State {
    pub(crate) store: Store,
    pub(crate) master: Master,
}

pub struct Mixer {
    state: Arc<Mutex<State>>,
    backend: Arc<dyn Backend>,
    transport: Transport,
    source: Option<Arc<dyn Provider>>,
    events_tx: Emitter,
    events_rx: Receiver<Event>,
    /// Media end notifications, drained by the scheduler.
    ended_tx: Sender<TrackId>,
    ended_rx: Receiver<TrackId>,
    scheduler: Mutex<Option<Scheduler>>,
    settings: Settings,
    span: tracing::Span,
}

impl Mixer {
    /// Creates a mixer. The scheduler isn't running until `spawn_scheduler` is called.
    pub fn new(backend: Arc<dyn Backend>, settings: Settings) -> Result<Mixer, MixerError> {
        error::check_volume(settings.master_volume)?;
        error::check_rate(settings.master_playback_rate)?;
        check_layout(settings.layout)?;

        let state = Arc::new(Mutex::new(State {
            store: Store::new(settings.layout),
            master: Master::new(settings.master_volume, settings.master_playback_rate),
        }));
        let (events_tx, events_rx) = event::channel();
        let (ended_tx, ended_rx) = crossbeam_channel::unbounded();
        let transport = Transport::new(state.clone(), events_tx.clone(), settings.start_timeout);

        Ok(Mixer {
            state,
            backend,
            transport,
            source: None,
            events_tx,
            events_rx,
            ended_tx,
            ended_rx,
            scheduler: Mutex::new(None),
            settings,
            span: span!(Level::INFO, "mixer"),
        })
    }

    /// Attaches a track source. Adds and removes are recorded there from now on.
    pub fn with_source(mut self, source: Arc<dyn Provider>) -> Mixer {
        self.source = Some(source);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Events the mixer emits. Every receiver shares the same queue, which keeps the newest
    /// 1024 events if nobody drains it.
    pub fn events(&self) -> Receiver<Event> {
        self.events_rx.clone()
    }

    /// Starts the loop scheduler if it isn't running already.
    pub fn spawn_scheduler(&self) {
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_none() {
            *scheduler = Some(Scheduler::spawn(
                self.state.clone(),
                self.ended_rx.clone(),
                self.events_tx.clone(),
                self.settings.tick_period,
            ));
        }
    }

    /// Runs a single scheduler pass right now.
    pub fn tick(&self) -> Tick {
        scheduler::run_once(&self.state, &self.ended_rx, &self.events_tx)
    }

    /// Stops the scheduler and releases every track. The mixer is empty afterward.
    pub async fn shutdown(&self) {
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }

        let removed = {
            let mut state = self.state.lock();
            state.master.state = TransportState::Idle;
            state.store.remove_all()
        };

        let _enter = self.span.enter();
        info!(released = removed.len(), "Mixer shut down.");
    }

    /// Loads tracks concurrently. Tracks that fail are reported and skipped; the rest are added.
    pub async fn load(&self, descriptors: Vec<Descriptor>) -> (Vec<TrackInfo>, Vec<LoadError>) {
        let (tracks, mut errors) = store::load(self.backend.clone(), descriptors).await;

        let mut loaded = Vec::new();
        {
            let mut state = self.state.lock();
            let master = state.master;
            for track in tracks {
                let media = track.media().cloned();
                match state.store.insert(track) {
                    Ok(track) => {
                        if let Some(media) = media {
                            let ended_tx = self.ended_tx.clone();
                            let id = track.id().clone();
                            media.on_ended(Arc::new(move || {
                                // The mixer may already be gone.
                                let _ = ended_tx.send(id.clone());
                            }));
                        }
                        track.apply_rate(master.playback_rate);
                        track.refresh_gain(master.volume);
                        loaded.push(track.info());
                    }
                    Err(e) => errors.push(e),
                }
            }
        }

        let _enter = self.span.enter();
        for info in loaded.iter() {
            info!(track = info.id.as_str(), group = %info.group, duration = info.duration, "Track loaded.");
            self.events_tx.emit(Event::TrackLoaded(info.id.clone()));
        }
        for e in errors.iter() {
            warn!(track = e.id().as_str(), err = e.to_string(), "Track failed to load.");
            self.events_tx.emit(Event::LoadFailed {
                id: e.id().clone(),
                reason: e.to_string(),
            });
        }
        (loaded, errors)
    }

    /// Loads a single track.
    pub async fn add(&self, descriptor: Descriptor) -> Result<TrackInfo, MixerError> {
        let (mut loaded, mut errors) = self.load(vec![descriptor]).await;
        match (loaded.pop(), errors.pop()) {
            (Some(info), _) => Ok(info),
            (None, Some(e)) => Err(e.into()),
            (None, None) => Err(MixerError::NothingLoaded),
        }
    }

    /// Removes a track. Its playback is stopped and its media released before this returns.
    /// The track is also removed from the attached source, if any.
    pub fn remove(&self, id: &TrackId) -> Result<TrackInfo, MixerError> {
        if !self.state.lock().store.contains(id) {
            return Err(MixerError::UnknownTrack(id.clone()));
        }
        if let Some(source) = &self.source {
            source.remove_track(id)?;
        }

        let track = self.state.lock().store.remove(id)?;

        let _enter = self.span.enter();
        info!(track = id.as_str(), "Track removed.");
        self.events_tx.emit(Event::TrackRemoved(id.clone()));
        Ok(track.info())
    }

    /// Removes every track and returns the transport to idle.
    pub fn remove_all(&self) -> Result<Vec<TrackId>, MixerError> {
        if let Some(source) = &self.source {
            source.remove_all_tracks()?;
        }

        let (removed, was_idle) = {
            let mut state = self.state.lock();
            let was_idle = state.master.state == TransportState::Idle;
            state.master.state = TransportState::Idle;
            (state.store.remove_all(), was_idle)
        };

        let _enter = self.span.enter();
        info!(removed = removed.len(), "Removed every track.");
        let ids: Vec<TrackId> = removed.iter().map(|track| track.id().clone()).collect();
        for id in ids.iter() {
            self.events_tx.emit(Event::TrackRemoved(id.clone()));
        }
        if !was_idle {
            self.events_tx
                .emit(Event::TransportChanged(TransportState::Idle));
        }
        Ok(ids)
    }

    /// Snapshots of every track, ordered by group and then load order.
    pub fn list(&self) -> Vec<TrackInfo> {
        self.state
            .lock()
            .store
            .list()
            .into_iter()
            .map(Track::info)
            .collect()
    }

    pub fn get(&self, id: &TrackId) -> Result<TrackInfo, MixerError> {
        Ok(self.state.lock().store.get(id)?.info())
    }

    pub fn len(&self) -> usize {
        self.state.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().store.is_empty()
    }

    /// Runs an edit on a track under the state lock, with the current master settings.
    fn edit<T>(
        &self,
        id: &TrackId,
        f: impl FnOnce(&mut Track, Master) -> Result<T, MixerError>,
    ) -> Result<T, MixerError> {
        let mut state = self.state.lock();
        let master = state.master;
        let track = state.store.get_mut(id)?;
        f(track, master)
    }

    pub fn set_volume(&self, id: &TrackId, volume: f64) -> Result<(), MixerError> {
        let volume = error::check_volume(volume)?;
        self.edit(id, |track, master| {
            track.set_volume(volume);
            track.refresh_gain(master.volume);
            Ok(())
        })
    }

    pub fn set_muted(&self, id: &TrackId, muted: bool) -> Result<(), MixerError> {
        self.edit(id, |track, master| {
            track.set_muted(muted);
            track.refresh_gain(master.volume);
            Ok(())
        })
    }

    /// Flips the mute flag and returns the new value.
    pub fn toggle_mute(&self, id: &TrackId) -> Result<bool, MixerError> {
        self.edit(id, |track, master| {
            let muted = !track.muted();
            track.set_muted(muted);
            track.refresh_gain(master.volume);
            Ok(muted)
        })
    }

    pub fn set_loop(&self, id: &TrackId, looping: bool) -> Result<(), MixerError> {
        self.edit(id, |track, _| {
            track.set_looping(looping);
            Ok(())
        })
    }

    /// Flips the loop flag and returns the new value.
    pub fn toggle_loop(&self, id: &TrackId) -> Result<bool, MixerError> {
        self.edit(id, |track, _| {
            let looping = !track.looping();
            track.set_looping(looping);
            Ok(looping)
        })
    }

    pub fn set_playback_rate(&self, id: &TrackId, rate: f64) -> Result<(), MixerError> {
        let rate = error::check_rate(rate)?;
        self.edit(id, |track, master| {
            track.set_playback_rate(rate);
            track.apply_rate(master.playback_rate);
            Ok(())
        })
    }

    /// Sets a track's region from typed-in times. Values that would leave the track or
    /// collapse the region are clamped.
    pub fn set_region(&self, id: &TrackId, start: f64, end: f64) -> Result<Region, MixerError> {
        let mut state = self.state.lock();
        let master = state.master;
        let layout = state.store.layout();
        let track = state.store.get_mut(id)?;

        let epsilon = layout.epsilon(track.duration());
        let region = Region::clamped(start, end, track.duration(), epsilon, track.region());
        track.set_region(region);
        track.refresh_gain(master.volume);
        Ok(region)
    }

    pub fn insert_breakpoint(&self, id: &TrackId, time: f64, gain: f64) -> Result<(), MixerError> {
        self.edit(id, |track, master| {
            track.envelope_mut().insert_breakpoint(time, gain)?;
            track.refresh_gain(master.volume);
            Ok(())
        })
    }

    /// Removes the breakpoint at exactly the given time. Returns false if there wasn't one.
    pub fn remove_breakpoint(&self, id: &TrackId, time: f64) -> Result<bool, MixerError> {
        self.edit(id, |track, master| {
            let removed = track.envelope_mut().remove_breakpoint(time).is_some();
            track.refresh_gain(master.volume);
            Ok(removed)
        })
    }

    pub fn clear_breakpoints(&self, id: &TrackId) -> Result<(), MixerError> {
        self.edit(id, |track, master| {
            track.envelope_mut().clear_breakpoints();
            track.refresh_gain(master.volume);
            Ok(())
        })
    }

    /// Clears the envelope of every track.
    pub fn clear_all_envelopes(&self) {
        let mut state = self.state.lock();
        let volume = state.master.volume;
        for track in state.store.tracks_mut() {
            track.envelope_mut().clear_breakpoints();
            track.refresh_gain(volume);
        }
    }

    /// Begins dragging a region handle from the given pixel position.
    pub fn begin_drag(
        &self,
        id: &TrackId,
        handle: DragHandle,
        anchor: f64,
    ) -> Result<DragSession, MixerError> {
        let state = self.state.lock();
        let layout = state.store.layout();
        let track = state.store.get(id)?;

        Ok(DragSession::new(
            id.clone(),
            handle,
            anchor,
            track.region(),
            layout.geometry(track.duration()),
            layout.epsilon(track.duration()),
        ))
    }

    /// Moves the drag to the given pointer position and applies the resulting region. The
    /// region is clamped again against the track and the current layout before it's applied.
    pub fn drag_to(&self, session: &DragSession, pointer: f64) -> Result<Region, MixerError> {
        let region = session.region_at(pointer);

        let mut state = self.state.lock();
        let master = state.master;
        let layout = state.store.layout();
        let track = state.store.get_mut(session.track())?;

        let duration = track.duration();
        let epsilon = layout.epsilon(duration);
        let region = if region.fits(duration, epsilon) {
            region
        } else {
            Region::clamped(region.start(), region.end(), duration, epsilon, track.region())
        };
        track.set_region(region);
        track.refresh_gain(master.volume);
        Ok(region)
    }

    /// Finishes a drag. The region is whatever the last step left it at.
    pub fn end_drag(&self, session: DragSession) -> Result<TrackInfo, MixerError> {
        let info = self.get(session.track())?;

        let _enter = self.span.enter();
        info!(
            track = info.id.as_str(),
            handle = ?session.handle(),
            from = session.origin().to_string(),
            to = info.region.to_string(),
            "Region drag finished."
        );
        Ok(info)
    }

    /// Changes the pixel width regions are edited in. Drags already underway keep the
    /// geometry they started with.
    pub fn set_container_width(&self, width: f64) -> Result<(), MixerError> {
        let mut state = self.state.lock();
        let layout = Layout {
            container_width: width,
            ..state.store.layout()
        };
        check_layout(layout)?;
        state.store.set_layout(layout);
        Ok(())
    }

    /// Loads every track in the attached source that isn't loaded yet.
    pub async fn sync_from_source(&self) -> Result<(Vec<TrackInfo>, Vec<LoadError>), MixerError> {
        let source = self.source.as_ref().ok_or(MixerError::NoSource)?;
        let descriptors: Vec<Descriptor> = {
            let listed = source.list_tracks()?;
            let state = self.state.lock();
            listed
                .into_iter()
                .filter(|descriptor| !state.store.contains(&descriptor.id))
                .collect()
        };

        Ok(self.load(descriptors).await)
    }

    /// Records a new track in the attached source and loads it. If the track can't be loaded
    /// it's taken back out of the source.
    pub async fn add_from_source(
        &self,
        group: GroupLabel,
        uri: &str,
        original_name: &str,
    ) -> Result<TrackInfo, MixerError> {
        let source = self.source.as_ref().ok_or(MixerError::NoSource)?;
        let id = source.add_track(group, uri, original_name)?;
        let descriptor = source
            .list_tracks()?
            .into_iter()
            .find(|descriptor| descriptor.id == id)
            .ok_or_else(|| MixerError::UnknownTrack(id.clone()))?;

        match self.add(descriptor).await {
            Ok(info) => Ok(info),
            Err(e) => {
                if let Err(source_err) = source.remove_track(&id) {
                    warn!(
                        track = id.as_str(),
                        err = source_err.to_string(),
                        "Unable to take failed track back out of the source."
                    );
                }
                Err(e)
            }
        }
    }
}

fn check_layout(layout: Layout) -> Result<(), MixerError> {
    let valid = layout.min_region_pixels.is_finite()
        && layout.min_region_pixels > 0.0
        && layout.container_width.is_finite()
        && layout.container_width > layout.min_region_pixels;
    if valid {
        Ok(())
    } else {
        Err(MixerError::InvalidWidth {
            width: layout.container_width,
            min: layout.min_region_pixels,
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::MixerError;
    use crate::event::Event;
    use crate::media::{file, mock, Media as _};
    use crate::region::{DragHandle, Layout};
    use crate::source::{memory, Provider as _};
    use crate::store::LoadError;
    use crate::testutil::{eventually_async, write_wav};
    use crate::tracks::{Descriptor, GroupLabel, PlayState, TrackId};
    use crate::transport::TransportState;

    use super::{Mixer, Settings};

    fn descriptor(id: &str, group: GroupLabel) -> Descriptor {
        Descriptor {
            id: TrackId::from(id),
            group,
            uri: format!("{}.wav", id),
            original_name: "song.mp3".to_string(),
        }
    }

    fn mixer(backend: &Arc<mock::Backend>) -> Mixer {
        Mixer::new(backend.clone(), Settings::default()).expect("mixer")
    }

    #[tokio::test]
    async fn test_load_reports_failures_and_orders_tracks() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        backend.with_failed_load("broken.wav");
        let mixer = mixer(&backend);
        let events = mixer.events();

        let (loaded, errors) = mixer
            .load(vec![
                descriptor("drums", GroupLabel::Drums),
                descriptor("broken", GroupLabel::Bass),
                descriptor("vocals", GroupLabel::Vocals),
            ])
            .await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(errors.len(), 1);

        let ids: Vec<String> = mixer.list().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["vocals", "drums"]);

        let events: Vec<Event> = events.try_iter().collect();
        assert!(events.contains(&Event::TrackLoaded(TrackId::from("drums"))));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::LoadFailed { id, .. } if id.as_str() == "broken")));

        // Adding an id that's already loaded is refused.
        let err = mixer
            .add(descriptor("drums", GroupLabel::Drums))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, MixerError::Load(LoadError::Duplicate(_))));
        assert_eq!(mixer.len(), 2);
    }

    #[tokio::test]
    async fn test_track_controls() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mixer = mixer(&backend);
        let id = mixer
            .add(descriptor("a", GroupLabel::Vocals))
            .await
            .expect("add")
            .id;
        let media = backend.media("a.wav").expect("media");

        mixer.set_volume(&id, 0.5).expect("volume");
        mixer.transport().set_master_volume(0.8).expect("master");
        assert!((media.volume() - 0.4).abs() < 1e-12);

        assert!(mixer.toggle_mute(&id).expect("mute"));
        assert_eq!(media.volume(), 0.0);
        mixer.set_muted(&id, false).expect("unmute");
        assert!((media.volume() - 0.4).abs() < 1e-12);

        assert!(mixer.toggle_loop(&id).expect("loop"));
        assert!(mixer.get(&id).expect("get").looping);

        mixer.set_playback_rate(&id, 0.5).expect("rate");
        mixer.transport().set_master_playback_rate(1.5).expect("rate");
        assert_eq!(media.playback_rate(), 0.75);

        assert!(matches!(
            mixer.set_volume(&id, -0.1),
            Err(MixerError::InvalidVolume(_))
        ));
        assert!(matches!(
            mixer.set_playback_rate(&id, f64::NAN),
            Err(MixerError::InvalidPlaybackRate(_))
        ));
        assert!(matches!(
            mixer.set_volume(&TrackId::from("nope"), 0.5),
            Err(MixerError::UnknownTrack(_))
        ));
    }

    #[tokio::test]
    async fn test_envelope_controls() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mixer = mixer(&backend);
        mixer
            .load(vec![
                descriptor("a", GroupLabel::Vocals),
                descriptor("b", GroupLabel::Bass),
            ])
            .await;
        let a = TrackId::from("a");
        let b = TrackId::from("b");

        mixer.insert_breakpoint(&a, 0.0, 0.25).expect("breakpoint");
        mixer.insert_breakpoint(&a, 10.0, 1.0).expect("breakpoint");
        mixer.insert_breakpoint(&b, 5.0, 0.5).expect("breakpoint");
        assert_eq!(backend.media("a.wav").expect("media").volume(), 0.25);
        assert!(matches!(
            mixer.insert_breakpoint(&a, -1.0, 0.5),
            Err(MixerError::Envelope(_))
        ));

        assert!(mixer.remove_breakpoint(&a, 0.0).expect("remove"));
        assert!(!mixer.remove_breakpoint(&a, 3.0).expect("remove"));
        assert_eq!(mixer.get(&a).expect("get").envelope.len(), 1);

        mixer.clear_all_envelopes();
        assert!(mixer.get(&a).expect("get").envelope.is_empty());
        assert!(mixer.get(&b).expect("get").envelope.is_empty());
        assert_eq!(backend.media("b.wav").expect("media").volume(), 1.0);
    }

    #[tokio::test]
    async fn test_numeric_region_is_clamped() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        backend.with_duration("a.wav", 100.0);
        let mixer = mixer(&backend);
        let id = mixer
            .add(descriptor("a", GroupLabel::Vocals))
            .await
            .expect("add")
            .id;

        // Default layout: 10px of 1000px is 1 second of a 100 second track.
        let region = mixer.set_region(&id, 30.0, 20.0).expect("region");
        assert_eq!(region.start(), 30.0);
        assert_eq!(region.end(), 31.0);

        let region = mixer.set_region(&id, -5.0, 500.0).expect("region");
        assert_eq!(region.start(), 0.0);
        assert_eq!(region.end(), 100.0);
    }

    #[tokio::test]
    async fn test_drag_regions() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        backend.with_duration("a.wav", 100.0);
        let mixer = mixer(&backend);
        let id = mixer
            .add(descriptor("a", GroupLabel::Vocals))
            .await
            .expect("add")
            .id;
        mixer.set_region(&id, 20.0, 40.0).expect("region");

        // Dragging the end handle past the start stops at start + epsilon.
        let session = mixer.begin_drag(&id, DragHandle::End, 400.0).expect("drag");
        let region = mixer.drag_to(&session, 0.0).expect("drag");
        assert_eq!(region.start(), 20.0);
        assert_eq!(region.end(), 21.0);

        // Wiggling back and forth ends up exactly where the pointer is.
        for pointer in [390.0, 372.5, 401.3, 388.8, 400.0] {
            mixer.drag_to(&session, pointer).expect("drag");
        }
        let info = mixer.end_drag(session).expect("end");
        assert_eq!(info.region.start(), 20.0);
        assert_eq!(info.region.end(), 40.0);

        // Moving the whole region keeps its width at the edge.
        let session = mixer
            .begin_drag(&id, DragHandle::Whole, 300.0)
            .expect("drag");
        let region = mixer.drag_to(&session, 2000.0).expect("drag");
        assert_eq!(region.end(), 100.0);
        assert_eq!(region.width(), 20.0);
        mixer.end_drag(session).expect("end");

        // The playhead follows a region that moved out from under it.
        mixer.transport().play().await;
        let media = backend.media("a.wav").expect("media");
        assert_eq!(media.current_time(), 80.0);
        let session = mixer
            .begin_drag(&id, DragHandle::Start, 800.0)
            .expect("drag");
        mixer.drag_to(&session, 850.0).expect("drag");
        assert_eq!(media.current_time(), 85.0);

        assert!(mixer.set_container_width(5.0).is_err());
        mixer.set_container_width(2000.0).expect("width");
        assert!(mixer.begin_drag(&id, DragHandle::End, 0.0).is_ok());
    }

    #[tokio::test]
    async fn test_drag_after_container_shrinks() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        backend.with_duration("a.wav", 100.0);
        let mixer = mixer(&backend);
        let id = mixer
            .add(descriptor("a", GroupLabel::Vocals))
            .await
            .expect("add")
            .id;

        // Half a second is wide enough at 10000 px but not at 1000 px.
        mixer.set_container_width(10_000.0).expect("width");
        mixer.set_region(&id, 0.0, 0.5).expect("region");
        mixer.set_container_width(1000.0).expect("width");

        let session = mixer.begin_drag(&id, DragHandle::Start, 0.0).expect("drag");
        let region = mixer.drag_to(&session, 0.0).expect("drag");
        assert!(region.start() >= 0.0, "start below zero: {}", region);
        assert!(region.end() <= 100.0);
        assert!(region.width() >= 1.0 - 1e-9, "narrower than epsilon: {}", region);
        mixer.end_drag(session).expect("end");
        assert_eq!(mixer.get(&id).expect("get").region, region);
    }

    #[tokio::test]
    async fn test_remove_is_final() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mixer = mixer(&backend);
        mixer
            .load(vec![
                descriptor("a", GroupLabel::Vocals),
                descriptor("b", GroupLabel::Drums),
            ])
            .await;
        mixer.transport().play().await;

        let a = backend.media("a.wav").expect("media");
        let info = mixer.remove(&TrackId::from("a")).expect("remove");
        assert_eq!(info.play_state, PlayState::Removed);
        assert!(a.is_released());
        assert!(!a.is_playing());

        // A late end notification for the removed track changes nothing.
        a.finish();
        let seeks = a.seeks().len();
        let tick = mixer.tick();
        assert!(tick.ended.is_empty() && tick.looped.is_empty());
        assert_eq!(a.seeks().len(), seeks);

        assert!(matches!(
            mixer.remove(&TrackId::from("a")),
            Err(MixerError::UnknownTrack(_))
        ));

        let removed = mixer.remove_all().expect("remove all");
        assert_eq!(removed, vec![TrackId::from("b")]);
        assert!(mixer.is_empty());
        assert_eq!(mixer.transport().current_state(), TransportState::Idle);
    }

    #[tokio::test]
    async fn test_media_end_drives_loop() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mixer = mixer(&backend);
        let id = mixer
            .add(descriptor("a", GroupLabel::Vocals))
            .await
            .expect("add")
            .id;
        mixer.set_loop(&id, true).expect("loop");
        mixer.transport().play().await;

        let media = backend.media("a.wav").expect("media");
        media.finish();
        let tick = mixer.tick();
        assert_eq!(tick.looped, vec![id.clone()]);
        assert!(media.is_playing());
        assert_eq!(media.current_time(), 0.0);
        assert_eq!(
            mixer.get(&id).expect("get").play_state,
            PlayState::Playing
        );
    }

    #[tokio::test]
    async fn test_source_integration() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        backend.with_failed_load("missing.wav");
        let source = Arc::new(memory::Provider::new(vec![
            descriptor("1", GroupLabel::Vocals),
            descriptor("2", GroupLabel::Drums),
        ]));
        let mixer = mixer(&backend).with_source(source.clone());

        let (loaded, errors) = mixer.sync_from_source().await.expect("sync");
        assert_eq!(loaded.len(), 2);
        assert!(errors.is_empty());

        // Syncing again only picks up what's new.
        let (loaded, _) = mixer.sync_from_source().await.expect("sync");
        assert!(loaded.is_empty());

        let info = mixer
            .add_from_source(GroupLabel::Bass, "bass.wav", "song.mp3")
            .await
            .expect("add");
        assert_eq!(info.id, TrackId::from("3"));
        assert_eq!(source.list_tracks().expect("list").len(), 3);

        // A track that can't load doesn't stay in the source.
        assert!(mixer
            .add_from_source(GroupLabel::Other, "missing.wav", "song.mp3")
            .await
            .is_err());
        assert_eq!(source.list_tracks().expect("list").len(), 3);

        mixer.remove(&TrackId::from("1")).expect("remove");
        assert_eq!(source.list_tracks().expect("list").len(), 2);

        mixer.remove_all().expect("remove all");
        assert!(source.list_tracks().expect("list").is_empty());

        let detached = Mixer::new(backend.clone(), Settings::default()).expect("mixer");
        assert!(matches!(
            detached.sync_from_source().await,
            Err(MixerError::NoSource)
        ));
    }

    #[tokio::test]
    async fn test_settings_validation() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let settings = Settings {
            master_volume: 2.0,
            ..Default::default()
        };
        assert!(Mixer::new(backend.clone(), settings).is_err());

        let settings = Settings {
            layout: Layout {
                container_width: 10.0,
                min_region_pixels: 20.0,
            },
            ..Default::default()
        };
        assert!(Mixer::new(backend.clone(), settings).is_err());
    }

    /// Vocals loop 10-20s, drums run out at 90s and bass at 150s, all started by the transport
    /// and driven by the scheduler against the tokio clock.
    #[tokio::test(start_paused = true)]
    async fn test_three_track_mix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut descriptors = Vec::new();
        for (id, group, seconds) in [
            ("vocals", GroupLabel::Vocals, 120.0),
            ("drums", GroupLabel::Drums, 90.0),
            ("bass", GroupLabel::Bass, 150.0),
        ] {
            let path = dir.path().join(format!("{}.wav", id));
            write_wav(&path, 1000, seconds).expect("write wav");
            descriptors.push(Descriptor {
                id: TrackId::from(id),
                group,
                uri: path.to_string_lossy().to_string(),
                original_name: "song.mp3".to_string(),
            });
        }

        let mixer = Mixer::new(
            Arc::new(file::Backend::new()),
            Settings {
                start_timeout: Duration::from_secs(3600),
                ..Default::default()
            },
        )
        .expect("mixer");
        let (loaded, errors) = mixer.load(descriptors).await;
        assert_eq!(loaded.len(), 3);
        assert!(errors.is_empty());

        let vocals = TrackId::from("vocals");
        let drums = TrackId::from("drums");
        let bass = TrackId::from("bass");
        mixer.set_region(&vocals, 10.0, 20.0).expect("region");
        mixer.set_loop(&vocals, true).expect("loop");

        let events = mixer.events();
        mixer.spawn_scheduler();
        let report = mixer.transport().play().await;
        assert_eq!(report.started.len(), 3);
        assert_eq!(mixer.transport().current_state(), TransportState::Playing);

        let state = |id: &TrackId| mixer.get(id).expect("get").play_state;
        for _ in 0..91 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let position = mixer.get(&vocals).expect("get").position;
            assert!(
                (10.0..=20.05).contains(&position),
                "vocals outside their region at {}",
                position
            );
        }

        assert_eq!(state(&drums), PlayState::Paused);
        assert_eq!(state(&vocals), PlayState::Playing);
        assert_eq!(state(&bass), PlayState::Playing);
        assert_eq!(mixer.transport().current_state(), TransportState::Playing);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(state(&bass), PlayState::Paused);
        assert_eq!(state(&vocals), PlayState::Playing);

        let events: Vec<Event> = events.try_iter().collect();
        assert!(events.contains(&Event::TrackEnded(drums.clone())));
        assert!(events.contains(&Event::TrackEnded(bass.clone())));
        let looped = events
            .iter()
            .filter(|e| **e == Event::TrackLooped(vocals.clone()))
            .count();
        // About once every ten seconds of the 151 that passed.
        assert!((14..=16).contains(&looped), "looped {} times", looped);

        mixer.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_scheduler() {
        let backend = Arc::new(mock::Backend::get("mock-backend"));
        let mixer = mixer(&backend);
        mixer.add(descriptor("a", GroupLabel::Vocals)).await.expect("add");
        mixer.spawn_scheduler();
        mixer.spawn_scheduler();

        mixer.transport().play().await;
        let media = backend.media("a.wav").expect("media");
        media.set_position(180.0);
        let shared = &mixer;
        eventually_async(
            move || async move { shared.transport().current_state() == TransportState::Paused },
            "transport never paused",
        )
        .await;
        assert_eq!(
            mixer.get(&TrackId::from("a")).expect("get").play_state,
            PlayState::Paused
        );

        mixer.shutdown().await;
        assert!(mixer.is_empty());
        assert!(media.is_released());
    }
}
