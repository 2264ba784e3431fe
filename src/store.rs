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

//! The track entity store: an arena of tracks keyed by id.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{info, span, warn, Level};

use crate::error::MixerError;
use crate::media::{Backend, Media, MediaError};
use crate::region::Layout;
use crate::tracks::{Descriptor, Track, TrackId};

/// A track that couldn't be loaded. Only that track is skipped.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Unable to load {id} from {uri}: {source}")]
    Media {
        id: TrackId,
        uri: String,
        #[source]
        source: MediaError,
    },

    #[error("Track {0} is already loaded")]
    Duplicate(TrackId),

    #[error("Track {id} has an invalid duration: {duration}")]
    InvalidDuration { id: TrackId, duration: f64 },

    #[error("Loading {id} was interrupted: {reason}")]
    Interrupted { id: TrackId, reason: String },
}

impl LoadError {
    /// The track that failed to load.
    pub fn id(&self) -> &TrackId {
        match self {
            LoadError::Media { id, .. } => id,
            LoadError::Duplicate(id) => id,
            LoadError::InvalidDuration { id, .. } => id,
            LoadError::Interrupted { id, .. } => id,
        }
    }
}

pub struct Store {
    tracks: HashMap<TrackId, Track>,
    next_order: u64,
    layout: Layout,
}

impl Store {
    pub fn new(layout: Layout) -> Store {
        Store {
            tracks: HashMap::new(),
            next_order: 0,
            layout,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub(crate) fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
    }

    /// The minimum region width for the given track under the current layout.
    pub fn epsilon(&self, track: &Track) -> f64 {
        self.layout.epsilon(track.duration())
    }

    /// Adds a loaded track. Rejects ids that are already present.
    pub fn insert(&mut self, mut track: Track) -> Result<&mut Track, LoadError> {
        if self.tracks.contains_key(track.id()) {
            let id = track.id().clone();
            // The duplicate's media is never going to be used.
            track.teardown();
            return Err(LoadError::Duplicate(id));
        }

        track.set_order(self.next_order);
        self.next_order += 1;

        let id = track.id().clone();
        Ok(self.tracks.entry(id).or_insert(track))
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.tracks.contains_key(id)
    }

    pub fn get(&self, id: &TrackId) -> Result<&Track, MixerError> {
        self.tracks
            .get(id)
            .ok_or_else(|| MixerError::UnknownTrack(id.clone()))
    }

    pub fn get_mut(&mut self, id: &TrackId) -> Result<&mut Track, MixerError> {
        self.tracks
            .get_mut(id)
            .ok_or_else(|| MixerError::UnknownTrack(id.clone()))
    }

    /// Removes a track. Playback is halted and the media released before this returns, and
    /// since the scheduler only sees tracks in the store, no later tick can touch it.
    pub fn remove(&mut self, id: &TrackId) -> Result<Track, MixerError> {
        let mut track = self
            .tracks
            .remove(id)
            .ok_or_else(|| MixerError::UnknownTrack(id.clone()))?;
        track.teardown();
        Ok(track)
    }

    /// Removes every track, in listing order.
    pub fn remove_all(&mut self) -> Vec<Track> {
        let ids: Vec<TrackId> = self.list().iter().map(|t| t.id().clone()).collect();
        ids.iter().filter_map(|id| self.remove(id).ok()).collect()
    }

    /// Tracks ordered by group, then by load order.
    pub fn list(&self) -> Vec<&Track> {
        let mut tracks: Vec<&Track> = self.tracks.values().collect();
        tracks.sort_by_key(|track| (track.group(), track.order()));
        tracks
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.values_mut()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Resolves the media for every descriptor concurrently. Descriptors that fail produce a
/// `LoadError` and the rest still load.
pub async fn load(
    backend: Arc<dyn Backend>,
    descriptors: Vec<Descriptor>,
) -> (Vec<Track>, Vec<LoadError>) {
    let span = span!(Level::INFO, "load tracks");
    let _enter = span.enter();

    let loads = descriptors.into_iter().map(|descriptor| {
        let backend = backend.clone();
        async move {
            let id = descriptor.id.clone();
            let uri = descriptor.uri.clone();
            let loaded = {
                let uri = uri.clone();
                tokio::task::spawn_blocking(move || backend.load(&uri)).await
            };

            match loaded {
                Ok(Ok(media)) => resolve(descriptor, media),
                Ok(Err(source)) => Err(LoadError::Media { id, uri, source }),
                Err(e) => Err(LoadError::Interrupted {
                    id,
                    reason: e.to_string(),
                }),
            }
        }
    });

    let mut tracks = Vec::new();
    let mut errors = Vec::new();
    for result in join_all(loads).await {
        match result {
            Ok(track) => tracks.push(track),
            Err(e) => {
                warn!(track = e.id().as_str(), err = e.to_string(), "Skipping track.");
                errors.push(e);
            }
        }
    }

    info!(
        loaded = tracks.len(),
        failed = errors.len(),
        "Finished loading tracks."
    );
    (tracks, errors)
}

fn resolve(descriptor: Descriptor, media: Arc<dyn Media>) -> Result<Track, LoadError> {
    let duration = media.duration();
    if !duration.is_finite() || duration <= 0.0 {
        media.release();
        return Err(LoadError::InvalidDuration {
            id: descriptor.id,
            duration,
        });
    }

    let mut track = Track::unloaded(descriptor);
    track.attach(media);
    Ok(track)
}
