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

//! Track sources: where the list of stems to load comes from and where added or removed
//! stems get recorded.

use crate::tracks::{Descriptor, GroupLabel, TrackId};

pub mod file;
pub mod memory;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Unable to read track source: {0}")]
    Read(#[from] config::ConfigError),

    #[error("Unable to write track source: {0}")]
    Write(#[from] serde_yml::Error),

    #[error("Track source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Track {0} isn't in the source")]
    UnknownTrack(TrackId),
}

/// Keeps the list of tracks that make up a mix.
pub trait Provider: Send + Sync {
    /// Lists every track in the source.
    fn list_tracks(&self) -> Result<Vec<Descriptor>, SourceError>;

    /// Records a new track and returns the id assigned to it.
    fn add_track(
        &self,
        group: GroupLabel,
        uri: &str,
        original_name: &str,
    ) -> Result<TrackId, SourceError>;

    fn remove_track(&self, id: &TrackId) -> Result<(), SourceError>;

    fn remove_all_tracks(&self) -> Result<(), SourceError>;
}

/// Picks the next id for a source: one more than the largest numeric id so far.
pub(crate) fn next_id(descriptors: &[Descriptor]) -> TrackId {
    let next = descriptors
        .iter()
        .filter_map(|descriptor| descriptor.id.as_str().parse::<u64>().ok())
        .max()
        .map_or(1, |max| max + 1);
    TrackId::from(next.to_string())
}
