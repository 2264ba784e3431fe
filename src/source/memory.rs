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
use parking_lot::Mutex;

use crate::tracks::{Descriptor, GroupLabel, TrackId};

use super::{next_id, SourceError};

/// A track source that only lives as long as the process.
#[derive(Default)]
pub struct Provider {
    tracks: Mutex<Vec<Descriptor>>,
}

impl Provider {
    pub fn new(tracks: Vec<Descriptor>) -> Provider {
        Provider {
            tracks: Mutex::new(tracks),
        }
    }
}

impl super::Provider for Provider {
    fn list_tracks(&self) -> Result<Vec<Descriptor>, SourceError> {
        Ok(self.tracks.lock().clone())
    }

    fn add_track(
        &self,
        group: GroupLabel,
        uri: &str,
        original_name: &str,
    ) -> Result<TrackId, SourceError> {
        let mut tracks = self.tracks.lock();
        let id = next_id(&tracks);
        tracks.push(Descriptor {
            id: id.clone(),
            group,
            uri: uri.to_string(),
            original_name: original_name.to_string(),
        });
        Ok(id)
    }

    fn remove_track(&self, id: &TrackId) -> Result<(), SourceError> {
        let mut tracks = self.tracks.lock();
        let position = tracks
            .iter()
            .position(|descriptor| &descriptor.id == id)
            .ok_or_else(|| SourceError::UnknownTrack(id.clone()))?;
        tracks.remove(position);
        Ok(())
    }

    fn remove_all_tracks(&self) -> Result<(), SourceError> {
        self.tracks.lock().clear();
        Ok(())
    }
}
