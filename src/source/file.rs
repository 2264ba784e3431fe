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
use std::io::Write;
use std::path::{Path, PathBuf};

use config::{Config, File};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::tracks::{Descriptor, GroupLabel, TrackId};

use super::{next_id, SourceError};

/// The on-disk layout of a track source.
#[derive(Debug, Default, Deserialize, Serialize)]
struct TrackFile {
    #[serde(default)]
    tracks: Vec<Descriptor>,
}

/// A track source kept in a YAML file. A missing file is an empty source.
pub struct Provider {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl Provider {
    pub fn new(path: &Path) -> Provider {
        Provider {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<TrackFile, SourceError> {
        if !self.path.exists() {
            return Ok(TrackFile::default());
        }
        Ok(Config::builder()
            .add_source(File::from(self.path.as_path()))
            .build()?
            .try_deserialize::<TrackFile>()?)
    }

    fn write(&self, track_file: &TrackFile) -> Result<(), SourceError> {
        let serialized = serde_yml::to_string(track_file)?;
        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(serialized.as_bytes())?;
        debug!(path = self.path.display().to_string(), "Wrote track source.");
        Ok(())
    }

    /// Resolves a relative path against the directory holding the source file.
    fn resolve(&self, uri: &str) -> String {
        if uri.contains("://") || Path::new(uri).is_absolute() {
            return uri.to_string();
        }
        match self.path.parent() {
            Some(parent) => parent.join(uri).display().to_string(),
            None => uri.to_string(),
        }
    }
}

impl super::Provider for Provider {
    fn list_tracks(&self) -> Result<Vec<Descriptor>, SourceError> {
        let _guard = self.lock.lock();
        Ok(self
            .read()?
            .tracks
            .into_iter()
            .map(|descriptor| Descriptor {
                uri: self.resolve(&descriptor.uri),
                ..descriptor
            })
            .collect())
    }

    fn add_track(
        &self,
        group: GroupLabel,
        uri: &str,
        original_name: &str,
    ) -> Result<TrackId, SourceError> {
        let _guard = self.lock.lock();
        let mut track_file = self.read()?;
        let id = next_id(&track_file.tracks);
        track_file.tracks.push(Descriptor {
            id: id.clone(),
            group,
            uri: uri.to_string(),
            original_name: original_name.to_string(),
        });
        self.write(&track_file)?;

        info!(track = id.as_str(), %group, uri, "Added track to source.");
        Ok(id)
    }

    fn remove_track(&self, id: &TrackId) -> Result<(), SourceError> {
        let _guard = self.lock.lock();
        let mut track_file = self.read()?;
        let before = track_file.tracks.len();
        track_file.tracks.retain(|descriptor| &descriptor.id != id);
        if track_file.tracks.len() == before {
            return Err(SourceError::UnknownTrack(id.clone()));
        }
        self.write(&track_file)?;

        info!(track = id.as_str(), "Removed track from source.");
        Ok(())
    }

    fn remove_all_tracks(&self) -> Result<(), SourceError> {
        let _guard = self.lock.lock();
        self.write(&TrackFile::default())?;
        info!("Removed every track from source.");
        Ok(())
    }
}
