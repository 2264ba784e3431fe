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
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::media;
use crate::source::file;

pub use self::error::ConfigError;

mod error;
mod mixer;

/// Builds a mixer from the given config file, with its track source attached. No tracks are
/// loaded and the scheduler isn't started yet.
pub fn init_mixer(path: &Path) -> Result<crate::mixer::Mixer, Box<dyn Error>> {
    let config = mixer::Mixer::deserialize(path)?;
    let backend = media::get_backend(config.media_backend())?;
    let tracks = config.tracks(path);

    info!(
        backend = backend.to_string(),
        tracks = tracks.display().to_string(),
        "Initializing mixer."
    );
    let mixer = crate::mixer::Mixer::new(backend, config.settings()?)?
        .with_source(Arc::new(file::Provider::new(&tracks)));
    Ok(mixer)
}

/// Opens the track source named by the given config file.
pub fn init_source(path: &Path) -> Result<file::Provider, ConfigError> {
    let config = mixer::Mixer::deserialize(path)?;
    Ok(file::Provider::new(&config.tracks(path)))
}
