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
use std::{fmt, sync::Arc};

pub mod clock;
mod error;
pub mod file;
pub mod mock;

pub use error::MediaError;

/// Called when a media resource reaches its natural end.
pub type EndedCallback = Arc<dyn Fn() + Send + Sync>;

/// A playable media resource. Times are in seconds.
///
/// Everything except `play` must return promptly: these calls are made while the mixer state
/// is locked. `play` may block while the media buffers, but once a media has started it must
/// be able to restart without suspending.
pub trait Media: fmt::Display + Send + Sync {
    /// The duration of the media.
    fn duration(&self) -> f64;

    /// Starts playback from the current position.
    fn play(&self) -> Result<(), MediaError>;

    fn pause(&self);

    fn seek(&self, time: f64);

    fn set_volume(&self, gain: f64);

    fn set_playback_rate(&self, rate: f64);

    fn current_time(&self) -> f64;

    /// Registers the callback for the end of the media. Replaces any previous callback.
    fn on_ended(&self, callback: EndedCallback);

    /// Releases the underlying resource. The media can't be played afterward.
    fn release(&self);
}

/// Resolves media URIs into playable media.
pub trait Backend: fmt::Display + Send + Sync {
    /// Loads the media at the given URI. Blocks until the duration is known.
    fn load(&self, uri: &str) -> Result<Arc<dyn Media>, MediaError>;
}

/// Gets the backend with the given name.
pub fn get_backend(name: &str) -> Result<Arc<dyn Backend>, MediaError> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Backend::get(name)));
    }

    match name {
        "file" => Ok(Arc::new(file::Backend::new())),
        _ => Err(MediaError::UnknownBackend(name.to_string())),
    }
}
