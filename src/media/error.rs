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

/// Error types for media operations
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Unknown media backend: {0}")]
    UnknownBackend(String),

    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("Unable to determine duration of {0}")]
    UnknownDuration(String),

    #[error("Playback rejected: {0}")]
    Rejected(String),

    #[error("Media has been released")]
    Released,

    #[error("Audio file error: {0}")]
    Probe(#[from] symphonia::core::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
