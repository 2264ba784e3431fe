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
use crate::envelope::EnvelopeError;
use crate::source::SourceError;
use crate::store::LoadError;
use crate::tracks::TrackId;

/// Errors for requests the mixer can't honor. None of them affect other tracks.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    #[error("Volume must be between 0 and 1, got {0}")]
    InvalidVolume(f64),

    #[error("Playback rate must be positive, got {0}")]
    InvalidPlaybackRate(f64),

    #[error("Container width must be more than {min} pixels, got {width}")]
    InvalidWidth { width: f64, min: f64 },

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Track source error: {0}")]
    Source(#[from] SourceError),

    #[error("No track source is attached")]
    NoSource,

    #[error("Nothing was loaded")]
    NothingLoaded,
}

/// Checks that a volume is within [0, 1].
pub(crate) fn check_volume(volume: f64) -> Result<f64, MixerError> {
    if volume.is_finite() && (0.0..=1.0).contains(&volume) {
        Ok(volume)
    } else {
        Err(MixerError::InvalidVolume(volume))
    }
}

/// Checks that a playback rate is finite and positive.
pub(crate) fn check_rate(rate: f64) -> Result<f64, MixerError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(MixerError::InvalidPlaybackRate(rate))
    }
}
