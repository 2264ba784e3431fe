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
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;
use tracing::{info, span, Level};

use super::{clock, MediaError};

const FILE_SCHEME: &str = "file://";

/// Loads local audio files. Durations come from the file headers; playback follows the clock.
pub struct Backend {}

impl Backend {
    pub fn new() -> Backend {
        Backend {}
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Backend for Backend {
    fn load(&self, uri: &str) -> Result<Arc<dyn super::Media>, MediaError> {
        let span = span!(Level::INFO, "load media (file)");
        let _enter = span.enter();

        let path = Path::new(uri.strip_prefix(FILE_SCHEME).unwrap_or(uri));
        let duration = probe_duration(path)?;
        info!(uri, duration, "Probed media.");

        Ok(Arc::new(clock::Media::new(uri, duration)))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file")
    }
}

/// Reads the duration of an audio file (WAV, MP3, FLAC, etc.) from its headers.
pub fn probe_duration(path: &Path) -> Result<f64, MediaError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => MediaError::NotFound(path.display().to_string()),
        _ => MediaError::Io(e),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MediaError::UnknownDuration(path.display().to_string()))?;
    let params = &track.codec_params;

    let duration = match (params.n_frames, params.time_base, params.sample_rate) {
        (Some(n_frames), Some(time_base), _) => {
            let time = time_base.calc_time(n_frames);
            time.seconds as f64 + time.frac
        }
        (Some(n_frames), None, Some(sample_rate)) => n_frames as f64 / sample_rate as f64,
        _ => return Err(MediaError::UnknownDuration(path.display().to_string())),
    };

    if !duration.is_finite() || duration <= 0.0 {
        return Err(MediaError::UnknownDuration(path.display().to_string()));
    }
    Ok(duration)
}
