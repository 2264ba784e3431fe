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
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;
use tracing::warn;

use crate::mixer::Settings;
use crate::region::{Layout, DEFAULT_CONTAINER_WIDTH, DEFAULT_MIN_REGION_PIXELS};

use super::error::ConfigError;

const DEFAULT_MEDIA_BACKEND: &str = "file";
const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(10);
const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(5);
/// Ticks slower than this make loop points audibly late.
const MAX_RECOMMENDED_TICK_PERIOD: Duration = Duration::from_millis(20);

/// A YAML representation of the mixer configuration.
#[derive(Deserialize)]
pub(super) struct Mixer {
    /// The media backend to load tracks with.
    media_backend: Option<String>,
    /// How often the loop scheduler runs, e.g. "10ms".
    tick_period: Option<String>,
    /// How long a track may take to start playing, e.g. "5s".
    start_timeout: Option<String>,
    /// The width regions are edited in, in pixels.
    container_width: Option<f64>,
    /// The narrowest a region can be made, in pixels.
    min_region_pixels: Option<f64>,
    master_volume: Option<f64>,
    master_playback_rate: Option<f64>,
    /// The track source file, relative to this file.
    tracks: String,
}

impl Mixer {
    /// Parses the mixer configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Mixer, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Mixer>()?)
    }

    pub fn media_backend(&self) -> &str {
        self.media_backend.as_deref().unwrap_or(DEFAULT_MEDIA_BACKEND)
    }

    pub fn tick_period(&self) -> Result<Duration, ConfigError> {
        let tick_period = parse_duration(self.tick_period.as_deref(), DEFAULT_TICK_PERIOD)?;
        if tick_period.is_zero() {
            return Err(ConfigError::Invalid("tick_period must be non-zero".to_string()));
        }
        if tick_period > MAX_RECOMMENDED_TICK_PERIOD {
            warn!(
                tick_period = format!("{:?}", tick_period),
                "Tick period is long, loop points may be late."
            );
        }
        Ok(tick_period)
    }

    pub fn start_timeout(&self) -> Result<Duration, ConfigError> {
        let start_timeout = parse_duration(self.start_timeout.as_deref(), DEFAULT_START_TIMEOUT)?;
        if start_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "start_timeout must be non-zero".to_string(),
            ));
        }
        Ok(start_timeout)
    }

    pub fn layout(&self) -> Result<Layout, ConfigError> {
        let layout = Layout {
            container_width: self.container_width.unwrap_or(DEFAULT_CONTAINER_WIDTH),
            min_region_pixels: self.min_region_pixels.unwrap_or(DEFAULT_MIN_REGION_PIXELS),
        };
        if !(layout.min_region_pixels > 0.0 && layout.container_width > layout.min_region_pixels)
        {
            return Err(ConfigError::Invalid(format!(
                "container_width ({}) must be larger than min_region_pixels ({}), which must be positive",
                layout.container_width, layout.min_region_pixels
            )));
        }
        Ok(layout)
    }

    /// Gets the mixer settings, checking every value.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let master_volume = self.master_volume.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&master_volume) {
            return Err(ConfigError::Invalid(format!(
                "master_volume must be between 0 and 1, got {}",
                master_volume
            )));
        }
        let master_playback_rate = self.master_playback_rate.unwrap_or(1.0);
        if !(master_playback_rate.is_finite() && master_playback_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "master_playback_rate must be positive, got {}",
                master_playback_rate
            )));
        }

        Ok(Settings {
            tick_period: self.tick_period()?,
            start_timeout: self.start_timeout()?,
            layout: self.layout()?,
            master_volume,
            master_playback_rate,
        })
    }

    /// Gets the track source path. Relative paths are relative to the config file.
    pub fn tracks(&self, config_path: &Path) -> PathBuf {
        let tracks = Path::new(&self.tracks);
        if tracks.is_absolute() {
            return tracks.to_path_buf();
        }
        match config_path.parent() {
            Some(parent) => parent.join(tracks),
            None => tracks.to_path_buf(),
        }
    }
}

fn parse_duration(value: Option<&str>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.to_string())
            .map_err(|e| ConfigError::Duration {
                value: value.to_string(),
                reason: e.to_string(),
            })?
            .into()),
        None => Ok(default),
    }
}
