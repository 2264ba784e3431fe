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
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::envelope::{self, Breakpoint, Envelope};
use crate::media::Media;
use crate::region::Region;
use crate::transport::PlaybackError;
use crate::util::format_time;

/// Identifies a track. Unique within a store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        TrackId(id.to_string())
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        TrackId(id)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role a stem plays in the original mix. Only used for display and ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupLabel {
    Vocals,
    #[serde(alias = "no_vocals", alias = "accompaniment")]
    Instrumental,
    Drums,
    Bass,
    Guitar,
    Piano,
    Other,
}

impl GroupLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupLabel::Vocals => "vocals",
            GroupLabel::Instrumental => "instrumental",
            GroupLabel::Drums => "drums",
            GroupLabel::Bass => "bass",
            GroupLabel::Guitar => "guitar",
            GroupLabel::Piano => "piano",
            GroupLabel::Other => "other",
        }
    }
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GroupLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vocals" => Ok(GroupLabel::Vocals),
            "instrumental" | "no_vocals" | "accompaniment" => Ok(GroupLabel::Instrumental),
            "drums" => Ok(GroupLabel::Drums),
            "bass" => Ok(GroupLabel::Bass),
            "guitar" => Ok(GroupLabel::Guitar),
            "piano" => Ok(GroupLabel::Piano),
            "other" => Ok(GroupLabel::Other),
            _ => Err(format!("unknown group label: {}", s)),
        }
    }
}

/// Where a track is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PlayState {
    /// Metadata hasn't resolved yet.
    Unloaded,
    Loaded,
    Playing,
    Paused,
    Removed,
}

/// Describes a track to load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub id: TrackId,
    pub group: GroupLabel,
    pub uri: String,
    pub original_name: String,
}

/// A loaded track and its playback state.
pub struct Track {
    id: TrackId,
    group: GroupLabel,
    uri: String,
    original_name: String,
    media: Option<Arc<dyn Media>>,
    duration: f64,
    region: Region,
    volume: f64,
    muted: bool,
    looping: bool,
    playback_rate: f64,
    envelope: Envelope,
    play_state: PlayState,
    last_error: Option<PlaybackError>,
    /// The gain last sent to the media, so ticks only push changes.
    applied_gain: Option<f64>,
    /// Load order, used as the tie breaker when listing.
    order: u64,
}

impl Track {
    /// Creates a track whose media hasn't been resolved yet.
    pub fn unloaded(descriptor: Descriptor) -> Track {
        Track {
            id: descriptor.id,
            group: descriptor.group,
            uri: descriptor.uri,
            original_name: descriptor.original_name,
            media: None,
            duration: 0.0,
            region: Region::full(0.0),
            volume: 1.0,
            muted: false,
            looping: false,
            playback_rate: 1.0,
            envelope: Envelope::new(),
            play_state: PlayState::Unloaded,
            last_error: None,
            applied_gain: None,
            order: 0,
        }
    }

    /// Attaches resolved media. The duration is fixed from here on and the region covers the
    /// whole track.
    pub fn attach(&mut self, media: Arc<dyn Media>) {
        self.duration = media.duration();
        self.region = Region::full(self.duration);
        self.media = Some(media);
        self.play_state = PlayState::Loaded;
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }

    pub fn group(&self) -> GroupLabel {
        self.group
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn play_state(&self) -> PlayState {
        self.play_state
    }

    pub fn last_error(&self) -> Option<&PlaybackError> {
        self.last_error.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.play_state == PlayState::Playing
    }

    pub(crate) fn media(&self) -> Option<&Arc<dyn Media>> {
        self.media.as_ref()
    }

    pub(crate) fn order(&self) -> u64 {
        self.order
    }

    pub(crate) fn set_order(&mut self, order: u64) {
        self.order = order;
    }

    pub(crate) fn set_play_state(&mut self, play_state: PlayState) {
        self.play_state = play_state;
    }

    pub(crate) fn set_last_error(&mut self, error: Option<PlaybackError>) {
        self.last_error = error;
    }

    pub(crate) fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub(crate) fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub(crate) fn set_playback_rate(&mut self, rate: f64) {
        self.playback_rate = rate;
    }

    pub(crate) fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    /// The current playhead position, or zero if there's no media.
    pub fn position(&self) -> f64 {
        self.media.as_ref().map_or(0.0, |media| media.current_time())
    }

    /// The rate the media should actually play at.
    pub fn effective_rate(&self, master_rate: f64) -> f64 {
        self.playback_rate * master_rate
    }

    /// Replaces the region. A playing track whose playhead falls outside the new region is
    /// moved to the new start.
    pub(crate) fn set_region(&mut self, region: Region) {
        self.region = region;

        if !self.is_playing() {
            return;
        }
        if let Some(media) = &self.media {
            let position = media.current_time();
            if !region.contains(position) {
                debug!(
                    track = self.id.as_str(),
                    position,
                    region = region.to_string(),
                    "Playhead outside the new region, seeking to its start."
                );
                media.seek(region.start());
            }
        }
    }

    /// Pushes the effective gain at the given time to the media, if it changed.
    pub(crate) fn apply_gain(&mut self, master_volume: f64, time: f64) {
        let gain = envelope::effective_gain(self, master_volume, time);
        if self.applied_gain == Some(gain) {
            return;
        }
        if let Some(media) = &self.media {
            media.set_volume(gain);
            self.applied_gain = Some(gain);
        }
    }

    /// Pushes the gain at the current playhead position to the media.
    pub(crate) fn refresh_gain(&mut self, master_volume: f64) {
        let position = self.position();
        self.apply_gain(master_volume, position);
    }

    pub(crate) fn apply_rate(&self, master_rate: f64) {
        if let Some(media) = &self.media {
            media.set_playback_rate(self.effective_rate(master_rate));
        }
    }

    /// Stops playback, releases the media, and marks the track removed.
    pub(crate) fn teardown(&mut self) {
        if let Some(media) = self.media.take() {
            if self.is_playing() {
                media.pause();
            }
            media.release();
        }
        self.play_state = PlayState::Removed;
    }

    /// A point-in-time copy of this track's state.
    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            id: self.id.clone(),
            group: self.group,
            uri: self.uri.clone(),
            original_name: self.original_name.clone(),
            duration: self.duration,
            region: self.region,
            position: self.position(),
            volume: self.volume,
            muted: self.muted,
            looping: self.looping,
            playback_rate: self.playback_rate,
            envelope: self.envelope.breakpoints().to_vec(),
            play_state: self.play_state,
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// A snapshot of a track, safe to hand out of the mixer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackInfo {
    pub id: TrackId,
    pub group: GroupLabel,
    pub uri: String,
    pub original_name: String,
    pub duration: f64,
    pub region: Region,
    pub position: f64,
    pub volume: f64,
    pub muted: bool,
    pub looping: bool,
    pub playback_rate: f64,
    pub envelope: Vec<Breakpoint>,
    pub play_state: PlayState,
    pub last_error: Option<String>,
}

impl fmt::Display for TrackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} ({} / {}, region {}, {:?}",
            self.id,
            self.group,
            self.original_name,
            format_time(self.position),
            format_time(self.duration),
            self.region,
            self.play_state,
        )?;
        if self.looping {
            write!(f, ", looping")?;
        }
        if self.muted {
            write!(f, ", muted")?;
        }
        write!(f, ")")
    }
}
