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

//! Region geometry: pixel/time transforms and the clamping rules applied while
//! region handles are dragged.

use std::fmt;

use serde::Serialize;

use crate::tracks::TrackId;

/// The default minimum region width, in pixels.
pub const DEFAULT_MIN_REGION_PIXELS: f64 = 10.0;

/// The default width of the container regions are drawn in, in pixels.
pub const DEFAULT_CONTAINER_WIDTH: f64 = 1000.0;

/// A loop window within a track, in seconds. Always satisfies `0 <= start < end <= duration`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Region {
    start: f64,
    end: f64,
}

impl Region {
    /// A region covering the whole track.
    pub fn full(duration: f64) -> Region {
        Region {
            start: 0.0,
            end: duration,
        }
    }

    /// Clamps an arbitrary start/end pair into a valid region for a track of the given
    /// duration. Non-finite inputs fall back to the corresponding bound of `current`.
    pub fn clamped(start: f64, end: f64, duration: f64, epsilon: f64, current: Region) -> Region {
        let start = if start.is_finite() {
            start
        } else {
            current.start
        };
        let end = if end.is_finite() { end } else { current.end };

        let start = clamp(0.0, duration - epsilon, start).max(0.0);
        let end = clamp(start + epsilon, duration, end);
        Region { start, end }
    }

    /// Gets the start of the region.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Gets the end of the region.
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Whether the region lies within the duration and is at least epsilon wide, allowing for
    /// rounding in the width.
    pub fn fits(&self, duration: f64, epsilon: f64) -> bool {
        self.start >= 0.0 && self.end <= duration && self.width() >= epsilon * (1.0 - 1e-9)
    }

    /// Gets the width of the region in seconds.
    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    /// Returns true if the given time falls inside the region, bounds included.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}, {:.3}]", self.start, self.end)
    }
}

/// The pixel layout regions are edited in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    /// The width of the container, in pixels.
    pub container_width: f64,
    /// The smallest region allowed, in pixels.
    pub min_region_pixels: f64,
}

impl Layout {
    /// Gets the geometry for a track of the given duration.
    pub fn geometry(&self, duration: f64) -> Geometry {
        Geometry::new(duration, self.container_width)
    }

    /// Gets the minimum region width in seconds for a track of the given duration.
    pub fn epsilon(&self, duration: f64) -> f64 {
        self.geometry(duration).pixel_to_time(self.min_region_pixels)
    }
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            container_width: DEFAULT_CONTAINER_WIDTH,
            min_region_pixels: DEFAULT_MIN_REGION_PIXELS,
        }
    }
}

/// Maps between time and pixels for a single track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    duration: f64,
    width: f64,
}

impl Geometry {
    pub fn new(duration: f64, width: f64) -> Geometry {
        Geometry { duration, width }
    }

    pub fn time_to_pixel(&self, time: f64) -> f64 {
        time * self.width / self.duration
    }

    pub fn pixel_to_time(&self, pixel: f64) -> f64 {
        pixel * self.duration / self.width
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }
}

/// Which part of a region is being dragged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragHandle {
    Start,
    End,
    Whole,
}

/// An in-progress drag. Every step is computed from the anchor and the region captured
/// when the drag began, so repeated small moves never accumulate rounding error.
#[derive(Clone, Debug)]
pub struct DragSession {
    track: TrackId,
    handle: DragHandle,
    anchor: f64,
    origin: Region,
    geometry: Geometry,
    epsilon: f64,
}

impl DragSession {
    pub fn new(
        track: TrackId,
        handle: DragHandle,
        anchor: f64,
        origin: Region,
        geometry: Geometry,
        epsilon: f64,
    ) -> DragSession {
        DragSession {
            track,
            handle,
            anchor,
            origin,
            geometry,
            epsilon,
        }
    }

    /// The track being dragged.
    pub fn track(&self) -> &TrackId {
        &self.track
    }

    /// The handle being dragged.
    pub fn handle(&self) -> DragHandle {
        self.handle
    }

    /// The region at the moment the drag began.
    pub fn origin(&self) -> Region {
        self.origin
    }

    /// Computes the region for the pointer at the given pixel position.
    pub fn region_at(&self, pointer: f64) -> Region {
        if !pointer.is_finite() {
            return self.origin;
        }

        let delta = self.geometry.pixel_to_time(pointer - self.anchor);
        let duration = self.geometry.duration();
        let origin = self.origin;

        match self.handle {
            // A region narrower than epsilon is left over from a wider layout. Its start can
            // only go as low as zero.
            DragHandle::Start => Region {
                start: clamp(0.0, origin.end - self.epsilon, origin.start + delta).max(0.0),
                end: origin.end,
            },
            DragHandle::End => Region {
                start: origin.start,
                end: clamp(origin.start + self.epsilon, duration, origin.end + delta),
            },
            DragHandle::Whole => {
                let width = origin.width();
                let start = clamp(0.0, duration - width, origin.start + delta);
                Region {
                    start,
                    end: start + width,
                }
            }
        }
    }
}

/// Clamps without panicking on inverted bounds; the upper bound wins.
fn clamp(lo: f64, hi: f64, value: f64) -> f64 {
    value.max(lo).min(hi)
}
