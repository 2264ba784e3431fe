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

//! Volume automation and effective gain resolution.

use serde::Serialize;

use crate::tracks::Track;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("breakpoint time must be a finite, non-negative number of seconds, got {0}")]
    InvalidTime(f64),

    #[error("breakpoint gain must be finite and non-negative, got {0}")]
    InvalidGain(f64),
}

/// A single automation point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Breakpoint {
    pub time: f64,
    pub gain: f64,
}

/// Time-indexed gain automation for a track. Breakpoints are kept strictly increasing in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    points: Vec<Breakpoint>,
}

impl Envelope {
    pub fn new() -> Envelope {
        Envelope::default()
    }

    /// Inserts a breakpoint, replacing any existing breakpoint at exactly the same time.
    pub fn insert_breakpoint(&mut self, time: f64, gain: f64) -> Result<(), EnvelopeError> {
        if !time.is_finite() || time < 0.0 {
            return Err(EnvelopeError::InvalidTime(time));
        }
        if !gain.is_finite() || gain < 0.0 {
            return Err(EnvelopeError::InvalidGain(gain));
        }

        let index = self.points.partition_point(|point| point.time < time);
        match self.points.get_mut(index) {
            Some(existing) if existing.time == time => existing.gain = gain,
            _ => self.points.insert(index, Breakpoint { time, gain }),
        }
        Ok(())
    }

    /// Removes the breakpoint at exactly the given time, if there is one.
    pub fn remove_breakpoint(&mut self, time: f64) -> Option<Breakpoint> {
        let index = self.points.iter().position(|point| point.time == time)?;
        Some(self.points.remove(index))
    }

    pub fn clear_breakpoints(&mut self) {
        self.points.clear();
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The automation gain at the given time. Linear between breakpoints, held flat outside
    /// them, and 1 when there are no breakpoints.
    pub fn gain_at(&self, time: f64) -> f64 {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 1.0,
        };

        if time <= first.time {
            return first.gain;
        }
        if time >= last.time {
            return last.gain;
        }

        // first.time < time < last.time, so both neighbours exist.
        let index = self.points.partition_point(|point| point.time <= time);
        let before = self.points[index - 1];
        let after = self.points[index];
        let t = (time - before.time) / (after.time - before.time);
        before.gain + (after.gain - before.gain) * t
    }
}

/// The gain a track should be heard at: its own volume, the master volume, its automation
/// at `time`, and its mute switch.
pub fn effective_gain(track: &Track, master_volume: f64, time: f64) -> f64 {
    if track.muted() {
        return 0.0;
    }
    track.volume() * master_volume * track.envelope().gain_at(time)
}

#[cfg(test)]
mod test {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_empty_envelope_is_unity() {
        let envelope = Envelope::new();
        assert_eq!(envelope.gain_at(0.0), 1.0);
        assert_eq!(envelope.gain_at(1234.5), 1.0);
    }

    #[test]
    fn test_interpolation() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::new();
        envelope.insert_breakpoint(10.0, 0.0)?;
        envelope.insert_breakpoint(20.0, 1.0)?;
        envelope.insert_breakpoint(30.0, 0.5)?;

        // Held before the first and after the last breakpoint.
        assert_eq!(envelope.gain_at(0.0), 0.0);
        assert_eq!(envelope.gain_at(100.0), 0.5);

        assert!((envelope.gain_at(15.0) - 0.5).abs() < TOLERANCE);
        assert!((envelope.gain_at(20.0) - 1.0).abs() < TOLERANCE);
        assert!((envelope.gain_at(25.0) - 0.75).abs() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_insert_keeps_order_and_replaces() -> Result<(), EnvelopeError> {
        let mut envelope = Envelope::new();
        envelope.insert_breakpoint(5.0, 1.0)?;
        envelope.insert_breakpoint(1.0, 0.2)?;
        envelope.insert_breakpoint(3.0, 0.4)?;
        envelope.insert_breakpoint(3.0, 0.9)?;

        let times: Vec<f64> = envelope.breakpoints().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![1.0, 3.0, 5.0]);
        assert_eq!(envelope.breakpoints()[1].gain, 0.9);

        assert_eq!(
            envelope.remove_breakpoint(3.0),
            Some(Breakpoint {
                time: 3.0,
                gain: 0.9
            })
        );
        assert_eq!(envelope.remove_breakpoint(3.0), None);

        envelope.clear_breakpoints();
        assert!(envelope.is_empty());
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_breakpoints() {
        let mut envelope = Envelope::new();
        assert_eq!(
            envelope.insert_breakpoint(1.0, -0.1),
            Err(EnvelopeError::InvalidGain(-0.1))
        );
        assert_eq!(
            envelope.insert_breakpoint(-1.0, 0.5),
            Err(EnvelopeError::InvalidTime(-1.0))
        );
        assert!(envelope.insert_breakpoint(f64::NAN, 0.5).is_err());
        assert!(envelope.is_empty());
    }
}
