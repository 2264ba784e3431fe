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

//! A region-synchronized multitrack mixer for auditioning separated stems.
//!
//! Tracks live in a [`store::Store`] owned by a [`mixer::Mixer`]. A single master
//! [`transport::Transport`] starts and stops them together, each track loops or stops at the
//! edges of its own [`region::Region`], and the [`scheduler`] enforces those regions on a fixed
//! tick.

pub mod config;
pub mod controller;
pub mod envelope;
pub mod error;
pub mod event;
pub mod media;
pub mod mixer;
pub mod region;
pub mod scheduler;
pub mod source;
pub mod store;
#[cfg(test)]
mod testutil;
pub mod tracks;
pub mod transport;
pub mod util;
