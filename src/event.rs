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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

use crate::tracks::TrackId;
use crate::transport::TransportState;

/// How many undelivered events are kept. Past this the oldest are dropped.
const CAPACITY: usize = 1024;

/// Notifications about things the mixer did on its own or that a caller should surface.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    TrackLoaded(TrackId),
    LoadFailed { id: TrackId, reason: String },
    /// A non-looping track reached the end of its region and was paused.
    TrackEnded(TrackId),
    /// A looping track reached the end of its region and went back to its start.
    TrackLooped(TrackId),
    PlaybackFailed { id: TrackId, reason: String },
    TrackRemoved(TrackId),
    TransportChanged(TransportState),
}

/// The sending side of the event queue. Never blocks: when nobody keeps up with the queue the
/// oldest events make room for new ones.
#[derive(Clone)]
pub(crate) struct Emitter {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    overflowing: Arc<AtomicBool>,
}

impl Emitter {
    pub(crate) fn emit(&self, event: Event) {
        let event = match self.tx.try_send(event) {
            Ok(()) => {
                self.overflowing.store(false, Ordering::Relaxed);
                return;
            }
            Err(TrySendError::Full(event)) => event,
            Err(TrySendError::Disconnected(_)) => return,
        };

        let dropped = self.rx.try_recv().ok();
        if !self.overflowing.swap(true, Ordering::Relaxed) {
            warn!(
                capacity = CAPACITY,
                ?dropped,
                "Event queue is full, dropping the oldest events until it's drained."
            );
        }
        // Another sender may have taken the freed slot.
        let _ = self.tx.try_send(event);
    }
}

/// Creates the event queue. The receiver can be cloned for every reader.
pub(crate) fn channel() -> (Emitter, Receiver<Event>) {
    let (tx, rx) = crossbeam_channel::bounded(CAPACITY);
    let emitter = Emitter {
        tx,
        rx: rx.clone(),
        overflowing: Arc::new(AtomicBool::new(false)),
    };
    (emitter, rx)
}
