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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const PLAY: &str = "play";
const PAUSE: &str = "pause";
const STOP: &str = "stop";
const FORWARD: &str = "forward";
const BACK: &str = "back";
const CLEAR: &str = "clear";
const STATUS: &str = "status";
const LIST: &str = "list";
const LOOP: &str = "loop";
const MUTE: &str = "mute";
const REMOVE: &str = "remove";

/// A controller that drives a mixer from the keyboard.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads a single command. Returns false once the input is exhausted.
    fn monitor_io<R, W>(events_tx: &Sender<Event>, mut reader: R, mut writer: W) -> io::Result<bool>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {}, {}, {}, {}, {}, {}, {} <n>, {} <n>, {} <n>): ",
            PLAY, PAUSE, STOP, FORWARD, BACK, CLEAR, STATUS, LIST, LOOP, MUTE, REMOVE,
        )?;
        writer.flush()?;
        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match parse(&input) {
            Some(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?,
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a line of input into an event.
fn parse(input: &str) -> Option<Event> {
    let input = input.trim().to_lowercase();
    let mut words = input.split_whitespace();
    let command = words.next()?;
    let index = words.next().and_then(|n| n.parse::<usize>().ok());
    if words.next().is_some() {
        return None;
    }

    match (command, index) {
        (PLAY, None) => Some(Event::Play),
        (PAUSE, None) => Some(Event::Pause),
        (STOP, None) => Some(Event::Stop),
        (FORWARD, None) => Some(Event::Forward),
        (BACK, None) => Some(Event::Back),
        (CLEAR, None) => Some(Event::ClearEnvelopes),
        (STATUS, None) => Some(Event::Status),
        (LIST, None) => Some(Event::List),
        (LOOP, Some(n)) => Some(Event::ToggleLoop(n)),
        (MUTE, Some(n)) => Some(Event::ToggleMute(n)),
        (REMOVE, Some(n)) => Some(Event::Remove(n)),
        _ => None,
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}

            info!("Input closed.");
            Ok(())
        })
    }
}
