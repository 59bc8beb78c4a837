// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Turns the figures of a composition into one time ordered stream of note events.

use log::debug;

use crate::midi::MidiMessage;
use crate::score::{Composition, InstrumentId};

/// A MIDI message due at an absolute playback time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    pub message: MidiMessage,
    pub timestamp_us: u64,
    pub instrument: InstrumentId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Flattened {
    /// All note-ons and note-offs, sorted by timestamp. Ties keep figure order.
    pub events: Vec<NoteEvent>,
    /// When playback may stop: the last note-off plus the idle wait.
    pub idle_time_us: u64,
}

/// Expand every figure into note events, shifted by `start_delay_us`.
///
/// Strikes without a chord and chords without a strike are skipped.
pub fn flatten(composition: &Composition, start_delay_us: u64, idle_wait_us: u64) -> Flattened {
    let mut events = Vec::new();
    let mut last_note_off = start_delay_us;

    for scheduled in composition.figures() {
        let figure = &scheduled.figure;
        let channel = composition
            .instrument(figure.instrument)
            .map_or(crate::midi::MELODIC_CHANNEL, |i| i.channel());

        for (strike, chord) in figure.pairs() {
            let note_on_us = start_delay_us + scheduled.start_us + strike.start_us;
            let note_off_us = note_on_us + strike.duration_us;
            for note in chord.notes() {
                events.push(NoteEvent {
                    message: MidiMessage::note_on(channel, note, strike.velocity),
                    timestamp_us: note_on_us,
                    instrument: figure.instrument,
                });
                events.push(NoteEvent {
                    message: MidiMessage::note_off(channel, note, strike.velocity),
                    timestamp_us: note_off_us,
                    instrument: figure.instrument,
                });
                last_note_off = last_note_off.max(note_off_us);
            }
        }
    }

    events.sort_by_key(|e| e.timestamp_us);
    let idle_time_us = last_note_off + idle_wait_us;
    debug!(
        "flattened {} events, idle from {}us",
        events.len(),
        idle_time_us
    );

    Flattened {
        events,
        idle_time_us,
    }
}
