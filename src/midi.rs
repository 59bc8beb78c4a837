// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The small subset of MIDI short messages the player sends and captures.

use crate::note::{Note, Velocity};

/// Channel used by melodic instruments (channel 1, encoded as 0).
pub const MELODIC_CHANNEL: u8 = 0;
/// Channel reserved for percussion (channel 10, encoded as 9).
pub const PERCUSSION_CHANNEL: u8 = 9;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const PROGRAM_CHANGE: u8 = 0xC0;

/// A three byte MIDI short message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

/// The meaning of a `MidiMessage`, as far as the player cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn {
        channel: u8,
        note: Note,
        velocity: Velocity,
    },
    NoteOff {
        channel: u8,
        note: Note,
        velocity: Velocity,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    Other,
}

impl MidiMessage {
    pub fn note_on(channel: u8, note: Note, velocity: Velocity) -> Self {
        Self {
            status: NOTE_ON | (channel & 0x0F),
            data1: note.to_midi(),
            data2: velocity.to_midi(),
        }
    }

    pub fn note_off(channel: u8, note: Note, velocity: Velocity) -> Self {
        Self {
            status: NOTE_OFF | (channel & 0x0F),
            data1: note.to_midi(),
            data2: velocity.to_midi(),
        }
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self {
            status: PROGRAM_CHANGE | (channel & 0x0F),
            data1: program & 0x7F,
            data2: 0,
        }
    }

    /// Parse raw bytes as delivered by an input device.
    /// Returns `None` for anything that is not a channel voice message.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        if status < 0x80 || status >= 0xF0 {
            return None;
        }
        Some(Self {
            status,
            data1: bytes.get(1).copied().unwrap_or(0) & 0x7F,
            data2: bytes.get(2).copied().unwrap_or(0) & 0x7F,
        })
    }

    pub fn channel(self) -> u8 {
        self.status & 0x0F
    }

    /// The same message on a different channel.
    /// System messages have no channel and are returned unchanged.
    ///
    /// ```
    /// use syn_score::midi::*;
    /// use syn_score::note::{Note, Velocity};
    ///
    /// let msg = MidiMessage::note_on(3, Note::from_midi(36), Velocity::MAX);
    /// assert_eq!(msg.with_channel(PERCUSSION_CHANNEL).status, 0x99);
    /// ```
    pub fn with_channel(self, channel: u8) -> Self {
        if self.status >= 0xF0 {
            return self;
        }
        Self {
            status: (self.status & 0xF0) | (channel & 0x0F),
            ..self
        }
    }

    /// A note-on with velocity zero counts as a note-off.
    pub fn decode(self) -> MidiEvent {
        let channel = self.channel();
        let note = Note::from_midi(self.data1 & 0x7F);
        let velocity = Velocity::from_midi(self.data2 & 0x7F);
        match self.status & 0xF0 {
            NOTE_ON if velocity == Velocity::MIN => MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            },
            NOTE_ON => MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            },
            NOTE_OFF => MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            },
            PROGRAM_CHANGE => MidiEvent::ProgramChange {
                channel,
                program: self.data1 & 0x7F,
            },
            _ => MidiEvent::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_note_messages() {
        let on = MidiMessage::note_on(3, Note::from_midi(64), Velocity::from_midi(100));
        assert_eq!(on.status, 0x93);
        assert_eq!(
            on.decode(),
            MidiEvent::NoteOn {
                channel: 3,
                note: Note::from_midi(64),
                velocity: Velocity::from_midi(100)
            }
        );

        let off = MidiMessage::note_off(3, Note::from_midi(64), Velocity::from_midi(100));
        assert_eq!(off.status, 0x83);
        assert!(matches!(off.decode(), MidiEvent::NoteOff { channel: 3, .. }));
    }

    #[test]
    fn silent_note_on_is_note_off() {
        let msg = MidiMessage::from_bytes(&[0x90, 60, 0]).unwrap();
        assert!(matches!(msg.decode(), MidiEvent::NoteOff { .. }));
    }

    #[test]
    fn program_change() {
        let msg = MidiMessage::program_change(0, 33);
        assert_eq!(
            msg.decode(),
            MidiEvent::ProgramChange {
                channel: 0,
                program: 33
            }
        );
    }

    #[test]
    fn raw_bytes() {
        assert_eq!(MidiMessage::from_bytes(&[]), None);
        assert_eq!(MidiMessage::from_bytes(&[0xF8]), None);
        assert_eq!(MidiMessage::from_bytes(&[60, 0x90]), None);
        assert_eq!(
            MidiMessage::from_bytes(&[0x81, 200, 5]),
            Some(MidiMessage {
                status: 0x81,
                data1: 72,
                data2: 5
            })
        );
    }

    #[test]
    fn remap_keeps_everything_but_the_channel() {
        let msg = MidiMessage::note_off(2, Note::from_midi(40), Velocity::from_midi(7));
        let remapped = msg.with_channel(PERCUSSION_CHANNEL);
        assert_eq!(remapped.channel(), PERCUSSION_CHANNEL);
        assert_eq!(remapped.status & 0xF0, 0x80);
        assert_eq!((remapped.data1, remapped.data2), (40, 7));
    }
}
