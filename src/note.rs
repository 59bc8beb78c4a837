// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Definitions of what a note is.

/// A "note" is just an index on the synthesizers keyboard.
/// This definition follows the MIDI standard where C4 corresponds to index 60.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Note(u8);

impl Note {
    /// # Panics
    ///
    /// If `midi_note` is outside of the MIDI range 0 - 127.
    pub fn from_midi(midi_note: u8) -> Note {
        assert!(midi_note < 128, "MIDI only has notes 0 - 127");
        Note(midi_note)
    }

    pub fn try_from_midi(midi_note: i64) -> Option<Note> {
        if (0..128).contains(&midi_note) {
            Some(Note(midi_note as u8))
        } else {
            None
        }
    }

    pub fn to_midi(self) -> u8 {
        self.0
    }

    /// Return the note index in a signed type, convenient for further calculations.
    pub fn index(self) -> i32 {
        self.0 as i32
    }

    /// Frequency in concert tuning, where A4 (MIDI note 69) is 440 Hz.
    ///
    /// ```
    /// use syn_score::note::Note;
    ///
    /// assert_eq!(Note::from_midi(57).frequency(), 220.0);
    /// assert_eq!(Note::from_midi(81).frequency(), 880.0);
    /// ```
    pub fn frequency(self) -> f64 {
        440.0 * 2.0f64.powf((self.index() - 69) as f64 / 12.0)
    }
}

/// How hard a key was pressed, as a MIDI velocity between 0 and 127.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Velocity(u8);

impl Velocity {
    pub const MAX: Velocity = Velocity(127);
    pub const MIN: Velocity = Velocity(0);

    /// # Panics
    ///
    /// If `velocity` is larger than 127.
    pub fn from_midi(velocity: u8) -> Velocity {
        assert!(velocity < 128, "{} out of range", velocity);
        Velocity(velocity)
    }

    pub fn try_from_midi(velocity: i64) -> Option<Velocity> {
        if (0..128).contains(&velocity) {
            Some(Velocity(velocity as u8))
        } else {
            None
        }
    }

    pub fn to_midi(self) -> u8 {
        self.0
    }

    /// The velocity normalized to the interval [0, 1].
    ///
    /// ```
    /// use syn_score::note::Velocity;
    ///
    /// assert_eq!(Velocity::MAX.as_f64(), 1.0);
    /// assert_eq!(Velocity::MIN.as_f64(), 0.0);
    /// ```
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 127.0
    }
}
