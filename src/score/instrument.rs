// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::midi::{MELODIC_CHANNEL, PERCUSSION_CHANNEL};
use crate::note::Note;

/// Handle of an instrument within its composition.
///
/// Handed out by `Composition::add_instrument` in insertion order, so two
/// equal instruments added twice are still two distinct instruments.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InstrumentId(pub(crate) usize);

impl InstrumentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A General MIDI program, optionally taken from a soundfont file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiPatch {
    /// Program number counted from 1. Zero keeps the bank's default program.
    pub patch: u8,
    pub soundfont: Option<PathBuf>,
}

/// A sample played whenever its trigger note is struck.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleInfo {
    pub path: PathBuf,
    /// Optional excerpt of the file in milliseconds, as `(start, end)`.
    pub range_ms: Option<(f64, f64)>,
    /// Linear gain applied to the sample.
    pub gain: f64,
}

impl SampleInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            range_ms: None,
            gain: 1.0,
        }
    }

    pub fn with_range_ms(mut self, start: f64, end: f64) -> Self {
        self.range_ms = Some((start, end));
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }
}

pub type SampleMap = BTreeMap<Note, SampleInfo>;

#[derive(Clone, Debug, PartialEq)]
pub enum Instrument {
    Melodic(MidiPatch),
    Percussion(MidiPatch),
    SampleBank(SampleMap),
    /// An instrument built by the player's custom factory, identified by an opaque code.
    Custom(i32),
}

impl Instrument {
    pub fn melodic(patch: u8) -> Self {
        Instrument::Melodic(MidiPatch {
            patch,
            soundfont: None,
        })
    }

    pub fn percussion(patch: u8) -> Self {
        Instrument::Percussion(MidiPatch {
            patch,
            soundfont: None,
        })
    }

    /// Load the program from a soundfont instead of the built-in bank.
    /// Has no effect on sample banks and custom instruments.
    pub fn with_soundfont(mut self, path: impl Into<PathBuf>) -> Self {
        match &mut self {
            Instrument::Melodic(p) | Instrument::Percussion(p) => p.soundfont = Some(path.into()),
            Instrument::SampleBank(_) | Instrument::Custom(_) => {}
        }
        self
    }

    pub fn is_percussion(&self) -> bool {
        matches!(self, Instrument::Percussion(_))
    }

    pub fn midi_patch(&self) -> Option<&MidiPatch> {
        match self {
            Instrument::Melodic(p) | Instrument::Percussion(p) => Some(p),
            _ => None,
        }
    }

    /// The MIDI channel notes for this instrument are sent on.
    pub fn channel(&self) -> u8 {
        if self.is_percussion() {
            PERCUSSION_CHANNEL
        } else {
            MELODIC_CHANNEL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels() {
        assert_eq!(Instrument::melodic(1).channel(), MELODIC_CHANNEL);
        assert_eq!(Instrument::percussion(1).channel(), PERCUSSION_CHANNEL);
        assert_eq!(Instrument::Custom(3).channel(), MELODIC_CHANNEL);
        assert_eq!(Instrument::SampleBank(SampleMap::new()).channel(), MELODIC_CHANNEL);
    }

    #[test]
    fn soundfont_only_applies_to_midi_instruments() {
        let piano = Instrument::melodic(1).with_soundfont("piano.sf2");
        assert_eq!(
            piano.midi_patch().and_then(|p| p.soundfont.clone()),
            Some(PathBuf::from("piano.sf2"))
        );
        assert_eq!(
            Instrument::Custom(7).with_soundfont("x.sf2"),
            Instrument::Custom(7)
        );
    }
}
