// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The declarative description of a piece: what is played, when and by which instrument.

use std::collections::BTreeSet;
use std::iter::FromIterator;

use crate::note::{Note, Velocity};
use crate::tempo::Tempo;

mod composition;
mod instrument;

pub use composition::{Composition, GainEvent, ScheduledFigure};
pub use instrument::{Instrument, InstrumentId, MidiPatch, SampleInfo, SampleMap};

/// A set of notes struck together. May be empty, in which case nothing sounds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chord(pub BTreeSet<Note>);

impl Chord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(note: Note) -> Self {
        Self(std::iter::once(note).collect())
    }

    pub fn notes(&self) -> impl Iterator<Item = Note> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Note> for Chord {
    fn from_iter<T: IntoIterator<Item = Note>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One hit of a rhythm, relative to the start of its figure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Strike {
    pub start_us: u64,
    pub duration_us: u64,
    pub velocity: Velocity,
}

impl Strike {
    pub fn new(start_us: u64, duration_us: u64, velocity: Velocity) -> Self {
        Self {
            start_us,
            duration_us,
            velocity,
        }
    }

    /// A strike given in beats of the tempo.
    ///
    /// ```
    /// use syn_score::note::Velocity;
    /// use syn_score::score::Strike;
    /// use syn_score::tempo::Tempo;
    ///
    /// let strike = Strike::at_beats(&Tempo::new(120, 4), 1.0, 0.5, Velocity::MAX);
    /// assert_eq!((strike.start_us, strike.duration_us), (500_000, 250_000));
    /// ```
    pub fn at_beats(tempo: &Tempo, beat: f64, duration: f64, velocity: Velocity) -> Self {
        Self::new(tempo.beat_to_us(beat), tempo.beat_to_us(duration), velocity)
    }

    pub fn end_us(&self) -> u64 {
        self.start_us + self.duration_us
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Melody(pub Vec<Chord>);

impl FromIterator<Chord> for Melody {
    fn from_iter<T: IntoIterator<Item = Chord>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rhythm(pub Vec<Strike>);

impl FromIterator<Strike> for Rhythm {
    fn from_iter<T: IntoIterator<Item = Strike>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A rhythm and a melody played together by one instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct Figure {
    pub rhythm: Rhythm,
    pub melody: Melody,
    pub instrument: InstrumentId,
}

impl Figure {
    /// The i-th strike paired with the i-th chord.
    /// Surplus strikes or chords on either side are silently ignored.
    pub fn pairs(&self) -> impl Iterator<Item = (&Strike, &Chord)> {
        self.rhythm.0.iter().zip(self.melody.0.iter())
    }
}

/// Maps scale degrees to notes and back. Degree zero is the root; negative
/// degrees go below it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scale {
    root: Note,
    /// Semitone offsets of each degree within one octave, ascending, starting with 0.
    intervals: Vec<u8>,
}

impl Scale {
    pub fn new(root: Note, intervals: Vec<u8>) -> Self {
        assert!(
            intervals.first() == Some(&0)
                && intervals.windows(2).all(|w| w[0] < w[1])
                && intervals.iter().all(|i| *i < 12),
            "scale intervals must ascend from 0 within one octave"
        );
        Self { root, intervals }
    }

    pub fn major(root: Note) -> Self {
        Self::new(root, vec![0, 2, 4, 5, 7, 9, 11])
    }

    pub fn minor(root: Note) -> Self {
        Self::new(root, vec![0, 2, 3, 5, 7, 8, 10])
    }

    pub fn root(&self) -> Note {
        self.root
    }

    /// The note at the given degree, if it lies within the MIDI range.
    ///
    /// ```
    /// use syn_score::note::Note;
    /// use syn_score::score::Scale;
    ///
    /// let c_major = Scale::major(Note::from_midi(60));
    /// assert_eq!(c_major.get(2), Some(Note::from_midi(64)));
    /// assert_eq!(c_major.get(-1), Some(Note::from_midi(59)));
    /// assert_eq!(c_major.get(7), Some(Note::from_midi(72)));
    /// ```
    pub fn get(&self, degree: i32) -> Option<Note> {
        let len = self.intervals.len() as i32;
        let octave = degree.div_euclid(len);
        let step = degree.rem_euclid(len) as usize;
        let midi =
            self.root.to_midi() as i64 + 12 * octave as i64 + self.intervals[step] as i64;
        Note::try_from_midi(midi)
    }

    /// The degree of a note, or `None` if the note is not part of the scale.
    pub fn degree_of(&self, note: Note) -> Option<i32> {
        let offset = note.to_midi() as i32 - self.root.to_midi() as i32;
        let octave = offset.div_euclid(12);
        let within = offset.rem_euclid(12) as u8;
        let step = self.intervals.iter().position(|i| *i == within)?;
        Some(octave * self.intervals.len() as i32 + step as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(notes: &[u8]) -> Chord {
        notes.iter().map(|n| Note::from_midi(*n)).collect()
    }

    #[test]
    fn chords_ignore_duplicates() {
        let c = chord(&[64, 60, 64]);
        assert_eq!(c.len(), 2);
        assert_eq!(
            c.notes().collect::<Vec<_>>(),
            vec![Note::from_midi(60), Note::from_midi(64)]
        );
        assert!(Chord::new().is_empty());
    }

    #[test]
    fn figure_pairs_truncate() {
        let v = Velocity::from_midi(80);
        let figure = Figure {
            rhythm: (0..3).map(|i| Strike::new(i * 100, 50, v)).collect(),
            melody: Melody(vec![chord(&[60]), chord(&[62])]),
            instrument: InstrumentId(0),
        };
        let pairs: Vec<_> = figure.pairs().map(|(s, _)| s.start_us).collect();
        assert_eq!(pairs, vec![0, 100]);
    }

    #[test]
    fn scale_degrees_round_trip() {
        let a_minor = Scale::minor(Note::from_midi(57));
        for degree in -10..20 {
            let note = a_minor.get(degree).unwrap();
            assert_eq!(a_minor.degree_of(note), Some(degree));
        }
        // F# is not in A minor
        assert_eq!(a_minor.degree_of(Note::from_midi(66)), None);
    }

    #[test]
    fn scale_out_of_range() {
        let c_major = Scale::major(Note::from_midi(60));
        assert_eq!(c_major.get(100), None);
        assert_eq!(c_major.get(-100), None);
    }

    #[test]
    #[should_panic(expected = "scale intervals must ascend from 0")]
    fn scale_rejects_unsorted_intervals() {
        Scale::new(Note::from_midi(60), vec![0, 4, 2]);
    }

    #[test]
    #[should_panic(expected = "scale intervals must ascend from 0")]
    fn scale_must_start_at_the_root() {
        Scale::new(Note::from_midi(60), vec![2, 4, 7]);
    }
}
