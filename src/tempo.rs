// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Converting musical time (beats and measures) into microseconds.

/// Tempo of a composition: how fast beats go by and how many of them make up a measure.
///
/// # Examples
///
/// ```
/// use syn_score::tempo::Tempo;
///
/// let tempo = Tempo::new(120, 4);
/// assert_eq!(tempo.us_per_beat(), 500_000);
/// assert_eq!(tempo.beat_to_us(1.5), 750_000);
/// assert_eq!(tempo.measure_to_us(2), 4_000_000);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tempo {
    beats_per_minute: u64,
    beats_per_measure: u64,
    us_per_beat: u64,
}

impl Tempo {
    /// # Panics
    ///
    /// If `beats_per_minute` is zero.
    pub fn new(beats_per_minute: u64, beats_per_measure: u64) -> Self {
        assert!(beats_per_minute > 0, "a tempo needs at least one beat per minute");
        Self {
            beats_per_minute,
            beats_per_measure,
            us_per_beat: 60_000_000 / beats_per_minute,
        }
    }

    pub fn beats_per_minute(&self) -> u64 {
        self.beats_per_minute
    }

    pub fn beats_per_measure(&self) -> u64 {
        self.beats_per_measure
    }

    pub fn us_per_beat(&self) -> u64 {
        self.us_per_beat
    }

    /// Offset or duration of a (possibly fractional) number of beats.
    /// Negative beats are clamped to zero.
    pub fn beat_to_us(&self, beat: f64) -> u64 {
        (beat * self.us_per_beat as f64).round().max(0.0) as u64
    }

    /// Start of the given measure, counting from zero.
    pub fn measure_to_us(&self, measure: u64) -> u64 {
        measure * self.beats_per_measure * self.us_per_beat
    }

    /// Inverse of `beat_to_us`, without any rounding.
    pub fn us_to_beats(&self, us: u64) -> f64 {
        us as f64 / self.us_per_beat as f64
    }
}
