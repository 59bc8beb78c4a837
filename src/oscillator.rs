// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

/// Position within one period of a wave, always in `[0, 1)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Phase(f64);

impl Phase {
    pub const ZERO: Phase = Phase(0.0);

    pub fn new(offset: f64) -> Phase {
        let wrapped = offset - offset.floor();
        // floor can round a tiny negative offset up to exactly 1.0
        Phase(if wrapped >= 1.0 { 0.0 } else { wrapped })
    }

    pub fn offset(self) -> f64 {
        self.0
    }

    pub fn step_frequency(self, frequency: f64, sample_rate: f64) -> Phase {
        Phase::new(self.0 + frequency / sample_rate)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaveShape {
    Sine,
    Square,
    Triangle,
    Saw,
    Noise,
}

impl WaveShape {
    /// Value of a periodic shape at the given phase. Noise is not periodic
    /// and is produced by the `Oscillator` instead.
    pub fn eval(self, phase: Phase) -> f64 {
        let offset = phase.offset();
        match self {
            WaveShape::Sine => (offset * 2.0 * std::f64::consts::PI).sin(),
            WaveShape::Square => {
                if offset < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveShape::Triangle => {
                if offset < 0.25 {
                    4.0 * offset
                } else if offset < 0.75 {
                    2.0 - 4.0 * offset
                } else {
                    4.0 * offset - 4.0
                }
            }
            WaveShape::Saw => 2.0 * offset - 1.0,
            WaveShape::Noise => 0.0,
        }
    }
}

/// Samples a wave shape at a fixed frequency.
#[derive(Debug, Clone)]
pub struct Oscillator {
    shape: WaveShape,
    frequency: f64,
    sample_rate: f64,
    phase: Phase,
    /// xorshift state for `WaveShape::Noise`
    noise: u64,
}

impl Oscillator {
    pub fn new(shape: WaveShape, sample_rate: f64, frequency: f64) -> Self {
        Self {
            shape,
            frequency,
            sample_rate,
            phase: Phase::ZERO,
            noise: 0x2545_f491_4f6c_dd1d ^ frequency.to_bits(),
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        let value = match self.shape {
            WaveShape::Noise => {
                self.noise ^= self.noise << 13;
                self.noise ^= self.noise >> 7;
                self.noise ^= self.noise << 17;
                (self.noise >> 11) as f64 / (1u64 << 52) as f64 - 1.0
            }
            shape => shape.eval(self.phase),
        };
        self.phase = self.phase.step_frequency(self.frequency, self.sample_rate);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_wraps() {
        assert_eq!(Phase::new(1.25).offset(), 0.25);
        assert_eq!(Phase::new(-0.25).offset(), 0.75);
        assert_eq!(Phase::new(3.0).offset(), 0.0);
    }

    #[test]
    fn square_wave_period() {
        let mut osc = Oscillator::new(WaveShape::Square, 4.0, 1.0);
        let samples: Vec<_> = (0..5).map(|_| osc.next_sample()).collect();
        assert_eq!(samples, vec![1.0, 1.0, -1.0, -1.0, 1.0]);
    }

    #[test]
    fn noise_stays_in_range() {
        let mut osc = Oscillator::new(WaveShape::Noise, 44100.0, 440.0);
        let samples: Vec<_> = (0..1000).map(|_| osc.next_sample()).collect();
        assert!(samples.iter().all(|s| (-1.0..1.0).contains(s)));
        assert!(samples.iter().any(|s| *s != samples[0]));
    }
}
