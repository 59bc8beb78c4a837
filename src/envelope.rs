// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

/// An Attack-Decay-Sustain-Release envelope with times in milliseconds.
///
/// On a key press the amplitude rises from zero to one during `attack_ms`,
/// falls to `sustain` during `decay_ms` and stays there until the key is
/// released. It then fades to zero during `release_ms`.
///
/// # Example
///
/// ```
/// use syn_score::envelope::*;
///
/// let adsr = Adsr::new(250.0, 500.0, 0.75, 1000.0);
/// let mut eval = adsr.instantiate(4.0); // 4 samples per second
/// assert_eq!(eval.step(), 0.0);
/// assert_eq!(eval.step(), 1.0);
/// assert_eq!(eval.step(), 0.875);
/// assert_eq!(eval.step(), 0.75);
/// assert_eq!(eval.step(), 0.75);
/// eval.release();
/// assert_eq!(eval.step(), 0.75);
/// assert_eq!(eval.step(), 0.5625);
/// assert_eq!(eval.step(), 0.375);
/// assert_eq!(eval.step(), 0.1875);
/// assert!(eval.faded());
/// assert_eq!(eval.step(), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack_ms: f64,
    pub decay_ms: f64,
    pub sustain: f64,
    pub release_ms: f64,
}

impl Adsr {
    pub const fn new(attack_ms: f64, decay_ms: f64, sustain: f64, release_ms: f64) -> Self {
        Self {
            attack_ms,
            decay_ms,
            sustain,
            release_ms,
        }
    }

    pub fn instantiate(&self, sample_rate: f64) -> EvalAdsr {
        let samples = |ms: f64| (ms.max(0.0) * sample_rate / 1000.0).round() as usize;
        let mut eval = EvalAdsr {
            attack: samples(self.attack_ms),
            decay: samples(self.decay_ms),
            release: samples(self.release_ms),
            sustain: self.sustain,
            release_from: self.sustain,
            stage: Stage::Attack,
            position: 0,
        };
        eval.settle();
        eval
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Attack,
    Decay,
    Sustain,
    Release,
    Faded,
}

/// Sample-exact evaluation of an `Adsr` for one note.
#[derive(Debug, Clone)]
pub struct EvalAdsr {
    attack: usize,
    decay: usize,
    release: usize,
    sustain: f64,
    /// Level at the moment the note was released.
    release_from: f64,
    stage: Stage,
    /// Samples elapsed in the current stage.
    position: usize,
}

impl EvalAdsr {
    /// The gain of the current sample. Advances to the next sample.
    pub fn step(&mut self) -> f64 {
        let gain = self.gain();
        if self.stage != Stage::Sustain && self.stage != Stage::Faded {
            self.position += 1;
            self.settle();
        }
        gain
    }

    fn gain(&self) -> f64 {
        let progress = |len: usize| self.position as f64 / len as f64;
        match self.stage {
            Stage::Attack => progress(self.attack),
            Stage::Decay => 1.0 - progress(self.decay) * (1.0 - self.sustain),
            Stage::Sustain => self.sustain,
            Stage::Release => (1.0 - progress(self.release)) * self.release_from,
            Stage::Faded => 0.0,
        }
    }

    /// Move past every stage that is already over.
    fn settle(&mut self) {
        loop {
            let (len, next) = match self.stage {
                Stage::Attack => (self.attack, Stage::Decay),
                Stage::Decay => (self.decay, Stage::Sustain),
                Stage::Release => (self.release, Stage::Faded),
                Stage::Sustain if self.sustain == 0.0 => (0, Stage::Faded),
                Stage::Sustain | Stage::Faded => return,
            };
            if self.position < len {
                return;
            }
            self.stage = next;
            self.position = 0;
        }
    }

    pub fn released(&self) -> bool {
        matches!(self.stage, Stage::Release | Stage::Faded)
    }

    /// Start the release stage from the current level. Repeated calls have no effect.
    pub fn release(&mut self) {
        if !self.released() {
            self.release_from = self.gain();
            self.stage = Stage::Release;
            self.position = 0;
            self.settle();
        }
    }

    /// True once every following `step` returns zero.
    pub fn faded(&self) -> bool {
        self.stage == Stage::Faded
    }
}
