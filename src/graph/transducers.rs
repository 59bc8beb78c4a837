// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Nodes that transform the signal of other nodes.

use std::cell::Cell;
use std::rc::Rc;

use super::{samples_to_us, Node, RenderIo};
use crate::wave::Stereo;

/// Factor corresponding to a gain in decibels.
///
/// ```
/// # use syn_score::graph::from_decibels;
/// assert_eq!(from_decibels(10.0), 10.0);
/// assert_eq!(from_decibels(-20.0), 1.0 / 100.0);
/// ```
pub fn from_decibels(decibels: f64) -> f64 {
    10.0f64.powf(decibels / 10.0)
}

pub struct Gain {
    gain: f64,
}

impl Gain {
    pub fn from_linear(gain: f64) -> Self {
        Self { gain }
    }

    pub fn from_decibels(gain_db: f64) -> Self {
        Self::from_linear(from_decibels(gain_db))
    }
}

impl Node for Gain {
    fn num_inputs(&self) -> usize {
        1
    }
    fn num_outputs(&self) -> usize {
        1
    }
    fn render(&mut self, rio: &RenderIo) {
        let input = rio.input(0);
        let mut output = rio.output(0);

        for (i, o) in input.iter().zip(output.iter_mut()) {
            *o = *i * self.gain;
        }
    }
}

/// Mixes any number of inputs into one output.
pub struct Sum {
    inputs: usize,
}

impl Sum {
    pub fn new(inputs: usize) -> Self {
        Self { inputs }
    }
}

impl Node for Sum {
    fn num_inputs(&self) -> usize {
        self.inputs
    }
    fn num_outputs(&self) -> usize {
        1
    }
    fn render(&mut self, rio: &RenderIo) {
        let mut output = rio.output(0);
        output.fill_zero();
        for index in 0..self.inputs {
            let input = rio.input(index);
            for (i, o) in input.iter().zip(output.iter_mut()) {
                *o += *i;
            }
        }
    }
}

/// A piecewise constant gain curve over time in microseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GainEnvelope {
    /// `(timestamp_us, gain)`, sorted by time. Equal timestamps keep insertion order.
    points: Vec<(u64, f64)>,
}

impl GainEnvelope {
    pub fn new(mut points: Vec<(u64, f64)>) -> Self {
        points.sort_by_key(|(ts, _)| *ts);
        Self { points }
    }

    /// The gain of the latest point at or before `time_us`, or unity before the first point.
    ///
    /// ```
    /// # use syn_score::graph::GainEnvelope;
    /// let env = GainEnvelope::new(vec![(2_000_000, 0.5), (0, 1.0)]);
    /// assert_eq!(env.value_at(1_000_000), 1.0);
    /// assert_eq!(env.value_at(2_000_000), 0.5);
    /// assert_eq!(env.value_at(3_000_000), 0.5);
    /// ```
    pub fn value_at(&self, time_us: u64) -> f64 {
        let after = self.points.partition_point(|(ts, _)| *ts <= time_us);
        if after == 0 {
            1.0
        } else {
            self.points[after - 1].1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Applies a `GainEnvelope` sample by sample.
pub struct GainAutomation {
    envelope: GainEnvelope,
}

impl GainAutomation {
    pub fn new(envelope: GainEnvelope) -> Self {
        Self { envelope }
    }
}

impl Node for GainAutomation {
    fn num_inputs(&self) -> usize {
        1
    }
    fn num_outputs(&self) -> usize {
        1
    }
    fn render(&mut self, rio: &RenderIo) {
        let input = rio.input(0);
        let mut output = rio.output(0);

        for (offset, (i, o)) in input.iter().zip(output.iter_mut()).enumerate() {
            let now = samples_to_us(rio.start() + offset, rio.sample_rate());
            *o = *i * self.envelope.value_at(now);
        }
    }
}

/// Shared on/off switch for a `MasterGain` node, flipped from outside the graph.
#[derive(Clone, Debug)]
pub struct MuteSwitch(Rc<Cell<bool>>);

impl MuteSwitch {
    pub fn new(muted: bool) -> Self {
        Self(Rc::new(Cell::new(muted)))
    }

    pub fn set_muted(&self, muted: bool) {
        self.0.set(muted)
    }

    pub fn is_muted(&self) -> bool {
        self.0.get()
    }
}

/// The final stage of the mix: passes its input through unless muted.
/// Samples before `open_from_us` stay silent even after unmuting, so an
/// unmute in the middle of a block takes effect on the exact sample.
pub struct MasterGain {
    mute: MuteSwitch,
    open_from_us: u64,
}

impl MasterGain {
    pub fn new(mute: MuteSwitch, open_from_us: u64) -> Self {
        Self { mute, open_from_us }
    }
}

impl Node for MasterGain {
    fn num_inputs(&self) -> usize {
        1
    }
    fn num_outputs(&self) -> usize {
        1
    }
    fn render(&mut self, rio: &RenderIo) {
        let mut output = rio.output(0);
        if self.mute.is_muted() {
            output.fill_zero();
            return;
        }
        let input = rio.input(0);
        for (offset, (i, o)) in input.iter().zip(output.iter_mut()).enumerate() {
            let now = samples_to_us(rio.start() + offset, rio.sample_rate());
            *o = if now < self.open_from_us {
                Stereo::mono(0.0)
            } else {
                *i
            };
        }
    }
}

/// Emits the same value on both channels forever. Mostly useful for tests.
pub struct Constant(pub f64);

impl Node for Constant {
    fn num_inputs(&self) -> usize {
        0
    }
    fn num_outputs(&self) -> usize {
        1
    }
    fn render(&mut self, rio: &RenderIo) {
        rio.output(0)
            .iter_mut()
            .for_each(|s| *s = Stereo::mono(self.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    #[test]
    fn envelope_ties_keep_insertion_order() {
        let env = GainEnvelope::new(vec![(10, 0.2), (5, 0.1), (10, 0.3)]);
        assert_eq!(env.value_at(4), 1.0);
        assert_eq!(env.value_at(5), 0.1);
        assert_eq!(env.value_at(10), 0.3);
        assert!(GainEnvelope::default().value_at(123) == 1.0);
    }

    #[test]
    fn automation_switches_mid_block() {
        // 1000 samples per second, so one sample lasts 1000us
        let mut b = GraphBuilder::new();
        let source = b.add_node(Constant(1.0)).build();
        let auto = b
            .add_node(GainAutomation::new(GainEnvelope::new(vec![(2000, 0.5)])))
            .input_from(0, source.output(0))
            .build();
        let mut graph = b.build(4, 1000).unwrap();
        graph.step();

        let out = graph.output(auto.output(0)).unwrap();
        let left: Vec<_> = out.iter().map(|s| s.left).collect();
        assert_eq!(left, vec![1.0, 1.0, 0.5, 0.5]);
    }

    #[test]
    fn sum_and_mute() {
        let mut b = GraphBuilder::new();
        let x = b.add_node(Constant(0.25)).build();
        let y = b.add_node(Constant(0.5)).build();
        let sum = b
            .add_node(Sum::new(2))
            .input_from(0, x.output(0))
            .input_from(1, y.output(0))
            .build();
        let mute = MuteSwitch::new(true);
        let master = b
            .add_node(MasterGain::new(mute.clone(), 0))
            .input_from(0, sum.output(0))
            .build();
        let mut graph = b.build(8, 1000).unwrap();

        graph.step();
        assert_eq!(graph.output(sum.output(0)).unwrap().peak(), 0.75);
        assert_eq!(graph.output(master.output(0)).unwrap().peak(), 0.0);

        mute.set_muted(false);
        graph.step();
        assert_eq!(graph.output(master.output(0)).unwrap().peak(), 0.75);
    }

    #[test]
    fn master_opens_on_the_exact_sample() {
        let mut b = GraphBuilder::new();
        let source = b.add_node(Constant(1.0)).build();
        let mute = MuteSwitch::new(false);
        let master = b
            .add_node(MasterGain::new(mute, 6000))
            .input_from(0, source.output(0))
            .build();
        let mut graph = b.build(4, 1000).unwrap();

        graph.step();
        assert_eq!(graph.output(master.output(0)).unwrap().peak(), 0.0);
        graph.step();
        let out = graph.output(master.output(0)).unwrap();
        let left: Vec<_> = out.iter().map(|s| s.left).collect();
        assert_eq!(left, vec![0.0, 0.0, 1.0, 1.0]);
    }
}
