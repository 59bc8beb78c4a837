// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Effects rewire the tail of an instrument's signal chain.
//!
//! An effect receives the output that currently ends the chain, adds
//! whatever nodes it needs and returns the new end of the chain. A chain of
//! effects is a left fold over that operation.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;

use crate::graph::{Gain, GraphContext, Node, OutputRef, RenderIo};
use crate::wave::Stereo;

pub trait EffectTransform: Debug + Send + Sync {
    fn apply(&self, graph: &mut GraphContext, tail: OutputRef) -> OutputRef;
}

/// Apply the effects in order, each one extending the chain built so far.
pub fn apply_chain(
    effects: &[Arc<dyn EffectTransform>],
    graph: &mut GraphContext,
    source: OutputRef,
) -> OutputRef {
    effects
        .iter()
        .fold(source, |tail, effect| effect.apply(graph, tail))
}

/// Gain in decibels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume(pub f64);

impl EffectTransform for Volume {
    fn apply(&self, graph: &mut GraphContext, tail: OutputRef) -> OutputRef {
        graph
            .add_node(Gain::from_decibels(self.0))
            .input_from(0, tail)
            .build()
            .output(0)
    }
}

/// Stereo balance from -1.0 (left) to 1.0 (right).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pan(pub f64);

impl EffectTransform for Pan {
    fn apply(&self, graph: &mut GraphContext, tail: OutputRef) -> OutputRef {
        graph
            .add_node(Panner {
                pan: self.0.max(-1.0).min(1.0),
            })
            .input_from(0, tail)
            .build()
            .output(0)
    }
}

struct Panner {
    pan: f64,
}

impl Node for Panner {
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
            *o = i.panned(self.pan);
        }
    }
}

/// A feedback delay: the signal repeats every `delay_ms`, each time
/// scaled by `feedback`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Echo {
    pub delay_ms: f64,
    pub feedback: f64,
}

impl EffectTransform for Echo {
    fn apply(&self, graph: &mut GraphContext, tail: OutputRef) -> OutputRef {
        let delay = (self.delay_ms.max(0.0) * graph.sample_rate() as f64 / 1000.0).round() as usize;
        graph
            .add_node(DelayLine::new(delay.max(1), self.feedback))
            .input_from(0, tail)
            .build()
            .output(0)
    }
}

struct DelayLine {
    line: VecDeque<Stereo<f64>>,
    feedback: f64,
}

impl DelayLine {
    fn new(delay: usize, feedback: f64) -> Self {
        Self {
            line: std::iter::repeat(Stereo::mono(0.0)).take(delay).collect(),
            feedback,
        }
    }
}

impl Node for DelayLine {
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
            let delayed = self.line.pop_front().unwrap_or_else(|| Stereo::mono(0.0));
            let out = *i + delayed * self.feedback;
            self.line.push_back(out);
            *o = out;
        }
    }
}
