// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! A graph describes the audio equipment. Nodes render one block of samples
//! at a time, reading the output buffers of the nodes feeding into them.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::wave::AudioBuffer;

mod builder;
mod transducers;

pub use builder::{GraphBuildError, GraphBuilder, NodeBuilder};
pub use transducers::*;

/// Time measured in samples.
pub type Sample = usize;

/// Convert a sample count to microseconds, rounding down.
///
/// ```
/// use syn_score::graph::*;
///
/// assert_eq!(samples_to_us(441, 44100), 10_000);
/// assert_eq!(us_to_samples(2_000_000, 44100), 88200);
/// ```
pub fn samples_to_us(samples: Sample, sample_rate: u32) -> u64 {
    samples as u64 * 1_000_000 / sample_rate as u64
}

/// Convert microseconds to a sample count, rounding down.
pub fn us_to_samples(us: u64, sample_rate: u32) -> Sample {
    (us * sample_rate as u64 / 1_000_000) as Sample
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct NodeId(usize);

impl NodeId {
    pub fn input(self, index: usize) -> InputRef {
        InputRef { node: self, index }
    }

    pub fn output(self, index: usize) -> OutputRef {
        OutputRef { node: self, index }
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct InputRef {
    node: NodeId,
    index: usize,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct OutputRef {
    node: NodeId,
    index: usize,
}

impl OutputRef {
    pub fn node(self) -> NodeId {
        self.node
    }
}

pub struct Graph {
    nodes: Vec<NodeHolder>,
    evaluation_order: Vec<NodeId>,
    time: Sample,
    buffer_size: Sample,
    sample_rate: u32,
}

impl Graph {
    /// Render the next block on every node, sources first.
    pub fn step(&mut self) {
        for id in self.evaluation_order.iter() {
            let holder = &mut self.nodes[id.0];

            let rio = RenderIo {
                start: self.time,
                length: self.buffer_size,
                sample_rate: self.sample_rate,
                inputs: &holder.input_buffers,
                outputs: &holder.output_buffers,
            };
            holder.node.render(&rio);
        }
        self.time += self.buffer_size;
    }

    /// The buffer most recently rendered to an output.
    pub fn output(&self, output: OutputRef) -> Option<Ref<'_, AudioBuffer>> {
        self.nodes
            .get(output.node.0)?
            .output_buffers
            .get(output.index)
            .map(|buffer| buffer.borrow())
    }

    /// Number of samples rendered so far.
    pub fn time(&self) -> Sample {
        self.time
    }

    pub fn buffer_size(&self) -> Sample {
        self.buffer_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

struct NodeHolder {
    node: Box<dyn Node>,
    input_buffers: Vec<Rc<RefCell<AudioBuffer>>>,
    output_buffers: Vec<Rc<RefCell<AudioBuffer>>>,
}

impl NodeHolder {
    fn new(node: Box<dyn Node>, buffer_size: Sample) -> Self {
        // Unconnected inputs keep reading this silent buffer.
        let input_buffers =
            std::iter::repeat_with(|| Rc::new(RefCell::new(AudioBuffer::new(buffer_size))))
                .take(node.num_inputs())
                .collect();
        let output_buffers =
            std::iter::repeat_with(|| Rc::new(RefCell::new(AudioBuffer::new(buffer_size))))
                .take(node.num_outputs())
                .collect();

        Self {
            node,
            input_buffers,
            output_buffers,
        }
    }
}

pub trait Node {
    fn num_inputs(&self) -> usize;

    fn num_outputs(&self) -> usize;

    fn render(&mut self, rio: &RenderIo);
}

/// References to inputs and outputs while rendering a node.
pub struct RenderIo<'a> {
    /// Sample time of the first sample in these buffers.
    start: Sample,
    /// Number of samples in these buffers
    length: Sample,
    sample_rate: u32,
    inputs: &'a [Rc<RefCell<AudioBuffer>>],
    outputs: &'a [Rc<RefCell<AudioBuffer>>],
}

impl<'a> RenderIo<'a> {
    pub fn start(&self) -> Sample {
        self.start
    }

    pub fn length(&self) -> Sample {
        self.length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Time of the first sample of this block in microseconds.
    pub fn start_us(&self) -> u64 {
        samples_to_us(self.start, self.sample_rate)
    }

    /// Time just past the last sample of this block in microseconds.
    pub fn end_us(&self) -> u64 {
        samples_to_us(self.start + self.length, self.sample_rate)
    }

    pub fn input(&self, index: usize) -> Ref<AudioBuffer> {
        self.inputs[index].borrow()
    }

    pub fn output(&self, index: usize) -> std::cell::RefMut<AudioBuffer> {
        self.outputs[index].borrow_mut()
    }
}

/// A graph under construction together with the audio settings it will run with.
/// This is what instruments and effects add their nodes to.
pub struct GraphContext {
    builder: GraphBuilder,
    sample_rate: u32,
    buffer_size: Sample,
}

impl GraphContext {
    pub fn new(sample_rate: u32, buffer_size: Sample) -> Self {
        Self {
            builder: GraphBuilder::new(),
            sample_rate,
            buffer_size,
        }
    }

    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> NodeBuilder<'_> {
        self.builder.add_node(node)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> Sample {
        self.buffer_size
    }

    pub fn build(self) -> Result<Graph, GraphBuildError> {
        self.builder.build(self.buffer_size, self.sample_rate)
    }
}
