// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

use std::collections::VecDeque;
use std::rc::Rc;

use snafu::{OptionExt, Snafu};

use super::*;

/// Collects nodes and edges, then orders them for evaluation.
pub struct GraphBuilder {
    nodes: Vec<Box<dyn Node>>,
    edges: Vec<(OutputRef, InputRef)>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> NodeBuilder<'_> {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Box::new(node));
        NodeBuilder {
            graph_builder: self,
            node: id,
        }
    }

    /// Wire up the buffers and sort the nodes so that every node renders after
    /// all nodes feeding into it. Among independent nodes, lower ids go first.
    pub fn build(self, buffer_size: Sample, sample_rate: u32) -> Result<Graph, GraphBuildError> {
        let mut nodes: Vec<NodeHolder> = self
            .nodes
            .into_iter()
            .map(|node| NodeHolder::new(node, buffer_size))
            .collect();

        let mut indegree = vec![0usize; nodes.len()];
        let mut outgoing: Vec<Vec<NodeId>> = vec![Vec::new(); nodes.len()];

        for (output, input) in self.edges {
            let buffer = Rc::clone(
                nodes
                    .get(output.node.0)
                    .context(InvalidNode { node: output.node })?
                    .output_buffers
                    .get(output.index)
                    .context(InvalidOutput { output })?,
            );
            *nodes
                .get_mut(input.node.0)
                .context(InvalidNode { node: input.node })?
                .input_buffers
                .get_mut(input.index)
                .context(InvalidInput { input })? = buffer;

            if !outgoing[output.node.0].contains(&input.node) {
                outgoing[output.node.0].push(input.node);
                indegree[input.node.0] += 1;
            }
        }

        // Kahn's algorithm
        let mut ready: VecDeque<NodeId> = (0..nodes.len())
            .filter(|id| indegree[*id] == 0)
            .map(NodeId)
            .collect();
        let mut evaluation_order = Vec::with_capacity(nodes.len());

        while let Some(n) = ready.pop_front() {
            evaluation_order.push(n);
            let mut successors = std::mem::take(&mut outgoing[n.0]);
            successors.sort();
            for m in successors {
                indegree[m.0] -= 1;
                if indegree[m.0] == 0 {
                    ready.push_back(m);
                }
            }
        }

        snafu::ensure!(evaluation_order.len() == nodes.len(), Cycle);

        Ok(Graph {
            nodes,
            evaluation_order,
            time: 0,
            buffer_size,
            sample_rate,
        })
    }
}

#[derive(Debug, PartialEq, Snafu)]
pub enum GraphBuildError {
    #[snafu(display("There is a cycle in the graph"))]
    Cycle,
    #[snafu(display("Referenced node {:?} does not exist", node))]
    InvalidNode { node: NodeId },
    #[snafu(display("Referenced input {:?} does not exist", input))]
    InvalidInput { input: InputRef },
    #[snafu(display("Referenced output {:?} does not exist", output))]
    InvalidOutput { output: OutputRef },
}

/// Adds the connections of a freshly added node.
pub struct NodeBuilder<'a> {
    graph_builder: &'a mut GraphBuilder,
    node: NodeId,
}

impl<'a> NodeBuilder<'a> {
    /// Feed the output of this node with the given index to the input of another node.
    pub fn output_to(self, output_index: usize, input: InputRef) -> NodeBuilder<'a> {
        self.graph_builder
            .edges
            .push((self.node.output(output_index), input));
        self
    }

    /// Receive the output of another node at the given input of this node.
    pub fn input_from(self, input_index: usize, output: OutputRef) -> NodeBuilder<'a> {
        self.graph_builder
            .edges
            .push((output, self.node.input(input_index)));
        self
    }

    pub fn build(self) -> NodeId {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        inputs: usize,
        outputs: usize,
    }

    fn stub(inputs: usize, outputs: usize) -> Stub {
        Stub { inputs, outputs }
    }

    impl Node for Stub {
        fn num_inputs(&self) -> usize {
            self.inputs
        }
        fn num_outputs(&self) -> usize {
            self.outputs
        }
        fn render(&mut self, _rio: &RenderIo) {}
    }

    #[test]
    fn cycle_detection() {
        let mut b = GraphBuilder::new();
        let sink = b.add_node(stub(1, 0)).build();
        let split = b.add_node(stub(1, 2)).output_to(0, sink.input(0)).build();
        let join = b
            .add_node(stub(2, 1))
            .output_to(0, split.input(0))
            .input_from(1, split.output(1))
            .build();
        b.add_node(stub(0, 1)).output_to(0, join.input(0));

        assert_eq!(b.build(10, 100).err(), Some(GraphBuildError::Cycle));
    }

    #[test]
    fn sources_render_before_sinks() {
        let mut b = GraphBuilder::new();
        let sink = b.add_node(stub(1, 0)).build();
        let split = b.add_node(stub(1, 2)).build();
        let join = b
            .add_node(stub(2, 1))
            .output_to(0, sink.input(0))
            .input_from(0, split.output(1))
            .input_from(1, split.output(0))
            .build();
        let source = b.add_node(stub(0, 1)).output_to(0, split.input(0)).build();

        let graph = b.build(10, 100).unwrap();
        assert_eq!(graph.evaluation_order, vec![source, split, join, sink]);
    }

    #[test]
    fn independent_nodes_keep_id_order() {
        let mut b = GraphBuilder::new();
        let sink = b.add_node(stub(3, 0)).build();
        let c = b.add_node(stub(0, 1)).output_to(0, sink.input(2)).build();
        let a = b.add_node(stub(0, 1)).output_to(0, sink.input(0)).build();
        let d = b.add_node(stub(0, 1)).build();

        let graph = b.build(10, 100).unwrap();
        assert_eq!(graph.evaluation_order, vec![c, a, d, sink]);
    }

    #[test]
    fn invalid_references() {
        let mut b = GraphBuilder::new();
        let single = b.add_node(stub(1, 1)).build();
        b.add_node(stub(1, 1)).input_from(0, single.output(3));
        assert_eq!(
            b.build(10, 100).err(),
            Some(GraphBuildError::InvalidOutput {
                output: single.output(3)
            })
        );
    }

    #[test]
    fn outputs_are_shared_with_inputs() {
        let mut b = GraphBuilder::new();
        let source = b.add_node(Constant(0.5)).build();
        let gain = b
            .add_node(Gain::from_linear(2.0))
            .input_from(0, source.output(0))
            .build();

        let mut graph = b.build(4, 100).unwrap();
        graph.step();
        assert_eq!(graph.time(), 4);
        assert_eq!(graph.output(gain.output(0)).unwrap().peak(), 1.0);
        assert!(graph.output(gain.output(1)).is_none());
    }
}
