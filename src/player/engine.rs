// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The block loop driving an audio graph into a backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, warn};
use snafu::ResultExt;

use super::backend::Backend;
use super::{BuildGraph, Result, WriteOutput};
use crate::graph::{samples_to_us, Graph, GraphBuildError, OutputRef};

/// Time span of the block about to be (or just) rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub start_us: u64,
    pub end_us: u64,
}

/// Runs before each block is rendered.
pub type PreFrameHook = Box<dyn FnMut(&FrameInfo)>;

/// Runs after each block is rendered. Returning `true` ends playback.
pub type CompletionHook = Box<dyn FnMut(&FrameInfo) -> bool>;

pub trait Scheduler {
    fn start(&mut self);

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Render one block. Returns whether the scheduler is still running afterwards.
    fn step(&mut self) -> Result<bool>;

    fn current_time_us(&self) -> u64;

    fn buffer_size(&self) -> usize;

    fn register_pre_frame_hook(&mut self, hook: PreFrameHook);

    fn register_completion_hook(&mut self, hook: CompletionHook);
}

/// Playback position readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct Clock(Arc<AtomicU64>);

impl Clock {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, time_us: u64) {
        self.0.store(time_us, Ordering::Relaxed)
    }
}

/// A one-shot signal that playback is over.
#[derive(Debug, Default)]
pub struct Completion {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl Completion {
    /// Returns `true` only for the call that actually signaled.
    pub fn signal(&self) -> bool {
        let mut done = self
            .done
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *done {
            return false;
        }
        *done = true;
        self.condvar.notify_all();
        true
    }

    pub fn is_signaled(&self) -> bool {
        match self.done.lock() {
            Ok(done) => *done,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Block until signaled. A poisoned lock counts as completion.
    pub fn wait(&self) {
        let guard = match self.done.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("completion lock poisoned, assuming playback is over");
                return;
            }
        };
        if self.condvar.wait_while(guard, |done| !*done).is_err() {
            warn!("completion lock poisoned while waiting, assuming playback is over");
        }
    }
}

/// Signals the completion when dropped, so a panicking audio thread cannot leave waiters hanging.
pub struct CompletionGuard(Arc<Completion>);

impl CompletionGuard {
    pub fn new(completion: Arc<Completion>) -> Self {
        Self(completion)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.signal();
    }
}

/// Renders a graph block by block and writes the master output to a backend.
pub struct Engine<B> {
    graph: Graph,
    master: OutputRef,
    backend: B,
    running: bool,
    pre_frame_hooks: Vec<PreFrameHook>,
    completion_hooks: Vec<CompletionHook>,
    clock: Clock,
}

impl<B: Backend> Engine<B> {
    pub fn new(graph: Graph, master: OutputRef, backend: B, clock: Clock) -> Result<Self> {
        if graph.output(master).is_none() {
            return Err(GraphBuildError::InvalidOutput { output: master }).context(BuildGraph);
        }
        Ok(Self {
            graph,
            master,
            backend,
            running: false,
            pre_frame_hooks: Vec::new(),
            completion_hooks: Vec::new(),
            clock,
        })
    }

    /// Flush and close the backend.
    pub fn finish(&mut self) -> Result<()> {
        self.backend.finish().context(WriteOutput)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn next_frame(&self) -> FrameInfo {
        let sample_rate = self.graph.sample_rate();
        FrameInfo {
            start_us: samples_to_us(self.graph.time(), sample_rate),
            end_us: samples_to_us(self.graph.time() + self.graph.buffer_size(), sample_rate),
        }
    }
}

impl<B: Backend> Scheduler for Engine<B> {
    fn start(&mut self) {
        debug!("engine started");
        self.running = true;
    }

    fn stop(&mut self) {
        if self.running {
            debug!("engine stopped at {}us", self.clock.get());
        }
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn step(&mut self) -> Result<bool> {
        if !self.running {
            return Ok(false);
        }
        let frame = self.next_frame();
        for hook in self.pre_frame_hooks.iter_mut() {
            hook(&frame);
        }

        self.graph.step();
        if let Some(block) = self.graph.output(self.master) {
            self.backend.write_block(&block).context(WriteOutput)?;
        }
        self.clock.set(frame.end_us);

        let mut done = false;
        for hook in self.completion_hooks.iter_mut() {
            done |= hook(&frame);
        }
        if done {
            self.stop();
        }
        Ok(self.running)
    }

    fn current_time_us(&self) -> u64 {
        samples_to_us(self.graph.time(), self.graph.sample_rate())
    }

    fn buffer_size(&self) -> usize {
        self.graph.buffer_size()
    }

    fn register_pre_frame_hook(&mut self, hook: PreFrameHook) {
        self.pre_frame_hooks.push(hook);
    }

    fn register_completion_hook(&mut self, hook: CompletionHook) {
        self.completion_hooks.push(hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Constant, GraphBuilder};
    use crate::player::backend::NullBackend;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread;

    fn engine() -> Engine<NullBackend> {
        let mut b = GraphBuilder::new();
        let source = b.add_node(Constant(0.1)).build();
        let graph = b.build(10, 1000).unwrap();
        Engine::new(graph, source.output(0), NullBackend::default(), Clock::default()).unwrap()
    }

    #[test]
    fn hooks_see_consecutive_frames() {
        let mut engine = engine();
        let frames = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&frames);
        engine.register_pre_frame_hook(Box::new(move |f: &FrameInfo| seen.borrow_mut().push(*f)));
        engine.register_completion_hook(Box::new(|f: &FrameInfo| f.end_us >= 30_000));

        assert!(!engine.step().unwrap());
        engine.start();
        while engine.step().unwrap() {}

        assert!(!engine.is_running());
        assert_eq!(engine.current_time_us(), 30_000);
        assert_eq!(engine.backend().blocks(), 3);
        assert_eq!(
            *frames.borrow(),
            vec![
                FrameInfo { start_us: 0, end_us: 10_000 },
                FrameInfo { start_us: 10_000, end_us: 20_000 },
                FrameInfo { start_us: 20_000, end_us: 30_000 },
            ]
        );
    }

    #[test]
    fn invalid_master_output() {
        let graph = GraphBuilder::new().build(10, 1000).unwrap();
        let bogus = GraphBuilder::new().add_node(Constant(0.0)).build();
        assert!(Engine::new(graph, bogus.output(0), NullBackend::default(), Clock::default()).is_err());
    }

    #[test]
    fn completion_signals_once() {
        let completion = Arc::new(Completion::default());
        assert!(!completion.is_signaled());

        let waiter = {
            let completion = Arc::clone(&completion);
            thread::spawn(move || completion.wait())
        };
        assert!(completion.signal());
        assert!(!completion.signal());
        waiter.join().unwrap();
        assert!(completion.is_signaled());
    }

    #[test]
    fn guard_signals_on_panic() {
        let completion = Arc::new(Completion::default());
        let guard = CompletionGuard::new(Arc::clone(&completion));
        let result = thread::spawn(move || {
            let _guard = guard;
            panic!("audio thread died");
        })
        .join();
        assert!(result.is_err());
        completion.wait();
        assert!(completion.is_signaled());
    }
}
