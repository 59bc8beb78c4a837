// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Sound sources driven by MIDI messages.
//!
//! Every source node owns a `MessageQueue` fed through a `VoiceInbox`, which
//! can be shared with other threads, e.g. a live input device.

use std::sync::{Arc, Mutex};

use crate::graph::{us_to_samples, RenderIo, Sample};
use crate::midi::MidiMessage;

pub mod bank;
mod sampler;
mod voice;

pub use bank::{Bank, BuiltinBank, BuiltinVoices, FallbackVoiceProvider, Program, SoundFont};
pub use sampler::{Clip, SampleBank, SamplePlayer};
pub use voice::SynthVoice;

/// A message for a source node, either due at an absolute time or as soon as possible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledMessage {
    pub message: MidiMessage,
    pub at_us: Option<u64>,
}

/// Thread safe mailbox of a source node.
#[derive(Clone, Debug, Default)]
pub struct VoiceInbox(Arc<Mutex<Vec<ScheduledMessage>>>);

impl VoiceInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, message: MidiMessage, at_us: Option<u64>) {
        self.lock().push(ScheduledMessage { message, at_us });
    }

    /// Deliver at the start of the next rendered block.
    pub fn send_now(&self, message: MidiMessage) {
        self.send(message, None)
    }

    pub fn take(&self) -> Vec<ScheduledMessage> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ScheduledMessage>> {
        // A panic while holding the lock cannot leave a Vec half-pushed.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Turns the inbox contents into per-block deliveries.
pub(crate) struct MessageQueue {
    inbox: VoiceInbox,
    /// Timed messages not yet due, sorted by time.
    pending: Vec<ScheduledMessage>,
}

impl MessageQueue {
    pub fn new(inbox: VoiceInbox) -> Self {
        Self {
            inbox,
            pending: Vec::new(),
        }
    }

    /// Messages due in the block described by `rio`, with their sample offset into the block.
    /// Immediate messages come first, then timed messages in time order.
    pub fn due(&mut self, rio: &RenderIo) -> Vec<(Sample, MidiMessage)> {
        let mut due = Vec::new();
        let incoming = self.inbox.take();
        if !incoming.is_empty() {
            for msg in incoming {
                match msg.at_us {
                    None => due.push((0, msg.message)),
                    Some(_) => self.pending.push(msg),
                }
            }
            self.pending.sort_by_key(|msg| msg.at_us);
        }

        let end_us = rio.end_us();
        let ready = self
            .pending
            .iter()
            .take_while(|msg| msg.at_us.map_or(true, |at| at < end_us))
            .count();
        let last = rio.length().saturating_sub(1);
        for msg in self.pending.drain(..ready) {
            let at = us_to_samples(msg.at_us.unwrap_or(0), rio.sample_rate());
            due.push((at.saturating_sub(rio.start()).min(last), msg.message));
        }
        due
    }
}
