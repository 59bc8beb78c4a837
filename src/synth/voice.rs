// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! A polyphonic synthesizer voice playing programs from a `Bank`.

use std::sync::Arc;

use log::trace;

use super::bank::{Bank, Program};
use super::{MessageQueue, VoiceInbox};
use crate::envelope::EvalAdsr;
use crate::graph::{Node, RenderIo};
use crate::midi::{MidiEvent, PERCUSSION_CHANNEL};
use crate::note::{Note, Velocity};
use crate::oscillator::Oscillator;
use crate::wave::Stereo;

/// Keeps the sum of a few loud notes away from clipping.
const HEADROOM: f64 = 0.2;

pub struct SynthVoice {
    bank: Arc<dyn Bank>,
    queue: MessageQueue,
    /// Current program of each MIDI channel.
    programs: [u8; 16],
    active_notes: Vec<NoteState>,
}

impl SynthVoice {
    pub fn new(bank: Arc<dyn Bank>, inbox: VoiceInbox) -> Self {
        Self {
            bank,
            queue: MessageQueue::new(inbox),
            programs: [0; 16],
            active_notes: Vec::new(),
        }
    }

    fn play_note(&mut self, delay: usize, channel: u8, note: Note, velocity: Velocity, sample_rate: f64) {
        let program = if channel == PERCUSSION_CHANNEL {
            self.bank.percussion(note)
        } else {
            self.bank.program(self.programs[channel as usize])
        };
        trace!("play {:?} on channel {} in {} samples", note, channel, delay);
        self.active_notes
            .push(NoteState::new(&program, note, channel, velocity, delay, sample_rate));
    }

    /// Release the oldest sounding instance of the note.
    fn release_note(&mut self, delay: usize, channel: u8, note: Note) {
        if let Some(state) = self
            .active_notes
            .iter_mut()
            .find(|n| n.note == note && n.channel == channel && n.release_delay.is_none())
        {
            state.release_delay = Some(delay.max(state.play_delay));
        }
    }
}

impl Node for SynthVoice {
    fn num_inputs(&self) -> usize {
        0
    }
    fn num_outputs(&self) -> usize {
        1
    }
    fn render(&mut self, rio: &RenderIo) {
        let sample_rate = rio.sample_rate() as f64;
        for (offset, message) in self.queue.due(rio) {
            match message.decode() {
                MidiEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                } => self.play_note(offset, channel, note, velocity, sample_rate),
                MidiEvent::NoteOff { channel, note, .. } => {
                    self.release_note(offset, channel, note)
                }
                MidiEvent::ProgramChange { channel, program } => {
                    self.programs[channel as usize] = program
                }
                MidiEvent::Other => trace!("ignoring {:?}", message),
            }
        }

        let mut output = rio.output(0);
        for out_sample in output.iter_mut() {
            let mut wave = Stereo::mono(0.0);
            for index in (0..self.active_notes.len()).rev() {
                if let Some(value) = self.active_notes[index].sample() {
                    wave += value;
                } else {
                    trace!("removing faded voice {:?}", self.active_notes[index].note);
                    self.active_notes.swap_remove(index);
                }
            }
            *out_sample = wave;
        }
    }
}

struct NoteState {
    note: Note,
    channel: u8,
    /// Samples until the note starts.
    play_delay: usize,
    /// Samples until the note is released, `None` while held.
    release_delay: Option<usize>,
    released: bool,
    oscillator: Oscillator,
    envelope: EvalAdsr,
    gain: f64,
}

impl NoteState {
    fn new(
        program: &Program,
        note: Note,
        channel: u8,
        velocity: Velocity,
        play_delay: usize,
        sample_rate: f64,
    ) -> Self {
        let frequency = program.fixed_frequency.unwrap_or_else(|| note.frequency());
        Self {
            note,
            channel,
            play_delay,
            release_delay: None,
            released: false,
            oscillator: Oscillator::new(program.shape, sample_rate, frequency),
            envelope: program.envelope.instantiate(sample_rate),
            gain: program.gain * velocity.as_f64() * HEADROOM,
        }
    }

    /// `None` once the note has faded.
    fn sample(&mut self) -> Option<Stereo<f64>> {
        if self.play_delay > 0 {
            self.play_delay -= 1;
            if let Some(delay) = self.release_delay.as_mut() {
                *delay = delay.saturating_sub(1);
            }
            return Some(Stereo::mono(0.0));
        }
        match self.release_delay {
            Some(0) if !self.released => {
                self.released = true;
                self.envelope.release();
            }
            Some(delay) if delay > 0 => self.release_delay = Some(delay - 1),
            _ => {}
        }

        if self.envelope.faded() {
            return None;
        }
        let level = self.envelope.step();
        Some(Stereo::mono(self.oscillator.next_sample() * level * self.gain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::midi::MidiMessage;
    use crate::synth::BuiltinBank;

    fn rendered_peaks(messages: &[(MidiMessage, u64)], blocks: usize) -> Vec<f64> {
        let inbox = VoiceInbox::new();
        for (msg, at) in messages {
            inbox.send(*msg, Some(*at));
        }
        let mut b = GraphBuilder::new();
        let voice = b
            .add_node(SynthVoice::new(Arc::new(BuiltinBank), inbox))
            .build();
        let mut graph = b.build(100, 1000).unwrap();
        (0..blocks)
            .map(|_| {
                graph.step();
                graph.output(voice.output(0)).unwrap().peak()
            })
            .collect()
    }

    #[test]
    fn silent_until_note_on_and_after_release() {
        let note = Note::from_midi(69);
        let peaks = rendered_peaks(
            &[
                (MidiMessage::note_on(0, note, Velocity::MAX), 150_000),
                (MidiMessage::note_off(0, note, Velocity::MAX), 250_000),
            ],
            10,
        );
        assert_eq!(peaks[0], 0.0);
        assert!(peaks[1] > 0.0);
        assert!(peaks[2] > 0.0);
        // piano releases within 300ms
        assert_eq!(peaks[9], 0.0);
    }

    #[test]
    fn note_off_without_note_on_is_harmless() {
        let note = Note::from_midi(60);
        let peaks = rendered_peaks(&[(MidiMessage::note_off(0, note, Velocity::MAX), 0)], 2);
        assert_eq!(peaks, vec![0.0, 0.0]);
    }

    #[test]
    fn percussion_decays_by_itself() {
        let kick = Note::from_midi(36);
        let peaks = rendered_peaks(
            &[(
                MidiMessage::note_on(PERCUSSION_CHANNEL, kick, Velocity::MAX),
                0,
            )],
            5,
        );
        assert!(peaks[0] > 0.0);
        assert_eq!(peaks[4], 0.0);
    }
}
