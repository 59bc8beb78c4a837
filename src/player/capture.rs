// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Live input: route messages to the audition instrument, log them and
//! reconstruct what was played.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use snafu::Snafu;

use super::engine::Clock;
use crate::literal;
use crate::midi::{MidiEvent, MidiMessage, PERCUSSION_CHANNEL};
use crate::note::{Note, Velocity};
use crate::score::{Chord, Melody, Rhythm, Scale, Strike};
use crate::synth::VoiceInbox;
use crate::tempo::Tempo;

/// A live message and the playback time it arrived at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturedMessage {
    pub message: MidiMessage,
    pub timestamp_us: u64,
}

/// Shared, append-only record of captured messages.
#[derive(Debug, Clone, Default)]
pub struct CaptureLog(Arc<Mutex<Vec<CapturedMessage>>>);

impl CaptureLog {
    pub fn push(&self, captured: CapturedMessage) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(captured)
    }

    pub fn snapshot(&self) -> Vec<CapturedMessage> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn unchanged(message: MidiMessage) -> MidiMessage {
    message
}

fn to_percussion(message: MidiMessage) -> MidiMessage {
    message.with_channel(PERCUSSION_CHANNEL)
}

/// Sits between an input device and the audition instrument:
/// remaps each message, logs it and forwards it for immediate playback.
#[derive(Clone)]
pub struct CaptureTap {
    remap: fn(MidiMessage) -> MidiMessage,
    log: CaptureLog,
    live: VoiceInbox,
    clock: Clock,
}

impl CaptureTap {
    /// Percussion instruments only sound on the percussion channel, so
    /// everything played on them is moved there.
    pub fn new(percussion: bool, live: VoiceInbox, clock: Clock) -> Self {
        Self {
            remap: if percussion { to_percussion } else { unchanged },
            log: CaptureLog::default(),
            live,
            clock,
        }
    }

    /// Handle a message arriving now.
    pub fn send(&self, message: MidiMessage) {
        self.send_at(message, self.clock.get())
    }

    /// Handle a message arriving at the given playback time.
    pub fn send_at(&self, message: MidiMessage, timestamp_us: u64) {
        let message = (self.remap)(message);
        debug!("captured {:?} at {}us", message, timestamp_us);
        self.log.push(CapturedMessage {
            message,
            timestamp_us,
        });
        self.live.send_now(message);
    }

    pub fn log(&self) -> &CaptureLog {
        &self.log
    }
}

/// Rhythm and melody reconstructed from a capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcription {
    pub rhythm: Rhythm,
    pub melody: Melody,
}

impl Transcription {
    /// Source text that recreates this transcription, one assignment per line.
    /// The melody is written in scale degrees if a scale is given and covers every note.
    pub fn to_code(&self, tempo: &Tempo, scale: Option<&Scale>) -> String {
        format!(
            "rhythm = {};\nmelody = {};",
            literal::rhythm_to_code(&self.rhythm, tempo),
            literal::melody_to_code(&self.melody, scale)
        )
    }
}

/// Pair note-ons with note-offs into strikes relative to the first note-on.
///
/// A repeated note-on replaces the pending one. Note-offs without a pending
/// note-on and note-ons never released are dropped. Timing is kept as played.
pub fn transcribe(log: &[CapturedMessage]) -> Transcription {
    let mut pending: BTreeMap<Note, (u64, Velocity)> = BTreeMap::new();
    let mut baseline = None;
    let mut transcription = Transcription::default();

    for captured in log {
        match captured.message.decode() {
            MidiEvent::NoteOn { note, velocity, .. } => {
                baseline.get_or_insert(captured.timestamp_us);
                pending.insert(note, (captured.timestamp_us, velocity));
            }
            MidiEvent::NoteOff { note, .. } => {
                if let Some((start, velocity)) = pending.remove(&note) {
                    let base = baseline.unwrap_or(start);
                    transcription.rhythm.0.push(Strike::new(
                        start.saturating_sub(base),
                        captured.timestamp_us.saturating_sub(start),
                        velocity,
                    ));
                    transcription.melody.0.push(Chord::single(note));
                }
            }
            MidiEvent::ProgramChange { .. } | MidiEvent::Other => {}
        }
    }
    transcription
}

#[derive(Debug, Snafu)]
pub enum MidiInputError {
    #[snafu(display("No MIDI input device is connected"))]
    NoDevice,
    #[snafu(display("MIDI input is unavailable: {}", message))]
    Unavailable { message: String },
}

/// An open input device. Dropping it without `close` may leave the device open.
pub trait InputConnection {
    fn close(self: Box<Self>);
}

/// Connects live input devices to a capture tap.
pub trait MidiInputProvider {
    fn open(&mut self, tap: CaptureTap) -> Result<Box<dyn InputConnection>, MidiInputError>;
}

/// Used when the crate is built without device support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMidiInput;

impl MidiInputProvider for NoMidiInput {
    fn open(&mut self, _tap: CaptureTap) -> Result<Box<dyn InputConnection>, MidiInputError> {
        NoDevice.fail()
    }
}

#[cfg(feature = "midi-input")]
pub use self::device::MidirInput;

#[cfg(feature = "midi-input")]
mod device {
    use log::info;
    use snafu::OptionExt;

    use super::*;

    /// Captures from the first MIDI input port.
    #[derive(Debug, Clone)]
    pub struct MidirInput {
        client_name: String,
    }

    impl Default for MidirInput {
        fn default() -> Self {
            Self {
                client_name: "syn-score".into(),
            }
        }
    }

    struct MidirConnection(midir::MidiInputConnection<()>);

    impl InputConnection for MidirConnection {
        fn close(self: Box<Self>) {
            self.0.close();
        }
    }

    impl MidiInputProvider for MidirInput {
        fn open(&mut self, tap: CaptureTap) -> Result<Box<dyn InputConnection>, MidiInputError> {
            let unavailable = |err: &dyn std::fmt::Display| MidiInputError::Unavailable {
                message: err.to_string(),
            };
            let mut input = midir::MidiInput::new(&self.client_name).map_err(|e| unavailable(&e))?;
            input.ignore(midir::Ignore::All);

            let ports = input.ports();
            let port = ports.first().context(NoDevice)?;
            let name = input
                .port_name(port)
                .unwrap_or_else(|_| "unnamed port".into());
            info!("capturing live input from {}", name);

            let connection = input
                .connect(
                    port,
                    "syn-score-capture",
                    move |_stamp, bytes, _| {
                        if let Some(message) = MidiMessage::from_bytes(bytes) {
                            tap.send(message);
                        }
                    },
                    (),
                )
                .map_err(|e| unavailable(&e))?;
            Ok(Box::new(MidirConnection(connection)))
        }
    }
}

/// The input provider matching the enabled features.
pub fn default_midi_input() -> Box<dyn MidiInputProvider> {
    #[cfg(feature = "midi-input")]
    {
        Box::new(MidirInput::default())
    }
    #[cfg(not(feature = "midi-input"))]
    {
        info!("built without live input support");
        Box::new(NoMidiInput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(note: u8, velocity: u8, ts: u64) -> CapturedMessage {
        CapturedMessage {
            message: MidiMessage::note_on(0, Note::from_midi(note), Velocity::from_midi(velocity)),
            timestamp_us: ts,
        }
    }

    fn off(note: u8, ts: u64) -> CapturedMessage {
        CapturedMessage {
            message: MidiMessage::note_off(0, Note::from_midi(note), Velocity::MIN),
            timestamp_us: ts,
        }
    }

    #[test]
    fn single_note() {
        let t = transcribe(&[on(64, 90, 1000), off(64, 1800)]);
        assert_eq!(t.rhythm.0, vec![Strike::new(0, 800, Velocity::from_midi(90))]);
        assert_eq!(t.melody.0, vec![Chord::single(Note::from_midi(64))]);
    }

    #[test]
    fn retrigger_keeps_latest_start() {
        let t = transcribe(&[on(60, 50, 100), on(60, 70, 150), off(60, 200), off(60, 300)]);
        assert_eq!(t.rhythm.0, vec![Strike::new(50, 50, Velocity::from_midi(70))]);
        assert_eq!(t.melody.0.len(), 1);
    }

    #[test]
    fn unmatched_messages_are_dropped() {
        let t = transcribe(&[off(62, 10), on(60, 80, 20), on(67, 80, 30), off(60, 60)]);
        assert_eq!(t.rhythm.0, vec![Strike::new(0, 40, Velocity::from_midi(80))]);
        assert_eq!(t.melody.0, vec![Chord::single(Note::from_midi(60))]);
    }

    #[test]
    fn silent_note_on_releases() {
        let release = CapturedMessage {
            message: MidiMessage::from_bytes(&[0x90, 64, 0]).unwrap(),
            timestamp_us: 500,
        };
        let t = transcribe(&[on(64, 90, 100), release]);
        assert_eq!(t.rhythm.0, vec![Strike::new(0, 400, Velocity::from_midi(90))]);
    }

    #[test]
    fn empty_log() {
        assert_eq!(transcribe(&[]), Transcription::default());
    }

    #[test]
    fn tap_remaps_logs_and_forwards() {
        let live = VoiceInbox::new();
        let clock = Clock::default();
        let tap = CaptureTap::new(true, live.clone(), clock.clone());

        clock.set(2_500);
        tap.send(MidiMessage::note_on(3, Note::from_midi(38), Velocity::MAX));

        let logged = tap.log().snapshot();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].timestamp_us, 2_500);
        assert_eq!(logged[0].message.channel(), PERCUSSION_CHANNEL);

        let forwarded = live.take();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].message, logged[0].message);
        assert_eq!(forwarded[0].at_us, None);
    }

    #[test]
    fn melodic_tap_keeps_channel() {
        let tap = CaptureTap::new(false, VoiceInbox::new(), Clock::default());
        tap.send_at(MidiMessage::note_on(2, Note::from_midi(60), Velocity::MAX), 7);
        assert_eq!(tap.log().snapshot()[0].message.channel(), 2);
    }

    #[test]
    fn no_device_without_support() {
        let tap = CaptureTap::new(false, VoiceInbox::new(), Clock::default());
        assert!(matches!(
            NoMidiInput.open(tap),
            Err(MidiInputError::NoDevice)
        ));
    }
}
