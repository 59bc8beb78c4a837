// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use snafu::{OptionExt, ResultExt};

use super::assemble::assemble;
use super::backend::Backend;
use super::capture::CaptureTap;
use super::engine::{Clock, Completion, Engine, FrameInfo, Scheduler};
use super::flatten::{flatten, NoteEvent};
use super::registry::{CustomInstrumentFactory, Degradation, Registry};
use super::{BuildGraph, NoteEventCallback, PlayerConfig, Result, UnknownInstrument};
use crate::graph::GraphContext;
use crate::score::Composition;
use crate::synth::FallbackVoiceProvider;

/// Everything a session needs from its player.
pub(crate) struct SessionContext {
    pub config: PlayerConfig,
    pub factory: Option<Arc<dyn CustomInstrumentFactory>>,
    pub fallback: Arc<dyn FallbackVoiceProvider>,
    pub note_callback: Option<NoteEventCallback>,
    pub completion: Arc<Completion>,
    pub clock: Clock,
}

/// Hands out note events in order as playback passes them.
struct NoteCursor {
    events: Vec<NoteEvent>,
    next: usize,
}

impl NoteCursor {
    fn deliver_until(&mut self, end_us: u64, mut deliver: impl FnMut(&NoteEvent)) {
        while let Some(event) = self.events.get(self.next) {
            if event.timestamp_us >= end_us {
                break;
            }
            deliver(event);
            self.next += 1;
        }
    }
}

/// One performance of a composition, from prepared graph to finished output.
pub struct Session<B: Backend> {
    engine: Engine<B>,
    capture: Option<CaptureTap>,
    degradations: Vec<Degradation>,
    completion: Arc<Completion>,
    idle_time_us: u64,
}

impl<B: Backend> Session<B> {
    /// Realize the instruments, schedule every note and build the graph.
    pub(crate) fn prepare(
        composition: &Composition,
        context: SessionContext,
        backend: B,
    ) -> Result<Self> {
        let config = &context.config;
        let flat = flatten(composition, config.start_delay_us, config.idle_wait_us);
        let mut graph = GraphContext::new(config.sample_rate, config.buffer_size);
        let mut registry = Registry::new(
            composition,
            context.factory.clone(),
            Arc::clone(&context.fallback),
        );

        for scheduled in composition.figures() {
            registry.resolve(scheduled.figure.instrument, &mut graph)?;
        }
        for event in &flat.events {
            registry
                .resolve(event.instrument, &mut graph)?
                .inbox
                .send(event.message, Some(event.timestamp_us));
        }

        let capture = match composition.audition() {
            Some(id) => {
                let instrument = composition
                    .instrument(id)
                    .context(UnknownInstrument { id })?;
                let live = registry.resolve(id, &mut graph)?.inbox.clone();
                info!("capturing live input on instrument {}", id);
                Some(CaptureTap::new(
                    instrument.is_percussion(),
                    live,
                    context.clock.clone(),
                ))
            }
            None => None,
        };

        for event in composition.gain_events() {
            registry
                .resolve(event.instrument, &mut graph)?
                .gain_events
                .push((event.timestamp_us + config.start_delay_us, event.gain));
        }

        let (mut realized, degradations) = registry.into_parts();
        let bus = assemble(composition, &mut graph, &mut realized, config.start_delay_us);
        let graph = graph.build().context(BuildGraph)?;
        let mut engine = Engine::new(graph, bus.output, backend, context.clock.clone())?;

        let start_delay_us = config.start_delay_us;
        let mute = bus.mute;
        engine.register_pre_frame_hook(Box::new(move |frame: &FrameInfo| {
            // the master gain keeps the samples before the delay silent
            if mute.is_muted() && frame.end_us > start_delay_us {
                info!("unmuting at {}us", start_delay_us.max(frame.start_us));
                mute.set_muted(false);
            }
        }));

        if let Some(callback) = context.note_callback.clone() {
            let mut cursor = NoteCursor {
                events: flat.events.clone(),
                next: 0,
            };
            engine.register_pre_frame_hook(Box::new(move |frame: &FrameInfo| {
                cursor.deliver_until(frame.end_us, |event| (*callback)(event))
            }));
        }

        let idle_time_us = flat.idle_time_us;
        let completion = Arc::clone(&context.completion);
        engine.register_completion_hook(Box::new(move |frame: &FrameInfo| {
            if frame.end_us < idle_time_us {
                return false;
            }
            if completion.signal() {
                info!("reached the end at {}us", frame.end_us);
            }
            true
        }));

        debug!(
            "prepared {} instruments, {} note events",
            realized.len(),
            flat.events.len()
        );
        engine.start();

        Ok(Self {
            engine,
            capture,
            degradations,
            completion: context.completion,
            idle_time_us,
        })
    }

    /// Render until the end, a stop request or an error. Always finishes the
    /// backend and signals completion.
    pub(crate) fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        let rendered = loop {
            if stop.load(Ordering::SeqCst) {
                info!("stop requested");
                break Ok(());
            }
            match self.engine.step() {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.engine.stop();
        let finished = self.engine.finish();
        self.completion.signal();
        rendered.and(finished)
    }

    /// The live input tap, if the composition has an audition instrument.
    pub fn take_capture_tap(&mut self) -> Option<CaptureTap> {
        self.capture.take()
    }

    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    /// Playback time at which the session ends by itself.
    pub fn idle_time_us(&self) -> u64 {
        self.idle_time_us
    }

    pub fn current_time_us(&self) -> u64 {
        self.engine.current_time_us()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiMessage;
    use crate::note::{Note, Velocity};
    use crate::player::backend::MemoryBackend;
    use crate::player::PlayerError;
    use crate::score::{Chord, Instrument, Melody, Rhythm, Strike};
    use crate::synth::BuiltinVoices;
    use crate::tempo::Tempo;
    use std::sync::Mutex;

    fn config() -> PlayerConfig {
        PlayerConfig {
            sample_rate: 1000,
            buffer_size: 10,
            start_delay_us: 50_000,
            idle_wait_us: 20_000,
        }
    }

    fn context(note_callback: Option<NoteEventCallback>) -> SessionContext {
        SessionContext {
            config: config(),
            factory: None,
            fallback: Arc::new(BuiltinVoices),
            note_callback,
            completion: Arc::new(Completion::default()),
            clock: Clock::default(),
        }
    }

    fn two_notes() -> Composition {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let organ = comp.add_instrument(Instrument::melodic(17));
        let v = Velocity::from_midi(100);
        comp.at_us(
            0,
            Rhythm(vec![Strike::new(0, 30_000, v), Strike::new(30_000, 30_000, v)]),
            Melody(vec![
                Chord::single(Note::from_midi(69)),
                Chord::single(Note::from_midi(72)),
            ]),
            organ,
        );
        comp
    }

    #[test]
    fn silent_during_start_delay() {
        let comp = two_notes();
        let recording = MemoryBackend::new();
        let mut session = Session::prepare(&comp, context(None), recording.clone()).unwrap();
        session.run(&AtomicBool::new(false)).unwrap();

        let samples = recording.samples();
        // last note-off at 110ms plus 20ms idle wait
        assert_eq!(session.idle_time_us(), 130_000);
        assert_eq!(samples.len(), 130);
        assert!(samples[..50].iter().all(|s| s.left == 0.0 && s.right == 0.0));
        assert!(samples[50..110].iter().any(|s| s.left != 0.0));
        assert_eq!(recording.finish_calls(), 1);
    }

    #[test]
    fn start_delay_inside_a_block_is_sample_accurate() {
        let comp = two_notes();
        let mut ctx = context(None);
        ctx.config.start_delay_us = 15_000;
        let recording = MemoryBackend::new();
        let mut session = Session::prepare(&comp, ctx, recording.clone()).unwrap();
        session.run(&AtomicBool::new(false)).unwrap();

        let samples = recording.samples();
        assert!(samples[..15].iter().all(|s| s.left == 0.0 && s.right == 0.0));
        assert!(samples[15..20].iter().any(|s| s.left != 0.0));
    }

    #[test]
    fn note_events_are_delivered_once_in_order() {
        let comp = two_notes();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: NoteEventCallback =
            Arc::new(move |event: &NoteEvent| sink.lock().unwrap().push(event.timestamp_us));

        let mut session =
            Session::prepare(&comp, context(Some(callback)), MemoryBackend::new()).unwrap();
        session.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![50_000, 80_000, 80_000, 110_000]
        );
    }

    #[test]
    fn stop_request_ends_early_and_completes() {
        let comp = two_notes();
        let ctx = context(None);
        let completion = Arc::clone(&ctx.completion);
        let recording = MemoryBackend::new();
        let mut session = Session::prepare(&comp, ctx, recording.clone()).unwrap();

        session.run(&AtomicBool::new(true)).unwrap();
        assert!(recording.samples().is_empty());
        assert!(completion.is_signaled());
        assert_eq!(recording.finish_calls(), 1);
    }

    #[test]
    fn gain_events_follow_the_start_delay() {
        let mut comp = two_notes();
        let organ = comp.figures()[0].figure.instrument;
        // mute the organ from composition time zero, i.e. 50ms into playback
        comp.add_gain_event(organ, 0, 0.0);
        let recording = MemoryBackend::new();
        let mut session = Session::prepare(&comp, context(None), recording.clone()).unwrap();
        session.run(&AtomicBool::new(false)).unwrap();
        assert!(recording.samples().iter().all(|s| s.left == 0.0));
    }

    #[test]
    fn audition_builds_a_capture_tap() {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let drums = comp.add_instrument(Instrument::percussion(1));
        comp.set_audition(drums);
        let mut session = Session::prepare(&comp, context(None), MemoryBackend::new()).unwrap();

        let tap = session.take_capture_tap().unwrap();
        tap.send_at(MidiMessage::note_on(0, Note::from_midi(36), Velocity::MAX), 0);
        assert_eq!(
            tap.log().snapshot()[0].message.channel(),
            crate::midi::PERCUSSION_CHANNEL
        );
        assert!(session.take_capture_tap().is_none());
    }

    #[test]
    fn missing_custom_factory_fails_before_playback() {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let custom = comp.add_instrument(Instrument::Custom(5));
        comp.at_us(0, Rhythm::default(), Melody::default(), custom);
        let recording = MemoryBackend::new();
        let result = Session::prepare(&comp, context(None), recording.clone());
        assert!(matches!(result, Err(PlayerError::NoCustomFactory { .. })));
        assert!(recording.samples().is_empty());
    }
}
