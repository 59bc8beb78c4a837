// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Realizes each instrument of a composition exactly once per session.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, warn};
use snafu::{OptionExt, ResultExt};

use super::{LoadSample, LoadSoundFont, NoCustomFactory, Result, UnknownInstrument};
use crate::graph::{GraphContext, NodeId, OutputRef};
use crate::midi::MidiMessage;
use crate::score::{Composition, Instrument, InstrumentId, MidiPatch, SampleMap};
use crate::synth::{
    Bank, Clip, FallbackVoiceProvider, SampleBank, SamplePlayer, SoundFont, SynthVoice,
    VoiceInbox,
};

/// The graph nodes standing in for one instrument during a session.
#[derive(Debug, Clone)]
pub struct RealizedInstrument {
    /// The node producing the instrument's sound.
    pub source: NodeId,
    /// Messages sent here reach `source`.
    pub inbox: VoiceInbox,
    /// End of the signal chain; effects are appended here.
    pub tail: OutputRef,
    /// `(timestamp_us, gain)` in playback time.
    pub gain_events: Vec<(u64, f64)>,
}

impl RealizedInstrument {
    /// An instrument whose chain starts at the first output of `source`.
    pub fn new(source: NodeId, inbox: VoiceInbox) -> Self {
        Self {
            source,
            inbox,
            tail: source.output(0),
            gain_events: Vec::new(),
        }
    }
}

/// Builds the nodes of `Instrument::Custom` instruments.
pub trait CustomInstrumentFactory: Send + Sync {
    fn create(&self, code: i32, graph: &mut GraphContext) -> Result<RealizedInstrument>;
}

/// Something that went wrong without stopping playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// The soundfont does not exist; the fallback bank plays instead.
    MissingSoundFont { path: PathBuf },
    /// Live input could not be opened; nothing is captured.
    NoMidiInput { reason: String },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::MissingSoundFont { path } => {
                write!(f, "soundfont {} not found, using fallback voices", path.display())
            }
            Degradation::NoMidiInput { reason } => write!(f, "no live input: {}", reason),
        }
    }
}

pub(crate) struct Registry<'c> {
    composition: &'c Composition,
    realized: BTreeMap<InstrumentId, RealizedInstrument>,
    banks: HashMap<PathBuf, Arc<dyn Bank>>,
    clips: HashMap<PathBuf, Rc<Clip>>,
    factory: Option<Arc<dyn CustomInstrumentFactory>>,
    fallback: Arc<dyn FallbackVoiceProvider>,
    degradations: Vec<Degradation>,
}

impl<'c> Registry<'c> {
    pub fn new(
        composition: &'c Composition,
        factory: Option<Arc<dyn CustomInstrumentFactory>>,
        fallback: Arc<dyn FallbackVoiceProvider>,
    ) -> Self {
        Self {
            composition,
            realized: BTreeMap::new(),
            banks: HashMap::new(),
            clips: HashMap::new(),
            factory,
            fallback,
            degradations: Vec::new(),
        }
    }

    /// The realized instrument for `id`, building it on first use.
    pub fn resolve(
        &mut self,
        id: InstrumentId,
        graph: &mut GraphContext,
    ) -> Result<&mut RealizedInstrument> {
        if !self.realized.contains_key(&id) {
            let composition = self.composition;
            let instrument = composition
                .instrument(id)
                .context(UnknownInstrument { id })?;
            let realized = self.realize(id, instrument, graph)?;
            debug!("realized instrument {} as {:?}", id, realized.source);
            self.realized.insert(id, realized);
        }
        self.realized
            .get_mut(&id)
            .context(UnknownInstrument { id })
    }

    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    pub fn into_parts(self) -> (BTreeMap<InstrumentId, RealizedInstrument>, Vec<Degradation>) {
        (self.realized, self.degradations)
    }

    fn realize(
        &mut self,
        id: InstrumentId,
        instrument: &Instrument,
        graph: &mut GraphContext,
    ) -> Result<RealizedInstrument> {
        match instrument {
            Instrument::Melodic(patch) | Instrument::Percussion(patch) => {
                self.realize_voice(patch, instrument.channel(), graph)
            }
            Instrument::SampleBank(samples) => self.realize_samples(samples, graph),
            Instrument::Custom(code) => {
                let factory = self
                    .factory
                    .as_ref()
                    .context(NoCustomFactory { id, code: *code })?;
                factory.create(*code, graph)
            }
        }
    }

    fn realize_voice(
        &mut self,
        patch: &MidiPatch,
        channel: u8,
        graph: &mut GraphContext,
    ) -> Result<RealizedInstrument> {
        let bank = match &patch.soundfont {
            Some(path) => self.soundfont(path)?,
            None => self.fallback.fallback_bank(),
        };
        let inbox = VoiceInbox::new();
        let source = graph.add_node(SynthVoice::new(bank, inbox.clone())).build();
        if patch.patch >= 1 {
            inbox.send_now(MidiMessage::program_change(channel, patch.patch - 1));
        }
        Ok(RealizedInstrument::new(source, inbox))
    }

    /// Load a soundfont once per session. A missing file degrades to the fallback bank.
    fn soundfont(&mut self, path: &Path) -> Result<Arc<dyn Bank>> {
        if let Some(bank) = self.banks.get(path) {
            return Ok(Arc::clone(bank));
        }
        let bank: Arc<dyn Bank> = match SoundFont::load(path) {
            Ok(soundfont) => Arc::new(soundfont),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "soundfont {} not found, falling back to built-in voices",
                    path.display()
                );
                self.degradations.push(Degradation::MissingSoundFont {
                    path: path.to_owned(),
                });
                self.fallback.fallback_bank()
            }
            Err(err) => return Err(err).context(LoadSoundFont { path }),
        };
        self.banks.insert(path.to_owned(), Arc::clone(&bank));
        Ok(bank)
    }

    fn realize_samples(
        &mut self,
        samples: &SampleMap,
        graph: &mut GraphContext,
    ) -> Result<RealizedInstrument> {
        let mut players = BTreeMap::new();
        for (note, info) in samples {
            let clip = self.clip(&info.path)?;
            let frames = match info.range_ms {
                Some((start, end)) => clip.slice_ms(start, end).prepare(graph.sample_rate(), info.gain),
                None => clip.prepare(graph.sample_rate(), info.gain),
            };
            players.insert(*note, SamplePlayer::new(frames));
        }
        let inbox = VoiceInbox::new();
        let source = graph
            .add_node(SampleBank::new(players, inbox.clone()))
            .build();
        Ok(RealizedInstrument::new(source, inbox))
    }

    fn clip(&mut self, path: &Path) -> Result<Rc<Clip>> {
        if let Some(clip) = self.clips.get(path) {
            return Ok(Rc::clone(clip));
        }
        let clip = Rc::new(Clip::load(path).context(LoadSample { path })?);
        self.clips.insert(path.to_owned(), Rc::clone(&clip));
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerError;
    use crate::synth::bank::tests::soundfont_bytes;
    use crate::synth::BuiltinVoices;
    use crate::tempo::Tempo;
    use std::fs;

    fn registry(composition: &Composition) -> Registry<'_> {
        Registry::new(composition, None, Arc::new(BuiltinVoices))
    }

    fn context() -> GraphContext {
        GraphContext::new(1000, 10)
    }

    #[test]
    fn resolves_each_id_once() {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let a = comp.add_instrument(Instrument::melodic(1));
        let b = comp.add_instrument(Instrument::melodic(1));
        let mut graph = context();
        let mut reg = registry(&comp);

        let first = reg.resolve(a, &mut graph).unwrap().source;
        let again = reg.resolve(a, &mut graph).unwrap().source;
        let other = reg.resolve(b, &mut graph).unwrap().source;
        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[test]
    fn sends_program_change_on_the_instrument_channel() {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let bass = comp.add_instrument(Instrument::melodic(34));
        let drums = comp.add_instrument(Instrument::percussion(1));
        let keep = comp.add_instrument(Instrument::melodic(0));
        let mut graph = context();
        let mut reg = registry(&comp);

        let sent = reg.resolve(bass, &mut graph).unwrap().inbox.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, MidiMessage::program_change(0, 33));
        assert_eq!(sent[0].at_us, None);

        let sent = reg.resolve(drums, &mut graph).unwrap().inbox.take();
        assert_eq!(sent[0].message, MidiMessage::program_change(9, 0));

        assert!(reg.resolve(keep, &mut graph).unwrap().inbox.take().is_empty());
    }

    #[test]
    fn missing_soundfont_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sf2");
        let mut comp = Composition::new(Tempo::new(120, 4));
        let piano = comp.add_instrument(Instrument::melodic(1).with_soundfont(&path));
        let organ = comp.add_instrument(Instrument::melodic(17).with_soundfont(&path));
        let mut graph = context();
        let mut reg = registry(&comp);

        reg.resolve(piano, &mut graph).unwrap();
        reg.resolve(organ, &mut graph).unwrap();
        assert_eq!(
            reg.degradations(),
            &[Degradation::MissingSoundFont { path }]
        );
    }

    #[test]
    fn corrupt_soundfont_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.sf2");
        fs::write(&path, b"definitely not a soundfont").unwrap();
        let mut comp = Composition::new(Tempo::new(120, 4));
        let piano = comp.add_instrument(Instrument::melodic(1).with_soundfont(&path));
        let mut graph = context();

        match registry(&comp).resolve(piano, &mut graph) {
            Err(PlayerError::LoadSoundFont { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected a soundfont error, got {:?}", other.map(|r| r.source)),
        }
    }

    #[test]
    fn soundfonts_are_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strings.sf2");
        fs::write(&path, soundfont_bytes("Strings")).unwrap();
        let mut comp = Composition::new(Tempo::new(120, 4));
        let a = comp.add_instrument(Instrument::melodic(49).with_soundfont(&path));
        let b = comp.add_instrument(Instrument::melodic(50).with_soundfont(&path));
        let mut graph = context();
        let mut reg = registry(&comp);

        reg.resolve(a, &mut graph).unwrap();
        fs::remove_file(&path).unwrap();
        // served from the cache, so the deleted file is not noticed
        reg.resolve(b, &mut graph).unwrap();
        assert!(reg.degradations().is_empty());
    }

    #[test]
    fn unreadable_sample_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut samples = SampleMap::new();
        samples.insert(
            crate::note::Note::from_midi(36),
            crate::score::SampleInfo::new(dir.path().join("kick.wav")),
        );
        let mut comp = Composition::new(Tempo::new(120, 4));
        let kit = comp.add_instrument(Instrument::SampleBank(samples));
        let mut graph = context();

        assert!(matches!(
            registry(&comp).resolve(kit, &mut graph),
            Err(PlayerError::LoadSample { .. })
        ));
    }

    struct Silence;

    impl CustomInstrumentFactory for Silence {
        fn create(&self, code: i32, graph: &mut GraphContext) -> Result<RealizedInstrument> {
            if code < 0 {
                return Err(PlayerError::CustomInstrument {
                    code,
                    message: "negative codes are reserved".into(),
                });
            }
            let source = graph.add_node(crate::graph::Constant(0.0)).build();
            Ok(RealizedInstrument::new(source, VoiceInbox::new()))
        }
    }

    #[test]
    fn custom_instruments_need_a_factory() {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let custom = comp.add_instrument(Instrument::Custom(42));
        let reserved = comp.add_instrument(Instrument::Custom(-1));
        let mut graph = context();

        assert!(matches!(
            registry(&comp).resolve(custom, &mut graph),
            Err(PlayerError::NoCustomFactory { code: 42, .. })
        ));

        let mut reg = Registry::new(&comp, Some(Arc::new(Silence)), Arc::new(BuiltinVoices));
        assert!(reg.resolve(custom, &mut graph).is_ok());
        assert!(matches!(
            reg.resolve(reserved, &mut graph),
            Err(PlayerError::CustomInstrument { code: -1, .. })
        ));
    }

    #[test]
    fn unknown_instrument() {
        let comp = Composition::new(Tempo::new(120, 4));
        let mut graph = context();
        assert!(matches!(
            registry(&comp).resolve(InstrumentId(3), &mut graph),
            Err(PlayerError::UnknownInstrument { .. })
        ));
    }
}
