// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use super::{Figure, Instrument, InstrumentId, Melody, Rhythm, Scale};
use crate::effect::EffectTransform;
use crate::tempo::Tempo;

/// A figure placed at an absolute offset from the start of the composition.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledFigure {
    pub figure: Figure,
    pub start_us: u64,
}

/// Sets the gain of one instrument from `timestamp_us` on, until the next event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainEvent {
    pub instrument: InstrumentId,
    pub timestamp_us: u64,
    pub gain: f64,
}

/// Everything the player needs to perform a piece.
///
/// Built up front through the mutators below and then handed to the player
/// behind an `Arc`, after which it is only read.
#[derive(Debug)]
pub struct Composition {
    tempo: Tempo,
    scale: Option<Scale>,
    instruments: Vec<Instrument>,
    figures: Vec<ScheduledFigure>,
    gain_events: Vec<GainEvent>,
    effects: BTreeMap<InstrumentId, Vec<Arc<dyn EffectTransform>>>,
    audition: Option<InstrumentId>,
}

impl Composition {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            tempo,
            scale: None,
            instruments: Vec::new(),
            figures: Vec::new(),
            gain_events: Vec::new(),
            effects: BTreeMap::new(),
            audition: None,
        }
    }

    pub fn add_instrument(&mut self, instrument: Instrument) -> InstrumentId {
        let id = InstrumentId(self.instruments.len());
        debug!("instrument {} is {:?}", id, instrument);
        self.instruments.push(instrument);
        id
    }

    pub fn instrument(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(id.0)
    }

    pub fn instruments(&self) -> impl Iterator<Item = (InstrumentId, &Instrument)> {
        self.instruments
            .iter()
            .enumerate()
            .map(|(index, instrument)| (InstrumentId(index), instrument))
    }

    /// Play a rhythm and melody on an instrument, starting at the given measure.
    pub fn at(
        &mut self,
        measure: u64,
        rhythm: Rhythm,
        melody: Melody,
        instrument: InstrumentId,
    ) -> &mut Self {
        let start_us = self.tempo.measure_to_us(measure);
        self.at_us(start_us, rhythm, melody, instrument)
    }

    /// Like `at`, but with an offset in microseconds.
    pub fn at_us(
        &mut self,
        start_us: u64,
        rhythm: Rhythm,
        melody: Melody,
        instrument: InstrumentId,
    ) -> &mut Self {
        self.figures.push(ScheduledFigure {
            figure: Figure {
                rhythm,
                melody,
                instrument,
            },
            start_us,
        });
        self
    }

    pub fn add_gain_event(
        &mut self,
        instrument: InstrumentId,
        timestamp_us: u64,
        gain: f64,
    ) -> &mut Self {
        self.gain_events.push(GainEvent {
            instrument,
            timestamp_us,
            gain,
        });
        self
    }

    /// Append an effect to the instrument's chain. Effects apply in the order they were added.
    pub fn add_effect(
        &mut self,
        instrument: InstrumentId,
        effect: impl EffectTransform + 'static,
    ) -> &mut Self {
        self.effects
            .entry(instrument)
            .or_insert_with(Vec::new)
            .push(Arc::new(effect));
        self
    }

    pub fn effects(&self, instrument: InstrumentId) -> &[Arc<dyn EffectTransform>] {
        self.effects
            .get(&instrument)
            .map(|chain| chain.as_slice())
            .unwrap_or(&[])
    }

    /// Route live input to this instrument and transcribe what is played on it.
    pub fn set_audition(&mut self, instrument: InstrumentId) -> &mut Self {
        self.audition = Some(instrument);
        self
    }

    pub fn audition(&self) -> Option<InstrumentId> {
        self.audition
    }

    pub fn set_scale(&mut self, scale: Scale) -> &mut Self {
        self.scale = Some(scale);
        self
    }

    pub fn scale(&self) -> Option<&Scale> {
        self.scale.as_ref()
    }

    pub fn tempo(&self) -> &Tempo {
        &self.tempo
    }

    pub fn figures(&self) -> &[ScheduledFigure] {
        &self.figures
    }

    pub fn gain_events(&self) -> &[GainEvent] {
        &self.gain_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Volume;

    #[test]
    fn equal_instruments_get_distinct_ids() {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let a = comp.add_instrument(Instrument::melodic(1));
        let b = comp.add_instrument(Instrument::melodic(1));
        assert_ne!(a, b);
        assert_eq!(comp.instrument(a), comp.instrument(b));
        assert_eq!(comp.instruments().count(), 2);
    }

    #[test]
    fn figures_at_measures() {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let piano = comp.add_instrument(Instrument::melodic(1));
        comp.at(2, Rhythm::default(), Melody::default(), piano)
            .at_us(5, Rhythm::default(), Melody::default(), piano);
        let starts: Vec<_> = comp.figures().iter().map(|f| f.start_us).collect();
        assert_eq!(starts, vec![4_000_000, 5]);
    }

    #[test]
    fn effect_chains_keep_registration_order() {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let piano = comp.add_instrument(Instrument::melodic(1));
        let drums = comp.add_instrument(Instrument::percussion(1));
        comp.add_effect(piano, Volume(-3.0))
            .add_effect(piano, Volume(-6.0));
        let chain: Vec<_> = comp
            .effects(piano)
            .iter()
            .map(|e| format!("{:?}", e))
            .collect();
        assert_eq!(chain, vec!["Volume(-3.0)", "Volume(-6.0)"]);
        assert!(comp.effects(drums).is_empty());
    }
}
