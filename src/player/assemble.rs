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

use log::debug;

use super::registry::RealizedInstrument;
use crate::effect::apply_chain;
use crate::graph::{
    GainAutomation, GainEnvelope, GraphContext, MasterGain, MuteSwitch, OutputRef, Sum,
};
use crate::score::{Composition, InstrumentId};

/// The end of the mix and its mute switch.
pub(crate) struct MasterBus {
    pub output: OutputRef,
    pub mute: MuteSwitch,
}

/// Wire every realized instrument through its effects and gain automation
/// into a master bus that starts out muted and stays silent before `start_delay_us`.
pub(crate) fn assemble(
    composition: &Composition,
    graph: &mut GraphContext,
    realized: &mut BTreeMap<InstrumentId, RealizedInstrument>,
    start_delay_us: u64,
) -> MasterBus {
    let mut gains = Vec::with_capacity(realized.len());
    for (id, instrument) in realized.iter_mut() {
        let effects = composition.effects(*id);
        instrument.tail = apply_chain(effects, graph, instrument.tail);

        let envelope = GainEnvelope::new(instrument.gain_events.clone());
        let gain = graph
            .add_node(GainAutomation::new(envelope))
            .input_from(0, instrument.tail)
            .build();
        debug!(
            "instrument {}: {} effects, {} gain events",
            id,
            effects.len(),
            instrument.gain_events.len()
        );
        gains.push(gain.output(0));
    }

    let mut mixer = graph.add_node(Sum::new(gains.len()));
    for (index, gain) in gains.into_iter().enumerate() {
        mixer = mixer.input_from(index, gain);
    }
    let mixer = mixer.build();

    let mute = MuteSwitch::new(true);
    let master = graph
        .add_node(MasterGain::new(mute.clone(), start_delay_us))
        .input_from(0, mixer.output(0))
        .build();

    MasterBus {
        output: master.output(0),
        mute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Volume;
    use crate::graph::Constant;
    use crate::score::Instrument;
    use crate::synth::VoiceInbox;
    use crate::tempo::Tempo;

    #[test]
    fn mixes_effects_and_gain_into_muted_master() {
        let mut comp = Composition::new(Tempo::new(120, 4));
        let loud = comp.add_instrument(Instrument::Custom(0));
        let quiet = comp.add_instrument(Instrument::Custom(1));
        comp.add_effect(quiet, Volume(-10.0));

        let mut graph = GraphContext::new(1000, 10);
        let mut realized = BTreeMap::new();
        for (id, level) in [(loud, 0.5), (quiet, 1.0)].iter().copied() {
            let source = graph.add_node(Constant(level)).build();
            realized.insert(id, RealizedInstrument::new(source, VoiceInbox::new()));
        }
        // loud drops to half from 5ms on
        realized
            .get_mut(&loud)
            .unwrap()
            .gain_events
            .push((5_000, 0.5));

        let bus = assemble(&comp, &mut graph, &mut realized, 0);
        let output = bus.output;
        let mut graph = graph.build().unwrap();

        graph.step();
        assert_eq!(graph.output(output).unwrap().peak(), 0.0);

        bus.mute.set_muted(false);
        graph.step();
        let left: Vec<_> = graph.output(output).unwrap().iter().map(|s| s.left).collect();
        // 0.5 * 0.5 from the loud instrument plus 1.0 * 0.1 from the quiet one
        assert!(left.iter().all(|l| (l - 0.35).abs() < 1e-12));
    }
}
