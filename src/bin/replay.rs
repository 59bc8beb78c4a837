// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! `replay` plays back a transcription printed at the end of a live session.

use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use structopt::StructOpt;

use syn_score::cli::{self, MainResult, PlaybackOpt};
use syn_score::literal;
use syn_score::note::Note;
use syn_score::player::Player;
use syn_score::score::{Composition, Instrument, Scale};
use syn_score::tempo::Tempo;

#[derive(Debug, StructOpt)]
#[structopt(name = "replay", about = "Play back a transcribed performance")]
struct Opt {
    /// File containing the `rhythm = ...;` and `melody = ...;` lines.
    #[structopt(parse(from_os_str))]
    transcription: PathBuf,

    #[structopt(long, default_value = "120", parse(try_from_str = cli::positive_u64))]
    bpm: u64,

    #[structopt(long, default_value = "4")]
    beats_per_measure: u64,

    /// General MIDI program, 1 to 128.
    #[structopt(long, default_value = "1")]
    patch: u8,

    #[structopt(long)]
    percussion: bool,

    /// Root of the major scale used by `n(...)` chords.
    #[structopt(long)]
    scale_root: Option<u8>,

    #[structopt(flatten)]
    playback: PlaybackOpt,
}

fn main() -> MainResult {
    let opt = Opt::from_args();
    opt.playback.init_logging()?;

    let tempo = Tempo::new(opt.bpm, opt.beats_per_measure);
    let scale = match opt.scale_root {
        Some(root) => Some(Scale::major(
            Note::try_from_midi(root.into()).ok_or("scale root must be below 128")?,
        )),
        None => None,
    };

    let text = std::fs::read_to_string(&opt.transcription)?;
    let transcription = literal::parse_transcription(&text, &tempo, scale.as_ref())?;
    info!(
        "replaying {} strikes from {}",
        transcription.rhythm.0.len(),
        opt.transcription.display()
    );

    let mut composition = Composition::new(tempo);
    let instrument = composition.add_instrument(if opt.percussion {
        Instrument::percussion(opt.patch)
    } else {
        Instrument::melodic(opt.patch)
    });
    composition.at_us(0, transcription.rhythm, transcription.melody, instrument);
    if let Some(scale) = scale {
        composition.set_scale(scale);
    }

    let mut player = Player::new(opt.playback.config());
    player.set_composition(Arc::new(composition));
    cli::perform(&mut player, opt.playback.output.as_deref())?;
    Ok(())
}
