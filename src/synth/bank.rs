// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Instrument programs and the banks that provide them.

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::envelope::Adsr;
use crate::note::Note;
use crate::oscillator::WaveShape;

/// How a voice sounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Program {
    pub shape: WaveShape,
    pub envelope: Adsr,
    /// Linear gain on top of the note velocity.
    pub gain: f64,
    /// Play at this frequency regardless of the note, as drums do.
    pub fixed_frequency: Option<f64>,
}

impl Program {
    const fn pitched(shape: WaveShape, envelope: Adsr, gain: f64) -> Self {
        Self {
            shape,
            envelope,
            gain,
            fixed_frequency: None,
        }
    }
}

pub trait Bank: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// A melodic program, numbered from 0 as on the wire.
    fn program(&self, program: u8) -> Program;

    /// The drum sound mapped to a note on the percussion channel.
    fn percussion(&self, note: Note) -> Program;
}

/// One entry per General MIDI family of eight programs.
const FAMILIES: [Program; 16] = [
    // piano
    Program::pitched(WaveShape::Triangle, Adsr::new(2.0, 400.0, 0.4, 300.0), 1.0),
    // chromatic percussion
    Program::pitched(WaveShape::Sine, Adsr::new(1.0, 600.0, 0.0, 200.0), 1.0),
    // organ
    Program::pitched(WaveShape::Square, Adsr::new(10.0, 0.0, 1.0, 50.0), 0.5),
    // guitar
    Program::pitched(WaveShape::Saw, Adsr::new(2.0, 800.0, 0.2, 200.0), 0.6),
    // bass
    Program::pitched(WaveShape::Triangle, Adsr::new(5.0, 200.0, 0.7, 100.0), 1.2),
    // strings
    Program::pitched(WaveShape::Saw, Adsr::new(150.0, 100.0, 0.9, 400.0), 0.5),
    // ensemble
    Program::pitched(WaveShape::Saw, Adsr::new(200.0, 200.0, 0.8, 600.0), 0.5),
    // brass
    Program::pitched(WaveShape::Square, Adsr::new(40.0, 100.0, 0.8, 150.0), 0.5),
    // reed
    Program::pitched(WaveShape::Square, Adsr::new(30.0, 50.0, 0.9, 100.0), 0.4),
    // pipe
    Program::pitched(WaveShape::Sine, Adsr::new(50.0, 50.0, 0.9, 150.0), 1.0),
    // synth lead
    Program::pitched(WaveShape::Saw, Adsr::new(5.0, 100.0, 0.8, 100.0), 0.6),
    // synth pad
    Program::pitched(WaveShape::Triangle, Adsr::new(400.0, 300.0, 0.8, 1000.0), 0.8),
    // synth effects
    Program::pitched(WaveShape::Square, Adsr::new(300.0, 500.0, 0.5, 1500.0), 0.4),
    // ethnic
    Program::pitched(WaveShape::Triangle, Adsr::new(2.0, 300.0, 0.3, 200.0), 1.0),
    // percussive
    Program::pitched(WaveShape::Sine, Adsr::new(1.0, 150.0, 0.0, 50.0), 1.2),
    // sound effects
    Program::pitched(WaveShape::Noise, Adsr::new(20.0, 300.0, 0.3, 300.0), 0.3),
];

/// A small bank compiled into the binary, always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinBank;

impl Bank for BuiltinBank {
    fn name(&self) -> &str {
        "builtin"
    }

    fn program(&self, program: u8) -> Program {
        FAMILIES[(program as usize / 8) % FAMILIES.len()]
    }

    fn percussion(&self, note: Note) -> Program {
        match note.to_midi() {
            // bass drums
            35 | 36 => Program {
                shape: WaveShape::Sine,
                envelope: Adsr::new(1.0, 180.0, 0.0, 20.0),
                gain: 1.5,
                fixed_frequency: Some(55.0),
            },
            // toms
            41 | 43 | 45 | 47 | 48 | 50 => Program {
                shape: WaveShape::Sine,
                envelope: Adsr::new(1.0, 250.0, 0.0, 30.0),
                gain: 1.2,
                fixed_frequency: Some(note.frequency() / 2.0),
            },
            // hi-hats and cymbals
            42 | 44 | 46 | 49 | 51 | 52 | 53 | 55 | 57 | 59 => Program {
                shape: WaveShape::Noise,
                envelope: Adsr::new(1.0, 120.0, 0.0, 40.0),
                gain: 0.25,
                fixed_frequency: Some(1.0),
            },
            // snares, claps and everything else
            _ => Program {
                shape: WaveShape::Noise,
                envelope: Adsr::new(1.0, 90.0, 0.0, 30.0),
                gain: 0.5,
                fixed_frequency: Some(1.0),
            },
        }
    }
}

/// A bank backed by a soundfont file.
///
/// Only the container and its name are read; the programs come from the
/// built-in table, so a soundfont changes which bank is reported, not how
/// it sounds.
#[derive(Debug, Clone)]
pub struct SoundFont {
    name: String,
    path: PathBuf,
}

impl SoundFont {
    /// Open a soundfont. A missing file surfaces as `io::ErrorKind::NotFound`,
    /// anything that is not a RIFF `sfbk` container as `io::ErrorKind::InvalidData`.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read(path)?;
        if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"sfbk" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a soundfont", path.display()),
            ));
        }

        let name = find_bank_name(&data[12..]).unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        debug!("loaded soundfont {:?} from {}", name, path.display());

        Ok(Self {
            name,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Iterate over the `(id, body)` pairs of a sequence of RIFF chunks.
fn chunks(mut data: &[u8]) -> impl Iterator<Item = (&[u8], &[u8])> {
    std::iter::from_fn(move || {
        if data.len() < 8 {
            return None;
        }
        let id = &data[0..4];
        let mut size = [0u8; 4];
        size.copy_from_slice(&data[4..8]);
        let size = u32::from_le_bytes(size) as usize;
        let end = 8usize.checked_add(size)?.min(data.len());
        let body = &data[8..end];
        // chunks are padded to an even size
        data = &data[(end + (size & 1)).min(data.len())..];
        Some((id, body))
    })
}

/// The `INAM` entry of the `LIST INFO` chunk.
fn find_bank_name(data: &[u8]) -> Option<String> {
    let info = chunks(data)
        .find(|(id, body)| *id == b"LIST" && body.starts_with(b"INFO"))
        .map(|(_, body)| &body[4..])?;
    let (_, name) = chunks(info).find(|(id, _)| *id == b"INAM")?;
    let name = name.split(|b| *b == 0).next().unwrap_or(&[]);
    let name = String::from_utf8_lossy(name).trim().to_owned();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

impl Bank for SoundFont {
    fn name(&self) -> &str {
        &self.name
    }

    fn program(&self, program: u8) -> Program {
        BuiltinBank.program(program)
    }

    fn percussion(&self, note: Note) -> Program {
        BuiltinBank.percussion(note)
    }
}

/// Supplies the bank used when a requested soundfont does not exist.
pub trait FallbackVoiceProvider: Send + Sync {
    fn fallback_bank(&self) -> Arc<dyn Bank>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinVoices;

impl FallbackVoiceProvider for BuiltinVoices {
    fn fallback_bank(&self) -> Arc<dyn Bank> {
        Arc::new(BuiltinBank)
    }
}
