// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

pub mod cli;
pub mod effect;
pub mod envelope;
pub mod graph;
pub mod literal;
pub mod midi;
pub mod note;
pub mod oscillator;
pub mod player;
pub mod score;
pub mod synth;
pub mod tempo;
pub mod wave;
