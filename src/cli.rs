// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Shared command line handling for binaries that play a composition.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use structopt::StructOpt;

use crate::player::{Player, PlayerConfig, Transcription};
use crate::score::Composition;

pub type MainResult = Result<(), Box<dyn Error>>;

#[derive(Debug, StructOpt)]
pub struct PlaybackOpt {
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    pub verbose: usize,

    /// Output file (any sox-supported format). Music is played directly if not given.
    #[structopt(short, long, parse(from_os_str))]
    pub output: Option<PathBuf>,

    /// Silence in milliseconds before the first note.
    #[structopt(long, default_value = "2000")]
    pub start_delay_ms: u64,

    /// Milliseconds to keep rendering after the last note ends.
    #[structopt(long, default_value = "2000")]
    pub idle_wait_ms: u64,

    #[structopt(long, default_value = "44100", parse(try_from_str = positive_u32))]
    pub sample_rate: u32,
}

/// Parse a number that must not be zero, for options that divide by it.
pub fn positive_u32(text: &str) -> Result<u32, String> {
    match text.parse::<u32>() {
        Ok(0) => Err("must be greater than zero".into()),
        Ok(value) => Ok(value),
        Err(err) => Err(err.to_string()),
    }
}

pub fn positive_u64(text: &str) -> Result<u64, String> {
    match text.parse::<u64>() {
        Ok(0) => Err("must be greater than zero".into()),
        Ok(value) => Ok(value),
        Err(err) => Err(err.to_string()),
    }
}

impl PlaybackOpt {
    pub fn config(&self) -> PlayerConfig {
        PlayerConfig {
            sample_rate: self.sample_rate,
            // 10ms blocks
            buffer_size: (self.sample_rate as usize / 100).max(1),
            start_delay_us: self.start_delay_ms * 1000,
            idle_wait_us: self.idle_wait_ms * 1000,
        }
    }

    pub fn init_logging(&self) -> Result<(), log::SetLoggerError> {
        let level = match self.verbose {
            0 => log::Level::Info,
            1 => log::Level::Debug,
            _ => log::Level::Trace,
        };
        simple_logger::init_with_level(level)
    }
}

/// Play through the speakers, or render to `output` if given.
pub fn perform(player: &mut Player, output: Option<&Path>) -> crate::player::Result<Option<Transcription>> {
    match output {
        Some(path) => {
            info!("rendering to {}", path.display());
            player.save_wave_file(path)
        }
        None => player.play(),
    }
}

/// Entry point for songs written as Rust programs.
pub fn song_main<F>(compose: F) -> MainResult
where
    F: FnOnce() -> Result<Composition, Box<dyn Error>>,
{
    let opt = PlaybackOpt::from_args();
    opt.init_logging()?;

    let composition = compose()?;
    let mut player = Player::new(opt.config());
    player.set_composition(Arc::new(composition));
    perform(&mut player, opt.output.as_deref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_to_config() {
        let opt = PlaybackOpt::from_iter(&["song", "-vv", "--start-delay-ms", "500", "--sample-rate", "48000"]);
        assert_eq!(opt.verbose, 2);
        assert_eq!(opt.output, None);
        assert_eq!(
            opt.config(),
            PlayerConfig {
                sample_rate: 48000,
                buffer_size: 480,
                start_delay_us: 500_000,
                idle_wait_us: 2_000_000,
            }
        );
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let err = PlaybackOpt::from_iter_safe(&["song", "--sample-rate", "0"]).unwrap_err();
        assert_eq!(err.kind, structopt::clap::ErrorKind::ValueValidation);
        assert!(PlaybackOpt::from_iter_safe(&["song", "--sample-rate", "fast"]).is_err());
        assert_eq!(positive_u64("120"), Ok(120));
        assert!(positive_u64("0").is_err());
    }

    #[test]
    fn defaults_match_player_defaults() {
        let opt = PlaybackOpt::from_iter(&["song"]);
        assert_eq!(opt.config(), PlayerConfig::default());
    }
}
