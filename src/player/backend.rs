// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Where rendered blocks go.

use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::wave::{AudioBuffer, Stereo};

pub trait Backend {
    fn write_block(&mut self, block: &AudioBuffer) -> io::Result<()>;

    /// Called once after the last block.
    fn finish(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoxTarget {
    /// The default audio device, paced in real time by sox.
    Play,
    /// Any file format sox supports, written as fast as possible.
    File(PathBuf),
}

/// Streams `f64` stereo samples to a sox subprocess.
pub struct SoxBackend {
    child: Child,
    audio_stream: Option<ChildStdin>,
    buffer: Vec<u8>,
}

impl SoxBackend {
    pub fn new(sample_rate: u32, target: SoxTarget) -> io::Result<Self> {
        let sample_rate_str = sample_rate.to_string();
        let input_args = [
            "-R", // make the output reproducible
            "--channels",
            "2",
            "--rate",
            &sample_rate_str,
            "--type",
            "f64",
            "/dev/stdin",
        ];

        // A sox pinned at build time, e.g. by nix, wins over the one on the PATH.
        let (play, sox) = match option_env!("NIX_SOX_BIN") {
            Some(sox_bin) => {
                debug!("using sox from {}", sox_bin);
                (Path::new(sox_bin).join("play"), Path::new(sox_bin).join("sox"))
            }
            None => ("play".into(), "sox".into()),
        };

        let mut child = match &target {
            SoxTarget::Play => Command::new(&play)
                .args(&input_args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?,
            SoxTarget::File(outfile) => Command::new(&sox)
                .args(&input_args)
                .arg(outfile)
                .stdin(Stdio::piped())
                .spawn()?,
        };
        debug!("spawned sox for {:?}", target);

        let audio_stream = child.stdin.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "sox stdin is not piped")
        })?;

        Ok(Self {
            child,
            audio_stream: Some(audio_stream),
            buffer: Vec::new(),
        })
    }
}

impl Backend for SoxBackend {
    fn write_block(&mut self, block: &AudioBuffer) -> io::Result<()> {
        let stream = match self.audio_stream.as_mut() {
            Some(stream) => stream,
            None => return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sox already finished")),
        };
        if self.buffer.len() < block.byte_len() {
            self.buffer.resize(block.byte_len(), 0);
        }
        block.copy_bytes_to(&mut self.buffer);
        stream.write_all(&self.buffer[..block.byte_len()])?;
        stream.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        // sox exits once its input is closed
        drop(self.audio_stream.take());
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("sox failed with {}", status),
            ))
        }
    }
}

impl Drop for SoxBackend {
    // A backend dropped without `finish` still reaps its child.
    fn drop(&mut self) {
        if let Some(stream) = self.audio_stream.take() {
            drop(stream);
            if let Err(err) = self.child.wait() {
                warn!("could not wait for sox: {}", err);
            }
        }
    }
}

/// Discards audio, counting blocks.
#[derive(Debug, Default, Clone)]
pub struct NullBackend {
    blocks: usize,
    finished: bool,
}

impl NullBackend {
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Backend for NullBackend {
    fn write_block(&mut self, _block: &AudioBuffer) -> io::Result<()> {
        self.blocks += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recording {
    samples: Vec<Stereo<f64>>,
    finish_calls: usize,
}

/// Keeps every sample in memory. Clones share the recording, so a clone can
/// be inspected after the original was handed to the player.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend(Arc<Mutex<Recording>>);

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<Stereo<f64>> {
        self.lock().samples.clone()
    }

    pub fn finish_calls(&self) -> usize {
        self.lock().finish_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Backend for MemoryBackend {
    fn write_block(&mut self, block: &AudioBuffer) -> io::Result<()> {
        self.lock().samples.extend_from_slice(block.samples());
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.lock().finish_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_shares_its_recording() {
        let recording = MemoryBackend::new();
        let mut backend = recording.clone();
        let mut block = AudioBuffer::new(2);
        block.samples_mut()[1] = Stereo::new(0.5, -0.5);

        backend.write_block(&block).unwrap();
        backend.write_block(&block).unwrap();
        backend.finish().unwrap();

        assert_eq!(recording.samples().len(), 4);
        assert_eq!(recording.samples()[3], Stereo::new(0.5, -0.5));
        assert_eq!(recording.finish_calls(), 1);
    }

    #[test]
    fn null_backend_counts() {
        let mut backend = NullBackend::default();
        backend.write_block(&AudioBuffer::new(8)).unwrap();
        backend.finish().unwrap();
        assert_eq!(backend.blocks(), 1);
        assert!(backend.is_finished());
    }
}
