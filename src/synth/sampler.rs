// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! One-shot sample playback triggered by notes.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use log::{debug, trace};

use super::{MessageQueue, VoiceInbox};
use crate::graph::{Node, RenderIo};
use crate::midi::MidiEvent;
use crate::note::Note;
use crate::wave::Stereo;

/// Decoded audio of a sample file.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    frames: Vec<Stereo<f64>>,
    sample_rate: u32,
}

impl Clip {
    pub fn new(frames: Vec<Stereo<f64>>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    /// Decode a WAV file. Mono files play on both channels, channels beyond
    /// the second are dropped.
    pub fn load(path: &Path) -> Result<Self, hound::Error> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let values: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f64;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f64 / scale))
                    .collect::<Result<_, _>>()?
            }
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<Result<_, _>>()?,
        };

        let channels = spec.channels.max(1) as usize;
        let frames = values
            .chunks_exact(channels)
            .map(|frame| match frame {
                [mono] => Stereo::mono(*mono),
                [left, right, ..] => Stereo::new(*left, *right),
                [] => Stereo::mono(0.0),
            })
            .collect::<Vec<_>>();
        debug!(
            "loaded {} frames at {} Hz from {}",
            frames.len(),
            spec.sample_rate,
            path.display()
        );
        Ok(Self::new(frames, spec.sample_rate))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The excerpt between two times in milliseconds, clamped to the clip.
    pub fn slice_ms(&self, start_ms: f64, end_ms: f64) -> Clip {
        let frame = |ms: f64| {
            ((ms.max(0.0) * self.sample_rate as f64 / 1000.0).round() as usize).min(self.len())
        };
        let (start, end) = (frame(start_ms), frame(end_ms));
        Clip::new(
            self.frames[start..end.max(start)].to_vec(),
            self.sample_rate,
        )
    }

    /// Nearest-neighbour conversion to another sample rate, with a gain applied.
    pub fn prepare(&self, sample_rate: u32, gain: f64) -> Vec<Stereo<f64>> {
        if self.sample_rate == sample_rate || self.sample_rate == 0 {
            return self.frames.iter().map(|f| *f * gain).collect();
        }
        let ratio = self.sample_rate as f64 / sample_rate as f64;
        let length = (self.len() as f64 / ratio).floor() as usize;
        (0..length)
            .filter_map(|i| self.frames.get((i as f64 * ratio) as usize))
            .map(|f| *f * gain)
            .collect()
    }
}

/// A clip ready to be played at the graph's sample rate.
pub struct SamplePlayer {
    frames: Rc<Vec<Stereo<f64>>>,
}

impl SamplePlayer {
    pub fn new(frames: Vec<Stereo<f64>>) -> Self {
        Self {
            frames: Rc::new(frames),
        }
    }
}

/// Plays a clip whenever its trigger note is struck. Note-offs are ignored,
/// every clip plays to its end.
pub struct SampleBank {
    queue: MessageQueue,
    clips: BTreeMap<Note, SamplePlayer>,
    playing: Vec<Playback>,
}

struct Playback {
    frames: Rc<Vec<Stereo<f64>>>,
    delay: usize,
    position: usize,
}

impl SampleBank {
    pub fn new(clips: BTreeMap<Note, SamplePlayer>, inbox: VoiceInbox) -> Self {
        Self {
            queue: MessageQueue::new(inbox),
            clips,
            playing: Vec::new(),
        }
    }
}

impl Node for SampleBank {
    fn num_inputs(&self) -> usize {
        0
    }
    fn num_outputs(&self) -> usize {
        1
    }
    fn render(&mut self, rio: &RenderIo) {
        for (offset, message) in self.queue.due(rio) {
            if let MidiEvent::NoteOn { note, velocity, .. } = message.decode() {
                match self.clips.get(&note) {
                    Some(player) => {
                        trace!("trigger sample {:?} at velocity {:?}", note, velocity);
                        self.playing.push(Playback {
                            frames: Rc::clone(&player.frames),
                            delay: offset,
                            position: 0,
                        })
                    }
                    None => trace!("no sample mapped to {:?}", note),
                }
            }
        }

        let mut output = rio.output(0);
        output.fill_zero();
        for out_sample in output.iter_mut() {
            for index in (0..self.playing.len()).rev() {
                let playback = &mut self.playing[index];
                if playback.delay > 0 {
                    playback.delay -= 1;
                } else if let Some(frame) = playback.frames.get(playback.position) {
                    *out_sample += *frame;
                    playback.position += 1;
                } else {
                    self.playing.swap_remove(index);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::midi::MidiMessage;
    use crate::note::Velocity;

    fn write_wav(path: &Path, channels: u16, values: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for v in values {
            writer.write_sample(*v).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn loads_mono_and_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let mono = dir.path().join("mono.wav");
        write_wav(&mono, 1, &[16384, -16384]);
        let clip = Clip::load(&mono).unwrap();
        assert_eq!(
            clip.frames,
            vec![Stereo::mono(0.5), Stereo::mono(-0.5)]
        );

        let stereo = dir.path().join("stereo.wav");
        write_wav(&stereo, 2, &[16384, 0, 0, -32768]);
        let clip = Clip::load(&stereo).unwrap();
        assert_eq!(
            clip.frames,
            vec![Stereo::new(0.5, 0.0), Stereo::new(0.0, -1.0)]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Clip::load(&dir.path().join("nope.wav")).is_err());
    }

    #[test]
    fn slicing_and_resampling() {
        let clip = Clip::new((0..10).map(|i| Stereo::mono(i as f64)).collect(), 1000);
        let slice = clip.slice_ms(2.0, 5.0);
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.frames[0], Stereo::mono(2.0));
        assert!(clip.slice_ms(8.0, 50.0).len() == 2);
        assert!(clip.slice_ms(5.0, 2.0).is_empty());

        let doubled = clip.prepare(2000, 1.0);
        assert_eq!(doubled.len(), 20);
        assert_eq!(doubled[3], Stereo::mono(1.0));
        let halved = clip.prepare(500, 2.0);
        assert_eq!(halved.len(), 5);
        assert_eq!(halved[1], Stereo::mono(4.0));
    }

    #[test]
    fn plays_triggered_clips() {
        let note = Note::from_midi(38);
        let mut clips = BTreeMap::new();
        clips.insert(note, SamplePlayer::new(vec![Stereo::mono(0.5); 3]));
        let inbox = VoiceInbox::new();
        inbox.send(MidiMessage::note_on(9, note, Velocity::MAX), Some(2000));
        inbox.send(MidiMessage::note_on(9, Note::from_midi(40), Velocity::MAX), Some(0));

        let mut b = GraphBuilder::new();
        let bank = b.add_node(SampleBank::new(clips, inbox)).build();
        let mut graph = b.build(8, 1000).unwrap();
        graph.step();
        let left: Vec<_> = graph
            .output(bank.output(0))
            .unwrap()
            .iter()
            .map(|s| s.left)
            .collect();
        assert_eq!(left, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0]);
    }
}
