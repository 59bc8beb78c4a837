// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Performs a `Composition`: realizes its instruments, renders the audio
//! graph in real time or offline, and transcribes what was played live on
//! the audition instrument.
//!
//! Real-time playback runs the whole graph on a dedicated `audio` thread.
//! The graph itself is single threaded; only the voice inboxes, the capture
//! log and a few flags are shared with the caller.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use snafu::{ensure, OptionExt, ResultExt, Snafu};

use crate::graph::GraphBuildError;
use crate::score::{Composition, InstrumentId};
use crate::synth::{BuiltinVoices, FallbackVoiceProvider};

mod assemble;
mod backend;
mod capture;
mod engine;
mod flatten;
mod registry;
mod session;

pub use backend::{Backend, MemoryBackend, NullBackend, SoxBackend, SoxTarget};
pub use capture::{
    default_midi_input, transcribe, CaptureLog, CaptureTap, CapturedMessage, InputConnection,
    MidiInputError, MidiInputProvider, NoMidiInput, Transcription,
};
#[cfg(feature = "midi-input")]
pub use capture::MidirInput;
pub use engine::{
    Clock, Completion, CompletionGuard, CompletionHook, Engine, FrameInfo, PreFrameHook, Scheduler,
};
pub use flatten::{flatten, Flattened, NoteEvent};
pub use registry::{CustomInstrumentFactory, Degradation, RealizedInstrument};
pub use session::Session;

use session::SessionContext;

#[derive(Debug, Snafu)]
pub enum PlayerError {
    #[snafu(display(
        "Instrument {} has custom code {}, but no custom instrument factory is registered",
        id,
        code
    ))]
    NoCustomFactory { id: InstrumentId, code: i32 },
    #[snafu(display("Instrument {} is not part of the composition", id))]
    UnknownInstrument { id: InstrumentId },
    #[snafu(display("Failed to load soundfont {}: {}", path.display(), source))]
    LoadSoundFont { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to load sample {}: {}", path.display(), source))]
    LoadSample {
        path: PathBuf,
        source: hound::Error,
    },
    #[snafu(display("Failed to build the audio graph: {}", source))]
    BuildGraph { source: GraphBuildError },
    #[snafu(display("Failed to write audio output: {}", source))]
    WriteOutput { source: io::Error },
    #[snafu(display("Failed to spawn the audio thread: {}", source))]
    SpawnAudioThread { source: io::Error },
    #[snafu(display("Custom instrument {} failed: {}", code, message))]
    CustomInstrument { code: i32, message: String },
    #[snafu(display("The audio thread terminated unexpectedly"))]
    AudioThread,
    #[snafu(display("There is no composition to play"))]
    NoComposition,
    #[snafu(display("Playback is already in progress"))]
    AlreadyPlaying,
}

pub type Result<T, E = PlayerError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub sample_rate: u32,
    /// Samples rendered per block. Bounds the latency of live input.
    pub buffer_size: usize,
    /// Silence before the first note, giving the output time to start up.
    pub start_delay_us: u64,
    /// How long to keep rendering after the last note-off, so releases and echoes can ring out.
    pub idle_wait_us: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 441,
            start_delay_us: 2_000_000,
            idle_wait_us: 2_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Preparing,
    Running,
    Finishing,
    Stopped,
}

/// Called with every note event as playback reaches it.
pub type NoteEventCallback = Arc<dyn Fn(&NoteEvent) + Send + Sync>;

struct ActiveSession {
    completion: Arc<Completion>,
    stop: Arc<AtomicBool>,
    /// `None` when rendering on the calling thread.
    thread: Option<JoinHandle<Result<()>>>,
    capture: Option<CaptureTap>,
    device: Option<Box<dyn InputConnection>>,
    degradations: Vec<Degradation>,
}

/// What the audio thread reports once its session is prepared.
type Prepared = Result<(Option<CaptureTap>, Vec<Degradation>)>;

pub struct Player {
    config: PlayerConfig,
    composition: Option<Arc<Composition>>,
    custom_factory: Option<Arc<dyn CustomInstrumentFactory>>,
    fallback: Arc<dyn FallbackVoiceProvider>,
    midi_input: Box<dyn MidiInputProvider>,
    note_callback: Option<NoteEventCallback>,
    clock: Clock,
    state: PlaybackState,
    active: Option<ActiveSession>,
    degradations: Vec<Degradation>,
    last_transcription: Option<Transcription>,
}

impl Default for Player {
    fn default() -> Self {
        Self::new(PlayerConfig::default())
    }
}

impl Player {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            composition: None,
            custom_factory: None,
            fallback: Arc::new(BuiltinVoices),
            midi_input: default_midi_input(),
            note_callback: None,
            clock: Clock::default(),
            state: PlaybackState::Idle,
            active: None,
            degradations: Vec::new(),
            last_transcription: None,
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn set_composition(&mut self, composition: Arc<Composition>) -> &mut Self {
        self.composition = Some(composition);
        self
    }

    pub fn set_custom_factory(
        &mut self,
        factory: impl CustomInstrumentFactory + 'static,
    ) -> &mut Self {
        self.custom_factory = Some(Arc::new(factory));
        self
    }

    pub fn set_fallback_provider(
        &mut self,
        provider: impl FallbackVoiceProvider + 'static,
    ) -> &mut Self {
        self.fallback = Arc::new(provider);
        self
    }

    pub fn set_midi_input(&mut self, input: Box<dyn MidiInputProvider>) -> &mut Self {
        self.midi_input = input;
        self
    }

    /// Observe note events as playback reaches them. Called on the audio thread.
    pub fn on_note_event(
        &mut self,
        callback: impl Fn(&NoteEvent) + Send + Sync + 'static,
    ) -> &mut Self {
        self.note_callback = Some(Arc::new(callback));
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .map_or(false, |active| !active.completion.is_signaled())
    }

    /// Playback time of the most recently rendered block.
    pub fn current_timestamp_us(&self) -> u64 {
        self.clock.get()
    }

    /// Feeds live messages into the audition instrument of the running session.
    pub fn live_input(&self) -> Option<CaptureTap> {
        self.active.as_ref().and_then(|active| active.capture.clone())
    }

    /// The transcription produced when the last session finished, if anything was captured.
    pub fn last_transcription(&self) -> Option<&Transcription> {
        self.last_transcription.as_ref()
    }

    /// Problems of the current or last session that did not prevent playback.
    pub fn degradations(&self) -> &[Degradation] {
        match &self.active {
            Some(active) => &active.degradations,
            None => &self.degradations,
        }
    }

    /// Play through the speakers and block until done.
    pub fn play(&mut self) -> Result<Option<Transcription>> {
        self.check_ready()?;
        let backend = SoxBackend::new(self.config.sample_rate, SoxTarget::Play)
            .context(WriteOutput)?;
        self.play_with(backend)
    }

    pub fn play_with<B: Backend + Send + 'static>(
        &mut self,
        backend: B,
    ) -> Result<Option<Transcription>> {
        self.start_playing_with(backend)?;
        if let Some(active) = &self.active {
            active.completion.wait();
        }
        self.finish_active()
    }

    /// Start playing through the speakers and return once playback has begun.
    pub fn start_playing(&mut self) -> Result<()> {
        self.check_ready()?;
        let backend = SoxBackend::new(self.config.sample_rate, SoxTarget::Play)
            .context(WriteOutput)?;
        self.start_playing_with(backend)
    }

    pub fn start_playing_with<B: Backend + Send + 'static>(&mut self, backend: B) -> Result<()> {
        let composition = self.check_ready()?;

        self.state = PlaybackState::Preparing;
        let completion = Arc::new(Completion::default());
        let stop = Arc::new(AtomicBool::new(false));
        let context = self.session_context(Arc::clone(&completion));

        let (ready_tx, ready_rx) = mpsc::channel::<Prepared>();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let thread_stop = Arc::clone(&stop);
        let thread_completion = Arc::clone(&completion);

        let spawned = thread::Builder::new()
            .name("audio".into())
            .spawn(move || -> Result<()> {
                let _signal_on_exit = CompletionGuard::new(thread_completion);
                let mut session = match Session::prepare(&composition, context, backend) {
                    Ok(session) => session,
                    Err(err) => {
                        // The caller only hangs up when it is gone itself.
                        let _ = ready_tx.send(Err(err));
                        return Ok(());
                    }
                };
                let report = (session.take_capture_tap(), session.degradations().to_vec());
                if ready_tx.send(Ok(report)).is_err() || go_rx.recv().is_err() {
                    return Ok(());
                }
                session.run(&thread_stop)
            });
        let handle = match spawned.context(SpawnAudioThread) {
            Ok(handle) => handle,
            Err(err) => {
                self.state = PlaybackState::Stopped;
                return Err(err);
            }
        };

        let (capture, mut degradations) = match ready_rx.recv() {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                let _ = handle.join();
                self.state = PlaybackState::Stopped;
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                self.state = PlaybackState::Stopped;
                return AudioThread.fail();
            }
        };

        let device = match &capture {
            Some(tap) => self.open_input(tap.clone(), &mut degradations),
            None => None,
        };

        // A failed send means the thread is already gone, which finishing reports.
        let _ = go_tx.send(());
        info!("playback started");

        self.state = PlaybackState::Running;
        self.active = Some(ActiveSession {
            completion,
            stop,
            thread: Some(handle),
            capture,
            device,
            degradations,
        });
        Ok(())
    }

    /// Whether playback has ended. Finishes the session the first time this is observed.
    pub fn check_for_end_of_playing(&mut self) -> Result<bool> {
        match &self.active {
            None => Ok(true),
            Some(active) if active.completion.is_signaled() => {
                self.finish_active()?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Stop playback early and finish the session.
    pub fn force_stop_playing(&mut self) -> Result<Option<Transcription>> {
        if let Some(active) = &self.active {
            if !active.completion.is_signaled() {
                info!("stopping playback at {}us", self.clock.get());
                active.stop.store(true, Ordering::SeqCst);
            }
        }
        self.finish_active()
    }

    /// Render the whole composition into an audio file, as fast as possible.
    /// The file type is derived from the extension by sox.
    pub fn save_wave_file(&mut self, path: &Path) -> Result<Option<Transcription>> {
        self.check_ready()?;
        let backend = SoxBackend::new(self.config.sample_rate, SoxTarget::File(path.into()))
            .context(WriteOutput)?;
        self.render_with(backend)
    }

    /// Render offline on the calling thread.
    pub fn render_with<B: Backend>(&mut self, backend: B) -> Result<Option<Transcription>> {
        let composition = self.check_ready()?;

        self.state = PlaybackState::Preparing;
        let completion = Arc::new(Completion::default());
        let context = self.session_context(Arc::clone(&completion));
        let mut session = match Session::prepare(&composition, context, backend) {
            Ok(session) => session,
            Err(err) => {
                self.state = PlaybackState::Stopped;
                return Err(err);
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        self.state = PlaybackState::Running;
        self.active = Some(ActiveSession {
            completion,
            stop: Arc::clone(&stop),
            thread: None,
            capture: session.take_capture_tap(),
            device: None,
            degradations: session.degradations().to_vec(),
        });

        let rendered = session.run(&stop);
        let finished = self.finish_active();
        rendered?;
        finished
    }

    /// Checks shared by every way of starting a session, done before any output is opened.
    fn check_ready(&self) -> Result<Arc<Composition>> {
        ensure!(self.active.is_none(), AlreadyPlaying);
        self.composition.clone().context(NoComposition)
    }

    fn session_context(&self, completion: Arc<Completion>) -> SessionContext {
        self.clock.set(0);
        SessionContext {
            config: self.config.clone(),
            factory: self.custom_factory.clone(),
            fallback: Arc::clone(&self.fallback),
            note_callback: self.note_callback.clone(),
            completion,
            clock: self.clock.clone(),
        }
    }

    fn open_input(
        &mut self,
        tap: CaptureTap,
        degradations: &mut Vec<Degradation>,
    ) -> Option<Box<dyn InputConnection>> {
        match self.midi_input.open(tap) {
            Ok(connection) => Some(connection),
            Err(err) => {
                warn!("live input is unavailable: {}", err);
                degradations.push(Degradation::NoMidiInput {
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    /// Tear down the active session. Taking `active` out makes this run at most once per session.
    fn finish_active(&mut self) -> Result<Option<Transcription>> {
        let active = match self.active.take() {
            Some(active) => active,
            None => return Ok(None),
        };
        self.state = PlaybackState::Finishing;

        let outcome = match active.thread {
            Some(handle) => handle.join().unwrap_or_else(|_| AudioThread.fail()),
            None => Ok(()),
        };

        if let Some(device) = active.device {
            device.close();
            info!("closed live input");
        }

        let transcription = active.capture.and_then(|tap| {
            let log = tap.log().snapshot();
            if log.is_empty() {
                return None;
            }
            let transcription = transcribe(&log);
            if let Some(composition) = &self.composition {
                let code = transcription.to_code(composition.tempo(), composition.scale());
                for line in code.lines() {
                    info!("{}", line);
                }
            }
            Some(transcription)
        });

        self.last_transcription = transcription.clone();
        self.degradations = active.degradations;
        self.state = PlaybackState::Stopped;
        info!("playback finished");

        outcome.map(|()| transcription)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(err) = self.force_stop_playing() {
                error!("failed to stop playback: {}", err);
            }
        }
    }
}
