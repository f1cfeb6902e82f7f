//! The session orchestrator.
//!
//! A single task owns the composite state machine and serializes every
//! mutation. User commands arrive on one channel; completions from the
//! permission gate, the capture engine, the simulation backend, and the
//! synthesis engine arrive on another, each tagged with the generation or
//! sequence number it belongs to so late arrivals from a superseded
//! resource are discarded instead of overwriting fresher state.

use crate::capture::CaptureSession;
use crate::config::SessionConfig;
use crate::engines::{CaptureEngine, CaptureEvent, PlaybackEvent, SynthesisEngine};
use crate::error::{Result, SessionError};
use crate::permissions::{PermissionGate, PermissionOutcome};
use crate::persona::PersonaContext;
use crate::session::state::{SessionPhase, SessionSnapshot, Transcript, TranscriptSource};
use crate::simulate::{SimulationBackend, SimulationResult};
use crate::voice::{Accent, PlaybackController, PlaybackPhase, ResumeAction};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Channel buffer sizes.
const COMMAND_CHANNEL_SIZE: usize = 32;
const EVENT_CHANNEL_SIZE: usize = 32;

/// User-facing commands accepted by the session.
#[derive(Debug)]
pub enum SessionCommand {
    /// Request the microphone and begin a capture session.
    StartListening,
    /// Replace the transcript with directly edited text.
    SetTranscript(String),
    /// Submit the current transcript and persona prompt for simulation.
    Simulate,
    /// Speak the buyer reply from the last simulation result.
    PlayReply,
    /// Pause the active utterance.
    PauseAudio,
    /// Resume a paused utterance.
    ResumeAudio,
    /// Stop any utterance.
    StopAudio,
    /// Select a different buyer persona. Takes effect on the next simulate.
    SetPersona(PersonaContext),
    /// Change the accent preference. Takes effect on the next speak.
    SetAccent(Accent),
    /// Universal escape hatch: clear everything, tear everything down.
    Reset,
}

/// Completions and notifications funneled back into the session task.
enum SessionEvent {
    PermissionResolved {
        generation: u64,
        outcome: Result<PermissionOutcome>,
    },
    Capture {
        generation: u64,
        event: CaptureEvent,
    },
    Playback {
        generation: u64,
        event: PlaybackEvent,
    },
    SimulationFinished {
        seq: u64,
        outcome: Result<SimulationResult>,
    },
    VoicesChanged,
}

/// Constructs and spawns the session task.
pub struct SessionController {
    config: SessionConfig,
    gate: Arc<dyn PermissionGate>,
    backend: Arc<dyn SimulationBackend>,
    capture_engine: Option<Arc<dyn CaptureEngine>>,
    synthesis_engine: Option<Arc<dyn SynthesisEngine>>,
    persona: Option<PersonaContext>,
}

impl SessionController {
    /// Create a controller with no platform engines attached. Attempts to
    /// listen or speak will surface the unsupported-capability errors.
    pub fn new(
        config: SessionConfig,
        gate: Arc<dyn PermissionGate>,
        backend: Arc<dyn SimulationBackend>,
    ) -> Self {
        Self {
            config,
            gate,
            backend,
            capture_engine: None,
            synthesis_engine: None,
            persona: None,
        }
    }

    /// Attach a speech capture engine.
    #[must_use]
    pub fn with_capture_engine(mut self, engine: Arc<dyn CaptureEngine>) -> Self {
        self.capture_engine = Some(engine);
        self
    }

    /// Attach a speech synthesis engine.
    #[must_use]
    pub fn with_synthesis_engine(mut self, engine: Arc<dyn SynthesisEngine>) -> Self {
        self.synthesis_engine = Some(engine);
        self
    }

    /// Select the initial buyer persona.
    #[must_use]
    pub fn with_persona(mut self, persona: PersonaContext) -> Self {
        self.persona = Some(persona);
        self
    }

    /// Spawn the session task and return its handle.
    pub fn spawn(self) -> SessionHandle {
        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        let playback = PlaybackController::new(
            self.synthesis_engine.clone(),
            self.config.playback.accent,
            self.config.playback.rate,
            self.config.playback.pitch,
        );
        let snapshot = SessionSnapshot::initial(
            playback.profile().accent,
            playback.profile().voice.clone(),
            self.persona.as_ref().map(|p| p.name.clone()),
        );
        let (state_tx, state_rx) = watch::channel(snapshot);

        // Forward catalog updates into the session task.
        if let Some(engine) = self.synthesis_engine.as_deref() {
            let mut voices_rx = engine.voices_changed();
            let event_tx = event_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        changed = voices_rx.changed() => {
                            if changed.is_err()
                                || event_tx.send(SessionEvent::VoicesChanged).await.is_err()
                            {
                                break;
                            }
                        }
                        _ = cancel.cancelled() => break,
                    }
                }
            });
        }

        let mut task = SessionTask {
            locale: self.config.capture.locale.clone(),
            gate: self.gate,
            backend: self.backend,
            capture: self.capture_engine.map(CaptureSession::new),
            playback,
            persona: self.persona,
            phase: SessionPhase::Idle,
            transcript: Transcript::default(),
            result: None,
            state_tx,
            event_tx,
            capture_generation: 0,
            capture_live: false,
            utterance_generation: 0,
            utterance_live: false,
            request_seq: 0,
            awaiting_seq: None,
        };

        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            task.run(command_rx, event_rx, task_cancel).await;
        });

        SessionHandle {
            commands: command_tx,
            state: state_rx,
            cancel,
            join,
        }
    }
}

/// Live handle to a spawned session.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SessionHandle {
    /// Subscribe to observable state updates.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Send a command to the session task.
    ///
    /// # Errors
    ///
    /// Returns a channel error if the session has shut down.
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Channel("session task has shut down".into()))
    }

    /// Request the microphone and begin listening.
    pub async fn start_listening(&self) -> Result<()> {
        self.send(SessionCommand::StartListening).await
    }

    /// Replace the transcript with directly edited text.
    pub async fn set_transcript(&self, text: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::SetTranscript(text.into())).await
    }

    /// Submit the current transcript for simulation.
    pub async fn simulate(&self) -> Result<()> {
        self.send(SessionCommand::Simulate).await
    }

    /// Speak the last buyer reply.
    pub async fn play_reply(&self) -> Result<()> {
        self.send(SessionCommand::PlayReply).await
    }

    /// Pause the active utterance.
    pub async fn pause_audio(&self) -> Result<()> {
        self.send(SessionCommand::PauseAudio).await
    }

    /// Resume a paused utterance.
    pub async fn resume_audio(&self) -> Result<()> {
        self.send(SessionCommand::ResumeAudio).await
    }

    /// Stop any utterance.
    pub async fn stop_audio(&self) -> Result<()> {
        self.send(SessionCommand::StopAudio).await
    }

    /// Select a different buyer persona.
    pub async fn set_persona(&self, persona: PersonaContext) -> Result<()> {
        self.send(SessionCommand::SetPersona(persona)).await
    }

    /// Change the accent preference.
    pub async fn set_accent(&self, accent: Accent) -> Result<()> {
        self.send(SessionCommand::SetAccent(accent)).await
    }

    /// Clear transcript, result, and error; tear down capture and playback.
    pub async fn reset(&self) -> Result<()> {
        self.send(SessionCommand::Reset).await
    }

    /// Tear the session down and wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.join.await;
    }
}

/// State owned by the spawned session task.
struct SessionTask {
    locale: String,
    gate: Arc<dyn PermissionGate>,
    backend: Arc<dyn SimulationBackend>,
    /// `None` when the platform has no capture engine.
    capture: Option<CaptureSession>,
    playback: PlaybackController,
    persona: Option<PersonaContext>,
    phase: SessionPhase,
    transcript: Transcript,
    result: Option<SimulationResult>,
    state_tx: watch::Sender<SessionSnapshot>,
    event_tx: mpsc::Sender<SessionEvent>,
    /// Bumped whenever a capture attempt is superseded or torn down.
    capture_generation: u64,
    capture_live: bool,
    /// Bumped whenever an utterance is superseded or stopped.
    utterance_generation: u64,
    utterance_live: bool,
    /// Monotonically increasing simulation sequence number.
    request_seq: u64,
    /// Sequence number of the authoritative in-flight request.
    awaiting_seq: Option<u64>,
}

impl SessionTask {
    async fn run(
        &mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::Receiver<SessionEvent>,
        cancel: CancellationToken,
    ) {
        info!("session task started");
        loop {
            tokio::select! {
                Some(command) = commands.recv() => self.handle_command(command).await,
                Some(event) = events.recv() => self.handle_event(event).await,
                _ = cancel.cancelled() => break,
                else => break,
            }
        }
        // Unconditional teardown on unmount.
        self.teardown_capture().await;
        self.retire_utterance().await;
        info!("session task stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartListening => self.start_listening().await,
            SessionCommand::SetTranscript(text) => {
                self.transcript = Transcript {
                    text,
                    source: TranscriptSource::Typed,
                };
                self.publish();
            }
            SessionCommand::Simulate => self.simulate().await,
            SessionCommand::PlayReply => self.play_reply().await,
            SessionCommand::PauseAudio => {
                if self.phase == SessionPhase::Speaking && self.playback.pause().await {
                    self.phase = SessionPhase::Paused;
                    self.publish();
                }
            }
            SessionCommand::ResumeAudio => self.resume_audio().await,
            SessionCommand::StopAudio => {
                self.retire_utterance().await;
                if matches!(self.phase, SessionPhase::Speaking | SessionPhase::Paused) {
                    self.phase = SessionPhase::Idle;
                    self.publish();
                }
            }
            SessionCommand::SetPersona(persona) => {
                // Affects the next simulate only; transcript and result stay.
                self.persona = Some(persona);
                self.publish();
            }
            SessionCommand::SetAccent(accent) => {
                self.playback.set_accent(accent);
                self.publish();
            }
            SessionCommand::Reset => self.reset().await,
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PermissionResolved {
                generation,
                outcome,
            } => self.on_permission_resolved(generation, outcome).await,
            SessionEvent::Capture { generation, event } => {
                self.on_capture_event(generation, event).await;
            }
            SessionEvent::Playback { generation, event } => {
                self.on_playback_event(generation, event);
            }
            SessionEvent::SimulationFinished { seq, outcome } => {
                self.on_simulation_finished(seq, outcome).await;
            }
            SessionEvent::VoicesChanged => {
                self.playback.refresh_voice();
                self.publish();
            }
        }
    }

    // ── listening ────────────────────────────────────────────────────────

    async fn start_listening(&mut self) {
        if self.capture_busy() || self.request_busy() {
            debug!("start_listening ignored: capture or request already active");
            return;
        }
        if self.capture.is_none() {
            self.set_error(SessionError::CaptureUnsupported);
            return;
        }

        self.capture_generation += 1;
        let generation = self.capture_generation;
        self.phase = SessionPhase::RequestingPermission;
        self.publish();

        let gate = Arc::clone(&self.gate);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = gate.request_microphone().await;
            let _ = event_tx
                .send(SessionEvent::PermissionResolved {
                    generation,
                    outcome,
                })
                .await;
        });
    }

    async fn on_permission_resolved(
        &mut self,
        generation: u64,
        outcome: Result<PermissionOutcome>,
    ) {
        if generation != self.capture_generation
            || self.phase != SessionPhase::RequestingPermission
        {
            debug!("discarding stale permission resolution");
            return;
        }

        match outcome {
            Ok(PermissionOutcome::Granted) => {}
            Ok(PermissionOutcome::Assumed) => {
                debug!("permission assumed; capture engine will report failures");
            }
            Err(e) => {
                self.set_error(e);
                return;
            }
        }

        let Some(capture) = self.capture.as_mut() else {
            self.set_error(SessionError::CaptureUnsupported);
            return;
        };

        match capture.start(&self.locale).await {
            Ok(mut capture_events) => {
                self.capture_live = true;
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = capture_events.recv().await {
                        if event_tx
                            .send(SessionEvent::Capture { generation, event })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    // Channel closed without a terminal event: treat as a
                    // natural end.
                    let _ = event_tx
                        .send(SessionEvent::Capture {
                            generation,
                            event: CaptureEvent::End,
                        })
                        .await;
                });
                self.phase = SessionPhase::Listening;
                self.publish();
            }
            Err(e) => self.set_error(e),
        }
    }

    async fn on_capture_event(&mut self, generation: u64, event: CaptureEvent) {
        if generation != self.capture_generation || !self.capture_live {
            debug!("discarding event from superseded capture session");
            return;
        }
        let Some(capture) = self.capture.as_mut() else {
            return;
        };

        match event {
            CaptureEvent::Transcript(raw) => {
                let text = capture.resolve(&raw).await;
                self.capture_live = false;
                self.transcript = Transcript {
                    text,
                    source: TranscriptSource::Voice,
                };
                self.phase = SessionPhase::Idle;
                self.publish();
            }
            CaptureEvent::Error(reason) => {
                let error = capture.fail(&reason).await;
                self.capture_live = false;
                // Transcript and prior result stay intact.
                self.set_error(error);
            }
            CaptureEvent::End => {
                capture.ended();
                self.capture_live = false;
                if self.phase == SessionPhase::Listening {
                    self.phase = SessionPhase::Idle;
                    self.publish();
                }
            }
        }
    }

    // ── simulation ───────────────────────────────────────────────────────

    async fn simulate(&mut self) {
        if self.capture_busy() || self.request_busy() {
            debug!("simulate ignored: capture or request already active");
            return;
        }
        let user_text = self.transcript.text.trim().to_owned();
        if user_text.is_empty() {
            debug!("simulate ignored: transcript is empty");
            return;
        }

        self.request_seq += 1;
        let seq = self.request_seq;
        self.awaiting_seq = Some(seq);
        self.phase = SessionPhase::AwaitingReply;
        self.publish();

        let persona_prompt = self
            .persona
            .as_ref()
            .map(|p| p.prompt.clone())
            .unwrap_or_default();
        let backend = Arc::clone(&self.backend);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = backend.submit(&user_text, &persona_prompt).await;
            let _ = event_tx
                .send(SessionEvent::SimulationFinished { seq, outcome })
                .await;
        });
    }

    async fn on_simulation_finished(&mut self, seq: u64, outcome: Result<SimulationResult>) {
        if self.awaiting_seq != Some(seq) {
            debug!("discarding stale simulation reply (seq {seq})");
            return;
        }
        self.awaiting_seq = None;

        match outcome {
            Ok(result) => {
                // A fresh reply retires whatever is still being spoken.
                self.retire_utterance().await;
                self.result = Some(result);
                self.phase = SessionPhase::Idle;
                self.publish();
            }
            Err(e) => {
                // A failed re-submission must not leave a stale reply on
                // screen.
                self.result = None;
                self.set_error(e);
            }
        }
    }

    // ── playback ─────────────────────────────────────────────────────────

    async fn play_reply(&mut self) {
        if self.capture_busy() || self.request_busy() {
            debug!("play_reply ignored: capture or request already active");
            return;
        }
        let Some(text) = self.result.as_ref().map(|r| r.buyer_reply.clone()) else {
            debug!("play_reply ignored: no buyer reply to speak");
            return;
        };
        self.start_utterance(&text).await;
    }

    async fn start_utterance(&mut self, text: &str) {
        self.utterance_generation += 1;
        let generation = self.utterance_generation;
        match self.playback.speak(text).await {
            Ok(events) => {
                self.utterance_live = true;
                self.pump_playback(generation, events);
                self.phase = SessionPhase::Speaking;
                self.publish();
            }
            Err(e) => {
                self.utterance_live = false;
                self.set_error(e);
            }
        }
    }

    fn pump_playback(&self, generation: u64, mut events: mpsc::Receiver<PlaybackEvent>) {
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event_tx
                    .send(SessionEvent::Playback { generation, event })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            let _ = event_tx
                .send(SessionEvent::Playback {
                    generation,
                    event: PlaybackEvent::Ended,
                })
                .await;
        });
    }

    fn on_playback_event(&mut self, generation: u64, event: PlaybackEvent) {
        if generation != self.utterance_generation || !self.utterance_live {
            debug!("discarding event from retired utterance");
            return;
        }

        match event {
            PlaybackEvent::Ended => {
                self.utterance_live = false;
                self.playback.finished();
                if matches!(self.phase, SessionPhase::Speaking | SessionPhase::Paused) {
                    self.phase = SessionPhase::Idle;
                    self.publish();
                }
            }
            PlaybackEvent::Error(message) => {
                self.utterance_live = false;
                self.playback.finished();
                self.set_error(SessionError::SynthesisUnavailable(message));
            }
        }
    }

    async fn resume_audio(&mut self) {
        match self.playback.resume(self.utterance_live).await {
            Ok(ResumeAction::NoOp) => {}
            Ok(ResumeAction::Resumed) => {
                self.phase = SessionPhase::Speaking;
                self.publish();
            }
            Ok(ResumeAction::Respoke(events)) => {
                self.utterance_generation += 1;
                self.utterance_live = true;
                self.pump_playback(self.utterance_generation, events);
                self.phase = SessionPhase::Speaking;
                self.publish();
            }
            Err(e) => {
                self.utterance_live = false;
                self.set_error(e);
            }
        }
    }

    // ── teardown ─────────────────────────────────────────────────────────

    async fn reset(&mut self) {
        self.teardown_capture().await;
        self.retire_utterance().await;
        // Invalidate any in-flight request so its reply is discarded.
        self.request_seq += 1;
        self.awaiting_seq = None;
        self.transcript = Transcript::default();
        self.result = None;
        self.phase = SessionPhase::Idle;
        self.publish();
    }

    async fn teardown_capture(&mut self) {
        self.capture_generation += 1;
        self.capture_live = false;
        if let Some(capture) = self.capture.as_mut() {
            capture.teardown().await;
        }
    }

    async fn retire_utterance(&mut self) {
        self.utterance_generation += 1;
        self.utterance_live = false;
        self.playback.stop().await;
    }

    // ── shared helpers ───────────────────────────────────────────────────

    fn capture_busy(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::RequestingPermission | SessionPhase::Listening
        )
    }

    fn request_busy(&self) -> bool {
        self.awaiting_seq.is_some()
    }

    fn set_error(&mut self, error: SessionError) {
        warn!("session error: {error}");
        self.phase = SessionPhase::Error {
            kind: error.kind(),
            message: error.to_string(),
        };
        self.publish();
    }

    fn publish(&mut self) {
        let snapshot = SessionSnapshot {
            phase: self.phase.clone(),
            transcript: self.transcript.clone(),
            result: self.result.clone(),
            accent: self.playback.profile().accent,
            voice: self.playback.profile().voice.clone(),
            persona: self.persona.as_ref().map(|p| p.name.clone()),
        };
        self.state_tx.send_replace(snapshot);
    }
}
