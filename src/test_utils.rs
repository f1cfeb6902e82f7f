//! Shared fakes for exercising the session state machines without platform
//! engines or a live endpoint.
//!
//! Each fake records the calls it receives and lets the test script the
//! asynchronous completions (capture results, utterance endings, simulation
//! replies) at controlled points.

use crate::engines::{
    CaptureEngine, CaptureEvent, PlaybackEvent, SynthesisEngine, UtteranceRequest, Voice,
};
use crate::error::{Result, SessionError};
use crate::permissions::{PermissionGate, PermissionOutcome};
use crate::simulate::{SimulationBackend, SimulationResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc, oneshot, watch};

/// Build a [`Voice`] in one line.
pub fn voice(id: &str, locale: &str) -> Voice {
    Voice {
        id: id.to_owned(),
        name: id.to_owned(),
        locale: locale.to_owned(),
    }
}

// ── capture ──────────────────────────────────────────────────────────────

/// Scripted single-shot capture engine.
pub struct FakeCaptureEngine {
    current: Mutex<Option<mpsc::Sender<CaptureEvent>>>,
    locales: Mutex<Vec<String>>,
    stops: AtomicUsize,
    fail_start: Mutex<Option<SessionError>>,
}

impl FakeCaptureEngine {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            locales: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            fail_start: Mutex::new(None),
        }
    }

    /// Make the next `start` call fail with the given error.
    pub fn fail_next_start(&self, error: SessionError) {
        *self.fail_start.lock().expect("lock") = Some(error);
    }

    /// Deliver an event to the active attempt. Panics if none is live.
    pub async fn emit(&self, event: CaptureEvent) {
        let tx = self
            .current
            .lock()
            .expect("lock")
            .clone()
            .expect("no active capture attempt");
        tx.send(event).await.expect("capture receiver dropped");
    }

    /// Locales of every `start` call, in order.
    pub fn started_locales(&self) -> Vec<String> {
        self.locales.lock().expect("lock").clone()
    }

    /// Number of `start` calls so far.
    pub fn start_count(&self) -> usize {
        self.locales.lock().expect("lock").len()
    }

    /// Number of `stop` calls so far.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Default for FakeCaptureEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureEngine for FakeCaptureEngine {
    async fn start(&self, locale: &str) -> Result<mpsc::Receiver<CaptureEvent>> {
        if let Some(error) = self.fail_start.lock().expect("lock").take() {
            return Err(error);
        }
        self.locales.lock().expect("lock").push(locale.to_owned());
        let (tx, rx) = mpsc::channel(8);
        *self.current.lock().expect("lock") = Some(tx);
        Ok(rx)
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        // Dropping the sender closes the attempt's event channel.
        self.current.lock().expect("lock").take();
    }
}

// ── synthesis ────────────────────────────────────────────────────────────

struct SynthesisInner {
    voices: Vec<Voice>,
    playing: Option<mpsc::Sender<PlaybackEvent>>,
    paused: bool,
    spoken: Vec<UtteranceRequest>,
    cancels: usize,
}

/// Scripted synthesis engine with a mutable voice catalog.
pub struct FakeSynthesisEngine {
    inner: Mutex<SynthesisInner>,
    voices_tx: watch::Sender<u64>,
}

impl FakeSynthesisEngine {
    pub fn new() -> Self {
        let (voices_tx, _) = watch::channel(0);
        Self {
            inner: Mutex::new(SynthesisInner {
                voices: Vec::new(),
                playing: None,
                paused: false,
                spoken: Vec::new(),
                cancels: 0,
            }),
            voices_tx,
        }
    }

    /// Replace the catalog and fire the voices-changed notification.
    pub fn set_voices(&self, voices: Vec<Voice>) {
        self.inner.lock().expect("lock").voices = voices;
        self.voices_tx.send_modify(|v| *v += 1);
    }

    /// Finish the active utterance naturally.
    pub async fn finish_utterance(&self) {
        let tx = self
            .inner
            .lock()
            .expect("lock")
            .playing
            .clone()
            .expect("no active utterance");
        tx.send(PlaybackEvent::Ended)
            .await
            .expect("playback receiver dropped");
    }

    /// Fail the active utterance.
    pub async fn fail_utterance(&self, message: &str) {
        let tx = self
            .inner
            .lock()
            .expect("lock")
            .playing
            .clone()
            .expect("no active utterance");
        tx.send(PlaybackEvent::Error(message.to_owned()))
            .await
            .expect("playback receiver dropped");
    }

    /// Texts of every utterance spoken so far.
    pub fn spoken_texts(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("lock")
            .spoken
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    /// Every utterance request received so far.
    pub fn spoken_requests(&self) -> Vec<UtteranceRequest> {
        self.inner.lock().expect("lock").spoken.clone()
    }

    /// Number of `cancel` calls so far.
    pub fn cancel_count(&self) -> usize {
        self.inner.lock().expect("lock").cancels
    }

    /// Whether the engine currently reports paused playback.
    pub fn is_paused(&self) -> bool {
        self.inner.lock().expect("lock").paused
    }
}

impl Default for FakeSynthesisEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisEngine for FakeSynthesisEngine {
    fn voices(&self) -> Vec<Voice> {
        self.inner.lock().expect("lock").voices.clone()
    }

    fn voices_changed(&self) -> watch::Receiver<u64> {
        self.voices_tx.subscribe()
    }

    async fn speak(&self, request: UtteranceRequest) -> Result<mpsc::Receiver<PlaybackEvent>> {
        let (tx, rx) = mpsc::channel(4);
        let mut inner = self.inner.lock().expect("lock");
        inner.spoken.push(request);
        inner.playing = Some(tx);
        inner.paused = false;
        Ok(rx)
    }

    async fn pause(&self) -> bool {
        let mut inner = self.inner.lock().expect("lock");
        if inner.playing.is_some() && !inner.paused {
            inner.paused = true;
            true
        } else {
            false
        }
    }

    async fn resume(&self) -> bool {
        let mut inner = self.inner.lock().expect("lock");
        if inner.playing.is_some() && inner.paused {
            inner.paused = false;
            true
        } else {
            false
        }
    }

    async fn cancel(&self) {
        let mut inner = self.inner.lock().expect("lock");
        inner.cancels += 1;
        inner.playing = None;
        inner.paused = false;
    }
}

// ── permission gate ──────────────────────────────────────────────────────

/// Gate with a configurable response.
pub struct FakePermissionGate {
    response: Mutex<Result<PermissionOutcome>>,
    requests: AtomicUsize,
}

impl FakePermissionGate {
    /// Gate that always grants.
    pub fn granted() -> Self {
        Self {
            response: Mutex::new(Ok(PermissionOutcome::Granted)),
            requests: AtomicUsize::new(0),
        }
    }

    /// Gate that always fails with the given error.
    pub fn failing(error: SessionError) -> Self {
        Self {
            response: Mutex::new(Err(error)),
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of permission requests so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionGate for FakePermissionGate {
    async fn request_microphone(&self) -> Result<PermissionOutcome> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.response.lock().expect("lock").clone()
    }
}

// ── simulation backend ───────────────────────────────────────────────────

/// Simulation backend whose replies the test releases explicitly, enabling
/// staleness and ordering scenarios.
pub struct FakeSimulation {
    auto: Mutex<Option<Result<SimulationResult>>>,
    pending: Mutex<VecDeque<oneshot::Sender<Result<SimulationResult>>>>,
    arrived: Notify,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeSimulation {
    /// Backend that parks every submission until [`FakeSimulation::respond`].
    pub fn manual() -> Self {
        Self {
            auto: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Backend that answers every submission immediately with `outcome`.
    pub fn auto(outcome: Result<SimulationResult>) -> Self {
        Self {
            auto: Mutex::new(Some(outcome)),
            pending: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Complete the oldest parked submission. Waits until one exists.
    pub async fn respond(&self, outcome: Result<SimulationResult>) {
        loop {
            let arrived = self.arrived.notified();
            if let Some(tx) = self.pending.lock().expect("lock").pop_front() {
                let _ = tx.send(outcome);
                return;
            }
            arrived.await;
        }
    }

    /// `(user_text, persona_prompt)` of every submission so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl SimulationBackend for FakeSimulation {
    async fn submit(&self, user_text: &str, persona_prompt: &str) -> Result<SimulationResult> {
        self.calls
            .lock()
            .expect("lock")
            .push((user_text.to_owned(), persona_prompt.to_owned()));

        if let Some(outcome) = self.auto.lock().expect("lock").clone() {
            return outcome;
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("lock").push_back(tx);
        // notify_one stores a permit when no responder is waiting yet, so a
        // submission arriving between the queue check and the await is not
        // lost.
        self.arrived.notify_one();
        rx.await
            .map_err(|_| SessionError::Channel("simulation response dropped".into()))?
    }
}
