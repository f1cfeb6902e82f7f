//! Injectable capability interfaces for the platform speech engines.
//!
//! The capture and synthesis engines are ambient platform singletons in the
//! environments this controller targets. They are abstracted here as traits
//! owned by the session's construction context, so the state machines in
//! [`crate::capture`], [`crate::voice`], and [`crate::session`] can be
//! exercised against fakes (see [`crate::test_utils`]).

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

/// A terminal event from a single-shot capture attempt.
///
/// The engine emits at most one `Transcript` or `Error`, always followed by
/// `End` when the underlying session winds down.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The top transcript alternative, untrimmed.
    Transcript(String),
    /// Engine-reported failure reason code (e.g. `"not-allowed"`, `"no-speech"`).
    Error(String),
    /// The attempt ended without any further result.
    End,
}

/// Single-shot speech-to-text engine.
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    /// Begin one recognition attempt in the given locale.
    ///
    /// Events for the attempt arrive on the returned channel. Starting a new
    /// attempt implicitly supersedes any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot begin listening.
    async fn start(&self, locale: &str) -> Result<mpsc::Receiver<CaptureEvent>>;

    /// Stop the active attempt, if any. Stopping an already-stopped attempt
    /// is a no-op, never an error.
    async fn stop(&self);
}

/// A synthesis voice exposed by the platform catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Engine-specific identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// BCP-47 locale tag (e.g. `en-US`).
    pub locale: String,
}

/// One playback request handed to the synthesis engine.
#[derive(Debug, Clone)]
pub struct UtteranceRequest {
    /// Text to speak.
    pub text: String,
    /// Resolved voice, or `None` for the engine default.
    pub voice: Option<Voice>,
    /// Speaking rate multiplier.
    pub rate: f32,
    /// Pitch multiplier.
    pub pitch: f32,
}

/// A terminal event from an utterance.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// Playback finished naturally.
    Ended,
    /// The engine failed mid-utterance.
    Error(String),
}

/// Text-to-speech engine with a lazily populated voice catalog.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Snapshot of the currently known voices. May be empty early in the
    /// process lifetime; subscribe to [`SynthesisEngine::voices_changed`]
    /// and re-read rather than caching an empty result.
    fn voices(&self) -> Vec<Voice>;

    /// Notification channel bumped whenever the voice catalog updates.
    fn voices_changed(&self) -> watch::Receiver<u64>;

    /// Start speaking, replacing any active utterance.
    ///
    /// Terminal events for this utterance arrive on the returned channel.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis cannot start.
    async fn speak(&self, request: UtteranceRequest) -> Result<mpsc::Receiver<PlaybackEvent>>;

    /// Pause the active utterance. Returns `true` only if the engine was
    /// actively speaking (not already paused) and the pause was applied.
    async fn pause(&self) -> bool;

    /// Resume a paused utterance. Returns `true` if playback resumed.
    async fn resume(&self) -> bool;

    /// Cancel any engine activity. Always safe, always idempotent.
    async fn cancel(&self);
}
