//! Observable session state published to the rendering layer.

use crate::engines::Voice;
use crate::error::ErrorKind;
use crate::simulate::SimulationResult;
use crate::voice::Accent;

/// Where the current transcript came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSource {
    /// Produced by a capture session.
    Voice,
    /// Typed or edited directly by the user.
    Typed,
}

/// The pitch text awaiting (or having fed) a simulation turn. Always
/// superseded wholesale, never appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    pub source: TranscriptSource,
}

impl Default for Transcript {
    fn default() -> Self {
        Self {
            text: String::new(),
            source: TranscriptSource::Typed,
        }
    }
}

impl Transcript {
    /// Whether the transcript is empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// The orchestrator's authoritative phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing in flight.
    Idle,
    /// Waiting on the microphone permission gate.
    RequestingPermission,
    /// A capture session is live.
    Listening,
    /// The authoritative simulation request is in flight.
    AwaitingReply,
    /// An utterance is playing.
    Speaking,
    /// An utterance is paused.
    Paused,
    /// A recoverable failure; `reset` or any subsequent successful action
    /// leaves this state.
    Error { kind: ErrorKind, message: String },
}

/// Snapshot of everything the rendering layer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Current phase.
    pub phase: SessionPhase,
    /// Current pitch transcript.
    pub transcript: Transcript,
    /// Result of the last successful simulation turn, if any.
    pub result: Option<SimulationResult>,
    /// Accent preference for playback.
    pub accent: Accent,
    /// Synthesis voice the accent currently resolves to.
    pub voice: Option<Voice>,
    /// Display name of the selected persona.
    pub persona: Option<String>,
}

impl SessionSnapshot {
    /// Initial snapshot before any user action.
    pub fn initial(accent: Accent, voice: Option<Voice>, persona: Option<String>) -> Self {
        Self {
            phase: SessionPhase::Idle,
            transcript: Transcript::default(),
            result: None,
            accent,
            voice,
            persona,
        }
    }

    /// Error kind, if the session is in an error phase.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.phase {
            SessionPhase::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
