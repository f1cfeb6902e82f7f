//! Single-shot speech capture session.
//!
//! Wraps a [`CaptureEngine`] attempt as an explicit state machine:
//! `Idle → Starting → Listening → {Resolved | Failed | Ended}`. At most one
//! engine attempt runs at a time; starting a new session always tears down
//! the previous one first.

use crate::engines::{CaptureEngine, CaptureEvent};
use crate::error::{Result, SessionError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Lifecycle phase of one capture attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Starting,
    Listening,
    Resolved,
    Failed,
    Ended,
}

/// One single-shot speech-to-text attempt bounded by `start` and a terminal
/// result/error/end event.
pub struct CaptureSession {
    engine: Arc<dyn CaptureEngine>,
    phase: CapturePhase,
}

impl CaptureSession {
    /// Create an idle session around the given engine.
    pub fn new(engine: Arc<dyn CaptureEngine>) -> Self {
        Self {
            engine,
            phase: CapturePhase::Idle,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    /// Whether an engine attempt is currently live.
    pub fn is_listening(&self) -> bool {
        matches!(self.phase, CapturePhase::Starting | CapturePhase::Listening)
    }

    /// Begin a new single-shot attempt, tearing down any previous one first.
    ///
    /// The returned channel carries the attempt's terminal events.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if listening cannot begin; the session is
    /// left in `Failed`.
    pub async fn start(&mut self, locale: &str) -> Result<mpsc::Receiver<CaptureEvent>> {
        // No two engines run concurrently.
        self.teardown().await;

        self.phase = CapturePhase::Starting;
        match self.engine.start(locale).await {
            Ok(events) => {
                info!("capture session listening (locale={locale})");
                self.phase = CapturePhase::Listening;
                Ok(events)
            }
            Err(e) => {
                self.phase = CapturePhase::Failed;
                Err(e)
            }
        }
    }

    /// Accept the engine's single result: trim it, stop the engine, and
    /// transition to `Resolved`.
    pub async fn resolve(&mut self, raw: &str) -> String {
        let text = raw.trim().to_owned();
        // The engine already delivered its one result; the stop is idempotent.
        self.engine.stop().await;
        self.phase = CapturePhase::Resolved;
        debug!("capture resolved ({} chars)", text.len());
        text
    }

    /// Record an engine failure, mapping the reported reason to the session
    /// error taxonomy, and transition to `Failed`.
    pub async fn fail(&mut self, reason: &str) -> SessionError {
        self.engine.stop().await;
        self.phase = CapturePhase::Failed;
        map_error_reason(reason)
    }

    /// Record a natural end without a prior result or error. A silent
    /// no-op from the caller's perspective, not an error.
    pub fn ended(&mut self) {
        debug!("capture ended without result");
        self.phase = CapturePhase::Ended;
    }

    /// Stop the engine unconditionally and return to `Idle`. Safe to call
    /// in any phase, any number of times.
    pub async fn teardown(&mut self) {
        self.engine.stop().await;
        self.phase = CapturePhase::Idle;
    }
}

/// Map an engine-reported failure reason to the session error taxonomy.
pub(crate) fn map_error_reason(reason: &str) -> SessionError {
    let lower = reason.to_ascii_lowercase();
    if lower.contains("not-allowed") || lower.contains("denied") || lower.contains("permission") {
        SessionError::PermissionDenied
    } else if lower.contains("no-speech") {
        SessionError::NoSpeechDetected
    } else {
        SessionError::CaptureFailed(reason.to_owned())
    }
}
