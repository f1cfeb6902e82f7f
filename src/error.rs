//! Error types for the rehearsal session controller.

/// Top-level error type for the voice and simulation session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Microphone access was blocked by the user or platform policy.
    #[error("microphone access denied")]
    PermissionDenied,

    /// No usable audio input device, or the hardware failed.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The capture engine heard nothing before the attempt ended.
    #[error("no speech detected")]
    NoSpeechDetected,

    /// No speech capture engine exists on this platform.
    #[error("speech capture is not supported here")]
    CaptureUnsupported,

    /// The capture engine failed for a reason outside the taxonomy.
    #[error("speech capture failed: {0}")]
    CaptureFailed(String),

    /// Transport/connectivity failure, or a reply body that could not be
    /// parsed as structured data.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Well-formed error reply from the simulation endpoint. The payload is
    /// the server-supplied explanation when one was present.
    #[error("{0}")]
    ServerError(String),

    /// The credential was rejected or could not be acquired.
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    /// No synthesis engine exists, or the active utterance failed.
    #[error("speech synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    /// Channel send/receive error between session stages.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e.to_string())
    }
}

/// `Copy` discriminant of [`SessionError`], carried in the observable
/// session state so the rendering layer can branch without matching on
/// payload strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    NoSpeechDetected,
    CaptureUnsupported,
    CaptureFailed,
    Network,
    Server,
    Unauthenticated,
    SynthesisUnavailable,
    Internal,
}

impl SessionError {
    /// Classify this error for the session state machine.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::PermissionDenied => ErrorKind::PermissionDenied,
            SessionError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            SessionError::NoSpeechDetected => ErrorKind::NoSpeechDetected,
            SessionError::CaptureUnsupported => ErrorKind::CaptureUnsupported,
            SessionError::CaptureFailed(_) => ErrorKind::CaptureFailed,
            SessionError::NetworkError(_) => ErrorKind::Network,
            SessionError::ServerError(_) => ErrorKind::Server,
            SessionError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            SessionError::SynthesisUnavailable(_) => ErrorKind::SynthesisUnavailable,
            SessionError::Channel(_) | SessionError::Config(_) | SessionError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SessionError>;
