//! Microphone permission gate.
//!
//! The gate is invoked once per capture attempt, before the recognition
//! engine starts. [`CpalPermissionGate`] briefly opens and immediately
//! releases an input stream so the OS permission prompt fires without
//! leaving the device open. On platforms with no pre-check capability,
//! [`AssumedPermissionGate`] makes the "assume granted and let the capture
//! engine report the failure" fallback explicit rather than silent.

use crate::error::{Result, SessionError};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info};

/// Outcome of a microphone permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// The platform confirmed access.
    Granted,
    /// The platform cannot pre-check; access is assumed and the capture
    /// engine itself will report any real failure.
    Assumed,
}

/// Pre-capture microphone access check.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Request microphone access, classifying the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::PermissionDenied`] when the user or policy
    /// blocked access, or [`SessionError::DeviceUnavailable`] when no input
    /// device exists or the hardware failed.
    async fn request_microphone(&self) -> Result<PermissionOutcome>;
}

/// Permission gate backed by a cpal input-stream probe.
pub struct CpalPermissionGate;

impl CpalPermissionGate {
    /// Create a new cpal-backed gate.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalPermissionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionGate for CpalPermissionGate {
    async fn request_microphone(&self) -> Result<PermissionOutcome> {
        // cpal streams are !Send, so the whole open/release probe runs on
        // a blocking thread and only the classification crosses back.
        let outcome = tokio::task::spawn_blocking(probe_input_device)
            .await
            .map_err(|e| SessionError::Channel(format!("permission probe task failed: {e}")))?;
        if outcome.is_ok() {
            info!("microphone permission probe succeeded");
        }
        outcome
    }
}

/// Open the default input device, start a stream, and release it immediately.
fn probe_input_device() -> Result<PermissionOutcome> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| SessionError::DeviceUnavailable("no default input device".into()))?;

    let config = device
        .default_input_config()
        .map_err(|e| SessionError::DeviceUnavailable(format!("no default input config: {e}")))?;

    let stream = device
        .build_input_stream(
            &config.into(),
            |_data: &[f32], _info: &cpal::InputCallbackInfo| {},
            |err| debug!("probe stream error: {err}"),
            None,
        )
        .map_err(|e| classify_stream_error(&e.to_string()))?;

    stream
        .play()
        .map_err(|e| classify_stream_error(&e.to_string()))?;

    // The stream was only needed to trigger the OS prompt.
    drop(stream);
    Ok(PermissionOutcome::Granted)
}

/// Distinguish policy refusals from hardware failures by the backend message.
fn classify_stream_error(message: &str) -> SessionError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("denied") || lower.contains("permission") || lower.contains("not allowed") {
        SessionError::PermissionDenied
    } else {
        SessionError::DeviceUnavailable(message.to_owned())
    }
}

/// Gate for platforms with no pre-check capability.
pub struct AssumedPermissionGate;

#[async_trait]
impl PermissionGate for AssumedPermissionGate {
    async fn request_microphone(&self) -> Result<PermissionOutcome> {
        debug!("no permission pre-check on this platform, assuming granted");
        Ok(PermissionOutcome::Assumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_refusals_map_to_permission_denied() {
        assert!(matches!(
            classify_stream_error("Access denied by the user"),
            SessionError::PermissionDenied
        ));
        assert!(matches!(
            classify_stream_error("operation not allowed"),
            SessionError::PermissionDenied
        ));
    }

    #[test]
    fn hardware_failures_map_to_device_unavailable() {
        assert!(matches!(
            classify_stream_error("device disconnected"),
            SessionError::DeviceUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn assumed_gate_is_explicit_fallback() {
        let gate = AssumedPermissionGate;
        assert_eq!(
            gate.request_microphone().await.expect("assumed grant"),
            PermissionOutcome::Assumed
        );
    }
}
