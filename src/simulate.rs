//! Simulation request pipeline.
//!
//! Sends one rehearsal turn (the transcript plus the opaque persona prompt)
//! to the remote reasoning endpoint and maps the reply into
//! [`SimulationResult`] or the session error taxonomy. Exactly one request
//! is authoritative at a time; the orchestrator serializes submissions and
//! discards stale replies, so no retry logic lives here.

use crate::config::SimulationConfig;
use crate::credentials::CredentialProvider;
use crate::error::{Result, SessionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Buyer reply and coaching feedback for one rehearsal turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// What the simulated buyer says back.
    pub buyer_reply: String,
    /// Coaching feedback on the pitch.
    pub feedback: String,
}

/// Outbound request body for the simulation endpoint.
#[derive(Debug, Serialize)]
struct SimulateBody<'a> {
    user_text: &'a str,
    persona_prompt: &'a str,
}

/// Failure reply body. Either field may carry a human-readable explanation.
#[derive(Debug, Deserialize)]
struct FailureBody {
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// One-shot remote simulation call.
#[async_trait]
pub trait SimulationBackend: Send + Sync {
    /// Submit a rehearsal turn and await the structured reply.
    ///
    /// # Errors
    ///
    /// `NetworkError` for transport failures or unparsable bodies,
    /// `ServerError` for well-formed failure replies, `Unauthenticated`
    /// when the credential is rejected or cannot be acquired.
    async fn submit(&self, user_text: &str, persona_prompt: &str) -> Result<SimulationResult>;
}

/// HTTP client for the simulation endpoint.
pub struct SimulationClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl SimulationClient {
    /// Build a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns a config error if the HTTP client cannot be constructed.
    pub fn new(config: &SimulationConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SessionError::Config(format!("cannot build HTTP client: {e}")))?;

        info!("simulation endpoint: {}", config.endpoint);
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            credentials,
        })
    }
}

#[async_trait]
impl SimulationBackend for SimulationClient {
    async fn submit(&self, user_text: &str, persona_prompt: &str) -> Result<SimulationResult> {
        let token = self.credentials.bearer_token().await?;

        let body = SimulateBody {
            user_text,
            persona_prompt,
        };

        debug!("submitting rehearsal turn ({} chars)", user_text.len());
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<SimulationResult>()
                .await
                .map_err(|e| SessionError::NetworkError(format!("malformed reply: {e}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SessionError::NetworkError(e.to_string()))?;

        // A failure body may still carry a human-readable explanation,
        // preferred over the generic message.
        let explanation = serde_json::from_slice::<FailureBody>(&bytes)
            .ok()
            .and_then(|b| b.detail.or(b.feedback));

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SessionError::Unauthenticated(
                explanation.unwrap_or_else(|| "credential rejected".to_owned()),
            ));
        }

        match explanation {
            Some(message) => Err(SessionError::ServerError(message)),
            None => {
                if serde_json::from_slice::<serde_json::Value>(&bytes).is_ok() {
                    Err(SessionError::ServerError(format!(
                        "simulation failed with status {status}"
                    )))
                } else {
                    Err(SessionError::NetworkError(format!(
                        "unparsable error reply (status {status})"
                    )))
                }
            }
        }
    }
}
