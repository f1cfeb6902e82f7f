//! Typed-text rehearsal loop over stdin.
//!
//! Picks a buyer persona, reads pitch lines from stdin, submits each one to
//! the simulation endpoint, and prints the buyer reply and coaching
//! feedback. Speech capture and synthesis engines are platform adapters
//! this binary does not carry, so it runs in typed mode only.
//!
//! Tracing goes to stderr so stdout stays readable.

use anyhow::Context;
use pitchloop::credentials::StaticCredential;
use pitchloop::permissions::AssumedPermissionGate;
use pitchloop::session::SessionPhase;
use pitchloop::{PersonaCatalog, PersonaContext, SessionConfig, SessionController, SimulationClient};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = SessionConfig::default_config_path();
    let config = if config_path.exists() {
        SessionConfig::from_file(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        SessionConfig::default()
    };

    let token = std::env::var("PITCHLOOP_TOKEN").unwrap_or_default();
    let credentials = Arc::new(StaticCredential::new(token));
    let client = SimulationClient::new(&config.simulation, credentials)?;

    let catalog = PersonaCatalog::builtin();
    let persona = match std::env::args().nth(1) {
        Some(id) => catalog
            .by_id(&id)
            .with_context(|| format!("unknown persona '{id}'"))?,
        None => catalog.random().context("empty persona catalog")?,
    };
    println!("Rehearsing against: {} ({})", persona.name, persona.difficulty);
    println!("{}", persona.description);
    println!();

    let handle = SessionController::new(config, Arc::new(AssumedPermissionGate), Arc::new(client))
        .with_persona(PersonaContext::from(persona))
        .spawn();
    let mut state = handle.subscribe();

    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let pitch = line.trim();
        if pitch.is_empty() {
            continue;
        }
        if pitch == "/quit" {
            break;
        }

        handle.set_transcript(pitch).await?;
        handle.simulate().await?;

        // Wait for the request to become authoritative, then to settle.
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| matches!(s.phase, SessionPhase::AwaitingReply)),
        )
        .await
        .context("request was never issued")?
        .context("session shut down")?;
        let settled = tokio::time::timeout(
            Duration::from_secs(120),
            state.wait_for(|s| !matches!(s.phase, SessionPhase::AwaitingReply)),
        )
        .await
        .context("simulation timed out")?
        .context("session shut down")?
        .clone();

        match settled.phase {
            SessionPhase::Error { message, .. } => {
                eprintln!("error: {message}");
            }
            _ => {
                if let Some(result) = settled.result {
                    println!("buyer> {}", result.buyer_reply);
                    println!("coach> {}", result.feedback);
                }
            }
        }
        println!();
    }

    handle.shutdown().await;
    Ok(())
}
