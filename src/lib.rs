//! Pitchloop: rehearse a sales pitch against a simulated buyer.
//!
//! A rehearsal turn flows through an asynchronous session controller:
//! Microphone → single-shot STT → simulation endpoint → buyer reply +
//! coaching feedback → TTS playback.
//!
//! # Architecture
//!
//! The controller is a single task owning the composite state machine,
//! fed by channels:
//! - **Permission gate**: one microphone access check per capture attempt
//! - **Capture session**: at most one single-shot recognition attempt
//! - **Simulation pipeline**: exactly one authoritative request in flight,
//!   stale replies discarded by sequence number
//! - **Playback**: at most one utterance, with pause/resume/stop
//!
//! The platform speech engines are injected behind traits ([`engines`]),
//! so the whole state machine runs against fakes in tests.

pub mod capture;
pub mod config;
pub mod credentials;
pub mod engines;
pub mod error;
pub mod permissions;
pub mod persona;
pub mod session;
pub mod simulate;
pub mod test_utils;
pub mod voice;

pub use config::SessionConfig;
pub use error::{ErrorKind, Result, SessionError};
pub use persona::{Persona, PersonaCatalog, PersonaContext};
pub use session::{SessionController, SessionHandle, SessionPhase, SessionSnapshot};
pub use simulate::{SimulationClient, SimulationResult};
pub use voice::Accent;
