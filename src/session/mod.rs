//! Session orchestration: the top-level state machine that sequences the
//! permission gate, speech capture, the simulation pipeline, and playback.

pub mod controller;
pub mod state;

pub use controller::{SessionCommand, SessionController, SessionHandle};
pub use state::{SessionPhase, SessionSnapshot, Transcript, TranscriptSource};
