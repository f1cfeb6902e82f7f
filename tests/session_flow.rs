//! End-to-end session state machine tests against scripted fakes.

use pitchloop::engines::CaptureEvent;
use pitchloop::error::ErrorKind;
use pitchloop::persona::PersonaContext;
use pitchloop::session::{SessionHandle, SessionPhase, SessionSnapshot, TranscriptSource};
use pitchloop::simulate::SimulationResult;
use pitchloop::test_utils::{
    FakeCaptureEngine, FakePermissionGate, FakeSimulation, FakeSynthesisEngine, voice,
};
use pitchloop::voice::Accent;
use pitchloop::{SessionConfig, SessionController, SessionError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Harness {
    handle: SessionHandle,
    state: watch::Receiver<SessionSnapshot>,
    gate: Arc<FakePermissionGate>,
    capture: Arc<FakeCaptureEngine>,
    synth: Arc<FakeSynthesisEngine>,
    sim: Arc<FakeSimulation>,
}

fn persona() -> PersonaContext {
    PersonaContext {
        name: "Budget-Conscious Buyer".to_owned(),
        prompt: "You are price-sensitive...".to_owned(),
    }
}

fn reply(buyer: &str, feedback: &str) -> SimulationResult {
    SimulationResult {
        buyer_reply: buyer.to_owned(),
        feedback: feedback.to_owned(),
    }
}

fn spawn(sim: FakeSimulation) -> Harness {
    spawn_with_gate(sim, FakePermissionGate::granted())
}

fn spawn_with_gate(sim: FakeSimulation, gate: FakePermissionGate) -> Harness {
    let gate = Arc::new(gate);
    let capture = Arc::new(FakeCaptureEngine::new());
    let synth = Arc::new(FakeSynthesisEngine::new());
    let sim = Arc::new(sim);

    let handle = SessionController::new(
        SessionConfig::default(),
        gate.clone(),
        sim.clone(),
    )
    .with_capture_engine(capture.clone())
    .with_synthesis_engine(synth.clone())
    .with_persona(persona())
    .spawn();

    let state = handle.subscribe();
    Harness {
        handle,
        state,
        gate,
        capture,
        synth,
        sim,
    }
}

async fn wait_until(
    state: &mut watch::Receiver<SessionSnapshot>,
    what: &str,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(2), state.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("session task dropped")
        .clone()
}

/// Give queued commands a chance to run when asserting that nothing changed.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ── capture flow ─────────────────────────────────────────────────────────

#[tokio::test]
async fn voice_capture_updates_transcript() {
    let mut h = spawn(FakeSimulation::manual());

    h.handle.start_listening().await.expect("command");
    wait_until(&mut h.state, "listening", |s| {
        s.phase == SessionPhase::Listening
    })
    .await;
    assert_eq!(h.gate.request_count(), 1);
    assert_eq!(h.capture.started_locales(), vec!["en-IN"]);

    h.capture
        .emit(CaptureEvent::Transcript(
            "  I can offer a ten percent discount  ".to_owned(),
        ))
        .await;

    let snap = wait_until(&mut h.state, "transcript", |s| !s.transcript.is_blank()).await;
    assert_eq!(snap.phase, SessionPhase::Idle);
    assert_eq!(snap.transcript.text, "I can offer a ten percent discount");
    assert_eq!(snap.transcript.source, TranscriptSource::Voice);
    assert!(h.capture.stop_count() >= 1, "single-shot result stops the engine");

    h.handle.shutdown().await;
}

#[tokio::test]
async fn second_start_while_listening_is_noop() {
    let mut h = spawn(FakeSimulation::manual());

    h.handle.start_listening().await.expect("command");
    wait_until(&mut h.state, "listening", |s| {
        s.phase == SessionPhase::Listening
    })
    .await;

    h.handle.start_listening().await.expect("command");
    settle().await;

    assert_eq!(h.capture.start_count(), 1);
    assert_eq!(h.gate.request_count(), 1);
    assert_eq!(h.handle.snapshot().phase, SessionPhase::Listening);

    h.handle.shutdown().await;
}

#[tokio::test]
async fn permission_denied_surfaces_error() {
    let mut h = spawn_with_gate(
        FakeSimulation::manual(),
        FakePermissionGate::failing(SessionError::PermissionDenied),
    );

    h.handle.start_listening().await.expect("command");
    let snap = wait_until(&mut h.state, "error", |s| s.error_kind().is_some()).await;
    assert_eq!(snap.error_kind(), Some(ErrorKind::PermissionDenied));
    assert_eq!(h.capture.start_count(), 0, "engine never starts when denied");

    h.handle.shutdown().await;
}

#[tokio::test]
async fn no_speech_error_keeps_transcript() {
    let mut h = spawn(FakeSimulation::manual());

    h.handle.set_transcript("draft pitch").await.expect("command");
    h.handle.start_listening().await.expect("command");
    wait_until(&mut h.state, "listening", |s| {
        s.phase == SessionPhase::Listening
    })
    .await;

    h.capture.emit(CaptureEvent::Error("no-speech".to_owned())).await;

    let snap = wait_until(&mut h.state, "error", |s| s.error_kind().is_some()).await;
    assert_eq!(snap.error_kind(), Some(ErrorKind::NoSpeechDetected));
    assert_eq!(snap.transcript.text, "draft pitch");

    h.handle.shutdown().await;
}

#[tokio::test]
async fn engine_start_failure_surfaces_error() {
    let mut h = spawn(FakeSimulation::manual());
    h.capture
        .fail_next_start(SessionError::CaptureFailed("engine busy".to_owned()));

    h.handle.start_listening().await.expect("command");
    let snap = wait_until(&mut h.state, "error", |s| s.error_kind().is_some()).await;
    assert_eq!(snap.error_kind(), Some(ErrorKind::CaptureFailed));

    h.handle.shutdown().await;
}

#[tokio::test]
async fn natural_end_without_result_is_silent() {
    let mut h = spawn(FakeSimulation::manual());

    h.handle.start_listening().await.expect("command");
    wait_until(&mut h.state, "listening", |s| {
        s.phase == SessionPhase::Listening
    })
    .await;

    h.capture.emit(CaptureEvent::End).await;

    let snap = wait_until(&mut h.state, "idle", |s| s.phase == SessionPhase::Idle).await;
    assert!(snap.transcript.is_blank());
    assert!(snap.error_kind().is_none());

    h.handle.shutdown().await;
}

#[tokio::test]
async fn capture_unsupported_is_detected_up_front() {
    let sim = Arc::new(FakeSimulation::manual());
    let handle = SessionController::new(
        SessionConfig::default(),
        Arc::new(FakePermissionGate::granted()),
        sim,
    )
    .spawn();
    let mut state = handle.subscribe();

    handle.start_listening().await.expect("command");
    let snap = wait_until(&mut state, "error", |s| s.error_kind().is_some()).await;
    assert_eq!(snap.error_kind(), Some(ErrorKind::CaptureUnsupported));

    handle.shutdown().await;
}

// ── simulation flow ──────────────────────────────────────────────────────

#[tokio::test]
async fn simulation_success_populates_result() {
    let mut h = spawn(FakeSimulation::manual());

    h.handle
        .set_transcript("I can offer a ten percent discount on annual plans")
        .await
        .expect("command");
    h.handle.simulate().await.expect("command");
    wait_until(&mut h.state, "awaiting reply", |s| {
        s.phase == SessionPhase::AwaitingReply
    })
    .await;

    let expected = reply(
        "That's interesting, but what about multi-year contracts?",
        "Good opening; probe for the buyer's contract horizon next time.",
    );
    h.sim.respond(Ok(expected.clone())).await;

    let snap = wait_until(&mut h.state, "result", |s| s.result.is_some()).await;
    assert_eq!(snap.phase, SessionPhase::Idle);
    assert_eq!(snap.result, Some(expected));
    assert_eq!(
        h.sim.calls(),
        vec![(
            "I can offer a ten percent discount on annual plans".to_owned(),
            "You are price-sensitive...".to_owned(),
        )]
    );

    h.handle.shutdown().await;
}

#[tokio::test]
async fn failed_resubmission_clears_previous_result() {
    let mut h = spawn(FakeSimulation::manual());

    h.handle.set_transcript("first pitch").await.expect("command");
    h.handle.simulate().await.expect("command");
    h.sim.respond(Ok(reply("sounds fine", "good"))).await;
    wait_until(&mut h.state, "first result", |s| s.result.is_some()).await;

    h.handle.set_transcript("second pitch").await.expect("command");
    h.handle.simulate().await.expect("command");
    h.sim
        .respond(Err(SessionError::ServerError("model timeout".to_owned())))
        .await;

    let snap = wait_until(&mut h.state, "error", |s| s.error_kind().is_some()).await;
    assert_eq!(snap.error_kind(), Some(ErrorKind::Server));
    match &snap.phase {
        SessionPhase::Error { message, .. } => assert_eq!(message, "model timeout"),
        other => panic!("expected error phase, got {other:?}"),
    }
    assert_eq!(snap.result, None, "stale success must not stay on screen");

    h.handle.shutdown().await;
}

#[tokio::test]
async fn stale_reply_is_discarded() {
    let mut h = spawn(FakeSimulation::manual());

    h.handle.set_transcript("first pitch").await.expect("command");
    h.handle.simulate().await.expect("command");
    wait_until(&mut h.state, "awaiting first", |s| {
        s.phase == SessionPhase::AwaitingReply
    })
    .await;

    // Supersede the first request before its reply arrives.
    h.handle.reset().await.expect("command");
    wait_until(&mut h.state, "idle after reset", |s| {
        s.phase == SessionPhase::Idle
    })
    .await;
    h.handle.set_transcript("second pitch").await.expect("command");
    h.handle.simulate().await.expect("command");
    wait_until(&mut h.state, "awaiting second", |s| {
        s.phase == SessionPhase::AwaitingReply
    })
    .await;

    // The first (stale) reply completes first and must be dropped.
    h.sim.respond(Ok(reply("stale buyer", "stale feedback"))).await;
    settle().await;
    let snap = h.handle.snapshot();
    assert_eq!(snap.phase, SessionPhase::AwaitingReply);
    assert_eq!(snap.result, None);

    let fresh = reply("fresh buyer", "fresh feedback");
    h.sim.respond(Ok(fresh.clone())).await;
    let snap = wait_until(&mut h.state, "fresh result", |s| s.result.is_some()).await;
    assert_eq!(snap.result, Some(fresh));

    h.handle.shutdown().await;
}

#[tokio::test]
async fn empty_transcript_simulate_is_noop() {
    let h = spawn(FakeSimulation::manual());

    h.handle.set_transcript("   ").await.expect("command");
    h.handle.simulate().await.expect("command");
    settle().await;

    assert!(h.sim.calls().is_empty());
    assert_eq!(h.handle.snapshot().phase, SessionPhase::Idle);

    h.handle.shutdown().await;
}

#[tokio::test]
async fn listening_and_simulate_are_mutually_exclusive() {
    let mut h = spawn(FakeSimulation::manual());

    h.handle.set_transcript("a pitch").await.expect("command");
    h.handle.start_listening().await.expect("command");
    wait_until(&mut h.state, "listening", |s| {
        s.phase == SessionPhase::Listening
    })
    .await;

    // simulate while listening: no-op, not an error.
    h.handle.simulate().await.expect("command");
    settle().await;
    assert!(h.sim.calls().is_empty());
    assert_eq!(h.handle.snapshot().phase, SessionPhase::Listening);

    h.capture.emit(CaptureEvent::End).await;
    wait_until(&mut h.state, "idle", |s| s.phase == SessionPhase::Idle).await;

    h.handle.simulate().await.expect("command");
    wait_until(&mut h.state, "awaiting", |s| {
        s.phase == SessionPhase::AwaitingReply
    })
    .await;

    // start_listening while a request is in flight: also a no-op.
    h.handle.start_listening().await.expect("command");
    settle().await;
    assert_eq!(h.capture.start_count(), 1);
    assert_eq!(h.handle.snapshot().phase, SessionPhase::AwaitingReply);

    h.handle.shutdown().await;
}

// ── playback flow ────────────────────────────────────────────────────────

async fn harness_with_result(buyer: &str) -> Harness {
    let mut h = spawn(FakeSimulation::auto(Ok(reply(buyer, "solid delivery"))));
    h.synth
        .set_voices(vec![voice("us", "en-US"), voice("in", "en-IN")]);
    h.handle.set_transcript("my pitch").await.expect("command");
    h.handle.simulate().await.expect("command");
    wait_until(&mut h.state, "result", |s| s.result.is_some()).await;
    h
}

#[tokio::test]
async fn play_pause_resume_stop_cycle() {
    let mut h = harness_with_result("What about multi-year contracts?").await;

    h.handle.play_reply().await.expect("command");
    wait_until(&mut h.state, "speaking", |s| {
        s.phase == SessionPhase::Speaking
    })
    .await;
    assert_eq!(
        h.synth.spoken_texts(),
        vec!["What about multi-year contracts?"]
    );
    // Default accent is Indian and the catalog has an exact en-IN match.
    let requests = h.synth.spoken_requests();
    assert_eq!(
        requests[0].voice.as_ref().map(|v| v.id.as_str()),
        Some("in")
    );

    h.handle.pause_audio().await.expect("command");
    wait_until(&mut h.state, "paused", |s| s.phase == SessionPhase::Paused).await;
    assert!(h.synth.is_paused());

    h.handle.resume_audio().await.expect("command");
    wait_until(&mut h.state, "speaking again", |s| {
        s.phase == SessionPhase::Speaking
    })
    .await;
    assert!(!h.synth.is_paused());

    h.handle.stop_audio().await.expect("command");
    wait_until(&mut h.state, "idle", |s| s.phase == SessionPhase::Idle).await;

    h.handle.shutdown().await;
}

#[tokio::test]
async fn pause_resume_without_utterance_is_noop() {
    let h = spawn(FakeSimulation::manual());

    h.handle.pause_audio().await.expect("command");
    h.handle.resume_audio().await.expect("command");
    settle().await;

    assert_eq!(h.handle.snapshot().phase, SessionPhase::Idle);
    assert!(h.synth.spoken_texts().is_empty());

    h.handle.shutdown().await;
}

#[tokio::test]
async fn utterance_natural_end_returns_to_idle() {
    let mut h = harness_with_result("A fair point.").await;

    h.handle.play_reply().await.expect("command");
    wait_until(&mut h.state, "speaking", |s| {
        s.phase == SessionPhase::Speaking
    })
    .await;

    h.synth.finish_utterance().await;
    let snap = wait_until(&mut h.state, "idle", |s| s.phase == SessionPhase::Idle).await;
    assert!(snap.result.is_some(), "playback does not clear the result");

    h.handle.shutdown().await;
}

#[tokio::test]
async fn playback_error_surfaces_and_recovers() {
    let mut h = harness_with_result("Let me think.").await;

    h.handle.play_reply().await.expect("command");
    wait_until(&mut h.state, "speaking", |s| {
        s.phase == SessionPhase::Speaking
    })
    .await;

    h.synth.fail_utterance("audio route lost").await;
    let snap = wait_until(&mut h.state, "error", |s| s.error_kind().is_some()).await;
    assert_eq!(snap.error_kind(), Some(ErrorKind::SynthesisUnavailable));

    // playAudio is reachable from the error state.
    h.handle.play_reply().await.expect("command");
    wait_until(&mut h.state, "speaking again", |s| {
        s.phase == SessionPhase::Speaking
    })
    .await;

    h.handle.shutdown().await;
}

#[tokio::test]
async fn fresh_reply_stops_active_utterance() {
    let mut h = spawn(FakeSimulation::manual());
    h.synth.set_voices(vec![voice("us", "en-US")]);

    h.handle.set_transcript("opening pitch").await.expect("command");
    h.handle.simulate().await.expect("command");
    h.sim.respond(Ok(reply("first reply", "ok"))).await;
    wait_until(&mut h.state, "first result", |s| s.result.is_some()).await;

    h.handle.play_reply().await.expect("command");
    wait_until(&mut h.state, "speaking", |s| {
        s.phase == SessionPhase::Speaking
    })
    .await;
    let cancels_before = h.synth.cancel_count();

    h.handle.set_transcript("follow-up pitch").await.expect("command");
    h.handle.simulate().await.expect("command");
    let fresh = reply("second reply", "better");
    h.sim.respond(Ok(fresh.clone())).await;

    let snap = wait_until(&mut h.state, "second result", |s| {
        s.result.as_ref() == Some(&fresh)
    })
    .await;
    assert_eq!(snap.phase, SessionPhase::Idle);
    assert!(
        h.synth.cancel_count() > cancels_before,
        "the superseded utterance is retired before the new result lands"
    );

    h.handle.shutdown().await;
}

#[tokio::test]
async fn play_without_synthesis_engine_is_unavailable() {
    let sim = Arc::new(FakeSimulation::auto(Ok(reply("hello", "fine"))));
    let handle = SessionController::new(
        SessionConfig::default(),
        Arc::new(FakePermissionGate::granted()),
        sim,
    )
    .with_persona(persona())
    .spawn();
    let mut state = handle.subscribe();

    handle.set_transcript("pitch").await.expect("command");
    handle.simulate().await.expect("command");
    wait_until(&mut state, "result", |s| s.result.is_some()).await;

    handle.play_reply().await.expect("command");
    let snap = wait_until(&mut state, "error", |s| s.error_kind().is_some()).await;
    assert_eq!(snap.error_kind(), Some(ErrorKind::SynthesisUnavailable));

    handle.shutdown().await;
}

// ── voice profile ────────────────────────────────────────────────────────

#[tokio::test]
async fn late_catalog_population_reresolves_voice() {
    let mut h = spawn(FakeSimulation::manual());
    assert_eq!(h.handle.snapshot().voice, None);

    // Accent default is Indian; no en-IN voice exists, so the prefix
    // fallback lands on en-US.
    h.synth
        .set_voices(vec![voice("fr", "fr-FR"), voice("us", "en-US")]);

    let snap = wait_until(&mut h.state, "voice resolved", |s| s.voice.is_some()).await;
    assert_eq!(snap.voice.as_ref().map(|v| v.id.as_str()), Some("us"));

    h.handle.shutdown().await;
}

#[tokio::test]
async fn accent_and_persona_changes_keep_transcript_and_result() {
    let mut h = spawn(FakeSimulation::auto(Ok(reply("noted", "nice"))));
    h.synth
        .set_voices(vec![voice("us", "en-US"), voice("gb", "en-GB")]);

    h.handle.set_transcript("my pitch").await.expect("command");
    h.handle.simulate().await.expect("command");
    wait_until(&mut h.state, "result", |s| s.result.is_some()).await;

    h.handle.set_accent(Accent::Uk).await.expect("command");
    let snap = wait_until(&mut h.state, "uk accent", |s| s.accent == Accent::Uk).await;
    assert_eq!(snap.voice.as_ref().map(|v| v.id.as_str()), Some("gb"));
    assert_eq!(snap.transcript.text, "my pitch");
    assert!(snap.result.is_some());

    h.handle
        .set_persona(PersonaContext {
            name: "Skeptical Researcher".to_owned(),
            prompt: "You are highly skeptical...".to_owned(),
        })
        .await
        .expect("command");
    let snap = wait_until(&mut h.state, "persona", |s| {
        s.persona.as_deref() == Some("Skeptical Researcher")
    })
    .await;
    assert_eq!(snap.transcript.text, "my pitch");
    assert!(snap.result.is_some());

    h.handle.shutdown().await;
}

// ── reset ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reset_from_listening_tears_down_capture() {
    let mut h = spawn(FakeSimulation::manual());

    h.handle.start_listening().await.expect("command");
    wait_until(&mut h.state, "listening", |s| {
        s.phase == SessionPhase::Listening
    })
    .await;
    let stops_before = h.capture.stop_count();

    h.handle.reset().await.expect("command");
    let snap = wait_until(&mut h.state, "idle", |s| s.phase == SessionPhase::Idle).await;
    assert!(snap.transcript.is_blank());
    assert_eq!(snap.result, None);
    assert!(h.capture.stop_count() > stops_before);

    h.handle.shutdown().await;
}

#[tokio::test]
async fn reset_from_speaking_cancels_utterance() {
    let mut h = harness_with_result("Tell me more.").await;

    h.handle.play_reply().await.expect("command");
    wait_until(&mut h.state, "speaking", |s| {
        s.phase == SessionPhase::Speaking
    })
    .await;
    let cancels_before = h.synth.cancel_count();

    h.handle.reset().await.expect("command");
    let snap = wait_until(&mut h.state, "idle", |s| {
        s.phase == SessionPhase::Idle && s.result.is_none()
    })
    .await;
    assert!(snap.transcript.is_blank());
    assert!(h.synth.cancel_count() > cancels_before);

    h.handle.shutdown().await;
}

#[tokio::test]
async fn reset_from_error_clears_error() {
    let mut h = spawn_with_gate(
        FakeSimulation::manual(),
        FakePermissionGate::failing(SessionError::DeviceUnavailable("no mic".to_owned())),
    );

    h.handle.start_listening().await.expect("command");
    wait_until(&mut h.state, "error", |s| s.error_kind().is_some()).await;

    h.handle.reset().await.expect("command");
    let snap = wait_until(&mut h.state, "idle", |s| s.phase == SessionPhase::Idle).await;
    assert!(snap.error_kind().is_none());

    h.handle.shutdown().await;
}
