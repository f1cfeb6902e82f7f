//! Voice catalog resolution and utterance playback control.
//!
//! The synthesis voice catalog is populated lazily by the platform, so a
//! chosen accent is re-resolved whenever the catalog updates. Playback owns
//! at most one utterance; starting a new one always retires the previous.

use crate::engines::{PlaybackEvent, SynthesisEngine, UtteranceRequest, Voice};
use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Accent preference for the synthesized buyer voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accent {
    Us,
    Uk,
    Indian,
    Australian,
}

impl Accent {
    /// Locales tried first, in order, when resolving a voice.
    pub fn preferred_locales(&self) -> &'static [&'static str] {
        match self {
            Accent::Us => &["en-US", "en-CA"],
            Accent::Uk => &["en-GB"],
            Accent::Indian => &["en-IN"],
            Accent::Australian => &["en-AU", "en-NZ"],
        }
    }

    /// Language prefix used as the second resolution step.
    pub fn language_prefix(&self) -> &'static str {
        "en"
    }
}

impl fmt::Display for Accent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Accent::Us => "us",
            Accent::Uk => "uk",
            Accent::Indian => "indian",
            Accent::Australian => "australian",
        };
        f.write_str(s)
    }
}

impl FromStr for Accent {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "us" => Ok(Accent::Us),
            "uk" => Ok(Accent::Uk),
            "indian" | "in" => Ok(Accent::Indian),
            "australian" | "au" => Ok(Accent::Australian),
            _ => Err(SessionError::Config(format!("unknown accent: {s:?}"))),
        }
    }
}

/// Resolve an accent preference against the voice catalog.
///
/// Deterministic fallback chain:
/// 1. first voice whose locale exactly matches one of the accent's
///    preferred locales, tried in preference order;
/// 2. first voice whose locale starts with the language prefix;
/// 3. the catalog's first voice;
/// 4. `None` for an empty catalog.
pub fn resolve_voice(catalog: &[Voice], accent: Accent) -> Option<Voice> {
    for locale in accent.preferred_locales() {
        if let Some(voice) = catalog.iter().find(|v| v.locale == *locale) {
            return Some(voice.clone());
        }
    }
    if let Some(voice) = catalog
        .iter()
        .find(|v| v.locale.starts_with(accent.language_prefix()))
    {
        return Some(voice.clone());
    }
    catalog.first().cloned()
}

/// An accent preference plus the synthesis voice it currently resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    /// Preferred accent.
    pub accent: Accent,
    /// Resolved voice, `None` while the catalog is empty.
    pub voice: Option<Voice>,
}

/// Playback lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Speaking,
    Paused,
}

/// What [`PlaybackController::resume`] did.
pub enum ResumeAction {
    /// Nothing to resume; state unchanged.
    NoOp,
    /// The paused utterance continued.
    Resumed,
    /// The utterance handle was gone, so the last text was spoken again.
    /// Carries the new utterance's event channel.
    Respoke(mpsc::Receiver<PlaybackEvent>),
}

/// Owns at most one active utterance and its play/pause/resume/stop surface.
pub struct PlaybackController {
    engine: Option<Arc<dyn SynthesisEngine>>,
    phase: PlaybackPhase,
    profile: VoiceProfile,
    last_text: Option<String>,
    rate: f32,
    pitch: f32,
}

impl PlaybackController {
    /// Create an idle controller. `engine` is `None` when the platform has
    /// no synthesis capability; every speak attempt then reports
    /// [`SessionError::SynthesisUnavailable`].
    pub fn new(engine: Option<Arc<dyn SynthesisEngine>>, accent: Accent, rate: f32, pitch: f32) -> Self {
        let voice = engine
            .as_deref()
            .and_then(|e| resolve_voice(&e.voices(), accent));
        Self {
            engine,
            phase: PlaybackPhase::Idle,
            profile: VoiceProfile { accent, voice },
            last_text: None,
            rate,
            pitch,
        }
    }

    /// Current playback phase.
    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    /// The accent preference and currently resolved voice.
    pub fn profile(&self) -> &VoiceProfile {
        &self.profile
    }

    /// Synthesis engine handle, if the platform has one.
    pub fn engine(&self) -> Option<&Arc<dyn SynthesisEngine>> {
        self.engine.as_ref()
    }

    /// Change the accent preference and re-resolve the voice. Does not
    /// affect an utterance already playing.
    pub fn set_accent(&mut self, accent: Accent) {
        self.profile.accent = accent;
        self.refresh_voice();
    }

    /// Re-resolve the voice against the current catalog. Called whenever
    /// the platform reports a catalog update, so an accent chosen before
    /// voices existed still lands on a real voice.
    pub fn refresh_voice(&mut self) {
        self.profile.voice = self
            .engine
            .as_deref()
            .and_then(|e| resolve_voice(&e.voices(), self.profile.accent));
        debug!(
            "voice resolved: accent={} voice={:?}",
            self.profile.accent,
            self.profile.voice.as_ref().map(|v| v.id.as_str())
        );
    }

    /// Start speaking `text`, retiring any existing utterance first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SynthesisUnavailable`] if the platform has no
    /// synthesis engine or the engine refuses to start.
    pub async fn speak(&mut self, text: &str) -> Result<mpsc::Receiver<PlaybackEvent>> {
        let engine = self
            .engine
            .clone()
            .ok_or_else(|| SessionError::SynthesisUnavailable("no synthesis engine".into()))?;

        // At most one utterance handle exists.
        engine.cancel().await;
        self.refresh_voice();

        let request = UtteranceRequest {
            text: text.to_owned(),
            voice: self.profile.voice.clone(),
            rate: self.rate,
            pitch: self.pitch,
        };
        let events = engine.speak(request).await?;

        info!("speaking {} chars", text.len());
        self.last_text = Some(text.to_owned());
        self.phase = PlaybackPhase::Speaking;
        Ok(events)
    }

    /// Pause the active utterance. Valid only while the engine reports
    /// active (non-paused) playback; a no-op otherwise.
    pub async fn pause(&mut self) -> bool {
        if self.phase != PlaybackPhase::Speaking {
            return false;
        }
        let Some(engine) = self.engine.as_deref() else {
            return false;
        };
        if engine.pause().await {
            self.phase = PlaybackPhase::Paused;
            true
        } else {
            false
        }
    }

    /// Resume a paused utterance.
    ///
    /// `handle_live` reports whether the utterance's event channel is still
    /// open. If the handle was cleared while paused, the last known text is
    /// spoken again instead.
    ///
    /// # Errors
    ///
    /// Returns an error only from the re-speak fallback path.
    pub async fn resume(&mut self, handle_live: bool) -> Result<ResumeAction> {
        if self.phase != PlaybackPhase::Paused {
            return Ok(ResumeAction::NoOp);
        }
        if handle_live
            && let Some(engine) = self.engine.as_deref()
            && engine.resume().await
        {
            self.phase = PlaybackPhase::Speaking;
            return Ok(ResumeAction::Resumed);
        }
        match self.last_text.clone() {
            Some(text) => {
                let events = self.speak(&text).await?;
                Ok(ResumeAction::Respoke(events))
            }
            None => {
                self.phase = PlaybackPhase::Idle;
                Ok(ResumeAction::NoOp)
            }
        }
    }

    /// Record natural completion or engine failure of the active utterance.
    pub fn finished(&mut self) {
        self.phase = PlaybackPhase::Idle;
    }

    /// Cancel any engine activity and return to idle. Always safe, always
    /// idempotent.
    pub async fn stop(&mut self) {
        if let Some(engine) = self.engine.as_deref() {
            engine.cancel().await;
        }
        self.phase = PlaybackPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeSynthesisEngine;

    fn voice(id: &str, locale: &str) -> Voice {
        Voice {
            id: id.to_owned(),
            name: id.to_owned(),
            locale: locale.to_owned(),
        }
    }

    #[test]
    fn exact_locale_wins() {
        let catalog = vec![voice("a", "en-GB"), voice("b", "en-US"), voice("c", "en-CA")];
        let resolved = resolve_voice(&catalog, Accent::Us).expect("voice");
        assert_eq!(resolved.id, "b");
    }

    #[test]
    fn preference_order_within_accent() {
        // en-CA is listed second for the US accent, so en-US wins even when
        // en-CA appears earlier in the catalog.
        let catalog = vec![voice("ca", "en-CA"), voice("us", "en-US")];
        let resolved = resolve_voice(&catalog, Accent::Us).expect("voice");
        assert_eq!(resolved.id, "us");
    }

    #[test]
    fn language_prefix_beats_first_voice() {
        // No en-GB voice: the UK accent falls back to the first English-
        // prefixed voice, never the French one.
        let catalog = vec![voice("us", "en-US"), voice("fr", "fr-FR")];
        let resolved = resolve_voice(&catalog, Accent::Uk).expect("voice");
        assert_eq!(resolved.id, "us");

        let catalog = vec![voice("fr", "fr-FR"), voice("us", "en-US")];
        let resolved = resolve_voice(&catalog, Accent::Uk).expect("voice");
        assert_eq!(resolved.id, "us");
    }

    #[test]
    fn first_voice_is_last_resort() {
        let catalog = vec![voice("fr", "fr-FR"), voice("de", "de-DE")];
        let resolved = resolve_voice(&catalog, Accent::Indian).expect("voice");
        assert_eq!(resolved.id, "fr");
    }

    #[test]
    fn empty_catalog_resolves_to_none() {
        assert_eq!(resolve_voice(&[], Accent::Australian), None);
    }

    #[tokio::test]
    async fn accent_change_reresolves_voice() {
        let engine = Arc::new(FakeSynthesisEngine::new());
        engine.set_voices(vec![voice("us", "en-US"), voice("gb", "en-GB")]);

        let mut playback =
            PlaybackController::new(Some(engine.clone()), Accent::Us, 1.0, 1.0);
        assert_eq!(playback.profile().voice.as_ref().map(|v| v.id.as_str()), Some("us"));

        playback.set_accent(Accent::Uk);
        assert_eq!(playback.profile().voice.as_ref().map(|v| v.id.as_str()), Some("gb"));
    }

    #[tokio::test]
    async fn late_catalog_population_reresolves() {
        let engine = Arc::new(FakeSynthesisEngine::new());
        let mut playback =
            PlaybackController::new(Some(engine.clone()), Accent::Uk, 1.0, 1.0);
        assert!(playback.profile().voice.is_none());

        engine.set_voices(vec![voice("us", "en-US"), voice("fr", "fr-FR")]);
        playback.refresh_voice();
        assert_eq!(playback.profile().voice.as_ref().map(|v| v.id.as_str()), Some("us"));
    }

    #[tokio::test]
    async fn speak_retires_previous_utterance() {
        let engine = Arc::new(FakeSynthesisEngine::new());
        let mut playback =
            PlaybackController::new(Some(engine.clone()), Accent::Us, 1.0, 1.0);

        let _first = playback.speak("first").await.expect("first speak");
        let cancels_before = engine.cancel_count();
        let _second = playback.speak("second").await.expect("second speak");

        assert!(engine.cancel_count() > cancels_before);
        assert_eq!(playback.phase(), PlaybackPhase::Speaking);
    }

    #[tokio::test]
    async fn pause_is_noop_when_idle() {
        let engine = Arc::new(FakeSynthesisEngine::new());
        let mut playback = PlaybackController::new(Some(engine), Accent::Us, 1.0, 1.0);
        assert!(!playback.pause().await);
        assert_eq!(playback.phase(), PlaybackPhase::Idle);
    }

    #[tokio::test]
    async fn resume_respeaks_when_handle_cleared() {
        let engine = Arc::new(FakeSynthesisEngine::new());
        let mut playback =
            PlaybackController::new(Some(engine.clone()), Accent::Us, 1.0, 1.0);

        let _events = playback.speak("pitch recap").await.expect("speak");
        assert!(playback.pause().await);

        match playback.resume(false).await.expect("resume") {
            ResumeAction::Respoke(_) => {}
            _ => panic!("expected re-speak fallback"),
        }
        assert_eq!(engine.spoken_texts(), vec!["pitch recap", "pitch recap"]);
    }

    #[tokio::test]
    async fn speak_without_engine_is_unavailable() {
        let mut playback = PlaybackController::new(None, Accent::Us, 1.0, 1.0);
        match playback.speak("anything").await {
            Err(SessionError::SynthesisUnavailable(_)) => {}
            other => panic!("expected SynthesisUnavailable, got {other:?}"),
        }
    }
}
