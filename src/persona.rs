//! Buyer persona catalog.
//!
//! Personas are external data as far as the session controller is concerned:
//! it forwards a persona's prompt verbatim and never inspects the contents.
//! The built-in catalog ships the six rehearsal personas, each with a
//! difficulty tier and trait scores for the selection UI.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Difficulty tier of a buyer persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
        };
        f.write_str(s)
    }
}

/// Behavioral trait scores (0-100) shown on persona cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaTraits {
    pub patience: u8,
    pub analytical: u8,
    pub emotional: u8,
}

/// A simulated buyer persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Difficulty tier.
    pub difficulty: Difficulty,
    /// Short description for the selection UI.
    pub description: String,
    /// Behavioral prompt forwarded verbatim to the reasoning service.
    pub prompt: String,
    /// Trait scores.
    pub traits: PersonaTraits,
}

/// The opaque pair the session controller forwards: display name plus the
/// behavior prompt. The controller never looks inside either string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaContext {
    pub name: String,
    pub prompt: String,
}

impl From<&Persona> for PersonaContext {
    fn from(persona: &Persona) -> Self {
        Self {
            name: persona.name.clone(),
            prompt: persona.prompt.clone(),
        }
    }
}

/// Catalog of available buyer personas.
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    personas: Vec<Persona>,
}

impl PersonaCatalog {
    /// The built-in rehearsal personas.
    pub fn builtin() -> Self {
        Self {
            personas: builtin_personas(),
        }
    }

    /// Build a catalog from externally supplied personas.
    pub fn from_personas(personas: Vec<Persona>) -> Self {
        Self { personas }
    }

    /// All personas, in catalog order.
    pub fn all(&self) -> &[Persona] {
        &self.personas
    }

    /// Look up a persona by identifier.
    pub fn by_id(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Personas at the given difficulty tier.
    pub fn filter(&self, difficulty: Difficulty) -> Vec<&Persona> {
        self.personas
            .iter()
            .filter(|p| p.difficulty == difficulty)
            .collect()
    }

    /// Pick a random persona from the whole catalog.
    pub fn random(&self) -> Option<&Persona> {
        self.personas.choose(&mut rand::thread_rng())
    }
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_personas() -> Vec<Persona> {
    fn persona(
        id: &str,
        name: &str,
        difficulty: Difficulty,
        description: &str,
        prompt: &str,
        traits: PersonaTraits,
    ) -> Persona {
        Persona {
            id: id.to_owned(),
            name: name.to_owned(),
            difficulty,
            description: description.to_owned(),
            prompt: prompt.to_owned(),
            traits,
        }
    }

    vec![
        persona(
            "detail_analyst",
            "Detail-Oriented Analyst",
            Difficulty::Hard,
            "Methodical, needs all information, makes spreadsheets",
            "You are a meticulous buyer who wants every detail before deciding. \
             Ask specific technical questions, request data/proof, be methodical \
             and slow to commit. Sound professional but skeptical.",
            PersonaTraits {
                patience: 75,
                analytical: 95,
                emotional: 20,
            },
        ),
        persona(
            "emotional_first_timer",
            "Emotional First-Time Buyer",
            Difficulty::Easy,
            "Nervous, excited, easily overwhelmed, needs reassurance",
            "You are a first-time buyer who is excited but nervous and unsure. \
             Ask for reassurance, get a bit overwhelmed by too much info, need \
             simple explanations. Show enthusiasm mixed with hesitation.",
            PersonaTraits {
                patience: 65,
                analytical: 35,
                emotional: 90,
            },
        ),
        persona(
            "experienced_negotiator",
            "Experienced Negotiator",
            Difficulty::Expert,
            "Master tactician, uses silence and pressure, knows all the tricks",
            "You are a seasoned buyer who has seen every sales trick. Push back \
             hard on pricing, use silence strategically, challenge every claim, \
             negotiate aggressively. Be calm but tough.",
            PersonaTraits {
                patience: 95,
                analytical: 80,
                emotional: 25,
            },
        ),
        persona(
            "budget_conscious",
            "Budget-Conscious Buyer",
            Difficulty::Medium,
            "Price-sensitive, always comparing alternatives, needs value proof",
            "You are price-sensitive and always looking for the best deal. \
             Constantly mention competitors, ask about discounts, question the \
             value proposition. Be friendly but firm about budget constraints.",
            PersonaTraits {
                patience: 50,
                analytical: 70,
                emotional: 40,
            },
        ),
        persona(
            "decision_maker_rush",
            "Rushed Decision Maker",
            Difficulty::Medium,
            "Busy, wants quick answers, no time for details, impatient",
            "You are extremely busy and have no time for long pitches. Interrupt \
             if the seller takes too long, ask for the bottom line immediately, \
             make quick snap judgments. Be impatient and direct.",
            PersonaTraits {
                patience: 20,
                analytical: 50,
                emotional: 45,
            },
        ),
        persona(
            "skeptical_researcher",
            "Skeptical Researcher",
            Difficulty::Hard,
            "Questions everything, fact-checks, sees through fluff",
            "You are highly skeptical and research everything. Challenge claims \
             with counterexamples, ask for proof/references, call out vague \
             statements. Be polite but relentlessly questioning.",
            PersonaTraits {
                patience: 60,
                analytical: 90,
                emotional: 15,
            },
        ),
    ]
}
