//! Reward text shown when a mission completes.

use std::sync::Arc;

use indoc::formatdoc;
use rand::seq::SliceRandom;

use super::types::Vibe;
use crate::error::GenerationError;
use crate::generation::TextGenerator;

/// Substituted when the collaborator fails outright.
pub const FALLBACK_REWARD: &str =
    "Your adventure was a success! Every step brought you closer to mastery.";

const MAX_REWARD_CHARS: usize = 200;

pub fn themes(vibe: Vibe) -> &'static [&'static str] {
    match vibe {
        Vibe::Chill => &[
            "peaceful discoveries",
            "moments of tranquility",
            "serene observations",
            "gentle encounters",
            "quiet wonders",
        ],
        Vibe::Discovery => &[
            "hidden treasures",
            "unexpected findings",
            "urban secrets",
            "mysterious landmarks",
            "forgotten pathways",
        ],
        Vibe::Workout => &[
            "feats of endurance",
            "personal victories",
            "strength milestones",
            "athletic achievements",
            "triumphant moments",
        ],
    }
}

pub fn default_rewards(vibe: Vibe) -> &'static [&'static str] {
    match vibe {
        Vibe::Chill => &[
            "You discovered a perfect spot to watch the clouds drift by. Sometimes the best journeys are the slowest ones.",
            "A gentle breeze carried the scent of blooming flowers. Your peaceful walk has recharged your spirit.",
            "You found a moment of perfect stillness in the bustling world. The journey inward is just as important.",
        ],
        Vibe::Discovery => &[
            "You stumbled upon a hidden mural that tells stories of the neighborhood's past. Every street has secrets waiting to be found.",
            "A winding path led you to an unexpected garden oasis. The city reveals its treasures to those who wander.",
            "You discovered a vintage bookshop tucked between modern buildings. Some gems hide in plain sight.",
        ],
        Vibe::Workout => &[
            "Your determination blazed a trail that others will follow. Champions are made one step at a time.",
            "You conquered the distance with unwavering resolve. Your strength grows with every challenge accepted.",
            "The path tested you, but you emerged victorious. True power comes from pushing beyond your limits.",
        ],
    }
}

fn pick(options: &'static [&'static str]) -> &'static str {
    options
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACK_REWARD)
}

pub fn default_reward(vibe: Vibe) -> &'static str {
    pick(default_rewards(vibe))
}

pub fn build_prompt(title: &str, vibe: Vibe, steps_completed: u64, theme: &str) -> String {
    formatdoc! {r#"
        You are a creative writer for an urban exploration walking app. The user just completed a walking quest called "{title}" ({vibe} vibe, {steps_completed} steps).

        Generate a SHORT, evocative reward message (2 sentences max, under 150 characters total) that:
        - Describes a fictional discovery or moment they experienced during their walk
        - Matches the {vibe} vibe with themes of {theme}
        - Uses second person ("You discovered...", "You found...")
        - Feels magical and rewarding, like finding treasure in an RPG

        Respond with ONLY the reward text, no quotes or extra formatting."#}
}

/// Trim, drop one wrapping quote at each end and cap the length.
pub fn clean_reward(raw: &str) -> String {
    let mut text = raw.trim();
    let is_quote = |c: char| c == '"' || c == '\'';
    if let Some(rest) = text.strip_prefix(is_quote) {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix(is_quote) {
        text = rest;
    }

    if text.chars().count() > MAX_REWARD_CHARS {
        let mut capped: String = text.chars().take(MAX_REWARD_CHARS - 3).collect();
        capped.push_str("...");
        capped
    } else {
        text.to_string()
    }
}

pub struct RewardGenerator {
    text: Arc<dyn TextGenerator>,
}

impl RewardGenerator {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }

    /// # Errors
    /// Returns the collaborator's error when it fails outright. An empty
    /// answer yields one of the built-in rewards for the vibe.
    pub fn generate(
        &self,
        title: &str,
        vibe: Vibe,
        steps_completed: u64,
    ) -> Result<String, GenerationError> {
        let theme = pick(themes(vibe));
        let prompt = build_prompt(title, vibe, steps_completed, theme);

        let cleaned = match self.text.generate(&prompt) {
            Ok(text) => clean_reward(&text),
            Err(GenerationError::Empty) => String::new(),
            Err(e) => return Err(e),
        };
        if cleaned.is_empty() {
            return Ok(default_reward(vibe).to_string());
        }
        Ok(cleaned)
    }
}
