//! Mission generation.
//!
//! Builds the prompt from the time of day and the scan location, then turns
//! whatever the text collaborator answers into exactly one mission per vibe.
//! Any vibe the answer does not cover is filled from the built-in defaults.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use indoc::formatdoc;
use rand::Rng;
use serde_json::Value;

use super::types::{Mission, Vibe};
use crate::clock::Clock;
use crate::error::GenerationError;
use crate::generation::TextGenerator;

const DEFAULT_PLACE: &str = "Urban Environment";
const DEFAULT_NEIGHBORHOOD: &str = "your neighborhood";

/// Period of the day and the mood it sets for the narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeContext {
    pub period: &'static str,
    pub mood: &'static str,
}

impl TimeContext {
    pub fn from_hour(hour: u32) -> Self {
        let (period, mood) = match hour {
            5..=8 => ("early morning", "fresh and energizing"),
            9..=11 => ("morning", "productive and bright"),
            12..=13 => ("midday", "active and sunny"),
            14..=16 => ("afternoon", "warm and leisurely"),
            17..=19 => ("evening", "golden hour and reflective"),
            20..=22 => ("night", "mysterious and calm"),
            _ => ("late night", "quiet and adventurous"),
        };
        Self { period, mood }
    }

    /// Period with its first letter capitalized, for titles.
    pub fn title_case_period(&self) -> String {
        let mut chars = self.period.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Where the user scanned from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanContext {
    /// Readable place name, e.g. "Shibuya, Tokyo".
    pub location_name: Option<String>,
}

impl ScanContext {
    pub fn at(location_name: impl Into<String>) -> Self {
        Self {
            location_name: Some(location_name.into()),
        }
    }
}

/// A mission as parsed from generated text, before ids and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionDraft {
    pub vibe: Vibe,
    pub title: Option<String>,
    pub description: Option<String>,
    pub step_target: Option<u32>,
}

pub fn build_prompt(time: TimeContext, scan: &ScanContext) -> String {
    let place = scan.location_name.as_deref().unwrap_or(DEFAULT_PLACE);
    let TimeContext { period, mood } = time;
    formatdoc! {r#"
        You are a creative quest designer for an urban exploration walking app called Stepquest. Generate 3 unique walking missions for a user during the {period} (the mood is {mood}).

        The user is currently at {place}. Incorporate this environment into the mission narrative - reference local landmarks, typical features of such areas, or the atmosphere of this location.

        Each mission should have a different "vibe":
        1. CHILL - A short, relaxing walk (800-1500 steps)
        2. DISCOVERY - A scenic exploration walk (2000-3500 steps)
        3. WORKOUT - A challenging fitness walk (4000-7000 steps)

        For each mission, provide:
        - vibe: exactly one of "chill", "discovery", or "workout"
        - title: A creative, evocative quest name that could reference the location (max 30 chars)
        - description: An immersive narrative description that makes walking feel like an adventure and incorporates the {place} environment (2-3 sentences, max 150 chars)
        - stepTarget: A specific integer step goal within the vibe's range

        Respond ONLY with a valid JSON array, no other text:
        [
          {{"vibe": "chill", "title": "...", "description": "...", "stepTarget": 1200}},
          {{"vibe": "discovery", "title": "...", "description": "...", "stepTarget": 2800}},
          {{"vibe": "workout", "title": "...", "description": "...", "stepTarget": 5500}}
        ]"#}
}

/// Round a generated target to the nearest hundred. Non-positive or
/// out-of-range values are rejected.
fn round_target(raw: f64) -> Option<u32> {
    if !raw.is_finite() {
        return None;
    }
    let rounded = (raw / 100.0).round() * 100.0;
    if rounded <= 0.0 || rounded > f64::from(u32::MAX) {
        return None;
    }
    Some(rounded as u32)
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extract mission drafts from generated text.
///
/// The first `[` through the last `]` is parsed as a JSON array. Entries
/// without a recognizable vibe are skipped. Returns `None` when no array can
/// be parsed at all.
pub fn parse_missions(response: &str) -> Option<Vec<MissionDraft>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end < start {
        return None;
    }
    let items: Vec<Value> = serde_json::from_str(&response[start..=end]).ok()?;

    let drafts = items
        .iter()
        .filter_map(|item| {
            let vibe = item.get("vibe")?.as_str()?.parse::<Vibe>().ok()?;
            Some(MissionDraft {
                vibe,
                title: non_empty(item.get("title")),
                description: non_empty(item.get("description")),
                step_target: item.get("stepTarget").and_then(Value::as_f64).and_then(round_target),
            })
        })
        .collect();
    Some(drafts)
}

/// Built-in mission for a vibe, worded for the time of day.
pub fn default_mission(vibe: Vibe, time: TimeContext, location_name: Option<&str>) -> MissionDraft {
    let location = location_name.unwrap_or(DEFAULT_NEIGHBORHOOD);
    let (title, description, target) = match vibe {
        Vibe::Chill => (
            format!("The {} Stroll", time.title_case_period()),
            format!("Take a peaceful walk through {location}. No rush, just enjoy the journey and let your mind wander freely."),
            1000,
        ),
        Vibe::Discovery => (
            "Urban Explorer's Path".to_string(),
            format!("Venture beyond your usual routes in {location}. Find a street you've never walked, a building you've never noticed."),
            2500,
        ),
        Vibe::Workout => (
            "The Endurance Trial".to_string(),
            format!("Push your limits with this challenging trek around {location}. Maintain a brisk pace and feel the energy surge."),
            5000,
        ),
    };
    MissionDraft {
        vibe,
        title: Some(title),
        description: Some(description),
        step_target: Some(target),
    }
}

pub fn default_missions(time: TimeContext, location_name: Option<&str>) -> Vec<MissionDraft> {
    Vibe::ALL
        .iter()
        .map(|&vibe| default_mission(vibe, time, location_name))
        .collect()
}

fn mission_id(now: DateTime<Utc>) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..7)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("mission_{}_{suffix}", now.timestamp_millis())
}

/// Exactly one mission per vibe, in [`Vibe::ALL`] order.
///
/// The first draft of each vibe wins; each missing field, and a step target
/// outside [`Vibe::step_range`], falls back to the built-in default for that
/// vibe.
pub fn assemble(
    drafts: &[MissionDraft],
    time: TimeContext,
    location_name: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<Mission> {
    Vibe::ALL
        .iter()
        .map(|&vibe| {
            let default = default_mission(vibe, time, location_name);
            let found = drafts.iter().find(|d| d.vibe == vibe);
            let pick = |f: fn(&MissionDraft) -> Option<String>| {
                found.and_then(f).or_else(|| f(&default)).unwrap_or_default()
            };
            Mission {
                id: mission_id(now),
                vibe,
                title: pick(|d| d.title.clone()),
                description: pick(|d| d.description.clone()),
                step_target: found
                    .and_then(|d| d.step_target)
                    .filter(|target| vibe.step_range().contains(target))
                    .or(default.step_target)
                    .unwrap_or(1000),
                generated_at: now,
            }
        })
        .collect()
}

/// Produces the three missions offered by a scan.
pub struct MissionGenerator {
    text: Arc<dyn TextGenerator>,
    clock: Arc<dyn Clock>,
}

impl MissionGenerator {
    pub fn new(text: Arc<dyn TextGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { text, clock }
    }

    /// # Errors
    /// Returns the collaborator's error when it fails outright. Empty or
    /// unparseable answers yield the built-in missions instead.
    pub fn generate(&self, scan: &ScanContext) -> Result<Vec<Mission>, GenerationError> {
        let local_now = self.clock.now();
        let now = local_now.with_timezone(&Utc);
        let time = TimeContext::from_hour(local_now.hour());
        let location = scan.location_name.as_deref();

        let response = match self.text.generate(&build_prompt(time, scan)) {
            Ok(text) => text,
            Err(GenerationError::Empty) => String::new(),
            Err(e) => return Err(e),
        };

        let drafts = if response.trim().is_empty() {
            tracing::debug!("empty mission response, using defaults");
            default_missions(time, location)
        } else {
            parse_missions(&response).unwrap_or_else(|| {
                tracing::warn!("unparseable mission response, using defaults");
                default_missions(time, location)
            })
        };
        Ok(assemble(&drafts, time, location, now))
    }
}
