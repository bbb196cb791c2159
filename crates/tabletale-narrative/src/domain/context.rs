//! The compact context handed to the narrative generator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabletale_rules::domain::judgement::{Grade, JudgedContribution};
use tabletale_session::domain::state::{
    DifficultyTier, LogEntry, PartyMember, Scenario, SessionState, SheetEntry,
};
use uuid::Uuid;

/// Log entries included by default.
pub const DEFAULT_LOG_WINDOW: usize = 12;

/// Skills, items and spells listed per member by default.
pub const DEFAULT_CAPABILITY_LIMIT: usize = 5;

/// Where the story should be heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Under three quarters of the planned turns.
    Building,
    /// Past three quarters, before the last turn.
    Climax,
    /// At or past the planned length; the story should end.
    Finale,
}

impl Pacing {
    /// Pacing for a session that has completed `turn_number` of `max_turns`.
    #[must_use]
    pub fn for_turn(turn_number: u64, max_turns: u64) -> Self {
        if turn_number >= max_turns {
            Self::Finale
        } else if turn_number.saturating_mul(4) < max_turns.saturating_mul(3) {
            Self::Building
        } else {
            Self::Climax
        }
    }
}

/// One judged choice as the generator sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSummary {
    /// Who acted.
    pub participant_id: String,
    /// Display name of the actor.
    pub name: String,
    /// What they did.
    pub choice_text: String,
    /// Stat the check used.
    pub applied_stat: String,
    /// Die value.
    pub dice: u32,
    /// Check total.
    pub total: i32,
    /// Target number.
    pub difficulty_class: i32,
    /// Outcome grade.
    pub grade: Grade,
    /// Synthesized rather than chosen by a human.
    pub autonomous: bool,
}

/// Everything the generator is told about the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeContext {
    /// Session being resolved.
    pub session_id: Uuid,
    /// Completed turns so far.
    pub turn_number: u64,
    /// Planned story length.
    pub max_turns: u64,
    /// Pacing hint.
    pub pacing: Pacing,
    /// Check difficulty.
    pub difficulty_tier: DifficultyTier,
    /// Scenario headline.
    pub scenario: Scenario,
    /// Current world facts.
    pub world: Map<String, Value>,
    /// Ids every personal narration is keyed by.
    pub party_ids: Vec<String>,
    /// One capability line per member.
    pub capabilities: Vec<String>,
    /// Most recent log entries, oldest first.
    pub recent_log: Vec<LogEntry>,
    /// This turn's judged choices in participant order.
    pub choices: Vec<ChoiceSummary>,
}

impl NarrativeContext {
    /// Assembles the context for `state` and its judged contributions.
    #[must_use]
    pub fn build(
        state: &SessionState,
        judged: &[JudgedContribution],
        log_window: usize,
        capability_limit: usize,
    ) -> Self {
        let choices = judged
            .iter()
            .map(|j| ChoiceSummary {
                participant_id: j.judgement.participant_id.clone(),
                name: state
                    .member(&j.judgement.participant_id)
                    .map(|m| m.name.clone())
                    .unwrap_or_default(),
                choice_text: j.contribution.choice_text.clone(),
                applied_stat: j.contribution.applied_stat.clone(),
                dice: j.judgement.dice,
                total: j.judgement.total,
                difficulty_class: j.judgement.difficulty_class,
                grade: j.judgement.grade,
                autonomous: j.contribution.autonomous,
            })
            .collect();

        Self {
            session_id: state.session_id,
            turn_number: state.turn_number,
            max_turns: state.max_turns,
            pacing: Pacing::for_turn(state.turn_number, state.max_turns),
            difficulty_tier: state.difficulty_tier,
            scenario: state.scenario.clone(),
            world: state.world.to_map(),
            party_ids: state.party.iter().map(|m| m.id.clone()).collect(),
            capabilities: summarize_capabilities(&state.party, capability_limit),
            recent_log: state.recent_log(log_window).to_vec(),
            choices,
        }
    }
}

/// One line per member: `Name(id) | skills: .. | items: .. | spells: ..`.
///
/// Each section lists at most `limit` entries; charged entries read
/// `name(xN)` and empty sections read `-`.
#[must_use]
pub fn summarize_capabilities(party: &[PartyMember], limit: usize) -> Vec<String> {
    party
        .iter()
        .map(|member| {
            let name = if member.name.is_empty() {
                &member.id
            } else {
                &member.name
            };
            let skills = section(member.sheet.skills.iter().take(limit).cloned());
            let items = section(member.sheet.items.iter().take(limit).map(entry_label));
            let spells = section(member.sheet.spells.iter().take(limit).map(entry_label));
            format!(
                "{name}({}) | skills: {skills} | items: {items} | spells: {spells}",
                member.id
            )
        })
        .collect()
}

fn entry_label(entry: &SheetEntry) -> String {
    match entry.charges {
        Some(charges) => format!("{}(x{charges})", entry.name),
        None => entry.name.clone(),
    }
}

fn section(labels: impl Iterator<Item = String>) -> String {
    let joined = labels.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_owned()
    } else {
        joined
    }
}
