//! Prompt for the optional scene render.

use tabletale_session::domain::state::{LogEntry, PartyMember, SessionState, World};
use tabletale_world_state::domain::resolution::ResolutionResult;

use super::context::DEFAULT_LOG_WINDOW;

const STYLE_GUIDE: &str = "Cinematic illustration. No text, letters, captions, signage or UI. \
Describe costumes, poses, terrain, props, lighting and camera framing concretely.";

/// Describes the scene after `result` for an image generator.
#[must_use]
pub fn build_scene_prompt(state: &SessionState, result: Option<&ResolutionResult>) -> String {
    let title = if state.scenario.title.is_empty() {
        "Untitled scenario"
    } else {
        state.scenario.title.as_str()
    };
    let mut lines = vec![
        format!("[Scenario] {title}"),
        format!("[World] {}", describe_world(&state.world)),
        format!("[Party] {}", describe_party(&state.party)),
        format!("[Story so far] {}", compact_history(&state.log)),
    ];
    if let Some(focus) = result
        .map(|r| one_line(&r.narration))
        .filter(|n| !n.is_empty())
    {
        lines.push(format!("[This scene] {focus}"));
    }
    lines.push(String::new());
    lines.push(STYLE_GUIDE.to_owned());
    lines.join("\n")
}

fn one_line(text: &str) -> String {
    text.trim().replace('\n', " ")
}

fn describe_world(world: &World) -> String {
    let time = world.time.as_deref().unwrap_or("unknown time");
    let location = world.location.as_deref().unwrap_or("unknown place");
    let mut extra = Vec::new();
    if let Some(weather) = world.extra.get("weather").and_then(|w| w.as_str()) {
        extra.push(format!("weather: {weather}"));
    }
    if let Some(notes) = world.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        extra.push(one_line(notes));
    }
    if extra.is_empty() {
        format!("{time}, {location}")
    } else {
        format!("{time}, {location} ({})", extra.join(" / "))
    }
}

fn describe_party(party: &[PartyMember]) -> String {
    if party.is_empty() {
        return "no party".to_owned();
    }
    party
        .iter()
        .map(|member| {
            let name = if member.name.is_empty() {
                &member.id
            } else {
                &member.name
            };
            let status = if member.sheet.status.is_empty() {
                "unharmed".to_owned()
            } else {
                member
                    .sheet
                    .status
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!("{name}({}) HP:{}, {status}", member.role, member.sheet.hp)
        })
        .collect::<Vec<_>>()
        .join(" / ")
}

fn compact_history(log: &[LogEntry]) -> String {
    let start = log.len().saturating_sub(DEFAULT_LOG_WINDOW);
    let lines: Vec<String> = log[start..]
        .iter()
        .filter_map(|entry| {
            let narration = one_line(entry.narration.as_deref()?);
            if narration.is_empty() {
                return None;
            }
            Some(match entry.turn {
                Some(turn) => format!("[turn {turn}] {narration}"),
                None => narration,
            })
        })
        .collect();
    if lines.is_empty() {
        "nothing yet".to_owned()
    } else {
        lines.join(" / ")
    }
}
