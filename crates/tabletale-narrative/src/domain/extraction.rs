//! Pulls the structured block out of free-form generator output.
//!
//! Generators wrap their JSON in a fenced code block (with or without an
//! info string) or surround it with prose. Every `{` is tried as a start
//! in turn and the first balanced span that parses as a JSON object is
//! used, fenced blocks before the surrounding text. When nothing parses,
//! the first balanced span is returned so the caller can report why.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use serde_json::Value;

/// Returns the JSON object text embedded in `response`, if any.
#[must_use]
pub fn extract_json_block(response: &str) -> Option<String> {
    let fenced = fenced_blocks(response);
    fenced
        .iter()
        .find_map(|block| first_object(block))
        .or_else(|| first_object(response))
        .or_else(|| fenced.iter().find_map(|block| first_balanced(block)))
        .or_else(|| first_balanced(response))
        .map(str::to_owned)
}

fn fenced_blocks(response: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for event in Parser::new(response) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) => {
                current = Some(String::new());
            }
            Event::Text(text) => {
                if let Some(block) = current.as_mut() {
                    block.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
            }
            _ => {}
        }
    }
    blocks
}

fn brace_starts(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.match_indices('{').map(|(i, _)| i)
}

fn first_object(text: &str) -> Option<&str> {
    brace_starts(text)
        .filter_map(|start| balanced_from(text, start))
        .find(|candidate| serde_json::from_str::<Value>(candidate).is_ok_and(|v| v.is_object()))
}

fn first_balanced(text: &str) -> Option<&str> {
    brace_starts(text).find_map(|start| balanced_from(text, start))
}

/// `{` at `start` up to its matching `}`, skipping braces inside strings.
fn balanced_from(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}
