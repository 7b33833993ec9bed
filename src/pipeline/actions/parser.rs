//! Extracts a structured action from an assistant reply.
//!
//! The assistant is asked to put actions in a fenced block tagged
//! `symptomsync-action`. Models do not always comply, so when no valid block
//! exists the whole reply is scanned for the first JSON object that has the
//! action shape. Nothing here fails: an unusable reply yields `None`.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::types::ActionPayload;
use crate::config::ACTION_MARKER;

static ACTION_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s)```{}[ \t]*\r?\n(.*?)```",
        regex::escape(ACTION_MARKER)
    ))
    .unwrap()
});

/// Parse the first valid action in `reply`.
pub fn parse_action(reply: &str) -> Option<ActionPayload> {
    let mut saw_block = false;
    for caps in ACTION_BLOCK.captures_iter(reply) {
        saw_block = true;
        if let Some(payload) = caps.get(1).and_then(|body| decode_payload(body.as_str())) {
            return Some(payload);
        }
    }
    if saw_block {
        debug!("Action block present but invalid, scanning reply for a JSON object");
    }

    json_object_candidates(reply).find_map(decode_payload)
}

/// Render a payload in the wire format the assistant is asked to emit.
pub fn render_action_block(payload: &ActionPayload) -> String {
    let json = serde_json::to_string(payload).unwrap_or_default();
    format!("```{ACTION_MARKER}\n{json}\n```")
}

/// Reply text with every action block removed, for display next to the
/// review card.
pub fn strip_action_blocks(reply: &str) -> String {
    ACTION_BLOCK.replace_all(reply, "").trim().to_string()
}

/// Accepts only known entity/intent values and an object-valued `data`.
fn decode_payload(candidate: &str) -> Option<ActionPayload> {
    serde_json::from_str(candidate.trim()).ok()
}

/// Every balanced `{...}` span in `text`, in order of its opening brace.
fn json_object_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(move |(start, _)| {
            balanced_object_end(text, start).map(|end| &text[start..=end])
        })
}

/// Byte index of the `}` closing the object opened at `start`.
/// Braces inside JSON strings are ignored.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
