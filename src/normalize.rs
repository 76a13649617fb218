//! Message normalizer (C3): canonical history in, provider-legal history
//! out. [`normalize`] never mutates its input; it returns a new `Vec`.
//!
//! The common steps repair history rather than reject it: an assistant's
//! unanswered tool_calls are dropped, an orphan tool-role message is dropped,
//! and the turn is kept. Nothing here should error on a malformed chain —
//! only a caller-level bug (a duplicate message id) is rejected outright.

use std::collections::{HashSet, VecDeque};

use smallvec::SmallVec;

use crate::canonical::{ChatOptions, ContentPart, Message, OpenAiVariant, ProviderTag, Role};
use crate::error::CanonicalError;

/// Normalize `history` for `provider`. Runs the common steps (answered_ids
/// repair, empty-turn dropping, text coalescing, thinking stripping,
/// leading-tool drop, tool-result reordering) followed by the per-provider
/// overlay.
pub fn normalize(
    history: &[Message],
    provider: ProviderTag,
    _options: &ChatOptions,
) -> Result<Vec<Message>, CanonicalError> {
    validate_ids_unique(history)?;

    let answered_ids = answered_tool_call_ids(history);

    let mut out: Vec<Message> = history
        .iter()
        .cloned()
        .filter_map(|mut msg| match msg.role {
            Role::Assistant => {
                msg.tool_calls.retain(|c| answered_ids.contains(c.id.as_str()));
                Some(msg)
            }
            Role::Tool => {
                let answered = msg
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| answered_ids.contains(id));
                answered.then_some(msg)
            }
            Role::System | Role::User => Some(msg),
        })
        .collect();

    drop_leading_tool_messages(&mut out);

    for msg in &mut out {
        coalesce_text(msg);
        if !matches!(provider, ProviderTag::Anthropic) {
            msg.thinking = None;
        }
    }

    out.retain(|m| m.role != Role::Assistant || !m.is_empty_turn());

    reorder_tool_results(&mut out);

    match provider {
        ProviderTag::OpenAiFamily(_) | ProviderTag::Ollama => Ok(out),
        ProviderTag::Anthropic => Ok(anthropic_overlay(out)),
        ProviderTag::Gemini => Ok(gemini_overlay(out)),
        ProviderTag::Empty => Ok(out),
    }
}

fn validate_ids_unique(history: &[Message]) -> Result<(), CanonicalError> {
    let mut seen = HashSet::with_capacity(history.len());
    for msg in history {
        if !seen.insert(msg.id.as_str()) {
            return Err(CanonicalError::unsupported(format!(
                "duplicate message id '{}' in history",
                msg.id
            )));
        }
    }
    Ok(())
}

/// `declared_ids ∩ referenced_ids`: the tool_call_ids that both appear in
/// some assistant message's tool_calls and are answered by some tool-role
/// message. Everything downstream — which tool_calls an assistant message
/// keeps, which tool messages survive — is filtered against this one set.
fn answered_tool_call_ids(history: &[Message]) -> HashSet<&str> {
    let declared_ids: HashSet<&str> = history
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
        .collect();
    history
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .filter(|id| declared_ids.contains(id))
        .collect()
}

fn coalesce_text(msg: &mut Message) {
    let mut merged: SmallVec<[ContentPart; 1]> = SmallVec::new();
    for part in msg.content.drain(..) {
        match (merged.last_mut(), &part) {
            (Some(ContentPart::Text(prev)), ContentPart::Text(next)) => {
                prev.push_str(next);
            }
            _ => merged.push(part),
        }
    }
    msg.content = merged;
}

/// I2: a normalized history never starts with a Tool-role message.
fn drop_leading_tool_messages(history: &mut Vec<Message>) {
    while matches!(history.first(), Some(m) if m.role == Role::Tool) {
        history.remove(0);
    }
}

/// Ensure every Tool message for one assistant turn directly follows that
/// assistant message, preserving relative order among ties.
fn reorder_tool_results(history: &mut [Message]) {
    let mut i = 0;
    while i < history.len() {
        if history[i].role != Role::Assistant || history[i].tool_calls.is_empty() {
            i += 1;
            continue;
        }
        let wanted: VecDeque<&str> = history[i]
            .tool_calls
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>()
            .into_iter()
            .collect();
        let mut insert_at = i + 1;
        let mut scan_from = insert_at;
        while scan_from < history.len() {
            let is_wanted_tool = history[scan_from].role == Role::Tool
                && history[scan_from]
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| wanted.contains(&id));
            if is_wanted_tool {
                if scan_from != insert_at {
                    history.swap(scan_from, insert_at);
                }
                insert_at += 1;
                scan_from = insert_at;
            } else if history[scan_from].role == Role::Tool {
                // a tool result for a different (later) turn; stop scanning
                break;
            } else {
                break;
            }
        }
        i = insert_at;
    }
}

/// Anthropic: system messages are pulled out of the message list entirely
/// (callers attach them as a top-level `system` field); consecutive Tool
/// messages for one turn are merged into a single User-role message of
/// `tool_result` content blocks, since Anthropic has no dedicated tool role.
fn anthropic_overlay(history: Vec<Message>) -> Vec<Message> {
    let mut out = Vec::with_capacity(history.len());
    let mut pending_tool_results: Vec<Message> = Vec::new();

    let flush = |out: &mut Vec<Message>, pending: &mut Vec<Message>| {
        if pending.is_empty() {
            return;
        }
        let mut merged_content: SmallVec<[ContentPart; 1]> = SmallVec::new();
        for tool_msg in pending.drain(..) {
            merged_content.push(ContentPart::ToolResult {
                tool_call_id: tool_msg.tool_call_id.clone().unwrap_or_default(),
                text: tool_msg.text_content(),
                is_error: false,
            });
        }
        out.push(Message {
            id: format!("tool-results-{}", out.len()),
            role: Role::User,
            content: merged_content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            thinking: None,
        });
    };

    for msg in history {
        match msg.role {
            Role::System => continue,
            Role::Tool => pending_tool_results.push(msg),
            _ => {
                flush(&mut out, &mut pending_tool_results);
                out.push(msg);
            }
        }
    }
    flush(&mut out, &mut pending_tool_results);
    out
}

/// Gemini: roles normalize to `user`/`model`; Tool messages become
/// user-role `functionResponse` content. System content is left on the
/// message (the adapter lifts it into `systemInstruction`).
fn gemini_overlay(history: Vec<Message>) -> Vec<Message> {
    history
        .into_iter()
        .map(|mut msg| {
            if msg.role == Role::Tool {
                msg.role = Role::User;
            }
            msg
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::ToolCall;

    fn user(id: &str, text: &str) -> Message {
        Message::text(id, Role::User, text)
    }

    fn assistant_with_calls(id: &str, calls: &[&str]) -> Message {
        Message {
            id: id.into(),
            role: Role::Assistant,
            content: SmallVec::new(),
            tool_calls: calls
                .iter()
                .map(|c| ToolCall {
                    id: (*c).to_string(),
                    name: "tool".into(),
                    arguments: Some(serde_json::json!({})),
                })
                .collect(),
            tool_call_id: None,
            thinking: None,
        }
    }

    fn tool_result(id: &str, call_id: &str) -> Message {
        Message {
            id: id.into(),
            role: Role::Tool,
            content: SmallVec::from_buf([ContentPart::Text("ok".into())]),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            thinking: None,
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let history = [user("m1", "hi"), user("m1", "again")];
        assert!(normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).is_err());
    }

    #[test]
    fn scenario_1_perfect_pairing_preserved() {
        let call = assistant_with_calls("a1", &["call_1"]);
        let result = tool_result("t1", "call_1");
        let history = [call.clone(), result.clone()];
        let normalized = normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].tool_calls.len(), 1);
        assert_eq!(normalized[0].tool_calls[0].id, "call_1");
        assert_eq!(normalized[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn scenario_2_orphan_tool_removed() {
        let assistant = Message::text("a1", Role::Assistant, "response");
        let history = [assistant, tool_result("t1", "call_999")];
        let normalized = normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].text_content(), "response");
    }

    #[test]
    fn scenario_3_partial_match_drops_unanswered_tool_calls() {
        let call = assistant_with_calls("a1", &["call_1", "call_2"]);
        let history = [call, tool_result("t1", "call_1")];
        let normalized = normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].tool_calls.len(), 1);
        assert_eq!(normalized[0].tool_calls[0].id, "call_1");
        assert_eq!(normalized[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn scenario_4_unmatched_tool_calls_cleared_but_message_kept() {
        let mut call = assistant_with_calls("a1", &["call_1"]);
        call.content = SmallVec::from_buf([ContentPart::Text("I will call".into())]);
        let history = [call];
        let normalized = normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        assert_eq!(normalized.len(), 1);
        assert!(normalized[0].tool_calls.is_empty());
        assert_eq!(normalized[0].text_content(), "I will call");
    }

    #[test]
    fn scenario_5_leading_tool_removed() {
        let history = [tool_result("t1", "x"), user("u1", "Hello")];
        let normalized = normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].text_content(), "Hello");
    }

    #[test]
    fn history_of_only_orphan_tool_messages_normalizes_to_empty() {
        let history = [tool_result("t1", "call_missing")];
        let normalized = normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        assert!(normalized.is_empty());
    }

    #[test]
    fn drops_assistant_messages_with_no_content_and_no_tool_calls() {
        let empty_assistant = Message {
            id: "a1".into(),
            role: Role::Assistant,
            content: SmallVec::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            thinking: None,
        };
        let history = [user("u1", "hi"), empty_assistant];
        let normalized = normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        assert_eq!(normalized.len(), 1);
    }

    #[test]
    fn coalesces_adjacent_text_parts() {
        let msg = Message {
            id: "u1".into(),
            role: Role::User,
            content: SmallVec::from_vec(vec![
                ContentPart::Text("hello ".into()),
                ContentPart::Text("world".into()),
            ]),
            tool_calls: Vec::new(),
            tool_call_id: None,
            thinking: None,
        };
        let normalized = normalize(&[msg], ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        assert_eq!(normalized[0].content.len(), 1);
        assert_eq!(normalized[0].text_content(), "hello world");
    }

    #[test]
    fn reorders_out_of_order_tool_results() {
        let call = assistant_with_calls("a1", &["call_1", "call_2"]);
        let history = [
            user("u1", "go"),
            call,
            tool_result("t2", "call_2"),
            tool_result("t1", "call_1"),
        ];
        let normalized = normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        // both tool results should directly follow the assistant message,
        // in their original relative order (call_2 first, since it
        // appeared first in the caller's list)
        assert_eq!(normalized[2].tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(normalized[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn anthropic_overlay_extracts_system_and_merges_tool_results() {
        let call = assistant_with_calls("a1", &["call_1", "call_2"]);
        let history = [
            Message::text("s1", Role::System, "be nice"),
            user("u1", "go"),
            call,
            tool_result("t1", "call_1"),
            tool_result("t2", "call_2"),
        ];
        let normalized = normalize(&history, ProviderTag::Anthropic, &ChatOptions::default()).unwrap();
        assert!(normalized.iter().all(|m| m.role != Role::System));
        let merged = normalized.iter().find(|m| m.role == Role::User && m.content.len() == 2);
        assert!(merged.is_some());
    }

    #[test]
    fn gemini_overlay_remaps_tool_role_to_user() {
        let call = assistant_with_calls("a1", &["call_1"]);
        let history = [user("u1", "go"), call, tool_result("t1", "call_1")];
        let normalized = normalize(&history, ProviderTag::Gemini, &ChatOptions::default()).unwrap();
        assert!(normalized.iter().all(|m| m.role != Role::Tool));
    }

    #[test]
    fn normalize_is_idempotent() {
        let call = assistant_with_calls("a1", &["call_1"]);
        let history = [user("u1", "go"), call, tool_result("t1", "call_1")];
        let once = normalize(&history, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        let twice = normalize(&once, ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi), &ChatOptions::default()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn gemini_mid_history_orphan_is_dropped_not_rejected() {
        // Not a *leading* tool message (that's dropped unconditionally
        // regardless of answered_ids) — a mid-history orphan, as if the call
        // that produced it fell off the front of a truncated window.
        let history = [user("u1", "hi"), tool_result("t1", "call_missing")];
        let normalized = normalize(&history, ProviderTag::Gemini, &ChatOptions::default()).unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].text_content(), "hi");
    }
}
