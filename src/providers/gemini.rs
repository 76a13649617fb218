//! Gemini adapter. Gemini streams whole `GenerateContentResponse` JSON
//! objects over SSE rather than field-level deltas, and assigns no id to a
//! function call — ids are minted locally (random opaque ids, not a
//! deterministic hash — see the Open Questions ledger in `DESIGN.md`).

use async_stream::stream;
use futures_util::StreamExt;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};

use crate::assembler::{BlockEvent, ToolCallAssembler};
use crate::canonical::{ChatOptions, ContentPart, Event, Message, ProviderTag, Role, ToolDescriptor};
use crate::cancel::CancellationToken;
use crate::error::{classify, CanonicalError, ErrorKind};
use crate::stream::SseParser;

use super::{preprocess, Adapter, BoxEventStream};

pub struct GeminiAdapter {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl GeminiAdapter {
    #[must_use]
    pub fn new(api_key: String, http: reqwest::Client, base_url: String) -> Self {
        Self {
            api_key,
            http,
            base_url,
        }
    }
}

fn mint_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn encode_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        // Tool is remapped to User by the normalizer's Gemini overlay.
        Role::User | Role::Tool => "user",
        Role::System => "user",
    }
}

/// Build `contents` + `systemInstruction`. A prepass maps each tool_call id
/// to its name so a later `functionResponse` (which only ever names a
/// function, never an id on Gemini's wire format) can be encoded correctly.
fn build_request_body(
    messages: &[Message],
    system_prompt: &str,
    wire_tools: &[Value],
    options: &ChatOptions,
) -> Value {
    let mut id_to_name: FxHashMap<&str, &str> = FxHashMap::default();
    for msg in messages {
        for call in &msg.tool_calls {
            id_to_name.insert(call.id.as_str(), call.name.as_str());
        }
    }

    let mut contents = Vec::with_capacity(messages.len());
    for msg in messages {
        if msg.role == Role::System {
            continue;
        }
        let mut parts: Vec<Value> = Vec::new();
        for part in &msg.content {
            match part {
                ContentPart::Text(text) => parts.push(json!({"text": text})),
                ContentPart::ToolResult { .. } => {
                    // Gemini's normalizer overlay never produces this
                    // variant; Tool messages stay as plain text content
                    // remapped to the user role instead.
                }
                ContentPart::Thinking(_) | ContentPart::Image { .. } => {}
            }
        }
        if msg.role == Role::Tool {
            let name = msg
                .tool_call_id
                .as_deref()
                .and_then(|id| id_to_name.get(id))
                .copied()
                .unwrap_or("unknown");
            parts.push(json!({
                "functionResponse": {
                    "name": name,
                    "response": {"content": msg.text_content()},
                }
            }));
        }
        for call in &msg.tool_calls {
            parts.push(json!({
                "functionCall": {
                    "name": call.name,
                    "args": call.arguments.clone().unwrap_or_else(|| json!({})),
                }
            }));
        }
        if parts.is_empty() {
            continue;
        }
        contents.push(json!({"role": encode_role(msg.role), "parts": parts}));
    }

    let mut body = serde_json::Map::new();
    body.insert("contents".into(), Value::Array(contents));
    if !system_prompt.is_empty() {
        body.insert(
            "systemInstruction".into(),
            json!({"parts": [{"text": system_prompt}]}),
        );
    }
    if !wire_tools.is_empty() {
        body.insert(
            "tools".into(),
            json!([{"functionDeclarations": wire_tools}]),
        );
    }
    let mut generation_config = serde_json::Map::new();
    if let Some(t) = options.temperature {
        generation_config.insert("temperature".into(), json!(t));
    }
    if let Some(t) = options.max_tokens {
        generation_config.insert("maxOutputTokens".into(), json!(t));
    }
    if let Some(t) = options.top_p {
        generation_config.insert("topP".into(), json!(t));
    }
    if !options.stop.is_empty() {
        generation_config.insert("stopSequences".into(), json!(options.stop));
    }
    if !generation_config.is_empty() {
        body.insert("generationConfig".into(), Value::Object(generation_config));
    }
    Value::Object(body)
}

fn decode_response(payload: &Value, assembler: &mut ToolCallAssembler, next_index: &mut u32) -> Vec<Event> {
    let mut out = Vec::new();
    let Some(candidate) = payload["candidates"].get(0) else {
        return out;
    };
    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                if !text.is_empty() {
                    out.push(Event::Content(text.to_string()));
                }
            }
            if let Some(call) = part.get("functionCall") {
                let index = *next_index;
                *next_index += 1;
                let id = mint_call_id();
                let name = call["name"].as_str().unwrap_or_default().to_string();
                let args = call.get("args").cloned();
                assembler.feed(BlockEvent::Start {
                    index,
                    id,
                    name,
                    initial_input: args,
                });
                if let Some(tool_call) = assembler.feed(BlockEvent::Stop { index }) {
                    out.push(Event::ToolCall(tool_call));
                }
            }
        }
    }
    if let Some(usage) = payload.get("usageMetadata") {
        out.push(Event::UsageHint {
            input_tokens: usage["promptTokenCount"].as_u64(),
            output_tokens: usage["candidatesTokenCount"].as_u64(),
        });
    }
    out
}

#[async_trait::async_trait]
impl Adapter for GeminiAdapter {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> Result<BoxEventStream, CanonicalError> {
        let (normalized, wire_tools) = preprocess(messages, tools, ProviderTag::Gemini, options)?;
        let system_prompt = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::text_content)
            .collect::<Vec<_>>()
            .join("\n");
        let body = build_request_body(&normalized, &system_prompt, &wire_tools, options);

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, options.model, self.api_key
        );
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                CanonicalError::with_source(classify(&e.to_string(), e.status().map(|s| s.as_u16())), e.to_string(), e)
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(CanonicalError::new(classify(&text, Some(status)), text));
        }

        let mut byte_stream = response.bytes_stream();
        let out = stream! {
            let mut parser = SseParser::new();
            let mut assembler = ToolCallAssembler::new();
            let mut next_index: u32 = 0;
            loop {
                if cancel.is_cancelled() {
                    yield Event::Error(ErrorKind::Cancelled, "operation cancelled".into());
                    return;
                }
                let chunk = match byte_stream.next().await {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        yield Event::Error(classify(&e.to_string(), None), e.to_string());
                        return;
                    }
                    None => break,
                };
                let text = String::from_utf8_lossy(&chunk);
                for sse_event in parser.feed(&text) {
                    let Ok(payload) = serde_json::from_str::<Value>(&sse_event.data) else {
                        continue;
                    };
                    for evt in decode_response(&payload, &mut assembler, &mut next_index) {
                        yield evt;
                    }
                }
            }
            yield Event::End;
        };
        Ok(Box::pin(out))
    }

    async fn list_models(&self) -> Result<Vec<String>, CanonicalError> {
        #[derive(serde::Deserialize)]
        struct ModelList {
            models: Vec<ModelEntry>,
        }
        #[derive(serde::Deserialize)]
        struct ModelEntry {
            name: String,
        }
        let url = format!("{}/models?key={}", self.base_url, self.api_key);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CanonicalError::with_source(classify(&e.to_string(), None), e.to_string(), e))?;
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| CanonicalError::new(ErrorKind::Unknown, e.to_string()))?;
        Ok(list.models.into_iter().map(|m| m.name).collect())
    }

    fn provider(&self) -> ProviderTag {
        ProviderTag::Gemini
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_response_mints_a_fresh_id_per_function_call() {
        let mut assembler = ToolCallAssembler::new();
        let mut next_index = 0;
        let payload = json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "lookup", "args": {"q": "x"}}}
            ]}}]
        });
        let events = decode_response(&payload, &mut assembler, &mut next_index);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ToolCall(call) => {
                assert_eq!(call.name, "lookup");
                assert_eq!(call.arguments, Some(json!({"q": "x"})));
                assert!(call.id.starts_with("call_"));
            }
            other => panic!("expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn repeated_identical_calls_in_one_turn_get_distinct_ids() {
        let mut assembler = ToolCallAssembler::new();
        let mut next_index = 0;
        let payload = json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "lookup", "args": {"q": "x"}}},
                {"functionCall": {"name": "lookup", "args": {"q": "x"}}}
            ]}}]
        });
        let events = decode_response(&payload, &mut assembler, &mut next_index);
        let ids: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                Event::ToolCall(call) => Some(call.id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn decode_response_emits_usage_hint() {
        let mut assembler = ToolCallAssembler::new();
        let mut next_index = 0;
        let payload = json!({
            "candidates": [{"content": {"parts": [{"text": "hi"}]}}],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2}
        });
        let events = decode_response(&payload, &mut assembler, &mut next_index);
        assert!(events.contains(&Event::UsageHint {
            input_tokens: Some(3),
            output_tokens: Some(2)
        }));
    }

    #[test]
    fn encode_tool_response_looks_up_name_by_id_via_prepass() {
        let assistant = Message {
            id: "a1".into(),
            role: Role::Assistant,
            content: Default::default(),
            tool_calls: vec![crate::canonical::ToolCall {
                id: "call_1".into(),
                name: "lookup".into(),
                arguments: Some(json!({})),
            }],
            tool_call_id: None,
            thinking: None,
        };
        let tool_result = Message {
            id: "t1".into(),
            role: Role::User, // already remapped by the normalizer overlay
            content: smallvec::SmallVec::from_buf([ContentPart::Text("ok".into())]),
            tool_calls: Vec::new(),
            tool_call_id: Some("call_1".into()),
            thinking: None,
        };
        let body = build_request_body(
            &[assistant, Message { role: Role::Tool, ..tool_result }],
            "",
            &[],
            &ChatOptions::default(),
        );
        let contents = body["contents"].as_array().unwrap();
        let response_part = &contents[1]["parts"][0]["functionResponse"];
        assert_eq!(response_part["name"], "lookup");
    }
}
