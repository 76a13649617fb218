//! Anthropic Messages API adapter. SSE events are named (`event:` lines);
//! content-block kind is tracked by index from `content_block_start`, the
//! same index-keyed state-tracking shape used for the tool-call assembler.

use async_stream::stream;
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::assembler::{BlockEvent, ToolCallAssembler};
use crate::canonical::{ChatOptions, Event, Message, ProviderTag, Role, ToolDescriptor};
use crate::cancel::CancellationToken;
use crate::error::{classify, CanonicalError, ErrorKind};
use crate::stream::SseParser;

use super::{preprocess, Adapter, BoxEventStream};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl AnthropicAdapter {
    #[must_use]
    pub fn new(api_key: String, http: reqwest::Client, base_url: String) -> Self {
        Self {
            api_key,
            http,
            base_url,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

fn encode_role(role: Role) -> &'static str {
    match role {
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
        Role::System => "user", // unreachable: system is extracted before this point
    }
}

fn encode_message(msg: &Message) -> Value {
    let mut parts: Vec<Value> = Vec::new();
    for part in &msg.content {
        match part {
            crate::canonical::ContentPart::Text(text) => {
                parts.push(json!({"type": "text", "text": text}));
            }
            crate::canonical::ContentPart::Thinking(block) => {
                let mut thinking = serde_json::Map::new();
                thinking.insert("type".into(), json!("thinking"));
                thinking.insert("thinking".into(), json!(block.text));
                if let Some(sig) = &block.signature {
                    thinking.insert("signature".into(), json!(sig));
                }
                parts.push(Value::Object(thinking));
            }
            crate::canonical::ContentPart::Image { mime, source } => {
                let source_json = match source {
                    crate::canonical::ImageSource::Url(url) => json!({"type": "url", "url": url}),
                    crate::canonical::ImageSource::Bytes(bytes) => {
                        use base64::Engine;
                        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                        json!({"type": "base64", "media_type": mime, "data": encoded})
                    }
                };
                parts.push(json!({"type": "image", "source": source_json}));
            }
            crate::canonical::ContentPart::ToolResult {
                tool_call_id,
                text,
                is_error,
            } => {
                parts.push(json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": text,
                    "is_error": is_error,
                }));
            }
        }
    }
    for call in &msg.tool_calls {
        parts.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.arguments.clone().unwrap_or_else(|| json!({})),
        }));
    }
    json!({
        "role": encode_role(msg.role),
        "content": parts,
    })
}

/// Per-model catalog of the maximum extended-thinking budget Anthropic will
/// accept, keyed by model-name prefix rather than exact match so dated
/// snapshots (`claude-opus-4-1-20250805`, ...) still resolve. A model not in
/// the catalog gets a conservative default rather than whatever the caller
/// asked for, since an over-budget request is a hard API error, not a clamp.
const THINKING_BUDGET_CATALOG: &[(&str, u32)] = &[
    ("claude-opus-4", 64_000),
    ("claude-sonnet-4", 64_000),
    ("claude-3-7-sonnet", 64_000),
    ("claude-3-5", 8_000),
];
const DEFAULT_THINKING_BUDGET_CAP: u32 = 16_000;

#[must_use]
pub fn max_thinking_budget(model: &str) -> u32 {
    THINKING_BUDGET_CATALOG
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map_or(DEFAULT_THINKING_BUDGET_CAP, |(_, budget)| *budget)
}

fn build_request_body(
    messages: &[Message],
    system_prompt: &str,
    wire_tools: &[Value],
    options: &ChatOptions,
) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("model".into(), json!(options.model));

    let thinking_budget = options
        .thinking_budget_tokens
        .map(|requested| requested.min(max_thinking_budget(&options.model)));
    let max_tokens = match (options.max_tokens, thinking_budget) {
        (Some(t), _) => t,
        (None, Some(budget)) => budget + DEFAULT_MAX_TOKENS,
        (None, None) => DEFAULT_MAX_TOKENS,
    };
    body.insert("max_tokens".into(), json!(max_tokens));
    if let Some(budget) = thinking_budget {
        body.insert(
            "thinking".into(),
            json!({"type": "enabled", "budget_tokens": budget}),
        );
    }

    body.insert("stream".into(), json!(true));
    if !system_prompt.is_empty() {
        body.insert("system".into(), json!(system_prompt));
    }
    body.insert(
        "messages".into(),
        Value::Array(messages.iter().map(encode_message).collect()),
    );
    if !wire_tools.is_empty() {
        body.insert("tools".into(), Value::Array(wire_tools.to_vec()));
    }
    if let Some(t) = options.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(t) = options.top_p {
        body.insert("top_p".into(), json!(t));
    }
    if !options.stop.is_empty() {
        body.insert("stop_sequences".into(), json!(options.stop));
    }
    Value::Object(body)
}

#[async_trait::async_trait]
impl Adapter for AnthropicAdapter {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> Result<BoxEventStream, CanonicalError> {
        let (normalized, wire_tools) = preprocess(messages, tools, ProviderTag::Anthropic, options)?;
        let system_prompt = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::text_content)
            .collect::<Vec<_>>()
            .join("\n");
        let body = build_request_body(&normalized, &system_prompt, &wire_tools, options);

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            let mut block_kinds: std::collections::HashMap<u32, BlockKind> = std::collections::HashMap::new();
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
                    let event_type = sse_event.event.as_deref().unwrap_or("");
                    match event_type {
                        "content_block_start" => {
                            let index = payload["index"].as_u64().unwrap_or(0) as u32;
                            let block = &payload["content_block"];
                            match block["type"].as_str() {
                                Some("tool_use") => {
                                    block_kinds.insert(index, BlockKind::ToolUse);
                                    assembler.feed(BlockEvent::Start {
                                        index,
                                        id: block["id"].as_str().unwrap_or_default().to_string(),
                                        name: block["name"].as_str().unwrap_or_default().to_string(),
                                        initial_input: None,
                                    });
                                }
                                Some("thinking") => {
                                    block_kinds.insert(index, BlockKind::Thinking);
                                }
                                _ => {
                                    block_kinds.insert(index, BlockKind::Text);
                                }
                            }
                        }
                        "content_block_delta" => {
                            let index = payload["index"].as_u64().unwrap_or(0) as u32;
                            let delta = &payload["delta"];
                            match delta["type"].as_str() {
                                Some("text_delta") => {
                                    if let Some(text) = delta["text"].as_str() {
                                        yield Event::Content(text.to_string());
                                    }
                                }
                                Some("thinking_delta") => {
                                    if let Some(text) = delta["thinking"].as_str() {
                                        yield Event::Thinking(text.to_string());
                                    }
                                }
                                Some("signature_delta") => {
                                    if let Some(sig) = delta["signature"].as_str() {
                                        yield Event::ThinkingSignature(sig.to_string());
                                    }
                                }
                                Some("input_json_delta") => {
                                    if let Some(fragment) = delta["partial_json"].as_str() {
                                        if let Some(call) = assembler.feed(BlockEvent::ArgDelta {
                                            index,
                                            fragment: fragment.to_string(),
                                        }) {
                                            yield Event::ToolCall(call);
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }
                        "content_block_stop" => {
                            let index = payload["index"].as_u64().unwrap_or(0) as u32;
                            if block_kinds.remove(&index) == Some(BlockKind::ToolUse) {
                                if let Some(call) = assembler.feed(BlockEvent::Stop { index }) {
                                    yield Event::ToolCall(call);
                                }
                            }
                        }
                        "message_delta" => {
                            if let Some(output) = payload["usage"]["output_tokens"].as_u64() {
                                yield Event::UsageHint { input_tokens: None, output_tokens: Some(output) };
                            }
                        }
                        "message_start" => {
                            if let Some(input) = payload["message"]["usage"]["input_tokens"].as_u64() {
                                yield Event::UsageHint { input_tokens: Some(input), output_tokens: None };
                            }
                        }
                        "message_stop" => {
                            yield Event::End;
                            return;
                        }
                        "error" => {
                            let message = payload["error"]["message"].as_str().unwrap_or("anthropic stream error").to_string();
                            yield Event::Error(ErrorKind::Unknown, message);
                            return;
                        }
                        _ => {}
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
            data: Vec<ModelEntry>,
        }
        #[derive(serde::Deserialize)]
        struct ModelEntry {
            id: String,
        }
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| CanonicalError::with_source(classify(&e.to_string(), None), e.to_string(), e))?;
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| CanonicalError::new(ErrorKind::Unknown, e.to_string()))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    fn provider(&self) -> ProviderTag {
        ProviderTag::Anthropic
    }
}
