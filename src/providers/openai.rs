//! OpenAI-family adapter: OpenAI, Groq, Cerebras, and Fireworks share this
//! Chat Completions wire shape byte-for-byte. The only per-variant
//! differences are base URL and (Cerebras) tool schema sanitization, both
//! handled upstream of this file by `ProviderTag`.

use async_stream::stream;
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::assembler::{BlockEvent, ToolCallAssembler};
use crate::canonical::{ChatOptions, ContentPart, Event, Message, OpenAiVariant, ProviderTag, Role, ToolDescriptor};
use crate::cancel::CancellationToken;
use crate::error::{classify, CanonicalError, ErrorKind};
use crate::stream::{is_done_event, SseParser};

use super::{preprocess, Adapter, BoxEventStream};

pub struct OpenAiFamilyAdapter {
    variant: OpenAiVariant,
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiFamilyAdapter {
    #[must_use]
    pub fn new(variant: OpenAiVariant, api_key: String, http: reqwest::Client, base_url: String) -> Self {
        Self {
            variant,
            api_key,
            http,
            base_url,
        }
    }

    fn provider_tag(&self) -> ProviderTag {
        ProviderTag::OpenAiFamily(self.variant)
    }
}

fn encode_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn encode_message(msg: &Message) -> Value {
    if msg.role == Role::Tool {
        return json!({
            "role": "tool",
            "content": msg.text_content(),
            "tool_call_id": msg.tool_call_id,
        });
    }

    let mut out = serde_json::Map::new();
    out.insert("role".into(), json!(encode_role(msg.role)));
    if !msg.content.is_empty() {
        out.insert("content".into(), json!(msg.text_content()));
    } else {
        out.insert("content".into(), Value::Null);
    }
    if !msg.tool_calls.is_empty() {
        let calls: Vec<Value> = msg
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.as_ref().map_or_else(
                            || "{}".to_string(),
                            |v| v.to_string(),
                        ),
                    }
                })
            })
            .collect();
        out.insert("tool_calls".into(), Value::Array(calls));
    }
    Value::Object(out)
}

fn build_request_body(
    messages: &[Message],
    wire_tools: &[Value],
    options: &ChatOptions,
) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("model".into(), json!(options.model));
    body.insert(
        "messages".into(),
        Value::Array(messages.iter().map(encode_message).collect()),
    );
    body.insert("stream".into(), json!(true));
    if !wire_tools.is_empty() {
        body.insert("tools".into(), Value::Array(wire_tools.to_vec()));
    }
    if let Some(t) = options.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(t) = options.max_tokens {
        body.insert("max_tokens".into(), json!(t));
    }
    if let Some(t) = options.top_p {
        body.insert("top_p".into(), json!(t));
    }
    if !options.stop.is_empty() {
        body.insert("stop".into(), json!(options.stop));
    }
    Value::Object(body)
}

#[async_trait::async_trait]
impl Adapter for OpenAiFamilyAdapter {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> Result<BoxEventStream, CanonicalError> {
        let (normalized, wire_tools) = preprocess(messages, tools, self.provider_tag(), options)?;
        let body = build_request_body(&normalized, &wire_tools, options);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
                    if is_done_event(&sse_event) {
                        yield Event::End;
                        return;
                    }
                    let Ok(payload) = serde_json::from_str::<Value>(&sse_event.data) else {
                        continue;
                    };
                    for evt in decode_chunk(&payload, &mut assembler) {
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
            data: Vec<ModelEntry>,
        }
        #[derive(serde::Deserialize)]
        struct ModelEntry {
            id: String,
        }

        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
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
        self.provider_tag()
    }
}

fn decode_chunk(payload: &Value, assembler: &mut ToolCallAssembler) -> Vec<Event> {
    let mut out = Vec::new();
    let Some(choice) = payload["choices"].get(0) else {
        if let Some(usage) = payload.get("usage") {
            out.push(Event::UsageHint {
                input_tokens: usage["prompt_tokens"].as_u64(),
                output_tokens: usage["completion_tokens"].as_u64(),
            });
        }
        return out;
    };
    let delta = &choice["delta"];

    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            out.push(Event::Content(content.to_string()));
        }
    }

    if let Some(tool_calls) = delta["tool_calls"].as_array() {
        for tc in tool_calls {
            let index = tc["index"].as_u64().unwrap_or(0) as u32;
            let has_id = tc.get("id").and_then(Value::as_str).is_some();
            if has_id {
                let id = tc["id"].as_str().unwrap_or_default().to_string();
                let name = tc["function"]["name"].as_str().unwrap_or_default().to_string();
                assembler.feed(BlockEvent::Start {
                    index,
                    id,
                    name,
                    initial_input: None,
                });
            }
            if let Some(fragment) = tc["function"]["arguments"].as_str() {
                // A short argument body can finish parsing before OpenAI's
                // own finish_reason arrives; any still-open blocks are
                // drained below once it does.
                if let Some(call) = assembler.feed(BlockEvent::ArgDelta {
                    index,
                    fragment: fragment.to_string(),
                }) {
                    out.push(Event::ToolCall(call));
                }
            }
        }
    }

    if choice["finish_reason"].as_str() == Some("tool_calls") {
        for call in assembler.drain_all() {
            out.push(Event::ToolCall(call));
        }
    }

    if let Some(usage) = payload.get("usage") {
        out.push(Event::UsageHint {
            input_tokens: usage["prompt_tokens"].as_u64(),
            output_tokens: usage["completion_tokens"].as_u64(),
        });
    }

    out
}
