//! Ollama adapter. Local daemon, NDJSON streaming instead of SSE, tool
//! calls arrive whole in one line (non-streamed) the same as Gemini's
//! `functionCall` — one `Start` immediately followed by `Stop`.

use async_stream::stream;
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::assembler::{BlockEvent, ToolCallAssembler};
use crate::canonical::{ChatOptions, Event, Message, ProviderTag, Role, ToolDescriptor};
use crate::cancel::CancellationToken;
use crate::error::{classify, CanonicalError, ErrorKind};
use crate::stream::NdjsonParser;

use super::{preprocess, Adapter, BoxEventStream};

pub struct OllamaAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaAdapter {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

fn mint_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
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
    let mut wire = serde_json::Map::new();
    wire.insert("role".into(), json!(encode_role(msg.role)));
    wire.insert("content".into(), json!(msg.text_content()));
    if !msg.tool_calls.is_empty() {
        let calls: Vec<Value> = msg
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.clone().unwrap_or_else(|| json!({})),
                    }
                })
            })
            .collect();
        wire.insert("tool_calls".into(), Value::Array(calls));
    }
    Value::Object(wire)
}

fn build_request_body(messages: &[Message], wire_tools: &[Value], options: &ChatOptions) -> Value {
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
    let mut wire_options = serde_json::Map::new();
    if let Some(t) = options.temperature {
        wire_options.insert("temperature".into(), json!(t));
    }
    if let Some(t) = options.top_p {
        wire_options.insert("top_p".into(), json!(t));
    }
    if let Some(t) = options.max_tokens {
        wire_options.insert("num_predict".into(), json!(t));
    }
    if !options.stop.is_empty() {
        wire_options.insert("stop".into(), json!(options.stop));
    }
    if !wire_options.is_empty() {
        body.insert("options".into(), Value::Object(wire_options));
    }
    Value::Object(body)
}

fn decode_line(payload: &Value, assembler: &mut ToolCallAssembler, next_index: &mut u32) -> Vec<Event> {
    let mut out = Vec::new();
    if let Some(content) = payload["message"]["content"].as_str() {
        if !content.is_empty() {
            out.push(Event::Content(content.to_string()));
        }
    }
    if let Some(calls) = payload["message"]["tool_calls"].as_array() {
        for call in calls {
            let index = *next_index;
            *next_index += 1;
            let function = &call["function"];
            let id = mint_call_id();
            let name = function["name"].as_str().unwrap_or_default().to_string();
            let args = function.get("arguments").cloned();
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
    if payload["done"].as_bool() == Some(true) {
        let input_tokens = payload["prompt_eval_count"].as_u64();
        let output_tokens = payload["eval_count"].as_u64();
        if input_tokens.is_some() || output_tokens.is_some() {
            out.push(Event::UsageHint {
                input_tokens,
                output_tokens,
            });
        }
    }
    out
}

#[async_trait::async_trait]
impl Adapter for OllamaAdapter {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> Result<BoxEventStream, CanonicalError> {
        let (normalized, wire_tools) = preprocess(messages, tools, ProviderTag::Ollama, options)?;
        let body = build_request_body(&normalized, &wire_tools, options);

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
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
            let mut parser = NdjsonParser::new();
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
                for line in parser.feed(&text) {
                    let Ok(payload) = serde_json::from_str::<Value>(&line) else {
                        continue;
                    };
                    let is_done = payload["done"].as_bool() == Some(true);
                    for evt in decode_line(&payload, &mut assembler, &mut next_index) {
                        yield evt;
                    }
                    if is_done {
                        yield Event::End;
                        return;
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
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
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
        ProviderTag::Ollama
    }
}
