//! Provider adapters (C4): one uniform `Adapter` trait, one implementing
//! struct per provider. Each adapter does uniform preprocessing (normalize,
//! convert_tools) then its own wire encode / SSE-or-NDJSON decode.

pub mod anthropic;
pub mod empty;
pub mod gemini;
pub mod ollama;
pub mod openai;

use std::pin::Pin;

use futures_util::Stream;

use crate::canonical::{ChatOptions, Event, Message, ProviderTag, ToolDescriptor};
use crate::cancel::CancellationToken;
use crate::error::CanonicalError;

pub type BoxEventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> Result<BoxEventStream, CanonicalError>;

    /// Non-streaming convenience: drains `stream_chat` and concatenates its
    /// `Content` events.
    async fn sample_text(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<String, CanonicalError> {
        use futures_util::StreamExt;
        let mut stream = self
            .stream_chat(messages, &[], options, CancellationToken::new())
            .await?;
        let mut out = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Event::Content(text) => out.push_str(&text),
                Event::Error(kind, message) => return Err(CanonicalError::new(kind, message)),
                Event::End => break,
                _ => {}
            }
        }
        Ok(out)
    }

    async fn list_models(&self) -> Result<Vec<String>, CanonicalError>;

    fn provider(&self) -> ProviderTag;
}

/// Common header/row of uniform preprocessing every real adapter applies
/// before building its provider-specific request body.
pub(crate) fn preprocess(
    messages: &[Message],
    tools: &[ToolDescriptor],
    provider: ProviderTag,
    options: &ChatOptions,
) -> Result<(Vec<Message>, Vec<serde_json::Value>), CanonicalError> {
    let normalized = crate::normalize::normalize(messages, provider, options)?;
    let wire_tools = crate::tools::convert_tools(tools, provider)?;
    Ok((normalized, wire_tools))
}
