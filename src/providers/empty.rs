//! The null adapter. The service factory hands this back instead of
//! failing `get_service` outright when a real provider adapter can't be
//! constructed, so callers always get a usable (if inert) adapter.

use futures_util::stream;

use crate::canonical::{ChatOptions, Event, Message, ProviderTag, ToolDescriptor};
use crate::cancel::CancellationToken;
use crate::error::CanonicalError;

use super::{Adapter, BoxEventStream};

pub struct EmptyAdapter;

#[async_trait::async_trait]
impl Adapter for EmptyAdapter {
    async fn stream_chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDescriptor],
        _options: &ChatOptions,
        _cancel: CancellationToken,
    ) -> Result<BoxEventStream, CanonicalError> {
        Ok(Box::pin(stream::iter(vec![Event::End])))
    }

    async fn sample_text(
        &self,
        _messages: &[Message],
        _options: &ChatOptions,
    ) -> Result<String, CanonicalError> {
        Ok(String::new())
    }

    async fn list_models(&self) -> Result<Vec<String>, CanonicalError> {
        Ok(Vec::new())
    }

    fn provider(&self) -> ProviderTag {
        ProviderTag::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn stream_chat_yields_only_end() {
        let adapter = EmptyAdapter;
        let mut stream = adapter
            .stream_chat(&[], &[], &ChatOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.next().await, Some(Event::End));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn sample_text_is_empty_string() {
        let adapter = EmptyAdapter;
        let text = adapter.sample_text(&[], &ChatOptions::default()).await.unwrap();
        assert_eq!(text, "");
    }
}
