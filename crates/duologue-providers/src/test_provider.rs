//! Deterministic local provider for self-contained tests and dry runs.
//!
//! Two modes: parrot (repeat the last user message) and script (play back a
//! fixed list of replies, one per call, repeating the last when exhausted).
//! Responses stream word by word so chunk accumulation paths are exercised.

use futures::stream;
use std::sync::Mutex;

use duologue_types::{Role, Vendor, estimate_tokens};

use crate::error::Result;
use crate::traits::{ChatRequest, ChunkStream, Provider, ResponseChunk, TokenUsage};

enum Mode {
    Parrot,
    Script(Vec<String>),
}

pub struct TestProvider {
    model: String,
    mode: Mode,
    calls: Mutex<usize>,
}

impl TestProvider {
    /// Repeats the last user message back. Two parrots converge fast, which
    /// is exactly what the convergence tests need.
    pub fn parrot() -> Self {
        Self {
            model: "test".to_string(),
            mode: Mode::Parrot,
            calls: Mutex::new(0),
        }
    }

    /// Plays back the given replies in order, repeating the last forever
    pub fn script(replies: Vec<String>) -> Self {
        Self {
            model: "test:script".to_string(),
            mode: Mode::Script(replies),
            calls: Mutex::new(0),
        }
    }

    /// Number of stream_response calls made so far
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn reply_for(&self, request: &ChatRequest, call: usize) -> String {
        match &self.mode {
            Mode::Parrot => request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_else(|| "Hello.".to_string()),
            Mode::Script(replies) => match replies.get(call).or_else(|| replies.last()) {
                Some(reply) => reply.clone(),
                None => String::new(),
            },
        }
    }
}

#[async_trait::async_trait]
impl Provider for TestProvider {
    async fn stream_response(&self, request: ChatRequest) -> Result<ChunkStream> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let current = *calls;
            *calls += 1;
            current
        };

        let reply = self.reply_for(&request, call);
        let input_tokens: u64 = request
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum();
        let output_tokens = estimate_tokens(&reply);

        // Stream word by word, usage on the last chunk like a real vendor
        let words: Vec<String> = reply
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        let last = words.len().saturating_sub(1);
        let chunks: Vec<Result<ResponseChunk>> = words
            .into_iter()
            .enumerate()
            .map(|(i, word)| {
                let chunk = ResponseChunk::response(word);
                if i == last {
                    Ok(chunk.with_usage(TokenUsage {
                        input_tokens,
                        output_tokens,
                    }))
                } else {
                    Ok(chunk)
                }
            })
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }

    fn vendor(&self) -> Vendor {
        Vendor::Test
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ProviderMessage;
    use futures::StreamExt;

    async fn collect(provider: &TestProvider, request: ChatRequest) -> String {
        let mut stream = provider.stream_response(request).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.unwrap().text);
        }
        text
    }

    #[tokio::test]
    async fn test_parrot_repeats_last_user_message() {
        let provider = TestProvider::parrot();
        let request = ChatRequest {
            messages: vec![
                ProviderMessage::new(Role::User, "first"),
                ProviderMessage::new(Role::Assistant, "reply"),
                ProviderMessage::new(Role::User, "echo me please"),
            ],
            ..ChatRequest::default()
        };
        assert_eq!(collect(&provider, request).await, "echo me please");
    }

    #[tokio::test]
    async fn test_script_plays_in_order_then_repeats() {
        let provider =
            TestProvider::script(vec!["one".to_string(), "two".to_string()]);
        let request = ChatRequest::default();
        assert_eq!(collect(&provider, request.clone()).await, "one");
        assert_eq!(collect(&provider, request.clone()).await, "two");
        assert_eq!(collect(&provider, request.clone()).await, "two");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_usage_on_final_chunk() {
        let provider = TestProvider::script(vec!["alpha beta gamma".to_string()]);
        let mut stream = provider
            .stream_response(ChatRequest::default())
            .await
            .unwrap();
        let mut last_usage = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            if chunk.usage.is_some() {
                last_usage = chunk.usage;
            }
        }
        assert!(last_usage.unwrap().output_tokens > 0);
    }
}
