//! Providers with scripted outcomes, for exercising retry, failure, and
//! termination paths without a network.

use futures::stream;
use std::sync::Mutex;

use duologue_providers::{
    ChatRequest, ChunkStream, Error, ErrorKind, Provider, ResponseChunk, Result, TokenUsage,
};
use duologue_types::{Vendor, estimate_tokens};

/// One scripted call outcome
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Stream this reply word by word
    Reply(String),
    /// Fail the call with the given kind before yielding any chunk
    Fail(ErrorKind),
}

impl Outcome {
    pub fn reply(text: impl Into<String>) -> Self {
        Outcome::Reply(text.into())
    }
}

/// Plays back outcomes in order; the last one repeats forever. A sequence
/// of `[Fail(RateLimit), Fail(RateLimit), Reply(..)]` simulates a vendor
/// that 429s twice before succeeding.
pub struct SequenceProvider {
    outcomes: Vec<Outcome>,
    calls: Mutex<usize>,
}

impl SequenceProvider {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes,
            calls: Mutex::new(0),
        }
    }

    /// Succeed with fixed replies for `successes` calls, then fail every
    /// call after that
    pub fn fail_after(successes: usize, kind: ErrorKind) -> Self {
        let mut outcomes: Vec<Outcome> = (0..successes)
            .map(|i| Outcome::reply(format!("scripted reply number {}", i)))
            .collect();
        outcomes.push(Outcome::Fail(kind));
        Self::new(outcomes)
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for SequenceProvider {
    async fn stream_response(&self, request: ChatRequest) -> Result<ChunkStream> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let current = *calls;
            *calls += 1;
            current
        };

        let outcome = self
            .outcomes
            .get(call)
            .or_else(|| self.outcomes.last())
            .cloned()
            .unwrap_or(Outcome::Reply(String::new()));

        match outcome {
            Outcome::Fail(kind) => Err(Error::api("test", kind, format!("scripted {}", kind))),
            Outcome::Reply(reply) => {
                let input_tokens: u64 = request
                    .messages
                    .iter()
                    .map(|m| estimate_tokens(&m.content))
                    .sum();
                let usage = TokenUsage {
                    input_tokens,
                    output_tokens: estimate_tokens(&reply),
                };
                let words: Vec<String> =
                    reply.split_inclusive(' ').map(str::to_string).collect();
                let last = words.len().saturating_sub(1);
                let chunks: Vec<Result<ResponseChunk>> = words
                    .into_iter()
                    .enumerate()
                    .map(|(i, word)| {
                        let chunk = ResponseChunk::response(word);
                        Ok(if i == last { chunk.with_usage(usage) } else { chunk })
                    })
                    .collect();
                Ok(Box::pin(stream::iter(chunks)))
            }
        }
    }

    fn vendor(&self) -> Vendor {
        Vendor::Test
    }

    fn model(&self) -> &str {
        "test:sequence"
    }
}
