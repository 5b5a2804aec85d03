use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use duologue_types::{Role, Vendor};

use crate::error::Result;

/// A provider-facing message: canonical history after role routing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One streaming request to an LLM endpoint
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ProviderMessage>,
    /// Sampling temperature. `None` lets the vendor choose.
    pub temperature: Option<f32>,
    /// Response token cap. `None` uses the adapter default.
    pub max_tokens: Option<u32>,
    /// Request extended thinking where the model supports it
    pub thinking_enabled: bool,
    pub thinking_budget: Option<u32>,
}

/// Whether a chunk belongs to the visible response or the thinking trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Thinking,
    Response,
}

/// Vendor-reported token accounting, attached to the chunk that carried it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One delta from a streaming response.
///
/// Chunk boundaries are vendor noise; only arrival order is the contract.
/// `usage` rides along on whichever chunk the vendor reported it with,
/// usually the last.
#[derive(Debug, Clone)]
pub struct ResponseChunk {
    pub kind: ChunkKind,
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl ResponseChunk {
    pub fn response(text: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Response,
            text: text.into(),
            usage: None,
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Thinking,
            text: text.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A finite, non-restartable sequence of response chunks in arrival order
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ResponseChunk>> + Send>>;

/// Capability every LLM adapter implements: history in, chunk stream out.
///
/// Implementations are vendor-specific adapters plus the deterministic
/// `test` and no-op `silent` variants used by the self-contained tests.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Start one streaming completion. The returned stream is lazy and
    /// yields chunks as the vendor produces them.
    async fn stream_response(&self, request: ChatRequest) -> Result<ChunkStream>;

    fn vendor(&self) -> Vendor;

    fn model(&self) -> &str;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("vendor", &self.vendor())
            .field("model", &self.model())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_constructors() {
        let chunk = ResponseChunk::response("hi");
        assert_eq!(chunk.kind, ChunkKind::Response);
        assert!(chunk.usage.is_none());

        let chunk = ResponseChunk::thinking("hmm").with_usage(TokenUsage {
            input_tokens: 10,
            output_tokens: 2,
        });
        assert_eq!(chunk.kind, ChunkKind::Thinking);
        assert_eq!(chunk.usage.unwrap().input_tokens, 10);
    }
}
