mod anthropic;
mod context;
mod error;
mod google;
mod ollama;
mod openai_compat;
mod registry;
mod retry;
mod silent;
mod sse;
mod test_provider;
mod traits;

pub use anthropic::AnthropicProvider;
pub use context::{ContextManager, TruncationReport};
pub use error::{Error, ErrorKind, Result};
pub use google::GoogleProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{build_provider, preflight};
pub use retry::RetryPolicy;
pub use silent::SilentProvider;
pub use test_provider::TestProvider;
pub use traits::{ChatRequest, ChunkKind, ChunkStream, Provider, ProviderMessage, ResponseChunk, TokenUsage};
