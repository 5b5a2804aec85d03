//! No-op provider: a finite stream that yields nothing. Conversations built
//! on it produce empty messages and converge to 1.0, which makes it the
//! cheapest way to exercise the full event pipeline.

use futures::stream;

use duologue_types::Vendor;

use crate::error::Result;
use crate::traits::{ChatRequest, ChunkStream, Provider};

pub struct SilentProvider;

#[async_trait::async_trait]
impl Provider for SilentProvider {
    async fn stream_response(&self, _request: ChatRequest) -> Result<ChunkStream> {
        Ok(Box::pin(stream::empty()))
    }

    fn vendor(&self) -> Vendor {
        Vendor::Silent
    }

    fn model(&self) -> &str {
        "silent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_silent_stream_is_empty() {
        let provider = SilentProvider;
        let mut stream = provider
            .stream_response(ChatRequest::default())
            .await
            .unwrap();
        assert!(stream.next().await.is_none());
    }
}
