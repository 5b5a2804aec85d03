//! Shared SSE plumbing for the remote adapters.
//!
//! Every vendor stream follows the same shape: buffer body bytes, split on
//! the `\n\n` event delimiter, extract `data:` payloads, and hand each
//! payload to a vendor-specific parser that yields zero or more chunks.

use crate::error::Result;
use crate::traits::{ChunkStream, ResponseChunk};

/// Pull complete `data:` payloads out of an SSE buffer.
///
/// The buffer is drained in place; a trailing partial event stays behind
/// for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
    }

    payloads
}

/// Turn an SSE `reqwest::Response` into a [`ChunkStream`].
///
/// The parser closure is `FnMut` because vendors with stateful framing
/// (Anthropic content blocks, OpenAI usage-on-final-chunk) carry state
/// across payloads.
pub(crate) fn sse_chunk_stream<F>(response: reqwest::Response, mut parse_data: F) -> ChunkStream
where
    F: FnMut(&str) -> Vec<Result<ResponseChunk>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        for item in parse_data(&data) {
                            yield item;
                        }
                    }
                }
                Ok(None) => {
                    // Body closed; flush a trailing partial event if any
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            for item in parse_data(&data) {
                                yield item;
                            }
                        }
                    }
                    break;
                }
                Err(err) => {
                    yield Err(err.into());
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_complete_event() {
        let mut buf = String::from("event: delta\ndata: {\"a\":1}\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["{\"a\":1}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_multiple_events() {
        let mut buf = String::from("data: one\n\ndata: two\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["one", "two"]);
    }

    #[test]
    fn test_partial_event_stays_buffered() {
        let mut buf = String::from("data: whole\n\ndata: par");
        assert_eq!(drain_data_lines(&mut buf), vec!["whole"]);
        assert_eq!(buf, "data: par");

        buf.push_str("tial\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["partial"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut buf = String::from("event: ping\nid: 9\nretry: 1000\ndata: payload\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["payload"]);
    }

    #[test]
    fn test_done_sentinel_passes_through() {
        let mut buf = String::from("data: [DONE]\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["[DONE]"]);
    }

    #[test]
    fn test_empty_data_skipped() {
        let mut buf = String::from("data: \n\n");
        assert!(drain_data_lines(&mut buf).is_empty());
    }
}
