//! Local ollama adapter. The `/api/chat` endpoint streams newline-delimited
//! JSON rather than SSE; the final frame has `done: true` and carries eval
//! counts that map onto token usage.

use serde_json::{Value, json};
use std::time::Duration;

use duologue_types::{Role, Vendor};

use crate::error::{Error, ErrorKind, Result};
use crate::traits::{ChatRequest, ChunkStream, Provider, ResponseChunk, TokenUsage};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let base_url = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            model: model.into(),
            base_url,
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": msg.content })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(temp) = request.temperature {
            body["options"] = json!({ "temperature": temp });
        }
        if request.thinking_enabled {
            body["think"] = json!(true);
        }
        body
    }
}

fn parse_line(line: &str) -> Vec<Result<ResponseChunk>> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => return vec![Err(err.into())],
    };

    if let Some(error) = value["error"].as_str() {
        return vec![Err(Error::api(
            Vendor::Ollama.as_str(),
            ErrorKind::ServerError,
            error,
        ))];
    }

    let mut chunks = Vec::new();

    if let Some(text) = value["message"]["thinking"].as_str()
        && !text.is_empty()
    {
        chunks.push(Ok(ResponseChunk::thinking(text)));
    }
    if let Some(text) = value["message"]["content"].as_str()
        && !text.is_empty()
    {
        chunks.push(Ok(ResponseChunk::response(text)));
    }

    if value["done"].as_bool().unwrap_or(false)
        && let Some(eval_count) = value["eval_count"].as_u64()
    {
        chunks.push(Ok(ResponseChunk::response("").with_usage(TokenUsage {
            input_tokens: value["prompt_eval_count"].as_u64().unwrap_or(0),
            output_tokens: eval_count,
        })));
    }

    chunks
}

fn ndjson_chunk_stream(response: reqwest::Response) -> ChunkStream {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    while let Some(pos) = buffer.find('\n') {
                        let line: String = buffer.drain(..=pos).collect();
                        let line = line.trim();
                        if !line.is_empty() {
                            for item in parse_line(line) {
                                yield item;
                            }
                        }
                    }
                }
                Ok(None) => {
                    let line = buffer.trim();
                    if !line.is_empty() {
                        for item in parse_line(line) {
                            yield item;
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

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    async fn stream_response(&self, request: ChatRequest) -> Result<ChunkStream> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_body(&request);

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or(body);
            let kind = match status.as_u16() {
                404 => ErrorKind::InvalidRequest,
                _ if status.is_server_error() => ErrorKind::ServerError,
                _ => ErrorKind::InvalidRequest,
            };
            return Err(Error::api(
                Vendor::Ollama.as_str(),
                kind,
                format!("HTTP {}: {}", status.as_u16(), message),
            ));
        }

        Ok(ndjson_chunk_stream(response))
    }

    fn vendor(&self) -> Vendor {
        Vendor::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }
}
