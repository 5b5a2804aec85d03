//! OpenAI Chat Completions adapter, shared by OpenAI itself and the
//! OpenAI-compatible x.ai endpoint. Streaming uses the `[DONE]`-terminated
//! SSE dialect with usage on the final chunk via `stream_options`.

use reqwest::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;

use duologue_types::{Role, Vendor};

use crate::error::{Error, ErrorKind, Result};
use crate::sse::sse_chunk_stream;
use crate::traits::{ChatRequest, ChunkStream, Provider, ResponseChunk, TokenUsage};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const XAI_BASE_URL: &str = "https://api.x.ai/v1";

pub struct OpenAiCompatProvider {
    vendor: Vendor,
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn openai(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::build(Vendor::Openai, model, api_key, OPENAI_BASE_URL)
    }

    pub fn xai(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::build(Vendor::Xai, model, api_key, XAI_BASE_URL)
    }

    fn build(
        vendor: Vendor,
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            vendor,
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.to_string(),
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
            "stream_options": { "include_usage": true },
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_completion_tokens"] = json!(max_tokens);
        }

        body
    }
}

/// Map an OpenAI-dialect status plus error body `code` into the taxonomy
fn classify(status: StatusCode, code: &str, message: &str) -> ErrorKind {
    match code {
        "insufficient_quota" => return ErrorKind::Quota,
        "rate_limit_exceeded" => return ErrorKind::RateLimit,
        "context_length_exceeded" => return ErrorKind::ContextLength,
        "invalid_api_key" => return ErrorKind::Authentication,
        _ => {}
    }
    match status.as_u16() {
        401 | 403 => ErrorKind::Authentication,
        429 => {
            if message.contains("quota") {
                ErrorKind::Quota
            } else {
                ErrorKind::RateLimit
            }
        }
        400 | 404 | 422 => {
            if message.contains("maximum context length") {
                ErrorKind::ContextLength
            } else {
                ErrorKind::InvalidRequest
            }
        }
        408 => ErrorKind::Timeout,
        503 => ErrorKind::Overloaded,
        _ if status.is_server_error() => ErrorKind::ServerError,
        _ => ErrorKind::InvalidRequest,
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn error_from_response(vendor: Vendor, response: reqwest::Response) -> Error {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();

    let parsed: Option<Value> = serde_json::from_str(&body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v["error"]["code"].as_str())
        .unwrap_or("");
    let message = parsed
        .as_ref()
        .and_then(|v| v["error"]["message"].as_str())
        .unwrap_or(&body)
        .to_string();

    Error::Api {
        vendor: vendor.as_str().to_string(),
        kind: classify(status, code, &message),
        message: format!("HTTP {}: {}", status.as_u16(), message),
        retry_after,
    }
}

fn parse_sse(vendor: Vendor, data: &str) -> Vec<Result<ResponseChunk>> {
    if data == "[DONE]" {
        return Vec::new();
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => return vec![Err(err.into())],
    };

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let code = error["code"].as_str().unwrap_or("");
        let message = error["message"].as_str().unwrap_or("stream error").to_string();
        return vec![Err(Error::api(
            vendor.as_str(),
            classify(StatusCode::INTERNAL_SERVER_ERROR, code, &message),
            message,
        ))];
    }

    let mut chunks = Vec::new();

    let delta = &value["choices"][0]["delta"];
    // Reasoning-capable compat endpoints stream thinking separately
    if let Some(text) = delta["reasoning_content"].as_str()
        && !text.is_empty()
    {
        chunks.push(Ok(ResponseChunk::thinking(text)));
    }
    if let Some(text) = delta["content"].as_str()
        && !text.is_empty()
    {
        chunks.push(Ok(ResponseChunk::response(text)));
    }

    // With include_usage the final chunk carries usage and empty choices
    if let Some(usage) = value.get("usage").filter(|u| u.is_object()) {
        let usage = TokenUsage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
        };
        chunks.push(Ok(ResponseChunk::response("").with_usage(usage)));
    }

    chunks
}

#[async_trait::async_trait]
impl Provider for OpenAiCompatProvider {
    async fn stream_response(&self, request: ChatRequest) -> Result<ChunkStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(self.vendor, response).await);
        }

        let vendor = self.vendor;
        Ok(sse_chunk_stream(response, move |data| {
            parse_sse(vendor, data)
        }))
    }

    fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn model(&self) -> &str {
        &self.model
    }
}
