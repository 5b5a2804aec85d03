//! Decorator around any [`Provider`] that narrates a call onto the event
//! bus: MessageRequest before the call, a chunk event per delta, a
//! ThinkingComplete when reasoning streamed, then MessageComplete with
//! token accounting. Retries transient failures with exponential backoff
//! and announces every sleep as RateLimitPace.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use duologue_providers::{
    ChatRequest, ChunkKind, ContextManager, Provider, ProviderMessage, RetryPolicy, TokenUsage,
};
use duologue_types::{AgentConfig, AgentId, EventPayload, Message, Role, estimate_tokens};

use crate::bus::EventBus;
use crate::error::{Error, Result};
use crate::limiter::RateLimiter;

/// Sleeps at or above this are announced as RateLimitPace events
const PACE_REPORT_THRESHOLD: Duration = Duration::from_millis(100);

/// Fully assembled response for one provider call
#[derive(Debug, Clone)]
pub struct CompletedMessage {
    pub content: String,
    pub thinking: Option<String>,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub tokens_estimated: bool,
    pub duration_ms: u64,
}

/// Why one streaming call did not produce a message: the vendor failed, or
/// the event sink did. Vendor failures feed the retry policy; sink failures
/// end the conversation.
enum CallFailure {
    Provider(duologue_providers::Error),
    Bus(Error),
}

pub struct EventAwareProvider {
    inner: Arc<dyn Provider>,
    bus: Arc<EventBus>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    deadline: Duration,
    context: ContextManager,
    conversation_id: Uuid,
}

impl EventAwareProvider {
    pub fn new(
        inner: Arc<dyn Provider>,
        bus: Arc<EventBus>,
        limiter: Arc<RateLimiter>,
        deadline: Duration,
        context: ContextManager,
        conversation_id: Uuid,
    ) -> Self {
        Self {
            inner,
            bus,
            limiter,
            retry: RetryPolicy::default(),
            deadline,
            context,
            conversation_id,
        }
    }

    pub fn model(&self) -> &str {
        self.inner.model()
    }

    /// Run one provider call to completion, emitting the full event
    /// narration. Cancellation is observed at retry sleeps only; an
    /// in-flight call runs to its own deadline.
    pub async fn generate(
        &self,
        agent: &AgentConfig,
        turn_number: u32,
        messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<CompletedMessage> {
        let provider_messages: Vec<ProviderMessage> = messages
            .iter()
            .map(|m| ProviderMessage::new(m.role, m.content.clone()))
            .collect();

        let (provider_messages, truncation) = self.context.prepare(provider_messages);
        if let Some(report) = truncation {
            self.bus.emit(
                Some(self.conversation_id),
                EventPayload::ContextTruncation {
                    agent_id: agent.id,
                    turn_number,
                    dropped_messages: report.dropped_messages,
                    tokens_before: report.tokens_before,
                    tokens_after: report.tokens_after,
                    token_budget: report.token_budget,
                },
            )?;
        }

        let estimated_tokens = ContextManager::estimate(&provider_messages);
        let request = ChatRequest {
            messages: provider_messages,
            temperature: agent.temperature,
            max_tokens: None,
            thinking_enabled: agent.thinking_enabled,
            thinking_budget: agent.thinking_budget,
        };

        let waited = self.limiter.acquire(estimated_tokens).await;
        if waited >= PACE_REPORT_THRESHOLD {
            self.emit_pace(waited)?;
        }

        self.bus.emit(
            Some(self.conversation_id),
            EventPayload::MessageRequest {
                agent_id: agent.id,
                turn_number,
                model: self.inner.model().to_string(),
            },
        )?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started = Instant::now();

            let outcome = tokio::time::timeout(
                self.deadline,
                self.consume_stream(agent.id, turn_number, request.clone()),
            )
            .await;

            let error = match outcome {
                Ok(Ok((content, thinking, usage))) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let (tokens_in, tokens_out, estimated) = match usage {
                        Some(usage) => (usage.input_tokens, usage.output_tokens, false),
                        None => (estimated_tokens, estimate_tokens(&content), true),
                    };
                    self.limiter
                        .reconcile(estimated_tokens, tokens_in + tokens_out);

                    if let Some(thinking_text) = &thinking {
                        self.bus.emit(
                            Some(self.conversation_id),
                            EventPayload::ThinkingComplete {
                                agent_id: agent.id,
                                turn_number,
                                content: thinking_text.clone(),
                                thinking_tokens: Some(estimate_tokens(thinking_text)),
                                duration_ms: Some(duration_ms),
                            },
                        )?;
                    }

                    self.bus.emit(
                        Some(self.conversation_id),
                        EventPayload::MessageComplete {
                            agent_id: agent.id,
                            turn_number,
                            content: content.clone(),
                            model: self.inner.model().to_string(),
                            tokens_in: Some(tokens_in),
                            tokens_out: Some(tokens_out),
                            tokens_estimated: estimated,
                            duration_ms,
                        },
                    )?;

                    return Ok(CompletedMessage {
                        content,
                        thinking,
                        tokens_in: Some(tokens_in),
                        tokens_out: Some(tokens_out),
                        tokens_estimated: estimated,
                        duration_ms,
                    });
                }
                // A chunk that streamed fine but failed to reach the log is
                // fatal here like every other sink failure; only vendor
                // errors enter the retry policy
                Ok(Err(CallFailure::Bus(err))) => return Err(err),
                Ok(Err(CallFailure::Provider(err))) => err,
                Err(_elapsed) => {
                    self.bus.emit(
                        Some(self.conversation_id),
                        EventPayload::ProviderTimeout {
                            agent_id: agent.id,
                            turn_number,
                            timeout_ms: self.deadline.as_millis() as u64,
                        },
                    )?;
                    duologue_providers::Error::api(
                        self.inner.vendor().as_str(),
                        duologue_providers::ErrorKind::Timeout,
                        format!("no completion within {:?}", self.deadline),
                    )
                }
            };

            let delay = if error.retryable() {
                self.retry.delay_with_hint(attempt, error.retry_after())
            } else {
                None
            };

            match delay {
                Some(delay) => {
                    tracing::debug!(
                        vendor = self.inner.vendor().as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying provider call: {}",
                        error
                    );
                    self.emit_pace(delay)?;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                    }
                }
                None => {
                    self.bus.emit(
                        Some(self.conversation_id),
                        EventPayload::ApiError {
                            agent_id: Some(agent.id),
                            turn_number: Some(turn_number),
                            kind: error.kind().as_str().to_string(),
                            message: error.to_string(),
                            retryable: false,
                        },
                    )?;
                    return Err(Error::Provider(error));
                }
            }
        }
    }

    /// Drive one stream to the end, emitting chunk events and accumulating
    /// text per kind
    async fn consume_stream(
        &self,
        agent_id: AgentId,
        turn_number: u32,
        request: ChatRequest,
    ) -> std::result::Result<(String, Option<String>, Option<TokenUsage>), CallFailure> {
        let mut stream = self
            .inner
            .stream_response(request)
            .await
            .map_err(CallFailure::Provider)?;

        let mut content = String::new();
        let mut thinking = String::new();
        let mut usage: Option<TokenUsage> = None;
        let mut response_index = 0u64;
        let mut thinking_index = 0u64;

        while let Some(item) = stream.next().await {
            let chunk = item.map_err(CallFailure::Provider)?;
            if let Some(reported) = chunk.usage {
                usage = Some(reported);
            }
            if chunk.text.is_empty() {
                continue;
            }
            match chunk.kind {
                ChunkKind::Response => {
                    content.push_str(&chunk.text);
                    self.bus
                        .emit(
                            Some(self.conversation_id),
                            EventPayload::MessageChunk {
                                agent_id,
                                turn_number,
                                chunk: chunk.text,
                                chunk_index: response_index,
                            },
                        )
                        .map_err(CallFailure::Bus)?;
                    response_index += 1;
                }
                ChunkKind::Thinking => {
                    thinking.push_str(&chunk.text);
                    self.bus
                        .emit(
                            Some(self.conversation_id),
                            EventPayload::ThinkingChunk {
                                agent_id,
                                turn_number,
                                chunk: chunk.text,
                                chunk_index: thinking_index,
                            },
                        )
                        .map_err(CallFailure::Bus)?;
                    thinking_index += 1;
                }
            }
        }

        let thinking = if thinking.is_empty() {
            None
        } else {
            Some(thinking)
        };
        Ok((content, thinking, usage))
    }

    fn emit_pace(&self, wait: Duration) -> Result<()> {
        self.bus.emit(
            Some(self.conversation_id),
            EventPayload::RateLimitPace {
                provider: self.inner.vendor().as_str().to_string(),
                wait_ms: wait.as_millis() as u64,
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duologue_providers::{SilentProvider, TestProvider};
    use duologue_types::{AwarenessLevel, EventKind};

    fn agent() -> AgentConfig {
        AgentConfig {
            id: AgentId::AgentA,
            model: "test".to_string(),
            display_name: "test-1".to_string(),
            chosen_name: None,
            temperature: None,
            awareness: AwarenessLevel::Basic,
            thinking_enabled: false,
            thinking_budget: None,
        }
    }

    fn wrap(provider: Arc<dyn Provider>, dir: &std::path::Path, conv: Uuid) -> EventAwareProvider {
        let bus = Arc::new(EventBus::new(dir.to_path_buf(), None));
        let limiter = Arc::new(RateLimiter::new(
            "test",
            crate::config::RateLimitSettings {
                requests_per_minute: 1_000,
                tokens_per_minute: u64::MAX,
            },
            false,
        ));
        EventAwareProvider::new(
            provider,
            bus,
            limiter,
            Duration::from_secs(30),
            ContextManager::new(1_000_000, false),
            conv,
        )
    }

    #[tokio::test]
    async fn test_generate_emits_request_chunks_complete() {
        let dir = tempfile::tempdir().unwrap();
        let conv = Uuid::new_v4();
        let provider = wrap(
            Arc::new(TestProvider::script(vec!["three word reply".to_string()])),
            dir.path(),
            conv,
        );

        let history = vec![Message::human("go")];
        let cancel = CancellationToken::new();
        let completed = provider
            .generate(&agent(), 0, history, &cancel)
            .await
            .unwrap();

        assert_eq!(completed.content, "three word reply");
        assert!(completed.thinking.is_none());
        assert!(completed.tokens_out.unwrap() > 0);

        let events = duologue_engine::read_events(
            &dir.path().join(format!("{}_events.jsonl", conv)),
        )
        .unwrap();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds[0], EventKind::MessageRequest);
        assert!(kinds.contains(&EventKind::MessageChunk));
        assert_eq!(*kinds.last().unwrap(), EventKind::MessageComplete);
    }

    #[tokio::test]
    async fn test_silent_provider_completes_with_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let conv = Uuid::new_v4();
        let provider = wrap(Arc::new(SilentProvider), dir.path(), conv);

        let cancel = CancellationToken::new();
        let completed = provider
            .generate(&agent(), 0, vec![Message::human("go")], &cancel)
            .await
            .unwrap();
        assert_eq!(completed.content, "");
        assert!(completed.tokens_estimated);

        let events = duologue_engine::read_events(
            &dir.path().join(format!("{}_events.jsonl", conv)),
        )
        .unwrap();
        // No chunks for an empty stream, but the completion still lands
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::MessageRequest, EventKind::MessageComplete]);
    }
}
