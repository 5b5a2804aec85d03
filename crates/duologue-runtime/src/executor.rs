//! Single-turn execution: one request per agent in speaking order, then the
//! convergence score over the updated history.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use duologue_engine::{ConvergenceCalculator, route_history};
use duologue_types::{AgentId, Conversation, EventPayload, Message, Turn};

use crate::bus::EventBus;
use crate::error::Result;
use crate::event_provider::EventAwareProvider;

/// A completed turn plus its convergence score
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn: Turn,
    pub convergence: f64,
}

pub struct TurnExecutor {
    bus: Arc<EventBus>,
    conversation_id: Uuid,
    provider_a: EventAwareProvider,
    provider_b: EventAwareProvider,
    /// Per-agent system prompts, injected at request time rather than into
    /// the canonical history
    system_prompt_a: Option<String>,
    system_prompt_b: Option<String>,
}

impl TurnExecutor {
    pub fn new(
        bus: Arc<EventBus>,
        conversation_id: Uuid,
        provider_a: EventAwareProvider,
        provider_b: EventAwareProvider,
        system_prompt_a: Option<String>,
        system_prompt_b: Option<String>,
    ) -> Self {
        Self {
            bus,
            conversation_id,
            provider_a,
            provider_b,
            system_prompt_a,
            system_prompt_b,
        }
    }

    /// Run one turn: first speaker, then the partner with the updated
    /// history, then the convergence score. Provider failures have already
    /// been narrated as events when this returns Err; the conductor decides
    /// what the failure means for the conversation.
    pub async fn execute(
        &self,
        conversation: &mut Conversation,
        calculator: &ConvergenceCalculator,
        turn_number: u32,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        self.bus.emit(
            Some(self.conversation_id),
            EventPayload::TurnStart { turn_number },
        )?;

        let first = conversation.first_speaker;
        let second = first.partner();

        let first_message = self
            .request_message(conversation, first, turn_number, cancel)
            .await?;
        conversation.messages.push(first_message);

        let second_message = self
            .request_message(conversation, second, turn_number, cancel)
            .await?;
        conversation.messages.push(second_message);

        let convergence = calculator.calculate(&conversation.messages);

        self.bus.emit(
            Some(self.conversation_id),
            EventPayload::TurnComplete {
                turn_number,
                convergence_score: convergence,
            },
        )?;

        let len = conversation.messages.len();
        let (a_message, b_message) = match first {
            AgentId::AgentA => (
                conversation.messages[len - 2].clone(),
                conversation.messages[len - 1].clone(),
            ),
            AgentId::AgentB => (
                conversation.messages[len - 1].clone(),
                conversation.messages[len - 2].clone(),
            ),
        };

        Ok(TurnOutcome {
            turn: Turn {
                turn_number,
                a_message,
                b_message,
                convergence_score: convergence,
            },
            convergence,
        })
    }

    async fn request_message(
        &self,
        conversation: &Conversation,
        target: AgentId,
        turn_number: u32,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        let mut routed = Vec::new();
        let system_prompt = match target {
            AgentId::AgentA => &self.system_prompt_a,
            AgentId::AgentB => &self.system_prompt_b,
        };
        if let Some(prompt) = system_prompt {
            routed.push(Message::system(prompt.clone()));
        }
        routed.extend(route_history(
            &conversation.messages,
            target,
            &conversation.agent_a,
            &conversation.agent_b,
        ));

        let provider = match target {
            AgentId::AgentA => &self.provider_a,
            AgentId::AgentB => &self.provider_b,
        };
        let completed = provider
            .generate(conversation.agent(target), turn_number, routed, cancel)
            .await?;

        Ok(Message::from_agent(target, completed.content))
    }
}
