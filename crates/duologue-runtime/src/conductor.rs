//! Runs one conversation end to end: setup, the turn loop, the termination
//! decision, and teardown. The conductor exclusively owns its Conversation,
//! its bus handle, and its two providers for the conversation's lifetime.

use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use duologue_engine::{ConvergenceCalculator, NameCoordinator};
use duologue_providers::{ContextManager, ErrorKind, Provider};
use duologue_types::{
    AgentId, Conversation, ConversationStatus, ConvergenceAction, EndedReason, EventPayload,
    Message, ExperimentConfig, models,
};

use crate::bus::EventBus;
use crate::config::{RuntimeSettings, resolve_agents};
use crate::error::{Error, Result};
use crate::event_provider::EventAwareProvider;
use crate::executor::{TurnExecutor, TurnOutcome};
use crate::limiter::limiter_for;
use crate::prompts;

/// Terminal summary handed back to the scheduler
#[derive(Debug, Clone)]
pub struct ConversationResult {
    pub conversation_id: Uuid,
    pub status: ConversationStatus,
    pub ended_reason: EndedReason,
    pub final_convergence: Option<f64>,
    pub turns_completed: u32,
    pub error: Option<String>,
}

pub struct Conductor {
    bus: Arc<EventBus>,
    conversation: Conversation,
    executor: TurnExecutor,
    calculator: ConvergenceCalculator,
    names: NameCoordinator,
    threshold: f64,
    action: ConvergenceAction,
    choose_names: bool,
    allow_truncation: bool,
    start_turn: u32,
    branched_from: Option<Uuid>,
}

impl Conductor {
    /// Wire up one conversation: resolved agents, wrapped providers bound to
    /// the shared per-vendor limiters, and a calculator from the configured
    /// weight profile.
    pub fn new(
        bus: Arc<EventBus>,
        experiment_id: Uuid,
        config: &ExperimentConfig,
        settings: &RuntimeSettings,
        provider_a: Arc<dyn Provider>,
        provider_b: Arc<dyn Provider>,
    ) -> Result<Self> {
        let conversation_id = Uuid::new_v4();
        let (agent_a, agent_b) = resolve_agents(config);

        let calculator = ConvergenceCalculator::new(config.convergence_weights())?;

        let allow_truncation = config.allow_truncation || settings.allow_truncation;
        let wrap = |provider: Arc<dyn Provider>| {
            let vendor = provider.vendor();
            let limiter = limiter_for(
                vendor,
                settings.limits_for(vendor),
                settings.rate_limiting_enabled,
            );
            let context = ContextManager::new(
                models::context_window_for(provider.model()),
                allow_truncation,
            );
            EventAwareProvider::new(
                provider,
                bus.clone(),
                limiter,
                settings.request_timeout,
                context,
                conversation_id,
            )
        };

        let system_prompt_a = prompts::awareness_prompt(
            agent_a.awareness,
            &agent_a.display_name,
            &agent_b.display_name,
        );
        let system_prompt_b = prompts::awareness_prompt(
            agent_b.awareness,
            &agent_b.display_name,
            &agent_a.display_name,
        );

        let executor = TurnExecutor::new(
            bus.clone(),
            conversation_id,
            wrap(provider_a),
            wrap(provider_b),
            system_prompt_a,
            system_prompt_b,
        );

        // Branch seeds carry the source history verbatim, initial prompt
        // included; fresh conversations start from the prompt alone
        let mut messages = Vec::new();
        if config.branch_messages.is_empty() {
            if let Some(prompt) = &config.initial_prompt {
                messages.push(Message::human(prompt.clone()));
            }
        } else {
            messages.extend(config.branch_messages.iter().cloned());
        }

        let conversation = Conversation {
            id: conversation_id,
            experiment_id,
            agent_a,
            agent_b,
            initial_prompt: config.initial_prompt.clone().unwrap_or_default(),
            max_turns: config.max_turns,
            first_speaker: config.first_speaker,
            messages,
            status: ConversationStatus::Created,
            convergence_reason: None,
            final_convergence: None,
            started_at: chrono::Utc::now(),
            ended_at: None,
            error: None,
        };

        Ok(Self {
            bus,
            conversation,
            executor,
            calculator,
            names: NameCoordinator::new(),
            threshold: config.convergence.threshold,
            action: config.convergence.action,
            choose_names: config.choose_names,
            allow_truncation,
            start_turn: config.branch_turn.unwrap_or(0),
            branched_from: config.branch_from,
        })
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation.id
    }

    /// Drive the conversation to a terminal state. Never panics or
    /// re-raises provider errors; everything the caller needs is in the
    /// result and the event log.
    pub async fn run(mut self, cancel: CancellationToken) -> ConversationResult {
        let started = Instant::now();

        let (reason, error) = match self.run_inner(&cancel).await {
            Ok(reason) => (reason, None),
            // Provider exhaustion or a bus/filesystem failure: fatal to
            // this conversation only, recorded rather than re-raised
            Err(err) => (EndedReason::Error, Some(err.to_string())),
        };

        let status = reason.final_status();
        let final_convergence = self.calculator.scores().last().copied();
        let turns_completed = self.turns_completed();

        self.conversation.status = status;
        self.conversation.convergence_reason = Some(reason);
        self.conversation.final_convergence = final_convergence;
        self.conversation.ended_at = Some(chrono::Utc::now());
        self.conversation.error = error.clone();

        let end = self.bus.emit(
            Some(self.conversation.id),
            EventPayload::ConversationEnd {
                ended_reason: reason,
                final_convergence,
                duration_ms: started.elapsed().as_millis() as u64,
                total_turns: turns_completed,
                error: error.clone(),
            },
        );
        if let Err(err) = end {
            tracing::error!(conversation = %self.conversation.id, "failed to emit end event: {}", err);
        }
        if let Err(err) = self.bus.close_conversation_log(self.conversation.id) {
            tracing::error!(conversation = %self.conversation.id, "failed to close log: {}", err);
        }

        ConversationResult {
            conversation_id: self.conversation.id,
            status,
            ended_reason: reason,
            final_convergence,
            turns_completed,
            error,
        }
    }

    fn turns_completed(&self) -> u32 {
        self.start_turn + self.calculator.scores().len() as u32
    }

    async fn run_inner(&mut self, cancel: &CancellationToken) -> Result<EndedReason> {
        self.bus.emit(
            Some(self.conversation.id),
            EventPayload::ConversationStart {
                agent_a: self.conversation.agent_a.clone(),
                agent_b: self.conversation.agent_b.clone(),
                initial_prompt: self.conversation.initial_prompt.clone(),
                max_turns: self.conversation.max_turns,
                first_speaker: self.conversation.first_speaker,
                branched_from: self.branched_from,
                branch_turn: if self.branched_from.is_some() {
                    Some(self.start_turn)
                } else {
                    None
                },
            },
        )?;
        self.conversation.status = ConversationStatus::Running;

        self.emit_setup_prompts()?;

        for turn_number in self.start_turn..self.conversation.max_turns {
            if cancel.is_cancelled() {
                return Ok(EndedReason::Interrupted);
            }

            let outcome = self
                .executor
                .execute(
                    &mut self.conversation,
                    &self.calculator,
                    turn_number,
                    cancel,
                )
                .await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(Error::Cancelled) => return Ok(EndedReason::Interrupted),
                Err(err) => {
                    if err.provider_kind() == Some(ErrorKind::ContextLength)
                        && !self.allow_truncation
                    {
                        return Ok(EndedReason::ContextLimitReached);
                    }
                    return Err(err);
                }
            };

            self.calculator.track(outcome.convergence);

            if self.choose_names && turn_number == self.start_turn {
                self.extract_names(&outcome)?;
            }

            if outcome.convergence >= self.threshold {
                match self.action {
                    ConvergenceAction::Stop => return Ok(EndedReason::HighConvergence),
                    ConvergenceAction::Notify => {
                        self.bus.emit(
                            Some(self.conversation.id),
                            EventPayload::SystemPrompt {
                                agent_id: None,
                                content: format!(
                                    "Convergence {:.3} crossed the {:.3} threshold at turn {}.",
                                    outcome.convergence, self.threshold, turn_number
                                ),
                                label: Some("convergence_notice".to_string()),
                            },
                        )?;
                    }
                    ConvergenceAction::Continue => {}
                }
            }
        }

        Ok(EndedReason::MaxTurns)
    }

    fn emit_setup_prompts(&mut self) -> Result<()> {
        for agent_id in [AgentId::AgentA, AgentId::AgentB] {
            let agent = self.conversation.agent(agent_id);
            let partner = self.conversation.agent(agent_id.partner());
            if let Some(prompt) = prompts::awareness_prompt(
                agent.awareness,
                &agent.display_name,
                &partner.display_name,
            ) {
                self.bus.emit(
                    Some(self.conversation.id),
                    EventPayload::SystemPrompt {
                        agent_id: Some(agent_id),
                        content: prompt,
                        label: Some("awareness".to_string()),
                    },
                )?;
            }
        }

        if self.choose_names {
            // Pushed after the initial prompt so live history and replayed
            // history agree on ordering
            self.conversation
                .messages
                .push(Message::system(prompts::CHOOSE_NAMES_PROMPT));
            self.bus.emit(
                Some(self.conversation.id),
                EventPayload::SystemPrompt {
                    agent_id: None,
                    content: prompts::CHOOSE_NAMES_PROMPT.to_string(),
                    label: None,
                },
            )?;
        }
        Ok(())
    }

    /// Scan both first messages for self-chosen names; each sticks exactly
    /// once and the partner is told through a logged system prompt
    fn extract_names(&mut self, outcome: &TurnOutcome) -> Result<()> {
        let candidates = [
            (AgentId::AgentA, outcome.turn.a_message.content.clone()),
            (AgentId::AgentB, outcome.turn.b_message.content.clone()),
        ];
        for (agent_id, content) in candidates {
            if self.conversation.agent(agent_id).chosen_name.is_some() {
                continue;
            }
            let Some(name) = self.names.extract(&content) else {
                continue;
            };
            self.conversation.agent_mut(agent_id).chosen_name = Some(name.clone());
            self.bus.emit_with_metadata(
                Some(self.conversation.id),
                EventPayload::SystemPrompt {
                    agent_id: Some(agent_id.partner()),
                    content: format!("Your conversation partner goes by {}.", name),
                    label: Some("name_chosen".to_string()),
                },
                Some(serde_json::json!({
                    "agent_id": agent_id.as_str(),
                    "name": name,
                })),
            )?;
        }
        Ok(())
    }
}
