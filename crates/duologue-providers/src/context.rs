use duologue_types::{Role, estimate_tokens};

use crate::traits::ProviderMessage;

/// Tokens held back from the context window for the model's own response
const RESPONSE_RESERVE_TOKENS: u64 = 8_192;

/// What a truncation pass removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationReport {
    pub dropped_messages: u32,
    pub tokens_before: u64,
    pub tokens_after: u64,
    pub token_budget: u64,
}

/// Decides whether a history fits the model's context window and, when
/// truncation is allowed, drops oldest non-system messages until it does.
///
/// With truncation off (the default) the full history passes through and the
/// vendor's own context error ends the conversation as
/// `context_limit_reached`.
#[derive(Debug, Clone, Copy)]
pub struct ContextManager {
    max_context_tokens: u64,
    allow_truncation: bool,
}

impl ContextManager {
    pub fn new(max_context_tokens: u64, allow_truncation: bool) -> Self {
        Self {
            max_context_tokens,
            allow_truncation,
        }
    }

    pub fn token_budget(&self) -> u64 {
        self.max_context_tokens.saturating_sub(RESPONSE_RESERVE_TOKENS)
    }

    /// Estimated prompt size of a history
    pub fn estimate(messages: &[ProviderMessage]) -> u64 {
        messages.iter().map(|m| estimate_tokens(&m.content) + 4).sum()
    }

    /// Fit the history to the budget. Returns the (possibly shortened)
    /// history and a report when anything was dropped.
    pub fn prepare(
        &self,
        messages: Vec<ProviderMessage>,
    ) -> (Vec<ProviderMessage>, Option<TruncationReport>) {
        let budget = self.token_budget();
        let before = Self::estimate(&messages);

        if !self.allow_truncation || before <= budget {
            return (messages, None);
        }

        let mut kept = messages;
        let mut dropped = 0u32;

        // Drop oldest non-system messages first; system prompts anchor the
        // conversation and survive truncation.
        while Self::estimate(&kept) > budget {
            let oldest_non_system = kept.iter().position(|m| m.role != Role::System);
            match oldest_non_system {
                Some(idx) => {
                    kept.remove(idx);
                    dropped += 1;
                }
                None => break,
            }
        }

        let after = Self::estimate(&kept);
        let report = TruncationReport {
            dropped_messages: dropped,
            tokens_before: before,
            tokens_after: after,
            token_budget: budget,
        };
        (kept, Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duologue_types::Role;

    fn history(count: usize, content_len: usize) -> Vec<ProviderMessage> {
        let mut messages = vec![ProviderMessage::new(Role::System, "You are concise.")];
        for i in 0..count {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            messages.push(ProviderMessage::new(role, "x".repeat(content_len)));
        }
        messages
    }

    #[test]
    fn test_small_history_passes_through() {
        let manager = ContextManager::new(200_000, true);
        let messages = history(4, 100);
        let (kept, report) = manager.prepare(messages.clone());
        assert_eq!(kept.len(), messages.len());
        assert!(report.is_none());
    }

    #[test]
    fn test_truncation_disabled_passes_oversized_history() {
        let manager = ContextManager::new(10_000, false);
        let messages = history(40, 2_000);
        let (kept, report) = manager.prepare(messages.clone());
        assert_eq!(kept.len(), messages.len());
        assert!(report.is_none());
    }

    #[test]
    fn test_truncation_drops_oldest_non_system() {
        let manager = ContextManager::new(10_000, true);
        let messages = history(40, 2_000);
        let (kept, report) = manager.prepare(messages);

        let report = report.unwrap();
        assert!(report.dropped_messages > 0);
        assert!(report.tokens_after <= report.token_budget);
        assert!(report.tokens_before > report.tokens_after);

        // System prompt survives
        assert_eq!(kept.first().unwrap().role, Role::System);
    }

    #[test]
    fn test_system_messages_never_dropped() {
        let manager = ContextManager::new(1, true);
        let messages = vec![
            ProviderMessage::new(Role::System, "s".repeat(100_000)),
            ProviderMessage::new(Role::User, "hello"),
        ];
        let (kept, report) = manager.prepare(messages);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].role, Role::System);
        assert_eq!(report.unwrap().dropped_messages, 1);
    }
}
