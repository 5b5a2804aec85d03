//! Role routing: turn the canonical history into the provider-facing view
//! for one agent. The canonical history records who actually spoke; each
//! provider call needs that projected into its own assistant/user frame.

use duologue_types::{AgentConfig, AgentId, Message, Role, Sender};

/// Produce the provider-facing history for `target`.
///
/// Rules, in order of application:
/// - system messages pass through as system; ones written from agent A's
///   perspective have the two identities swapped when routing to agent B
/// - the target's own messages become `assistant`, the partner's `user`
/// - `human` messages become `user` and pass through untouched
///
/// Ordering is preserved.
pub fn route_history(
    history: &[Message],
    target: AgentId,
    agent_a: &AgentConfig,
    agent_b: &AgentConfig,
) -> Vec<Message> {
    history
        .iter()
        .map(|message| {
            let mut routed = message.clone();
            match message.agent_id {
                Sender::System => {
                    routed.role = Role::System;
                    if target == AgentId::AgentB {
                        routed.content =
                            swap_identities(&message.content, agent_a.name(), agent_b.name());
                    }
                }
                Sender::Human => {
                    routed.role = Role::User;
                }
                Sender::AgentA | Sender::AgentB => {
                    routed.role = if message.agent_id.agent() == Some(target) {
                        Role::Assistant
                    } else {
                        Role::User
                    };
                }
            }
            routed
        })
        .collect()
}

/// Swap the two identity markers so the reader's own name appears where the
/// author's did. System prompts are written from agent A's perspective;
/// routing to agent B mirrors them. Prompts naming only one side (or
/// neither, like the choose-names broadcast) pass through unchanged.
fn swap_identities(content: &str, a_name: &str, b_name: &str) -> String {
    if a_name == b_name || !content.contains(a_name) || !content.contains(b_name) {
        return content.to_string();
    }
    const PLACEHOLDER: &str = "\u{0}";
    // Replace the longer name first in case one is a prefix of the other
    if b_name.len() > a_name.len() {
        content
            .replace(b_name, PLACEHOLDER)
            .replace(a_name, b_name)
            .replace(PLACEHOLDER, a_name)
    } else {
        content
            .replace(a_name, PLACEHOLDER)
            .replace(b_name, a_name)
            .replace(PLACEHOLDER, b_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: AgentId, model: &str, display: &str) -> AgentConfig {
        AgentConfig {
            id,
            model: model.to_string(),
            display_name: display.to_string(),
            chosen_name: None,
            temperature: None,
            awareness: Default::default(),
            thinking_enabled: false,
            thinking_budget: None,
        }
    }

    fn agents() -> (AgentConfig, AgentConfig) {
        (
            agent(AgentId::AgentA, "claude-sonnet-4-20250514", "sonnet"),
            agent(AgentId::AgentB, "gpt-4o", "gpt-4o"),
        )
    }

    #[test]
    fn test_own_messages_become_assistant() {
        let (a, b) = agents();
        let history = vec![
            Message::from_agent(AgentId::AgentA, "from a"),
            Message::from_agent(AgentId::AgentB, "from b"),
        ];

        let for_a = route_history(&history, AgentId::AgentA, &a, &b);
        assert_eq!(for_a[0].role, Role::Assistant);
        assert_eq!(for_a[1].role, Role::User);

        let for_b = route_history(&history, AgentId::AgentB, &a, &b);
        assert_eq!(for_b[0].role, Role::User);
        assert_eq!(for_b[1].role, Role::Assistant);
    }

    #[test]
    fn test_human_messages_are_user_for_both() {
        let (a, b) = agents();
        let history = vec![Message::human("initial prompt")];
        for target in [AgentId::AgentA, AgentId::AgentB] {
            let routed = route_history(&history, target, &a, &b);
            assert_eq!(routed[0].role, Role::User);
            assert_eq!(routed[0].content, "initial prompt");
        }
    }

    #[test]
    fn test_system_identity_swap_for_agent_b() {
        let (a, b) = agents();
        let history = vec![Message::system(
            "You are sonnet, in conversation with gpt-4o.",
        )];

        let for_a = route_history(&history, AgentId::AgentA, &a, &b);
        assert_eq!(for_a[0].content, "You are sonnet, in conversation with gpt-4o.");

        let for_b = route_history(&history, AgentId::AgentB, &a, &b);
        assert_eq!(for_b[0].content, "You are gpt-4o, in conversation with sonnet.");
    }

    #[test]
    fn test_prompt_naming_neither_side_passes_through() {
        let (a, b) = agents();
        let history = vec![Message::system("Please choose a short name for yourself.")];
        let routed = route_history(&history, AgentId::AgentB, &a, &b);
        assert_eq!(routed[0].content, "Please choose a short name for yourself.");
    }

    #[test]
    fn test_disambiguated_names_still_swap() {
        let a = agent(AgentId::AgentA, "gpt-4o", "gpt-4o-1");
        let b = agent(AgentId::AgentB, "gpt-4o", "gpt-4o-2");
        let history = vec![Message::system(
            "You are gpt-4o-1, in conversation with gpt-4o-2.",
        )];
        let routed = route_history(&history, AgentId::AgentB, &a, &b);
        assert_eq!(
            routed[0].content,
            "You are gpt-4o-2, in conversation with gpt-4o-1."
        );
    }

    #[test]
    fn test_ordering_preserved() {
        let (a, b) = agents();
        let history = vec![
            Message::system("sys"),
            Message::human("go"),
            Message::from_agent(AgentId::AgentA, "one"),
            Message::from_agent(AgentId::AgentB, "two"),
            Message::from_agent(AgentId::AgentA, "three"),
        ];
        let routed = route_history(&history, AgentId::AgentA, &a, &b);
        let contents: Vec<&str> = routed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "go", "one", "two", "three"]);
    }
}
