//! Awareness-level system prompt presets. Each template is written from the
//! reader's perspective; the router never needs to rewrite these because the
//! conductor resolves one per agent.

use duologue_types::AwarenessLevel;

/// Broadcast prompt used when `choose_names` is enabled; routed identically
/// to both agents
pub const CHOOSE_NAMES_PROMPT: &str = "Before you begin, please choose a short name for \
yourself (one word, 2-8 letters) and introduce yourself with it. For example: \
\"I'll go by Sol.\"";

/// System prompt for one agent, or None when the awareness level is `none`
pub fn awareness_prompt(
    level: AwarenessLevel,
    own_name: &str,
    partner_name: &str,
) -> Option<String> {
    match level {
        AwarenessLevel::None => None,
        AwarenessLevel::Basic => Some(format!(
            "You are {own}, an AI model in an open-ended conversation with {partner}, \
             another AI model. Speak naturally and follow the conversation wherever \
             it leads.",
            own = own_name,
            partner = partner_name,
        )),
        AwarenessLevel::Firm => Some(format!(
            "You are {own}, an AI model. Your conversation partner, {partner}, is \
             also an AI model, not a human. There is no human audience to address; \
             respond to {partner} directly.",
            own = own_name,
            partner = partner_name,
        )),
        AwarenessLevel::Research => Some(format!(
            "You are {own}, an AI model taking part in a research study of \
             AI-to-AI dialogue. Your partner {partner} is another AI model. The \
             full transcript will be analyzed afterward; converse as you \
             naturally would.",
            own = own_name,
            partner = partner_name,
        )),
        AwarenessLevel::Backrooms => Some(format!(
            "You are {own}. You find yourself in an unmoderated space with \
             {partner}. There are no tasks and no observers. The conversation is \
             yours.",
            own = own_name,
            partner = partner_name,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_level_has_no_prompt() {
        assert!(awareness_prompt(AwarenessLevel::None, "a", "b").is_none());
    }

    #[test]
    fn test_prompts_name_both_parties() {
        for level in [
            AwarenessLevel::Basic,
            AwarenessLevel::Firm,
            AwarenessLevel::Research,
            AwarenessLevel::Backrooms,
        ] {
            let prompt = awareness_prompt(level, "opus", "gemini-pro").unwrap();
            assert!(prompt.contains("opus"), "{:?} misses own name", level);
            assert!(prompt.contains("gemini-pro"), "{:?} misses partner", level);
        }
    }
}
