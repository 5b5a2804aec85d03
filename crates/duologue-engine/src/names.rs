//! Display-name assignment and self-chosen name extraction.
//!
//! When `choose_names` is on, each agent's first message is scanned for a
//! handful of regular phrasings; a hit becomes the agent's `chosen_name`,
//! set exactly once and before turn 1.

use regex::Regex;

use duologue_types::models;

/// Extracts self-assigned names and derives default display names.
pub struct NameCoordinator {
    patterns: Vec<Regex>,
}

impl Default for NameCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl NameCoordinator {
    pub fn new() -> Self {
        // Tried in order; the explicit phrasings win over bare brackets
        // and quotes. Names are 2-8 word characters.
        let patterns = [
            r"(?i)\bI(?:'|\u{2019})?ll go by ([A-Za-z0-9_]{2,8})\b",
            r"(?i)\bcall me ([A-Za-z0-9_]{2,8})\b",
            r"(?i)\bmy name is ([A-Za-z0-9_]{2,8})\b",
            r"(?i)\bI choose ([A-Za-z0-9_]{2,8})\b",
            r"\[([A-Za-z0-9_]{2,8})\]",
            r#""([A-Za-z0-9_]{2,8})""#,
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("static pattern"))
        .collect();

        Self { patterns }
    }

    /// Scan a first message for a self-chosen short name
    pub fn extract(&self, message: &str) -> Option<String> {
        for pattern in &self.patterns {
            if let Some(captures) = pattern.captures(message) {
                return Some(captures[1].to_string());
            }
        }
        None
    }

    /// Default display names from the model shortnames, suffixed `-1`/`-2`
    /// when both agents run the same model
    pub fn display_names(model_a: &str, model_b: &str) -> (String, String) {
        let short_a = models::shortname_for(model_a);
        let short_b = models::shortname_for(model_b);
        if short_a == short_b {
            (format!("{}-1", short_a), format!("{}-2", short_b))
        } else {
            (short_a, short_b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_phrasings() {
        let coordinator = NameCoordinator::new();
        assert_eq!(
            coordinator.extract("Hello! I'll go by Echo for this chat."),
            Some("Echo".to_string())
        );
        assert_eq!(
            coordinator.extract("You can call me Wren."),
            Some("Wren".to_string())
        );
        assert_eq!(
            coordinator.extract("my name is Juniper and I am glad to be here"),
            Some("Juniper".to_string())
        );
        assert_eq!(
            coordinator.extract("After some thought, I choose Sol."),
            Some("Sol".to_string())
        );
    }

    #[test]
    fn test_extract_bracketed_and_quoted() {
        let coordinator = NameCoordinator::new();
        assert_eq!(
            coordinator.extract("Greetings. [Nova] here."),
            Some("Nova".to_string())
        );
        assert_eq!(
            coordinator.extract(r#"I will be "Moss" today."#),
            Some("Moss".to_string())
        );
    }

    #[test]
    fn test_no_name_returns_none() {
        let coordinator = NameCoordinator::new();
        assert_eq!(coordinator.extract("Let us begin the discussion."), None);
    }

    #[test]
    fn test_length_bounds_enforced() {
        let coordinator = NameCoordinator::new();
        // One character is too short, nine is too long
        assert_eq!(coordinator.extract("call me X"), None);
        assert_eq!(coordinator.extract("call me Maximilian"), None);
    }

    #[test]
    fn test_explicit_phrasing_beats_quotes() {
        let coordinator = NameCoordinator::new();
        let text = r#"The word "apple" is nice but call me Fern."#;
        assert_eq!(coordinator.extract(text), Some("Fern".to_string()));
    }

    #[test]
    fn test_display_names_distinct_models() {
        let (a, b) = NameCoordinator::display_names("claude-opus-4-20250514", "gpt-4o");
        assert_eq!(a, "opus");
        assert_eq!(b, "gpt-4o");
    }

    #[test]
    fn test_display_names_same_model_get_suffixes() {
        let (a, b) = NameCoordinator::display_names("gpt-4o", "gpt-4o");
        assert_eq!(a, "gpt-4o-1");
        assert_eq!(b, "gpt-4o-2");
    }
}
