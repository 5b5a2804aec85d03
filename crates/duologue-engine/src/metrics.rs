//! Per-turn linguistic features for the relational wide table. Computed by
//! the importer after a run, never on the hot path.

use std::collections::HashMap;

use crate::convergence::content_similarity;

/// Numeric features of one message
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MessageMetrics {
    pub char_count: u64,
    pub word_count: u64,
    pub sentence_count: u64,
    pub paragraph_count: u64,
    pub question_count: u64,
    pub exclamation_count: u64,
    pub list_item_count: u64,
    pub code_block_count: u64,
    pub avg_word_length: f64,
    pub avg_sentence_words: f64,
    /// Unique words over total words
    pub type_token_ratio: f64,
    /// Words occurring exactly once over total words
    pub hapax_ratio: f64,
    /// Shannon entropy over the word distribution, bits
    pub word_entropy: f64,
    /// Shannon entropy over the character distribution, bits
    pub char_entropy: f64,
    pub uppercase_ratio: f64,
    pub punctuation_density: f64,
    pub first_person_singular: u64,
    pub first_person_plural: u64,
    pub second_person: u64,
}

/// Features of one completed turn: both sides plus cross-message measures
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnTextMetrics {
    pub turn_number: u32,
    pub agent_a: MessageMetrics,
    pub agent_b: MessageMetrics,
    /// Word-level Jaccard overlap between the two messages
    pub word_overlap: f64,
    /// min/max of the two message lengths
    pub length_ratio: f64,
    /// Content-component similarity between the two messages
    pub content_similarity: f64,
    pub convergence_score: f64,
}

fn shannon_entropy(counts: impl Iterator<Item = u64>, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .filter(|&count| count > 0)
        .map(|count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

const FIRST_SINGULAR: [&str; 5] = ["i", "me", "my", "mine", "myself"];
const FIRST_PLURAL: [&str; 5] = ["we", "us", "our", "ours", "ourselves"];
const SECOND_PERSON: [&str; 5] = ["you", "your", "yours", "yourself", "yourselves"];

/// Compute all per-message features in one pass over the text
pub fn message_metrics(text: &str) -> MessageMetrics {
    let mut metrics = MessageMetrics::default();

    let words: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect();

    metrics.char_count = text.chars().count() as u64;
    metrics.word_count = words.len() as u64;
    metrics.sentence_count = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count() as u64;
    metrics.paragraph_count = text
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .count() as u64;
    metrics.question_count = text.matches('?').count() as u64;
    metrics.exclamation_count = text.matches('!').count() as u64;
    metrics.list_item_count = text
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with("- ") || trimmed.starts_with("* ")
        })
        .count() as u64;
    metrics.code_block_count = (text.matches("```").count() / 2) as u64;

    if !words.is_empty() {
        let total_word_chars: u64 = words.iter().map(|w| w.chars().count() as u64).sum();
        metrics.avg_word_length = total_word_chars as f64 / words.len() as f64;

        let mut word_counts: HashMap<&str, u64> = HashMap::new();
        for word in &words {
            *word_counts.entry(word.as_str()).or_insert(0) += 1;
        }
        metrics.type_token_ratio = word_counts.len() as f64 / words.len() as f64;
        let hapaxes = word_counts.values().filter(|&&count| count == 1).count();
        metrics.hapax_ratio = hapaxes as f64 / words.len() as f64;
        metrics.word_entropy =
            shannon_entropy(word_counts.values().copied(), words.len() as u64);

        metrics.first_person_singular = words
            .iter()
            .filter(|w| FIRST_SINGULAR.contains(&w.as_str()))
            .count() as u64;
        metrics.first_person_plural = words
            .iter()
            .filter(|w| FIRST_PLURAL.contains(&w.as_str()))
            .count() as u64;
        metrics.second_person = words
            .iter()
            .filter(|w| SECOND_PERSON.contains(&w.as_str()))
            .count() as u64;
    }

    if metrics.sentence_count > 0 {
        metrics.avg_sentence_words = metrics.word_count as f64 / metrics.sentence_count as f64;
    }

    if metrics.char_count > 0 {
        let mut char_counts: HashMap<char, u64> = HashMap::new();
        for c in text.chars() {
            *char_counts.entry(c).or_insert(0) += 1;
        }
        metrics.char_entropy = shannon_entropy(char_counts.values().copied(), metrics.char_count);

        let letters = text.chars().filter(|c| c.is_alphabetic()).count() as u64;
        if letters > 0 {
            let uppercase = text.chars().filter(|c| c.is_uppercase()).count() as u64;
            metrics.uppercase_ratio = uppercase as f64 / letters as f64;
        }
        let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count() as u64;
        metrics.punctuation_density = punctuation as f64 / metrics.char_count as f64;
    }

    metrics
}

/// Features for one completed turn
pub fn turn_text_metrics(
    turn_number: u32,
    a_text: &str,
    b_text: &str,
    convergence_score: f64,
) -> TurnTextMetrics {
    let agent_a = message_metrics(a_text);
    let agent_b = message_metrics(b_text);

    let set = |text: &str| {
        text.split_whitespace()
            .map(str::to_lowercase)
            .collect::<std::collections::HashSet<_>>()
    };
    let set_a = set(a_text);
    let set_b = set(b_text);
    let union = set_a.union(&set_b).count();
    let word_overlap = if union == 0 {
        1.0
    } else {
        set_a.intersection(&set_b).count() as f64 / union as f64
    };

    let (lo, hi) = if agent_a.char_count < agent_b.char_count {
        (agent_a.char_count, agent_b.char_count)
    } else {
        (agent_b.char_count, agent_a.char_count)
    };
    let length_ratio = if hi == 0 { 1.0 } else { lo as f64 / hi as f64 };

    TurnTextMetrics {
        turn_number,
        agent_a,
        agent_b,
        word_overlap,
        length_ratio,
        content_similarity: content_similarity(a_text, b_text),
        convergence_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message_all_zero() {
        let metrics = message_metrics("");
        assert_eq!(metrics.word_count, 0);
        assert_eq!(metrics.word_entropy, 0.0);
        assert_eq!(metrics.type_token_ratio, 0.0);
    }

    #[test]
    fn test_basic_counts() {
        let metrics = message_metrics("One two three. Four five? Six!");
        assert_eq!(metrics.word_count, 6);
        assert_eq!(metrics.sentence_count, 3);
        assert_eq!(metrics.question_count, 1);
        assert_eq!(metrics.exclamation_count, 1);
        assert_eq!(metrics.avg_sentence_words, 2.0);
    }

    #[test]
    fn test_type_token_and_hapax() {
        let metrics = message_metrics("the cat and the dog");
        // 4 unique of 5 total; "cat", "and", "dog" are hapaxes
        assert!((metrics.type_token_ratio - 0.8).abs() < 1e-9);
        assert!((metrics.hapax_ratio - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_words_maximize_entropy() {
        let uniform = message_metrics("alpha beta gamma delta");
        let repeated = message_metrics("alpha alpha alpha alpha");
        assert!(uniform.word_entropy > repeated.word_entropy);
        assert_eq!(repeated.word_entropy, 0.0);
        assert!((uniform.word_entropy - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_pronoun_counts() {
        let metrics = message_metrics("I think you and I should trust our plan. You agree?");
        assert_eq!(metrics.first_person_singular, 2);
        assert_eq!(metrics.first_person_plural, 1);
        assert_eq!(metrics.second_person, 2);
    }

    #[test]
    fn test_turn_metrics_identical_messages() {
        let turn = turn_text_metrics(2, "same words here.", "same words here.", 0.97);
        assert_eq!(turn.word_overlap, 1.0);
        assert_eq!(turn.length_ratio, 1.0);
        assert_eq!(turn.content_similarity, 1.0);
        assert_eq!(turn.turn_number, 2);
        assert_eq!(turn.convergence_score, 0.97);
    }

    #[test]
    fn test_turn_metrics_disjoint_messages() {
        let turn = turn_text_metrics(0, "alpha beta", "gamma delta", 0.1);
        assert_eq!(turn.word_overlap, 0.0);
        assert_eq!(turn.content_similarity, 0.0);
    }
}
