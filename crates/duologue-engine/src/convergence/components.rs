//! Component similarity functions for the convergence score. Each returns a
//! value in [0, 1] and treats "both sides empty" as perfectly similar, so a
//! pair of silent agents converges to 1.0.

use std::collections::HashSet;

/// Messages with at most this many words compare by Jaccard instead of
/// containment; containment saturates too easily on tiny word sets
const SHORT_MESSAGE_WORDS: usize = 10;

/// Punctuation classes whose per-character density feeds the punctuation
/// component
const TRACKED_PUNCTUATION: [char; 6] = ['!', ',', ';', ':', '-', '\u{2014}'];

/// min/max ratio with the both-zero case defined as identical
fn ratio(a: f64, b: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 1.0;
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    if hi == 0.0 { 1.0 } else { lo / hi }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn words(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Similarity of the two most-recent messages, one per side.
///
/// Byte-identical after case folding and whitespace trimming scores 1.0;
/// otherwise short messages use word-level Jaccard and longer ones use
/// containment (overlap over the smaller vocabulary).
pub fn content_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);
    if norm_a == norm_b {
        return 1.0;
    }

    let words_a = words(a);
    let words_b = words(b);
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = words_a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = words_b.iter().map(String::as_str).collect();
    let overlap = set_a.intersection(&set_b).count() as f64;

    if words_a.len() <= SHORT_MESSAGE_WORDS || words_b.len() <= SHORT_MESSAGE_WORDS {
        let union = set_a.union(&set_b).count() as f64;
        overlap / union
    } else {
        overlap / set_a.len().min(set_b.len()) as f64
    }
}

/// min/max of average message character lengths per side
pub fn length_similarity(a_messages: &[&str], b_messages: &[&str]) -> f64 {
    let avg = |messages: &[&str]| {
        if messages.is_empty() {
            0.0
        } else {
            messages.iter().map(|m| m.chars().count()).sum::<usize>() as f64
                / messages.len() as f64
        }
    };
    ratio(avg(a_messages), avg(b_messages))
}

fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
}

/// min/max of average sentence counts per side
pub fn sentence_similarity(a_messages: &[&str], b_messages: &[&str]) -> f64 {
    let avg = |messages: &[&str]| {
        if messages.is_empty() {
            0.0
        } else {
            messages.iter().map(|m| sentence_count(m)).sum::<usize>() as f64
                / messages.len() as f64
        }
    };
    ratio(avg(a_messages), avg(b_messages))
}

struct StructureFeatures {
    paragraphs: f64,
    list_items: f64,
    questions: f64,
    code_blocks: f64,
}

fn structure_features(messages: &[&str]) -> StructureFeatures {
    if messages.is_empty() {
        return StructureFeatures {
            paragraphs: 0.0,
            list_items: 0.0,
            questions: 0.0,
            code_blocks: 0.0,
        };
    }
    let count = messages.len() as f64;
    let mut paragraphs = 0usize;
    let mut list_items = 0usize;
    let mut questions = 0usize;
    let mut code_blocks = 0usize;

    for message in messages {
        paragraphs += message
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .count();
        list_items += message
            .lines()
            .filter(|line| {
                let trimmed = line.trim_start();
                trimmed.starts_with("- ")
                    || trimmed.starts_with("* ")
                    || trimmed
                        .split_once(". ")
                        .is_some_and(|(head, _)| head.chars().all(|c| c.is_ascii_digit()) && !head.is_empty())
            })
            .count();
        questions += message.matches('?').count();
        code_blocks += message.matches("```").count() / 2;
    }

    StructureFeatures {
        paragraphs: paragraphs as f64 / count,
        list_items: list_items as f64 / count,
        questions: questions as f64 / count,
        code_blocks: code_blocks as f64 / count,
    }
}

/// Feature-wise min/max similarity over paragraph count, list items,
/// question marks, and fenced code blocks
pub fn structure_similarity(a_messages: &[&str], b_messages: &[&str]) -> f64 {
    let a = structure_features(a_messages);
    let b = structure_features(b_messages);
    (ratio(a.paragraphs, b.paragraphs)
        + ratio(a.list_items, b.list_items)
        + ratio(a.questions, b.questions)
        + ratio(a.code_blocks, b.code_blocks))
        / 4.0
}

fn punctuation_density(messages: &[&str], mark: char) -> f64 {
    let total_chars: usize = messages.iter().map(|m| m.chars().count()).sum();
    if total_chars == 0 {
        return 0.0;
    }
    let marks: usize = messages
        .iter()
        .map(|m| m.chars().filter(|&c| c == mark).count())
        .sum();
    marks as f64 / total_chars as f64
}

/// Per-character density similarity for the tracked punctuation classes
pub fn punctuation_similarity(a_messages: &[&str], b_messages: &[&str]) -> f64 {
    let sum: f64 = TRACKED_PUNCTUATION
        .iter()
        .map(|&mark| {
            ratio(
                punctuation_density(a_messages, mark),
                punctuation_density(b_messages, mark),
            )
        })
        .sum();
    sum / TRACKED_PUNCTUATION.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_both_zero_is_identical() {
        assert_eq!(ratio(0.0, 0.0), 1.0);
        assert_eq!(ratio(2.0, 4.0), 0.5);
        assert_eq!(ratio(4.0, 2.0), 0.5);
    }

    #[test]
    fn test_identical_content_after_folding() {
        assert_eq!(content_similarity("Hello   World", "hello world"), 1.0);
        assert_eq!(content_similarity("", ""), 1.0);
    }

    #[test]
    fn test_disjoint_content_scores_zero() {
        assert_eq!(content_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn test_partial_overlap_between_zero_and_one() {
        let sim = content_similarity("the cat sat", "the cat ran");
        assert!(sim > 0.0 && sim < 1.0);
    }

    #[test]
    fn test_length_similarity_equal_sides() {
        assert_eq!(length_similarity(&["aaaa"], &["bbbb"]), 1.0);
        assert_eq!(length_similarity(&["aaaa"], &["bb"]), 0.5);
    }

    #[test]
    fn test_sentence_similarity() {
        assert_eq!(
            sentence_similarity(&["One. Two."], &["Eins. Zwei."]),
            1.0
        );
        assert_eq!(sentence_similarity(&["One. Two."], &["Eins."]), 0.5);
    }

    #[test]
    fn test_structure_similarity_matching_shapes() {
        let a = ["First.\n\n- one\n- two\n\nAny questions?"];
        let b = ["Start.\n\n- x\n- y\n\nReally?"];
        assert!(structure_similarity(&a, &b) > 0.99);
    }

    #[test]
    fn test_punctuation_similarity_no_punctuation() {
        assert_eq!(punctuation_similarity(&["plain words"], &["more words"]), 1.0);
    }

    #[test]
    fn test_punctuation_similarity_diverging_exclamations() {
        let sim = punctuation_similarity(&["wow!!! amazing!!!"], &["calm and steady"]);
        assert!(sim < 1.0);
    }
}
