//! Convergence scoring: how close the two agents' recent speech has drifted
//! toward repetition of one another. The score is a weighted average of five
//! structural and lexical components over a balanced window of recent
//! messages, deterministic given the history.

mod components;

use duologue_types::{AgentId, ConvergenceWeights, Message};

use crate::error::{Error, Result};

pub use components::{
    content_similarity, length_similarity, punctuation_similarity, sentence_similarity,
    structure_similarity,
};

/// Window of most-recent messages considered, before balancing per side
const DEFAULT_WINDOW: usize = 10;

/// Above this content similarity the weighting degenerates to content-only
const CONTENT_DOMINANT_THRESHOLD: f64 = 0.9;

/// Score movement below this counts as no movement for trend purposes
const TREND_EPSILON: f64 = 0.02;

/// Direction of the last three convergence scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
    Fluctuating,
}

pub struct ConvergenceCalculator {
    weights: ConvergenceWeights,
    window: usize,
    history: Vec<f64>,
}

impl ConvergenceCalculator {
    /// Construction rejects weight vectors that do not sum to 1.0 ± 0.001
    pub fn new(weights: ConvergenceWeights) -> Result<Self> {
        weights
            .validate()
            .map_err(|err| Error::Invalid(err.to_string()))?;
        Ok(Self {
            weights,
            window: DEFAULT_WINDOW,
            history: Vec::new(),
        })
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(2);
        self
    }

    /// Score the history window. Pure: identical histories give identical
    /// scores regardless of calls in between.
    pub fn calculate(&self, messages: &[Message]) -> f64 {
        let window_start = messages.len().saturating_sub(self.window);
        let recent = &messages[window_start..];

        let a_texts: Vec<&str> = recent
            .iter()
            .filter(|m| m.agent_id.agent() == Some(AgentId::AgentA))
            .map(|m| m.content.as_str())
            .collect();
        let b_texts: Vec<&str> = recent
            .iter()
            .filter(|m| m.agent_id.agent() == Some(AgentId::AgentB))
            .map(|m| m.content.as_str())
            .collect();

        if a_texts.is_empty() || b_texts.is_empty() {
            return 0.0;
        }

        // Balance to equal counts per side, keeping the most recent
        let balanced = a_texts.len().min(b_texts.len());
        let a_texts = &a_texts[a_texts.len() - balanced..];
        let b_texts = &b_texts[b_texts.len() - balanced..];

        let content = content_similarity(
            a_texts.last().unwrap_or(&""),
            b_texts.last().unwrap_or(&""),
        );

        // Near-identical content dominates: the other components only add
        // noise once the agents are parroting each other
        let score = if content > CONTENT_DOMINANT_THRESHOLD {
            0.7 * content + 0.3 * content
        } else {
            self.weights.content * content
                + self.weights.length * length_similarity(a_texts, b_texts)
                + self.weights.sentences * sentence_similarity(a_texts, b_texts)
                + self.weights.structure * structure_similarity(a_texts, b_texts)
                + self.weights.punctuation * punctuation_similarity(a_texts, b_texts)
        };

        score.clamp(0.0, 1.0)
    }

    /// Append a score to the rolling history consulted by [`trend`]
    pub fn track(&mut self, score: f64) {
        self.history.push(score);
    }

    pub fn scores(&self) -> &[f64] {
        &self.history
    }

    /// Direction over the last three tracked scores
    pub fn trend(&self) -> Trend {
        if self.history.len() < 3 {
            return Trend::Stable;
        }
        let window = &self.history[self.history.len() - 3..];
        let d1 = window[1] - window[0];
        let d2 = window[2] - window[1];

        if d1.abs() < TREND_EPSILON && d2.abs() < TREND_EPSILON {
            Trend::Stable
        } else if d1 > 0.0 && d2 > 0.0 {
            Trend::Increasing
        } else if d1 < 0.0 && d2 < 0.0 {
            Trend::Decreasing
        } else {
            Trend::Fluctuating
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duologue_types::AgentId;

    fn calc() -> ConvergenceCalculator {
        ConvergenceCalculator::new(ConvergenceWeights::default()).unwrap()
    }

    fn exchange(pairs: &[(&str, &str)]) -> Vec<Message> {
        let mut messages = Vec::new();
        for (a, b) in pairs {
            messages.push(Message::from_agent(AgentId::AgentA, *a));
            messages.push(Message::from_agent(AgentId::AgentB, *b));
        }
        messages
    }

    #[test]
    fn test_rejects_bad_weights() {
        let weights = ConvergenceWeights {
            content: 0.9,
            length: 0.9,
            sentences: 0.0,
            structure: 0.0,
            punctuation: 0.0,
        };
        assert!(ConvergenceCalculator::new(weights).is_err());
    }

    #[test]
    fn test_score_in_unit_interval() {
        let calc = calc();
        let histories = [
            exchange(&[("hello there", "general greetings")]),
            exchange(&[("", "")]),
            exchange(&[("a b c d e f", "a b c d e f")]),
        ];
        for history in &histories {
            let score = calc.calculate(history);
            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
        }
    }

    #[test]
    fn test_identical_messages_converge_to_one() {
        let calc = calc();
        let history = exchange(&[
            ("the tide comes in", "the tide comes in"),
            ("the tide goes out", "the tide goes out"),
        ]);
        assert_eq!(calc.calculate(&history), 1.0);
    }

    #[test]
    fn test_empty_messages_converge_to_one() {
        // Silent agents: identical (empty) speech is full convergence
        let calc = calc();
        let history = exchange(&[("", ""), ("", "")]);
        assert_eq!(calc.calculate(&history), 1.0);
    }

    #[test]
    fn test_disjoint_vocabulary_scores_low() {
        let calc = calc();
        let history = exchange(&[(
            "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima",
            "one! two! three! four!\n\n- five\n- six\n\nseven? eight?",
        )]);
        assert!(calc.calculate(&history) < 0.4);
    }

    #[test]
    fn test_one_sided_history_scores_zero() {
        let calc = calc();
        let history = vec![Message::from_agent(AgentId::AgentA, "talking to myself")];
        assert_eq!(calc.calculate(&history), 0.0);
    }

    #[test]
    fn test_determinism() {
        let calc = calc();
        let history = exchange(&[("some words here", "other words there")]);
        assert_eq!(calc.calculate(&history), calc.calculate(&history));
    }

    #[test]
    fn test_trend_classification() {
        let mut calc = calc();
        assert_eq!(calc.trend(), Trend::Stable);

        calc.track(0.2);
        calc.track(0.4);
        calc.track(0.6);
        assert_eq!(calc.trend(), Trend::Increasing);

        calc.track(0.5);
        calc.track(0.4);
        assert_eq!(calc.trend(), Trend::Decreasing);

        calc.track(0.41);
        calc.track(0.405);
        assert_eq!(calc.trend(), Trend::Stable);

        calc.track(0.8);
        calc.track(0.2);
        assert_eq!(calc.trend(), Trend::Fluctuating);
    }
}
