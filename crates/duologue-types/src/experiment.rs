use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentId, AwarenessLevel};
use crate::error::{Error, Result};
use crate::message::Message;

/// What to do when convergence crosses the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceAction {
    #[default]
    Stop,
    Continue,
    Notify,
}

/// Component weights for the convergence score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceWeights {
    pub content: f64,
    pub length: f64,
    pub sentences: f64,
    pub structure: f64,
    pub punctuation: f64,
}

impl ConvergenceWeights {
    pub fn sum(&self) -> f64 {
        self.content + self.length + self.sentences + self.structure + self.punctuation
    }

    /// Reject weight vectors that do not sum to 1.0 within 0.001
    pub fn validate(&self) -> Result<()> {
        let sum = self.sum();
        if (sum - 1.0).abs() > 0.001 {
            return Err(Error::Validation(format!(
                "convergence weights must sum to 1.0, got {:.4}",
                sum
            )));
        }
        Ok(())
    }
}

impl Default for ConvergenceWeights {
    fn default() -> Self {
        Self {
            content: 0.40,
            length: 0.15,
            sentences: 0.20,
            structure: 0.15,
            punctuation: 0.10,
        }
    }
}

/// Named weight vectors; `custom` consults `custom_weights`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceProfile {
    #[default]
    Balanced,
    Structural,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceSettings {
    #[serde(default)]
    pub profile: ConvergenceProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_weights: Option<ConvergenceWeights>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub action: ConvergenceAction,
}

fn default_threshold() -> f64 {
    0.85
}

impl Default for ConvergenceSettings {
    fn default() -> Self {
        Self {
            profile: ConvergenceProfile::Balanced,
            custom_weights: None,
            threshold: default_threshold(),
            action: ConvergenceAction::Stop,
        }
    }
}

/// Validated experiment description, handed over by the external
/// experiment-file parser.
///
/// One experiment is `repetitions` independent conversations between the same
/// pair of models under the same settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub agent_a_model: String,
    pub agent_b_model: String,
    pub repetitions: u32,
    pub max_turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_a: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_b: Option<f32>,
    #[serde(default)]
    pub awareness: AwarenessLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awareness_a: Option<AwarenessLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awareness_b: Option<AwarenessLevel>,
    #[serde(default)]
    pub convergence: ConvergenceSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<u32>,
    #[serde(default)]
    pub choose_names: bool,
    #[serde(default)]
    pub thinking_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_a: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_b: Option<bool>,
    #[serde(default = "default_first_speaker")]
    pub first_speaker: AgentId,
    #[serde(default)]
    pub allow_truncation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_from: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_turn: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch_messages: Vec<Message>,
}

fn default_first_speaker() -> AgentId {
    AgentId::AgentA
}

impl ExperimentConfig {
    /// Checks the external parser's contract before any conversation starts.
    ///
    /// `max_turns == 0` stays legal: such a conversation ends immediately
    /// with `ended_reason = "max_turns"` and no turn events.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("experiment name is empty".to_string()));
        }
        if self.repetitions < 1 {
            return Err(Error::Validation(
                "repetitions must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.convergence.threshold) {
            return Err(Error::Validation(format!(
                "convergence threshold must be in [0, 1], got {}",
                self.convergence.threshold
            )));
        }
        if let Some(parallel) = self.max_parallel
            && parallel < 1
        {
            return Err(Error::Validation(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.convergence.profile == ConvergenceProfile::Custom {
            match &self.convergence.custom_weights {
                Some(weights) => weights.validate()?,
                None => {
                    return Err(Error::Validation(
                        "custom convergence profile requires custom_weights".to_string(),
                    ));
                }
            }
        }
        if self.branch_from.is_some() && self.branch_turn.is_none() {
            return Err(Error::Validation(
                "branch_from requires branch_turn".to_string(),
            ));
        }
        Ok(())
    }

    /// The weight vector selected by the profile
    pub fn convergence_weights(&self) -> ConvergenceWeights {
        match self.convergence.profile {
            ConvergenceProfile::Balanced => ConvergenceWeights::default(),
            ConvergenceProfile::Structural => ConvergenceWeights {
                content: 0.20,
                length: 0.20,
                sentences: 0.20,
                structure: 0.25,
                punctuation: 0.15,
            },
            ConvergenceProfile::Custom => self
                .convergence
                .custom_weights
                .unwrap_or_default(),
        }
    }
}

/// Lifecycle states of a batch of conversations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Created,
    Running,
    Completed,
    Failed,
    Interrupted,
}

/// Runtime record of one experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,
    pub config: ExperimentConfig,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExperimentStatus,
    pub total_conversations: u32,
    pub completed_conversations: u32,
    pub failed_conversations: u32,
}

/// On-disk `manifest.json`. Single writer (the scheduler), rewritten
/// atomically so readers never observe torn state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub experiment_id: Uuid,
    pub name: String,
    pub status: ExperimentStatus,
    pub total_conversations: u32,
    pub completed_conversations: u32,
    pub failed_conversations: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub config: ExperimentConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> ExperimentConfig {
        ExperimentConfig {
            name: "baseline".to_string(),
            agent_a_model: "test".to_string(),
            agent_b_model: "test".to_string(),
            repetitions: 1,
            max_turns: 5,
            initial_prompt: None,
            temperature_a: None,
            temperature_b: None,
            awareness: AwarenessLevel::Basic,
            awareness_a: None,
            awareness_b: None,
            convergence: ConvergenceSettings::default(),
            max_parallel: None,
            choose_names: false,
            thinking_enabled: false,
            thinking_budget: None,
            thinking_a: None,
            thinking_b: None,
            first_speaker: AgentId::AgentA,
            allow_truncation: false,
            branch_from: None,
            branch_turn: None,
            branch_messages: Vec::new(),
        }
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        ConvergenceWeights::default().validate().unwrap();
    }

    #[test]
    fn test_bad_weights_rejected() {
        let weights = ConvergenceWeights {
            content: 0.5,
            length: 0.5,
            sentences: 0.5,
            structure: 0.0,
            punctuation: 0.0,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_minimal_config_validates() {
        minimal_config().validate().unwrap();
    }

    #[test]
    fn test_zero_repetitions_rejected() {
        let mut config = minimal_config();
        config.repetitions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_turns_is_legal() {
        let mut config = minimal_config();
        config.max_turns = 0;
        config.validate().unwrap();
    }

    #[test]
    fn test_custom_profile_requires_weights() {
        let mut config = minimal_config();
        config.convergence.profile = ConvergenceProfile::Custom;
        assert!(config.validate().is_err());

        config.convergence.custom_weights = Some(ConvergenceWeights::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_structural_profile_weights_sum_to_one() {
        let mut config = minimal_config();
        config.convergence.profile = ConvergenceProfile::Structural;
        config.convergence_weights().validate().unwrap();
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = minimal_config();
        let json = serde_json::to_string(&config).unwrap();
        let back: ExperimentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "baseline");
        assert_eq!(back.first_speaker, AgentId::AgentA);
        assert_eq!(back.convergence.threshold, 0.85);
    }
}
