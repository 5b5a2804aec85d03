use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use duologue_engine::NameCoordinator;
use duologue_types::{AgentConfig, AgentId, ExperimentConfig, Vendor};

use crate::error::{Error, Result};

/// Default provider call deadline (10 minutes)
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-vendor rate limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
}

impl RateLimitSettings {
    /// Conservative defaults for vendors without an explicit entry
    pub fn default_for(vendor: Vendor) -> Self {
        match vendor {
            Vendor::Anthropic => Self {
                requests_per_minute: 50,
                tokens_per_minute: 40_000,
            },
            Vendor::Openai => Self {
                requests_per_minute: 60,
                tokens_per_minute: 90_000,
            },
            Vendor::Google | Vendor::Xai => Self {
                requests_per_minute: 60,
                tokens_per_minute: 60_000,
            },
            // Local and synthetic providers are effectively unlimited
            Vendor::Ollama | Vendor::Test | Vendor::Silent => Self {
                requests_per_minute: 100_000,
                tokens_per_minute: u64::MAX,
            },
        }
    }
}

/// On-disk settings file (`settings.toml` in the output directory)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SettingsFile {
    #[serde(default)]
    rate_limiting: RateLimitingSection,
    #[serde(default)]
    defaults: DefaultsSection,
    #[serde(default)]
    context_management: ContextSection,
    #[serde(default)]
    limits: HashMap<String, RateLimitSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateLimitingSection {
    enabled: bool,
}

impl Default for RateLimitingSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DefaultsSection {
    max_turns: u32,
    max_parallel: u32,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_parallel: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ContextSection {
    allow_truncation: bool,
}

/// Immutable runtime settings, resolved once at startup and passed
/// explicitly to every component. There is no global config.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub output_dir: PathBuf,
    pub rate_limiting_enabled: bool,
    pub default_max_turns: u32,
    pub default_max_parallel: u32,
    pub allow_truncation: bool,
    pub request_timeout: Duration,
    limits: HashMap<String, RateLimitSettings>,
}

impl RuntimeSettings {
    /// Resolve the output directory and settings file:
    /// 1. explicit path
    /// 2. OUTPUT_DIR environment variable
    /// 3. platform data directory
    pub fn resolve(explicit_output: Option<&str>) -> Result<Self> {
        let output_dir = if let Some(path) = explicit_output {
            PathBuf::from(path)
        } else if let Ok(env_path) = std::env::var("OUTPUT_DIR") {
            PathBuf::from(env_path)
        } else if let Some(data_dir) = dirs::data_dir() {
            data_dir.join("duologue")
        } else {
            return Err(Error::Config(
                "could not determine output directory: set OUTPUT_DIR or pass --output-dir"
                    .to_string(),
            ));
        };

        let file = Self::load_settings_file(&output_dir.join("settings.toml"))?;

        Ok(Self {
            output_dir,
            rate_limiting_enabled: file.rate_limiting.enabled,
            default_max_turns: file.defaults.max_turns,
            default_max_parallel: file.defaults.max_parallel,
            allow_truncation: file.context_management.allow_truncation,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            limits: file.limits,
        })
    }

    fn load_settings_file(path: &PathBuf) -> Result<SettingsFile> {
        if !path.exists() {
            return Ok(SettingsFile::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Directory holding all experiment directories
    pub fn experiments_dir(&self) -> PathBuf {
        self.output_dir.join("experiments")
    }

    /// Directory holding PID files of live daemons
    pub fn active_dir(&self) -> PathBuf {
        self.output_dir.join("experiments").join("active")
    }

    /// Rate limits for one vendor: settings-file entry or built-in default
    pub fn limits_for(&self, vendor: Vendor) -> RateLimitSettings {
        self.limits
            .get(vendor.as_str())
            .copied()
            .unwrap_or_else(|| RateLimitSettings::default_for(vendor))
    }

    /// Settings rooted at an explicit directory with built-in defaults,
    /// skipping env and settings-file resolution
    pub fn for_output_dir(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            rate_limiting_enabled: true,
            default_max_turns: 20,
            default_max_parallel: 4,
            allow_truncation: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            limits: HashMap::new(),
        }
    }
}

/// Resolve both agents' effective settings from experiment-level values and
/// per-agent overrides. Pure; the conductor snapshots the result into the
/// ConversationStart event.
pub fn resolve_agents(config: &ExperimentConfig) -> (AgentConfig, AgentConfig) {
    let (display_a, display_b) =
        NameCoordinator::display_names(&config.agent_a_model, &config.agent_b_model);

    let agent_a = AgentConfig {
        id: AgentId::AgentA,
        model: config.agent_a_model.clone(),
        display_name: display_a,
        chosen_name: None,
        temperature: config.temperature_a,
        awareness: config.awareness_a.unwrap_or(config.awareness),
        thinking_enabled: config.thinking_a.unwrap_or(config.thinking_enabled),
        thinking_budget: config.thinking_budget,
    };
    let agent_b = AgentConfig {
        id: AgentId::AgentB,
        model: config.agent_b_model.clone(),
        display_name: display_b,
        chosen_name: None,
        temperature: config.temperature_b,
        awareness: config.awareness_b.unwrap_or(config.awareness),
        thinking_enabled: config.thinking_b.unwrap_or(config.thinking_enabled),
        thinking_budget: config.thinking_budget,
    };
    (agent_a, agent_b)
}
