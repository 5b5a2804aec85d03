use serde::{Deserialize, Serialize};
use std::fmt;

/// LLM vendor behind a model id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    Anthropic,
    Openai,
    Google,
    Xai,
    Ollama,
    Test,
    Silent,
}

impl Vendor {
    pub fn as_str(self) -> &'static str {
        match self {
            Vendor::Anthropic => "anthropic",
            Vendor::Openai => "openai",
            Vendor::Google => "google",
            Vendor::Xai => "xai",
            Vendor::Ollama => "ollama",
            Vendor::Test => "test",
            Vendor::Silent => "silent",
        }
    }

    /// Environment variable holding the vendor's API key, when one is needed
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Vendor::Anthropic => Some("ANTHROPIC_API_KEY"),
            Vendor::Openai => Some("OPENAI_API_KEY"),
            Vendor::Google => Some("GOOGLE_API_KEY"),
            Vendor::Xai => Some("XAI_API_KEY"),
            Vendor::Ollama | Vendor::Test | Vendor::Silent => None,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a known model
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub id: &'static str,
    pub shortname: &'static str,
    pub vendor: Vendor,
    pub context_window: u64,
    pub supports_thinking: bool,
}

/// Context window assumed for models the catalog does not know
pub const DEFAULT_CONTEXT_WINDOW: u64 = 128_000;

const CATALOG: &[ModelSpec] = &[
    ModelSpec {
        id: "claude-opus-4-20250514",
        shortname: "opus",
        vendor: Vendor::Anthropic,
        context_window: 200_000,
        supports_thinking: true,
    },
    ModelSpec {
        id: "claude-sonnet-4-20250514",
        shortname: "sonnet",
        vendor: Vendor::Anthropic,
        context_window: 200_000,
        supports_thinking: true,
    },
    ModelSpec {
        id: "claude-3-5-haiku-20241022",
        shortname: "haiku",
        vendor: Vendor::Anthropic,
        context_window: 200_000,
        supports_thinking: false,
    },
    ModelSpec {
        id: "gpt-4o",
        shortname: "gpt-4o",
        vendor: Vendor::Openai,
        context_window: 128_000,
        supports_thinking: false,
    },
    ModelSpec {
        id: "gpt-4o-mini",
        shortname: "gpt-4o-mini",
        vendor: Vendor::Openai,
        context_window: 128_000,
        supports_thinking: false,
    },
    ModelSpec {
        id: "o4-mini",
        shortname: "o4-mini",
        vendor: Vendor::Openai,
        context_window: 200_000,
        supports_thinking: true,
    },
    ModelSpec {
        id: "gemini-2.5-pro",
        shortname: "gemini-pro",
        vendor: Vendor::Google,
        context_window: 1_000_000,
        supports_thinking: true,
    },
    ModelSpec {
        id: "gemini-2.5-flash",
        shortname: "gemini-flash",
        vendor: Vendor::Google,
        context_window: 1_000_000,
        supports_thinking: true,
    },
    ModelSpec {
        id: "grok-3",
        shortname: "grok",
        vendor: Vendor::Xai,
        context_window: 131_072,
        supports_thinking: false,
    },
    ModelSpec {
        id: "test",
        shortname: "test",
        vendor: Vendor::Test,
        context_window: 1_000_000,
        supports_thinking: false,
    },
    ModelSpec {
        id: "silent",
        shortname: "silent",
        vendor: Vendor::Silent,
        context_window: 1_000_000,
        supports_thinking: false,
    },
];

/// Catalog lookup by exact model id
pub fn lookup(model: &str) -> Option<&'static ModelSpec> {
    CATALOG.iter().find(|spec| spec.id == model)
}

/// Vendor for a model id. Falls back to prefix heuristics for models the
/// catalog does not list; anything unrecognized is assumed to be a local
/// ollama model.
pub fn vendor_for(model: &str) -> Vendor {
    if let Some(spec) = lookup(model) {
        return spec.vendor;
    }
    let lower = model.to_ascii_lowercase();
    if lower.starts_with("claude") {
        Vendor::Anthropic
    } else if lower.starts_with("gpt") || lower.starts_with("o1") || lower.starts_with("o3") || lower.starts_with("o4") {
        Vendor::Openai
    } else if lower.starts_with("gemini") {
        Vendor::Google
    } else if lower.starts_with("grok") {
        Vendor::Xai
    } else if lower == "silent" {
        Vendor::Silent
    } else if lower == "test" || lower.starts_with("test:") {
        Vendor::Test
    } else {
        Vendor::Ollama
    }
}

/// Context window for a model, conservative default when unknown
pub fn context_window_for(model: &str) -> u64 {
    lookup(model)
        .map(|spec| spec.context_window)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

/// Display shortname for a model id. Unknown models keep their id minus any
/// trailing date stamp.
pub fn shortname_for(model: &str) -> String {
    if let Some(spec) = lookup(model) {
        return spec.shortname.to_string();
    }
    let trimmed = model
        .rsplit_once('-')
        .filter(|(_, tail)| tail.len() == 8 && tail.chars().all(|c| c.is_ascii_digit()))
        .map(|(head, _)| head)
        .unwrap_or(model);
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        let spec = lookup("claude-sonnet-4-20250514").unwrap();
        assert_eq!(spec.vendor, Vendor::Anthropic);
        assert_eq!(spec.shortname, "sonnet");
    }

    #[test]
    fn test_vendor_prefix_heuristics() {
        assert_eq!(vendor_for("claude-9-experimental"), Vendor::Anthropic);
        assert_eq!(vendor_for("gpt-5"), Vendor::Openai);
        assert_eq!(vendor_for("gemini-3.0-ultra"), Vendor::Google);
        assert_eq!(vendor_for("grok-4"), Vendor::Xai);
        assert_eq!(vendor_for("llama3.2"), Vendor::Ollama);
        assert_eq!(vendor_for("test:parrot"), Vendor::Test);
        assert_eq!(vendor_for("silent"), Vendor::Silent);
    }

    #[test]
    fn test_unknown_model_gets_default_window() {
        assert_eq!(context_window_for("mystery-model"), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn test_shortname_strips_date_stamp() {
        assert_eq!(shortname_for("claude-opus-4-20250514"), "opus");
        assert_eq!(shortname_for("something-new-20250101"), "something-new");
        assert_eq!(shortname_for("llama3.2"), "llama3.2");
    }

    #[test]
    fn test_key_env_only_for_remote_vendors() {
        assert!(Vendor::Anthropic.api_key_env().is_some());
        assert!(Vendor::Ollama.api_key_env().is_none());
        assert!(Vendor::Silent.api_key_env().is_none());
    }
}
