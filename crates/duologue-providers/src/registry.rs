//! Model-to-provider resolution and API-key preflight.
//!
//! Missing keys for a requested vendor are a fatal startup error; the check
//! runs before any conversation begins so experiments never half-start.

use std::sync::Arc;

use duologue_types::{Vendor, models};

use crate::anthropic::AnthropicProvider;
use crate::error::{Error, Result};
use crate::google::GoogleProvider;
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::silent::SilentProvider;
use crate::test_provider::TestProvider;
use crate::traits::Provider;

fn api_key_for(vendor: Vendor) -> Result<String> {
    let Some(env_var) = vendor.api_key_env() else {
        return Err(Error::Config(format!("{} does not use an API key", vendor)));
    };
    std::env::var(env_var).map_err(|_| {
        Error::Config(format!(
            "missing API key: set {} to use {} models",
            env_var, vendor
        ))
    })
}

/// Construct the provider for a model id, resolving the vendor by catalog
/// lookup and prefix heuristics
pub fn build_provider(model: &str) -> Result<Arc<dyn Provider>> {
    let vendor = models::vendor_for(model);
    let provider: Arc<dyn Provider> = match vendor {
        Vendor::Anthropic => Arc::new(AnthropicProvider::new(model, api_key_for(vendor)?)?),
        Vendor::Openai => Arc::new(OpenAiCompatProvider::openai(model, api_key_for(vendor)?)?),
        Vendor::Xai => Arc::new(OpenAiCompatProvider::xai(model, api_key_for(vendor)?)?),
        Vendor::Google => Arc::new(GoogleProvider::new(model, api_key_for(vendor)?)?),
        Vendor::Ollama => Arc::new(OllamaProvider::new(model)?),
        Vendor::Test => Arc::new(TestProvider::parrot()),
        Vendor::Silent => Arc::new(SilentProvider),
    };
    Ok(provider)
}

/// Verify every requested model's vendor key before launching anything
pub fn preflight(model_ids: &[&str]) -> Result<()> {
    for model in model_ids {
        let vendor = models::vendor_for(model);
        if vendor.api_key_env().is_some() {
            api_key_for(vendor)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyless_vendors_need_no_env() {
        preflight(&["test", "silent", "llama3.2"]).unwrap();
    }

    #[test]
    fn test_test_and_silent_build_without_keys() {
        assert_eq!(build_provider("test").unwrap().vendor(), Vendor::Test);
        assert_eq!(build_provider("silent").unwrap().vendor(), Vendor::Silent);
    }

    #[test]
    fn test_missing_key_is_config_error() {
        unsafe { std::env::remove_var("ANTHROPIC_API_KEY") };
        let err = build_provider("claude-sonnet-4-20250514").unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("ANTHROPIC_API_KEY")),
            other => panic!("expected Config error, got {}", other),
        }
    }
}
