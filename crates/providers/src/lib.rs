//! Model provider implementations for Jarvis.
//!
//! All chat backends implement `jarvis_core::Provider`; the OpenAI-compatible
//! provider also implements `jarvis_core::SpeechProvider` for the voice
//! front-end.

pub mod openai_compat;

use std::sync::Arc;

use jarvis_config::AppConfig;
use jarvis_core::error::ProviderError;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// Fails with `NotConfigured` when no API key is available, so callers
/// can report the problem before accepting traffic.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<OpenAiCompatProvider>, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "no API key: set JARVIS_API_KEY / OPENAI_API_KEY or api_key in config.toml".into(),
        )
    })?;

    let provider = OpenAiCompatProvider::new("openai", &config.base_url, api_key)?
        .with_speech(config.speech.clone());
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_core::Provider;

    #[test]
    fn build_requires_api_key() {
        let config = AppConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn build_with_api_key() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
