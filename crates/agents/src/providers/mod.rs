pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use relaykit_config::schema::ProvidersConfig;

use crate::model::LlmProvider;

/// Info about an available model.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub display_name: String,
}

/// Approximate context window, by model ID prefix. Used when a provider
/// doesn't expose the figure through its own API.
pub fn context_window_for_model(model_id: &str) -> u32 {
    if model_id.starts_with("claude-") {
        return 200_000;
    }
    if model_id.starts_with("o3") || model_id.starts_with("o4-mini") {
        return 200_000;
    }
    if model_id.starts_with("gpt-4") || model_id.starts_with("gpt-5") {
        return 128_000;
    }
    if model_id.starts_with("gemini-") {
        return 1_000_000;
    }
    200_000
}

/// Registry of available LLM providers, keyed by model ID.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    models: Vec<ModelInfo>,
}

impl ProviderRegistry {
    /// Register a provider manually.
    pub fn register(&mut self, info: ModelInfo, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(info.id.clone(), provider);
        self.models.push(info);
    }

    /// Auto-discover providers from environment variables, using default config.
    pub fn from_env() -> Self {
        Self::from_env_with_config(&ProvidersConfig::default())
    }

    /// Auto-discover OpenAI-compatible providers from config and environment
    /// variables. Any provider entry with a non-empty `base_url` is treated
    /// as an independent OpenAI-compatible backend (e.g. a local gguf server
    /// or another vendor's compatible API), keyed by its own model ID.
    pub fn from_env_with_config(config: &ProvidersConfig) -> Self {
        let mut reg = Self {
            providers: HashMap::new(),
            models: Vec::new(),
        };
        reg.register_builtin_providers(config);
        reg
    }

    fn register_builtin_providers(&mut self, config: &ProvidersConfig) {
        if !config.is_enabled("openai") {
            return;
        }

        let key = config
            .get("openai")
            .and_then(|e| e.api_key.clone())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        let Some(key) = key.filter(|k| !k.is_empty()) else {
            return;
        };

        let model_id = config
            .get("openai")
            .and_then(|e| e.model.as_deref())
            .unwrap_or("gpt-4o");

        if self.providers.contains_key(model_id) {
            return;
        }

        let base_url = config
            .get("openai")
            .and_then(|e| e.base_url.clone())
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| "https://api.openai.com/v1".into());

        let provider = Arc::new(openai::OpenAiProvider::new(
            secrecy::Secret::new(key),
            model_id.into(),
            base_url,
        ));
        self.register(
            ModelInfo {
                id: model_id.into(),
                provider: "openai".into(),
                display_name: model_id.into(),
            },
            provider,
        );
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(model_id).cloned()
    }

    pub fn first(&self) -> Option<Arc<dyn LlmProvider>> {
        self.models
            .first()
            .and_then(|m| self.providers.get(&m.id))
            .cloned()
    }

    /// Return the first provider that supports tool calling,
    /// falling back to the first provider overall.
    pub fn first_with_tools(&self) -> Option<Arc<dyn LlmProvider>> {
        self.models
            .iter()
            .filter_map(|m| self.providers.get(&m.id))
            .find(|p| p.supports_tools())
            .cloned()
            .or_else(|| self.first())
    }

    pub fn list_models(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_summary(&self) -> String {
        if self.models.is_empty() {
            return "no LLM providers configured".into();
        }
        self.models
            .iter()
            .map(|m| format!("{}: {}", m.provider, m.id))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_has_no_models() {
        let reg = ProviderRegistry::from_env_with_config(&ProvidersConfig::default());
        // CI has no OPENAI_API_KEY set; registry stays empty.
        if std::env::var("OPENAI_API_KEY").is_err() {
            assert!(reg.is_empty());
            assert!(reg.first().is_none());
        }
    }

    #[test]
    fn disabled_provider_is_skipped_even_with_key() {
        let mut config = ProvidersConfig::default();
        config.entries.insert(
            "openai".into(),
            relaykit_config::schema::ProviderEntry {
                enabled: false,
                api_key: Some("sk-test".into()),
                base_url: None,
                model: None,
            },
        );
        let reg = ProviderRegistry::from_env_with_config(&config);
        assert!(reg.is_empty());
    }

    #[test]
    fn context_window_defaults_by_prefix() {
        assert_eq!(context_window_for_model("claude-sonnet-4-5"), 200_000);
        assert_eq!(context_window_for_model("gpt-4o"), 128_000);
        assert_eq!(context_window_for_model("gemini-2.0-flash"), 1_000_000);
        assert_eq!(context_window_for_model("unknown-model"), 200_000);
    }
}
