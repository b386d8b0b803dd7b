//! Provider router — maps provider names and `provider/model` strings to
//! registered chat-completions backends.

use crate::openai_compat::OpenAiCompatProvider;
use navpilot_config::AppConfig;
use navpilot_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Named providers plus the one used when a model names no provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    fallback: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            fallback: default_provider.into(),
        }
    }

    /// Register `provider` under `name`, replacing any earlier registration.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        debug!(provider = %name, "Registering provider");
        self.providers.insert(name, provider);
    }

    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.get(&self.fallback)
    }

    pub fn default_name(&self) -> &str {
        &self.fallback
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).map(Arc::clone)
    }

    /// Resolve a provider from a model string.
    ///
    /// `"provider/model"` selects a registered provider by prefix; anything
    /// else goes to the default provider unchanged.
    pub fn resolve(&self, model: &str) -> Option<(Arc<dyn Provider>, String)> {
        let prefixed = model
            .split_once('/')
            .and_then(|(prefix, rest)| Some((self.get(prefix)?, rest.to_string())));

        prefixed.or_else(|| Some((self.default()?, model.to_string())))
    }

    /// Registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Build a router from configuration.
///
/// Every `[providers.<name>]` table is registered, and the default provider
/// is registered from the top-level key even without a table. A provider
/// with neither an `api_url` nor a well-known endpoint is skipped.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    let mut names: Vec<&String> = config.providers.keys().collect();
    if !config.providers.contains_key(&config.default_provider) {
        names.push(&config.default_provider);
    }

    for name in names {
        let table = config.providers.get(name);
        let url = table
            .and_then(|p| p.api_url.clone())
            .or_else(|| default_base_url(name).map(str::to_string));
        let Some(url) = url else {
            warn!(provider = %name, "No api_url and no known endpoint, skipping provider");
            continue;
        };
        let key = table
            .and_then(|p| p.api_key.clone())
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        router.register(name.clone(), Arc::new(OpenAiCompatProvider::new(name, url, key)));
    }

    router
}

/// Chat-completions endpoint of a well-known OpenAI-compatible provider.
pub fn default_base_url(provider_name: &str) -> Option<&'static str> {
    let url = match provider_name {
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "together" => "https://api.together.xyz/v1",
        "vllm" => "http://localhost:8000/v1",
        _ => return None,
    };
    Some(url)
}
