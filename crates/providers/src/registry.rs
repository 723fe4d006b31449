//! Provider registry — owns every configured LLM adapter and resolves
//! role-based defaults (router / executor / summarizer).

use std::collections::HashMap;
use std::sync::Arc;

use ha_domain::config::LlmConfig;

use crate::mock::MockProvider;
use crate::traits::LlmProvider;

/// A provider that failed to initialise, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct InitError {
    pub provider_id: String,
    pub kind: String,
    pub error: String,
}

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    /// Role → "provider" or "provider/model".
    roles: HashMap<String, String>,
    init_errors: Vec<InitError>,
}

impl ProviderRegistry {
    /// Build the registry from configuration. Unknown adapter kinds are
    /// recorded as init errors instead of failing startup — the gateway can
    /// serve ops endpoints with zero providers.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut init_errors = Vec::new();

        for (id, provider_config) in &config.providers {
            match provider_config.kind.as_str() {
                "mock" => {
                    providers.insert(id.clone(), Arc::new(MockProvider::new(id.clone())));
                }
                other => {
                    init_errors.push(InitError {
                        provider_id: id.clone(),
                        kind: other.to_string(),
                        error: format!("no adapter registered for kind '{other}'"),
                    });
                }
            }
        }

        Self {
            providers,
            roles: config.roles.clone(),
            init_errors,
        }
    }

    /// Registry with explicit providers (tests, embedded use).
    pub fn with_providers(
        providers: HashMap<String, Arc<dyn LlmProvider>>,
        roles: HashMap<String, String>,
    ) -> Self {
        Self {
            providers,
            roles,
            init_errors: Vec::new(),
        }
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve a role to its provider and optional model override.
    ///
    /// Role specs look like `"openai"` or `"openai/gpt-4o"`.
    pub fn for_role(&self, role: &str) -> Option<(Arc<dyn LlmProvider>, Option<String>)> {
        let spec = self.roles.get(role)?;
        let provider_id = spec.split('/').next().unwrap_or(spec);
        let provider = self.get(provider_id)?;
        let model = spec.split_once('/').map(|(_, m)| m.to_string());
        Some((provider, model))
    }

    /// Resolution order for the executor role: explicit spec → executor
    /// role → any provider.
    pub fn resolve_executor(
        &self,
        model_override: Option<&str>,
    ) -> Option<(Arc<dyn LlmProvider>, Option<String>)> {
        if let Some(spec) = model_override {
            let provider_id = spec.split('/').next().unwrap_or(spec);
            if let Some(p) = self.get(provider_id) {
                let model = spec.split_once('/').map(|(_, m)| m.to_string());
                return Some((p, model));
            }
        }
        if let Some(resolved) = self.for_role("executor") {
            return Some(resolved);
        }
        self.providers.values().next().cloned().map(|p| (p, None))
    }

    /// Provider for the routing classifier: router role → executor chain.
    pub fn resolve_router(&self) -> Option<(Arc<dyn LlmProvider>, Option<String>)> {
        self.for_role("router").or_else(|| self.resolve_executor(None))
    }

    /// Provider for history summarization: summarizer role → executor chain.
    pub fn resolve_summarizer(&self) -> Option<(Arc<dyn LlmProvider>, Option<String>)> {
        self.for_role("summarizer")
            .or_else(|| self.resolve_executor(None))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn init_errors(&self) -> &[InitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_domain::config::ProviderConfig;

    fn config_with_mock() -> LlmConfig {
        let mut providers = HashMap::new();
        providers.insert(
            "mock".to_string(),
            ProviderConfig {
                kind: "mock".into(),
                base_url: None,
                api_key: None,
                model: None,
            },
        );
        let mut roles = HashMap::new();
        roles.insert("executor".to_string(), "mock/mock-large".to_string());
        LlmConfig { providers, roles }
    }

    #[test]
    fn from_config_builds_mock_provider() {
        let registry = ProviderRegistry::from_config(&config_with_mock());
        assert!(!registry.is_empty());
        assert!(registry.get("mock").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn unknown_kind_is_recorded_not_fatal() {
        let mut config = config_with_mock();
        config.providers.insert(
            "weird".into(),
            ProviderConfig {
                kind: "quantum".into(),
                base_url: None,
                api_key: None,
                model: None,
            },
        );
        let registry = ProviderRegistry::from_config(&config);
        assert_eq!(registry.init_errors().len(), 1);
        assert_eq!(registry.init_errors()[0].kind, "quantum");
        // The valid provider is still usable.
        assert!(registry.get("mock").is_some());
    }

    #[test]
    fn role_resolution_splits_model() {
        let registry = ProviderRegistry::from_config(&config_with_mock());
        let (provider, model) = registry.for_role("executor").unwrap();
        assert_eq!(provider.provider_id(), "mock");
        assert_eq!(model.as_deref(), Some("mock-large"));
    }

    #[test]
    fn executor_resolution_prefers_override() {
        let registry = ProviderRegistry::from_config(&config_with_mock());
        let (provider, model) = registry.resolve_executor(Some("mock/other")).unwrap();
        assert_eq!(provider.provider_id(), "mock");
        assert_eq!(model.as_deref(), Some("other"));
    }

    #[test]
    fn router_falls_back_to_executor() {
        let registry = ProviderRegistry::from_config(&config_with_mock());
        let (provider, _) = registry.resolve_router().unwrap();
        assert_eq!(provider.provider_id(), "mock");
    }

    #[test]
    fn empty_registry_resolves_nothing() {
        let registry = ProviderRegistry::from_config(&LlmConfig::default());
        assert!(registry.is_empty());
        assert!(registry.resolve_executor(None).is_none());
    }
}
