//! Provider registry -- a named collection of available tracker backends.
//!
//! The registry lets the CLI resolve a provider by name at runtime
//! (e.g. `planpilot sync --provider memory`).

use std::collections::HashMap;

use super::Provider;

/// A collection of registered [`Provider`] implementations, keyed by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under the name returned by [`Provider::name`].
    /// An existing provider with the same name is replaced and returned.
    pub fn register(&mut self, provider: impl Provider + 'static) -> Option<Box<dyn Provider>> {
        let name = provider.name().to_string();
        self.providers.insert(name, Box::new(provider))
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<&dyn Provider> {
        self.providers.get(name).map(|b| b.as_ref())
    }

    /// Remove and return a provider by name, for handing ownership to
    /// the engine.
    pub fn take(&mut self, name: &str) -> Option<Box<dyn Provider>> {
        self.providers.remove(name)
    }

    /// Names of all registered providers (unordered).
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
