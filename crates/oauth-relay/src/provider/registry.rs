//! Registered providers.
//!
//! The registry is filled at startup and read on every request.
//! Registration order is kept: the resolver's session scan walks providers
//! in this order.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::RwLock;

use super::{Provider, ProviderError};

/// Set of providers available to a bridge, keyed by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<IndexMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, replacing any provider with the same name.
    pub async fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        tracing::info!(provider = %name, "Registered identity provider");
        self.providers.write().await.insert(name, provider);
    }

    /// Registers several providers in order.
    pub async fn register_all(&self, providers: impl IntoIterator<Item = Arc<dyn Provider>>) {
        for provider in providers {
            self.register(provider).await;
        }
    }

    /// Gets a provider by name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] if no provider has that name.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }

    /// Lists providers in registration order.
    pub async fn list(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.read().await.values().cloned().collect()
    }

    /// Removes every provider.
    pub async fn clear(&self) {
        self.providers.write().await.clear();
    }
}
