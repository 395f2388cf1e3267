//! Registry of adapter kinds and configured adapter instances.

use std::collections::HashMap;
use std::sync::Arc;

use fed_core::config::AdapterConfig;
use fed_protocol_saml::NegotiatedLevel;

use crate::adapter::{AdapterFactory, AdapterSettings, AuthAdapter};
use crate::error::{SpiError, SpiResult};

/// A named, initialized adapter.
#[derive(Debug, Clone)]
pub struct ConfiguredAdapter {
    /// Instance name from configuration.
    pub name: String,
    /// Factory kind it was created from.
    pub kind: &'static str,
    /// Assurance level it satisfies.
    pub level: i32,
    /// The adapter.
    pub adapter: Arc<dyn AuthAdapter>,
}

/// An adapter entry dropped during configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedAdapter {
    /// Instance name.
    pub name: String,
    /// Why it was dropped.
    pub reason: String,
}

/// Adapter kinds are registered in code; instances are created from
/// configuration by kind name and looked up by instance name or level.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    factories: HashMap<&'static str, Arc<dyn AdapterFactory>>,
    /// Sorted by level, configuration order within a level.
    instances: Vec<ConfiguredAdapter>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter kind. A later factory for the same kind
    /// replaces the earlier one.
    pub fn register(&mut self, factory: impl AdapterFactory + 'static) {
        let kind = factory.kind();
        if self.factories.insert(kind, Arc::new(factory)).is_some() {
            tracing::warn!(kind = %kind, "Adapter kind registered twice");
        }
    }

    /// Returns true if `kind` has a factory.
    #[must_use]
    pub fn has_kind(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Creates and initializes one adapter per configuration entry.
    ///
    /// An entry naming an unknown kind, or whose adapter fails to
    /// initialize, is dropped and returned; the others stay usable.
    pub async fn configure(&mut self, configs: &[AdapterConfig]) -> Vec<RejectedAdapter> {
        let mut rejected = Vec::new();
        for config in configs {
            match self.instantiate(config).await {
                Ok(instance) => {
                    tracing::info!(
                        adapter = %instance.name,
                        kind = %instance.kind,
                        level = instance.level,
                        "Adapter configured"
                    );
                    self.instances.push(instance);
                }
                Err(err) => {
                    tracing::warn!(adapter = %config.name, error = %err, "Adapter rejected");
                    rejected.push(RejectedAdapter {
                        name: config.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        self.instances.sort_by_key(|i| i.level);
        rejected
    }

    async fn instantiate(&self, config: &AdapterConfig) -> SpiResult<ConfiguredAdapter> {
        if self.instances.iter().any(|i| i.name == config.name) {
            return Err(SpiError::Configuration(format!(
                "adapter {} configured more than once",
                config.name
            )));
        }
        let factory = self
            .factories
            .get(config.kind.as_str())
            .ok_or_else(|| SpiError::UnknownKind(config.kind.clone()))?;

        let mut adapter = factory.create();
        adapter
            .init(&AdapterSettings::new(config.settings.clone()))
            .await
            .map_err(|err| SpiError::InitializationFailed {
                name: config.name.clone(),
                reason: err.to_string(),
            })?;

        Ok(ConfiguredAdapter {
            name: config.name.clone(),
            kind: factory.kind(),
            level: config.level,
            adapter: Arc::from(adapter),
        })
    }

    /// Looks up an instance by name.
    ///
    /// # Errors
    ///
    /// Returns [`SpiError::AdapterNotFound`].
    pub fn get(&self, name: &str) -> SpiResult<&ConfiguredAdapter> {
        self.instances
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| SpiError::AdapterNotFound(name.to_string()))
    }

    /// Configured instances in ascending level order.
    #[must_use]
    pub fn instances(&self) -> &[ConfiguredAdapter] {
        &self.instances
    }

    /// Picks the weakest adapter that satisfies `level`.
    ///
    /// [`NegotiatedLevel::NoCeiling`] selects the strongest adapter.
    ///
    /// # Errors
    ///
    /// Returns [`SpiError::NoAdapterForLevel`] when nothing is strong enough.
    pub fn for_level(&self, level: &NegotiatedLevel) -> SpiResult<&ConfiguredAdapter> {
        let found = match level.level() {
            Some(wanted) => self.instances.iter().find(|i| i.level >= wanted),
            None => self.instances.last(),
        };
        found.ok_or_else(|| {
            SpiError::NoAdapterForLevel(
                level
                    .level()
                    .map_or_else(|| "unbounded".to_string(), |l| l.to_string()),
            )
        })
    }

    /// Closes every configured adapter.
    pub fn close(&self) {
        for instance in &self.instances {
            instance.adapter.close();
        }
    }
}
