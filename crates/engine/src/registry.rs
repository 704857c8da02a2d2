//! The definition registry — versioned, immutable process definitions.
//!
//! `publish` validates and freezes a definition; readers get `Arc`
//! snapshots, so an instance started under version N keeps transitioning
//! under version N no matter what is published afterwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::graph;
use crate::models::ProcessDefinition;
use crate::EngineError;

#[derive(Default)]
pub struct DefinitionRegistry {
    // key → published versions, ascending.
    inner: RwLock<HashMap<String, Vec<Arc<ProcessDefinition>>>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    /// Validate and publish a definition, returning the assigned version.
    ///
    /// # Errors
    /// [`EngineError::Validation`] when the step graph is broken; nothing is
    /// stored in that case.
    pub fn publish(&self, mut definition: ProcessDefinition) -> Result<i32, EngineError> {
        graph::validate(&definition)?;

        let mut inner = self.inner.write().map_err(lock_poisoned)?;
        let versions = inner.entry(definition.key.clone()).or_default();
        definition.version = versions.last().map(|d| d.version).unwrap_or(0) + 1;
        let version = definition.version;
        versions.push(Arc::new(definition));
        Ok(version)
    }

    /// Latest published version for `key`.
    pub fn active(&self, key: &str) -> Result<Arc<ProcessDefinition>, EngineError> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        inner
            .get(key)
            .and_then(|versions| versions.last())
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("no published definition '{key}'")))
    }

    /// Exact published version, for instances pinned at `start`.
    pub fn version(&self, key: &str, version: i32) -> Result<Arc<ProcessDefinition>, EngineError> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        inner
            .get(key)
            .and_then(|versions| versions.iter().find(|d| d.version == version))
            .cloned()
            .ok_or_else(|| {
                EngineError::NotFound(format!("no definition '{key}' at version {version}"))
            })
    }

    /// All published definitions, every version.
    pub fn list(&self) -> Result<Vec<Arc<ProcessDefinition>>, EngineError> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        Ok(inner.values().flatten().cloned().collect())
    }

    /// Re-load persisted definitions at startup, re-validating each and
    /// keeping their stored version numbers.
    pub fn hydrate(&self, definitions: Vec<ProcessDefinition>) -> Result<(), EngineError> {
        let mut inner = self.inner.write().map_err(lock_poisoned)?;
        for definition in definitions {
            graph::validate(&definition)?;
            let versions = inner.entry(definition.key.clone()).or_default();
            versions.push(Arc::new(definition));
            versions.sort_by_key(|d| d.version);
        }
        Ok(())
    }
}

fn lock_poisoned<T>(_: T) -> EngineError {
    EngineError::Storage("definition registry lock poisoned".into())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults;

    #[test]
    fn publish_assigns_sequential_versions() {
        let registry = DefinitionRegistry::new();
        let def = defaults::client_onboarding();

        assert_eq!(registry.publish(def.clone()).unwrap(), 1);
        assert_eq!(registry.publish(def).unwrap(), 2);

        assert_eq!(registry.active("client_onboarding").unwrap().version, 2);
        assert_eq!(registry.version("client_onboarding", 1).unwrap().version, 1);
    }

    #[test]
    fn active_fails_for_unknown_key() {
        let registry = DefinitionRegistry::new();
        assert!(matches!(
            registry.active("ghost"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn broken_definition_is_not_published() {
        let registry = DefinitionRegistry::new();
        let mut def = defaults::client_onboarding();
        def.steps.retain(|s| s.key != "kickoff"); // dangle a reference

        assert!(matches!(
            registry.publish(def),
            Err(EngineError::Validation(_))
        ));
        assert!(registry.active("client_onboarding").is_err());
    }
}
