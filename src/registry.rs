//! Model registry (spec §4.12): a process-wide map from `ResourceType` to
//! the metadata schema used to parse its persisted records polymorphically,
//! plus the `dependents_of` lookup the version store's cascade delete
//! (§4.5, §4.6) consults.
//!
//! Grounded on the teacher's global registries (`lazy_static` statics for
//! shared, process-wide state); `once_cell` is used here instead since
//! registration is explicitly one-shot — `OnceCell`'s "set once, error on
//! retry" semantics match the spec's "duplicate registration... is an
//! error" better than a lazily re-entrant macro. Most callers hold their
//! own `Arc<ModelRegistry>` via dependency injection; `install_global`/
//! `global` exist for entry points that need one process-wide instance.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::error::{FloridifyError, Result};
use crate::version::record::{ResourceKey, ResourceType};

/// A schema descriptor: currently just a name plus an optional validator,
/// since payloads are carried as `serde_json::Value` and the concrete
/// dictionary-domain shape lives outside the core (spec §1 scope).
#[derive(Clone)]
pub struct ResourceSchema {
    pub name: &'static str,
    validator: Option<Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>>,
}

impl ResourceSchema {
    pub fn new(name: &'static str) -> Self {
        Self { name, validator: None }
    }

    pub fn with_validator(
        name: &'static str,
        validator: impl Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            validator: Some(Arc::new(validator)),
        }
    }

    pub fn validate(&self, payload: &serde_json::Value) -> bool {
        self.validator.as_ref().map(|v| v(payload)).unwrap_or(true)
    }
}

type DependentsFn = dyn Fn(&str) -> Vec<ResourceKey> + Send + Sync;

#[derive(Default)]
pub struct ModelRegistry {
    schemas: DashMap<ResourceType, ResourceSchema>,
    dependents: DashMap<ResourceType, Arc<DependentsFn>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema for `resource_type`. Errors if already
    /// registered — double-initialization must be detectable (spec §9).
    pub fn register_schema(&self, resource_type: ResourceType, schema: ResourceSchema) -> Result<()> {
        if self.schemas.contains_key(&resource_type) {
            return Err(FloridifyError::persistence(format!(
                "resource type {resource_type} already registered"
            )));
        }
        self.schemas.insert(resource_type, schema);
        Ok(())
    }

    /// Look up the schema for `resource_type`, raising `UnknownResourceType`
    /// if nothing was registered.
    pub fn schema(&self, resource_type: ResourceType) -> Result<ResourceSchema> {
        self.schemas
            .get(&resource_type)
            .map(|r| r.clone())
            .ok_or_else(|| FloridifyError::unknown_resource_type(resource_type.to_string()))
    }

    pub fn is_registered(&self, resource_type: ResourceType) -> bool {
        self.schemas.contains_key(&resource_type)
    }

    /// Register the function the version store's cascade delete (§4.5)
    /// calls to find the dependent chains of a deleted resource.
    pub fn register_dependents(
        &self,
        resource_type: ResourceType,
        f: impl Fn(&str) -> Vec<ResourceKey> + Send + Sync + 'static,
    ) {
        self.dependents.insert(resource_type, Arc::new(f));
    }

    /// The dependent chains of `resource_id` under `resource_type`, or an
    /// empty list if nothing is registered.
    pub fn dependents_of(&self, resource_type: ResourceType, resource_id: &str) -> Vec<ResourceKey> {
        self.dependents
            .get(&resource_type)
            .map(|f| f(resource_id))
            .unwrap_or_default()
    }
}

static GLOBAL_REGISTRY: OnceCell<Arc<ModelRegistry>> = OnceCell::new();

impl ModelRegistry {
    /// Install `registry` as the process-wide instance. Errors if one is
    /// already installed — mirrors `register_schema`'s "set once" contract.
    pub fn install_global(registry: Arc<ModelRegistry>) -> Result<()> {
        GLOBAL_REGISTRY
            .set(registry)
            .map_err(|_| FloridifyError::persistence("global model registry already installed"))
    }

    /// The process-wide instance, if `install_global` has been called.
    pub fn global() -> Option<Arc<ModelRegistry>> {
        GLOBAL_REGISTRY.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_schema_registration_is_an_error() {
        let registry = ModelRegistry::new();
        registry.register_schema(ResourceType::Corpus, ResourceSchema::new("corpus")).unwrap();
        assert!(registry.register_schema(ResourceType::Corpus, ResourceSchema::new("corpus")).is_err());
    }

    #[test]
    fn unregistered_type_lookup_fails() {
        let registry = ModelRegistry::new();
        let err = registry.schema(ResourceType::Semantic).unwrap_err();
        assert!(matches!(err, FloridifyError::UnknownResourceType(_)));
    }

    #[test]
    fn dependents_of_unregistered_type_is_empty() {
        let registry = ModelRegistry::new();
        assert!(registry.dependents_of(ResourceType::Corpus, "c1").is_empty());
    }

    #[test]
    fn dependents_of_returns_registered_chains() {
        let registry = ModelRegistry::new();
        registry.register_dependents(ResourceType::Corpus, |id| {
            vec![ResourceKey::new(ResourceType::Trie, id.to_string())]
        });
        let deps = registry.dependents_of(ResourceType::Corpus, "c1");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].resource_type, ResourceType::Trie);
    }

    #[test]
    fn global_registry_can_only_be_installed_once() {
        let _ = ModelRegistry::install_global(Arc::new(ModelRegistry::new()));
        assert!(ModelRegistry::global().is_some());
        assert!(ModelRegistry::install_global(Arc::new(ModelRegistry::new())).is_err());
    }
}
