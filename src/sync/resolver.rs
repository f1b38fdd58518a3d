/// Canonical instance lookup
///
/// Workflow tasks of a maintenance procedure only know the procedure's business
/// key. Every state write made with such a key must land on the owning instance,
/// so all instance-scoped operations go through this resolver first.

use crate::error::{Error, Result};
use crate::model::Instance;
use crate::store::Store;
use std::collections::HashMap;

#[derive(Clone)]
pub struct InstanceResolver {
    store: Store,
}

impl InstanceResolver {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Instance whose id or running maintenance id equals `id_or_alias`
    pub async fn resolve(&self, id_or_alias: &str) -> Result<Instance> {
        if id_or_alias.is_empty() {
            return Err(Error::InvalidInput("instance id must not be empty".to_string()));
        }
        self.store.get_instance(id_or_alias).await
    }

    /// Canonical id for an id or alias
    pub async fn canonical_id(&self, id_or_alias: &str) -> Result<String> {
        Ok(self.resolve(id_or_alias).await?.id)
    }

    /// Whether any instance answers to `id_or_alias`
    pub async fn exists(&self, id_or_alias: &str) -> Result<bool> {
        match self.resolve(id_or_alias).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) | Err(Error::InvalidInput(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Memoizing view for batch passes that look up the same keys repeatedly
    pub fn cached(&self) -> CachedResolver<'_> {
        CachedResolver {
            resolver: self,
            known: HashMap::new(),
        }
    }
}

/// Existence lookups remembered for the lifetime of one garbage collection pass
pub struct CachedResolver<'a> {
    resolver: &'a InstanceResolver,
    known: HashMap<String, bool>,
}

impl CachedResolver<'_> {
    pub async fn exists(&mut self, id_or_alias: &str) -> Result<bool> {
        if let Some(&known) = self.known.get(id_or_alias) {
            return Ok(known);
        }
        let exists = self.resolver.exists(id_or_alias).await?;
        self.known.insert(id_or_alias.to_string(), exists);
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str) -> Instance {
        Instance {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            design_id: "design-1".to_string(),
            release_id: "release-1".to_string(),
            new_release_id: None,
            name: "heating".to_string(),
            description: String::new(),
            ready: false,
            error: None,
            parameters: Vec::new(),
            running_maintenance_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn aliases_resolve_to_the_owning_instance() {
        let store = Store::in_memory().await.unwrap();
        store.save_instance(&instance("i1")).await.unwrap();
        store.append_maintenance_id("i1", "m1").await.unwrap();

        let resolver = InstanceResolver::new(store);
        assert_eq!(resolver.canonical_id("i1").await.unwrap(), "i1");
        assert_eq!(resolver.canonical_id("m1").await.unwrap(), "i1");
        assert!(!resolver.exists("m2").await.unwrap());
        assert!(!resolver.exists("").await.unwrap());
    }

    #[tokio::test]
    async fn cache_keeps_answers_within_a_pass() {
        let store = Store::in_memory().await.unwrap();
        store.save_instance(&instance("i1")).await.unwrap();

        let resolver = InstanceResolver::new(store.clone());
        let mut cached = resolver.cached();
        assert!(cached.exists("i1").await.unwrap());

        store.delete_instance("i1").await.unwrap();
        assert!(cached.exists("i1").await.unwrap());
        assert!(!resolver.exists("i1").await.unwrap());
    }
}
