use crate::entity::kinds;
use crate::{Entity, Query, RegistryError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Builds an entity of one kind from a locally assigned id.
pub type EntityFactory = dyn Fn(&str) -> Entity + Send + Sync;

#[derive(Default)]
struct Inner {
    // Non-owning: whoever built the entity owns it.
    index: HashMap<String, Weak<Entity>>,
    order: Vec<String>,
    // Entities instantiated on behalf of remote requests have no other owner.
    owned: HashMap<String, Arc<Entity>>,
    queries: HashMap<String, Query>,
    factories: HashMap<String, Arc<EntityFactory>>,
}

impl Inner {
    fn live(&self, id: &str) -> Option<Arc<Entity>> {
        self.index.get(id).and_then(Weak::upgrade)
    }
}

/// Maps entity ids to in-process entities and named queries.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity if its id is not already present.
    ///
    /// The first live registration of an id is authoritative; the returned
    /// entity is the one now stored under that id.
    pub fn register(&self, entity: &Arc<Entity>) -> Arc<Entity> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.live(entity.id()) {
            return existing;
        }
        let id = entity.id().to_string();
        if inner.index.insert(id.clone(), Arc::downgrade(entity)).is_none() {
            inner.order.push(id.clone());
        }
        debug!(entity_id = %id, kind = %entity.kind(), "registered entity");
        entity.clone()
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<Entity>> {
        self.inner
            .read()
            .live(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().live(id).is_some()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Entity>> {
        let mut inner = self.inner.write();
        inner.order.retain(|o| o != id);
        inner.owned.remove(id);
        inner.index.remove(id).and_then(|w| w.upgrade())
    }

    /// Live entities in registration order.
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        let inner = self.inner.read();
        inner.order.iter().filter_map(|id| inner.live(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entities().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entities whose parent is `id`.
    pub fn children_of(&self, id: &str) -> Vec<Arc<Entity>> {
        self.entities()
            .into_iter()
            .filter(|e| e.parent() == Some(id))
            .collect()
    }

    /// Where to look when addressing `entity`: its registered head if it has one.
    pub fn attention_target(&self, entity: &Arc<Entity>) -> Arc<Entity> {
        self.children_of(entity.id())
            .into_iter()
            .find(|c| c.kind() == kinds::HEAD)
            .unwrap_or_else(|| entity.clone())
    }

    /// Store a named query. Re-registering an existing id is a no-op.
    pub fn register_query(&self, id: impl Into<String>, query: Query) {
        let id = id.into();
        let mut inner = self.inner.write();
        if inner.queries.contains_key(&id) {
            return;
        }
        debug!(query_id = %id, "registered query");
        inner.queries.insert(id, query);
    }

    pub fn query(&self, id: &str) -> Option<Query> {
        self.inner.read().queries.get(id).cloned()
    }

    pub fn register_kind_factory<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str) -> Entity + Send + Sync + 'static,
    {
        let kind = kind.into();
        info!(%kind, "registered entity factory");
        self.inner.write().factories.insert(kind, Arc::new(factory));
    }

    /// Register a factory producing plain entities with global id `{kind}{local_id}`.
    pub fn register_kind(&self, kind: &str) {
        let owned_kind = kind.to_string();
        self.register_kind_factory(kind, move |local_id| {
            Entity::new(owned_kind.clone(), format!("{owned_kind}{local_id}"))
        });
    }

    /// Create and register an entity through the factory for `kind`.
    ///
    /// The registry keeps the new entity alive since the request has no local owner.
    pub fn instantiate_remote(&self, kind: &str, local_id: &str) -> Result<Arc<Entity>> {
        let factory = self.inner.read().factories.get(kind).cloned();
        let Some(factory) = factory else {
            warn!(%kind, "no factory for entity kind");
            return Err(RegistryError::UnknownKind(kind.to_string()));
        };
        let entity = Arc::new(factory(local_id));
        let stored = self.register(&entity);
        self.inner
            .write()
            .owned
            .entry(stored.id().to_string())
            .or_insert_with(|| stored.clone());
        info!(entity_id = %stored.id(), %kind, "added remote entity");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Position;

    #[test]
    fn first_registration_wins() {
        let reg = Registry::new();
        let a = Arc::new(Entity::new(kinds::PERSON, "p1").with_position(Position::new(1.0, 0.0, 0.0)));
        let b = Arc::new(Entity::new(kinds::PERSON, "p1"));
        reg.register(&a);
        let stored = reg.register(&b);
        assert!(Arc::ptr_eq(&stored, &a));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn lookup_unknown_is_not_found() {
        let reg = Registry::new();
        assert_eq!(
            reg.lookup("ghost").unwrap_err(),
            RegistryError::NotFound("ghost".into())
        );
    }

    #[test]
    fn index_does_not_own_entities() {
        let reg = Registry::new();
        {
            let p = Arc::new(Entity::new(kinds::PERSON, "temp"));
            reg.register(&p);
            assert!(reg.contains("temp"));
        }
        assert!(!reg.contains("temp"));
        // A fresh entity may take over a dead id.
        let p2 = Arc::new(Entity::new(kinds::PERSON, "temp"));
        assert!(Arc::ptr_eq(&reg.register(&p2), &p2));
        assert_eq!(reg.entities().len(), 1);
    }

    #[test]
    fn remote_instantiation_uses_factory() {
        let reg = Registry::new();
        reg.register_kind(kinds::PERSON);
        let e = reg.instantiate_remote(kinds::PERSON, "7").unwrap();
        assert_eq!(e.id(), "person7");
        assert!(reg.contains("person7"));
        assert_eq!(
            reg.instantiate_remote("dog", "1").unwrap_err(),
            RegistryError::UnknownKind("dog".into())
        );
    }

    #[test]
    fn attention_target_prefers_head() {
        let reg = Registry::new();
        let person = Arc::new(Entity::new(kinds::PERSON, "p"));
        let head = Arc::new(Entity::new(kinds::HEAD, "p_head").with_parent("p"));
        reg.register(&person);
        assert_eq!(reg.attention_target(&person).id(), "p");
        reg.register(&head);
        assert_eq!(reg.attention_target(&person).id(), "p_head");
    }
}
