use crate::{Entity, Registry, RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Filter over registered entities, evaluated fresh on every call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub visible_only: bool,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn members<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn visible_only(mut self) -> Self {
        self.visible_only = true;
        self
    }

    fn matches(&self, entity: &Entity) -> bool {
        if let Some(kind) = &self.kind {
            if entity.kind() != kind {
                return false;
            }
        }
        if let Some(members) = &self.members {
            if !members.iter().any(|m| m == entity.id()) {
                return false;
            }
        }
        !self.visible_only || entity.is_visible()
    }

    /// Matching live entities in registration order.
    pub fn execute(&self, registry: &Registry) -> Vec<Arc<Entity>> {
        registry
            .entities()
            .into_iter()
            .filter(|e| self.matches(e))
            .collect()
    }

    /// Matching entities sorted by ascending distance to `origin`.
    /// Entities without a known position sort last.
    pub fn nearest_first(&self, registry: &Registry, origin: &Entity) -> Vec<Arc<Entity>> {
        let mut found: Vec<(Option<f64>, Arc<Entity>)> = self
            .execute(registry)
            .into_iter()
            .map(|e| (e.distance_to(origin), e))
            .collect();
        found.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => a.total_cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        found.into_iter().map(|(_, e)| e).collect()
    }
}

/// Who an utterance is directed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// One entity, addressed directly.
    Entity(String),
    /// A fixed group of entity ids.
    Group(Vec<String>),
    /// An ad-hoc query.
    Query(Query),
    /// A query registered in the registry under this id.
    Registered(String),
}

impl Audience {
    pub fn is_single(&self) -> bool {
        matches!(self, Audience::Entity(_))
    }

    /// Check that the audience refers to something the registry knows.
    pub fn validate(&self, registry: &Registry) -> Result<()> {
        match self {
            Audience::Entity(id) => registry.lookup(id).map(|_| ()),
            Audience::Registered(id) => registry
                .query(id)
                .map(|_| ())
                .ok_or_else(|| RegistryError::NotFound(id.clone())),
            Audience::Group(_) | Audience::Query(_) => Ok(()),
        }
    }

    /// Current members of the audience.
    pub fn resolve(&self, registry: &Registry) -> Result<Vec<Arc<Entity>>> {
        Ok(self.as_query(registry)?.execute(registry))
    }

    /// Current members of the audience, nearest to `origin` first.
    pub fn resolve_nearest(&self, registry: &Registry, origin: &Entity) -> Result<Vec<Arc<Entity>>> {
        Ok(self.as_query(registry)?.nearest_first(registry, origin))
    }

    fn as_query(&self, registry: &Registry) -> Result<Query> {
        match self {
            Audience::Entity(id) => {
                registry.lookup(id)?;
                Ok(Query::members([id.clone()]))
            }
            Audience::Group(ids) => Ok(Query::members(ids.iter().cloned())),
            Audience::Query(q) => Ok(q.clone()),
            Audience::Registered(id) => registry
                .query(id)
                .ok_or_else(|| RegistryError::NotFound(id.clone())),
        }
    }
}

impl From<&str> for Audience {
    fn from(id: &str) -> Self {
        Audience::Entity(id.to_string())
    }
}

impl From<Query> for Audience {
    fn from(query: Query) -> Self {
        Audience::Query(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{kinds, Position};

    fn person(id: &str, x: f64) -> Arc<Entity> {
        Arc::new(Entity::new(kinds::PERSON, id).with_position(Position::new(x, 0.0, 0.0)))
    }

    #[test]
    fn nearest_first_sorts_by_distance() {
        let reg = Registry::new();
        let robot = Arc::new(Entity::new(kinds::ROBOT, "robot1").with_position(Position::default()));
        let far = person("far", 5.0);
        let near = person("near", 1.0);
        let lost = Arc::new(Entity::new(kinds::PERSON, "lost"));
        for e in [&robot, &far, &lost, &near] {
            reg.register(e);
        }
        let ids: Vec<_> = Query::of_kind(kinds::PERSON)
            .nearest_first(&reg, &robot)
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["near", "far", "lost"]);
    }

    #[test]
    fn visible_only_filters_hidden() {
        let reg = Registry::new();
        let a = person("a", 1.0);
        let b = person("b", 2.0);
        reg.register(&a);
        reg.register(&b);
        b.set_visible(false);
        let found = Query::of_kind(kinds::PERSON).visible_only().execute(&reg);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "a");
    }

    #[test]
    fn group_audience_ignores_unknown_members() {
        let reg = Registry::new();
        let a = person("a", 1.0);
        reg.register(&a);
        let audience = Audience::Group(vec!["a".into(), "ghost".into()]);
        assert!(audience.validate(&reg).is_ok());
        assert_eq!(audience.resolve(&reg).unwrap().len(), 1);
    }

    #[test]
    fn registered_audience_must_exist() {
        let reg = Registry::new();
        let audience = Audience::Registered("crowd".into());
        assert_eq!(
            audience.validate(&reg).unwrap_err(),
            RegistryError::NotFound("crowd".into())
        );
        reg.register_query("crowd", Query::of_kind(kinds::PERSON));
        assert!(audience.validate(&reg).is_ok());
    }
}
