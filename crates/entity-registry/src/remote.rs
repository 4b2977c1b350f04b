//! Request/response surface that lets other processes add entities, update
//! their visibility and evaluate registered queries. Transport is the
//! caller's concern; requests and responses are plain serde values.

use crate::{Registry, RegistryError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteRequest {
    AddEntity { kind: String, id: String },
    SetVisibility { global_id: String, visible: bool },
    ResolveQuery { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteResponse {
    Added { global_id: String },
    Updated,
    Entities { ids: Vec<String> },
    NotQueryable,
    Error { message: String },
}

/// Result of resolving an id that may name a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResolution {
    Entities(Vec<String>),
    NotQueryable,
}

impl Registry {
    pub fn add_entity(&self, kind: &str, id: &str) -> Result<String> {
        Ok(self.instantiate_remote(kind, id)?.id().to_string())
    }

    pub fn set_visibility(&self, global_id: &str, visible: bool) -> Result<()> {
        self.lookup(global_id)?.set_visible(visible);
        Ok(())
    }

    /// Execute the query registered under `id`. A plain entity id is not queryable.
    pub fn resolve_and_execute_query(&self, id: &str) -> Result<QueryResolution> {
        if let Some(query) = self.query(id) {
            let ids = query
                .execute(self)
                .iter()
                .map(|e| e.id().to_string())
                .collect();
            return Ok(QueryResolution::Entities(ids));
        }
        if self.contains(id) {
            return Ok(QueryResolution::NotQueryable);
        }
        Err(RegistryError::NotFound(id.to_string()))
    }

    pub fn handle_remote(&self, request: RemoteRequest) -> RemoteResponse {
        let result = match request {
            RemoteRequest::AddEntity { kind, id } => self
                .add_entity(&kind, &id)
                .map(|global_id| RemoteResponse::Added { global_id }),
            RemoteRequest::SetVisibility { global_id, visible } => self
                .set_visibility(&global_id, visible)
                .map(|_| RemoteResponse::Updated),
            RemoteRequest::ResolveQuery { id } => {
                self.resolve_and_execute_query(&id).map(|r| match r {
                    QueryResolution::Entities(ids) => RemoteResponse::Entities { ids },
                    QueryResolution::NotQueryable => RemoteResponse::NotQueryable,
                })
            }
        };
        result.unwrap_or_else(|e| {
            warn!(error = %e, "remote registry request failed");
            RemoteResponse::Error {
                message: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{kinds, Query};

    #[test]
    fn remote_round_trip_over_json() -> anyhow::Result<()> {
        let reg = Registry::new();
        reg.register_kind(kinds::PERSON);
        let req: RemoteRequest =
            serde_json::from_str(r#"{"op":"add_entity","kind":"person","id":"3"}"#)?;
        assert_eq!(
            reg.handle_remote(req),
            RemoteResponse::Added {
                global_id: "person3".into()
            }
        );

        let hide = RemoteRequest::SetVisibility {
            global_id: "person3".into(),
            visible: false,
        };
        assert_eq!(reg.handle_remote(hide), RemoteResponse::Updated);
        assert!(!reg.lookup("person3")?.is_visible());
        Ok(())
    }

    #[test]
    fn resolve_distinguishes_queries_and_entities() {
        let reg = Registry::new();
        reg.register_kind(kinds::PERSON);
        reg.add_entity(kinds::PERSON, "1").unwrap();
        reg.register_query("people", Query::of_kind(kinds::PERSON));

        assert_eq!(
            reg.resolve_and_execute_query("people").unwrap(),
            QueryResolution::Entities(vec!["person1".into()])
        );
        assert_eq!(
            reg.resolve_and_execute_query("person1").unwrap(),
            QueryResolution::NotQueryable
        );
        let resp = reg.handle_remote(RemoteRequest::ResolveQuery { id: "nobody".into() });
        assert!(matches!(resp, RemoteResponse::Error { .. }));
    }
}
