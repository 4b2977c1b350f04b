use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("no factory registered for entity kind: {0}")]
    UnknownKind(String),
}
