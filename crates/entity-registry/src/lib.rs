//! entity-registry: addressable entities and audience queries
//!
//! The registry indexes entities (the robot, people, their body parts) by id
//! without owning them, keeps named queries, and instantiates entities for
//! remote requests through per-kind factories.

mod entity;
pub use entity::{kinds, Entity, Position};

mod error;
pub use error::{RegistryError, Result};

mod query;
pub use query::{Audience, Query};

mod registry;
pub use registry::{EntityFactory, Registry};

pub mod remote;
pub use remote::{QueryResolution, RemoteRequest, RemoteResponse};
