//! Cascading event reset: the dependency graph, the persistence boundary and the
//! engine that walks one against the other.

pub mod engine;
pub mod gateway;
pub mod graph;
pub mod sqlite;
pub mod types;

pub use engine::CascadeEngine;
pub use gateway::{FieldUpdate, FieldValue, Filter, GatewayError, PersistenceGateway};
pub use graph::{Branch, CascadeGraph, DependencyEdge, GraphError};
pub use sqlite::SqliteGateway;
pub use types::{EventId, PartialFailure, ResetError, ResetSummary};
