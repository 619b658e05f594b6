//! Bi-temporal entity/relationship graph with lineage and evolution
//! queries (spec §4.5-§4.8).
//!
//! Internal crate — not intended for direct use outside the workspace.

pub mod db;
pub mod error;
pub mod evolution;
pub mod lineage;
pub mod manager;
pub mod queries;
pub mod schema;
pub mod store;
pub mod temporal;

pub use error::{Error, Result};
pub use evolution::{Change, ChangeType, EvolutionComparison, EvolutionEngine, EvolutionQuery, Timeline};
pub use lineage::{LineageEngine, LineageGraph, TimelineEntry};
pub use manager::{BatchCreateOutcome, EntityInput, EntityPatch, GraphManager, RelationshipInput};
pub use store::GraphStore;
pub use temporal::TemporalStore;
