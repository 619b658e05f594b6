//! Core types shared across the cortex memory service: identifiers,
//! canonical-JSON/content-addressing primitives, domain structs, the
//! error-kind taxonomy, and configuration.
//!
//! Internal crate — not intended for direct use outside the workspace.

pub mod canonical;
pub mod config;
pub mod domain;
pub mod error;
pub mod ids;

pub use config::Configuration;
pub use error::{Error, Kind, Result};
pub use ids::{
    AnalysisId, ChangeId, DocumentId, EntityId, FindingId, FindingsDigest, MemoryId,
    RelationshipId, RunId, SessionId,
};
