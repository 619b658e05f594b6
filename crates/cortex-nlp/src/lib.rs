//! Deterministic text → graph extraction (spec §4.10, §4.11).
//!
//! Both the Entity Extractor and the Relationship Inferencer are pure,
//! regex-driven pattern matchers with no ML dependency, matching the
//! "deterministic text → graph" framing of the spec. Patterns are pinned to
//! the `regex` crate, which guarantees linear-time matching and has no
//! backtracking-unsafe constructs to disable (spec §9 design note on regex
//! engines).
//!
//! Internal crate — not intended for direct use outside the workspace.

pub mod error;
pub mod extractor;
pub mod inferencer;

pub use error::{Error, Result};
pub use extractor::{EntityExtractor, ExtractedEntity, ExtractionContext};
pub use inferencer::{InferredRelationship, RelationshipInferencer, ResolvedEntity};
