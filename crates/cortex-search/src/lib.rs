//! Vector Index, BM25 Index, and hybrid-fusion ranking (spec §4.9).
//!
//! Internal crate — not intended for direct use outside the workspace.

pub mod bm25;
pub mod error;
pub mod hybrid;
pub mod vector;

pub use bm25::Bm25Index;
pub use error::{Error, Result};
pub use hybrid::{fuse, redistribute_weights, Candidate, EnabledModes, FusedResult, RawModeScores};
pub use vector::{cosine_similarity, InMemoryVectorIndex, VectorHit, VectorIndex, VectorSearchOptions};
