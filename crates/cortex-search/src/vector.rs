//! Vector Index (spec §2, §4.3 `semanticSearch`, §4.9 semantic signal).
//!
//! One concrete implementation is shipped: an in-process cosine-similarity
//! index keyed by `MemoryId`. It stands in for the abstract "vector store"
//! capability (Qdrant-style) that §1 names as an external collaborator —
//! the service is runnable without any external infrastructure.

use std::collections::HashMap;

use cortex_types::domain::Embedding;
use cortex_types::{MemoryId, SessionId};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Entry {
    embedding: Embedding,
    session_id: Option<SessionId>,
    category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorSearchOptions {
    pub limit: usize,
    pub threshold: Option<f32>,
    pub session_id: Option<SessionId>,
    pub category: Option<String>,
}

impl VectorSearchOptions {
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    pub id: MemoryId,
    pub similarity: f32,
}

/// Abstract capability: embedding storage + cosine top-K with filters.
pub trait VectorIndex: Send + Sync {
    fn upsert(
        &mut self,
        id: MemoryId,
        embedding: Embedding,
        session_id: Option<SessionId>,
        category: Option<String>,
    ) -> Result<()>;

    fn remove(&mut self, id: &MemoryId);

    fn search(&self, query: &Embedding, opts: &VectorSearchOptions) -> Result<Vec<VectorHit>>;
}

/// In-process reference implementation: a flat map scanned linearly. Fine
/// for the per-session / per-project scale this service targets; a real
/// deployment would swap this for the Qdrant-style external store.
pub struct InMemoryVectorIndex {
    dimension: usize,
    entries: HashMap<MemoryId, Entry>,
}

impl InMemoryVectorIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: HashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cosine similarity in `[-1, 1]`; `0.0` when either vector has zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex for InMemoryVectorIndex {
    fn upsert(
        &mut self,
        id: MemoryId,
        embedding: Embedding,
        session_id: Option<SessionId>,
        category: Option<String>,
    ) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        self.entries.insert(
            id,
            Entry {
                embedding,
                session_id,
                category,
            },
        );
        Ok(())
    }

    fn remove(&mut self, id: &MemoryId) {
        self.entries.remove(id);
    }

    fn search(&self, query: &Embedding, opts: &VectorSearchOptions) -> Result<Vec<VectorHit>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<VectorHit> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                opts.session_id.is_none_or(|sid| entry.session_id == Some(sid))
            })
            .filter(|(_, entry)| {
                opts.category.is_none()
                    || opts.category == entry.category
            })
            .map(|(id, entry)| VectorHit {
                id: *id,
                similarity: cosine_similarity(query, &entry.embedding),
            })
            .filter(|hit| opts.threshold.is_none_or(|t| hit.similarity >= t))
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(opts.limit.max(1));
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn search_rejects_dimension_mismatch() {
        let index = InMemoryVectorIndex::new(3);
        let err = index
            .search(&vec![1.0, 2.0], &VectorSearchOptions::with_limit(10))
            .unwrap_err();
        assert_eq!(err.kind(), cortex_types::Kind::InvalidArgument);
    }

    #[test]
    fn search_filters_by_session_and_orders_by_similarity() {
        let mut index = InMemoryVectorIndex::new(2);
        let s1 = SessionId::new();
        let s2 = SessionId::new();
        let id_a = MemoryId::new();
        let id_b = MemoryId::new();
        index
            .upsert(id_a, vec![1.0, 0.0], Some(s1), None)
            .unwrap();
        index
            .upsert(id_b, vec![0.0, 1.0], Some(s2), None)
            .unwrap();

        let hits = index
            .search(
                &vec![1.0, 0.0],
                &VectorSearchOptions {
                    limit: 10,
                    threshold: None,
                    session_id: Some(s1),
                    category: None,
                },
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id_a);
    }

    #[test]
    fn upsert_replaces_existing_entry() {
        let mut index = InMemoryVectorIndex::new(2);
        let id = MemoryId::new();
        index.upsert(id, vec![1.0, 0.0], None, None).unwrap();
        index.upsert(id, vec![0.0, 1.0], None, None).unwrap();
        let hits = index
            .search(&vec![0.0, 1.0], &VectorSearchOptions::with_limit(10))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }
}
