//! BM25 Index (spec §2, §4.9 keyword signal).
//!
//! An incremental inverted index with the standard Robertson-Sparck-Jones
//! length normalization. Parameters default to `k1=1.2, b=0.75` per spec
//! §4.9 but are configurable via [`cortex_types::config::Bm25Params`].

use std::collections::HashMap;

use cortex_types::config::Bm25Params;

/// Lowercases and splits on anything that isn't alphanumeric. Good enough
/// for memory/entity text; not a linguistic tokenizer.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Default)]
struct Posting {
    /// document id -> term frequency within that document
    term_freq: HashMap<String, u32>,
}

/// Incremental inverted index over a fixed document-id space (`String`, so
/// it can key either `MemoryId` or `EntityId` text via `to_string()`).
#[derive(Debug)]
pub struct Bm25Index {
    params: Bm25Params,
    postings: HashMap<String, Posting>,
    doc_len: HashMap<String, u32>,
    total_len: u64,
}

impl Bm25Index {
    #[must_use]
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            postings: HashMap::new(),
            doc_len: HashMap::new(),
            total_len: 0,
        }
    }

    #[must_use]
    pub fn doc_count(&self) -> usize {
        self.doc_len.len()
    }

    fn avg_doc_len(&self) -> f64 {
        if self.doc_len.is_empty() {
            0.0
        } else {
            self.total_len as f64 / self.doc_len.len() as f64
        }
    }

    /// Indexes `text` under `doc_id`, replacing any prior content for that
    /// id (so `update_document` is just `index_document` again).
    pub fn index_document(&mut self, doc_id: &str, text: &str) {
        self.remove_document(doc_id);

        let tokens = tokenize(text);
        let len = tokens.len() as u32;
        self.doc_len.insert(doc_id.to_string(), len);
        self.total_len += u64::from(len);

        let mut freqs: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *freqs.entry(token).or_insert(0) += 1;
        }
        for (term, freq) in freqs {
            self.postings
                .entry(term)
                .or_default()
                .term_freq
                .insert(doc_id.to_string(), freq);
        }
    }

    pub fn remove_document(&mut self, doc_id: &str) {
        if let Some(len) = self.doc_len.remove(doc_id) {
            self.total_len = self.total_len.saturating_sub(u64::from(len));
        }
        for posting in self.postings.values_mut() {
            posting.term_freq.remove(doc_id);
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.doc_len.len() as f64;
        let df = self
            .postings
            .get(term)
            .map_or(0, |p| p.term_freq.len()) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Scores every document containing at least one query term, returning
    /// `(doc_id, score)` pairs sorted by score descending.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f64)> {
        let query_terms = tokenize(query);
        let avg_len = self.avg_doc_len();
        let k1 = self.params.k1;
        let b = self.params.b;

        let mut scores: HashMap<String, f64> = HashMap::new();
        for term in &query_terms {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(term);
            for (doc_id, &tf) in &posting.term_freq {
                let doc_len = f64::from(self.doc_len.get(doc_id).copied().unwrap_or(0));
                let denom = f64::from(tf) + k1 * (1.0 - b + b * doc_len / avg_len.max(1e-9));
                let score = idf * (f64::from(tf) * (k1 + 1.0)) / denom.max(1e-9);
                *scores.entry(doc_id.clone()).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(limit.max(1));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_term_match_outranks_unrelated_document() {
        let mut index = Bm25Index::new(Bm25Params::default());
        index.index_document("a", "authentication decisions are hard");
        index.index_document("b", "the weather today is sunny");

        let ranked = index.search("authentication decisions", 10);
        assert_eq!(ranked[0].0, "a");
        assert!(ranked.len() == 1 || ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn longer_documents_are_length_normalized() {
        let mut index = Bm25Index::new(Bm25Params::default());
        index.index_document("short", "rust memory store");
        index.index_document(
            "long",
            "rust memory store and then a lot of unrelated filler text padded out to be much longer",
        );

        let ranked = index.search("rust memory store", 10);
        // Both contain every query term once; the shorter doc should score
        // at least as high once length normalization is applied.
        let short_score = ranked.iter().find(|(id, _)| id == "short").unwrap().1;
        let long_score = ranked.iter().find(|(id, _)| id == "long").unwrap().1;
        assert!(short_score >= long_score);
    }

    #[test]
    fn remove_document_drops_it_from_future_searches() {
        let mut index = Bm25Index::new(Bm25Params::default());
        index.index_document("a", "graph proximity search");
        index.remove_document("a");
        assert!(index.search("graph proximity", 10).is_empty());
        assert_eq!(index.doc_count(), 0);
    }

    #[test]
    fn reindexing_a_document_replaces_its_content() {
        let mut index = Bm25Index::new(Bm25Params::default());
        index.index_document("a", "original content");
        index.index_document("a", "updated text entirely");
        assert!(index.search("original", 10).is_empty());
        assert_eq!(index.search("updated text", 10)[0].0, "a");
    }
}
