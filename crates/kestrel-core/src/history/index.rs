//! Search index boundary for chat histories.
//!
//! The production index is an external embedding service; [`MemoryIndex`] is a
//! lexical stand-in with the same contract, used by tests and local runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use regex::Regex;

use crate::error::Result;
use crate::types::Tag;

/// One ranked search result.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub score: f32,
    /// The chunk tag that matched (carries the chunk text and its message id).
    pub tag: Tag,
}

/// A searchable collection of text chunks.
pub trait SearchIndex: Send + Sync {
    /// Insert chunk tags. Tags without text are ignored.
    fn insert(&self, chunks: &[Tag]) -> Result<()>;

    /// Up to `k` hits, best first.
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    /// Remove everything.
    fn reset(&self) -> Result<()>;

    /// Number of indexed chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves index handles (stored on each history) to index instances.
pub trait IndexProvider: Send + Sync {
    fn open(&self, handle: &str) -> Result<Arc<dyn SearchIndex>>;
}

// ─────────────────────────────────────────────
// In-memory lexical index
// ─────────────────────────────────────────────

fn word_regex() -> &'static Regex {
    static WORDS: OnceLock<Regex> = OnceLock::new();
    WORDS.get_or_init(|| Regex::new(r"\w+").unwrap())
}

fn terms(text: &str) -> HashSet<String> {
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

struct Entry {
    tag: Tag,
    text_lower: String,
    terms: HashSet<String>,
}

/// Term-overlap index held in memory.
///
/// Score = fraction of query terms present in the chunk, plus 1.0 when the
/// whole query appears verbatim (case-insensitive).
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<Entry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchIndex for MemoryIndex {
    fn insert(&self, chunks: &[Tag]) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for tag in chunks {
            let Some(text) = tag.text.as_deref() else {
                continue;
            };
            entries.push(Entry {
                tag: tag.clone(),
                text_lower: text.to_lowercase(),
                terms: terms(text),
            });
        }
        Ok(())
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let query_lower = query.trim().to_lowercase();
        if query_lower.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_terms = terms(&query_lower);

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<SearchHit> = entries
            .iter()
            .filter_map(|entry| {
                let mut score = if query_terms.is_empty() {
                    0.0
                } else {
                    let shared = query_terms.intersection(&entry.terms).count();
                    shared as f32 / query_terms.len() as f32
                };
                if entry.text_lower.contains(&query_lower) {
                    score += 1.0;
                }
                (score > 0.0).then(|| SearchHit {
                    score,
                    tag: entry.tag.clone(),
                })
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    fn reset(&self) -> Result<()> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Hands out one shared [`MemoryIndex`] per handle.
#[derive(Default)]
pub struct MemoryIndexProvider {
    indexes: RwLock<HashMap<String, Arc<MemoryIndex>>>,
}

impl MemoryIndexProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexProvider for MemoryIndexProvider {
    fn open(&self, handle: &str) -> Result<Arc<dyn SearchIndex>> {
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        let index: Arc<dyn SearchIndex> = indexes
            .entry(handle.to_string())
            .or_insert_with(|| Arc::new(MemoryIndex::new()))
            .clone();
        Ok(index)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
