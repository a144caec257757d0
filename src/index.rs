//! Search index abstraction.
//!
//! The [`SearchIndex`] trait covers the handful of index operations the
//! ingestion job and the query handler need, so the same pipeline code runs
//! against Elasticsearch ([`crate::elastic::ElasticIndex`]) or the
//! [`MemoryIndex`] used in tests.
//!
//! The schema and the lexical query are fixed:
//!
//! - one shard, no replicas
//! - `q`, `a`, `c` as `text`
//! - `q_`, `a_`, `c_` as `dense_vector` with cosine similarity (stored, not queried)
//! - `multi_match` over `q^3`, `a`, `c^0.5` with `best_fields` scoring

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::models::{IndexDocument, SearchHit};

/// Lexically searched fields and their boosts.
pub const QUERY_FIELDS: [(&str, f64); 3] = [("q", 3.0), ("a", 1.0), ("c", 0.5)];

/// Elasticsearch field spec, e.g. `q^3` or `c^0.5`. A boost of 1 is omitted.
pub fn field_spec(field: &str, boost: f64) -> String {
    if (boost - 1.0).abs() < f64::EPSILON {
        field.to_string()
    } else {
        format!("{}^{}", field, boost)
    }
}

/// Index settings and mappings sent when the index is created.
pub fn index_definition(dims: usize) -> serde_json::Value {
    let vector = serde_json::json!({
        "type": "dense_vector",
        "dims": dims,
        "index": true,
        "similarity": "cosine"
    });
    serde_json::json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        },
        "mappings": {
            "properties": {
                "i": { "type": "long" },
                "q": { "type": "text" },
                "a": { "type": "text" },
                "c": { "type": "text" },
                "q_": vector,
                "a_": vector,
                "c_": vector
            }
        }
    })
}

/// Body of the weighted multi-field lexical query.
pub fn search_body(query: &str, size: usize) -> serde_json::Value {
    let fields: Vec<String> = QUERY_FIELDS
        .iter()
        .map(|(f, b)| field_spec(f, *b))
        .collect();
    serde_json::json!({
        "size": size,
        "_source": ["i", "q", "a", "c"],
        "query": {
            "bool": {
                "must": {
                    "multi_match": {
                        "query": query,
                        "fields": fields,
                        "type": "best_fields"
                    }
                }
            }
        }
    })
}

/// Operations on the external document index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index name.
    fn name(&self) -> &str;

    /// Delete the index. A missing index is not an error.
    async fn delete_index(&self) -> Result<()>;

    /// Create the index with [`index_definition`] for `dims`-sized vectors.
    async fn create_index(&self, dims: usize) -> Result<()>;

    /// Add documents. Fails if any document is rejected.
    async fn insert(&self, docs: &[IndexDocument]) -> Result<()>;

    /// Make inserted documents visible to search and count.
    async fn refresh(&self) -> Result<()>;

    /// Number of documents in the index.
    async fn count(&self) -> Result<u64>;

    /// Run the weighted lexical query, returning at most `size` hits in
    /// descending score order.
    async fn search(&self, query: &str, size: usize) -> Result<Vec<SearchHit>>;
}

// ============ In-memory index ============

struct MemoryState {
    dims: usize,
    docs: Vec<IndexDocument>,
}

/// In-process [`SearchIndex`] for tests and offline runs.
///
/// Scores each field with a TF-IDF sum over the query terms, multiplies by
/// the field boost, and keeps the best field per document, mirroring
/// `best_fields`. Documents that match no term are not returned.
pub struct MemoryIndex {
    name: String,
    state: RwLock<Option<MemoryState>>,
}

impl MemoryIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(None),
        }
    }

    pub fn exists(&self) -> bool {
        self.state.read().map(|s| s.is_some()).unwrap_or(false)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn field_text<'a>(doc: &'a IndexDocument, field: &str) -> &'a str {
    match field {
        "q" => &doc.q,
        "a" => &doc.a,
        _ => &doc.c,
    }
}

fn score_documents(docs: &[IndexDocument], query: &str) -> Vec<(usize, f64)> {
    let terms: HashSet<String> = tokenize(query).into_iter().collect();
    if terms.is_empty() || docs.is_empty() {
        return Vec::new();
    }
    let n = docs.len() as f64;

    let mut best: Vec<f64> = vec![0.0; docs.len()];
    for (field, boost) in QUERY_FIELDS {
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(field_text(d, field))).collect();

        let mut df: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let unique: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
            for t in unique {
                if terms.contains(t) {
                    *df.entry(t).or_insert(0) += 1;
                }
            }
        }

        for (i, tokens) in tokenized.iter().enumerate() {
            let mut score = 0.0;
            for term in &terms {
                let tf = tokens.iter().filter(|t| *t == term).count();
                if tf == 0 {
                    continue;
                }
                let idf = (1.0 + n / df[term.as_str()] as f64).ln();
                score += (1.0 + (tf as f64).ln()) * idf;
            }
            let weighted = score * boost;
            if weighted > best[i] {
                best[i] = weighted;
            }
        }
    }

    best.into_iter()
        .enumerate()
        .filter(|(_, s)| *s > 0.0)
        .collect()
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn delete_index(&self) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        *state = None;
        Ok(())
    }

    async fn create_index(&self, dims: usize) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        if state.is_some() {
            bail!("index [{}] already exists", self.name);
        }
        *state = Some(MemoryState {
            dims,
            docs: Vec::new(),
        });
        Ok(())
    }

    async fn insert(&self, docs: &[IndexDocument]) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        let state = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no such index [{}]", self.name))?;
        for doc in docs {
            for v in [&doc.q_, &doc.a_, &doc.c_] {
                if !v.is_empty() && v.len() != state.dims {
                    bail!(
                        "document {}: vector has {} dims, mapping expects {}",
                        doc.i,
                        v.len(),
                        state.dims
                    );
                }
            }
        }
        state.docs.extend_from_slice(docs);
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let guard = self
            .state
            .read()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        let state = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no such index [{}]", self.name))?;
        Ok(state.docs.len() as u64)
    }

    async fn search(&self, query: &str, size: usize) -> Result<Vec<SearchHit>> {
        let guard = self
            .state
            .read()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        let state = guard
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no such index [{}]", self.name))?;

        let mut scored = score_documents(&state.docs, query);
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(state.docs[a.0].i.cmp(&state.docs[b.0].i))
        });
        scored.truncate(size);

        Ok(scored
            .into_iter()
            .map(|(idx, score)| {
                let d = &state.docs[idx];
                SearchHit {
                    id: d.i,
                    score,
                    question: d.q.clone(),
                    answer: d.a.clone(),
                    context: d.c.clone(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(i: u64, q: &str, a: &str, c: &str) -> IndexDocument {
        IndexDocument {
            i,
            q: q.to_string(),
            a: a.to_string(),
            c: c.to_string(),
            q_: vec![],
            a_: vec![],
            c_: vec![],
        }
    }

    #[test]
    fn field_specs_match_boosts() {
        let specs: Vec<String> = QUERY_FIELDS.iter().map(|(f, b)| field_spec(f, *b)).collect();
        assert_eq!(specs, vec!["q^3", "a", "c^0.5"]);
    }

    #[test]
    fn search_body_shape() {
        let body = search_body("nvidia", 5);
        assert_eq!(body["size"], 5);
        let mm = &body["query"]["bool"]["must"]["multi_match"];
        assert_eq!(mm["query"], "nvidia");
        assert_eq!(mm["type"], "best_fields");
        assert_eq!(mm["fields"], serde_json::json!(["q^3", "a", "c^0.5"]));
        assert_eq!(body["_source"], serde_json::json!(["i", "q", "a", "c"]));
    }

    #[test]
    fn index_definition_shape() {
        let def = index_definition(768);
        assert_eq!(def["settings"]["number_of_shards"], 1);
        assert_eq!(def["settings"]["number_of_replicas"], 0);
        for f in ["q_", "a_", "c_"] {
            let field = &def["mappings"]["properties"][f];
            assert_eq!(field["type"], "dense_vector");
            assert_eq!(field["dims"], 768);
            assert_eq!(field["similarity"], "cosine");
        }
        for f in ["q", "a", "c"] {
            assert_eq!(def["mappings"]["properties"][f]["type"], "text");
        }
    }

    #[tokio::test]
    async fn question_field_outweighs_context() {
        let index = MemoryIndex::new("t");
        index.create_index(4).await.unwrap();
        index
            .insert(&[
                doc(0, "other topic", "nothing", "revenue revenue revenue"),
                doc(1, "what was revenue", "unrelated", "unrelated"),
            ])
            .await
            .unwrap();
        let hits = index.search("revenue", 5).await.unwrap();
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn results_are_bounded_and_sorted() {
        let index = MemoryIndex::new("t");
        index.create_index(4).await.unwrap();
        let docs: Vec<_> = (0..20)
            .map(|i| doc(i, &format!("cash {}", "flow ".repeat(i as usize % 4)), "a", "c"))
            .collect();
        index.insert(&docs).await.unwrap();

        let hits = index.search("cash flow", 5).await.unwrap();
        assert_eq!(hits.len(), 5);
        for w in hits.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }

    #[tokio::test]
    async fn no_match_returns_empty() {
        let index = MemoryIndex::new("t");
        index.create_index(4).await.unwrap();
        index.insert(&[doc(0, "alpha", "beta", "gamma")]).await.unwrap();
        assert!(index.search("zeta", 5).await.unwrap().is_empty());
        assert!(index.search("   ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_create_requires_absence() {
        let index = MemoryIndex::new("t");
        index.delete_index().await.unwrap();
        index.create_index(4).await.unwrap();
        assert!(index.create_index(4).await.is_err());
        index.delete_index().await.unwrap();
        assert!(!index.exists());
        assert!(index.count().await.is_err());
    }

    #[tokio::test]
    async fn rejects_wrong_vector_dims() {
        let index = MemoryIndex::new("t");
        index.create_index(4).await.unwrap();
        let mut d = doc(0, "q", "a", "c");
        d.q_ = vec![0.0; 3];
        assert!(index.insert(&[d]).await.is_err());
    }
}
