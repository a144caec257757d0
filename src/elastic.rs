//! Elasticsearch implementation of [`SearchIndex`] over its REST API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | delete | `DELETE /{index}` (404 tolerated) |
//! | create | `PUT /{index}` with settings and mappings |
//! | insert | `POST /_bulk` (NDJSON) |
//! | refresh | `POST /{index}/_refresh` |
//! | count | `GET /{index}/_count` |
//! | search | `POST /{index}/_search` |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::index::{index_definition, search_body, SearchIndex};
use crate::models::{IndexDocument, SearchHit};

/// Client handle for one Elasticsearch index.
pub struct ElasticIndex {
    base_url: String,
    index: String,
    client: reqwest::Client,
}

impl ElasticIndex {
    /// Build a client. `timeout` applies to every request when set.
    pub fn new(base_url: &str, index: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
            client: builder.build()?,
        })
    }

    /// Client for the ingestion job, with the configured request timeout.
    pub fn for_ingest(config: &SearchConfig) -> Result<Self> {
        Self::new(
            &config.url,
            &config.index,
            Some(Duration::from_secs(config.timeout_secs)),
        )
    }

    /// Client for the query path; no request timeout.
    pub fn for_query(config: &SearchConfig) -> Result<Self> {
        Self::new(&config.url, &config.index, None)
    }

    fn index_url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.base_url, self.index, suffix)
    }
}

async fn error_for_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("Elasticsearch {} failed ({}): {}", what, status, body)
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Deserialize)]
struct HitSource {
    #[serde(default)]
    i: u64,
    #[serde(default)]
    q: String,
    #[serde(default)]
    a: String,
    #[serde(default)]
    c: String,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

/// Serialize documents as `_bulk` NDJSON index actions.
pub fn bulk_body(index: &str, docs: &[IndexDocument]) -> Result<String> {
    let mut body = String::new();
    for doc in docs {
        let action = serde_json::json!({ "index": { "_index": index, "_id": doc.i.to_string() } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(doc)?);
        body.push('\n');
    }
    Ok(body)
}

/// First per-item error reason from a `_bulk` response, if any.
fn first_bulk_error(items: &[serde_json::Value]) -> Option<String> {
    items.iter().find_map(|item| {
        let action = item.as_object()?.values().next()?;
        let error = action.get("error")?;
        Some(
            error
                .get("reason")
                .and_then(|r| r.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| error.to_string()),
        )
    })
}

fn parse_hits(response: SearchResponse) -> Vec<SearchHit> {
    response
        .hits
        .hits
        .into_iter()
        .map(|h| SearchHit {
            id: h.source.i,
            score: h.score.unwrap_or(0.0),
            question: h.source.q,
            answer: h.source.a,
            context: h.source.c,
        })
        .collect()
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    fn name(&self) -> &str {
        &self.index
    }

    async fn delete_index(&self) -> Result<()> {
        let response = self
            .client
            .delete(self.index_url(""))
            .send()
            .await
            .with_context(|| format!("Elasticsearch unreachable at {}", self.base_url))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        error_for_status(response, "index delete").await?;
        Ok(())
    }

    async fn create_index(&self, dims: usize) -> Result<()> {
        let response = self
            .client
            .put(self.index_url(""))
            .json(&index_definition(dims))
            .send()
            .await
            .with_context(|| format!("Elasticsearch unreachable at {}", self.base_url))?;
        error_for_status(response, "index create").await?;
        Ok(())
    }

    async fn insert(&self, docs: &[IndexDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_body(&self.index, docs)?)
            .send()
            .await
            .with_context(|| format!("Elasticsearch unreachable at {}", self.base_url))?;
        let response = error_for_status(response, "bulk insert").await?;

        let bulk: BulkResponse = response.json().await?;
        if bulk.errors {
            let reason = first_bulk_error(&bulk.items).unwrap_or_else(|| "unknown".to_string());
            bail!("Elasticsearch rejected documents: {}", reason);
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let response = self
            .client
            .post(self.index_url("/_refresh"))
            .send()
            .await
            .with_context(|| format!("Elasticsearch unreachable at {}", self.base_url))?;
        error_for_status(response, "refresh").await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .get(self.index_url("/_count"))
            .send()
            .await
            .with_context(|| format!("Elasticsearch unreachable at {}", self.base_url))?;
        let response = error_for_status(response, "count").await?;
        let body: CountResponse = response.json().await?;
        Ok(body.count)
    }

    async fn search(&self, query: &str, size: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .post(self.index_url("/_search"))
            .json(&search_body(query, size))
            .send()
            .await
            .with_context(|| format!("Elasticsearch unreachable at {}", self.base_url))?;
        let response = error_for_status(response, "search").await?;
        let body: SearchResponse = response.json().await?;

        let mut hits = parse_hits(body);
        hits.truncate(size);
        Ok(hits)
    }
}
