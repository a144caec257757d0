//! Query handler: search → prompt → generate.
//!
//! The handler borrows its collaborators; they are built once at startup and
//! shared across queries. Nothing is cached between calls.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::index::SearchIndex;
use crate::llm::ChatModel;
use crate::models::SearchHit;
use crate::prompt::build_prompt;

/// The generated answer and the documents it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SearchHit>,
}

/// Collaborators for answering questions.
pub struct Rag<'a> {
    pub index: &'a dyn SearchIndex,
    pub model: &'a dyn ChatModel,
    pub size: usize,
}

impl<'a> Rag<'a> {
    pub fn new(index: &'a dyn SearchIndex, model: &'a dyn ChatModel, size: usize) -> Self {
        Self { index, model, size }
    }

    /// Run the lexical search for `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.index
            .search(query, self.size)
            .await
            .with_context(|| format!("search on index '{}' failed", self.index.name()))
    }

    /// Answer `query`. An empty retrieval still produces a prompt; only a
    /// search or generation failure is an error.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let sources = self.retrieve(query).await?;
        info!(hits = sources.len(), "retrieved context");

        let prompt = build_prompt(query, &sources);
        debug!(chars = prompt.len(), "built prompt");

        let answer = self
            .model
            .chat(&prompt)
            .await
            .with_context(|| format!("generation with '{}' failed", self.model.model_name()))?;

        Ok(Answer { answer, sources })
    }
}
