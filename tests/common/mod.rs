//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use finqa::embedding::EmbeddingProvider;
use finqa::llm::ChatModel;
use std::path::Path;
use std::sync::Mutex;

/// Five rows from Financial-QA-10k, one of them an exact duplicate pair.
pub const SAMPLE_CSV: &str = "\
question,answer,context,ticker,filing
What area did NVIDIA initially focus on before expanding into other markets?,NVIDIA initially focused on PC graphics.,\"Since our original focus on PC graphics, we have expanded into various markets.\",NVDA,2023_10K
What are some of the recent applications of GPU-powered deep learning as mentioned by NVIDIA?,\"Recent applications include recommendation systems, large language models, and generative AI.\",\"Some of the most recent applications of GPU-powered deep learning include recommendation systems, which are at the core of the internet, and generative AI.\",NVDA,2023_10K
How many full-time employees did Apple have as of September 2023?,\"Approximately 161,000 full-time equivalent employees.\",\"As of September 30, 2023, the Company had approximately 161,000 full-time equivalent employees.\",AAPL,2023_10K
What area did NVIDIA initially focus on before expanding into other markets?,NVIDIA initially focused on PC graphics.,A repeated question/answer pair with different context.,NVDA,2023_10K
What is the total amount of debt Microsoft had at the end of fiscal year 2023?,$47.2 billion.,Total debt was $47.2 billion as of June 30 2023.,MSFT,2023_10K
";

/// Unique (question, answer) pairs in [`SAMPLE_CSV`].
pub const SAMPLE_UNIQUE_ROWS: usize = 4;

pub const TEST_DIMS: usize = 8;

/// Deterministic bag-of-words embedder: each token bumps one of
/// [`TEST_DIMS`] buckets chosen by a simple byte hash.
pub struct HashEmbedder;

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; TEST_DIMS];
    for token in text.split_whitespace() {
        let h = token.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        v[h % TEST_DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        TEST_DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

/// Returns the prompt as the answer and records every prompt it saw.
#[derive(Default)]
pub struct EchoModel {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn chat(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(prompt.to_string())
    }
}

/// Always fails, like an unreachable generation endpoint.
pub struct DownModel;

#[async_trait]
impl ChatModel for DownModel {
    fn model_name(&self) -> &str {
        "down"
    }
    async fn chat(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("connection refused")
    }
}

pub fn write_sample_csv(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("Financial-QA-10k.csv");
    std::fs::write(&path, SAMPLE_CSV).unwrap();
    path
}
