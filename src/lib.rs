//! # finqa
//!
//! Retrieval-augmented question answering over the Financial-QA-10k dataset
//! (question/answer/context triples drawn from 10-K filings).
//!
//! ## Architecture
//!
//! ```text
//! ingest:  CSV ──▶ dedup/shuffle ──▶ normalize ──▶ embed ──▶ snapshot ──▶ Elasticsearch
//!
//! query:   question ──▶ multi_match (q^3, a, c^0.5) ──▶ prompt ──▶ LLM ──▶ answer
//! ```
//!
//! Ranking, vector storage, embedding inference, and generation all happen in
//! external services; this crate wires them together.
//!
//! ## Quick Start
//!
//! ```bash
//! finqa ingest                          # build snapshot + index
//! finqa search "nvidia pc graphics"     # inspect retrieval
//! finqa ask "What did NVIDIA initially focus on?"
//! finqa serve                           # web form on [server].bind
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Text normalization |
//! | [`dataset`] | CSV loading, dedup, shuffle |
//! | [`snapshot`] | Parquet snapshot |
//! | [`embedding`] | Embedding providers |
//! | [`index`] | Search index trait, schema, in-memory index |
//! | [`elastic`] | Elasticsearch client |
//! | [`llm`] | Chat-completion clients |
//! | [`prompt`] | Prompt construction |
//! | [`rag`] | Query handler |
//! | [`ingest`] | Ingestion pipeline |
//! | [`progress`] | Ingestion progress reporting |
//! | [`search`] | `search` / `ask` commands |
//! | [`server`] | Web form and JSON API |

pub mod config;
pub mod dataset;
pub mod elastic;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod prompt;
pub mod rag;
pub mod search;
pub mod server;
pub mod snapshot;
