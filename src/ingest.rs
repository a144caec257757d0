//! Ingestion pipeline orchestration.
//!
//! CSV → dedup → shuffle → normalize → embed → snapshot → index rebuild.
//!
//! When the snapshot file already exists the first five steps are skipped
//! and the cached records are reused. The index is always deleted and
//! rebuilt from the snapshot, whichever way the snapshot was obtained.

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::Config;
use crate::dataset;
use crate::elastic::ElasticIndex;
use crate::embedding::{self, embed_in_batches, EmbeddingProvider};
use crate::index::SearchIndex;
use crate::models::{EmbeddedRecord, IndexDocument, Record};
use crate::progress::{IngestEvent, ProgressReporter};
use crate::snapshot::{self, Snapshot};

/// Flags for one ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Recompute the snapshot even if one exists.
    pub refresh_snapshot: bool,
    /// Stop after the snapshot is available.
    pub skip_index: bool,
}

/// Where the snapshot of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Cached,
    Built,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Cached => "cached",
            SnapshotSource::Built => "built",
        }
    }
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub rows: usize,
    pub dims: usize,
    pub snapshot: SnapshotSource,
    /// Documents in the index afterwards; `None` when indexing was skipped.
    pub indexed: Option<u64>,
}

/// CLI entry point for `finqa ingest`.
pub async fn run_ingest(
    config: &Config,
    options: IngestOptions,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let (snap, source) = load_or_build_snapshot(
        config,
        options.refresh_snapshot,
        || embedding::create_provider(&config.embedding),
        progress,
    )
    .await?;

    let indexed = if options.skip_index {
        None
    } else {
        let index = ElasticIndex::for_ingest(&config.search)?;
        Some(rebuild_index(&index, &snap, config.search.bulk_size, progress).await?)
    };

    let report = IngestReport {
        rows: snap.len(),
        dims: snap.dims,
        snapshot: source,
        indexed,
    };

    println!("ingest {}", config.dataset.csv_path.display());
    println!("  snapshot: {} ({})", config.dataset.snapshot_path.display(), source.as_str());
    println!("  rows: {}", report.rows);
    println!("  dims: {}", report.dims);
    match report.indexed {
        Some(n) => println!("  indexed into {}: {}", config.search.index, n),
        None => println!("  indexing skipped"),
    }
    println!("ok");

    Ok(report)
}

/// Reuse the snapshot at `dataset.snapshot_path` or build and save a new one.
///
/// `make_embedder` is only called when the snapshot has to be built, so a
/// cached run never loads the embedding model.
pub async fn load_or_build_snapshot<F>(
    config: &Config,
    refresh: bool,
    make_embedder: F,
    progress: &dyn ProgressReporter,
) -> Result<(Snapshot, SnapshotSource)>
where
    F: FnOnce() -> Result<Box<dyn EmbeddingProvider>>,
{
    let path = &config.dataset.snapshot_path;

    if path.exists() && !refresh {
        progress.report(IngestEvent::Loading {
            source: path.display().to_string(),
        });
        let snap = snapshot::load(path)?;
        if !snap.is_empty() && snap.dims != config.embedding.dims {
            bail!(
                "snapshot {} has {}-dim vectors but embedding.dims = {}; rerun with --refresh-snapshot",
                path.display(),
                snap.dims,
                config.embedding.dims
            );
        }
        info!(rows = snap.len(), path = %path.display(), "loaded cached snapshot");
        return Ok((snap, SnapshotSource::Cached));
    }

    if !config.embedding.is_enabled() {
        bail!(
            "Embedding provider is disabled but snapshot {} must be built; set [embedding] provider in config",
            path.display()
        );
    }

    progress.report(IngestEvent::Loading {
        source: config.dataset.csv_path.display().to_string(),
    });
    let rows = dataset::load_csv(&config.dataset.csv_path)?;
    let raw_count = rows.len();
    let records = dataset::prepare(rows, config.dataset.seed);
    info!(raw = raw_count, unique = records.len(), "prepared dataset");

    let provider = make_embedder()?;
    if provider.dims() != config.embedding.dims {
        bail!(
            "embedding provider '{}' produces {}-dim vectors but embedding.dims = {}",
            provider.model_name(),
            provider.dims(),
            config.embedding.dims
        );
    }
    let snap = embed_records(records, provider.as_ref(), config.embedding.batch_size, progress).await?;

    snapshot::save(&snap, path)?;
    info!(rows = snap.len(), path = %path.display(), "saved snapshot");
    Ok((snap, SnapshotSource::Built))
}

/// Embed the question, context, and answer of every record.
pub async fn embed_records(
    records: Vec<Record>,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
    progress: &dyn ProgressReporter,
) -> Result<Snapshot> {
    let n = records.len();
    let mut texts: Vec<String> = Vec::with_capacity(n * 3);
    texts.extend(records.iter().map(|r| r.question.clone()));
    texts.extend(records.iter().map(|r| r.context.clone()));
    texts.extend(records.iter().map(|r| r.answer.clone()));

    let total = texts.len() as u64;
    let mut vectors = embed_in_batches(provider, &texts, batch_size, |done| {
        progress.report(IngestEvent::Embedding {
            n: done as u64,
            total,
        })
    })
    .await
    .with_context(|| format!("embedding with '{}' failed", provider.model_name()))?;

    let answers = vectors.split_off(2 * n);
    let contexts = vectors.split_off(n);
    let questions = vectors;

    let records = records
        .into_iter()
        .zip(questions)
        .zip(contexts)
        .zip(answers)
        .map(|(((record, question_vec), context_vec), answer_vec)| EmbeddedRecord {
            record,
            question_vec,
            answer_vec,
            context_vec,
        })
        .collect();

    Ok(Snapshot {
        dims: provider.dims(),
        records,
    })
}

/// Delete and recreate `index`, load every snapshot record, and return the
/// resulting document count.
///
/// Fails if the count after refresh differs from the snapshot size.
pub async fn rebuild_index(
    index: &dyn SearchIndex,
    snap: &Snapshot,
    bulk_size: usize,
    progress: &dyn ProgressReporter,
) -> Result<u64> {
    index
        .delete_index()
        .await
        .with_context(|| format!("failed to delete index '{}'", index.name()))?;
    index
        .create_index(snap.dims)
        .await
        .with_context(|| format!("failed to create index '{}'", index.name()))?;
    info!(index = index.name(), dims = snap.dims, "index created");

    let docs: Vec<IndexDocument> = snap.records.iter().map(IndexDocument::from).collect();
    let total = docs.len() as u64;
    let mut sent = 0u64;
    for slice in docs.chunks(bulk_size.max(1)) {
        index
            .insert(slice)
            .await
            .with_context(|| format!("failed to index documents into '{}'", index.name()))?;
        sent += slice.len() as u64;
        progress.report(IngestEvent::Indexing { n: sent, total });
    }

    index.refresh().await?;
    let count = index.count().await?;
    if count != total {
        bail!(
            "index '{}' holds {} documents after loading {}",
            index.name(),
            count,
            total
        );
    }
    info!(index = index.name(), count, "data indexed");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::progress::NoProgress;
    use async_trait::async_trait;

    struct LenProvider;

    #[async_trait]
    impl EmbeddingProvider for LenProvider {
        fn model_name(&self) -> &str {
            "len"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn record(id: u64, q: &str, a: &str, c: &str) -> Record {
        Record {
            id,
            question: q.to_string(),
            answer: a.to_string(),
            context: c.to_string(),
        }
    }

    #[tokio::test]
    async fn embed_records_pairs_vectors_with_fields() {
        let records = vec![record(0, "q", "aaa", "cc"), record(1, "qqqq", "a", "ccccc")];
        let snap = embed_records(records, &LenProvider, 2, &NoProgress).await.unwrap();
        assert_eq!(snap.dims, 2);
        assert_eq!(snap.records[0].question_vec[0], 1.0);
        assert_eq!(snap.records[0].context_vec[0], 2.0);
        assert_eq!(snap.records[0].answer_vec[0], 3.0);
        assert_eq!(snap.records[1].question_vec[0], 4.0);
        assert_eq!(snap.records[1].context_vec[0], 5.0);
        assert_eq!(snap.records[1].answer_vec[0], 1.0);
    }

    #[tokio::test]
    async fn rebuild_replaces_existing_documents() {
        let index = MemoryIndex::new("fin_qa");
        let records = vec![record(0, "q", "a", "c"), record(1, "q2", "a2", "c2")];
        let snap = embed_records(records, &LenProvider, 8, &NoProgress).await.unwrap();

        assert_eq!(rebuild_index(&index, &snap, 1, &NoProgress).await.unwrap(), 2);
        assert_eq!(rebuild_index(&index, &snap, 1, &NoProgress).await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_snapshot_builds_empty_index() {
        let index = MemoryIndex::new("fin_qa");
        let snap = Snapshot {
            dims: 2,
            records: vec![],
        };
        assert_eq!(rebuild_index(&index, &snap, 10, &NoProgress).await.unwrap(), 0);
        assert!(index.exists());
    }
}
