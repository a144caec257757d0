//! Dataset loading and preparation.
//!
//! Reads the Financial-QA-10k CSV, drops duplicate question/answer pairs,
//! shuffles the rows with a fixed seed, and normalizes the text fields into
//! [`Record`]s with contiguous ordinal ids.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::models::{RawRecord, Record};
use crate::normalize::normalize;

/// Load every row of the CSV at `path`.
pub fn load_csv(path: &Path) -> Result<Vec<RawRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open dataset: {}", path.display()))?;
    read_records(file).with_context(|| format!("Failed to parse dataset: {}", path.display()))
}

/// Parse CSV rows from any reader. The first line must be a header naming
/// at least the `question`, `answer`, and `context` columns.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    for required in ["question", "answer", "context"] {
        if !headers.iter().any(|h| h.trim() == required) {
            anyhow::bail!("CSV is missing required column '{}'", required);
        }
    }

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize::<RawRecord>().enumerate() {
        let row = result.with_context(|| format!("Invalid CSV row {}", line + 2))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Drop rows whose (question, answer) pair was already seen, keeping the
/// first occurrence and the original order.
pub fn dedup(rows: Vec<RawRecord>) -> Vec<RawRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|r| seen.insert((r.question.clone(), r.answer.clone())))
        .collect()
}

/// Shuffle in place. The same seed always yields the same permutation.
pub fn shuffle<T>(rows: &mut [T], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
}

/// Deduplicate, shuffle, and normalize raw rows into records.
///
/// Uniqueness is decided on the raw text; rows that only coincide after
/// normalization are all kept. Ids are the position after shuffling.
pub fn prepare(rows: Vec<RawRecord>, seed: u64) -> Vec<Record> {
    let mut rows = dedup(rows);
    shuffle(&mut rows, seed);

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| Record {
            id: i as u64,
            question: normalize(&row.question),
            answer: normalize(&row.answer),
            context: normalize(&row.context),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
question,answer,context,ticker,filing
What area did NVIDIA initially focus on before expanding into other markets?,NVIDIA initially focused on PC graphics.,\"Since our original focus on PC graphics, we have expanded into various markets.\",NVDA,2023_10K
What are some of the recent applications of GPU-powered deep learning as mentioned by NVIDIA?,\"Recent applications include recommendation systems, large language models, and generative AI.\",Some of the most recent applications of GPU-powered deep learning include recommendation systems.,NVDA,2023_10K
What area did NVIDIA initially focus on before expanding into other markets?,NVIDIA initially focused on PC graphics.,Duplicate row with a different context.,NVDA,2023_10K
How many full-time employees did Apple have?,Approximately 161000.,\"As of September 30, 2023, the Company had approximately 161,000 full-time equivalent employees.\",AAPL,2023_10K
";

    fn raw(q: &str, a: &str) -> RawRecord {
        RawRecord {
            question: q.to_string(),
            answer: a.to_string(),
            context: String::new(),
            ticker: None,
            filing: None,
        }
    }

    #[test]
    fn reads_sample_csv() {
        let rows = read_records(SAMPLE.as_bytes()).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].ticker.as_deref(), Some("NVDA"));
        assert_eq!(
            rows[0].context,
            "Since our original focus on PC graphics, we have expanded into various markets."
        );
    }

    #[test]
    fn missing_column_is_rejected() {
        let err = read_records("question,answer\nq,a\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("context"));
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let rows = read_records("question,answer,context\nq,a,c\n".as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].ticker.is_none());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let rows = read_records(SAMPLE.as_bytes()).unwrap();
        let deduped = dedup(rows);
        assert_eq!(deduped.len(), 3);
        assert!(deduped[0].context.starts_with("Since our original focus"));
    }

    #[test]
    fn dedup_leaves_unique_pairs() {
        let rows = vec![
            raw("q1", "a1"),
            raw("q1", "a2"),
            raw("q2", "a1"),
            raw("q1", "a1"),
            raw("q2", "a1"),
        ];
        let deduped = dedup(rows);
        let pairs: HashSet<_> = deduped
            .iter()
            .map(|r| (r.question.clone(), r.answer.clone()))
            .collect();
        assert_eq!(pairs.len(), deduped.len());
        assert_eq!(deduped.len(), 3);
    }

    #[test]
    fn shuffle_is_reproducible() {
        let mut a: Vec<u32> = (0..100).collect();
        let mut b: Vec<u32> = (0..100).collect();
        shuffle(&mut a, 0);
        shuffle(&mut b, 0);
        assert_eq!(a, b);
        assert_ne!(a, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn different_seeds_differ() {
        let mut a: Vec<u32> = (0..100).collect();
        let mut b: Vec<u32> = (0..100).collect();
        shuffle(&mut a, 0);
        shuffle(&mut b, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn prepare_assigns_contiguous_ids_and_normalizes() {
        let rows = read_records(SAMPLE.as_bytes()).unwrap();
        let records = prepare(rows, 0);
        assert_eq!(records.len(), 3);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.id, i as u64);
            assert_eq!(r.question, normalize(&r.question));
        }
        assert!(records
            .iter()
            .any(|r| r.answer == "nvidia initially focused on pc graphics"));
    }

    #[test]
    fn prepare_keeps_rows_that_match_only_after_normalization() {
        let mut first = raw("What is EPS?", "Earnings.");
        first.context = "Context A.".to_string();
        let mut second = raw("what is eps", "earnings");
        second.context = "Context B.".to_string();

        let records = prepare(vec![first, second], 0);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.question == "what is eps"));
        let mut contexts: Vec<&str> = records.iter().map(|r| r.context.as_str()).collect();
        contexts.sort();
        assert_eq!(contexts, vec!["context a", "context b"]);
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn prepare_is_deterministic() {
        let rows = read_records(SAMPLE.as_bytes()).unwrap();
        assert_eq!(prepare(rows.clone(), 7), prepare(rows, 7));
    }
}
