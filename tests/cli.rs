mod common;

use common::write_sample_csv;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Output;
use tempfile::TempDir;
use tokio::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const EMBED_DIMS: usize = 4;

async fn finqa(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_finqa"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .await
        .expect("failed to run finqa")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// Elasticsearch double that accepts a full index rebuild of `count` docs.
async fn mock_elasticsearch(count: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/fin_qa"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/fin_qa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errors": false, "items": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fin_qa/_refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fin_qa/_count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": count })))
        .mount(&server)
        .await;
    server
}

/// Ollama double returning one constant vector per input text.
async fn mock_ollama_embed() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(|req: &Request| {
            let body: Value = req.body_json().unwrap_or(Value::Null);
            let n = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
            let embeddings: Vec<Vec<f32>> = vec![vec![0.5; EMBED_DIMS]; n];
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
        })
        .mount(&server)
        .await;
    server
}

fn write_config(dir: &Path, es: &str, ollama: &str) -> String {
    let csv = write_sample_csv(dir);
    let snapshot = dir.join("db").join("df.parquet");
    let config = format!(
        r#"
[dataset]
csv_path = "{}"
snapshot_path = "{}"

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = {}
url = "{}"

[search]
url = "{}"
bulk_size = 2
"#,
        csv.display(),
        snapshot.display(),
        EMBED_DIMS,
        ollama,
        es
    );
    let path = dir.join("finqa.toml");
    std::fs::write(&path, config).unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn help_lists_commands() {
    let out = finqa(&["--help"]).await;
    assert!(out.status.success());
    let text = stdout(&out);
    for cmd in ["ingest", "search", "ask", "serve"] {
        assert!(text.contains(cmd), "missing {} in help", cmd);
    }
}

#[tokio::test]
async fn missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let out = finqa(&["--config", missing.to_str().unwrap(), "search", "x"]).await;
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Failed to read config file"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_builds_then_reuses_snapshot() {
    let tmp = TempDir::new().unwrap();
    let es = mock_elasticsearch(4).await;
    let ollama = mock_ollama_embed().await;
    let config = write_config(tmp.path(), &es.uri(), &ollama.uri());

    let first = finqa(&["--config", &config, "ingest", "--progress", "off"]).await;
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    let text = stdout(&first);
    assert!(text.contains("(built)"));
    assert!(text.contains("  rows: 4"));
    assert!(text.contains("  dims: 4"));
    assert!(text.contains("  indexed into fin_qa: 4"));
    assert!(text.trim_end().ends_with("ok"));
    assert!(tmp.path().join("db").join("df.parquet").exists());

    let second = finqa(&["--config", &config, "ingest", "--progress", "off"]).await;
    assert!(second.status.success(), "stderr: {}", stderr(&second));
    assert!(stdout(&second).contains("(cached)"));
    assert!(stdout(&second).contains("  indexed into fin_qa: 4"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_fails_when_count_disagrees() {
    let tmp = TempDir::new().unwrap();
    let es = mock_elasticsearch(3).await;
    let ollama = mock_ollama_embed().await;
    let config = write_config(tmp.path(), &es.uri(), &ollama.uri());

    let out = finqa(&["--config", &config, "ingest", "--progress", "off"]).await;
    assert!(!out.status.success());
    assert!(stderr(&out).contains("holds 3 documents after loading 4"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn skip_index_only_writes_snapshot() {
    let tmp = TempDir::new().unwrap();
    let ollama = mock_ollama_embed().await;
    let config = write_config(tmp.path(), "http://127.0.0.1:1", &ollama.uri());

    let out = finqa(&["--config", &config, "ingest", "--skip-index", "--progress", "off"]).await;
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("indexing skipped"));
    assert!(tmp.path().join("db").join("df.parquet").exists());
}
