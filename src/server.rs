//! Web front end for the query handler.
//!
//! Serves a single-page form and a small JSON API. Each submission runs one
//! search and one generation call before the response is sent; nothing is
//! remembered between requests.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Question form |
//! | `POST` | `/ask` | Form submission, renders the answer page |
//! | `POST` | `/api/ask` | `{"query": "..."}` → `{"answer", "sources"}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! API errors use the body
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (502).

use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::elastic::ElasticIndex;
use crate::index::SearchIndex;
use crate::llm::{create_chat_model, ChatModel};
use crate::rag::{Answer, Rag};

/// Collaborators shared by all handlers. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    index: Arc<dyn SearchIndex>,
    model: Arc<dyn ChatModel>,
    size: usize,
}

impl AppState {
    pub fn new(index: Arc<dyn SearchIndex>, model: Arc<dyn ChatModel>, size: usize) -> Self {
        Self { index, model, size }
    }

    async fn answer(&self, query: &str) -> anyhow::Result<Answer> {
        Rag::new(self.index.as_ref(), self.model.as_ref(), self.size)
            .answer(query)
            .await
    }
}

/// Build the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_form))
        .route("/ask", post(handle_form_submit))
        .route("/api/ask", post(handle_api_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the web server on `bind` (or `[server].bind`).
pub async fn run_server(config: &Config, bind: Option<String>) -> anyhow::Result<()> {
    let bind_addr = bind.unwrap_or_else(|| config.server.bind.clone());

    let index: Arc<dyn SearchIndex> = Arc::new(ElasticIndex::for_query(&config.search)?);
    let model: Arc<dyn ChatModel> = Arc::from(create_chat_model(&config.llm)?);
    info!(
        index = index.name(),
        model = model.model_name(),
        "query collaborators ready"
    );

    let app = router(AppState::new(index, model, config.search.size));

    println!("finqa listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into a JSON HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn upstream_error(err: &anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream_error".to_string(),
        message: format!("{:#}", err),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/ask ============

#[derive(Deserialize)]
struct AskRequest {
    query: String,
}

async fn handle_api_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let answer = state.answer(query).await.map_err(|e| {
        error!(error = %format!("{:#}", e), "query failed");
        upstream_error(&e)
    })?;
    Ok(Json(answer))
}

// ============ Form UI ============

#[derive(Deserialize)]
struct AskForm {
    #[serde(default)]
    query: String,
}

async fn handle_form() -> Html<String> {
    Html(render_page("", None))
}

async fn handle_form_submit(State(state): State<AppState>, Form(form): Form<AskForm>) -> Response {
    let query = form.query.trim().to_string();
    if query.is_empty() {
        let body = render_page("", Some(Outcome::Failed("Please enter a query.".to_string())));
        return (StatusCode::BAD_REQUEST, Html(body)).into_response();
    }

    match state.answer(&query).await {
        Ok(answer) => Html(render_page(&query, Some(Outcome::Answered(answer)))).into_response(),
        Err(e) => {
            let message = format!("{:#}", e);
            error!(error = %message, "query failed");
            let body = render_page(&query, Some(Outcome::Failed(message)));
            (StatusCode::BAD_GATEWAY, Html(body)).into_response()
        }
    }
}

enum Outcome {
    Answered(Answer),
    Failed(String),
}

const DESCRIPTION: &str = "This application leverages a dataset containing 10,000 financial \
question-answer pairs derived from 10-K filings. It is designed to answer your financial \
queries using a combination of Elasticsearch and a local LLM. The dataset covers a wide range \
of topics relevant to financial analysis and company operations.";

const USES: [&str; 3] = [
    "Develop and test NLP models for question answering and context understanding.",
    "Extract and analyze specific financial insights.",
    "Serve as a resource for educational purposes in finance and data science.",
];

const STYLE: &str = "body{font-family:sans-serif;max-width:46rem;margin:2rem auto;padding:0 1rem}\
input[type=text]{width:100%;padding:.5rem;box-sizing:border-box}\
button{margin-top:.5rem;padding:.4rem 1.2rem}\
#busy{display:none;color:#555}\
.ok{background:#e6f4ea;padding:.5rem}\
.err{background:#fce8e6;padding:.5rem}\
.answer{white-space:pre-wrap;margin-top:1rem}";

const SCRIPT: &str = "document.getElementById('ask').addEventListener('submit',function(){\
document.getElementById('busy').style.display='block';\
document.getElementById('submit').disabled=true;});";

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn render_page(query: &str, outcome: Option<Outcome>) -> String {
    let uses: String = USES
        .iter()
        .map(|u| format!("<li>{}</li>", escape_html(u)))
        .collect();

    let result = match outcome {
        None => String::new(),
        Some(Outcome::Answered(answer)) => {
            let sources: String = answer
                .sources
                .iter()
                .map(|s| {
                    format!(
                        "<li><b>{}</b><br>{}</li>",
                        escape_html(&s.question),
                        escape_html(&s.answer)
                    )
                })
                .collect();
            format!(
                "<p class=\"ok\">Completed!</p><div class=\"answer\">{}</div>\
                 <details><summary>Sources ({})</summary><ol>{}</ol></details>",
                escape_html(&answer.answer),
                answer.sources.len(),
                sources
            )
        }
        Some(Outcome::Failed(message)) => {
            format!("<p class=\"err\">Error: {}</p>", escape_html(&message))
        }
    };

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Financial Q&amp;A System</title>\
         <style>{style}</style></head><body>\
         <h1>Financial Q&amp;A System</h1>\
         <p>{description}</p><p><b>Potential Uses:</b></p><ul>{uses}</ul>\
         <form id=\"ask\" method=\"post\" action=\"/ask\">\
         <label for=\"query\">Enter your query:</label>\
         <input type=\"text\" id=\"query\" name=\"query\" value=\"{query}\">\
         <button id=\"submit\" type=\"submit\">Ask</button></form>\
         <p id=\"busy\">Processing...</p>{result}\
         <script>{script}</script></body></html>",
        style = STYLE,
        description = escape_html(DESCRIPTION),
        uses = uses,
        query = escape_html(query),
        result = result,
        script = SCRIPT,
    )
}
