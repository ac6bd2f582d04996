use std::sync::Arc;

use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::model::{Severity, StreamEntry};
use crate::notify::{window_label, StreamBoard};
use crate::scheduler::run_isolated;
use crate::selector::WindowSelector;

const EXCERPT_LIMIT: usize = 1200;

pub struct AppState {
    pub board: Arc<StreamBoard>,
    pub selector: Arc<WindowSelector>,
}

#[derive(Debug, Serialize)]
pub struct StreamView {
    pub window_label: Option<String>,
    pub refreshing: bool,
    pub message: Option<String>,
    pub entries: Vec<EntryView>,
}

#[derive(Debug, Serialize)]
pub struct EntryView {
    pub kind: &'static str,
    pub badge: &'static str,
    pub title: String,
    pub source: String,
    pub published_at: String,
    pub excerpt: String,
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
}

impl EntryView {
    pub fn from_entry(entry: &StreamEntry) -> Self {
        let (badge, severity, software) = match entry {
            StreamEntry::News(_) => ("INTEL", None, None),
            StreamEntry::Breach(_) => ("LEAK", None, None),
            StreamEntry::Vulnerability(vuln) => {
                ("CVE", Some(vuln.severity), Some(vuln.software.clone()))
            }
        };

        Self {
            kind: entry.kind().as_str(),
            badge,
            title: entry.identity().to_string(),
            source: entry.display_source().to_string(),
            published_at: entry.timestamp().to_rfc3339(),
            excerpt: excerpt(entry.body(), EXCERPT_LIMIT),
            link: entry.link(),
            severity,
            software,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshStatus {
    pub refreshing: bool,
}

/// Reduce markup to its text content and cap it at `limit` characters,
/// marking the cut with an ellipsis.
pub fn excerpt(text: &str, limit: usize) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)<!--.*?-->|</?[a-z][^>]*>").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    // Tags first so decoded `&lt;` stays text
    let stripped = re_tags.replace_all(text, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    let plain = re_ws.replace_all(&decoded, " ");
    let plain = plain.trim();

    match plain.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &plain[..cut]),
        None => plain.to_string(),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Route handlers
pub async fn index(State(state): State<Arc<AppState>>) -> Json<StreamView> {
    let board = state.board.state();

    Json(StreamView {
        window_label: board.window_days.map(window_label),
        refreshing: state.selector.is_refreshing(),
        message: board.message,
        entries: board.entries.iter().map(EntryView::from_entry).collect(),
    })
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    // Spawn the refresh task
    let selector = state.selector.clone();
    tokio::spawn(async move {
        run_isolated(&selector).await;
    });

    // Return refreshing state immediately
    Json(RefreshStatus { refreshing: true })
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    Json(RefreshStatus {
        refreshing: state.selector.is_refreshing(),
    })
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
