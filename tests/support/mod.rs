//! Shared fixtures: a stub classification service and a running bookshelf app.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tempfile::TempDir;

use bookshelf::classify::ClassifyClient;
use bookshelf::db::SharedDb;
use bookshelf::server::AppState;
use bookshelf::session::SessionStore;

#[derive(Clone, Default)]
pub struct StubState {
    pub hits: Arc<AtomicUsize>,
    pub last_query: Arc<Mutex<HashMap<String, String>>>,
}

impl StubState {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub const DUNE_WORK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<classify xmlns="http://classify.oclc.org">
  <response code="0"/>
  <work author="Herbert, Frank" editions="520" format="Book" holdings="9000" owi="OW12345" title="Dune">12345</work>
  <recommendations><ddc><mostPopular holdings="5000" nsfa="813.54" sfa="813"/></ddc></recommendations>
</classify>"#;

pub const COSMOS_WORK: &str = r#"<classify xmlns="http://classify.oclc.org">
  <response code="0"/>
  <work author="Sagan, Carl" owi="OW520" title="Cosmos"/>
  <recommendations><ddc><mostPopular sfa="520"/></ddc></recommendations>
</classify>"#;

pub const DUNE_SEARCH: &str = r#"<classify xmlns="http://classify.oclc.org">
  <response code="4"/>
  <works>
    <work author="Herbert, Frank" hyr="2019" owi="OW12345" title="Dune"/>
    <work author="Herbert, Brian" hyr="1999" owi="OW777" title="Dune: House Atreides"/>
  </works>
</classify>"#;

pub const NO_MATCH: &str = r#"<classify xmlns="http://classify.oclc.org"><response code="102"/></classify>"#;

async fn classify(State(stub): State<StubState>, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    *stub.last_query.lock() = q.clone();
    if let Some(owi) = q.get("owi") {
        return match owi.as_str() {
            "OW12345" => (StatusCode::OK, DUNE_WORK.to_string()),
            "OW520" => (StatusCode::OK, COSMOS_WORK.to_string()),
            "OW500" => (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
            "OWBROKEN" => (StatusCode::OK, "<classify><work".to_string()),
            "OWSLOW" => {
                tokio::time::sleep(Duration::from_secs(3)).await;
                (StatusCode::OK, DUNE_WORK.to_string())
            }
            _ => (StatusCode::OK, NO_MATCH.to_string()),
        };
    }
    match q.get("title").map(|s| s.as_str()) {
        Some("dune") => (StatusCode::OK, DUNE_SEARCH.to_string()),
        _ => (StatusCode::OK, NO_MATCH.to_string()),
    }
}

/// Start the stub service; returns its endpoint URL and shared state.
pub async fn spawn_stub() -> Result<(String, StubState)> {
    let stub = StubState::default();
    let app = Router::new().route("/classify2/Classify", get(classify)).with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/classify2/Classify"), stub))
}

pub struct TestApp {
    pub base: String,
    pub state: AppState,
    pub stub: StubState,
    pub db_path: std::path::PathBuf,
    _tmp: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// Start bookshelf on an ephemeral port against a fresh database and the stub service.
pub async fn spawn_app() -> Result<TestApp> {
    let (endpoint, stub) = spawn_stub().await?;
    let tmp = tempfile::tempdir()?;
    let db_path = tmp.path().join("books.db");
    let db = SharedDb::open(&db_path)?;
    let classify = ClassifyClient::new(endpoint, Duration::from_secs(5))?;
    let state = AppState::new(db, classify, SessionStore::new(Duration::from_secs(3600)), false);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let serve_state = state.clone();
    tokio::spawn(async move {
        let _ = bookshelf::server::serve(listener, serve_state).await;
    });
    Ok(TestApp { base: format!("http://{addr}"), state, stub, db_path, _tmp: tmp })
}

/// A browser-like client: keeps cookies, does not follow redirects.
pub fn browser() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

pub async fn register(app: &TestApp, client: &reqwest::Client, user: &str, password: &str) -> Result<reqwest::Response> {
    Ok(client
        .post(app.url("/login"))
        .form(&[("register", "1"), ("username", user), ("password", password)])
        .send()
        .await?)
}

pub async fn log_in(app: &TestApp, client: &reqwest::Client, user: &str, password: &str) -> Result<reqwest::Response> {
    Ok(client
        .post(app.url("/login"))
        .form(&[("login", "1"), ("username", user), ("password", password)])
        .send()
        .await?)
}
