//!
//! bookshelf HTTP server
//! ---------------------
//! Axum router, middleware and request handlers.
//!
//! Responsibilities:
//! - Access logging for every request.
//! - Session management with an opaque cookie token (see `session`). Login
//!   moves the session onto a new token; logout drops it and expires the cookie.
//! - Database liveness check in front of every request.
//! - Auth gate: every route except `/login` needs a session user that still
//!   exists in the credential store; anything else is redirected to `/login`.
//! - Login/registration and logout.
//! - Catalog listing (HTML and JSON) with sort/filter carried in the session,
//!   title search and add/delete backed by the classification service.

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Context;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Extension, Form, Json, Router};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::catalog::{Book, CatalogStore, FilterCategory, NewBook, SortColumn};
use crate::classify::{ClassifyClient, SearchResult};
use crate::config::Config;
use crate::db::SharedDb;
use crate::error::{AppError, AppResult, AuthError, StoreError};
use crate::pages;
use crate::security::CredentialStore;
use crate::session::{SessionStore, SessionToken, SESSION_COOKIE};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub catalog: CatalogStore,
    pub credentials: CredentialStore,
    pub classify: ClassifyClient,
    pub sessions: SessionStore,
    pub cookie_secure: bool,
}

impl AppState {
    pub fn new(db: SharedDb, classify: ClassifyClient, sessions: SessionStore, cookie_secure: bool) -> Self {
        Self {
            catalog: CatalogStore::new(db.clone()),
            credentials: CredentialStore::new(db.clone()),
            db,
            classify,
            sessions,
            cookie_secure,
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let db = SharedDb::open(&cfg.db_path)
            .with_context(|| format!("While opening database: {}", cfg.db_path))?;
        let classify = ClassifyClient::new(cfg.classify_url.clone(), cfg.classify_timeout)
            .context("While building classify client")?;
        Ok(Self::new(db, classify, SessionStore::new(cfg.session_ttl), cfg.cookie_secure))
    }
}

/// Token of the session the current request belongs to.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub token: SessionToken,
}

/// Username that passed the auth gate.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(index))
        .route("/logout", get(logout))
        .route("/books", get(list_books))
        .route("/books/add", put(add_book))
        .route("/books/{pk}", delete(delete_book))
        .route("/search", post(search))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login));

    Router::new()
        .route("/login", get(login_page).post(login))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), verify_database))
        .layer(middleware::from_fn_with_state(state.clone(), session_layer))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Start the HTTP server described by `cfg` and serve until shutdown.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let state = AppState::from_config(&cfg)?;
    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.http_port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cfg.bind, cfg.http_port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding {}", addr))?;
    info!("Starting server on {}", addr);
    serve(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

fn session_cookie(token: &str, secure: bool) -> Option<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{}={}; HttpOnly; SameSite=Lax; Path=/{}", SESSION_COOKIE, token, secure)).ok()
}

fn expired_session_cookie(secure: bool) -> HeaderValue {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{}", SESSION_COOKIE, secure))
        .unwrap_or_else(|_| HeaderValue::from_static("bookshelf_session=; Path=/; Max-Age=0"))
}

/// True when the handler already set or expired the session cookie.
fn sets_session_cookie(resp: &Response) -> bool {
    let prefix = format!("{}=", SESSION_COOKIE);
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|v| v.to_str().map(|s| s.starts_with(&prefix)).unwrap_or(false))
}

fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// One line per request: method, path, status and latency.
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let resp = next.run(req).await;
    info!(
        %method,
        %path,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    resp
}

/// Resolve or issue the session for this request and expose its token to handlers.
async fn session_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let existing = parse_cookie(req.headers(), SESSION_COOKIE).filter(|t| state.sessions.touch(t));
    let (token, issued) = match existing {
        Some(t) => (t, false),
        None => match state.sessions.issue() {
            Ok(t) => (t, true),
            Err(e) => {
                error!("cannot issue session: {e}");
                return AppError::internal("session_unavailable".to_string(), e.to_string()).into_response();
            }
        },
    };
    req.extensions_mut().insert(SessionContext { token: token.clone() });
    let mut resp = next.run(req).await;
    if issued && !sets_session_cookie(&resp) {
        if let Some(v) = session_cookie(&token, state.cookie_secure) {
            resp.headers_mut().append(header::SET_COOKIE, v);
        }
    }
    resp
}

async fn verify_database(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Err(e) = state.db.ping() {
        error!("database ping failed: {e}");
        return AppError::internal("database_unavailable".to_string(), e.to_string()).into_response();
    }
    next.run(req).await
}

/// Auth gate. Requires a session user that still exists in the credential store.
async fn require_login(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(user) = state.sessions.user(&ctx.token) else {
        debug!(path = %req.uri().path(), "unauthenticated request; redirecting to login");
        return found("/login");
    };
    match state.credentials.exists(&user) {
        Ok(true) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Ok(false) => {
            warn!(user = %user, "{}", AuthError::SessionExpired);
            state.sessions.update(&ctx.token, |s| s.user = None);
            found("/login")
        }
        Err(e) => {
            error!("auth gate lookup failed: {e}");
            AppError::from(e).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(rename = "sortBy")]
    sort_by: Option<String>,
    filter: Option<String>,
}

/// A non-empty value on the request wins over the session's; the result is
/// written back to the session either way.
fn resolve_view(sessions: &SessionStore, token: &str, params: &ListParams) -> (SortColumn, FilterCategory) {
    let mut view = (SortColumn::default(), FilterCategory::default());
    sessions.update(token, |s| {
        if let Some(v) = params.sort_by.as_deref().filter(|v| !v.is_empty()) {
            s.sort_column = Some(SortColumn::parse(v));
        }
        if let Some(v) = params.filter.as_deref().filter(|v| !v.is_empty()) {
            s.filter_category = Some(FilterCategory::parse(v));
        }
        view = (s.sort_column.unwrap_or_default(), s.filter_category.unwrap_or_default());
        s.sort_column = Some(view.0);
        s.filter_category = Some(view.1);
    });
    view
}

async fn index(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<ListParams>,
) -> AppResult<Html<String>> {
    let (sort, filter) = resolve_view(&state.sessions, &ctx.token, &params);
    let books = state.catalog.list(sort, filter)?;
    Ok(Html(pages::render_index(&books, filter, sort, &user)))
}

async fn list_books(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Vec<Book>>> {
    let (sort, filter) = resolve_view(&state.sessions, &ctx.token, &params);
    let books = state.catalog.list(sort, filter)?;
    Ok(Json(books))
}

#[derive(Debug, Deserialize)]
struct SearchForm {
    #[serde(default)]
    search: String,
}

async fn search(State(state): State<AppState>, Form(form): Form<SearchForm>) -> AppResult<Json<Vec<SearchResult>>> {
    let results = state.classify.search_by_title(&form.search).await.map_err(|e| {
        warn!(query = %form.search, "search failed: {e}");
        e
    })?;
    debug!(query = %form.search, hits = results.len(), "search");
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
struct AddForm {
    #[serde(default)]
    id: String,
}

async fn add_book(State(state): State<AppState>, Form(form): Form<AddForm>) -> AppResult<Json<Book>> {
    let id = form.id.trim();
    if id.is_empty() {
        return Err(AppError::user("missing_id", "an external id is required"));
    }
    info!(id, "adding book");
    let work = state.classify.lookup_by_identifier(id).await.map_err(|e| {
        warn!(id, "lookup failed: {e}");
        e
    })?;
    let external_id = if work.external_id.is_empty() { id.to_string() } else { work.external_id };
    let book = state.catalog.insert(NewBook {
        title: work.title,
        author: work.author,
        classification: work.classification,
        external_id,
    })?;
    Ok(Json(book))
}

async fn delete_book(State(state): State<AppState>, Path(pk): Path<String>) -> AppResult<StatusCode> {
    let key: i64 = pk
        .trim()
        .parse()
        .map_err(|_| AppError::user("bad_key".to_string(), format!("'{pk}' is not a book key")))?;
    state.catalog.delete_by_key(key)?;
    Ok(StatusCode::OK)
}

async fn login_page() -> Html<String> {
    Html(pages::render_login(None))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    register: Option<String>,
}

fn authenticate(credentials: &CredentialStore, form: &LoginForm) -> Result<String, AuthError> {
    if form.register.is_some() {
        return Ok(credentials.register(&form.username, &form.password)?.username);
    }
    match credentials.verify(&form.username, &form.password)? {
        true => Ok(form.username.clone()),
        false => Err(AuthError::InvalidCredentials),
    }
}

async fn login(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Form(form): Form<LoginForm>,
) -> Response {
    // Password hashing and SQLite both block.
    let attempted = form.username.clone();
    let credentials = state.credentials.clone();
    let outcome = tokio::task::spawn_blocking(move || authenticate(&credentials, &form))
        .await
        .unwrap_or_else(|e| Err(AuthError::Store(StoreError::Unavailable(e.to_string()))));
    match outcome {
        Ok(username) => {
            let token = match state.sessions.rotate(&ctx.token) {
                Ok(t) => t,
                Err(e) => {
                    error!(username = %username, "cannot issue session: {e}");
                    return AppError::internal("session_unavailable".to_string(), e.to_string()).into_response();
                }
            };
            info!(username = %username, "login");
            state.sessions.update(&token, |s| s.user = Some(username));
            let mut resp = found("/");
            if let Some(v) = session_cookie(&token, state.cookie_secure) {
                resp.headers_mut().append(header::SET_COOKIE, v);
            }
            resp
        }
        Err(e) => {
            match &e {
                AuthError::Store(inner) => error!(username = %attempted, "login failed: {inner}"),
                _ => warn!(username = %attempted, "login rejected: {e}"),
            }
            let status = AppError::from(e.clone()).http_status();
            (status, Html(pages::render_login(Some(e.user_message())))).into_response()
        }
    }
}

async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    state.sessions.clear(&ctx.token);
    info!(user = %user, "logout");
    let mut resp = found("/login");
    resp.headers_mut().append(header::SET_COOKIE, expired_session_cookie(state.cookie_secure));
    resp
}
