//! Server-side session state keyed by an opaque cookie token.
//!
//! The browser only ever holds the token: 256 random bits, base64url. All
//! session fields stay in this process, so a client cannot alter them or guess
//! another client's token. A successful login moves the session onto a freshly
//! issued token, and logout drops the entry, so a token handed out before
//! login never becomes an authenticated one. Sessions expire after a
//! configurable idle period; expired entries are dropped lazily when touched or
//! when new sessions are issued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;
use tracing::debug;

use crate::catalog::{FilterCategory, SortColumn};
use crate::error::StoreError;

pub type SessionToken = String;

pub const SESSION_COOKIE: &str = "bookshelf_session";

/// Fields tracked per client. `user == None` means unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<String>,
    pub sort_column: Option<SortColumn>,
    pub filter_category: Option<FilterCategory>,
}

#[derive(Debug)]
struct SessionEntry {
    session: Session,
    last_seen: Instant,
}

/// Encode 32 bytes from `fill` as a token. A failing source is an error, never a fixed token.
fn token_from<F>(fill: F) -> Result<SessionToken, StoreError>
where
    F: FnOnce(&mut [u8]) -> Result<(), getrandom::Error>,
{
    let mut buf = [0u8; 32];
    fill(&mut buf).map_err(|e| StoreError::Unavailable(format!("session token: {e}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

fn gen_token() -> Result<SessionToken, StoreError> {
    token_from(getrandom::getrandom)
}

#[derive(Clone)]
pub struct SessionStore {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<SessionToken, SessionEntry>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Start an empty session and return its token.
    pub fn issue(&self) -> Result<SessionToken, StoreError> {
        self.issue_with(Session::default())
    }

    fn issue_with(&self, session: Session) -> Result<SessionToken, StoreError> {
        let token = gen_token()?;
        let now = Instant::now();
        let mut map = self.entries.write();
        map.retain(|_, e| now.duration_since(e.last_seen) < self.ttl);
        map.insert(token.clone(), SessionEntry { session, last_seen: now });
        debug!(live = map.len(), "session.issue");
        Ok(token)
    }

    /// Move the view state of `old` onto a new token and drop `old`.
    /// The new session starts without a user.
    pub fn rotate(&self, old: &str) -> Result<SessionToken, StoreError> {
        let prev = self.load(old);
        let token = self.issue_with(Session { user: None, ..prev })?;
        self.entries.write().remove(old);
        debug!("session.rotate");
        Ok(token)
    }

    /// True if the token names a live session; refreshes its idle timer.
    pub fn touch(&self, token: &str) -> bool {
        let now = Instant::now();
        let mut map = self.entries.write();
        let expired = match map.get_mut(token) {
            Some(e) if now.duration_since(e.last_seen) < self.ttl => {
                e.last_seen = now;
                return true;
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            map.remove(token);
        }
        false
    }

    /// Snapshot of the session; unknown or expired tokens read as empty.
    pub fn load(&self, token: &str) -> Session {
        let now = Instant::now();
        let map = self.entries.read();
        match map.get(token) {
            Some(e) if now.duration_since(e.last_seen) < self.ttl => e.session.clone(),
            _ => Session::default(),
        }
    }

    pub fn user(&self, token: &str) -> Option<String> {
        self.load(token).user
    }

    /// Mutate a session in place. Creates the entry if the token is unknown.
    pub fn update<F>(&self, token: &str, f: F)
    where
        F: FnOnce(&mut Session),
    {
        let now = Instant::now();
        let mut map = self.entries.write();
        let entry = map
            .entry(token.to_string())
            .or_insert_with(|| SessionEntry { session: Session::default(), last_seen: now });
        f(&mut entry.session);
        entry.last_seen = now;
    }

    /// Drop the session. The token is no longer live and reads as empty.
    pub fn clear(&self, token: &str) {
        self.entries.write().remove(token);
    }
}
