//! Runtime configuration, read from `BOOKSHELF_*` environment variables.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_CLASSIFY_URL: &str = "http://classify.oclc.org/classify2/Classify";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub http_port: u16,
    /// SQLite file holding the `books` and `users` tables.
    pub db_path: String,
    pub classify_url: String,
    pub classify_timeout: Duration,
    /// Idle time after which a session is treated as absent.
    pub session_ttl: Duration,
    pub cookie_secure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            http_port: 8080,
            db_path: "dev.db".to_string(),
            classify_url: DEFAULT_CLASSIFY_URL.to_string(),
            classify_timeout: Duration::from_secs(10),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            cookie_secure: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();
        if let Some(v) = lookup("BOOKSHELF_BIND") { cfg.bind = v; }
        if let Some(v) = lookup("BOOKSHELF_HTTP_PORT") {
            cfg.http_port = v.trim().parse().with_context(|| format!("BOOKSHELF_HTTP_PORT is not a port: {v}"))?;
        }
        if let Some(v) = lookup("BOOKSHELF_DB_PATH") { cfg.db_path = v; }
        if let Some(v) = lookup("BOOKSHELF_CLASSIFY_URL") { cfg.classify_url = v; }
        if let Some(v) = lookup("BOOKSHELF_CLASSIFY_TIMEOUT_SECS") {
            let secs: u64 = v.trim().parse().with_context(|| format!("BOOKSHELF_CLASSIFY_TIMEOUT_SECS is not a number: {v}"))?;
            cfg.classify_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("BOOKSHELF_SESSION_TTL_SECS") {
            let secs: u64 = v.trim().parse().with_context(|| format!("BOOKSHELF_SESSION_TTL_SECS is not a number: {v}"))?;
            cfg.session_ttl = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("BOOKSHELF_COOKIE_SECURE") {
            cfg.cookie_secure = parse_bool(&v).ok_or_else(|| anyhow!("BOOKSHELF_COOKIE_SECURE is not a boolean: {v}"))?;
        }
        Ok(cfg)
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_map(&[]).unwrap();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "dev.db");
        assert_eq!(cfg.classify_url, DEFAULT_CLASSIFY_URL);
        assert_eq!(cfg.classify_timeout, Duration::from_secs(10));
        assert!(!cfg.cookie_secure);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = from_map(&[
            ("BOOKSHELF_HTTP_PORT", "9090"),
            ("BOOKSHELF_DB_PATH", "/tmp/books.db"),
            ("BOOKSHELF_CLASSIFY_TIMEOUT_SECS", "3"),
            ("BOOKSHELF_COOKIE_SECURE", "yes"),
        ])
        .unwrap();
        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.db_path, "/tmp/books.db");
        assert_eq!(cfg.classify_timeout, Duration::from_secs(3));
        assert!(cfg.cookie_secure);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(from_map(&[("BOOKSHELF_HTTP_PORT", "eighty")]).is_err());
        assert!(from_map(&[("BOOKSHELF_COOKIE_SECURE", "maybe")]).is_err());
    }
}
