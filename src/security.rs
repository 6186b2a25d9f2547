//! Credential store: username/secret rows in the `users` table.
//!
//! Secrets are argon2 PHC strings with a fresh random salt per hash, stored as
//! bytes. Neither the secret nor the plaintext password ever leaves this module.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use rusqlite::{params, ErrorCode, OptionalExtension};
use tracing::{info, warn};

use crate::db::SharedDb;
use crate::error::{AuthError, StoreError};

/// A registered account. Carries no secret material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
}

fn hash_password(password: &str) -> Result<String, StoreError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &[u8], password: &str) -> bool {
    let Ok(hash) = std::str::from_utf8(hash) else { return false; };
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// Handle to the `users` table.
#[derive(Clone)]
pub struct CredentialStore {
    db: SharedDb,
}

impl CredentialStore {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Create an account. The hash is computed before the single INSERT, so a
    /// failure at either step leaves nothing behind.
    pub fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let secret = hash_password(password)?;
        let conn = self.db.lock();
        let res = conn.execute(
            "INSERT INTO users (username, secret) VALUES (?1, ?2)",
            params![username, secret.as_bytes()],
        );
        match res {
            Ok(_) => {
                info!(username, "registered user");
                Ok(User { username: username.to_string() })
            }
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                warn!(username, "registration rejected: username taken");
                Err(AuthError::AlreadyExists(username.to_string()))
            }
            Err(e) => Err(StoreError::from(e).into()),
        }
    }

    /// True iff the user exists and `password` matches the stored hash.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let secret: Option<Vec<u8>> = {
            let conn = self.db.lock();
            conn.query_row("SELECT secret FROM users WHERE username = ?1", params![username], |r| r.get(0))
                .optional()?
        };
        // Hash outside the connection lock; argon2 is deliberately slow.
        Ok(match secret {
            Some(hash) => verify_password(&hash, password),
            None => false,
        })
    }

    pub fn exists(&self, username: &str) -> Result<bool, StoreError> {
        let conn = self.db.lock();
        let found = conn
            .query_row("SELECT 1 FROM users WHERE username = ?1", params![username], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}
