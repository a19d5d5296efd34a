//! Authentication module.
//!
//! Passwords are stored as salted SHA-256 hashes. Login issues an opaque
//! token kept in memory until it expires or the user logs out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::{Result, ServerError};

/// Hash a password with salt
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"foodgram-salt:");
    hasher.update(password.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    hash_password(password) == password_hash
}

/// An issued auth token
#[derive(Clone, Debug)]
pub struct Token {
    pub token: String,
    pub user_id: i32,
    pub expires_at: SystemTime,
}

impl Token {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a token that is unique for this process
fn generate_token(user_id: i32) -> String {
    let mut hasher = Sha256::new();

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    hasher.update(timestamp.to_le_bytes());
    hasher.update(TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(user_id.to_le_bytes());

    let thread_id = std::thread::current().id();
    hasher.update(format!("{:?}", thread_id).as_bytes());

    let result = hasher.finalize();
    URL_SAFE_NO_PAD.encode(&result[..30]) // 30 bytes = 40 chars
}

/// Longest lifetime a token may be issued with
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Authentication manager
pub struct AuthManager {
    tokens: RwLock<HashMap<String, Token>>,
    token_duration: Duration,
}

impl AuthManager {
    pub fn new(token_duration: Duration) -> Self {
        if token_duration > MAX_TOKEN_TTL {
            tracing::warn!(
                "Token lifetime {:?} exceeds the maximum, clamping to {:?}",
                token_duration,
                MAX_TOKEN_TTL
            );
        }
        Self {
            tokens: RwLock::new(HashMap::new()),
            token_duration: token_duration.min(MAX_TOKEN_TTL),
        }
    }

    /// Issue a fresh token for an already authenticated user
    pub fn issue_token(&self, user_id: i32) -> Token {
        let token = Token {
            token: generate_token(user_id),
            user_id,
            expires_at: SystemTime::now() + self.token_duration,
        };

        let mut tokens = self.tokens.write();
        tokens.insert(token.token.clone(), token.clone());
        tracing::debug!("Issued token for user {}", user_id);

        token
    }

    /// Validate a token and return its user id
    pub fn validate_token(&self, token_str: &str) -> Result<i32> {
        let tokens = self.tokens.read();
        let token = tokens.get(token_str).ok_or(ServerError::AuthRequired)?;

        if token.is_expired() {
            return Err(ServerError::AuthRequired);
        }

        Ok(token.user_id)
    }

    /// User id behind an `Authorization: Token <t>` or `Bearer <t>` header
    pub fn user_from_headers(&self, headers: &HeaderMap) -> Option<i32> {
        let auth_str = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let token = auth_str
            .strip_prefix("Token ")
            .or_else(|| auth_str.strip_prefix("Bearer "))?;
        self.validate_token(token.trim()).ok()
    }

    /// Like `user_from_headers`, but anonymous requests are rejected
    pub fn require_user(&self, headers: &HeaderMap) -> Result<i32> {
        self.user_from_headers(headers).ok_or(ServerError::AuthRequired)
    }

    /// Revoke the token presented in the headers
    pub fn revoke_from_headers(&self, headers: &HeaderMap) -> Result<()> {
        let auth_str = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(ServerError::AuthRequired)?;
        let token = auth_str
            .strip_prefix("Token ")
            .or_else(|| auth_str.strip_prefix("Bearer "))
            .ok_or(ServerError::AuthRequired)?;

        let mut tokens = self.tokens.write();
        tokens
            .remove(token.trim())
            .map(|_| ())
            .ok_or(ServerError::AuthRequired)
    }

    /// Cleanup expired tokens
    pub fn cleanup_expired_tokens(&self) {
        let mut tokens = self.tokens.write();
        tokens.retain(|_, t| !t.is_expired());
    }
}
