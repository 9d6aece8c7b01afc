//! Bearer-token verification for real-time connections.
//!
//! Tokens are `subject.expiry_unix.signature` where the signature is the
//! hex HMAC-SHA256 of `subject.expiry_unix` under the shared secret. The
//! subject may itself contain dots; the token is split from the right.

use chrono::{DateTime, Utc};
use std::fmt::Write;
use thiserror::Error;

/// Why a token was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

/// Verifies (and, for local tooling, mints) connection tokens against a
/// shared secret.
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify a token and return its subject.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the token is malformed, its signature
    /// does not match, or it has expired.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let mut parts = token.rsplitn(3, '.');
        let signature = parts.next().ok_or(AuthError::Malformed)?;
        let expiry = parts.next().ok_or(AuthError::Malformed)?;
        let subject = parts.next().ok_or(AuthError::Malformed)?;
        if subject.is_empty() {
            return Err(AuthError::Malformed);
        }

        let expiry_unix: i64 = expiry.parse().map_err(|_| AuthError::Malformed)?;

        let expected = sign(&format!("{subject}.{expiry}"), &self.secret);
        if !constant_time_compare(&expected, signature) {
            return Err(AuthError::BadSignature);
        }

        if expiry_unix < now.timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(subject.to_string())
    }

    /// Mint a token for `subject` valid for `ttl_secs` from `now`.
    #[must_use]
    pub fn mint(&self, subject: &str, ttl_secs: i64, now: DateTime<Utc>) -> String {
        let expiry = now.timestamp() + ttl_secs;
        let payload = format!("{subject}.{expiry}");
        let signature = sign(&payload, &self.secret);
        format!("{payload}.{signature}")
    }
}

fn sign(payload: &str, secret: &str) -> String {
    let mac = hmac_sha256::HMAC::mac(payload.as_bytes(), secret.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in mac {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Constant-time string comparison
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
