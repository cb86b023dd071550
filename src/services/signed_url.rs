//! src/services/signed_url.rs
//!
//! Time-limited download links signed with HMAC-SHA256.
//!
//! A link carries the object handle, an absolute expiry in epoch milliseconds
//! and `base64url(HMAC(secret, "{handle}:{expiry}"))` without padding. Nothing
//! is stored server side: verification recomputes the MAC.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signing secret must not be empty")]
    EmptySecret,
    #[error("signing secret rejected by HMAC")]
    InvalidKey,
}

/// Issues and verifies signed download URLs.
#[derive(Clone)]
pub struct SignedUrlIssuer {
    /// HMAC keyed once with the secret and cloned per signature.
    keyed: HmacSha256,

    /// Public origin the links point at, without trailing slash.
    base_url: String,
}

impl SignedUrlIssuer {
    pub fn new(secret: &[u8], base_url: impl Into<String>) -> Result<Self, SignerError> {
        if secret.is_empty() {
            return Err(SignerError::EmptySecret);
        }
        let keyed = HmacSha256::new_from_slice(secret).map_err(|_| SignerError::InvalidKey)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { keyed, base_url })
    }

    /// Build a link for `handle` valid for `ttl` from now.
    pub fn issue(&self, handle: &str, display_name: &str, ttl: Duration) -> String {
        self.issue_at(handle, display_name, ttl, now_millis())
    }

    pub fn issue_at(&self, handle: &str, display_name: &str, ttl: Duration, now_ms: i64) -> String {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires = now_ms.saturating_add(ttl_ms);
        let signature = self.sign(handle, expires);

        format!(
            "{}/local-download/{}?expires={}&signature={}&filename={}",
            self.base_url,
            handle,
            expires,
            signature,
            urlencoding::encode(display_name)
        )
    }

    /// Check a link's parameters against the current clock.
    ///
    /// Expired and forged links both return `false`; callers must not
    /// distinguish them.
    pub fn verify(&self, handle: &str, expires: i64, signature: &str) -> bool {
        self.verify_at(handle, expires, signature, now_millis())
    }

    pub fn verify_at(&self, handle: &str, expires: i64, signature: &str, now_ms: i64) -> bool {
        if now_ms > expires {
            return false;
        }
        let Ok(provided) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        self.mac(handle, expires).verify_slice(&provided).is_ok()
    }

    /// `base64url(HMAC(secret, "{handle}:{expires}"))`, unpadded.
    pub fn sign(&self, handle: &str, expires: i64) -> String {
        URL_SAFE_NO_PAD.encode(self.mac(handle, expires).finalize().into_bytes())
    }

    fn mac(&self, handle: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(handle.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        mac
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
