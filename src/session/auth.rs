//! Private-channel authentication (spec.md §4.4 "Auth").
//!
//! Two venue auth shapes, selected by which credentials a `VenueConfig`
//! carries (`config::VenueConfig::is_authenticated`):
//!
//! - A long-lived API key/secret pair signs an HMAC token once per
//!   connect; the signature never expires mid-session.
//! - A short-lived token (`lighter_websocket.py::_create_auth_token`,
//!   `SignerClient.DEFAULT_10_MIN_AUTH_EXPIRY`) must be regenerated on
//!   every reconnect and is only valid for ten minutes.

use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CollectorError;

type HmacSha256 = Hmac<Sha256>;

/// Ten minutes, matching `SignerClient.DEFAULT_10_MIN_AUTH_EXPIRY`.
pub const SHORT_LIVED_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// Produces the credential a venue session attaches to its private
/// channel subscribe/login frame.
pub trait PrivateAuth: Send + Sync {
    /// Generates (or reuses) a token valid for the upcoming connection.
    /// Called once per connect attempt; implementations that don't
    /// expire just recompute the same signature cheaply.
    fn token(&mut self) -> Result<String, CollectorError>;
}

/// Long-lived HMAC-signed key auth (no mid-session expiry).
pub struct ApiKeyAuth {
    venue: String,
    api_key: String,
    api_secret: String,
}

impl ApiKeyAuth {
    pub fn new(venue: impl Into<String>, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    fn sign(&self, timestamp_ms: u64) -> Result<String, CollectorError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).map_err(|e| {
            CollectorError::AuthFailed {
                venue: self.venue.clone(),
                reason: e.to_string(),
            }
        })?;
        mac.update(format!("{}{}", self.api_key, timestamp_ms).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl PrivateAuth for ApiKeyAuth {
    fn token(&mut self) -> Result<String, CollectorError> {
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let signature = self.sign(timestamp_ms)?;
        Ok(format!("{}:{}:{}", self.api_key, timestamp_ms, signature))
    }
}

/// Short-lived token auth. Tracks its own issuance time so a caller can
/// ask `needs_refresh` instead of blindly regenerating on every
/// heartbeat tick; a fresh token is still always pulled on reconnect.
pub struct EphemeralTokenAuth<F> {
    venue: String,
    generator: F,
    issued_at: Option<Instant>,
    cached: Option<String>,
}

impl<F> EphemeralTokenAuth<F>
where
    F: FnMut() -> Result<String, CollectorError> + Send + Sync,
{
    pub fn new(venue: impl Into<String>, generator: F) -> Self {
        Self {
            venue: venue.into(),
            generator,
            issued_at: None,
            cached: None,
        }
    }

    pub fn needs_refresh(&self) -> bool {
        match self.issued_at {
            None => true,
            Some(issued) => issued.elapsed() >= SHORT_LIVED_TOKEN_TTL,
        }
    }
}

impl<F> PrivateAuth for EphemeralTokenAuth<F>
where
    F: FnMut() -> Result<String, CollectorError> + Send + Sync,
{
    fn token(&mut self) -> Result<String, CollectorError> {
        if self.needs_refresh() {
            let token = (self.generator)().map_err(|_| CollectorError::AuthFailed {
                venue: self.venue.clone(),
                reason: "token generation failed".into(),
            })?;
            self.cached = Some(token);
            self.issued_at = Some(Instant::now());
        }
        self.cached
            .clone()
            .ok_or_else(|| CollectorError::AuthFailed {
                venue: self.venue.clone(),
                reason: "no token available".into(),
            })
    }
}
