//! Configuration surface (§6.3). No YAML/file parsing here — that's an
//! explicit Non-goal; these types are built in code or filled from
//! environment variables the way `SessionConfig::from_env` does it in the
//! teacher repo.

use std::env;
use std::time::Duration;

/// Which wire family a venue speaks — selects the codec the session
/// layer hands frames to (`codec::edgex` or `codec::lighter`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFamily {
    EdgeXLike,
    LighterLike,
}

/// How a venue session decides which symbols to track.
#[derive(Debug, Clone)]
pub enum SubscriptionMode {
    /// Explicit list of canonical symbols plus a per-kind toggle.
    Predefined {
        symbols: Vec<String>,
        ticker: bool,
        orderbook: bool,
        trades: bool,
        user_data: bool,
    },
    /// Discover symbols from the venue's metadata channel at connect time.
    Dynamic,
}

/// Per-venue configuration (§6.3).
#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub venue: String,
    pub codec_family: CodecFamily,
    pub rest_url: String,
    pub public_ws_url: String,
    pub private_ws_url: Option<String>,
    pub testnet: bool,
    pub verify_ssl: bool,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub account_index: Option<i64>,
    pub l1_address: Option<String>,
    pub stark_private_key: Option<String>,
    pub subscription_mode: SubscriptionMode,
    pub use_websocket_balances: bool,
    pub balance_rest_interval_secs: Option<u64>,
    /// Non-default heartbeat/backoff tuning; `None` fields fall back to
    /// `SessionConfig::default()` in `session::SessionConfig`.
    pub session_overrides: SessionOverrides,
}

impl VenueConfig {
    /// A venue is authenticated iff it carries either an API-key/secret
    /// pair or an L1 address + stark key (§6.3 "presence selects mode").
    pub fn is_authenticated(&self) -> bool {
        (self.api_key.is_some() && self.api_secret.is_some())
            || (self.l1_address.is_some() && self.stark_private_key.is_some())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionOverrides {
    pub data_silence_timeout: Option<Duration>,
    pub manual_ping_threshold: Option<Duration>,
    pub heartbeat_check_interval: Option<Duration>,
}

/// Top-level configuration for the collector, one `VenueConfig` per venue.
#[derive(Debug, Clone, Default)]
pub struct CollectorConfig {
    pub venues: Vec<VenueConfig>,
    pub orderbook_queue_capacity: usize,
    pub ticker_queue_capacity: usize,
    pub analysis_queue_capacity: usize,
}

impl CollectorConfig {
    pub fn from_env_defaults() -> Self {
        Self {
            venues: Vec::new(),
            orderbook_queue_capacity: env_or("ARB_ORDERBOOK_QUEUE_CAPACITY", 500),
            ticker_queue_capacity: env_or("ARB_TICKER_QUEUE_CAPACITY", 200),
            analysis_queue_capacity: env_or("ARB_ANALYSIS_QUEUE_CAPACITY", 200),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_detection() {
        let mut cfg = VenueConfig {
            venue: "edgex".into(),
            codec_family: CodecFamily::EdgeXLike,
            rest_url: "https://x".into(),
            public_ws_url: "wss://x".into(),
            private_ws_url: None,
            testnet: false,
            verify_ssl: true,
            api_key: None,
            api_secret: None,
            account_index: None,
            l1_address: None,
            stark_private_key: None,
            subscription_mode: SubscriptionMode::Dynamic,
            use_websocket_balances: true,
            balance_rest_interval_secs: None,
            session_overrides: SessionOverrides::default(),
        };
        assert!(!cfg.is_authenticated());
        cfg.api_key = Some("k".into());
        cfg.api_secret = Some("s".into());
        assert!(cfg.is_authenticated());
    }
}
