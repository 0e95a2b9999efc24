//! Message Codecs (C5, spec.md §4.5): translate one venue's wire JSON
//! into venue-agnostic `CodecEvent`s. Each venue family gets its own
//! module; both share this event enum and the `Codec` trait so the
//! fan-in pipeline (`pipeline.rs`) never needs to know which family a
//! frame came from.

pub mod edgex;
pub mod lighter;

use crate::config::SubscriptionMode;
use crate::types::{BalanceEntry, Order, Position, Ticker, Trade};

/// Raw frame a venue session hands to its codec. Text frames carry the
/// JSON payload; control frames are surfaced so the session can update
/// its heartbeat bookkeeping without re-parsing JSON.
#[derive(Debug, Clone)]
pub enum RawFrame {
    Text(String),
    Ping,
    Pong,
}

/// Normalized output of decoding one frame. A single frame can yield
/// zero, one, or many events (e.g. a metadata frame yields one event
/// per contract).
#[derive(Debug, Clone)]
pub enum CodecEvent {
    Ticker(Ticker),
    OrderBookSnapshot {
        native_symbol: String,
        bids: Vec<(f64, f64)>,
        asks: Vec<(f64, f64)>,
        sequence: Option<u64>,
    },
    OrderBookDelta {
        native_symbol: String,
        bids: Vec<(f64, f64)>,
        asks: Vec<(f64, f64)>,
        sequence: Option<u64>,
    },
    Trade(Trade),
    Order(Order),
    Position(Position),
    Balance(BalanceEntry),
    /// A metadata/contract-list frame, consumed by the symbol registry
    /// rather than forwarded to the pipeline.
    SymbolMetadata(Vec<crate::symbol::MetadataEntry>),
    /// Session-management frames the codec recognized but that carry no
    /// market/account data (connect ack, subscribe ack).
    Control,
    /// The venue reported an application error (spec.md §4.2 trigger).
    VenueError { code: String, message: String },
}

/// Implemented once per venue family. `decode` is pure and allocation-
/// light on the hot path; heavier normalization (funding-rate scaling,
/// symbol lookups) happens inline since it's cheap relative to a JSON
/// parse.
pub trait Codec: Send + Sync {
    /// Parses one text frame into zero or more normalized events.
    /// Unrecognized frames yield an empty vec rather than an error —
    /// an unknown frame shape is noise, not a caller-visible failure.
    fn decode(&self, frame: &str) -> Vec<CodecEvent>;

    /// Builds the pong reply frame for a venue's manual ping protocol,
    /// if the codec's family uses one (`None` for venues that use a
    /// native WebSocket ping/pong control frame instead).
    fn pong_reply(&self, ping_frame: &str) -> Option<String> {
        let _ = ping_frame;
        None
    }

    /// Builds the outbound subscribe frames for `mode`, given the
    /// `(canonical_symbol, native_symbol)` pairs the Symbol Registry has
    /// resolved so far (spec.md §4.4 "subscription replay"). Called once
    /// right after connect and again whenever the registry resolves more
    /// symbols (e.g. after a `SymbolMetadata` event); callers dedupe
    /// against what was already sent, so returning an already-sent frame
    /// again is harmless.
    fn subscribe_frames(&self, mode: &SubscriptionMode, resolved: &[(String, String)]) -> Vec<String> {
        let _ = (mode, resolved);
        Vec::new()
    }

    /// Registers the per-market decimal scale a venue's compact private
    /// order fields need to be descaled (spec.md §4.5 "Compact-field
    /// schema"). No-op for codecs whose wire format doesn't need one.
    fn configure_market_scale(&self, contract_id: i64, price_decimals: u32) {
        let _ = (contract_id, price_decimals);
    }

    /// Builds the subscribe frames a private (authenticated) connection
    /// sends in addition to `subscribe_frames` (spec.md §4.4 "for
    /// authenticated channels an additional `auth` field"). Default is
    /// empty for codecs whose private channels ride the same frames as
    /// the public connection (e.g. EdgeX's `userData`, already covered by
    /// `subscribe_frames` and authenticated at the connection level).
    fn private_subscribe_frames(&self, account_index: Option<i64>, auth_token: &str) -> Vec<String> {
        let _ = (account_index, auth_token);
        Vec::new()
    }
}

/// Normalizes a native funding-rate reporting period to its 8-hour
/// equivalent (spec.md §4.5, I-P8): EdgeX reports 4h, so ×2; a venue
/// reporting hourly would need ×8.
pub fn normalize_funding_rate_8h(native_rate: f64, native_period_hours: f64) -> f64 {
    native_rate * (8.0 / native_period_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funding_rate_normalization_matches_edgex_4h_doubling() {
        assert_eq!(normalize_funding_rate_8h(0.0001, 4.0), 0.0002);
    }

    #[test]
    fn funding_rate_normalization_matches_1h_octupling() {
        assert!((normalize_funding_rate_8h(0.0001, 1.0) - 0.0008).abs() < 1e-12);
    }
}
