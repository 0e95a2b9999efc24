//! Shared data model: canonical symbols, tickers, orders, positions, balances.
//!
//! Types here are venue-agnostic. Venue peculiarities (field aliases, unit
//! conversions, id formats) are resolved by the codecs in `codec/` before a
//! value of one of these types is ever constructed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `BASE-QUOTE-KIND`, uppercase, hyphen-delimited, e.g. `BTC-USDC-PERP`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalSymbol(String);

impl CanonicalSymbol {
    /// Builds a canonical symbol from its three parts, uppercasing them.
    pub fn new(base: &str, quote: &str, kind: &str) -> Self {
        Self(format!(
            "{}-{}-{}",
            base.to_uppercase(),
            quote.to_uppercase(),
            kind.to_uppercase()
        ))
    }

    /// Parses an already-canonical string, rejecting anything that isn't
    /// uppercase hyphen-delimited `BASE-QUOTE-KIND`.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        if s != s.to_uppercase() {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn base(&self) -> &str {
        self.0.split('-').next().unwrap_or_default()
    }
}

impl fmt::Display for CanonicalSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a venue by a short lowercase slug (`"edgex"`, `"lighter"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VenueId(String);

impl VenueId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-(venue, symbol) ticker view. `funding_rate` is always the 8-hour
/// equivalent regardless of the venue's native reporting period (I-P8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub venue: VenueId,
    pub symbol: CanonicalSymbol,
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    /// 8-hour-normalized funding rate.
    pub funding_rate: Option<f64>,
    pub mark_price: Option<f64>,
    pub index_price: Option<f64>,
    pub open_interest: Option<f64>,
    pub volume_24h: Option<f64>,
    pub exchange_timestamp: Option<DateTime<Utc>>,
    pub received_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    StopLimit,
    StopMarket,
    TakeProfitLimit,
    TakeProfitMarket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Canceled,
    Rejected,
    Expired,
    Unknown,
}

impl OrderStatus {
    /// Terminal statuses move the order into the short-TTL cache (§3,
    /// "Lifecycles") instead of staying in the live-order table.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// A venue order identified by its venue-assigned id; the client-supplied
/// id (if any) is also kept so either can be used as a lookup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub venue: VenueId,
    pub order_id: String,
    pub client_id: Option<String>,
    pub symbol: CanonicalSymbol,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: f64,
    pub price: Option<f64>,
    pub filled: f64,
    pub remaining: f64,
    pub average: Option<f64>,
    pub status: OrderStatus,
    pub raw_status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Key used for the dedup LRU in codecs (§4.5, P6): same
    /// `(order_id, client_id, filled)` must be suppressed.
    pub fn dedup_key(&self) -> (String, Option<String>, u64) {
        (
            self.order_id.clone(),
            self.client_id.clone(),
            self.filled.to_bits(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// Per-(venue, symbol) position. `size` is signed: positive is long.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub venue: VenueId,
    pub symbol: CanonicalSymbol,
    pub size: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub leverage: f64,
    pub margin_mode: MarginMode,
    pub liquidation_price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }
}

/// Per-(venue, currency) balance. `total` reflects account equity
/// (includes unrealized PnL where the venue exposes it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub venue: VenueId,
    pub currency: String,
    pub free: f64,
    pub used: f64,
    pub total: f64,
    pub usd_value: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub venue: VenueId,
    pub symbol: CanonicalSymbol,
    pub trade_id: String,
    pub price: f64,
    pub size: f64,
    pub side: Side,
    pub exchange_timestamp: Option<DateTime<Utc>>,
}
