//! Family B codec: JSON-RPC-ish batch protocol (Lighter-like), grounded
//! on `lighter_websocket.py`'s `market_stats`/`order_book` channel
//! handling, `_parse_order_from_ws`'s compact abbreviated order fields,
//! and `send_tx_batch`'s `jsonapi/sendtxbatch` envelope.
//!
//! Wire shape differs from Family A: updates arrive as
//! `{"type": "update/<channel>", "<channel>": {...}}` (or
//! `subscribed/<channel>` for the initial push), and order fields are
//! single-letter keys (`i`, `u`, `is`, `rs`, `p`, `ia`, `st`) rather than
//! named ones — these need explicit per-market decimal scaling since
//! amounts/prices are transmitted as scaled integers. Order updates are
//! additionally deduplicated against a bounded recent-keys cache before
//! being forwarded, since the venue re-sends the last order state on
//! reconnect replay.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Codec, CodecEvent};
use crate::config::SubscriptionMode;
use crate::types::{
    BalanceEntry, CanonicalSymbol, MarginMode, Order, OrderStatus, OrderType, Position, Side, Ticker, VenueId,
};

/// Bounded count of recent order-update keys retained for duplicate
/// suppression (spec.md §4.5 P6). Sized well above any plausible
/// in-flight order count per venue.
const ORDER_DEDUP_CAPACITY: usize = 4096;

/// Tracks recently-forwarded `(order_id, client_id, filled)` keys so the
/// same order update — re-sent verbatim by the venue, e.g. after a
/// reconnect replay — is only forwarded once, grounded on the
/// `MessageDeduplicator` seen-cache used for redundant-connection
/// filtering elsewhere in the ecosystem.
struct OrderDedupCache {
    seen: HashSet<(String, Option<String>, u64)>,
    order: VecDeque<(String, Option<String>, u64)>,
    capacity: usize,
}

impl OrderDedupCache {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns `true` if `key` was already seen (duplicate); otherwise
    /// records it and returns `false`.
    fn check_and_insert(&mut self, key: (String, Option<String>, u64)) -> bool {
        if self.seen.contains(&key) {
            return true;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        false
    }
}

/// Per-market decimal scaling needed to interpret compact order fields
/// (spec.md §4.5 "Lighter decimal scaling"). `price_decimals` gives the
/// price multiplier (`10^price_decimals`); the amount multiplier is
/// derived as `10^(6 - price_decimals)` to match the venue's fixed
/// 6-decimal base-amount budget.
#[derive(Debug, Clone, Copy)]
pub struct MarketScale {
    pub price_decimals: u32,
}

impl MarketScale {
    fn price_divisor(&self) -> f64 {
        10f64.powi(self.price_decimals as i32)
    }

    fn amount_divisor(&self) -> f64 {
        10f64.powi(6 - self.price_decimals as i32)
    }
}

pub struct LighterCodec {
    venue: VenueId,
    market_scales: Mutex<HashMap<i64, MarketScale>>,
    order_dedup: Mutex<OrderDedupCache>,
}

impl LighterCodec {
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: VenueId::new(venue.into()),
            market_scales: Mutex::new(HashMap::new()),
            order_dedup: Mutex::new(OrderDedupCache::new(ORDER_DEDUP_CAPACITY)),
        }
    }

    pub fn register_market_scale(&self, market_index: i64, scale: MarketScale) {
        self.market_scales.lock().insert(market_index, scale);
    }

    fn handle_market_stats(&self, market_index: &str, stats: &Value) -> Vec<CodecEvent> {
        let funding_rate = stats
            .get("current_funding_rate")
            .and_then(Value::as_f64)
            // Lighter reports an hourly rate; normalize to 8h (I-P8).
            .map(|rate| super::normalize_funding_rate_8h(rate, 1.0));

        let ticker = Ticker {
            venue: self.venue.clone(),
            symbol: CanonicalSymbol::new(market_index, "UNRESOLVED", "PERP"),
            last: stats.get("last_trade_price").and_then(Value::as_f64),
            bid: stats.get("best_bid_price").and_then(Value::as_f64),
            ask: stats.get("best_ask_price").and_then(Value::as_f64),
            bid_size: None,
            ask_size: None,
            funding_rate,
            mark_price: stats.get("mark_price").and_then(Value::as_f64),
            index_price: stats.get("index_price").and_then(Value::as_f64),
            open_interest: stats.get("open_interest").and_then(Value::as_f64),
            volume_24h: stats.get("daily_base_token_volume").and_then(Value::as_f64),
            exchange_timestamp: None,
            received_timestamp: Utc::now(),
        };
        vec![CodecEvent::Ticker(ticker)]
    }

    fn handle_order_book(&self, market_index: &str, payload: &Value) -> Vec<CodecEvent> {
        let bids = parse_levels(payload.get("bids"));
        let asks = parse_levels(payload.get("asks"));
        let native_symbol = market_index.to_string();

        // Lighter pushes full depth on every update; treat as a
        // snapshot replacement rather than a delta (matches the
        // teacher's python client, which replaces its local book
        // wholesale per `order_book` message rather than patching it).
        vec![CodecEvent::OrderBookSnapshot {
            native_symbol,
            bids,
            asks,
            sequence: None,
        }]
    }

    /// Decodes one compact order record. If `m` is present and a scale has
    /// been registered for that market, amounts/price are descaled through
    /// it; otherwise the record is still forwarded with amounts taken at
    /// face value and the symbol left as `"UNKNOWN"`, matching
    /// `_parse_order_from_ws`'s behavior of degrading gracefully rather
    /// than dropping the order outright when market metadata hasn't
    /// arrived yet.
    fn decode_order(&self, order_info: &Value) -> Option<Order> {
        let order_index = order_info.get("i")?.as_i64()?;
        let client_index = order_info.get("u").and_then(Value::as_i64);
        let market_index = order_info.get("m").and_then(Value::as_i64);

        let registered_scale =
            market_index.and_then(|idx| self.market_scales.lock().get(&idx).copied());

        let (amount_divisor, price_divisor) = match registered_scale {
            Some(scale) => (scale.amount_divisor(), scale.price_divisor()),
            None => (1.0, 1.0),
        };
        let native_symbol = market_index
            .map(|idx| idx.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let initial_raw = order_info.get("is").and_then(Value::as_f64).unwrap_or(0.0);
        let remaining_raw = order_info.get("rs").and_then(Value::as_f64).unwrap_or(0.0);
        let price_raw = order_info.get("p").and_then(Value::as_f64).unwrap_or(0.0);

        let amount = initial_raw / amount_divisor;
        let remaining = remaining_raw / amount_divisor;
        let filled = (amount - remaining).max(0.0);
        let price = price_raw / price_divisor;

        let is_ask = order_info.get("ia").and_then(Value::as_i64).unwrap_or(0) != 0;
        let side = if is_ask { Side::Sell } else { Side::Buy };

        let status_code = order_info.get("st").and_then(Value::as_i64).unwrap_or(1);
        let status = match status_code {
            2 => OrderStatus::Filled,
            0 => OrderStatus::Canceled,
            1 | 3 => OrderStatus::Open,
            _ => OrderStatus::Pending,
        };

        Some(Order {
            venue: self.venue.clone(),
            order_id: order_index.to_string(),
            client_id: client_index.map(|c| c.to_string()),
            symbol: CanonicalSymbol::new(native_symbol.as_str(), "UNRESOLVED", "PERP"),
            side,
            order_type: OrderType::Limit,
            amount,
            price: Some(price),
            filled,
            remaining,
            average: if filled > 0.0 && price > 0.0 { Some(price) } else { None },
            status,
            raw_status: status_code.to_string(),
            created_at: None,
            updated_at: Utc::now(),
        })
    }

    /// Ports `_parse_positions`'s direction rule (spec.md §3/P9): a
    /// `"sign"` field (1 = Long, -1 = Short) is authoritative when
    /// present; the raw `position` field's own sign is only used as a
    /// fallback when `sign` is absent or unparseable.
    fn decode_position(&self, market_index: &str, position_info: &Value) -> Option<Position> {
        let size_raw = parse_numeric(position_info.get("position")).unwrap_or(0.0);
        if size_raw == 0.0 {
            return None;
        }

        let is_long = match position_info.get("sign").and_then(Value::as_i64) {
            Some(sign) => sign >= 0,
            None => size_raw > 0.0,
        };
        let size = if is_long { size_raw.abs() } else { -size_raw.abs() };

        Some(Position {
            venue: self.venue.clone(),
            symbol: CanonicalSymbol::new(market_index, "UNRESOLVED", "PERP"),
            size,
            entry_price: parse_numeric(position_info.get("avg_entry_price")).unwrap_or(0.0),
            unrealized_pnl: parse_numeric(position_info.get("unrealized_pnl")).unwrap_or(0.0),
            realized_pnl: parse_numeric(position_info.get("realized_pnl")).unwrap_or(0.0),
            // Lighter positions are always 1x leverage, cross-margined.
            leverage: 1.0,
            margin_mode: MarginMode::Cross,
            liquidation_price: parse_numeric(position_info.get("liquidation_price")),
            updated_at: Utc::now(),
        })
    }

    fn handle_positions(&self, positions_data: &Value) -> Vec<CodecEvent> {
        let Some(map) = positions_data.as_object() else {
            return vec![];
        };
        map.iter()
            .filter_map(|(market_index, info)| self.decode_position(market_index, info))
            .map(CodecEvent::Position)
            .collect()
    }

    /// Ports `_update_balance_from_stats`: Lighter's account is
    /// single-currency (USDC), `used` is the portion of total equity not
    /// currently available.
    fn handle_user_stats(&self, stats: &Value) -> Vec<CodecEvent> {
        let available = parse_numeric(stats.get("available_balance")).unwrap_or(0.0);
        let total = parse_numeric(stats.get("portfolio_value")).unwrap_or(0.0);

        vec![CodecEvent::Balance(BalanceEntry {
            venue: self.venue.clone(),
            currency: "USDC".to_string(),
            free: available,
            used: (total - available).max(0.0),
            total,
            usd_value: Some(total),
            updated_at: Utc::now(),
        })]
    }
}

/// Extracts the market index from either channel spelling variant the
/// venue uses interchangeably (`order_book:0` and `order_book/0`).
fn extract_market_index(channel: &str) -> Option<&str> {
    channel.split([':', '/']).nth(1)
}

/// Parses a value the venue may send as either a JSON number or a
/// decimal string (`Decimal(str(x))` on the Python side tolerates both).
fn parse_numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_levels(levels: Option<&Value>) -> Vec<(f64, f64)> {
    let Some(arr) = levels.and_then(Value::as_array) else {
        return vec![];
    };
    arr.iter()
        .filter_map(|level| {
            let price = level.get("price").and_then(Value::as_str)?.parse().ok()?;
            let size = level.get("size").and_then(Value::as_str)?.parse().ok()?;
            Some((price, size))
        })
        .collect()
}

impl Codec for LighterCodec {
    fn decode(&self, frame: &str) -> Vec<CodecEvent> {
        let Ok(value) = serde_json::from_str::<Value>(frame) else {
            return vec![];
        };

        let msg_type = value.get("type").and_then(Value::as_str).unwrap_or("");

        if msg_type.contains("market_stats") {
            let channel = value
                .get("channel")
                .and_then(Value::as_str)
                .unwrap_or("");
            let market_index = extract_market_index(channel).unwrap_or("");
            return value
                .get("market_stats")
                .map(|stats| self.handle_market_stats(market_index, stats))
                .unwrap_or_default();
        }

        if msg_type.contains("order_book") {
            let channel = value
                .get("channel")
                .and_then(Value::as_str)
                .unwrap_or("");
            let market_index = extract_market_index(channel).unwrap_or("");
            return value
                .get("order_book")
                .map(|ob| self.handle_order_book(market_index, ob))
                .unwrap_or_default();
        }

        if msg_type.contains("account_all_positions") {
            let positions_data = value.get("positions").cloned().unwrap_or(Value::Null);
            return self.handle_positions(&positions_data);
        }

        if msg_type.contains("user_stats") {
            return value
                .get("stats")
                .map(|stats| self.handle_user_stats(stats))
                .unwrap_or_default();
        }

        if msg_type.contains("orders") {
            let orders = value.get("orders").and_then(Value::as_array);
            return orders
                .map(|arr| {
                    arr.iter()
                        .filter_map(|o| self.decode_order(o))
                        .filter(|order| {
                            !self.order_dedup.lock().check_and_insert(order.dedup_key())
                        })
                        .map(CodecEvent::Order)
                        .collect()
                })
                .unwrap_or_default();
        }

        if let Some(error) = value.get("error") {
            let code = error
                .get("code")
                .map(|c| c.to_string())
                .unwrap_or_default();
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return vec![CodecEvent::VenueError { code, message }];
        }

        vec![]
    }

    /// Public `market_stats`/`order_book` channels follow the resolved
    /// native symbols (market indices); account channels
    /// (`account_all_orders`/`account_all`/`user_stats`) need an
    /// account index and auth token the codec doesn't have, so those are
    /// sent from the private-session path instead (`session::auth`).
    fn subscribe_frames(&self, mode: &SubscriptionMode, resolved: &[(String, String)]) -> Vec<String> {
        let SubscriptionMode::Predefined { ticker, orderbook, .. } = mode else {
            return Vec::new();
        };

        let mut frames = Vec::new();
        for (_, market_index) in resolved {
            if *ticker {
                frames.push(channel_subscribe(&format!("market_stats/{market_index}")));
            }
            if *orderbook {
                frames.push(channel_subscribe(&format!("order_book/{market_index}")));
            }
        }
        frames
    }

    fn configure_market_scale(&self, contract_id: i64, price_decimals: u32) {
        self.register_market_scale(contract_id, MarketScale { price_decimals });
    }

    /// Account-wide channels (`_send_account_subscriptions`): each needs
    /// `account_index` appended to the channel path and the fresh auth
    /// token attached as a top-level field.
    fn private_subscribe_frames(&self, account_index: Option<i64>, auth_token: &str) -> Vec<String> {
        let Some(account_index) = account_index else {
            return Vec::new();
        };
        ["account_all_orders", "account_all", "account_all_positions", "user_stats"]
            .iter()
            .map(|channel| {
                serde_json::json!({
                    "type": "subscribe",
                    "channel": format!("{channel}/{account_index}"),
                    "auth": auth_token,
                })
                .to_string()
            })
            .collect()
    }
}

fn channel_subscribe(channel: &str) -> String {
    serde_json::json!({"type": "subscribe", "channel": channel}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_stats_applies_hourly_to_8h_funding_normalization() {
        let codec = LighterCodec::new("lighter");
        let frame = r#"{
            "type": "update/market_stats",
            "channel": "market_stats/0",
            "market_stats": {"last_trade_price": 50000.0, "current_funding_rate": 0.0001}
        }"#;
        let events = codec.decode(frame);
        match &events[0] {
            CodecEvent::Ticker(t) => assert!((t.funding_rate.unwrap() - 0.0008).abs() < 1e-12),
            _ => panic!("expected ticker"),
        }
    }

    #[test]
    fn order_book_channel_accepts_both_colon_and_slash_spelling() {
        assert_eq!(extract_market_index("order_book:7"), Some("7"));
        assert_eq!(extract_market_index("order_book/7"), Some("7"));
    }

    #[test]
    fn compact_order_fields_decode_with_registered_scale() {
        let codec = LighterCodec::new("lighter");
        codec.register_market_scale(0, MarketScale { price_decimals: 1 });
        let order_info = serde_json::json!({
            "i": 123456, "u": 42, "m": 0,
            "is": 1_000_000i64, "rs": 400_000i64,
            "p": 5000u32, "ia": 0, "st": 1
        });
        let order = codec.decode_order(&order_info).unwrap();
        assert_eq!(order.order_id, "123456");
        assert_eq!(order.client_id.as_deref(), Some("42"));
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.status, OrderStatus::Open);
        assert!((order.price.unwrap() - 500.0).abs() < 1e-9);
        assert!((order.filled - 6.0).abs() < 1e-9);
    }

    #[test]
    fn unregistered_market_scale_forwards_order_unscaled() {
        let codec = LighterCodec::new("lighter");
        let order_info = serde_json::json!({"i": 1, "m": 99, "p": 100, "is": 10, "rs": 5});
        let order = codec.decode_order(&order_info).unwrap();
        assert_eq!(order.amount, 10.0);
        assert_eq!(order.remaining, 5.0);
        assert_eq!(order.filled, 5.0);
    }

    #[test]
    fn order_update_without_market_index_still_decodes_unscaled() {
        // spec.md §8 scenario 5's literal payload carries no "m" field.
        let codec = LighterCodec::new("lighter");
        let order_info = serde_json::json!({
            "i": 1001, "u": 42, "is": 10000, "rs": 4000, "p": 412700, "ia": 0, "st": 1
        });
        let order = codec.decode_order(&order_info).unwrap();
        assert_eq!(order.order_id, "1001");
        assert_eq!(order.client_id.as_deref(), Some("42"));
        assert_eq!(order.filled, 6000.0);
        assert_eq!(order.remaining, 4000.0);
        assert_eq!(order.status, OrderStatus::Open);
    }

    #[test]
    fn subscribe_frames_cover_market_stats_and_order_book_per_resolved_market() {
        let codec = LighterCodec::new("lighter");
        let mode = SubscriptionMode::Predefined {
            symbols: vec!["BTC-USDC-PERP".into()],
            ticker: true,
            orderbook: true,
            trades: false,
            user_data: true,
        };
        let frames = codec.subscribe_frames(&mode, &[("BTC-USDC-PERP".into(), "0".into())]);
        assert!(frames.contains(&channel_subscribe("market_stats/0")));
        assert!(frames.contains(&channel_subscribe("order_book/0")));
    }

    #[test]
    fn private_subscribe_frames_carry_account_index_and_auth_token() {
        let codec = LighterCodec::new("lighter");
        let frames = codec.private_subscribe_frames(Some(7), "tok-abc");
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().any(|f| f.contains("account_all_positions/7") && f.contains("tok-abc")));
        assert!(frames.iter().any(|f| f.contains("user_stats/7")));
    }

    #[test]
    fn private_subscribe_frames_empty_without_account_index() {
        let codec = LighterCodec::new("lighter");
        assert!(codec.private_subscribe_frames(None, "tok").is_empty());
    }

    #[test]
    fn configure_market_scale_registers_it_for_later_order_decoding() {
        let codec = LighterCodec::new("lighter");
        codec.configure_market_scale(0, 1);
        let order_info = serde_json::json!({
            "i": 1, "m": 0, "is": 1_000_000i64, "rs": 400_000i64, "p": 5000u32, "ia": 0, "st": 1
        });
        let order = codec.decode_order(&order_info).unwrap();
        assert!((order.price.unwrap() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn position_sign_field_overrides_raw_position_value() {
        let codec = LighterCodec::new("lighter");
        // position is positive but sign says short.
        let pos_info = serde_json::json!({"position": 5.0, "sign": -1, "avg_entry_price": 100.0});
        let position = codec.decode_position("0", &pos_info).unwrap();
        assert!(!position.is_long());
        assert_eq!(position.size, -5.0);
    }

    #[test]
    fn position_falls_back_to_raw_sign_when_sign_field_absent() {
        let codec = LighterCodec::new("lighter");
        let pos_info = serde_json::json!({"position": -3.0, "avg_entry_price": 100.0});
        let position = codec.decode_position("0", &pos_info).unwrap();
        assert!(!position.is_long());
        assert_eq!(position.size, -3.0);
    }

    #[test]
    fn account_all_positions_frame_yields_position_events() {
        let codec = LighterCodec::new("lighter");
        let frame = r#"{
            "type": "update/account_all_positions",
            "positions": {"0": {"position": 2.0, "sign": 1, "avg_entry_price": 100.0}}
        }"#;
        let events = codec.decode(frame);
        assert!(matches!(events.as_slice(), [CodecEvent::Position(_)]));
    }

    #[test]
    fn user_stats_frame_yields_usdc_balance_event() {
        let codec = LighterCodec::new("lighter");
        let frame = r#"{
            "type": "update/user_stats",
            "stats": {"portfolio_value": "1000", "available_balance": "400"}
        }"#;
        let events = codec.decode(frame);
        match &events[0] {
            CodecEvent::Balance(b) => {
                assert_eq!(b.currency, "USDC");
                assert_eq!(b.free, 400.0);
                assert_eq!(b.total, 1000.0);
                assert_eq!(b.used, 600.0);
            }
            _ => panic!("expected balance event"),
        }
    }

    #[test]
    fn repeated_order_frame_is_forwarded_only_once() {
        let codec = LighterCodec::new("lighter");
        codec.register_market_scale(0, MarketScale { price_decimals: 1 });
        let frame = r#"{
            "type": "update/orders",
            "orders": [{"i": 1, "u": 1, "m": 0, "is": 100, "rs": 100, "p": 500, "ia": 0, "st": 1}]
        }"#;

        let first = codec.decode(frame);
        assert_eq!(first.len(), 1);

        let second = codec.decode(frame);
        assert!(second.is_empty(), "identical order update forwarded twice");
    }

    #[test]
    fn order_update_with_changed_fill_is_not_suppressed() {
        let codec = LighterCodec::new("lighter");
        codec.register_market_scale(0, MarketScale { price_decimals: 1 });
        let unfilled = r#"{
            "type": "update/orders",
            "orders": [{"i": 1, "u": 1, "m": 0, "is": 100, "rs": 100, "p": 500, "ia": 0, "st": 1}]
        }"#;
        let partially_filled = r#"{
            "type": "update/orders",
            "orders": [{"i": 1, "u": 1, "m": 0, "is": 100, "rs": 40, "p": 500, "ia": 0, "st": 1}]
        }"#;

        assert_eq!(codec.decode(unfilled).len(), 1);
        assert_eq!(codec.decode(partially_filled).len(), 1);
    }
}
