//! Family A codec: channel/topic JSON (EdgeX-like), grounded on
//! `edgex_websocket.py::_process_websocket_message` and its
//! `_handle_ticker_update`/`_handle_orderbook_update` helpers.
//!
//! Wire shape: `{"type": "...", "channel": "ticker.<id>", "content": {...}}`.
//! Market data arrives wrapped in `type: "quote-event"`; account data in
//! `type: "trade-event"`. A manual ping/pong frame
//! (`{"type":"ping","time":N}` ↔ `{"type":"pong","time":N}`) rides
//! alongside the WebSocket-native control frames.

use chrono::Utc;
use serde_json::Value;

use super::{CodecEvent, Codec};
use crate::config::SubscriptionMode;
use crate::symbol::MetadataEntry;
use crate::types::{
    CanonicalSymbol, MarginMode, Order, OrderStatus, OrderType, Position, Side, Ticker, Trade, VenueId,
};

pub struct EdgeXCodec {
    venue: VenueId,
}

impl EdgeXCodec {
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: VenueId::new(venue.into()),
        }
    }

    fn handle_ticker(&self, contract_id: &str, content: &Value) -> Vec<CodecEvent> {
        let data = content.get("data").and_then(|d| d.as_array());
        let Some(entry) = data.and_then(|d| d.first()) else {
            return vec![];
        };

        let funding_rate = entry
            .get("fundingRate")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            // EdgeX reports a 4-hour rate; normalize to 8h (I-P8).
            .map(|rate| super::normalize_funding_rate_8h(rate, 4.0));

        let ticker = Ticker {
            venue: self.venue.clone(),
            // native symbol resolution happens in the session layer,
            // which knows the contract-id→canonical mapping; the codec
            // only tags the raw contract id here.
            symbol: crate::types::CanonicalSymbol::new(contract_id, "UNRESOLVED", "PERP"),
            last: parse_f64(entry, "lastPrice"),
            bid: parse_f64(entry, "bestBidPrice"),
            ask: parse_f64(entry, "bestAskPrice"),
            bid_size: None,
            ask_size: None,
            funding_rate,
            mark_price: parse_f64(entry, "indexPrice"),
            index_price: parse_f64(entry, "indexPrice"),
            open_interest: parse_f64(entry, "openInterest"),
            volume_24h: parse_f64(entry, "size"),
            exchange_timestamp: None,
            received_timestamp: Utc::now(),
        };
        vec![CodecEvent::Ticker(ticker)]
    }

    fn handle_depth(&self, contract_id: &str, content: &Value) -> Vec<CodecEvent> {
        let data = content.get("data").and_then(|d| d.as_array());
        let Some(entry) = data.and_then(|d| d.first()) else {
            return vec![];
        };

        let bids = parse_levels(entry.get("bids"));
        let asks = parse_levels(entry.get("asks"));
        let sequence = entry
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<u64>().ok());

        let depth_type = entry
            .get("depthType")
            .and_then(Value::as_str)
            .unwrap_or("CHANGED")
            .to_uppercase();

        let native_symbol = contract_id.to_string();
        if depth_type == "SNAPSHOT" {
            vec![CodecEvent::OrderBookSnapshot {
                native_symbol,
                bids,
                asks,
                sequence,
            }]
        } else {
            vec![CodecEvent::OrderBookDelta {
                native_symbol,
                bids,
                asks,
                sequence,
            }]
        }
    }

    fn handle_metadata(&self, content: &Value) -> Vec<CodecEvent> {
        let contracts = content
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|arr| arr.first())
            .and_then(|first| first.get("contractList"))
            .and_then(Value::as_array);

        let Some(contracts) = contracts else {
            return vec![];
        };

        let entries: Vec<MetadataEntry> = contracts
            .iter()
            .filter_map(|c| {
                let contract_id = c.get("contractId")?.as_str()?.parse::<i64>().ok()?;
                let contract_name = c.get("contractName")?.as_str()?;
                let (base, quote) = split_contract_name(contract_name)?;
                Some(MetadataEntry {
                    native_symbol: contract_id.to_string(),
                    contract_id: Some(contract_id),
                    base,
                    native_quote: quote,
                    kind: "PERP".to_string(),
                    price_decimals: None,
                })
            })
            .collect();

        vec![CodecEvent::SymbolMetadata(entries)]
    }

    /// Dispatches a `trade-event` private-channel payload. The venue
    /// folds order, position, and fill updates into one envelope
    /// (`_handle_user_data_update`); a payload can carry any subset of
    /// `order`/`position`/`orderFillTransaction`, so all three are
    /// checked independently rather than branching on `event_type`
    /// alone.
    fn handle_trade_event(&self, content: &Value) -> Vec<CodecEvent> {
        let event_data = content.get("data").cloned().unwrap_or(Value::Null);
        let mut events = Vec::new();

        if let Some(orders) = event_data.get("order").and_then(Value::as_array) {
            events.extend(orders.iter().filter_map(|o| self.decode_order(o)).map(CodecEvent::Order));
        }
        if let Some(positions) = event_data.get("position").and_then(Value::as_array) {
            events.extend(positions.iter().filter_map(|p| self.decode_position(p)).map(CodecEvent::Position));
        }
        if let Some(fills) = event_data.get("orderFillTransaction").and_then(Value::as_array) {
            events.extend(fills.iter().filter_map(|f| self.decode_trade(f)).map(CodecEvent::Trade));
        }

        events
    }

    fn decode_order(&self, order_info: &Value) -> Option<Order> {
        let order_id = order_info.get("id")?.as_str()?.to_string();
        let client_id = order_info.get("clientOrderId").and_then(Value::as_str).map(String::from);
        let contract_id = order_info.get("contractId").and_then(Value::as_str).unwrap_or("UNKNOWN");

        let side = match order_info.get("side").and_then(Value::as_str) {
            Some("SELL") => Side::Sell,
            _ => Side::Buy,
        };
        let order_type = match order_info.get("type").and_then(Value::as_str) {
            Some("MARKET") => OrderType::Market,
            _ => OrderType::Limit,
        };

        let price = parse_f64(order_info, "price");
        let amount = parse_f64(order_info, "size").unwrap_or(0.0);
        let filled = parse_f64(order_info, "cumMatchSize").unwrap_or(0.0);
        let remaining = (amount - filled).max(0.0);

        let raw_status = order_info.get("status").and_then(Value::as_str).unwrap_or("OPEN").to_string();
        let status = match raw_status.as_str() {
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "OPEN" | "PENDING" | "CANCELING" | "UNTRIGGERED" => OrderStatus::Open,
            _ => OrderStatus::Unknown,
        };

        Some(Order {
            venue: self.venue.clone(),
            order_id,
            client_id,
            symbol: CanonicalSymbol::new(contract_id, "UNRESOLVED", "PERP"),
            side,
            order_type,
            amount,
            price,
            filled,
            remaining,
            average: if filled > 0.0 { price } else { None },
            status,
            raw_status,
            created_at: None,
            updated_at: Utc::now(),
        })
    }

    /// Ports `_convert_position_entry`'s direction-correction fix
    /// (spec.md §3/P9): `openSize`'s sign is taken at face value first,
    /// then overridden when `longTermCount`/`shortTermCount` disagree
    /// with it — the venue has been observed to report a positive
    /// `openSize` for what `longTermCount == 0 && shortTermCount > 0`
    /// shows is actually a short.
    fn decode_position(&self, pos_info: &Value) -> Option<Position> {
        let contract_id = pos_info.get("contractId").and_then(Value::as_str)?;
        let mut size_raw = parse_f64(pos_info, "openSize").or_else(|| parse_f64(pos_info, "size")).unwrap_or(0.0);
        if size_raw == 0.0 {
            return None;
        }

        let long_count = pos_info.get("longTermCount").and_then(Value::as_i64).unwrap_or(0);
        let short_count = pos_info.get("shortTermCount").and_then(Value::as_i64).unwrap_or(0);

        if size_raw > 0.0 && long_count == 0 && short_count > 0 {
            size_raw = -size_raw;
        } else if size_raw < 0.0 && short_count == 0 && long_count > 0 {
            size_raw = size_raw.abs();
        }

        let entry_price = parse_f64(pos_info, "entryPrice").unwrap_or(0.0);
        let margin_mode = match pos_info.get("marginMode").and_then(Value::as_str) {
            Some(s) if s.eq_ignore_ascii_case("isolated") => MarginMode::Isolated,
            _ => MarginMode::Cross,
        };

        Some(Position {
            venue: self.venue.clone(),
            symbol: CanonicalSymbol::new(contract_id, "UNRESOLVED", "PERP"),
            size: size_raw,
            entry_price,
            unrealized_pnl: parse_f64(pos_info, "unRealizedPnl").unwrap_or(0.0),
            realized_pnl: parse_f64(pos_info, "realizedPnl").unwrap_or(0.0),
            leverage: pos_info.get("leverage").and_then(Value::as_f64).unwrap_or(1.0),
            margin_mode,
            liquidation_price: parse_f64(pos_info, "liquidationPrice").filter(|p| *p != 0.0),
            updated_at: Utc::now(),
        })
    }

    fn decode_trade(&self, fill: &Value) -> Option<Trade> {
        let trade_id = fill.get("id").and_then(Value::as_str)?.to_string();
        let contract_id = fill.get("contractId").and_then(Value::as_str).unwrap_or("UNKNOWN");
        let side = match fill.get("side").and_then(Value::as_str) {
            Some("SELL") => Side::Sell,
            _ => Side::Buy,
        };

        Some(Trade {
            venue: self.venue.clone(),
            symbol: CanonicalSymbol::new(contract_id, "UNRESOLVED", "PERP"),
            trade_id,
            price: parse_f64(fill, "price").unwrap_or(0.0),
            size: parse_f64(fill, "fillSize").or_else(|| parse_f64(fill, "size")).unwrap_or(0.0),
            side,
            exchange_timestamp: None,
        })
    }
}

impl Codec for EdgeXCodec {
    fn decode(&self, frame: &str) -> Vec<CodecEvent> {
        let Ok(value) = serde_json::from_str::<Value>(frame) else {
            return vec![];
        };

        let msg_type = value.get("type").and_then(Value::as_str).unwrap_or("");

        match msg_type {
            "connected" | "subscribed" | "ping" => vec![CodecEvent::Control],
            "error" => {
                let message = value
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                vec![CodecEvent::VenueError {
                    code: String::new(),
                    message,
                }]
            }
            "quote-event" => {
                let channel = value.get("channel").and_then(Value::as_str).unwrap_or("");
                let content = value.get("content").cloned().unwrap_or(Value::Null);

                if let Some(id) = channel.strip_prefix("ticker.") {
                    self.handle_ticker(id, &content)
                } else if channel.starts_with("depth.") {
                    let id = channel.split('.').nth(1).unwrap_or("");
                    self.handle_depth(id, &content)
                } else if channel == "metadata" {
                    self.handle_metadata(&content)
                } else {
                    vec![]
                }
            }
            "trade-event" => {
                let content = value.get("content").cloned().unwrap_or(Value::Null);
                self.handle_trade_event(&content)
            }
            _ => vec![],
        }
    }

    fn pong_reply(&self, ping_frame: &str) -> Option<String> {
        let value: Value = serde_json::from_str(ping_frame).ok()?;
        if value.get("type").and_then(Value::as_str) != Some("ping") {
            return None;
        }
        let time = value.get("time").cloned().unwrap_or(Value::Null);
        Some(serde_json::json!({"type": "pong", "time": time}).to_string())
    }

    /// `metadata` is always subscribed; per-symbol `ticker.<id>`/
    /// `depth.<id>.15` channels follow the resolved native symbols
    /// (contract ids), gated on the matching `SubscriptionMode::Predefined`
    /// toggle; `userData` is subscribed once when the mode asks for it
    /// (`edgex_websocket.py`'s subscribe-frame literals).
    fn subscribe_frames(&self, mode: &SubscriptionMode, resolved: &[(String, String)]) -> Vec<String> {
        let SubscriptionMode::Predefined { ticker, orderbook, user_data, .. } = mode else {
            return vec![frame("metadata")];
        };

        let mut frames = vec![frame("metadata")];
        for (_, native_symbol) in resolved {
            if *ticker {
                frames.push(frame(&format!("ticker.{native_symbol}")));
            }
            if *orderbook {
                frames.push(frame(&format!("depth.{native_symbol}.15")));
            }
        }
        if *user_data {
            frames.push(frame("userData"));
        }
        frames
    }
}

fn frame(channel: &str) -> String {
    serde_json::json!({"type": "subscribe", "channel": channel}).to_string()
}

fn parse_f64(entry: &Value, key: &str) -> Option<f64> {
    entry.get(key).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

fn parse_levels(levels: Option<&Value>) -> Vec<(f64, f64)> {
    let Some(arr) = levels.and_then(Value::as_array) else {
        return vec![];
    };
    arr.iter()
        .filter_map(|level| {
            let pair = level.as_array()?;
            let price: f64 = pair.first()?.as_str()?.parse().ok()?;
            let size: f64 = pair.get(1)?.as_str()?.parse().ok()?;
            Some((price, size))
        })
        .collect()
}

/// `BTC_USDT` -> `("BTC", "USDT")`; EdgeX contract names are
/// underscore-delimited base/quote pairs.
fn split_contract_name(name: &str) -> Option<(String, String)> {
    let mut parts = name.splitn(2, '_');
    let base = parts.next()?.to_string();
    let quote = parts.next()?.to_string();
    Some((base, quote))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_frame_produces_matching_pong() {
        let codec = EdgeXCodec::new("edgex");
        let pong = codec.pong_reply(r#"{"type":"ping","time":12345}"#).unwrap();
        assert_eq!(pong, r#"{"time":12345,"type":"pong"}"#);
    }

    #[test]
    fn control_frames_decode_to_control_event() {
        let codec = EdgeXCodec::new("edgex");
        let events = codec.decode(r#"{"type":"subscribed","channel":"ticker.10001"}"#);
        assert!(matches!(events.as_slice(), [CodecEvent::Control]));
    }

    #[test]
    fn ticker_event_applies_funding_rate_doubling() {
        let codec = EdgeXCodec::new("edgex");
        let frame = r#"{
            "type": "quote-event",
            "channel": "ticker.10001",
            "content": {"data": [{"lastPrice": "50000", "fundingRate": "0.0001", "bestBidPrice": "49999", "bestAskPrice": "50001"}]}
        }"#;
        let events = codec.decode(frame);
        match &events[0] {
            CodecEvent::Ticker(t) => {
                assert_eq!(t.funding_rate, Some(0.0002));
                assert_eq!(t.last, Some(50000.0));
            }
            _ => panic!("expected ticker event"),
        }
    }

    #[test]
    fn depth_snapshot_vs_delta_dispatch_on_depth_type() {
        let codec = EdgeXCodec::new("edgex");
        let snapshot_frame = r#"{
            "type": "quote-event",
            "channel": "depth.10001.15",
            "content": {"data": [{"depthType": "SNAPSHOT", "bids": [["100.0","1.0"]], "asks": [["101.0","2.0"]]}]}
        }"#;
        let events = codec.decode(snapshot_frame);
        assert!(matches!(events.as_slice(), [CodecEvent::OrderBookSnapshot { .. }]));

        let delta_frame = r#"{
            "type": "quote-event",
            "channel": "depth.10001.15",
            "content": {"data": [{"depthType": "CHANGED", "bids": [["100.0","0"]], "asks": []}]}
        }"#;
        let events = codec.decode(delta_frame);
        assert!(matches!(events.as_slice(), [CodecEvent::OrderBookDelta { .. }]));
    }

    #[test]
    fn subscribe_frames_cover_metadata_ticker_depth_and_user_data() {
        let codec = EdgeXCodec::new("edgex");
        let mode = SubscriptionMode::Predefined {
            symbols: vec!["BTC-USDC-PERP".into()],
            ticker: true,
            orderbook: true,
            trades: false,
            user_data: true,
        };
        let frames = codec.subscribe_frames(&mode, &[("BTC-USDC-PERP".into(), "10001".into())]);
        assert!(frames.contains(&frame("metadata")));
        assert!(frames.contains(&frame("ticker.10001")));
        assert!(frames.contains(&frame("depth.10001.15")));
        assert!(frames.contains(&frame("userData")));
    }

    #[test]
    fn position_direction_is_corrected_when_term_counts_disagree() {
        let codec = EdgeXCodec::new("edgex");
        // openSize is reported positive but longTermCount=0/shortTermCount=1
        // means this is actually a short (P9 correction).
        let pos_info = serde_json::json!({
            "contractId": "10001",
            "openSize": "5.0",
            "longTermCount": 0,
            "shortTermCount": 1,
            "entryPrice": "50000"
        });
        let position = codec.decode_position(&pos_info).unwrap();
        assert!(!position.is_long());
        assert_eq!(position.size, -5.0);
    }

    #[test]
    fn position_direction_is_trusted_when_term_counts_agree() {
        let codec = EdgeXCodec::new("edgex");
        let pos_info = serde_json::json!({
            "contractId": "10001",
            "openSize": "5.0",
            "longTermCount": 1,
            "shortTermCount": 0,
            "entryPrice": "50000"
        });
        let position = codec.decode_position(&pos_info).unwrap();
        assert!(position.is_long());
        assert_eq!(position.size, 5.0);
    }

    #[test]
    fn trade_event_dispatches_orders_positions_and_fills_independently() {
        let codec = EdgeXCodec::new("edgex");
        let frame_text = r#"{
            "type": "trade-event",
            "content": {
                "event": "ORDER_UPDATE",
                "data": {
                    "order": [{"id": "1", "contractId": "10001", "side": "BUY", "type": "LIMIT", "price": "100", "size": "1", "cumMatchSize": "0", "status": "OPEN"}],
                    "position": [{"contractId": "10001", "openSize": "2.0", "longTermCount": 1, "shortTermCount": 0, "entryPrice": "100"}],
                    "orderFillTransaction": [{"id": "f1", "contractId": "10001", "side": "BUY", "price": "100", "fillSize": "1"}]
                }
            }
        }"#;
        let events = codec.decode(frame_text);
        assert!(events.iter().any(|e| matches!(e, CodecEvent::Order(_))));
        assert!(events.iter().any(|e| matches!(e, CodecEvent::Position(_))));
        assert!(events.iter().any(|e| matches!(e, CodecEvent::Trade(_))));
    }

    #[test]
    fn metadata_frame_yields_symbol_entries() {
        let codec = EdgeXCodec::new("edgex");
        let frame = r#"{
            "type": "quote-event",
            "channel": "metadata",
            "content": {"data": [{"contractList": [{"contractId": "10001", "contractName": "BTC_USDT"}]}]}
        }"#;
        let events = codec.decode(frame);
        match &events[0] {
            CodecEvent::SymbolMetadata(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].base, "BTC");
                assert_eq!(entries[0].native_quote, "USDT");
            }
            _ => panic!("expected symbol metadata event"),
        }
    }
}
