//! Price State Store: latest ticker per (symbol, venue), drained from
//! the ticker queue and joined across venues by the Analysis Worker
//! whenever an `AnalysisSignal` arrives for that symbol (spec.md §4.6).
//!
//! Shaped the same way as `symbol.rs`'s registry snapshot — a plain
//! `RwLock`-guarded map is enough here since updates are per-entry
//! (one venue's ticker at a time) rather than whole-map replacements,
//! so there's no torn-read hazard an `ArcSwap` would be solving.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{CanonicalSymbol, Ticker, VenueId};

#[derive(Default)]
pub struct PriceStateStore {
    by_symbol: RwLock<HashMap<CanonicalSymbol, HashMap<VenueId, Ticker>>>,
}

impl PriceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `ticker` as the latest view for its (symbol, venue) pair.
    pub fn update(&self, ticker: Ticker) {
        self.by_symbol
            .write()
            .entry(ticker.symbol.clone())
            .or_default()
            .insert(ticker.venue.clone(), ticker);
    }

    /// Every venue's current ticker for `symbol`, in no particular order.
    pub fn tickers_for(&self, symbol: &CanonicalSymbol) -> Vec<Ticker> {
        self.by_symbol
            .read()
            .get(symbol)
            .map(|venues| venues.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ticker(venue: &str, symbol: &CanonicalSymbol) -> Ticker {
        Ticker {
            venue: VenueId::new(venue),
            symbol: symbol.clone(),
            last: Some(100.0),
            bid: Some(99.5),
            ask: Some(100.5),
            bid_size: None,
            ask_size: None,
            funding_rate: None,
            mark_price: None,
            index_price: None,
            open_interest: None,
            volume_24h: None,
            exchange_timestamp: None,
            received_timestamp: Utc::now(),
        }
    }

    #[test]
    fn updates_from_different_venues_accumulate_for_the_same_symbol() {
        let store = PriceStateStore::new();
        let symbol = CanonicalSymbol::new("BTC", "USDC", "PERP");
        store.update(ticker("edgex", &symbol));
        store.update(ticker("lighter", &symbol));

        let tickers = store.tickers_for(&symbol);
        assert_eq!(tickers.len(), 2);
    }

    #[test]
    fn a_second_update_from_the_same_venue_replaces_not_duplicates() {
        let store = PriceStateStore::new();
        let symbol = CanonicalSymbol::new("BTC", "USDC", "PERP");
        store.update(ticker("edgex", &symbol));
        store.update(ticker("edgex", &symbol));

        assert_eq!(store.tickers_for(&symbol).len(), 1);
    }

    #[test]
    fn unknown_symbol_yields_empty_not_a_panic() {
        let store = PriceStateStore::new();
        let symbol = CanonicalSymbol::new("DOGE", "USDC", "PERP");
        assert!(store.tickers_for(&symbol).is_empty());
    }
}
