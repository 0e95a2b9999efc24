//! End-to-end seed scenario: funding-rate normalization feeding the
//! cross-venue funding-spread detector.

use chrono::Utc;

use arb_collector::codec::normalize_funding_rate_8h;
use arb_collector::detector::{DetectorConfig, OpportunityDetector};
use arb_collector::types::{CanonicalSymbol, Ticker, VenueId};

fn ticker(venue: &str, funding_rate: f64) -> Ticker {
    Ticker {
        venue: VenueId::new(venue),
        symbol: CanonicalSymbol::new("BTC", "USDC", "PERP"),
        last: Some(50000.0),
        bid: Some(49999.0),
        ask: Some(50001.0),
        bid_size: Some(5.0),
        ask_size: Some(5.0),
        funding_rate: Some(funding_rate),
        mark_price: None,
        index_price: None,
        open_interest: None,
        volume_24h: None,
        exchange_timestamp: None,
        received_timestamp: Utc::now(),
    }
}

#[test]
fn venue_funding_rates_normalize_to_8h_before_spread_comparison() {
    // Venue A reports on a 4h cycle, venue B on an 8h cycle.
    let rate_a = normalize_funding_rate_8h(0.0001, 4.0);
    let rate_b = normalize_funding_rate_8h(0.00005, 8.0);
    assert!((rate_a - 0.0002).abs() < 1e-12);
    assert!((rate_b - 0.00005).abs() < 1e-12);

    let detector = OpportunityDetector::with_null_score_policy(DetectorConfig::default());
    let symbol = CanonicalSymbol::new("BTC", "USDC", "PERP");
    let tickers = vec![ticker("venue_a", rate_a), ticker("venue_b", rate_b)];

    let opps = detector.scan_funding_spreads(&symbol, &tickers);
    let opp = opps
        .iter()
        .find(|o| o.long_venue.as_str() == "venue_b" && o.short_venue.as_str() == "venue_a")
        .expect("expected a funding spread favoring long on venue_b (lower rate)");
    assert!((opp.spread - 0.00015).abs() < 1e-12);
}
