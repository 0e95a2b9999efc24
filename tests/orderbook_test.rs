//! End-to-end seed scenario: snapshot + delta + top-of-book.

use arb_collector::orderbook::{OrderBook, OrderBookConfig, PriceLevel};

fn level(price: f64, size: f64) -> PriceLevel {
    PriceLevel { price, size }
}

#[test]
fn snapshot_then_delta_yields_expected_top_of_book() {
    let book = OrderBook::new(OrderBookConfig::default());

    book.apply_snapshot(
        vec![level(50000.0, 1.0), level(49900.0, 2.0)],
        vec![level(50100.0, 0.5), level(50200.0, 1.5)],
        Some(1),
    );

    // bids: delete 50000, insert 50050,0.7; asks unchanged.
    book.apply_delta_batch(&[(true, 50000.0, 0.0), (true, 50050.0, 0.7)], Some(2));

    let snap = book.current();
    let best_bid = snap.best_bid().unwrap();
    let best_ask = snap.best_ask().unwrap();
    assert_eq!((best_bid.price, best_bid.size), (50050.0, 0.7));
    assert_eq!((best_ask.price, best_ask.size), (50100.0, 0.5));
}
