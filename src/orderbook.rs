//! Order-Book Engine (C3, spec.md §4.3).
//!
//! One `OrderBook` per (venue, symbol). Bid/ask sides are `BTreeMap`s
//! keyed so iteration already yields best-to-worst order (bids
//! descending via `Reverse`, asks ascending natively) — the same
//! invariant `scrapers/polymarket_book_store.rs` gets from keeping its
//! `Vec<PriceLevel>` sorted on every mutation, but without the O(n)
//! insert/remove shuffle. A fully-built book is published behind
//! `ArcSwap` so readers never see a half-applied delta.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use tracing::warn;

/// Total-ordering wrapper for prices. Prices are always finite, so
/// `partial_cmp` never returns `None`; this lets a `BTreeMap` key on
/// `f64` without pulling in a crate just for that.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceKey(f64);

impl Eq for PriceKey {}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Lifecycle of a single order book (spec.md §4.3 "States").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookState {
    /// No snapshot or delta applied yet.
    Empty,
    /// At least one delta applied without a snapshot (tolerant mode), or
    /// a snapshot was received but hasn't produced a valid top-of-book.
    Building,
    /// Has a valid, non-crossed top-of-book.
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: BookState,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub sequence: Option<u64>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            state: BookState::Empty,
            bids: Vec::new(),
            asks: Vec::new(),
            sequence: None,
        }
    }

    /// A book is crossed when its best bid is at or above its best ask
    /// (spec.md §4.3 "Invariant: never crossed").
    pub fn is_crossed(&self) -> bool {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// Mid price, `None` until both sides have at least one level.
    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b.price + a.price) / 2.0),
            _ => None,
        }
    }
}

/// Per-book configuration (spec.md §9 "missing-snapshot tolerance").
#[derive(Debug, Clone)]
pub struct OrderBookConfig {
    /// Validate sequence/version monotonicity and reset on a gap.
    pub enable_sequence_validation: bool,
    /// When true, a delta arriving before any snapshot is dropped and a
    /// resync is requested instead of seeding a partial book.
    pub require_snapshot: bool,
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self {
            enable_sequence_validation: true,
            require_snapshot: false,
        }
    }
}

struct MutableSides {
    bids: BTreeMap<Reverse<PriceKey>, f64>,
    asks: BTreeMap<PriceKey, f64>,
    last_sequence: Option<u64>,
    has_snapshot: bool,
}

impl MutableSides {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_sequence: None,
            has_snapshot: false,
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        let bids: Vec<PriceLevel> = self
            .bids
            .iter()
            .map(|(Reverse(p), s)| PriceLevel { price: p.0, size: *s })
            .collect();
        let asks: Vec<PriceLevel> = self
            .asks
            .iter()
            .map(|(p, s)| PriceLevel { price: p.0, size: *s })
            .collect();

        let state = if !self.has_snapshot && bids.is_empty() && asks.is_empty() {
            BookState::Empty
        } else if bids.is_empty() || asks.is_empty() {
            BookState::Building
        } else {
            BookState::Ready
        };

        Snapshot {
            state,
            bids,
            asks,
            sequence: self.last_sequence,
        }
    }
}

/// One order book for a (venue, symbol) pair. Cheap to clone the handle;
/// `current()` is a lock-free `ArcSwap` load.
pub struct OrderBook {
    config: OrderBookConfig,
    published: ArcSwap<Snapshot>,
    mutable: Mutex<MutableSides>,
}

/// Outcome of applying an update, used by callers to decide whether a
/// resubscribe/resync is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Rejected because it produced (or would have produced) a crossed
    /// book; the prior state is retained.
    RejectedCrossed,
    /// A sequence/version gap was detected; the book was reset to
    /// `Empty` and the caller should request a fresh snapshot.
    SequenceGapReset,
    /// Dropped because no snapshot has been applied yet and
    /// `require_snapshot` is set.
    AwaitingSnapshot,
}

impl OrderBook {
    pub fn new(config: OrderBookConfig) -> Self {
        Self {
            config,
            published: ArcSwap::from_pointee(Snapshot::empty()),
            mutable: Mutex::new(MutableSides::new()),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.published.load_full()
    }

    pub fn state(&self) -> BookState {
        self.current().state
    }

    /// Replaces both sides wholesale (spec.md §4.3 "Snapshot apply").
    pub fn apply_snapshot(&self, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>, sequence: Option<u64>) -> ApplyOutcome {
        let mut mutable = self.mutable.lock();

        let mut next = MutableSides::new();
        for level in &bids {
            next.bids.insert(Reverse(PriceKey(level.price)), level.size);
        }
        for level in &asks {
            next.asks.insert(PriceKey(level.price), level.size);
        }
        next.last_sequence = sequence;
        next.has_snapshot = true;

        let snapshot = next.to_snapshot();
        if snapshot.is_crossed() {
            warn!("received crossed book snapshot, keeping prior book");
            return ApplyOutcome::RejectedCrossed;
        }

        *mutable = next;
        self.published.store(Arc::new(snapshot));
        ApplyOutcome::Applied
    }

    /// Applies one (price, size) level change. `size == 0.0` removes the
    /// level, matching `apply_level_update`'s remove-on-zero-size rule.
    pub fn apply_delta(&self, side_is_bid: bool, price: f64, size: f64, sequence: Option<u64>) -> ApplyOutcome {
        let mut mutable = self.mutable.lock();

        if self.config.require_snapshot && !mutable.has_snapshot {
            return ApplyOutcome::AwaitingSnapshot;
        }

        if self.config.enable_sequence_validation {
            if let (Some(new_seq), Some(last_seq)) = (sequence, mutable.last_sequence) {
                if new_seq <= last_seq {
                    // stale/duplicate delta, ignore silently
                    return ApplyOutcome::Applied;
                }
                if new_seq > last_seq + 1 {
                    warn!(last_seq, new_seq, "order book sequence gap, resetting");
                    *mutable = MutableSides::new();
                    self.published.store(Arc::new(Snapshot::empty()));
                    return ApplyOutcome::SequenceGapReset;
                }
            }
        }

        // tolerant mode: first delta before any snapshot seeds a partial
        // book rather than being dropped (spec.md §9 default behavior).
        if side_is_bid {
            if size == 0.0 {
                mutable.bids.remove(&Reverse(PriceKey(price)));
            } else {
                mutable.bids.insert(Reverse(PriceKey(price)), size);
            }
        } else if size == 0.0 {
            mutable.asks.remove(&PriceKey(price));
        } else {
            mutable.asks.insert(PriceKey(price), size);
        }
        if let Some(seq) = sequence {
            mutable.last_sequence = Some(seq);
        }

        let snapshot = mutable.to_snapshot();
        if snapshot.is_crossed() {
            warn!(price, size, is_bid = side_is_bid, "delta produced crossed book, rejecting");
            // undo by rebuilding from the previously published snapshot
            let prior = self.published.load();
            *mutable = from_snapshot(&prior);
            return ApplyOutcome::RejectedCrossed;
        }

        self.published.store(Arc::new(snapshot));
        ApplyOutcome::Applied
    }

    /// Applies a batch of deltas as a unit; a single sequence check
    /// covers the whole batch (spec.md §4.3 "Delta batch").
    pub fn apply_delta_batch(&self, deltas: &[(bool, f64, f64)], sequence: Option<u64>) -> ApplyOutcome {
        let mut mutable = self.mutable.lock();

        if self.config.require_snapshot && !mutable.has_snapshot {
            return ApplyOutcome::AwaitingSnapshot;
        }

        if self.config.enable_sequence_validation {
            if let (Some(new_seq), Some(last_seq)) = (sequence, mutable.last_sequence) {
                if new_seq <= last_seq {
                    return ApplyOutcome::Applied;
                }
                if new_seq > last_seq + 1 {
                    warn!(last_seq, new_seq, "order book sequence gap in batch, resetting");
                    *mutable = MutableSides::new();
                    self.published.store(Arc::new(Snapshot::empty()));
                    return ApplyOutcome::SequenceGapReset;
                }
            }
        }

        for &(is_bid, price, size) in deltas {
            if is_bid {
                if size == 0.0 {
                    mutable.bids.remove(&Reverse(PriceKey(price)));
                } else {
                    mutable.bids.insert(Reverse(PriceKey(price)), size);
                }
            } else if size == 0.0 {
                mutable.asks.remove(&PriceKey(price));
            } else {
                mutable.asks.insert(PriceKey(price), size);
            }
        }
        if let Some(seq) = sequence {
            mutable.last_sequence = Some(seq);
        }

        let snapshot = mutable.to_snapshot();
        if snapshot.is_crossed() {
            warn!("delta batch produced crossed book, rejecting");
            // undo by rebuilding from the previously published snapshot,
            // matching `apply_delta`'s drop-the-update handling of a
            // crossed result rather than treating it as a sequence gap.
            let prior = self.published.load();
            *mutable = from_snapshot(&prior);
            return ApplyOutcome::RejectedCrossed;
        }

        self.published.store(Arc::new(snapshot));
        ApplyOutcome::Applied
    }
}

/// Owns one `OrderBook` per (venue, native_symbol), created lazily on
/// first touch. This is what lets the order-book ingest task in
/// `bin/collector.rs` apply snapshots/deltas somewhere real instead of
/// just logging that one arrived, and what backs
/// `OrderBookEngine.top_of_book` (spec.md §6.2).
pub struct OrderBookRegistry {
    config: OrderBookConfig,
    books: RwLock<HashMap<(String, String), Arc<OrderBook>>>,
}

impl OrderBookRegistry {
    pub fn new(config: OrderBookConfig) -> Self {
        Self {
            config,
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the book for `(venue, native_symbol)`, creating an empty
    /// one on first call.
    pub fn book_for(&self, venue: &str, native_symbol: &str) -> Arc<OrderBook> {
        let key = (venue.to_string(), native_symbol.to_string());
        if let Some(book) = self.books.read().get(&key) {
            return book.clone();
        }
        self.books
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(OrderBook::new(self.config.clone())))
            .clone()
    }

    /// `OrderBookEngine.top_of_book(venue, symbol) -> (bid, ask) | none`
    /// (spec.md §6.2). Returns `None` if no book exists yet for the pair
    /// or its book has no valid top-of-book.
    pub fn top_of_book(&self, venue: &str, native_symbol: &str) -> Option<(PriceLevel, PriceLevel)> {
        let key = (venue.to_string(), native_symbol.to_string());
        let book = self.books.read().get(&key)?.clone();
        let snapshot = book.current();
        Some((snapshot.best_bid()?, snapshot.best_ask()?))
    }
}

fn from_snapshot(snapshot: &Snapshot) -> MutableSides {
    let mut sides = MutableSides::new();
    for level in &snapshot.bids {
        sides.bids.insert(Reverse(PriceKey(level.price)), level.size);
    }
    for level in &snapshot.asks {
        sides.asks.insert(PriceKey(level.price), level.size);
    }
    sides.last_sequence = snapshot.sequence;
    sides.has_snapshot = !matches!(snapshot.state, BookState::Empty);
    sides
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: f64, size: f64) -> PriceLevel {
        PriceLevel { price, size }
    }

    #[test]
    fn snapshot_builds_ready_book_with_sorted_top_of_book() {
        let book = OrderBook::new(OrderBookConfig::default());
        let outcome = book.apply_snapshot(
            vec![level(100.0, 1.0), level(99.5, 2.0)],
            vec![level(100.5, 1.5), level(101.0, 3.0)],
            Some(1),
        );
        assert_eq!(outcome, ApplyOutcome::Applied);
        let snap = book.current();
        assert_eq!(snap.state, BookState::Ready);
        assert_eq!(snap.best_bid().unwrap().price, 100.0);
        assert_eq!(snap.best_ask().unwrap().price, 100.5);
        assert_eq!(snap.mid(), Some(100.25));
    }

    #[test]
    fn crossed_snapshot_is_rejected() {
        let book = OrderBook::new(OrderBookConfig::default());
        let outcome = book.apply_snapshot(vec![level(101.0, 1.0)], vec![level(100.0, 1.0)], Some(1));
        assert_eq!(outcome, ApplyOutcome::RejectedCrossed);
        assert_eq!(book.state(), BookState::Empty);
    }

    #[test]
    fn delta_updates_and_removes_levels() {
        let book = OrderBook::new(OrderBookConfig::default());
        book.apply_snapshot(vec![level(100.0, 1.0)], vec![level(101.0, 1.0)], Some(1));
        book.apply_delta(true, 100.0, 0.0, Some(2));
        let snap = book.current();
        assert!(snap.best_bid().is_none());
    }

    #[test]
    fn sequence_gap_resets_book() {
        let book = OrderBook::new(OrderBookConfig::default());
        book.apply_snapshot(vec![level(100.0, 1.0)], vec![level(101.0, 1.0)], Some(1));
        let outcome = book.apply_delta(true, 99.0, 1.0, Some(5));
        assert_eq!(outcome, ApplyOutcome::SequenceGapReset);
        assert_eq!(book.state(), BookState::Empty);
    }

    #[test]
    fn tolerant_mode_seeds_partial_book_without_snapshot() {
        let book = OrderBook::new(OrderBookConfig::default());
        book.apply_delta(true, 100.0, 1.0, None);
        assert_eq!(book.state(), BookState::Building);
    }

    #[test]
    fn crossed_delta_batch_is_rejected_not_reset() {
        let book = OrderBook::new(OrderBookConfig::default());
        book.apply_snapshot(vec![level(100.0, 1.0)], vec![level(101.0, 1.0)], Some(1));
        let outcome = book.apply_delta_batch(&[(true, 102.0, 1.0)], Some(2));
        assert_eq!(outcome, ApplyOutcome::RejectedCrossed);
        // the correctly-sequenced prior book survives, it is not wiped.
        let snap = book.current();
        assert_eq!(snap.state, BookState::Ready);
        assert_eq!(snap.best_bid().unwrap().price, 100.0);
        assert_eq!(snap.best_ask().unwrap().price, 101.0);
    }

    #[test]
    fn registry_creates_one_book_per_venue_and_symbol() {
        let registry = OrderBookRegistry::new(OrderBookConfig::default());
        let edgex_btc = registry.book_for("edgex", "10001");
        let lighter_btc = registry.book_for("lighter", "10001");
        assert!(!Arc::ptr_eq(&edgex_btc, &lighter_btc));

        let edgex_btc_again = registry.book_for("edgex", "10001");
        assert!(Arc::ptr_eq(&edgex_btc, &edgex_btc_again));
    }

    #[test]
    fn registry_top_of_book_reflects_applied_snapshot() {
        let registry = OrderBookRegistry::new(OrderBookConfig::default());
        assert!(registry.top_of_book("edgex", "10001").is_none());

        let book = registry.book_for("edgex", "10001");
        book.apply_snapshot(vec![level(100.0, 1.0)], vec![level(101.0, 1.0)], Some(1));

        let (bid, ask) = registry.top_of_book("edgex", "10001").unwrap();
        assert_eq!(bid.price, 100.0);
        assert_eq!(ask.price, 101.0);
    }

    #[test]
    fn require_snapshot_drops_deltas_before_first_snapshot() {
        let book = OrderBook::new(OrderBookConfig {
            enable_sequence_validation: true,
            require_snapshot: true,
        });
        let outcome = book.apply_delta(true, 100.0, 1.0, None);
        assert_eq!(outcome, ApplyOutcome::AwaitingSnapshot);
        assert_eq!(book.state(), BookState::Empty);
    }
}
