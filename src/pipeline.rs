//! Fan-in Pipeline (C6, spec.md §4.6): collects normalized events from
//! every venue session onto three bounded queues and runs the Analysis
//! Worker that feeds the Opportunity Detector.
//!
//! Grounded on the channel fan-in shape in
//! `scrapers/polymarket_book_store.rs` (many producer tasks, one
//! consumer draining a bounded channel) and the single-consumer scan
//! loop in `arbitrage/engine.rs`. The one deliberate addition is
//! drop-oldest-on-saturation: spec.md §4.6 requires that a slow
//! consumer never stalls a venue session's heartbeat, so a full queue
//! drops its oldest entry instead of blocking the sender.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::CollectorConfig;
use crate::types::{CanonicalSymbol, Ticker};

/// A queued order-book update: venue + native symbol identify which
/// book it belongs to; `is_snapshot` tells the order-book ingest task
/// whether to call `apply_snapshot` or `apply_delta_batch`.
#[derive(Debug, Clone)]
pub struct OrderBookUpdate {
    pub venue: String,
    pub native_symbol: String,
    pub is_snapshot: bool,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
    pub sequence: Option<u64>,
}

/// A "something changed for this canonical symbol" notification (spec.md
/// §4.6): carries no payload of its own, the Analysis Worker re-reads
/// current state for `symbol` from the price state store when one
/// arrives.
#[derive(Debug, Clone)]
pub struct AnalysisSignal {
    pub symbol: CanonicalSymbol,
}

/// Bounded, drop-oldest-on-saturation queue (spec.md §4.6 "Backpressure
/// policy"). Wraps a `tokio::sync::mpsc` pair; `push` never awaits.
pub struct DropOldestQueue<T> {
    capacity: usize,
    sender: mpsc::Sender<T>,
    receiver: Mutex<Option<mpsc::Receiver<T>>>,
    dropped: std::sync::atomic::AtomicU64,
}

impl<T: Send + 'static> DropOldestQueue<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(capacity);
        Arc::new(Self {
            capacity,
            sender,
            receiver: Mutex::new(Some(receiver)),
            dropped: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Enqueues a value, dropping the single oldest queued value if the
    /// channel is at capacity rather than blocking the caller.
    pub fn push(&self, value: T) {
        match self.sender.try_send(value) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(value)) => {
                self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                warn!(capacity = self.capacity, "queue saturated, dropping oldest entry");
                // Drain one stale entry, then retry once; if it's still
                // full (another producer refilled it first) the new
                // value is dropped too rather than blocking.
                if let Some(receiver) = self.receiver.lock().as_mut() {
                    let _ = receiver.try_recv();
                }
                let _ = self.sender.try_send(value);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    pub fn take_receiver(&self) -> Option<mpsc::Receiver<T>> {
        self.receiver.lock().take()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Owns the three fan-in queues the venue sessions publish onto.
pub struct FanInPipeline {
    pub orderbook_queue: Arc<DropOldestQueue<OrderBookUpdate>>,
    pub ticker_queue: Arc<DropOldestQueue<Ticker>>,
    pub analysis_queue: Arc<DropOldestQueue<AnalysisSignal>>,
}

impl FanInPipeline {
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            orderbook_queue: DropOldestQueue::new(config.orderbook_queue_capacity),
            ticker_queue: DropOldestQueue::new(config.ticker_queue_capacity),
            analysis_queue: DropOldestQueue::new(config.analysis_queue_capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_beyond_capacity_drops_oldest_not_newest() {
        let queue: Arc<DropOldestQueue<i32>> = DropOldestQueue::new(2);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.dropped_count(), 1);

        let mut receiver = queue.take_receiver().unwrap();
        let first = receiver.try_recv().unwrap();
        let second = receiver.try_recv().unwrap();
        assert_eq!(first, 2);
        assert_eq!(second, 3);
    }

    #[test]
    fn push_under_capacity_never_drops() {
        let queue: Arc<DropOldestQueue<i32>> = DropOldestQueue::new(4);
        for i in 0..4 {
            queue.push(i);
        }
        assert_eq!(queue.dropped_count(), 0);
    }
}
