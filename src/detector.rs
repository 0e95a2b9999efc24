//! Opportunity Detector (C7, spec.md §4.7): scans paired venue tickers
//! for price-spread and funding-rate-spread arbitrage candidates.
//!
//! Shaped after `arbitrage/engine.rs`'s `scan_opportunities`/
//! `ArbitrageOpportunity` pair and `signals/detector.rs`'s `detect_*`
//! method style, retargeted from prediction-market yes/no spreads to
//! cross-venue perpetual price and funding spreads. The scoring-weight
//! formula the teacher hardcodes in `calculate_confidence` is left
//! unimplemented here (spec.md §9 Open Question): callers supply a
//! `ScorePolicy`, and the shipped `NullScorePolicy` leaves `score` at
//! `None` rather than fabricating a weighting scheme nobody specified.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::types::{CanonicalSymbol, Ticker, VenueId};

#[derive(Debug, Clone)]
pub struct PriceSpreadOpportunity {
    pub symbol: CanonicalSymbol,
    pub long_venue: VenueId,
    pub short_venue: VenueId,
    pub long_price: f64,
    pub short_price: f64,
    pub spread_bps: f64,
    pub score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FundingSpreadOpportunity {
    pub symbol: CanonicalSymbol,
    pub long_venue: VenueId,
    pub short_venue: VenueId,
    /// 8-hour-normalized rate on the venue you'd go long (pay less/earn more).
    pub long_funding_rate: f64,
    pub short_funding_rate: f64,
    pub spread: f64,
    pub score: Option<f64>,
}

/// Assigns a priority score to a detected spread. Left unimplemented by
/// design — the weighting formula across spread size, liquidity, and
/// venue reliability was never specified (spec.md §9).
pub trait ScorePolicy: Send + Sync {
    fn score_price_spread(&self, opp: &PriceSpreadOpportunity) -> Option<f64>;
    fn score_funding_spread(&self, opp: &FundingSpreadOpportunity) -> Option<f64>;
}

pub struct NullScorePolicy;

impl ScorePolicy for NullScorePolicy {
    fn score_price_spread(&self, _opp: &PriceSpreadOpportunity) -> Option<f64> {
        None
    }

    fn score_funding_spread(&self, _opp: &FundingSpreadOpportunity) -> Option<f64> {
        None
    }
}

/// Minimum bid/ask size, in base units, for a venue's side of a spread
/// to count as actionable (spec.md §4.7 "Liquidity gate").
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub min_price_spread_bps: f64,
    pub min_funding_spread: f64,
    pub min_liquidity_size: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_price_spread_bps: 5.0,
            min_funding_spread: 0.0001,
            min_liquidity_size: 0.0,
        }
    }
}

const LIQUIDITY_LOG_THROTTLE: Duration = Duration::from_secs(3);

pub struct OpportunityDetector {
    config: DetectorConfig,
    score_policy: Box<dyn ScorePolicy>,
    last_liquidity_log: std::sync::Mutex<Option<Instant>>,
}

impl OpportunityDetector {
    pub fn new(config: DetectorConfig, score_policy: Box<dyn ScorePolicy>) -> Self {
        Self {
            config,
            score_policy,
            last_liquidity_log: std::sync::Mutex::new(None),
        }
    }

    pub fn with_null_score_policy(config: DetectorConfig) -> Self {
        Self::new(config, Box::new(NullScorePolicy))
    }

    /// Scans every distinct venue pair for a given symbol's tickers and
    /// returns the price spreads clearing `min_price_spread_bps` and
    /// the liquidity gate.
    pub fn scan_price_spreads(&self, symbol: &CanonicalSymbol, tickers: &[Ticker]) -> Vec<PriceSpreadOpportunity> {
        let mut opportunities = Vec::new();

        for i in 0..tickers.len() {
            for j in 0..tickers.len() {
                if i == j {
                    continue;
                }
                let long = &tickers[i];
                let short = &tickers[j];

                let (Some(long_ask), Some(short_bid)) = (long.ask, short.bid) else {
                    continue;
                };
                if long_ask <= 0.0 {
                    continue;
                }

                let spread_bps = (short_bid - long_ask) / long_ask * 10_000.0;
                if spread_bps < self.config.min_price_spread_bps {
                    continue;
                }

                if !self.liquidity_sufficient(long.ask_size, short.bid_size) {
                    self.log_liquidity_throttled(symbol, &long.venue, &short.venue);
                    continue;
                }

                let mut opp = PriceSpreadOpportunity {
                    symbol: symbol.clone(),
                    long_venue: long.venue.clone(),
                    short_venue: short.venue.clone(),
                    long_price: long_ask,
                    short_price: short_bid,
                    spread_bps,
                    score: None,
                };
                opp.score = self.score_policy.score_price_spread(&opp);
                opportunities.push(opp);
            }
        }

        opportunities
    }

    /// Scans the same venue pairs for funding-rate spreads (both rates
    /// already normalized to 8h by the codecs, I-P8).
    pub fn scan_funding_spreads(&self, symbol: &CanonicalSymbol, tickers: &[Ticker]) -> Vec<FundingSpreadOpportunity> {
        let mut opportunities = Vec::new();

        for i in 0..tickers.len() {
            for j in 0..tickers.len() {
                if i == j {
                    continue;
                }
                let long = &tickers[i];
                let short = &tickers[j];

                let (Some(long_rate), Some(short_rate)) = (long.funding_rate, short.funding_rate) else {
                    continue;
                };

                // Going long where funding is lower (or negative) and
                // short where it's higher collects the spread.
                let spread = short_rate - long_rate;
                if spread < self.config.min_funding_spread {
                    continue;
                }

                let mut opp = FundingSpreadOpportunity {
                    symbol: symbol.clone(),
                    long_venue: long.venue.clone(),
                    short_venue: short.venue.clone(),
                    long_funding_rate: long_rate,
                    short_funding_rate: short_rate,
                    spread,
                    score: None,
                };
                opp.score = self.score_policy.score_funding_spread(&opp);
                opportunities.push(opp);
            }
        }

        opportunities
    }

    fn liquidity_sufficient(&self, ask_size: Option<f64>, bid_size: Option<f64>) -> bool {
        if self.config.min_liquidity_size <= 0.0 {
            return true;
        }
        match (ask_size, bid_size) {
            (Some(a), Some(b)) => a >= self.config.min_liquidity_size && b >= self.config.min_liquidity_size,
            _ => false,
        }
    }

    /// Logs at most once per 3 seconds regardless of how many pairs
    /// fail the liquidity gate in that window (spec.md §4.7 "Throttled
    /// logging"), so a thin book doesn't flood the log on every tick.
    fn log_liquidity_throttled(&self, symbol: &CanonicalSymbol, long_venue: &VenueId, short_venue: &VenueId) {
        let mut last = self.last_liquidity_log.lock().unwrap();
        let now = Instant::now();
        if last.map(|t| now.duration_since(t) >= LIQUIDITY_LOG_THROTTLE).unwrap_or(true) {
            warn!(%symbol, %long_venue, %short_venue, "spread found but liquidity insufficient");
            *last = Some(now);
        }
    }
}
