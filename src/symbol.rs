//! Symbol Registry (C1, spec.md §4.1).
//!
//! Answers `canonical_of`, `native_of`, `contract_id_of`, `symbol_of`.
//! Each venue's metadata frame produces a complete replacement map that is
//! published with a single atomic swap — readers never observe a torn
//! mix of old and new entries, the same property
//! `scrapers/polymarket_book_store.rs` gets from swapping an
//! `Arc<BookSnapshot>` behind `ArcSwap` rather than mutating in place.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::types::{CanonicalSymbol, VenueId};

/// Per-venue quote-currency alias policy (§4.1 "Normalization rules").
/// A venue that settles in USDC typically wants `USD`/`USDT` native
/// quote legs folded into canonical `USDC`.
#[derive(Debug, Clone)]
pub struct QuoteAliasPolicy {
    /// Native quote currency strings that should resolve to `settlement`.
    pub aliases: Vec<String>,
    pub settlement: String,
}

impl QuoteAliasPolicy {
    pub fn usdc_settled() -> Self {
        Self {
            aliases: vec!["USD".into(), "USDT".into(), "USDC".into()],
            settlement: "USDC".into(),
        }
    }

    /// Folds a native quote currency to `settlement` if it's one of the
    /// configured aliases, otherwise uppercases it unchanged.
    fn resolve(&self, quote: &str) -> String {
        let upper = quote.to_uppercase();
        if self.aliases.iter().any(|a| a.eq_ignore_ascii_case(&upper)) {
            self.settlement.clone()
        } else {
            upper
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RegistrySnapshot {
    canonical_to_native: HashMap<CanonicalSymbol, String>,
    native_to_canonical: HashMap<String, CanonicalSymbol>,
    canonical_to_contract_id: HashMap<CanonicalSymbol, i64>,
    contract_id_to_canonical: HashMap<i64, CanonicalSymbol>,
}

/// One registry per venue. Construct with `SymbolRegistry::new(venue)` and
/// call `replace_from_metadata` whenever a fresh metadata frame arrives.
pub struct SymbolRegistry {
    venue: VenueId,
    quote_policy: QuoteAliasPolicy,
    snapshot: ArcSwap<RegistrySnapshot>,
    build_lock: Mutex<()>,
}

/// One entry derived from a venue's metadata frame: its native symbol
/// string, optional numeric contract id, base asset and native quote.
#[derive(Debug, Clone)]
pub struct MetadataEntry {
    pub native_symbol: String,
    pub contract_id: Option<i64>,
    pub base: String,
    pub native_quote: String,
    pub kind: String,
    /// Decimal places used to scale this market's wire-format integer
    /// prices/sizes (§4.5 "compact-field schema"). Only populated by
    /// venues whose private order feed uses the abbreviated integer
    /// encoding; `None` for venues that send decimal strings directly.
    pub price_decimals: Option<u32>,
}

impl SymbolRegistry {
    pub fn new(venue: VenueId, quote_policy: QuoteAliasPolicy) -> Self {
        Self {
            venue,
            quote_policy,
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::default()),
            build_lock: Mutex::new(()),
        }
    }

    /// Normalizes a venue's native quote currency to its canonical form
    /// per the venue's alias policy (USD/USDT fold to USDC when the venue
    /// trades USDC-settled perpetuals).
    fn canonical_quote(&self, native_quote: &str) -> String {
        self.quote_policy.resolve(native_quote)
    }

    /// Computes the full canonical→native and contract-id maps atomically
    /// from a metadata frame and publishes them with a single swap (§4.1
    /// "Population"). Replaces, never merges, the previous snapshot.
    pub fn replace_from_metadata(&self, entries: &[MetadataEntry]) {
        let _guard = self.build_lock.lock();

        let mut next = RegistrySnapshot::default();
        for entry in entries {
            let canonical = CanonicalSymbol::new(
                &entry.base,
                &self.canonical_quote(&entry.native_quote),
                &entry.kind,
            );
            next.canonical_to_native
                .insert(canonical.clone(), entry.native_symbol.clone());
            next.native_to_canonical
                .insert(entry.native_symbol.clone(), canonical.clone());
            if let Some(id) = entry.contract_id {
                next.canonical_to_contract_id.insert(canonical.clone(), id);
                next.contract_id_to_canonical.insert(id, canonical);
            }
        }

        self.snapshot.store(Arc::new(next));
    }

    /// Resolves a venue-native symbol string to its canonical form. Suffix
    /// candidates are tried most-specific first; the first match wins, no
    /// fuzzy matching (§4.1 "Candidate generation").
    pub fn canonical_of(&self, native: &str) -> Option<CanonicalSymbol> {
        let snap = self.snapshot.load();
        if let Some(c) = snap.native_to_canonical.get(native) {
            return Some(c.clone());
        }
        for candidate in native_candidates(native) {
            if let Some(c) = snap.native_to_canonical.get(&candidate) {
                return Some(c.clone());
            }
        }
        None
    }

    pub fn native_of(&self, canonical: &CanonicalSymbol) -> Option<String> {
        self.snapshot.load().canonical_to_native.get(canonical).cloned()
    }

    pub fn contract_id_of(&self, canonical: &CanonicalSymbol) -> Option<i64> {
        self.snapshot
            .load()
            .canonical_to_contract_id
            .get(canonical)
            .copied()
    }

    pub fn symbol_of(&self, contract_id: i64) -> Option<CanonicalSymbol> {
        self.snapshot
            .load()
            .contract_id_to_canonical
            .get(&contract_id)
            .cloned()
    }

    pub fn venue(&self) -> &VenueId {
        &self.venue
    }

    /// Every `(canonical, native)` pair resolved so far, for building
    /// subscribe frames (`Codec::subscribe_frames`) and for driving the
    /// order-book ingest task's book lookups.
    pub fn resolved_pairs(&self) -> Vec<(String, String)> {
        self.snapshot
            .load()
            .canonical_to_native
            .iter()
            .map(|(canonical, native)| (canonical.as_str().to_string(), native.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().canonical_to_native.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generates most-specific-first suffix-stripped candidates for a raw
/// native symbol (§4.1 "Suffix handling"): `BTC_USDT_PERP` tries itself,
/// then with `_PERP`/`-PERP` stripped, then common separator swaps.
fn native_candidates(raw: &str) -> Vec<String> {
    let upper = raw.to_uppercase();
    let mut out = vec![upper.clone()];

    for suffix in ["-PERP", "_PERP", "PERP"] {
        if let Some(stripped) = upper.strip_suffix(suffix) {
            out.push(stripped.to_string());
        }
    }

    // underscore/hyphen interchange, since venues mix both
    out.push(upper.replace('_', "-"));
    out.push(upper.replace('-', "_"));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> SymbolRegistry {
        let reg = SymbolRegistry::new(VenueId::new("edgex"), QuoteAliasPolicy::usdc_settled());
        reg.replace_from_metadata(&[
            MetadataEntry {
                native_symbol: "BTC_USDT_PERP".into(),
                contract_id: Some(10001),
                base: "BTC".into(),
                native_quote: "USDT".into(),
                kind: "PERP".into(),
                price_decimals: None,
            },
            MetadataEntry {
                native_symbol: "ETH-USD-PERP".into(),
                contract_id: Some(10002),
                base: "ETH".into(),
                native_quote: "USD".into(),
                kind: "PERP".into(),
                price_decimals: None,
            },
        ]);
        reg
    }

    #[test]
    fn resolves_both_directions() {
        let reg = sample_registry();
        let btc = CanonicalSymbol::new("BTC", "USDC", "PERP");
        assert_eq!(reg.canonical_of("BTC_USDT_PERP"), Some(btc.clone()));
        assert_eq!(reg.native_of(&btc), Some("BTC_USDT_PERP".to_string()));
        assert_eq!(reg.contract_id_of(&btc), Some(10001));
        assert_eq!(reg.symbol_of(10001), Some(btc));
    }

    #[test]
    fn quote_aliases_fold_to_settlement() {
        let reg = sample_registry();
        let eth = CanonicalSymbol::new("ETH", "USDC", "PERP");
        assert_eq!(reg.canonical_of("ETH-USD-PERP"), Some(eth));
    }

    #[test]
    fn unknown_symbol_yields_none_never_a_placeholder() {
        let reg = sample_registry();
        assert_eq!(reg.canonical_of("DOGE_USDT_PERP"), None);
        assert_eq!(reg.symbol_of(999999), None);
    }

    #[test]
    fn replace_is_atomic_not_merged() {
        let reg = sample_registry();
        reg.replace_from_metadata(&[MetadataEntry {
            native_symbol: "SOL_USDT_PERP".into(),
            contract_id: Some(20001),
            base: "SOL".into(),
            native_quote: "USDT".into(),
            kind: "PERP".into(),
            price_decimals: None,
        }]);
        // old entry from the first metadata frame must be gone, not merged
        assert_eq!(reg.canonical_of("BTC_USDT_PERP"), None);
        assert!(reg
            .canonical_of("SOL_USDT_PERP")
            .is_some());
        assert_eq!(reg.len(), 1);
    }
}
