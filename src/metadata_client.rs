//! Minimal REST "fetch contract metadata" client (spec.md §6.1's REST
//! scope boundary — everything beyond this call and order placement is
//! explicitly out of scope).
//!
//! The primary way the Symbol Registry (C1) gets populated is the push
//! metadata frame each venue sends over its public WebSocket channel
//! (`codec::CodecEvent::SymbolMetadata`, handled at the call site). This
//! client exists for venues/deployments that instead want a one-shot
//! REST bootstrap before the socket carries live updates, grounded on
//! `polymarket_gamma.rs`'s `reqwest::Client` GET-with-timeout pattern.

use std::time::Duration;

use serde::Deserialize;

use crate::error::CollectorError;
use crate::symbol::MetadataEntry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Deserialize)]
struct ContractMetadataRecord {
    native_symbol: String,
    #[serde(default)]
    contract_id: Option<i64>,
    base: String,
    #[serde(rename = "quote")]
    native_quote: String,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default)]
    price_decimals: Option<u32>,
}

fn default_kind() -> String {
    "PERP".into()
}

fn records_to_entries(records: Vec<ContractMetadataRecord>) -> Vec<MetadataEntry> {
    records
        .into_iter()
        .map(|r| MetadataEntry {
            native_symbol: r.native_symbol,
            contract_id: r.contract_id,
            base: r.base,
            native_quote: r.native_quote,
            kind: r.kind,
            price_decimals: r.price_decimals,
        })
        .collect()
}

/// Fetches the venue's contract list from `endpoint` and returns it as
/// `MetadataEntry` values ready for `SymbolRegistry::replace_from_metadata`.
///
/// The response is expected to be a JSON array of records shaped like
/// `ContractMetadataRecord`; venues whose REST payload differs are
/// expected to run entirely off the WS metadata frame instead.
pub async fn fetch_contract_metadata(
    client: &reqwest::Client,
    venue: &str,
    endpoint: &str,
) -> Result<Vec<MetadataEntry>, CollectorError> {
    let wrap = |source| CollectorError::MetadataFetchFailed {
        venue: venue.to_string(),
        source,
    };

    let records: Vec<ContractMetadataRecord> = client
        .get(endpoint)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(wrap)?
        .error_for_status()
        .map_err(wrap)?
        .json()
        .await
        .map_err(wrap)?;

    Ok(records_to_entries(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_contract_records_into_metadata_entries() {
        let body = r#"[
            {"native_symbol": "BTC_USDC_PERP", "contract_id": 1, "base": "BTC", "quote": "USDC"},
            {"native_symbol": "ETH_USDC_PERP", "contract_id": 2, "base": "ETH", "quote": "USDC", "kind": "PERP"}
        ]"#;
        let records: Vec<ContractMetadataRecord> = serde_json::from_str(body).unwrap();
        let entries = records_to_entries(records);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].native_symbol, "BTC_USDC_PERP");
        assert_eq!(entries[0].contract_id, Some(1));
        assert_eq!(entries[1].base, "ETH");
        assert_eq!(entries[1].kind, "PERP");
    }

    #[test]
    fn missing_contract_id_defaults_to_none() {
        let body = r#"[{"native_symbol": "SOL_USDC_PERP", "base": "SOL", "quote": "USDC"}]"#;
        let records: Vec<ContractMetadataRecord> = serde_json::from_str(body).unwrap();
        let entries = records_to_entries(records);
        assert_eq!(entries[0].contract_id, None);
    }

    #[test]
    fn price_decimals_is_carried_through_when_present() {
        let body = r#"[{"native_symbol": "0", "contract_id": 0, "base": "BTC", "quote": "USDC", "price_decimals": 1}]"#;
        let records: Vec<ContractMetadataRecord> = serde_json::from_str(body).unwrap();
        let entries = records_to_entries(records);
        assert_eq!(entries[0].price_decimals, Some(1));
    }
}
