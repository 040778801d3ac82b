use derive_getters::Getters;
use derive_new::new;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AssetType;

/// One instrument line of the preview. Rows derived from a ledger are already
/// net-aggregated.
#[derive(Clone, Debug, Deserialize, Getters, new, PartialEq, Serialize)]
pub struct ParsedRow {
    symbol: String,
    isin: Option<String>,
    name: String,
    quantity: Decimal,
    price: Decimal,
    currency: String,
    asset_type: AssetType,
    platform: String,
    exchange: Option<String>,
    confidence: u8,
    warnings: Vec<String>,
}

impl ParsedRow {
    /// Upper-cased identifiers usable for matching rows against each other.
    pub fn match_keys(&self) -> Vec<String> {
        [Some(self.symbol.as_str()), self.isin.as_deref()]
            .into_iter()
            .flatten()
            .map(|key| key.trim().to_uppercase())
            .filter(|key| !key.is_empty())
            .collect()
    }
}
