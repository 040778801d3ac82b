use derive_getters::Getters;
use derive_new::new;
use serde::{Deserialize, Serialize};

use super::AssetType;

/// A match returned by the reference source.
#[derive(Clone, Debug, Deserialize, Eq, Getters, new, PartialEq, Serialize)]
pub struct SymbolCandidate {
    symbol: String,
    name: String,
    exchange: Option<String>,
    country: Option<String>,
    sector: Option<String>,
    category: Option<String>,
    currency: Option<String>,
    asset_type: Option<AssetType>,
    logo_url: Option<String>,
}
