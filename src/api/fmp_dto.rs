use derive_getters::Getters;
use derive_new::new;
use serde::Deserialize;

use crate::models::{AssetType, SymbolCandidate};

#[derive(Debug, Deserialize, Getters, new)]
#[serde(rename_all = "camelCase")]
pub struct FmpSearchSymbolDto {
    symbol: String,
    name: String,
    currency: Option<String>,
    exchange_full_name: Option<String>,
    exchange: Option<String>,
}

impl FmpSearchSymbolDto {
    pub fn to_candidate(&self) -> SymbolCandidate {
        SymbolCandidate::new(
            self.symbol.clone(),
            self.name.clone(),
            self.exchange.clone(),
            None,
            None,
            None,
            self.currency.clone(),
            None,
            None,
        )
    }
}

#[derive(Debug, Deserialize, Getters, new)]
#[serde(rename_all = "camelCase")]
pub struct FmpSearchIsinDto {
    symbol: String,
    name: String,
    isin: String,
}

#[derive(Debug, Deserialize, Getters, new)]
#[serde(rename_all = "camelCase")]
pub struct FmpProfileDto {
    symbol: String,
    company_name: Option<String>,
    currency: Option<String>,
    exchange: Option<String>,
    country: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
    image: Option<String>,
    #[serde(default)]
    is_etf: bool,
    #[serde(default)]
    is_fund: bool,
}

impl FmpProfileDto {
    pub fn asset_type(&self) -> AssetType {
        if self.is_etf || self.is_fund {
            AssetType::Fund
        } else {
            AssetType::Stock
        }
    }

    /// Profile data on top of a search hit.
    pub fn to_candidate(&self, name: &str) -> SymbolCandidate {
        let name = self
            .company_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| name.to_string());
        SymbolCandidate::new(
            self.symbol.clone(),
            name,
            self.exchange.clone(),
            self.country.clone(),
            self.sector.clone(),
            self.industry.clone(),
            self.currency.clone(),
            Some(self.asset_type()),
            self.image.clone(),
        )
    }
}
