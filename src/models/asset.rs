use derive_getters::Getters;
use derive_new::new;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::position::CLOSED_EPSILON;

/// Kind of a parsed line. The first group names holdings, the second group
/// marks statement lines that never become a position.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, EnumIter, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AssetType {
    #[default]
    Stock,
    Bond,
    Fund,
    Crypto,
    PreciousMetals,
    Cash,
    Dividend,
    Deposit,
    Withdrawal,
    Interest,
    Fee,
    Coupon,
    Other,
}

impl AssetType {
    /// Cash movements, fees and income lines that never represent a holding.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            AssetType::Cash
                | AssetType::Deposit
                | AssetType::Withdrawal
                | AssetType::Interest
                | AssetType::Fee
                | AssetType::Coupon
        )
    }

    pub fn is_holding(&self) -> bool {
        !self.is_statement() && *self != AssetType::Dividend
    }

    /// Best guess from a product name when the file has no type column.
    pub fn infer_from_name(name: &str) -> Self {
        let upper = name.to_uppercase();
        let any = |needles: &[&str]| needles.iter().any(|n| upper.contains(n));

        if any(&["BITCOIN", "BTC", "ETHEREUM", "ETH", "XRP", "RIPPLE", "COINSHARES", "CRYPTO"]) {
            AssetType::Crypto
        } else if any(&["ETF", "UCITS", "ISHARES", "VANGUARD", "WISDOMTREE", "ARK "]) {
            AssetType::Fund
        } else if any(&["CERTIF", "BOND"]) {
            AssetType::Bond
        } else {
            AssetType::Stock
        }
    }

    /// Loose mapping of a free-text type column value.
    pub fn from_label(label: &str) -> Self {
        let upper = label.trim().to_uppercase();
        if let Ok(exact) = upper.replace(' ', "_").parse::<AssetType>() {
            return exact;
        }
        let any = |needles: &[&str]| needles.iter().any(|n| upper.contains(n));

        if any(&["CRYPTO", "BTC", "ETH"]) {
            AssetType::Crypto
        } else if any(&["FUND", "ETF"]) {
            AssetType::Fund
        } else if any(&["GOLD", "ALTIN", "SILVER", "METAL"]) {
            AssetType::PreciousMetals
        } else if any(&["BOND", "TAHVIL"]) {
            AssetType::Bond
        } else if any(&["CASH", "NAKIT"]) {
            AssetType::Cash
        } else if any(&["DIVIDEND", "TEMETT"]) {
            AssetType::Dividend
        } else {
            AssetType::Stock
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, Getters, new, PartialEq, Serialize)]
pub struct Portfolio {
    id: i64,
    owner: String,
    name: String,
}

/// Write model for the denormalized asset record. `id` set means update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetDraft {
    pub id: Option<i64>,
    pub portfolio_id: i64,
    pub symbol: String,
    pub name: String,
    pub isin: Option<String>,
    pub asset_type: AssetType,
    pub quantity: Decimal,
    pub buy_price: Decimal,
    pub currency: String,
    pub exchange: Option<String>,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub category: Option<String>,
    pub platform: Option<String>,
    pub custom_group: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
pub struct Asset {
    id: i64,
    portfolio_id: i64,
    symbol: String,
    name: String,
    isin: Option<String>,
    asset_type: AssetType,
    quantity: Decimal,
    buy_price: Decimal,
    currency: String,
    exchange: Option<String>,
    country: Option<String>,
    sector: Option<String>,
    category: Option<String>,
    platform: Option<String>,
    custom_group: Option<String>,
    logo_url: Option<String>,
}

impl Asset {
    pub fn from_draft(id: i64, draft: AssetDraft) -> Self {
        Self {
            id,
            portfolio_id: draft.portfolio_id,
            symbol: draft.symbol,
            name: draft.name,
            isin: draft.isin,
            asset_type: draft.asset_type,
            quantity: draft.quantity,
            buy_price: draft.buy_price,
            currency: draft.currency,
            exchange: draft.exchange,
            country: draft.country,
            sector: draft.sector,
            category: draft.category,
            platform: draft.platform,
            custom_group: draft.custom_group,
            logo_url: draft.logo_url,
        }
    }

    pub fn to_draft(&self) -> AssetDraft {
        AssetDraft {
            id: Some(self.id),
            portfolio_id: self.portfolio_id,
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            isin: self.isin.clone(),
            asset_type: self.asset_type,
            quantity: self.quantity,
            buy_price: self.buy_price,
            currency: self.currency.clone(),
            exchange: self.exchange.clone(),
            country: self.country.clone(),
            sector: self.sector.clone(),
            category: self.category.clone(),
            platform: self.platform.clone(),
            custom_group: self.custom_group.clone(),
            logo_url: self.logo_url.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.quantity.abs() >= CLOSED_EPSILON
    }
}
