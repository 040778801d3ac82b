use derive_getters::Getters;
use derive_new::new;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::{AssetType, ParsedRow, SymbolCandidate, is_effectively_zero};

#[derive(Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchSource {
    /// A previously confirmed ISIN mapping.
    Cached,
    /// Found by a live reference lookup.
    Searched,
    /// Nothing matched; the parsed identity is kept.
    Fallback,
    /// Statement lines are taken as parsed.
    Direct,
}

#[derive(Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImportAction {
    Add,
    Update,
    Close,
    Skip,
}

#[derive(Clone, Debug, Deserialize, Eq, Getters, new, PartialEq, Serialize)]
pub struct ExistingAsset {
    id: i64,
    quantity: Decimal,
    buy_price: Decimal,
}

/// Review-time changes to a resolved instrument.
#[derive(Clone, Debug, Default)]
pub struct InstrumentEdit {
    pub name: Option<String>,
    pub quantity: Option<Decimal>,
    pub exchange: Option<String>,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub custom_group: Option<String>,
    pub action: Option<ImportAction>,
}

/// A parsed row decorated with its market identity. The row itself is kept
/// untouched in `row`.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
pub struct ResolvedInstrument {
    row: ParsedRow,
    resolved_symbol: String,
    resolved_name: String,
    resolved_type: AssetType,
    resolved_currency: String,
    quantity: Decimal,
    buy_price: Decimal,
    platform: String,
    exchange: Option<String>,
    country: Option<String>,
    sector: Option<String>,
    category: Option<String>,
    logo_url: Option<String>,
    custom_group: Option<String>,
    confidence: u8,
    match_source: MatchSource,
    action: ImportAction,
    existing_asset: Option<ExistingAsset>,
    warnings: Vec<String>,
}

impl ResolvedInstrument {
    /// Starts from the parsed identity; the resolver decorates it afterwards.
    pub fn from_row(row: &ParsedRow) -> Self {
        let name = if row.name().trim().is_empty() {
            row.symbol().clone()
        } else {
            row.name().clone()
        };
        Self {
            resolved_symbol: row.symbol().clone(),
            resolved_name: name,
            resolved_type: *row.asset_type(),
            resolved_currency: row.currency().clone(),
            quantity: *row.quantity(),
            buy_price: *row.price(),
            platform: row.platform().clone(),
            exchange: row.exchange().clone(),
            country: None,
            sector: None,
            category: None,
            logo_url: None,
            custom_group: None,
            confidence: *row.confidence(),
            match_source: MatchSource::Direct,
            action: ImportAction::Add,
            existing_asset: None,
            warnings: row.warnings().clone(),
            row: row.clone(),
        }
    }

    pub(crate) fn apply_candidate(&mut self, candidate: &SymbolCandidate, source: MatchSource, confidence: u8) {
        self.resolved_symbol = candidate.symbol().clone();
        if !candidate.name().trim().is_empty() {
            self.resolved_name = candidate.name().clone();
        }
        if let Some(asset_type) = candidate.asset_type() {
            if self.row.asset_type().is_holding() {
                self.resolved_type = *asset_type;
            }
        }
        if let Some(currency) = candidate.currency().as_ref().filter(|c| !c.is_empty()) {
            self.resolved_currency = currency.clone();
        }
        if candidate.exchange().is_some() {
            self.exchange = candidate.exchange().clone();
        }
        self.country = candidate.country().clone();
        self.sector = candidate.sector().clone();
        self.category = candidate.category().clone();
        self.logo_url = candidate.logo_url().clone();
        self.match_source = source;
        self.confidence = confidence;
    }

    pub(crate) fn degrade(&mut self, confidence: u8, warning: String) {
        self.match_source = MatchSource::Fallback;
        self.confidence = self.confidence.min(confidence);
        self.warnings.push(warning);
    }

    pub(crate) fn set_country(&mut self, country: Option<String>) {
        self.country = country;
    }

    pub(crate) fn set_category(&mut self, category: Option<String>) {
        self.category = category;
    }

    pub(crate) fn set_existing_asset(&mut self, existing: Option<ExistingAsset>) {
        self.existing_asset = existing;
    }

    pub fn set_action(&mut self, action: ImportAction) {
        self.action = action;
    }

    /// Overrides the platform label chosen during review.
    pub fn set_platform(&mut self, platform: &str) {
        self.platform = platform.to_string();
    }

    pub fn apply_edit(&mut self, edit: InstrumentEdit) {
        if let Some(name) = edit.name {
            self.resolved_name = name;
        }
        if let Some(quantity) = edit.quantity {
            self.quantity = quantity;
        }
        if let Some(exchange) = edit.exchange {
            self.exchange = Some(exchange);
        }
        if let Some(country) = edit.country {
            self.country = Some(country);
        }
        if let Some(sector) = edit.sector {
            self.sector = Some(sector);
        }
        if let Some(group) = edit.custom_group {
            self.custom_group = Some(group);
        }
        if let Some(action) = edit.action {
            self.action = action;
        }
    }

    /// Action suggested before review: statement lines are history only,
    /// flat positions are closed, known symbols are updated.
    pub fn default_action(&self) -> ImportAction {
        if !self.row.asset_type().is_holding() {
            ImportAction::Skip
        } else if is_effectively_zero(self.quantity) {
            ImportAction::Close
        } else if self.existing_asset.is_some() {
            ImportAction::Update
        } else {
            ImportAction::Add
        }
    }

    /// Identifiers from the source file that ledger transactions may carry.
    pub fn raw_keys(&self) -> Vec<String> {
        let mut keys = self.row.match_keys();
        let resolved = self.resolved_symbol.trim().to_uppercase();
        if !keys.contains(&resolved) {
            keys.push(resolved);
        }
        keys
    }
}
