//! Maps parsed instruments to market identities with bounded concurrency.

use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    api::ReferenceSource,
    config::ImportConfig,
    error::LookupError,
    models::{Asset, AssetType, ExistingAsset, MatchSource, ParsedRow, ResolvedInstrument, SymbolCandidate},
    parser::values::looks_like_isin,
    store::SymbolCache,
};

pub const CONFIDENCE_CACHED: u8 = 100;
pub const CONFIDENCE_EXACT: u8 = 100;
pub const CONFIDENCE_ISIN: u8 = 95;
pub const CONFIDENCE_FIRST: u8 = 85;
pub const CONFIDENCE_NO_MATCH: u8 = 50;
pub const CONFIDENCE_FAILED: u8 = 40;

#[derive(Clone, Debug, Default)]
pub struct ResolveResult {
    pub success: bool,
    pub resolved: Vec<ResolvedInstrument>,
    pub errors: Vec<String>,
}

enum Lookup {
    Found(SymbolCandidate, u8),
    NotFound,
    Failed(LookupError),
}

#[derive(Clone)]
pub struct SymbolResolver {
    source: Arc<dyn ReferenceSource>,
    cache: Arc<dyn SymbolCache>,
    concurrency: usize,
    lookup_timeout: Duration,
}

impl SymbolResolver {
    pub fn new(
        source: Arc<dyn ReferenceSource>,
        cache: Arc<dyn SymbolCache>,
        concurrency: usize,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            concurrency: concurrency.max(1),
            lookup_timeout,
        }
    }

    pub fn from_config(source: Arc<dyn ReferenceSource>, cache: Arc<dyn SymbolCache>, config: &ImportConfig) -> Self {
        Self::new(source, cache, config.resolve_concurrency, config.lookup_timeout)
    }

    pub async fn resolve(&self, rows: &[ParsedRow], existing: &[Asset]) -> ResolveResult {
        self.resolve_with_progress(rows, existing, |_, _| {}).await
    }

    /// Runs lookups `concurrency` at a time. Results come back in input
    /// order; `on_progress(done, total)` fires once per completed row.
    pub async fn resolve_with_progress<F>(
        &self,
        rows: &[ParsedRow],
        existing: &[Asset],
        mut on_progress: F,
    ) -> ResolveResult
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = rows.len();
        let mut result = ResolveResult {
            success: true,
            ..ResolveResult::default()
        };
        if !self.source.is_available() {
            warn!("Reference source unavailable, keeping parsed symbols");
            result.success = false;
            result
                .errors
                .push("Reference source is unavailable; symbols were not looked up".to_string());
        }

        let mut slots: Vec<Option<ResolvedInstrument>> = vec![None; total];
        let mut done = 0;
        let pending: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| async move { (idx, self.resolve_one(row, existing).await) })
            .collect();
        let mut lookups = stream::iter(pending).buffer_unordered(self.concurrency);

        while let Some((idx, instrument)) = lookups.next().await {
            slots[idx] = Some(instrument);
            done += 1;
            on_progress(done, total);
        }

        result.resolved = slots.into_iter().flatten().collect();
        let degraded = result
            .resolved
            .iter()
            .filter(|inst| *inst.match_source() == MatchSource::Fallback)
            .count();
        info!("Resolved {} instruments ({} kept as parsed)", total, degraded);
        result
    }

    async fn resolve_one(&self, row: &ParsedRow, existing: &[Asset]) -> ResolvedInstrument {
        let mut instrument = ResolvedInstrument::from_row(row);

        if row.asset_type().is_holding() {
            let isin = row
                .isin()
                .clone()
                .or_else(|| Some(row.symbol().clone()))
                .map(|isin| isin.trim().to_uppercase())
                .filter(|isin| looks_like_isin(isin));

            let cached = match &isin {
                Some(isin) => self.cache.lookup(isin).await.unwrap_or_else(|err| {
                    warn!("Symbol cache lookup failed for {}: {:#}", isin, err);
                    None
                }),
                None => None,
            };

            match cached {
                Some(candidate) => instrument.apply_candidate(&candidate, MatchSource::Cached, CONFIDENCE_CACHED),
                None => self.search(row, isin.as_deref(), &mut instrument).await,
            }
        }

        enrich(&mut instrument);
        let existing_asset = existing
            .iter()
            .find(|asset| asset.symbol().eq_ignore_ascii_case(instrument.resolved_symbol()))
            .map(|asset| ExistingAsset::new(*asset.id(), *asset.quantity(), *asset.buy_price()));
        instrument.set_existing_asset(existing_asset);
        let action = instrument.default_action();
        instrument.set_action(action);
        instrument
    }

    async fn search(&self, row: &ParsedRow, isin: Option<&str>, instrument: &mut ResolvedInstrument) {
        if !self.source.is_available() {
            instrument.degrade(
                CONFIDENCE_FAILED,
                format!("Reference source unavailable; kept {}", row.symbol()),
            );
            return;
        }

        let lookup = match timeout(self.lookup_timeout, self.lookup(row, isin)).await {
            Ok(lookup) => lookup,
            Err(_) => Lookup::Failed(LookupError::Timeout(self.lookup_timeout.as_secs())),
        };

        match lookup {
            Lookup::Found(candidate, confidence) => {
                debug!("{} resolved to {}", row.symbol(), candidate.symbol());
                instrument.apply_candidate(&candidate, MatchSource::Searched, confidence);
            }
            Lookup::NotFound => instrument.degrade(
                CONFIDENCE_NO_MATCH,
                format!("No match found for {}; kept as parsed", row.symbol()),
            ),
            Lookup::Failed(err) => {
                warn!("Lookup for {} failed: {}", row.symbol(), err);
                instrument.degrade(
                    CONFIDENCE_FAILED,
                    format!("Lookup failed for {} ({}); kept as parsed", row.symbol(), err),
                );
            }
        }
    }

    /// ISIN search first, then symbol plus exchange hint.
    async fn lookup(&self, row: &ParsedRow, isin: Option<&str>) -> Lookup {
        let mut failure = None;

        if let Some(isin) = isin {
            match self.source.search_by_isin(isin).await {
                Ok(candidates) => {
                    if let Some(candidate) = candidates.into_iter().next() {
                        if let Err(err) = self.cache.remember(isin, &candidate).await {
                            warn!("Failed to cache {}: {:#}", isin, err);
                        }
                        return Lookup::Found(candidate, CONFIDENCE_ISIN);
                    }
                }
                Err(err) => failure = Some(err),
            }
        }

        let symbol = row.symbol().trim();
        if symbol.is_empty() || looks_like_isin(symbol) {
            return failure.map_or(Lookup::NotFound, Lookup::Failed);
        }

        match self.source.search_by_symbol(symbol, row.exchange().as_deref()).await {
            Ok(candidates) => pick_candidate(symbol, candidates)
                .map(|(candidate, confidence)| Lookup::Found(candidate, confidence))
                .unwrap_or_else(|| failure.map_or(Lookup::NotFound, Lookup::Failed)),
            Err(err) => Lookup::Failed(err),
        }
    }
}

/// Exact ticker match (ignoring an exchange suffix) wins over the first hit.
fn pick_candidate(symbol: &str, candidates: Vec<SymbolCandidate>) -> Option<(SymbolCandidate, u8)> {
    let wanted = symbol.to_uppercase();
    let base = |s: &str| s.split('.').next().unwrap_or_default().to_uppercase();

    if let Some(exact) = candidates
        .iter()
        .find(|c| c.symbol().to_uppercase() == wanted || base(c.symbol()) == base(&wanted))
    {
        return Some((exact.clone(), CONFIDENCE_EXACT));
    }
    candidates.into_iter().next().map(|c| (c, CONFIDENCE_FIRST))
}

fn enrich(instrument: &mut ResolvedInstrument) {
    if instrument.country().is_none() {
        let country = instrument
            .exchange()
            .as_deref()
            .and_then(country_from_exchange)
            .or_else(|| country_from_symbol(instrument.resolved_symbol()))
            .or_else(|| instrument.row().isin().as_deref().and_then(country_from_isin));
        instrument.set_country(country.map(str::to_string));
    }
    if instrument.category().is_none() {
        let category = category_for(*instrument.resolved_type());
        instrument.set_category(category.map(str::to_string));
    }
}

pub fn country_from_exchange(exchange: &str) -> Option<&'static str> {
    let upper = exchange.trim().to_uppercase();
    let country = match upper.as_str() {
        "NASDAQ" | "NYSE" | "AMEX" | "NYSEARCA" | "BATS" | "OTC" | "NMS" | "NYQ" | "US" => "US",
        "XETRA" | "XETR" | "FRA" | "GER" | "TDG" | "STU" | "MUN" | "DUS" | "HAM" | "BER" | "TRADEGATE" => "DE",
        "LSE" | "LON" | "IOB" => "GB",
        "EPA" | "PAR" | "EURONEXT PARIS" => "FR",
        "AMS" | "EAM" | "EURONEXT AMSTERDAM" => "NL",
        "EBR" | "BRU" => "BE",
        "BIST" | "IST" | "XIST" => "TR",
        "SIX" | "SWX" | "VTX" => "CH",
        "MIL" | "BIT" => "IT",
        "MAD" | "BME" | "MCE" => "ES",
        "TSX" | "TOR" | "TSXV" => "CA",
        "HKEX" | "HKG" | "HKSE" => "HK",
        "TYO" | "JPX" => "JP",
        "ASX" => "AU",
        "STO" | "OMX" => "SE",
        "CPH" => "DK",
        "OSL" => "NO",
        "HEL" => "FI",
        "VIE" | "WBO" => "AT",
        "LIS" | "ELI" => "PT",
        _ => return None,
    };
    Some(country)
}

fn country_from_symbol(symbol: &str) -> Option<&'static str> {
    let suffix = symbol.rsplit_once('.')?.1.to_uppercase();
    let country = match suffix.as_str() {
        "IS" => "TR",
        "DE" | "F" => "DE",
        "L" => "GB",
        "PA" => "FR",
        "AS" => "NL",
        "BR" => "BE",
        "SW" => "CH",
        "MI" => "IT",
        "MC" => "ES",
        "TO" => "CA",
        "HK" => "HK",
        "T" => "JP",
        "AX" => "AU",
        _ => return None,
    };
    Some(country)
}

/// Issuer country from the ISIN prefix; supranational prefixes say nothing.
fn country_from_isin(isin: &str) -> Option<&'static str> {
    let prefix = isin.get(..2)?;
    let country = match prefix {
        "US" => "US",
        "DE" => "DE",
        "GB" => "GB",
        "FR" => "FR",
        "NL" => "NL",
        "BE" => "BE",
        "TR" => "TR",
        "CH" => "CH",
        "IT" => "IT",
        "ES" => "ES",
        "CA" => "CA",
        "JP" => "JP",
        "IE" => "IE",
        "LU" => "LU",
        "DK" => "DK",
        "SE" => "SE",
        "FI" => "FI",
        "NO" => "NO",
        "AT" => "AT",
        _ => return None,
    };
    Some(country)
}

fn category_for(asset_type: AssetType) -> Option<&'static str> {
    match asset_type {
        AssetType::Stock => Some("Equity"),
        AssetType::Fund => Some("Fund"),
        AssetType::Bond => Some("Fixed Income"),
        AssetType::Crypto => Some("Crypto"),
        AssetType::PreciousMetals => Some("Commodity"),
        AssetType::Cash | AssetType::Deposit | AssetType::Withdrawal | AssetType::Interest => Some("Cash"),
        AssetType::Dividend | AssetType::Coupon => Some("Income"),
        AssetType::Fee => Some("Costs"),
        AssetType::Other => None,
    }
}
