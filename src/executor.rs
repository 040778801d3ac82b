//! Applies reviewed instruments and their ledger history to a store.

use std::{collections::HashMap, sync::Arc};

use futures::{StreamExt, stream};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    error::ImportError,
    models::{Asset, AssetDraft, ImportAction, ImportResult, NewLedgerEntry, ParsedTransaction, ResolvedInstrument},
    store::{PortfolioStore, UnitWrite},
};

/// One resolved symbol: the instruments that resolved to it and every
/// transaction they claim.
#[derive(Debug)]
struct Unit {
    symbol: String,
    instruments: Vec<ResolvedInstrument>,
    entries: Vec<NewLedgerEntry>,
}

#[derive(Clone)]
pub struct ImportExecutor {
    store: Arc<dyn PortfolioStore>,
    concurrency: usize,
}

impl ImportExecutor {
    pub fn new(store: Arc<dyn PortfolioStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn execute(
        &self,
        instruments: &[ResolvedInstrument],
        transactions: &[ParsedTransaction],
        portfolio_id: i64,
    ) -> ImportResult {
        self.execute_with_progress(instruments, transactions, portfolio_id, |_, _| {})
            .await
    }

    /// Units are written `concurrency` at a time, each atomically. A failing
    /// unit is reported in `errors` and leaves the others untouched.
    pub async fn execute_with_progress<F>(
        &self,
        instruments: &[ResolvedInstrument],
        transactions: &[ParsedTransaction],
        portfolio_id: i64,
        mut on_progress: F,
    ) -> ImportResult
    where
        F: FnMut(usize, usize) + Send,
    {
        let units = partition(instruments, transactions, portfolio_id);
        let total = units.len();
        info!(
            "Executing import of {} instruments and {} transactions as {} units",
            instruments.len(),
            transactions.len(),
            total
        );

        let mut result = ImportResult::default();
        let mut done = 0;
        let mut writes = stream::iter(units)
            .map(|unit| self.run_unit(portfolio_id, unit))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = writes.next().await {
            result.merge(outcome);
            done += 1;
            on_progress(done, total);
        }

        let work_done = result.added + result.updated + result.closed + result.transactions_added + result.duplicates_ignored;
        result.success = result.errors.is_empty() || work_done > 0;
        info!(
            "Import finished: {} added, {} updated, {} closed, {} skipped, {} transactions, {} duplicates, {} errors",
            result.added,
            result.updated,
            result.closed,
            result.skipped,
            result.transactions_added,
            result.duplicates_ignored,
            result.errors.len()
        );
        result
    }

    async fn run_unit(&self, portfolio_id: i64, unit: Unit) -> ImportResult {
        let mut result = ImportResult::default();
        let fail = |err: anyhow::Error| {
            let err = ImportError::Execution {
                symbol: unit.symbol.clone(),
                message: format!("{:#}", err),
            };
            warn!("{}", err);
            ImportResult {
                errors: vec![err.to_string()],
                ..ImportResult::default()
            }
        };

        // Only the first actionable instrument of a symbol writes the asset.
        let mut primary = None;
        for instrument in &unit.instruments {
            if primary.is_none() && *instrument.action() != ImportAction::Skip {
                primary = Some(instrument);
            } else {
                result.skipped += 1;
            }
        }

        let asset = match primary {
            Some(instrument) => {
                let existing = match self.store.find_asset(portfolio_id, &unit.symbol).await {
                    Ok(existing) => existing,
                    Err(err) => return fail(err),
                };
                let (draft, action) = plan_asset(instrument, existing.as_ref(), portfolio_id);
                match action {
                    ImportAction::Add => result.added += 1,
                    ImportAction::Update => result.updated += 1,
                    ImportAction::Close => result.closed += 1,
                    ImportAction::Skip => result.skipped += 1,
                }
                Some(draft)
            }
            None => None,
        };

        let write = UnitWrite::new(asset, unit.entries);
        match self.store.apply_unit(portfolio_id, &write).await {
            Ok(outcome) => {
                debug!(
                    "{}: {} entries written, {} duplicates",
                    unit.symbol, outcome.inserted, outcome.duplicates
                );
                result.transactions_added = outcome.inserted;
                result.duplicates_ignored = outcome.duplicates;
                result
            }
            Err(err) => fail(err),
        }
    }
}

/// Draft to write for `instrument` and the action it effectively performs.
/// An add over an existing record becomes an update.
fn plan_asset(instrument: &ResolvedInstrument, existing: Option<&Asset>, portfolio_id: i64) -> (AssetDraft, ImportAction) {
    match (instrument.action(), existing) {
        (ImportAction::Close, Some(asset)) => (merge_draft(instrument, asset, Decimal::ZERO), ImportAction::Close),
        (ImportAction::Close, None) => (new_draft(instrument, portfolio_id, Decimal::ZERO), ImportAction::Close),
        (_, Some(asset)) => (
            merge_draft(instrument, asset, *instrument.quantity()),
            ImportAction::Update,
        ),
        (_, None) => (
            new_draft(instrument, portfolio_id, *instrument.quantity()),
            ImportAction::Add,
        ),
    }
}

fn new_draft(instrument: &ResolvedInstrument, portfolio_id: i64, quantity: Decimal) -> AssetDraft {
    AssetDraft {
        id: None,
        portfolio_id,
        symbol: instrument.resolved_symbol().clone(),
        name: instrument.resolved_name().clone(),
        isin: instrument.row().isin().clone(),
        asset_type: *instrument.resolved_type(),
        quantity,
        buy_price: *instrument.buy_price(),
        currency: instrument.resolved_currency().clone(),
        exchange: instrument.exchange().clone(),
        country: instrument.country().clone(),
        sector: instrument.sector().clone(),
        category: instrument.category().clone(),
        platform: non_empty(instrument.platform()),
        custom_group: instrument.custom_group().clone(),
        logo_url: instrument.logo_url().clone(),
    }
}

/// Keeps the stored identity; quantity, cost basis, name, platform and group
/// come from the import when it has them.
fn merge_draft(instrument: &ResolvedInstrument, asset: &Asset, quantity: Decimal) -> AssetDraft {
    let mut draft = asset.to_draft();
    draft.quantity = quantity;
    if *instrument.buy_price() > Decimal::ZERO {
        draft.buy_price = *instrument.buy_price();
    }
    if !instrument.resolved_name().trim().is_empty() {
        draft.name = instrument.resolved_name().clone();
    }
    if let Some(platform) = non_empty(instrument.platform()) {
        draft.platform = Some(platform);
    }
    if instrument.custom_group().is_some() {
        draft.custom_group = instrument.custom_group().clone();
    }
    if draft.isin.is_none() {
        draft.isin = instrument.row().isin().clone();
    }
    draft
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Groups instruments by resolved symbol and hands each transaction to the
/// unit whose instrument first claimed its ISIN or raw symbol. Transactions
/// nobody claims form history-only units under their own symbol.
fn partition(instruments: &[ResolvedInstrument], transactions: &[ParsedTransaction], portfolio_id: i64) -> Vec<Unit> {
    let mut units: Vec<Unit> = Vec::new();
    let mut by_symbol: HashMap<String, usize> = HashMap::new();
    let mut claims: HashMap<String, usize> = HashMap::new();

    for instrument in instruments {
        let symbol = instrument.resolved_symbol().trim().to_string();
        let idx = *by_symbol.entry(symbol.to_uppercase()).or_insert_with(|| {
            units.push(Unit {
                symbol: symbol.clone(),
                instruments: Vec::new(),
                entries: Vec::new(),
            });
            units.len() - 1
        });
        units[idx].instruments.push(instrument.clone());
        for key in instrument.raw_keys() {
            claims.entry(key).or_insert(idx);
        }
    }

    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for tx in transactions {
        let claimed = transaction_keys(tx).iter().find_map(|key| claims.get(key).copied());
        let idx = match claimed {
            Some(idx) => idx,
            None => {
                let symbol = tx.symbol().trim().to_string();
                let idx = *by_symbol.entry(symbol.to_uppercase()).or_insert_with(|| {
                    units.push(Unit {
                        symbol: symbol.clone(),
                        instruments: Vec::new(),
                        entries: Vec::new(),
                    });
                    units.len() - 1
                });
                for key in transaction_keys(tx) {
                    claims.entry(key).or_insert(idx);
                }
                idx
            }
        };

        let symbol = units[idx].symbol.clone();
        let content = dedup_content(portfolio_id, &symbol, tx);
        let occurrence = occurrences.entry(content.clone()).or_insert(0);
        let dedup_key = hash_key(&content, *occurrence);
        *occurrence += 1;

        units[idx]
            .entries
            .push(NewLedgerEntry::new(symbol, tx.clone(), dedup_key));
    }

    units
}

fn transaction_keys(tx: &ParsedTransaction) -> Vec<String> {
    [tx.isin().as_deref(), Some(tx.symbol().as_str())]
        .into_iter()
        .flatten()
        .map(|key| key.trim().to_uppercase())
        .filter(|key| !key.is_empty())
        .collect()
}

/// A broker-assigned id already pins the event, so the date only takes part
/// when there is none. Events synthesized from holdings snapshots carry an id
/// but are stamped with the upload time.
fn dedup_content(portfolio_id: i64, symbol: &str, tx: &ParsedTransaction) -> String {
    let date = match tx.external_id() {
        Some(id) if !id.trim().is_empty() => String::new(),
        _ => tx.date().to_rfc3339(),
    };
    format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        portfolio_id,
        date,
        symbol.to_uppercase(),
        tx.transaction_type(),
        tx.quantity().normalize(),
        tx.price().normalize(),
        tx.platform().trim().to_lowercase(),
        tx.external_id().as_deref().unwrap_or_default(),
    )
}

/// Hex SHA-256 of the event content plus its occurrence index in the batch.
fn hash_key(content: &str, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(b"#");
    hasher.update(occurrence.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
