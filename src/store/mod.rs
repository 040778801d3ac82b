//! Persistence contracts used by the import pipeline.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use derive_getters::Getters;
use derive_new::new;

use crate::models::{Asset, AssetDraft, LedgerEntry, NewLedgerEntry, Portfolio, SymbolCandidate};

pub use memory::MemoryStore;

/// Asset record and ledger entries of one symbol, written together.
#[derive(Clone, Debug, Getters, new, PartialEq)]
pub struct UnitWrite {
    asset: Option<AssetDraft>,
    entries: Vec<NewLedgerEntry>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnitOutcome {
    pub asset: Option<Asset>,
    pub inserted: usize,
    pub duplicates: usize,
}

#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn create_portfolio(&self, owner: &str, name: &str) -> Result<Portfolio>;

    async fn list_portfolios(&self, owner: &str) -> Result<Vec<Portfolio>>;

    /// Assets with a non-zero quantity.
    async fn get_open_positions(&self, portfolio_id: i64) -> Result<Vec<Asset>>;

    async fn list_assets(&self, portfolio_id: i64) -> Result<Vec<Asset>>;

    async fn find_asset(&self, portfolio_id: i64, symbol: &str) -> Result<Option<Asset>>;

    /// Inserts, or updates the asset with the same portfolio and symbol.
    async fn upsert_asset(&self, draft: &AssetDraft) -> Result<Asset>;

    async fn delete_asset(&self, id: i64) -> Result<()>;

    /// Entries whose dedup key is already stored are ignored.
    async fn append_transactions(&self, portfolio_id: i64, entries: &[NewLedgerEntry]) -> Result<UnitOutcome>;

    /// Writes the asset and the entries of one unit atomically.
    async fn apply_unit(&self, portfolio_id: i64, unit: &UnitWrite) -> Result<UnitOutcome>;

    async fn list_transactions(&self, portfolio_id: i64, symbol: &str) -> Result<Vec<LedgerEntry>>;

    async fn list_ledger(&self, portfolio_id: i64) -> Result<Vec<LedgerEntry>>;

    async fn get_transaction(&self, id: i64) -> Result<Option<LedgerEntry>>;

    /// Returns false when no such entry exists.
    async fn delete_transaction(&self, id: i64) -> Result<bool>;

    async fn delete_all_transactions_for_symbol(&self, portfolio_id: i64, symbol: &str) -> Result<usize>;
}

/// Confirmed ISIN to instrument mappings.
#[async_trait]
pub trait SymbolCache: Send + Sync {
    async fn lookup(&self, isin: &str) -> Result<Option<SymbolCandidate>>;

    async fn remember(&self, isin: &str, candidate: &SymbolCandidate) -> Result<()>;
}
