use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::{Asset, AssetDraft, LedgerEntry, NewLedgerEntry, Portfolio, SymbolCandidate};

use super::{PortfolioStore, SymbolCache, UnitOutcome, UnitWrite};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    portfolios: Vec<Portfolio>,
    assets: Vec<Asset>,
    ledger: Vec<LedgerEntry>,
    cache: HashMap<String, SymbolCandidate>,
    rejected: HashSet<String>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, symbol: &str) -> Result<()> {
        if self.rejected.contains(&symbol.to_uppercase()) {
            bail!("write rejected for {}", symbol);
        }
        Ok(())
    }

    fn upsert(&mut self, draft: &AssetDraft) -> Asset {
        let existing = self.assets.iter().position(|asset| {
            Some(*asset.id()) == draft.id
                || (*asset.portfolio_id() == draft.portfolio_id && asset.symbol() == &draft.symbol)
        });
        match existing {
            Some(idx) => {
                let id = *self.assets[idx].id();
                self.assets[idx] = Asset::from_draft(id, draft.clone());
                self.assets[idx].clone()
            }
            None => {
                let id = self.next_id();
                let asset = Asset::from_draft(id, draft.clone());
                self.assets.push(asset.clone());
                asset
            }
        }
    }

    fn append(&mut self, portfolio_id: i64, entries: &[NewLedgerEntry]) -> UnitOutcome {
        let mut outcome = UnitOutcome::default();
        for entry in entries {
            if self.ledger.iter().any(|stored| stored.dedup_key() == entry.dedup_key()) {
                outcome.duplicates += 1;
                continue;
            }
            let id = self.next_id();
            self.ledger.push(entry.clone().into_entry(id, portfolio_id));
            outcome.inserted += 1;
        }
        outcome
    }
}

/// Process-local store for previews, tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later write touching `symbol` fail.
    pub async fn reject_symbol(&self, symbol: &str) {
        self.inner.lock().await.rejected.insert(symbol.to_uppercase());
    }
}

#[async_trait]
impl PortfolioStore for MemoryStore {
    async fn create_portfolio(&self, owner: &str, name: &str) -> Result<Portfolio> {
        let mut inner = self.inner.lock().await;
        let portfolio = Portfolio::new(inner.next_id(), owner.to_string(), name.to_string());
        inner.portfolios.push(portfolio.clone());
        Ok(portfolio)
    }

    async fn list_portfolios(&self, owner: &str) -> Result<Vec<Portfolio>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .portfolios
            .iter()
            .filter(|p| p.owner() == owner)
            .cloned()
            .collect())
    }

    async fn get_open_positions(&self, portfolio_id: i64) -> Result<Vec<Asset>> {
        Ok(self
            .list_assets(portfolio_id)
            .await?
            .into_iter()
            .filter(Asset::is_open)
            .collect())
    }

    async fn list_assets(&self, portfolio_id: i64) -> Result<Vec<Asset>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .assets
            .iter()
            .filter(|a| *a.portfolio_id() == portfolio_id)
            .cloned()
            .collect())
    }

    async fn find_asset(&self, portfolio_id: i64, symbol: &str) -> Result<Option<Asset>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .assets
            .iter()
            .find(|a| *a.portfolio_id() == portfolio_id && a.symbol().eq_ignore_ascii_case(symbol))
            .cloned())
    }

    async fn upsert_asset(&self, draft: &AssetDraft) -> Result<Asset> {
        let mut inner = self.inner.lock().await;
        inner.check(&draft.symbol)?;
        Ok(inner.upsert(draft))
    }

    async fn delete_asset(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.assets.retain(|a| *a.id() != id);
        Ok(())
    }

    async fn append_transactions(&self, portfolio_id: i64, entries: &[NewLedgerEntry]) -> Result<UnitOutcome> {
        let mut inner = self.inner.lock().await;
        for entry in entries {
            inner.check(entry.symbol())?;
        }
        Ok(inner.append(portfolio_id, entries))
    }

    async fn apply_unit(&self, portfolio_id: i64, unit: &UnitWrite) -> Result<UnitOutcome> {
        let mut inner = self.inner.lock().await;
        // Validate everything first so a rejected unit leaves no trace.
        if let Some(draft) = unit.asset() {
            inner.check(&draft.symbol)?;
        }
        for entry in unit.entries() {
            inner.check(entry.symbol())?;
        }

        let asset = unit.asset().as_ref().map(|draft| inner.upsert(draft));
        let mut outcome = inner.append(portfolio_id, unit.entries());
        outcome.asset = asset;
        Ok(outcome)
    }

    async fn list_transactions(&self, portfolio_id: i64, symbol: &str) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<LedgerEntry> = inner
            .ledger
            .iter()
            .filter(|e| *e.portfolio_id() == portfolio_id && e.symbol() == symbol)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (*e.transaction().date(), *e.id()));
        Ok(entries)
    }

    async fn list_ledger(&self, portfolio_id: i64) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<LedgerEntry> = inner
            .ledger
            .iter()
            .filter(|e| *e.portfolio_id() == portfolio_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (*e.transaction().date(), *e.id()));
        Ok(entries)
    }

    async fn get_transaction(&self, id: i64) -> Result<Option<LedgerEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner.ledger.iter().find(|e| *e.id() == id).cloned())
    }

    async fn delete_transaction(&self, id: i64) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.ledger.len();
        inner.ledger.retain(|e| *e.id() != id);
        Ok(inner.ledger.len() != before)
    }

    async fn delete_all_transactions_for_symbol(&self, portfolio_id: i64, symbol: &str) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let before = inner.ledger.len();
        inner
            .ledger
            .retain(|e| !(*e.portfolio_id() == portfolio_id && e.symbol() == symbol));
        Ok(before - inner.ledger.len())
    }
}

#[async_trait]
impl SymbolCache for MemoryStore {
    async fn lookup(&self, isin: &str) -> Result<Option<SymbolCandidate>> {
        let inner = self.inner.lock().await;
        Ok(inner.cache.get(&isin.to_uppercase()).cloned())
    }

    async fn remember(&self, isin: &str, candidate: &SymbolCandidate) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.cache.insert(isin.to_uppercase(), candidate.clone());
        Ok(())
    }
}
