//! SQLite implementation of the store contracts.

pub mod init;
pub mod utils;
pub mod write;

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool},
};
use tracing::debug;

use crate::{
    models::{Asset, AssetDraft, LedgerEntry, NewLedgerEntry, Portfolio, SymbolCandidate},
    store::{PortfolioStore, SymbolCache, UnitOutcome, UnitWrite},
};

use utils::{parse_asset, parse_ledger_entry, parse_portfolio};

const LEDGER_COLUMNS: &str = "id, portfolio_id, symbol, transaction_type, transaction_date, raw_symbol, \
     isin, name, quantity, price, fee, currency, platform, exchange, external_id, dedup_key";

#[derive(Clone, Debug)]
pub struct SqliteStore {
    connection: Pool<Sqlite>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and its schema.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));
        let connection = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {}", path))?;

        Self::from_pool(connection).await
    }

    pub async fn from_pool(connection: Pool<Sqlite>) -> Result<Self> {
        init::create_portfolios(&connection).await?;
        init::create_assets(&connection).await?;
        init::create_transactions(&connection).await?;
        init::create_symbol_cache(&connection).await?;
        debug!("Database schema ready");
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Pool<Sqlite> {
        &self.connection
    }

    async fn asset_by_id(&self, id: i64) -> Result<Asset> {
        let row = sqlx::query("SELECT * FROM assets WHERE id = ?")
            .bind(id)
            .fetch_one(&self.connection)
            .await
            .with_context(|| format!("Asset {} not found", id))?;
        parse_asset(row)
    }

    async fn write_entries(
        portfolio_id: i64,
        entries: &[NewLedgerEntry],
        tx: &mut sqlx::Transaction<'_, Sqlite>,
    ) -> Result<UnitOutcome> {
        let mut outcome = UnitOutcome::default();
        for entry in entries {
            if write::insert_ledger_entry(portfolio_id, entry, tx).await? {
                outcome.inserted += 1;
            } else {
                outcome.duplicates += 1;
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl PortfolioStore for SqliteStore {
    async fn create_portfolio(&self, owner: &str, name: &str) -> Result<Portfolio> {
        let id = sqlx::query("INSERT INTO portfolios (owner, name) VALUES (?, ?)")
            .bind(owner)
            .bind(name)
            .execute(&self.connection)
            .await
            .context("Failed to create portfolio")?
            .last_insert_rowid();
        Ok(Portfolio::new(id, owner.to_string(), name.to_string()))
    }

    async fn list_portfolios(&self, owner: &str) -> Result<Vec<Portfolio>> {
        sqlx::query("SELECT id, owner, name FROM portfolios WHERE owner = ? ORDER BY id")
            .bind(owner)
            .fetch_all(&self.connection)
            .await?
            .into_iter()
            .map(parse_portfolio)
            .collect()
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
        sqlx::query("SELECT * FROM assets WHERE portfolio_id = ? ORDER BY id")
            .bind(portfolio_id)
            .fetch_all(&self.connection)
            .await?
            .into_iter()
            .map(parse_asset)
            .collect()
    }

    async fn find_asset(&self, portfolio_id: i64, symbol: &str) -> Result<Option<Asset>> {
        sqlx::query("SELECT * FROM assets WHERE portfolio_id = ? AND UPPER(symbol) = UPPER(?)")
            .bind(portfolio_id)
            .bind(symbol)
            .fetch_optional(&self.connection)
            .await?
            .map(parse_asset)
            .transpose()
    }

    async fn upsert_asset(&self, draft: &AssetDraft) -> Result<Asset> {
        let mut tx = self.connection.begin().await?;
        let id = write::upsert_asset(draft, &mut tx).await?;
        tx.commit().await?;
        self.asset_by_id(id).await
    }

    async fn delete_asset(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id)
            .execute(&self.connection)
            .await
            .with_context(|| format!("Failed to delete asset {}", id))?;
        Ok(())
    }

    async fn append_transactions(&self, portfolio_id: i64, entries: &[NewLedgerEntry]) -> Result<UnitOutcome> {
        let mut tx = self.connection.begin().await?;
        let outcome = Self::write_entries(portfolio_id, entries, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn apply_unit(&self, portfolio_id: i64, unit: &UnitWrite) -> Result<UnitOutcome> {
        let mut tx = self.connection.begin().await?;

        // Write first so the transaction takes the write lock up front.
        let asset_id = match unit.asset() {
            Some(draft) => Some(write::upsert_asset(draft, &mut tx).await?),
            None => None,
        };
        let mut outcome = Self::write_entries(portfolio_id, unit.entries(), &mut tx).await?;
        tx.commit().await?;

        if let Some(id) = asset_id {
            outcome.asset = Some(self.asset_by_id(id).await?);
        }
        Ok(outcome)
    }

    async fn list_transactions(&self, portfolio_id: i64, symbol: &str) -> Result<Vec<LedgerEntry>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE portfolio_id = ? AND symbol = ? ORDER BY transaction_date, id",
            LEDGER_COLUMNS
        );
        sqlx::query(&query)
            .bind(portfolio_id)
            .bind(symbol)
            .fetch_all(&self.connection)
            .await?
            .into_iter()
            .map(parse_ledger_entry)
            .collect()
    }

    async fn list_ledger(&self, portfolio_id: i64) -> Result<Vec<LedgerEntry>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE portfolio_id = ? ORDER BY transaction_date, id",
            LEDGER_COLUMNS
        );
        sqlx::query(&query)
            .bind(portfolio_id)
            .fetch_all(&self.connection)
            .await?
            .into_iter()
            .map(parse_ledger_entry)
            .collect()
    }

    async fn get_transaction(&self, id: i64) -> Result<Option<LedgerEntry>> {
        let query = format!("SELECT {} FROM transactions WHERE id = ?", LEDGER_COLUMNS);
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.connection)
            .await?
            .map(parse_ledger_entry)
            .transpose()
    }

    async fn delete_transaction(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = ?")
            .bind(id)
            .execute(&self.connection)
            .await
            .with_context(|| format!("Failed to delete transaction {}", id))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_transactions_for_symbol(&self, portfolio_id: i64, symbol: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM transactions WHERE portfolio_id = ? AND symbol = ?")
            .bind(portfolio_id)
            .bind(symbol)
            .execute(&self.connection)
            .await
            .with_context(|| format!("Failed to delete transactions for {}", symbol))?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl SymbolCache for SqliteStore {
    async fn lookup(&self, isin: &str) -> Result<Option<SymbolCandidate>> {
        let row = sqlx::query("SELECT candidate FROM symbol_cache WHERE isin = ?")
            .bind(isin.to_uppercase())
            .fetch_optional(&self.connection)
            .await?;
        match row {
            Some(row) => {
                let json = utils::parse_string_from_row(&row, "candidate")?;
                let candidate = serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt cache entry for {}", isin))?;
                Ok(Some(candidate))
            }
            None => Ok(None),
        }
    }

    async fn remember(&self, isin: &str, candidate: &SymbolCandidate) -> Result<()> {
        let json = serde_json::to_string(candidate)?;
        sqlx::query(
            r#"
            INSERT INTO symbol_cache (isin, candidate) VALUES (?, ?)
            ON CONFLICT (isin) DO UPDATE SET candidate = excluded.candidate, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(isin.to_uppercase())
        .bind(json)
        .execute(&self.connection)
        .await
        .with_context(|| format!("Failed to cache {}", isin))?;
        Ok(())
    }
}
