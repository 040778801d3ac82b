use anyhow::{Context, Result};
use sqlx::{Row, Sqlite};

use crate::models::{AssetDraft, NewLedgerEntry};

/// Inserts or updates by (portfolio, symbol) and returns the row id.
pub async fn upsert_asset(draft: &AssetDraft, tx: &mut sqlx::Transaction<'_, Sqlite>) -> Result<i64> {
    sqlx::query(
        r#"
        INSERT INTO assets
        (
            portfolio_id,
            symbol,
            name,
            isin,
            asset_type,
            quantity,
            buy_price,
            currency,
            exchange,
            country,
            sector,
            category,
            platform,
            custom_group,
            logo_url
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (portfolio_id, symbol) DO UPDATE SET
            name = excluded.name,
            isin = COALESCE(excluded.isin, assets.isin),
            asset_type = excluded.asset_type,
            quantity = excluded.quantity,
            buy_price = excluded.buy_price,
            currency = excluded.currency,
            exchange = COALESCE(excluded.exchange, assets.exchange),
            country = COALESCE(excluded.country, assets.country),
            sector = COALESCE(excluded.sector, assets.sector),
            category = COALESCE(excluded.category, assets.category),
            platform = COALESCE(excluded.platform, assets.platform),
            custom_group = COALESCE(excluded.custom_group, assets.custom_group),
            logo_url = COALESCE(excluded.logo_url, assets.logo_url),
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(draft.portfolio_id)
    .bind(&draft.symbol)
    .bind(&draft.name)
    .bind(&draft.isin)
    .bind(draft.asset_type.to_string())
    .bind(draft.quantity.to_string())
    .bind(draft.buy_price.to_string())
    .bind(&draft.currency)
    .bind(&draft.exchange)
    .bind(&draft.country)
    .bind(&draft.sector)
    .bind(&draft.category)
    .bind(&draft.platform)
    .bind(&draft.custom_group)
    .bind(&draft.logo_url)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("Failed to write asset {}", draft.symbol))?;

    let row = sqlx::query("SELECT id FROM assets WHERE portfolio_id = ? AND symbol = ?")
        .bind(draft.portfolio_id)
        .bind(&draft.symbol)
        .fetch_one(&mut **tx)
        .await?;

    Ok(row.get::<i64, _>("id"))
}

/// Returns false when an entry with the same dedup key already exists.
pub async fn insert_ledger_entry(
    portfolio_id: i64,
    entry: &NewLedgerEntry,
    tx: &mut sqlx::Transaction<'_, Sqlite>,
) -> Result<bool> {
    let transaction = entry.transaction();
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO transactions
        (
            portfolio_id,
            symbol,
            transaction_type,
            transaction_date,
            raw_symbol,
            isin,
            name,
            quantity,
            price,
            fee,
            currency,
            platform,
            exchange,
            external_id,
            dedup_key
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(portfolio_id)
    .bind(entry.symbol())
    .bind(transaction.transaction_type().as_ref())
    .bind(transaction.date())
    .bind(transaction.symbol())
    .bind(transaction.isin())
    .bind(transaction.name())
    .bind(transaction.quantity().to_string())
    .bind(transaction.price().to_string())
    .bind(transaction.fee().to_string())
    .bind(transaction.currency())
    .bind(transaction.platform())
    .bind(transaction.exchange())
    .bind(transaction.external_id())
    .bind(entry.dedup_key())
    .execute(&mut **tx)
    .await
    .with_context(|| format!("Failed to write transaction for {}", entry.symbol()))?;

    Ok(result.rows_affected() > 0)
}
