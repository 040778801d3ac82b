//! Position queries and history edits over a stored ledger.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use crate::{
    models::Position,
    reconcile::{reconcile_all, reconcile_entries},
    store::PortfolioStore,
};

/// Every symbol with history in the portfolio, recomputed from the ledger.
pub async fn positions(store: &dyn PortfolioStore, portfolio_id: i64) -> Result<Vec<Position>> {
    let ledger = store
        .list_ledger(portfolio_id)
        .await
        .with_context(|| format!("Failed to load ledger of portfolio {}", portfolio_id))?;
    Ok(reconcile_all(&ledger))
}

pub async fn position_for(store: &dyn PortfolioStore, portfolio_id: i64, symbol: &str) -> Result<Option<Position>> {
    let entries = store
        .list_transactions(portfolio_id, symbol)
        .await
        .with_context(|| format!("Failed to load transactions of {}", symbol))?;
    Ok(reconcile_entries(&entries))
}

/// Removes one ledger entry and re-syncs the asset record of its symbol from
/// the remaining history. Returns the recomputed position, or `None` when the
/// symbol has no history left and its asset record was removed.
pub async fn delete_transaction(store: &dyn PortfolioStore, transaction_id: i64) -> Result<Option<Position>> {
    let entry = store
        .get_transaction(transaction_id)
        .await?
        .with_context(|| format!("Transaction {} not found", transaction_id))?;
    let portfolio_id = *entry.portfolio_id();
    let symbol = entry.symbol().clone();

    store
        .delete_transaction(transaction_id)
        .await
        .with_context(|| format!("Failed to delete transaction {}", transaction_id))?;

    let position = position_for(store, portfolio_id, &symbol).await?;
    sync_asset(store, portfolio_id, &symbol, position.as_ref()).await?;
    info!("Deleted transaction {} of {}", transaction_id, symbol);
    Ok(position)
}

/// Drops the whole history of a symbol together with its asset record.
pub async fn delete_symbol_history(store: &dyn PortfolioStore, portfolio_id: i64, symbol: &str) -> Result<usize> {
    let deleted = store
        .delete_all_transactions_for_symbol(portfolio_id, symbol)
        .await
        .with_context(|| format!("Failed to delete history of {}", symbol))?;
    sync_asset(store, portfolio_id, symbol, None).await?;
    info!("Deleted {} transactions of {}", deleted, symbol);
    Ok(deleted)
}

async fn sync_asset(store: &dyn PortfolioStore, portfolio_id: i64, symbol: &str, position: Option<&Position>) -> Result<()> {
    let Some(asset) = store.find_asset(portfolio_id, symbol).await? else {
        return Ok(());
    };

    match position {
        Some(position) => {
            let mut draft = asset.to_draft();
            draft.quantity = if position.is_closed() {
                Decimal::ZERO
            } else {
                *position.open_quantity()
            };
            let average = position.average_buy_price();
            if average > Decimal::ZERO {
                draft.buy_price = average;
            }
            store.upsert_asset(&draft).await?;
        }
        None => store.delete_asset(*asset.id()).await?,
    }
    Ok(())
}
