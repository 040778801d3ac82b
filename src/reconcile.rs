use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::models::{LedgerEntry, ParsedTransaction, Position, TransactionType};

/// Lifecycle metrics of one symbol. `None` when there is no history.
pub fn reconcile(transactions: &[ParsedTransaction]) -> Option<Position> {
    let symbol = transactions.first()?.symbol().clone();
    reconcile_symbol(&symbol, transactions.iter())
}

pub fn reconcile_entries(entries: &[LedgerEntry]) -> Option<Position> {
    let symbol = entries.first()?.symbol().clone();
    reconcile_symbol(&symbol, entries.iter().map(|entry| entry.transaction()))
}

/// One position per symbol of a ledger, ordered by symbol.
pub fn reconcile_all(entries: &[LedgerEntry]) -> Vec<Position> {
    let mut by_symbol: BTreeMap<&str, Vec<&ParsedTransaction>> = BTreeMap::new();
    for entry in entries {
        by_symbol
            .entry(entry.symbol().as_str())
            .or_default()
            .push(entry.transaction());
    }

    by_symbol
        .into_iter()
        .filter_map(|(symbol, txs)| reconcile_symbol(symbol, txs.into_iter()))
        .collect()
}

fn reconcile_symbol<'a, I>(symbol: &str, transactions: I) -> Option<Position>
where
    I: Iterator<Item = &'a ParsedTransaction>,
{
    let mut bought = Decimal::ZERO;
    let mut sold = Decimal::ZERO;
    let mut invested = Decimal::ZERO;
    let mut realized = Decimal::ZERO;
    let mut dividends = Decimal::ZERO;
    let mut count = 0usize;
    let mut first_date = None;
    let mut last_date = None;

    for tx in transactions {
        count += 1;
        match tx.transaction_type() {
            TransactionType::Buy => {
                bought = bought.saturating_add(*tx.quantity());
                invested = invested.saturating_add(tx.amount());
            }
            TransactionType::Sell => {
                sold = sold.saturating_add(*tx.quantity());
                realized = realized.saturating_add(tx.amount());
            }
            TransactionType::Dividend => dividends = dividends.saturating_add(tx.amount()),
            _ => {}
        }
        let date = *tx.date();
        first_date = Some(first_date.map_or(date, |d: chrono::DateTime<chrono::Utc>| d.min(date)));
        last_date = Some(last_date.map_or(date, |d: chrono::DateTime<chrono::Utc>| d.max(date)));
    }

    let (first_date, last_date) = (first_date?, last_date?);
    let realized_pnl = realized.saturating_sub(invested);
    let return_percent = if invested > Decimal::ZERO {
        realized_pnl
            .checked_div(invested)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or_default()
    } else {
        Decimal::ZERO
    };
    let hold_days = if count < 2 {
        0
    } else {
        (last_date - first_date).num_days()
    };

    Some(Position::new(
        symbol.to_string(),
        bought,
        sold,
        invested,
        realized,
        realized_pnl,
        bought.saturating_sub(sold),
        return_percent,
        hold_days,
        dividends,
        first_date,
        last_date,
        count,
    ))
}
