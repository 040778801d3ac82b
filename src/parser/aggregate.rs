use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::models::{
    AssetType, CLOSED_EPSILON, ParsedRow, ParsedTransaction, TransactionType, is_effectively_zero,
};

use super::{
    Extracted,
    values::{is_known_currency, looks_like_isin},
};

#[derive(Debug, Default)]
pub struct Aggregated {
    pub rows: Vec<ParsedRow>,
    pub closed_position_count: usize,
}

/// Keeps first-seen order of the grouping keys.
#[derive(Default)]
struct Grouped<'a> {
    order: Vec<String>,
    groups: HashMap<String, Vec<&'a ParsedTransaction>>,
}

impl<'a> Grouped<'a> {
    fn push(&mut self, key: String, tx: &'a ParsedTransaction) {
        if !self.groups.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.groups.entry(key).or_default().push(tx);
    }

    fn iter(&self) -> impl Iterator<Item = &[&'a ParsedTransaction]> {
        self.order
            .iter()
            .filter_map(|key| self.groups.get(key).map(Vec::as_slice))
    }
}

/// Drops events whose value does not fit a `Decimal`, reporting each one,
/// then replays the rest into `out`.
pub fn finish<F>(mut out: Extracted, transactions: Vec<ParsedTransaction>, platform: &str, infer_type: F) -> Extracted
where
    F: Fn(&ParsedTransaction) -> AssetType,
{
    let mut kept = Vec::with_capacity(transactions.len());
    for tx in transactions {
        if tx.checked_amount().is_some() {
            kept.push(tx);
        } else {
            out.errors.push(format!(
                "{} {} on {}: value out of range",
                tx.transaction_type(),
                tx.symbol(),
                tx.date().format("%Y-%m-%d")
            ));
            out.skipped_rows += 1;
        }
    }

    let aggregated = aggregate(&kept, platform, infer_type);
    out.rows = aggregated.rows;
    out.closed_position_count = aggregated.closed_position_count;
    out.transactions = kept;
    out
}

fn total<I: Iterator<Item = Decimal>>(values: I) -> Decimal {
    values.fold(Decimal::ZERO, |acc, value| acc.saturating_add(value))
}

/// Replays a ledger into preview rows: cash per currency, transfers per
/// symbol, net holdings per instrument, then income and fee lines.
pub fn aggregate<F>(transactions: &[ParsedTransaction], platform: &str, infer_type: F) -> Aggregated
where
    F: Fn(&ParsedTransaction) -> AssetType,
{
    let mut sorted: Vec<&ParsedTransaction> = transactions.iter().collect();
    sorted.sort_by_key(|tx| *tx.date());

    let mut cash = Grouped::default();
    let mut transfers = Grouped::default();
    let mut holdings = Grouped::default();
    let mut dividends = Grouped::default();
    let mut coupons = Grouped::default();
    let mut fees = Grouped::default();

    for tx in sorted {
        match tx.transaction_type() {
            TransactionType::Buy | TransactionType::Sell => holdings.push(tx.instrument_key(), tx),
            TransactionType::Dividend => dividends.push(tx.instrument_key(), tx),
            TransactionType::Coupon => coupons.push(tx.instrument_key(), tx),
            TransactionType::Fee => fees.push(tx.currency().to_uppercase(), tx),
            TransactionType::Deposit
            | TransactionType::Withdrawal
            | TransactionType::Interest
            | TransactionType::Cash => {
                let symbol = tx.symbol().to_uppercase();
                if is_known_currency(&symbol) {
                    cash.push(symbol, tx);
                } else {
                    transfers.push(symbol, tx);
                }
            }
            TransactionType::Fx => {}
        }
    }

    let mut out = Aggregated::default();

    for group in cash.iter() {
        out.rows.push(cash_row(group, platform));
    }
    for group in transfers.iter() {
        out.rows.push(transfer_row(group, platform));
    }
    for group in holdings.iter() {
        let row = holding_row(group, platform, &infer_type);
        if *row.quantity() <= CLOSED_EPSILON {
            out.closed_position_count += 1;
        }
        out.rows.push(row);
    }
    for group in dividends.iter() {
        out.rows.push(income_row(group, platform, AssetType::Dividend));
    }
    for group in coupons.iter() {
        out.rows.push(income_row(group, platform, AssetType::Coupon));
    }
    for group in fees.iter() {
        out.rows.push(fee_row(group, platform));
    }

    out
}

fn signed_cash(tx: &ParsedTransaction) -> Decimal {
    match tx.transaction_type() {
        TransactionType::Withdrawal => -tx.quantity().abs(),
        _ => *tx.quantity(),
    }
}

fn cash_row(group: &[&ParsedTransaction], platform: &str) -> ParsedRow {
    let currency = group[0].symbol().to_uppercase();
    let net = total(group.iter().map(|tx| signed_cash(tx)));

    ParsedRow::new(
        currency.clone(),
        None,
        format!("Cash ({})", currency),
        net,
        Decimal::ONE,
        currency,
        AssetType::Cash,
        platform.to_string(),
        None,
        100,
        Vec::new(),
    )
}

fn transfer_row(group: &[&ParsedTransaction], platform: &str) -> ParsedRow {
    let first = group[0];
    let net = total(group.iter().map(|tx| signed_cash(tx)));

    ParsedRow::new(
        first.symbol().to_uppercase(),
        first.isin().clone(),
        format!("Transfers ({})", first.symbol().to_uppercase()),
        net,
        Decimal::ZERO,
        first.currency().clone(),
        AssetType::Deposit,
        platform.to_string(),
        None,
        100,
        Vec::new(),
    )
}

fn holding_row<F>(group: &[&ParsedTransaction], platform: &str, infer_type: &F) -> ParsedRow
where
    F: Fn(&ParsedTransaction) -> AssetType,
{
    let first = group[0];
    let mut bought = Decimal::ZERO;
    let mut sold = Decimal::ZERO;
    let mut buy_cost = Decimal::ZERO;

    for tx in group {
        match tx.transaction_type() {
            TransactionType::Buy => {
                bought = bought.saturating_add(*tx.quantity());
                buy_cost = buy_cost.saturating_add(tx.amount());
            }
            _ => sold = sold.saturating_add(*tx.quantity()),
        }
    }

    let mut net = bought.saturating_sub(sold);
    let mut warnings = Vec::new();
    if sold > Decimal::ZERO {
        warnings.push(format!(
            "Calculated from history: {:.4} bought, {:.4} sold",
            bought, sold
        ));
    }
    if is_effectively_zero(net) {
        net = Decimal::ZERO;
    } else if net < Decimal::ZERO {
        warnings.push("More sold than bought in this file".to_string());
    }

    let avg_price = if bought > Decimal::ZERO {
        buy_cost.checked_div(bought).unwrap_or_default()
    } else {
        Decimal::ZERO
    };

    let name = group
        .iter()
        .filter_map(|tx| tx.name().as_deref())
        .find(|name| !name.trim().is_empty())
        .unwrap_or(first.symbol())
        .to_string();
    let exchange = group.iter().find_map(|tx| tx.exchange().clone());
    let currency = group
        .iter()
        .find(|tx| *tx.transaction_type() == TransactionType::Buy)
        .unwrap_or(&first)
        .currency()
        .clone();

    // Lines only identified by ISIN still need a ticker.
    let confidence = if looks_like_isin(first.symbol()) { 80 } else { 100 };

    ParsedRow::new(
        first.symbol().clone(),
        first.isin().clone(),
        name,
        net,
        avg_price,
        currency,
        infer_type(first),
        platform.to_string(),
        exchange,
        confidence,
        warnings,
    )
}

fn income_row(group: &[&ParsedTransaction], platform: &str, asset_type: AssetType) -> ParsedRow {
    let first = group[0];
    let sum = total(group.iter().map(|tx| tx.quantity().abs()));
    let price = if group.iter().any(|tx| !tx.price().is_zero()) {
        Decimal::ONE
    } else {
        Decimal::ZERO
    };
    let name = first
        .name()
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| first.symbol().clone());

    ParsedRow::new(
        first.symbol().clone(),
        first.isin().clone(),
        name,
        sum,
        price,
        first.currency().clone(),
        asset_type,
        platform.to_string(),
        None,
        100,
        Vec::new(),
    )
}

fn fee_row(group: &[&ParsedTransaction], platform: &str) -> ParsedRow {
    let currency = group[0].currency().to_uppercase();
    let sum = total(group.iter().map(|tx| tx.quantity().abs()));

    ParsedRow::new(
        "FEES".to_string(),
        None,
        format!("Fees ({})", currency),
        sum,
        Decimal::ONE,
        currency,
        AssetType::Fee,
        platform.to_string(),
        None,
        100,
        Vec::new(),
    )
}
