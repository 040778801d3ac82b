use std::collections::HashMap;

use chrono::Datelike;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{AssetType, ParsedTransaction, TransactionType};

use super::{
    Extracted,
    aggregate::finish,
    columns::normalize,
    table::Table,
    values::{parse_date, parse_number},
};

const PLATFORM: &str = "Kraken";
const FIAT: [&str; 4] = ["EUR", "USD", "GBP", "TRY"];
const LEGACY_CODES: [&str; 11] = [
    "XBT", "XRP", "XLM", "XDG", "ETH", "LTC", "ETC", "ZEC", "XMR", "REP", "MLN",
];

pub fn is_kraken(headers: &[String]) -> bool {
    ["txid", "refid", "wallet", "subtype"]
        .iter()
        .all(|name| headers.iter().any(|h| normalize(h) == *name))
}

/// `XXBT` and `XBT.S` style codes to plain tickers.
pub fn normalize_asset(raw: &str) -> String {
    let mut asset = raw.trim().to_uppercase();
    for suffix in [".S", ".F", ".M", ".B"] {
        if let Some(stripped) = asset.strip_suffix(suffix) {
            asset = stripped.to_string();
        }
    }
    if asset.len() == 4 && (asset.starts_with('X') || asset.starts_with('Z')) {
        let rest = &asset[1..];
        if FIAT.contains(&rest) || LEGACY_CODES.contains(&rest) {
            asset = rest.to_string();
        }
    }
    match asset.as_str() {
        "XBT" => "BTC".to_string(),
        "XDG" => "DOGE".to_string(),
        _ => asset,
    }
}

fn is_fiat(asset: &str) -> bool {
    FIAT.contains(&asset)
}

#[derive(Clone, Debug)]
struct LedgerLine {
    row: usize,
    txid: String,
    refid: String,
    time: String,
    kind: String,
    subtype: String,
    asset: String,
    amount: Decimal,
    fee: Decimal,
}

impl LedgerLine {
    fn is_spot_trade(&self) -> bool {
        self.kind == "trade" && (self.subtype.is_empty() || self.subtype == "tradespot")
    }
}

fn read_lines(table: &Table) -> Vec<LedgerLine> {
    let header = |name: &str| table.headers.iter().find(|h| normalize(h) == name).map(String::as_str);
    let (txid, refid, time, kind, subtype, asset, amount, fee) = (
        header("txid"),
        header("refid"),
        header("time"),
        header("type"),
        header("subtype"),
        header("asset"),
        header("amount"),
        header("fee"),
    );

    table
        .records
        .iter()
        .enumerate()
        .map(|(idx, record)| LedgerLine {
            row: idx + 1,
            txid: table.value(record, txid).to_string(),
            refid: table.value(record, refid).to_string(),
            time: table.value(record, time).to_string(),
            kind: table.value(record, kind).to_lowercase(),
            subtype: table.value(record, subtype).to_lowercase(),
            asset: normalize_asset(table.value(record, asset)),
            amount: parse_number(table.value(record, amount)).unwrap_or_default(),
            fee: parse_number(table.value(record, fee)).unwrap_or_default(),
        })
        .collect()
}

pub fn parse(table: &Table) -> Extracted {
    let lines = read_lines(table);
    let mut out = Extracted::default();

    let mut trades: HashMap<&str, Vec<&LedgerLine>> = HashMap::new();
    for line in lines.iter().filter(|l| l.is_spot_trade() && !l.refid.is_empty()) {
        trades.entry(line.refid.as_str()).or_default().push(line);
    }

    let mut transactions = Vec::new();
    for line in &lines {
        if line.txid.is_empty() || line.asset.is_empty() {
            out.skipped_rows += 1;
            continue;
        }
        let Some(date) = parse_date(&line.time) else {
            out.errors.push(format!("Row {}: invalid date '{}'", line.row, line.time));
            out.skipped_rows += 1;
            continue;
        };
        if line.kind != "trade" && is_fiat(&line.asset) && line.amount.abs() < Decimal::ONE {
            out.skipped_rows += 1;
            continue;
        }

        let cash_price = if is_fiat(&line.asset) { Decimal::ONE } else { Decimal::ZERO };
        let tx = match (line.kind.as_str(), line.subtype.as_str()) {
            ("deposit", _) => Some(ParsedTransaction::new(
                TransactionType::Deposit,
                date,
                line.asset.clone(),
                None,
                Some(format!("Deposit ({})", line.asset)),
                line.amount.abs(),
                cash_price,
                line.fee.abs(),
                line.asset.clone(),
                PLATFORM.to_string(),
                None,
                Some(line.txid.clone()),
            )),
            ("withdrawal", _) => Some(ParsedTransaction::new(
                TransactionType::Withdrawal,
                date,
                line.asset.clone(),
                None,
                Some(format!("Withdrawal ({})", line.asset)),
                line.amount.abs(),
                cash_price,
                line.fee.abs(),
                line.asset.clone(),
                PLATFORM.to_string(),
                None,
                Some(line.txid.clone()),
            )),
            ("earn", "reward") | ("staking", _) => Some(ParsedTransaction::new(
                TransactionType::Dividend,
                date,
                line.asset.clone(),
                None,
                Some(line.asset.clone()),
                line.amount.abs(),
                Decimal::ZERO,
                line.fee.abs(),
                line.asset.clone(),
                PLATFORM.to_string(),
                None,
                Some(line.txid.clone()),
            )),
            _ if line.is_spot_trade() => trade_from_pair(line, trades.get(line.refid.as_str()), date),
            _ => None,
        };

        match tx {
            Some(tx) => transactions.push(tx),
            None => out.skipped_rows += 1,
        }
    }

    let mut transactions = consolidate_rewards(transactions);
    transactions.sort_by_key(|tx| *tx.date());
    debug!("Kraken ledger produced {} transactions", transactions.len());

    finish(out, transactions, PLATFORM, |_| AssetType::Crypto)
}

/// Both legs of a spot trade share a refid; the asset leg carries the event.
fn trade_from_pair(
    line: &LedgerLine,
    pair: Option<&Vec<&LedgerLine>>,
    date: chrono::DateTime<chrono::Utc>,
) -> Option<ParsedTransaction> {
    let pair = pair.filter(|legs| legs.len() == 2)?;
    let fiat_leg = pair.iter().find(|leg| is_fiat(&leg.asset))?;
    let asset_leg = pair.iter().find(|leg| !is_fiat(&leg.asset))?;
    if asset_leg.txid != line.txid || fiat_leg.amount.abs() < Decimal::ONE {
        return None;
    }

    let quantity = asset_leg.amount.abs();
    if quantity.is_zero() {
        return None;
    }
    let price = fiat_leg.amount.abs().checked_div(quantity)?;
    let side = if asset_leg.amount > Decimal::ZERO {
        TransactionType::Buy
    } else {
        TransactionType::Sell
    };

    Some(ParsedTransaction::new(
        side,
        date,
        asset_leg.asset.clone(),
        None,
        Some(asset_leg.asset.clone()),
        quantity,
        price,
        fiat_leg.fee.abs().saturating_add(asset_leg.fee.abs().saturating_mul(price)),
        fiat_leg.asset.clone(),
        PLATFORM.to_string(),
        None,
        Some(line.refid.clone()),
    ))
}

/// Folds staking rewards into one event per symbol and calendar month.
fn consolidate_rewards(transactions: Vec<ParsedTransaction>) -> Vec<ParsedTransaction> {
    let (rewards, mut others): (Vec<_>, Vec<_>) = transactions
        .into_iter()
        .partition(|tx| *tx.transaction_type() == TransactionType::Dividend);

    let mut order: Vec<(String, i32, u32)> = Vec::new();
    let mut groups: HashMap<(String, i32, u32), Vec<ParsedTransaction>> = HashMap::new();
    for tx in rewards {
        let key = (tx.symbol().clone(), tx.date().year(), tx.date().month());
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(tx);
    }

    for key in order {
        let Some(mut group) = groups.remove(&key) else {
            continue;
        };
        if group.len() == 1 {
            others.append(&mut group);
            continue;
        }
        group.sort_by_key(|tx| *tx.date());
        let quantity = group
            .iter()
            .fold(Decimal::ZERO, |acc, tx| acc.saturating_add(*tx.quantity()));
        let fee = group.iter().fold(Decimal::ZERO, |acc, tx| acc.saturating_add(*tx.fee()));
        let Some(last) = group.pop() else {
            continue;
        };
        let (symbol, year, month) = key;

        others.push(ParsedTransaction::new(
            TransactionType::Dividend,
            *last.date(),
            symbol.clone(),
            None,
            Some(symbol.clone()),
            quantity,
            Decimal::ZERO,
            fee,
            last.currency().clone(),
            PLATFORM.to_string(),
            None,
            Some(format!("AGG-{}-{}-{:02}", symbol, year, month)),
        ));
    }

    others
}
