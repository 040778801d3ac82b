use std::{collections::HashMap, sync::OnceLock};

use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{AssetType, ParsedTransaction, TransactionType};

use super::{
    Extracted,
    aggregate,
    columns::{ColumnMap, Field, find_best_match, has_normalized, normalize},
    table::Table,
    values::{is_known_currency, parse_date, parse_number},
};

const PLATFORM: &str = "DeGiro";
const DEFAULT_CURRENCY: &str = "EUR";

fn trade_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(koop|buy|verkauf|kauf|verkoop|sell)\s+([\d.,]+)\s+(?:@|at)\s+([\d.,]+)\s+([a-z]{3})")
            .expect("invalid trade regex")
    })
}

fn fee_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(transactiekosten|aansluitingskosten|kosten|fee|tax|belasting|gebühr)")
            .expect("invalid fee regex")
    })
}

fn income_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(dividend|coupon|kupon|temettü)").expect("invalid income regex"))
}

fn coupon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(coupon|kupon)").expect("invalid coupon regex"))
}

fn interest_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(rente|interest|zinsen)").expect("invalid interest regex"))
}

fn deposit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(deposit|storting|einzahlung)").expect("invalid deposit regex"))
}

fn withdrawal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(withdrawal|terugstorting|auszahlung)").expect("invalid withdrawal regex")
    })
}

fn transfer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(overboeking|transfer|überweisung)").expect("invalid transfer regex"))
}

fn fx_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(valuta|\bfx\b)").expect("invalid fx regex"))
}

fn skip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(reservation|reservering|cash sweep)").expect("invalid skip regex"))
}

/// Account statement (cash report) export.
pub fn is_statement(headers: &[String]) -> bool {
    let columns: Vec<&str> = headers.iter().map(String::as_str).collect();
    [Field::Description, Field::Change, Field::Balance, Field::OrderId]
        .iter()
        .all(|field| find_best_match(&columns, *field).is_some())
}

/// Transactions export: one trade per line.
pub fn is_transactions(headers: &[String]) -> bool {
    has_normalized(headers, "isin")
        && has_normalized(headers, "product")
        && (has_normalized(headers, "referenceexchange") || has_normalized(headers, "venue"))
}

fn header_named<'a>(table: &'a Table, name: &str) -> Option<&'a str> {
    table
        .headers
        .iter()
        .find(|h| normalize(h) == name)
        .map(String::as_str)
}

fn record_date(table: &Table, record: &[String], date: Option<&str>, time: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    let date = table.value(record, date);
    let time = table.value(record, time);
    if time.is_empty() {
        parse_date(date)
    } else {
        parse_date(&format!("{} {}", date, time)).or_else(|| parse_date(date))
    }
}

/// Classifies each statement line by its description. Trades need an ISIN;
/// cash movements are booked against the currency.
pub fn parse_statement(table: &Table) -> Extracted {
    let columns: Vec<&str> = table.headers.iter().map(String::as_str).collect();
    let isin_col = find_best_match(&columns, Field::Isin);
    let desc_col = find_best_match(&columns, Field::Description);
    let order_col = find_best_match(&columns, Field::OrderId);
    let change_col = find_best_match(&columns, Field::Change);
    let date_col = find_best_match(&columns, Field::Date);
    let time_col = header_named(table, "time");
    let product_col = header_named(table, "product").or_else(|| find_best_match(&columns, Field::Name));
    let change_idx = change_col.and_then(|h| table.column_index(h));

    let mut out = Extracted::default();
    for (key, header) in [
        ("isin", isin_col),
        ("description", desc_col),
        ("orderId", order_col),
        ("change", change_col),
        ("date", date_col),
        ("name", product_col),
    ] {
        if let Some(header) = header {
            out.detected_columns.insert(key.to_string(), header.to_string());
        }
    }

    let mut transactions = Vec::new();
    for (idx, record) in table.records.iter().enumerate() {
        let description = table.value(record, desc_col);
        if skip_re().is_match(description) {
            out.skipped_rows += 1;
            continue;
        }
        let Some(date) = record_date(table, record, date_col, time_col) else {
            out.errors.push(format!("Row {}: invalid date", idx + 1));
            out.skipped_rows += 1;
            continue;
        };

        let isin = table.value(record, isin_col).to_uppercase();
        let product = table.value(record, product_col).to_string();
        let order_id = Some(table.value(record, order_col).to_string()).filter(|id| !id.is_empty());
        let (amount, currency) = change_amount(record, change_idx);

        let cash = |kind: TransactionType, symbol: String, name: &str, quantity: Decimal, external_id: Option<String>| {
            ParsedTransaction::new(
                kind,
                date,
                symbol,
                None,
                Some(name.to_string()),
                quantity,
                Decimal::ONE,
                Decimal::ZERO,
                currency.clone(),
                PLATFORM.to_string(),
                None,
                external_id,
            )
        };

        let tx = if let Some(caps) = trade_re().captures(description).filter(|_| !isin.is_empty()) {
            let verb = caps[1].to_lowercase();
            let side = if verb.starts_with('v') || verb.starts_with('s') {
                TransactionType::Sell
            } else {
                TransactionType::Buy
            };
            let quantity = parse_number(&caps[2]).unwrap_or_default().abs();
            let price = parse_number(&caps[3]).unwrap_or_default();
            Some(ParsedTransaction::new(
                side,
                date,
                isin.clone(),
                Some(isin.clone()),
                Some(product.clone()),
                quantity,
                price,
                Decimal::ZERO,
                caps[4].to_uppercase(),
                PLATFORM.to_string(),
                None,
                order_id,
            ))
        } else if fee_re().is_match(description) {
            Some(cash(TransactionType::Fee, "FEES".to_string(), description, amount.abs(), order_id))
        } else if income_re().is_match(description) {
            let kind = if coupon_re().is_match(description) {
                TransactionType::Coupon
            } else {
                TransactionType::Dividend
            };
            let symbol = if isin.is_empty() { "UNKNOWN".to_string() } else { isin.clone() };
            let name = if product.is_empty() { description } else { product.as_str() };
            let isin = Some(isin.clone()).filter(|isin| !isin.is_empty());
            Some(cash(kind, symbol, name, amount.abs(), order_id).with_isin(isin))
        } else if interest_re().is_match(description) {
            // Negative interest is a charge.
            if amount < Decimal::ZERO {
                Some(cash(TransactionType::Fee, "FEES".to_string(), description, amount.abs(), None))
            } else {
                Some(cash(TransactionType::Interest, currency.clone(), description, amount, None))
            }
        } else if deposit_re().is_match(description)
            || (transfer_re().is_match(description) && amount > Decimal::ZERO)
        {
            Some(cash(TransactionType::Deposit, currency.clone(), description, amount.abs(), None))
        } else if withdrawal_re().is_match(description)
            || (transfer_re().is_match(description) && amount < Decimal::ZERO)
        {
            Some(cash(TransactionType::Withdrawal, currency.clone(), description, amount.abs(), None))
        } else if fx_re().is_match(description) {
            let symbol = if isin.is_empty() { "FX".to_string() } else { isin.clone() };
            Some(cash(TransactionType::Fx, symbol, description, amount.abs(), order_id))
        } else {
            None
        };

        match tx {
            Some(tx) => transactions.push(tx),
            None => out.skipped_rows += 1,
        }
    }

    transactions.sort_by_key(|tx| *tx.date());
    debug!("DeGiro statement produced {} transactions", transactions.len());
    finish(out, transactions)
}

/// The change column holds either the amount or the currency, in which case
/// the amount sits in the next column.
fn change_amount(record: &[String], change_idx: Option<usize>) -> (Decimal, String) {
    let Some(idx) = change_idx else {
        return (Decimal::ZERO, DEFAULT_CURRENCY.to_string());
    };
    let value = record.get(idx).map(|v| v.trim()).unwrap_or("");
    if value.len() == 3 && value.chars().all(|c| c.is_ascii_alphabetic()) {
        let amount = record
            .get(idx + 1)
            .and_then(|v| parse_number(v))
            .unwrap_or_default();
        (amount, value.to_uppercase())
    } else {
        (parse_number(value).unwrap_or_default(), DEFAULT_CURRENCY.to_string())
    }
}

/// One trade per line; ISIN is the identifier until resolution.
pub fn parse_transactions(table: &Table) -> Extracted {
    let map = ColumnMap::detect(
        &table.headers,
        &[
            Field::Isin,
            Field::Name,
            Field::Quantity,
            Field::Price,
            Field::Currency,
            Field::LocalValue,
            Field::Date,
        ],
    );
    let time_col = header_named(table, "time");
    let order_cols: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            let n = normalize(h);
            n == "id" || n.ends_with("orderid")
        })
        .map(|(idx, _)| idx)
        .collect();
    let value_cols: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            let n = normalize(h);
            n.contains("value") || n.contains("total")
        })
        .map(|(idx, _)| idx)
        .collect();
    let reference_col = header_named(table, "referenceexchange");
    let venue_col = header_named(table, "venue");

    let mut out = Extracted {
        detected_columns: map.detected(),
        unmapped_columns: map.unmapped(&table.headers),
        ..Extracted::default()
    };
    let mut order_counts: HashMap<String, usize> = HashMap::new();
    let mut transactions = Vec::new();

    for (idx, record) in table.records.iter().enumerate() {
        let isin = table.value(record, map.get(Field::Isin)).to_uppercase();
        if isin.len() < 5 {
            out.skipped_rows += 1;
            continue;
        }
        let Some(date) = record_date(table, record, map.get(Field::Date), time_col) else {
            out.errors.push(format!("Row {}: invalid date", idx + 1));
            out.skipped_rows += 1;
            continue;
        };

        let name = table.value(record, map.get(Field::Name)).to_string();
        let mut quantity = parse_number(table.value(record, map.get(Field::Quantity))).unwrap_or_default();
        let price = parse_number(table.value(record, map.get(Field::Price))).unwrap_or_default();

        let local_value = parse_number(table.value(record, map.get(Field::LocalValue)))
            .filter(|v| !v.is_zero())
            .or_else(|| {
                value_cols
                    .iter()
                    .filter_map(|i| record.get(*i).and_then(|v| parse_number(v)))
                    .find(|v| !v.is_zero())
            })
            .unwrap_or_default();

        if quantity.is_zero() && price > Decimal::ZERO && !local_value.is_zero() {
            quantity = local_value.abs().checked_div(price).unwrap_or_default();
        }

        // Money in means the position was reduced.
        let side = if local_value > Decimal::ZERO || quantity < Decimal::ZERO {
            TransactionType::Sell
        } else {
            TransactionType::Buy
        };
        quantity = quantity.abs();
        if isin.starts_with("XS") {
            quantity /= Decimal::ONE_HUNDRED;
        }
        if quantity.is_zero() {
            out.skipped_rows += 1;
            continue;
        }

        let currency = map
            .get(Field::Currency)
            .map(|h| table.value(record, Some(h)).to_uppercase())
            .filter(|c| is_known_currency(c))
            .or_else(|| {
                record
                    .iter()
                    .map(|cell| cell.trim().to_uppercase())
                    .find(|cell| is_known_currency(cell))
            })
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let exchange = [reference_col, venue_col]
            .into_iter()
            .map(|col| table.value(record, col))
            .find(|v| !v.is_empty())
            .map(str::to_string);

        let external_id = order_cols
            .iter()
            .filter_map(|i| record.get(*i))
            .map(|v| v.trim())
            .find(|v| v.len() > 5)
            .map(|id| {
                let seen = order_counts.entry(id.to_string()).or_insert(0);
                let suffixed = if *seen == 0 {
                    id.to_string()
                } else {
                    format!("{}-{}", id, seen)
                };
                *seen += 1;
                suffixed
            });

        transactions.push(ParsedTransaction::new(
            side,
            date,
            isin.clone(),
            Some(isin),
            Some(name),
            quantity,
            price,
            Decimal::ZERO,
            currency,
            PLATFORM.to_string(),
            exchange,
            external_id,
        ));
    }

    transactions.sort_by_key(|tx| *tx.date());
    debug!("DeGiro transactions produced {} trades", transactions.len());
    finish(out, transactions)
}

fn finish(out: Extracted, transactions: Vec<ParsedTransaction>) -> Extracted {
    aggregate::finish(out, transactions, PLATFORM, |tx| {
        AssetType::infer_from_name(tx.name().as_deref().unwrap_or(tx.symbol()))
    })
}
