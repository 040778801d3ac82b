use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{AssetType, ParsedRow, ParsedTransaction, TransactionType};

use super::{
    Extracted,
    aggregate::finish,
    columns::{ColumnMap, Field},
    table::Table,
    values::{looks_like_isin, normalize_currency, parse_date, parse_number},
};

const DEFAULT_CURRENCY: &str = "USD";

const FIELD_ORDER: [Field; 13] = [
    Field::Symbol,
    Field::Isin,
    Field::Date,
    Field::Quantity,
    Field::Price,
    Field::Currency,
    Field::Name,
    Field::Type,
    Field::Platform,
    Field::LocalValue,
    Field::Fee,
    Field::OrderId,
    Field::TxId,
];

/// Reads a file in no known broker dialect. Lines are ledger events when the
/// file has a date column and a type column with event verbs, holdings
/// otherwise.
pub fn parse(table: &Table, platform_hint: Option<&str>, now: DateTime<Utc>) -> Extracted {
    let map = ColumnMap::detect(&table.headers, &FIELD_ORDER);
    let mut out = Extracted {
        detected_columns: map.detected(),
        unmapped_columns: map.unmapped(&table.headers),
        ..Extracted::default()
    };

    if !map.has(Field::Symbol) && !map.has(Field::Isin) {
        out.errors.push(
            "Could not detect symbol or ISIN column. Please ensure your file has a column for ticker symbols or ISINs."
                .to_string(),
        );
        out.skipped_rows = table.records.len();
        return out;
    }

    if is_ledger(table, &map) {
        debug!("Generic file read as a transaction ledger");
        parse_ledger(table, &map, platform_hint, out)
    } else {
        debug!("Generic file read as a holdings snapshot");
        parse_snapshot(table, &map, platform_hint, now, out)
    }
}

fn is_ledger(table: &Table, map: &ColumnMap) -> bool {
    if !map.has(Field::Date) || !map.has(Field::Type) {
        return false;
    }
    table
        .records
        .iter()
        .any(|record| TransactionType::parse_label(table.value(record, map.get(Field::Type))).is_some())
}

fn platform_for(table: &Table, record: &[String], map: &ColumnMap, hint: Option<&str>) -> String {
    let value = table.value(record, map.get(Field::Platform));
    if !value.is_empty() {
        value.to_string()
    } else {
        hint.unwrap_or_default().trim().to_string()
    }
}

fn isin_of(table: &Table, record: &[String], map: &ColumnMap) -> Option<String> {
    Some(table.value(record, map.get(Field::Isin)).to_uppercase()).filter(|isin| looks_like_isin(isin))
}

fn parse_ledger(table: &Table, map: &ColumnMap, hint: Option<&str>, mut out: Extracted) -> Extracted {
    let mut transactions = Vec::new();

    for (idx, record) in table.records.iter().enumerate() {
        let label = table.value(record, map.get(Field::Type));
        let Some(kind) = TransactionType::parse_label(label) else {
            out.skipped_rows += 1;
            continue;
        };
        let raw_date = table.value(record, map.get(Field::Date));
        let Some(date) = parse_date(raw_date) else {
            out.errors.push(format!("Row {}: invalid date '{}'", idx + 1, raw_date));
            out.skipped_rows += 1;
            continue;
        };

        let isin = isin_of(table, record, map);
        let currency = normalize_currency(table.value(record, map.get(Field::Currency)))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let symbol = match (&isin, table.value(record, map.get(Field::Symbol))) {
            (_, symbol) if !symbol.is_empty() => symbol.to_uppercase(),
            (Some(isin), _) => isin.clone(),
            (None, _) if !kind.is_position_affecting() => currency.clone(),
            (None, _) => {
                out.skipped_rows += 1;
                continue;
            }
        };

        let quantity = parse_number(table.value(record, map.get(Field::Quantity)));
        let price = parse_number(table.value(record, map.get(Field::Price)));
        let value = parse_number(table.value(record, map.get(Field::LocalValue)));
        let fee = parse_number(table.value(record, map.get(Field::Fee))).unwrap_or_default().abs();

        let (quantity, price) = if kind.is_position_affecting() {
            let price = price
                .or_else(|| match (value, quantity) {
                    (Some(v), Some(q)) if !q.is_zero() => v.checked_div(q).map(|p| p.abs()),
                    _ => None,
                })
                .unwrap_or_default();
            (quantity.unwrap_or_default().abs(), price)
        } else {
            let amount = match (quantity, price, value) {
                (_, _, Some(v)) => Some(v),
                (Some(q), Some(p), None) => q.checked_mul(p),
                (Some(q), None, None) => Some(q),
                _ => Some(Decimal::ZERO),
            };
            let Some(amount) = amount else {
                out.errors.push(format!("Row {}: amount out of range", idx + 1));
                out.skipped_rows += 1;
                continue;
            };
            (amount.abs(), Decimal::ONE)
        };
        if quantity.is_zero() {
            out.skipped_rows += 1;
            continue;
        }

        let name = Some(table.value(record, map.get(Field::Name)).to_string()).filter(|n| !n.is_empty());
        let external_id = [map.get(Field::TxId), map.get(Field::OrderId)]
            .into_iter()
            .map(|col| table.value(record, col))
            .find(|v| !v.is_empty())
            .map(str::to_string);

        transactions.push(ParsedTransaction::new(
            kind,
            date,
            symbol,
            isin,
            name,
            quantity,
            price,
            fee,
            currency,
            platform_for(table, record, map, hint),
            None,
            external_id,
        ));
    }

    transactions.sort_by_key(|tx| *tx.date());
    let platform = hint.unwrap_or_default().trim();
    finish(out, transactions, platform, |tx| {
        AssetType::infer_from_name(tx.name().as_deref().unwrap_or(tx.symbol()))
    })
}

fn parse_snapshot(
    table: &Table,
    map: &ColumnMap,
    hint: Option<&str>,
    now: DateTime<Utc>,
    mut out: Extracted,
) -> Extracted {
    for (idx, record) in table.records.iter().enumerate() {
        let Some(row) = snapshot_row(table, record, map, hint) else {
            out.skipped_rows += 1;
            continue;
        };
        if let Some(tx) = opening_transaction(&row, now) {
            if tx.checked_amount().is_none() {
                out.errors.push(format!("Row {}: value out of range", idx + 1));
                out.skipped_rows += 1;
                continue;
            }
            out.transactions.push(tx);
        }
        out.rows.push(row);
    }
    out
}

/// Confidence starts at 100 and drops for every field that had to be guessed.
pub fn snapshot_row(table: &Table, record: &[String], map: &ColumnMap, hint: Option<&str>) -> Option<ParsedRow> {
    let mut warnings = Vec::new();
    let mut confidence: i32 = 100;

    let isin = isin_of(table, record, map);
    let raw_symbol = table.value(record, map.get(Field::Symbol)).to_uppercase();
    let symbol = match &isin {
        Some(isin) => {
            confidence = 80;
            isin.clone()
        }
        None if !raw_symbol.is_empty() => raw_symbol,
        None => return None,
    };

    let raw_quantity = table.value(record, map.get(Field::Quantity));
    let quantity = if raw_quantity.is_empty() {
        warnings.push("Missing quantity".to_string());
        confidence -= 30;
        Decimal::ZERO
    } else {
        match parse_number(raw_quantity).filter(|q| *q > Decimal::ZERO) {
            Some(q) => q,
            None => {
                warnings.push("Invalid quantity, defaulted to 0".to_string());
                confidence -= 20;
                Decimal::ZERO
            }
        }
    };

    let raw_price = table.value(record, map.get(Field::Price));
    let price = if raw_price.is_empty() {
        warnings.push("Missing buy price - will need to be set".to_string());
        confidence -= 20;
        Decimal::ZERO
    } else {
        match parse_number(raw_price).filter(|p| *p >= Decimal::ZERO) {
            Some(p) => p,
            None => {
                warnings.push("Invalid price".to_string());
                confidence -= 15;
                Decimal::ZERO
            }
        }
    };

    let raw_currency = table.value(record, map.get(Field::Currency));
    let currency = if raw_currency.is_empty() {
        confidence -= 5;
        implied_currency(&symbol)
    } else {
        normalize_currency(raw_currency).unwrap_or_else(|| implied_currency(&symbol))
    };

    let name = table.value(record, map.get(Field::Name)).to_string();
    let raw_type = table.value(record, map.get(Field::Type));
    let asset_type = if !raw_type.is_empty() {
        AssetType::from_label(raw_type)
    } else if !name.is_empty() {
        AssetType::infer_from_name(&name)
    } else {
        AssetType::Stock
    };

    Some(ParsedRow::new(
        symbol,
        isin,
        name,
        quantity,
        price,
        currency,
        asset_type,
        platform_for(table, record, map, hint),
        None,
        confidence.clamp(0, 100) as u8,
        warnings,
    ))
}

fn implied_currency(symbol: &str) -> String {
    if symbol.ends_with(".IS") || symbol.contains("BIST") {
        "TRY".to_string()
    } else {
        DEFAULT_CURRENCY.to_string()
    }
}

/// Opening event that makes a holdings line derivable from the ledger.
pub fn opening_transaction(row: &ParsedRow, now: DateTime<Utc>) -> Option<ParsedTransaction> {
    if *row.quantity() <= Decimal::ZERO || *row.asset_type() == AssetType::Dividend {
        return None;
    }
    let (kind, price) = if row.asset_type().is_statement() {
        (TransactionType::Deposit, Decimal::ONE)
    } else {
        (TransactionType::Buy, *row.price())
    };
    let key = row.isin().clone().unwrap_or_else(|| row.symbol().clone());

    Some(ParsedTransaction::new(
        kind,
        now,
        row.symbol().clone(),
        row.isin().clone(),
        Some(row.name().clone()).filter(|n| !n.is_empty()),
        *row.quantity(),
        price,
        Decimal::ZERO,
        row.currency().clone(),
        row.platform().clone(),
        row.exchange().clone(),
        Some(format!("SNAPSHOT-{}-{}-{}", key, row.quantity().normalize(), price.normalize())),
    ))
}
