use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, sqlite::SqliteRow};

use crate::models::{Asset, AssetDraft, AssetType, LedgerEntry, ParsedTransaction, Portfolio, TransactionType};

pub fn parse_i64_from_row(row: &SqliteRow, column: &str) -> Result<i64> {
    row.try_get::<i64, _>(column)
        .with_context(|| format!("Failed to parse i64 from column '{}'", column))
}

pub fn parse_string_from_row(row: &SqliteRow, column: &str) -> Result<String> {
    row.try_get::<String, _>(column)
        .with_context(|| format!("Failed to parse String from column '{}'", column))
}

pub fn parse_optional_string_from_row(row: &SqliteRow, column: &str) -> Result<Option<String>> {
    row.try_get::<Option<String>, _>(column)
        .with_context(|| format!("Failed to parse String from column '{}'", column))
}

/// Decimals are stored as text to keep their scale.
pub fn parse_decimal_from_row(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let value = parse_string_from_row(row, column)?;
    Decimal::from_str(&value)
        .with_context(|| format!("Failed to convert '{}' to Decimal for column '{}'", value, column))
}

pub fn parse_datetime_from_row(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    row.try_get::<DateTime<Utc>, _>(column)
        .with_context(|| format!("Failed to parse timestamp from column '{}'", column))
}

pub fn parse_transaction_type_from_row(row: &SqliteRow, column: &str) -> Result<TransactionType> {
    let type_str = parse_string_from_row(row, column)?;
    TransactionType::from_str(&type_str)
        .with_context(|| format!("Failed to parse TransactionType from column '{}'", column))
}

pub fn parse_asset_type_from_row(row: &SqliteRow, column: &str) -> Result<AssetType> {
    let type_str = parse_string_from_row(row, column)?;
    AssetType::from_str(&type_str)
        .with_context(|| format!("Failed to parse AssetType from column '{}'", column))
}

pub fn parse_portfolio(row: SqliteRow) -> Result<Portfolio> {
    Ok(Portfolio::new(
        parse_i64_from_row(&row, "id")?,
        parse_string_from_row(&row, "owner")?,
        parse_string_from_row(&row, "name")?,
    ))
}

pub fn parse_asset(row: SqliteRow) -> Result<Asset> {
    let id = parse_i64_from_row(&row, "id")?;
    let draft = AssetDraft {
        id: Some(id),
        portfolio_id: parse_i64_from_row(&row, "portfolio_id")?,
        symbol: parse_string_from_row(&row, "symbol")?,
        name: parse_string_from_row(&row, "name")?,
        isin: parse_optional_string_from_row(&row, "isin")?,
        asset_type: parse_asset_type_from_row(&row, "asset_type")?,
        quantity: parse_decimal_from_row(&row, "quantity")?,
        buy_price: parse_decimal_from_row(&row, "buy_price")?,
        currency: parse_string_from_row(&row, "currency")?,
        exchange: parse_optional_string_from_row(&row, "exchange")?,
        country: parse_optional_string_from_row(&row, "country")?,
        sector: parse_optional_string_from_row(&row, "sector")?,
        category: parse_optional_string_from_row(&row, "category")?,
        platform: parse_optional_string_from_row(&row, "platform")?,
        custom_group: parse_optional_string_from_row(&row, "custom_group")?,
        logo_url: parse_optional_string_from_row(&row, "logo_url")?,
    };
    Ok(Asset::from_draft(id, draft))
}

pub fn parse_ledger_entry(row: SqliteRow) -> Result<LedgerEntry> {
    let transaction = ParsedTransaction::new(
        parse_transaction_type_from_row(&row, "transaction_type")?,
        parse_datetime_from_row(&row, "transaction_date")?,
        parse_string_from_row(&row, "raw_symbol")?,
        parse_optional_string_from_row(&row, "isin")?,
        parse_optional_string_from_row(&row, "name")?,
        parse_decimal_from_row(&row, "quantity")?,
        parse_decimal_from_row(&row, "price")?,
        parse_decimal_from_row(&row, "fee")?,
        parse_string_from_row(&row, "currency")?,
        parse_string_from_row(&row, "platform")?,
        parse_optional_string_from_row(&row, "exchange")?,
        parse_optional_string_from_row(&row, "external_id")?,
    );

    Ok(LedgerEntry::new(
        parse_i64_from_row(&row, "id")?,
        parse_i64_from_row(&row, "portfolio_id")?,
        parse_string_from_row(&row, "symbol")?,
        transaction,
        parse_string_from_row(&row, "dedup_key")?,
    ))
}
