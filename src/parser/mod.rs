//! Statement parsing: raw file bytes to preview rows and ledger events.

pub mod aggregate;
pub mod columns;
pub mod degiro;
pub mod generic;
pub mod kraken;
pub mod table;
pub mod values;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use encoding_rs::WINDOWS_1254;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{info, warn};

use crate::models::{ParsedRow, ParsedTransaction};

use table::Table;

#[derive(Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectedFormat {
    Kraken,
    DegiroStatement,
    Degiro,
    Generic,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ParseResult {
    pub success: bool,
    pub rows: Vec<ParsedRow>,
    pub transactions: Vec<ParsedTransaction>,
    pub errors: Vec<String>,
    pub detected_columns: BTreeMap<String, String>,
    pub detected_format: Option<DetectedFormat>,
    pub unmapped_columns: Vec<String>,
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub closed_position_count: usize,
}

impl ParseResult {
    fn failed(error: String) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }
}

/// Output of one dialect before it is wrapped into a `ParseResult`.
#[derive(Debug, Default)]
pub struct Extracted {
    pub rows: Vec<ParsedRow>,
    pub transactions: Vec<ParsedTransaction>,
    pub skipped_rows: usize,
    pub closed_position_count: usize,
    pub errors: Vec<String>,
    pub detected_columns: BTreeMap<String, String>,
    pub unmapped_columns: Vec<String>,
}

pub fn parse(bytes: &[u8], platform_hint: Option<&str>) -> ParseResult {
    parse_at(bytes, platform_hint, Utc::now())
}

/// Like `parse`, with the timestamp used for events synthesized from
/// holdings snapshots.
pub fn parse_at(bytes: &[u8], platform_hint: Option<&str>, now: DateTime<Utc>) -> ParseResult {
    let table = if is_spreadsheet(bytes) {
        Table::from_spreadsheet(bytes)
    } else {
        Table::from_text(&decode_text(bytes))
    };
    let table = match table {
        Ok(table) => table,
        Err(err) => {
            warn!("Failed to read statement: {:#}", err);
            return ParseResult::failed(format!("{:#}", err));
        }
    };

    if table.records.is_empty() {
        let mut result = ParseResult::failed("No data found in file".to_string());
        result.errors.extend(table.errors);
        return result;
    }

    let format = detect_format(&table.headers, platform_hint);
    let extracted = match format {
        DetectedFormat::Kraken => kraken::parse(&table),
        DetectedFormat::DegiroStatement => degiro::parse_statement(&table),
        DetectedFormat::Degiro => degiro::parse_transactions(&table),
        DetectedFormat::Generic => generic::parse(&table, platform_hint, now),
    };

    let mut errors = table.errors;
    errors.extend(extracted.errors);
    let success = !(extracted.rows.is_empty() && extracted.transactions.is_empty());
    if !success && errors.is_empty() {
        errors.push("No rows could be parsed".to_string());
    }

    info!(
        "Parsed {} rows and {} transactions as {} ({} skipped)",
        extracted.rows.len(),
        extracted.transactions.len(),
        format,
        extracted.skipped_rows
    );

    ParseResult {
        success,
        rows: extracted.rows,
        transactions: extracted.transactions,
        errors,
        detected_columns: extracted.detected_columns,
        detected_format: Some(format),
        unmapped_columns: extracted.unmapped_columns,
        total_rows: table.records.len(),
        skipped_rows: extracted.skipped_rows,
        closed_position_count: extracted.closed_position_count,
    }
}

/// A platform hint naming a known broker wins over header sniffing.
pub fn detect_format(headers: &[String], platform_hint: Option<&str>) -> DetectedFormat {
    let hint = platform_hint.unwrap_or_default().to_lowercase();
    if hint.contains("kraken") {
        return DetectedFormat::Kraken;
    }
    if hint.contains("degiro") {
        return if degiro::is_statement(headers) {
            DetectedFormat::DegiroStatement
        } else {
            DetectedFormat::Degiro
        };
    }

    if kraken::is_kraken(headers) {
        DetectedFormat::Kraken
    } else if degiro::is_statement(headers) {
        DetectedFormat::DegiroStatement
    } else if degiro::is_transactions(headers) {
        DetectedFormat::Degiro
    } else {
        DetectedFormat::Generic
    }
}

fn is_spreadsheet(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0])
}

/// UTF-8 (BOM stripped) with a Windows-1254 fallback for Turkish bank
/// exports.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) if !looks_like_mojibake(text) => text.to_string(),
        Ok(text) => {
            let (decoded, _, _) = WINDOWS_1254.decode(bytes);
            if decoded.chars().any(|c| "İıŞşĞğÜüÖöÇç".contains(c)) {
                decoded.into_owned()
            } else {
                text.to_string()
            }
        }
        Err(_) => {
            let (decoded, _, _) = WINDOWS_1254.decode(bytes);
            decoded.into_owned()
        }
    }
}

fn looks_like_mojibake(text: &str) -> bool {
    let head: String = text.chars().take(3000).collect();
    let upper = head.to_uppercase();
    let turkish_bank = ["YATIRIM", "PORTF", "BANKASI", "HESABI", "EKSTRE"]
        .iter()
        .any(|word| upper.contains(word));
    turkish_bank && head.chars().any(|c| "›‹˝ˆ¸˛÷ﬁﬂ«»È".contains(c))
}
