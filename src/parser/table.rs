use std::io::Cursor;

use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, TimeDelta};
use csv::{ReaderBuilder, Trim};
use tracing::debug;

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Header plus records, every record padded to the header width.
#[derive(Clone, Debug, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
    pub errors: Vec<String>,
}

impl Table {
    pub fn from_text(text: &str) -> Result<Self> {
        let delimiter = detect_delimiter(text);
        debug!("Detected delimiter '{}'", delimiter as char);

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read header row")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            match record {
                Ok(rec) => rows.push(rec.iter().map(str::to_string).collect()),
                Err(err) => errors.push(format!("Row {}: {}", row_idx + 1, err)),
            }
        }

        let mut table = Self::from_rows(headers, rows);
        table.errors = errors;
        Ok(table)
    }

    /// Reads the first worksheet of an XLSX/XLS/ODS workbook.
    pub fn from_spreadsheet(bytes: &[u8]) -> Result<Self> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .context("Cannot open workbook")?;
        let range = workbook
            .worksheet_range_at(0)
            .context("Workbook has no sheets")?
            .context("Cannot read first sheet")?;

        let mut rows = range.rows().map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());
        let headers = rows
            .by_ref()
            .find(|row| row.iter().any(|cell| !cell.is_empty()))
            .unwrap_or_default();

        Ok(Self::from_rows(headers, rows.collect()))
    }

    fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers: Vec<String> = headers
            .into_iter()
            .enumerate()
            .map(|(idx, header)| {
                let clean = header.trim().trim_start_matches('\u{feff}').to_string();
                if clean.is_empty() {
                    format!("__EMPTY_{}", idx)
                } else {
                    clean
                }
            })
            .collect();

        let width = headers.len();
        let records = rows
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|mut row| {
                row.resize(width.max(row.len()), String::new());
                row
            })
            .collect();

        Self {
            headers,
            records,
            errors: Vec::new(),
        }
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    pub fn value<'a>(&self, record: &'a [String], header: Option<&str>) -> &'a str {
        header
            .and_then(|h| self.column_index(h))
            .and_then(|idx| record.get(idx))
            .map(|value| value.trim())
            .unwrap_or("")
    }
}

/// Picks the separator that splits the header line into the most fields.
fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let mut best = (b',', 0usize);
    for delimiter in DELIMITERS {
        let count = count_outside_quotes(header, delimiter as char);
        if count > best.1 {
            best = (delimiter, count);
        }
    }
    best.0
}

fn count_outside_quotes(line: &str, delimiter: char) -> usize {
    let mut in_quotes = false;
    line.chars()
        .filter(|c| {
            if *c == '"' {
                in_quotes = !in_quotes;
            }
            !in_quotes && *c == delimiter
        })
        .count()
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Excel serial date conversion using the 1899-12-30 base.
pub(crate) fn excel_serial_to_date(value: f64) -> Option<NaiveDate> {
    if !value.is_finite() {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(TimeDelta::try_days(value.floor() as i64)?)
}
