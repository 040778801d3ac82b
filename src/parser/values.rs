use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;

const KNOWN_CURRENCIES: &[&str] = &[
    "EUR", "USD", "GBP", "CHF", "TRY", "SEK", "NOK", "DKK", "JPY", "CAD", "AUD", "HKD", "PLN", "CZK",
    "HUF",
];

/// Lenient number parsing for `1.234,56`, `1,234.56`, `€ 12,50` and `1e-7`.
pub fn parse_number(field: &str) -> Option<Decimal> {
    let trimmed = field.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains(['e', 'E']) {
        if let Ok(value) = Decimal::from_scientific(trimmed) {
            return Some(value);
        }
    }

    let last_comma = trimmed.rfind(',');
    let last_dot = trimmed.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) if comma > dot => trimmed.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => trimmed.replace(',', ""),
        (Some(_), None) if trimmed.matches(',').count() > 1 => trimmed.replace(',', ""),
        (Some(_), None) => trimmed.replace(',', "."),
        _ => trimmed.to_string(),
    };

    let cleaned: String = normalized
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() || cleaned == "-" || cleaned == "." {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Accepts `YYYY-MM-DD`, `DD-MM-YYYY` (any of `-`, `/`, `.`), an optional
/// `HH:MM[:SS]` part, and RFC 3339.
pub fn parse_date(field: &str) -> Option<DateTime<Utc>> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let mut parts = trimmed.splitn(2, |c| c == ' ' || c == 'T');
    let date_part = parts.next()?;
    let time_part = parts.next().map(str::trim).unwrap_or("");

    let pieces: Vec<&str> = date_part.split(['-', '/', '.']).collect();
    if pieces.len() != 3 {
        return None;
    }
    let numbers: Vec<u32> = pieces
        .iter()
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;

    let date = if pieces[0].len() == 4 {
        NaiveDate::from_ymd_opt(numbers[0] as i32, numbers[1], numbers[2])?
    } else if pieces[2].len() == 4 {
        NaiveDate::from_ymd_opt(numbers[2] as i32, numbers[1], numbers[0])?
    } else {
        return None;
    };

    let time = parse_time(time_part).unwrap_or(NaiveTime::MIN);
    Some(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
}

fn parse_time(field: &str) -> Option<NaiveTime> {
    let field = field.split(['+', 'Z']).next()?.trim();
    NaiveTime::parse_from_str(field, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(field, "%H:%M"))
        .ok()
}

/// Maps currency codes and symbols to an ISO code.
pub fn normalize_currency(field: &str) -> Option<String> {
    let upper = field.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }
    if upper.len() == 3 && upper.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(upper);
    }
    if upper.contains('€') || upper.contains("EUR") {
        Some("EUR".to_string())
    } else if upper.contains('₺') || upper.contains("TL") || upper.contains("TRY") {
        Some("TRY".to_string())
    } else if upper.contains('£') || upper.contains("GBP") {
        Some("GBP".to_string())
    } else if upper.contains('$') || upper.contains("USD") {
        Some("USD".to_string())
    } else {
        None
    }
}

pub fn is_known_currency(field: &str) -> bool {
    KNOWN_CURRENCIES.contains(&field.trim())
}

/// ISINs are 12 characters: country prefix, 9 alphanumerics, a check digit.
pub fn looks_like_isin(field: &str) -> bool {
    let field = field.trim();
    field.len() == 12
        && field.is_ascii()
        && field[..2].chars().all(|c| c.is_ascii_uppercase())
        && field[2..].chars().all(|c| c.is_ascii_alphanumeric())
}
