use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    AsRefStr, Clone, Copy, Debug, Deserialize, Display, EnumIter, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum TransactionType {
    Buy,
    Sell,
    Dividend,
    Deposit,
    Withdrawal,
    Interest,
    Fee,
    Coupon,
    Cash,
    Fx,
}

impl TransactionType {
    /// Only trades move the quantity of a position.
    pub fn is_position_affecting(&self) -> bool {
        matches!(self, TransactionType::Buy | TransactionType::Sell)
    }

    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            TransactionType::Deposit
                | TransactionType::Withdrawal
                | TransactionType::Interest
                | TransactionType::Fee
                | TransactionType::Coupon
                | TransactionType::Fx
        )
    }

    /// Maps the verbs brokers put in a type column. Returns `None` for labels
    /// that describe an instrument kind rather than a ledger event.
    pub fn parse_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }
        if let Ok(exact) = lower.parse::<TransactionType>() {
            return Some(exact);
        }

        let starts = |prefixes: &[&str]| prefixes.iter().any(|p| lower.starts_with(p));
        if starts(&["buy", "kauf", "koop", "alış", "alis", "purchase", "bought"]) {
            Some(TransactionType::Buy)
        } else if starts(&["sell", "verkauf", "verkoop", "satış", "satis", "sold"]) {
            Some(TransactionType::Sell)
        } else if starts(&["div", "temettü", "temettu"]) {
            Some(TransactionType::Dividend)
        } else if starts(&["deposit", "storting", "einzahlung"]) {
            Some(TransactionType::Deposit)
        } else if starts(&["withdraw", "auszahlung", "terugstorting"]) {
            Some(TransactionType::Withdrawal)
        } else if starts(&["interest", "rente", "zins"]) {
            Some(TransactionType::Interest)
        } else if starts(&["fee", "commission", "kosten"]) {
            Some(TransactionType::Fee)
        } else if starts(&["coupon", "kupon"]) {
            Some(TransactionType::Coupon)
        } else {
            None
        }
    }
}

/// One ledger event extracted from a statement. Cash events carry the amount
/// as `quantity` with a unit `price`.
#[derive(Clone, Debug, Deserialize, Getters, new, PartialEq, Serialize)]
pub struct ParsedTransaction {
    transaction_type: TransactionType,
    date: DateTime<Utc>,
    symbol: String,
    isin: Option<String>,
    name: Option<String>,
    quantity: Decimal,
    price: Decimal,
    fee: Decimal,
    currency: String,
    platform: String,
    exchange: Option<String>,
    external_id: Option<String>,
}

impl ParsedTransaction {
    /// Saturates instead of overflowing.
    pub fn amount(&self) -> Decimal {
        self.quantity.saturating_mul(self.price)
    }

    /// `None` when quantity times price does not fit a `Decimal`.
    pub fn checked_amount(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.price)
    }

    /// ISIN when present, otherwise the raw symbol, upper-cased.
    pub fn instrument_key(&self) -> String {
        match self.isin.as_deref().filter(|isin| !isin.trim().is_empty()) {
            Some(isin) => isin.trim().to_uppercase(),
            None => self.symbol.trim().to_uppercase(),
        }
    }

    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }

    pub fn with_isin(mut self, isin: Option<String>) -> Self {
        self.isin = isin;
        self
    }

    pub fn with_platform(mut self, platform: &str) -> Self {
        self.platform = platform.to_string();
        self
    }
}

/// A persisted ledger transaction.
#[derive(Clone, Debug, Deserialize, Getters, new, PartialEq, Serialize)]
pub struct LedgerEntry {
    id: i64,
    portfolio_id: i64,
    symbol: String,
    transaction: ParsedTransaction,
    dedup_key: String,
}

/// A ledger transaction that has not been written yet.
#[derive(Clone, Debug, Getters, new, PartialEq)]
pub struct NewLedgerEntry {
    symbol: String,
    transaction: ParsedTransaction,
    dedup_key: String,
}

impl NewLedgerEntry {
    pub fn into_entry(self, id: i64, portfolio_id: i64) -> LedgerEntry {
        LedgerEntry::new(id, portfolio_id, self.symbol, self.transaction, self.dedup_key)
    }
}
