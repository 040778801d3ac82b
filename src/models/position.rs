use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Net quantities whose magnitude stays below this are a closed position.
pub const CLOSED_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

pub fn is_effectively_zero(quantity: Decimal) -> bool {
    quantity.abs() < CLOSED_EPSILON
}

#[derive(Clone, Debug, Deserialize, Eq, Getters, new, PartialEq, Serialize)]
pub struct Position {
    symbol: String,
    total_quantity_bought: Decimal,
    total_quantity_sold: Decimal,
    total_invested: Decimal,
    total_realized: Decimal,
    realized_pnl: Decimal,
    open_quantity: Decimal,
    return_percent: Decimal,
    hold_days: i64,
    dividends_collected: Decimal,
    first_trade_date: DateTime<Utc>,
    last_trade_date: DateTime<Utc>,
    transaction_count: usize,
}

impl Position {
    pub fn is_closed(&self) -> bool {
        is_effectively_zero(self.open_quantity)
    }

    pub fn average_buy_price(&self) -> Decimal {
        if self.total_quantity_bought > Decimal::ZERO {
            self.total_invested
                .checked_div(self.total_quantity_bought)
                .unwrap_or_default()
        } else {
            Decimal::ZERO
        }
    }
}
