//! Review ordering: every row lands in exactly one bucket, dividends follow
//! the position they belong to.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::models::{AssetType, CLOSED_EPSILON, ParsedRow, ResolvedInstrument};

#[derive(Clone, Copy, Debug, Deserialize, Display, EnumIter, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    Open,
    Closed,
    Dividend,
    Statement,
}

/// Precedence: cash, dividend, other statement types, then quantity.
pub fn categorize(asset_type: AssetType, quantity: Decimal) -> Category {
    match asset_type {
        AssetType::Cash => Category::Statement,
        AssetType::Dividend => Category::Dividend,
        AssetType::Deposit
        | AssetType::Withdrawal
        | AssetType::Interest
        | AssetType::Fee
        | AssetType::Coupon => Category::Statement,
        _ if quantity > CLOSED_EPSILON => Category::Open,
        _ => Category::Closed,
    }
}

/// Anything that can be placed in a review bucket.
pub trait Reviewable {
    fn kind(&self) -> AssetType;
    fn net_quantity(&self) -> Decimal;
    /// Upper-cased, non-empty symbol and ISIN.
    fn identifiers(&self) -> Vec<String>;
}

impl Reviewable for ParsedRow {
    fn kind(&self) -> AssetType {
        *self.asset_type()
    }

    fn net_quantity(&self) -> Decimal {
        *self.quantity()
    }

    fn identifiers(&self) -> Vec<String> {
        self.match_keys()
    }
}

impl Reviewable for ResolvedInstrument {
    fn kind(&self) -> AssetType {
        *self.row().asset_type()
    }

    fn net_quantity(&self) -> Decimal {
        *self.quantity()
    }

    fn identifiers(&self) -> Vec<String> {
        self.raw_keys()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupedRow<'a, T> {
    /// Position in the input.
    pub index: usize,
    pub row: &'a T,
    pub category: Category,
    /// Display bucket; a dividend takes the bucket of the row it follows.
    pub bucket: Category,
    /// Input index of the position a dividend is attached to.
    pub attached_to: Option<usize>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BucketCounts {
    pub open: usize,
    pub closed: usize,
    pub statement: usize,
}

fn shares_identifier(a: &[String], b: &[String]) -> bool {
    a.iter().any(|key| b.contains(key))
}

/// For every row, its category and the input index of the position it is
/// attached to (dividends only).
fn attach<T: Reviewable>(rows: &[T]) -> Vec<(Category, Option<usize>)> {
    let categories: Vec<Category> = rows
        .iter()
        .map(|row| categorize(row.kind(), row.net_quantity()))
        .collect();
    let keys: Vec<Vec<String>> = rows.iter().map(Reviewable::identifiers).collect();

    let first_match = |dividend: usize, wanted: Category| {
        (0..rows.len()).find(|&idx| {
            categories[idx] == wanted && shares_identifier(&keys[dividend], &keys[idx])
        })
    };

    categories
        .iter()
        .enumerate()
        .map(|(idx, category)| match category {
            Category::Dividend => {
                let parent = first_match(idx, Category::Open).or_else(|| first_match(idx, Category::Closed));
                (*category, parent)
            }
            _ => (*category, None),
        })
        .collect()
}

fn bucket_of(category: Category, parent: Option<usize>, categories: &[(Category, Option<usize>)]) -> Category {
    match (category, parent) {
        (Category::Dividend, Some(parent)) => categories[parent].0,
        (Category::Dividend, None) => Category::Statement,
        (other, _) => other,
    }
}

/// Open positions with their dividends, closed positions with theirs, then
/// statement lines and unmatched dividends. Output length equals input length.
pub fn group<T: Reviewable>(rows: &[T]) -> Vec<GroupedRow<'_, T>> {
    let attached = attach(rows);
    let entry = |idx: usize| GroupedRow {
        index: idx,
        row: &rows[idx],
        category: attached[idx].0,
        bucket: bucket_of(attached[idx].0, attached[idx].1, &attached),
        attached_to: attached[idx].1,
    };

    let mut out = Vec::with_capacity(rows.len());
    for position_bucket in [Category::Open, Category::Closed] {
        for (idx, (category, _)) in attached.iter().enumerate() {
            if *category != position_bucket {
                continue;
            }
            out.push(entry(idx));
            for (div_idx, (_, parent)) in attached.iter().enumerate() {
                if *parent == Some(idx) {
                    out.push(entry(div_idx));
                }
            }
        }
    }
    for (idx, (category, parent)) in attached.iter().enumerate() {
        if *category == Category::Statement || (*category == Category::Dividend && parent.is_none()) {
            out.push(entry(idx));
        }
    }
    out
}

pub fn counts_by_bucket<T: Reviewable>(rows: &[T]) -> BucketCounts {
    let attached = attach(rows);
    let mut counts = BucketCounts::default();
    for (category, parent) in &attached {
        match bucket_of(*category, *parent, &attached) {
            Category::Open => counts.open += 1,
            Category::Closed => counts.closed += 1,
            _ => counts.statement += 1,
        }
    }
    counts
}
