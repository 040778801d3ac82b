use std::collections::{BTreeMap, HashSet};

use strum_macros::{AsRefStr, Display};

#[derive(AsRefStr, Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[strum(serialize_all = "camelCase")]
pub enum Field {
    Symbol,
    Isin,
    Name,
    Quantity,
    Price,
    Currency,
    Type,
    Platform,
    LocalValue,
    Date,
    Description,
    Change,
    Balance,
    OrderId,
    TxId,
    RefId,
    Wallet,
    Subtype,
    Fee,
}

impl Field {
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::Symbol => &["symbol", "ticker", "code", "sembol", "kod", "hisse", "stock", "asset"],
            Field::Isin => &["isin"],
            Field::Name => &[
                "name", "company", "şirket", "isim", "ad", "firma", "description", "product",
            ],
            Field::Quantity => &[
                "quantity", "qty", "amount", "adet", "miktar", "lot", "shares", "units",
            ],
            Field::Price => &[
                "buyprice", "buy_price", "cost", "price", "fiyat", "maliyet", "alış", "alis",
                "avg_cost", "average",
            ],
            Field::Currency => &["currency", "cur", "para birimi", "doviz", "döviz", "ccy"],
            Field::Type => &["type", "asset_type", "category", "tip", "tür", "tur", "kategori"],
            Field::Platform => &["platform", "broker", "exchange", "borsa", "aracı kurum", "araci"],
            Field::LocalValue => &[
                "local value", "localvalue", "value", "total", "wert", "betrag", "gesamtwert",
                "tutar",
            ],
            Field::Date => &["date", "tarih", "transaction date", "time"],
            Field::Description => &["description", "omschrijving", "beschreibung"],
            Field::Change => &["change", "mutatie", "veraenderung", "veränderung"],
            Field::Balance => &["balance", "saldo", "bestand"],
            Field::OrderId => &["orderid", "order id", "order-id", "auftragsnummer"],
            Field::TxId => &["txid", "transaction id", "tx id"],
            Field::RefId => &["refid", "reference id", "ref id"],
            Field::Wallet => &["wallet"],
            Field::Subtype => &["subtype", "sub type"],
            Field::Fee => &["fee", "fees", "commission"],
        }
    }
}

/// Lowercases, drops separators and folds Turkish letters.
pub fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .map(|c| match c {
            'ş' => 's',
            'ı' | 'i' => 'i',
            'ü' => 'u',
            'ö' => 'o',
            'ç' => 'c',
            'ğ' => 'g',
            other => other,
        })
        .collect::<String>()
        .replace("i\u{307}", "i")
}

/// Exact, then prefix, then substring match of any alias, in alias order.
/// Aliases of three letters or less only match exactly.
pub fn find_best_match<'a>(columns: &[&'a str], field: Field) -> Option<&'a str> {
    let normalized: Vec<(String, &'a str)> =
        columns.iter().map(|col| (normalize(col), *col)).collect();

    for alias in field.aliases() {
        let alias = normalize(alias);

        if let Some((_, col)) = normalized.iter().find(|(n, _)| *n == alias) {
            return Some(col);
        }
        if alias.chars().count() <= 3 {
            continue;
        }
        if let Some((_, col)) = normalized.iter().find(|(n, _)| n.starts_with(&alias)) {
            return Some(col);
        }
        if let Some((_, col)) = normalized.iter().find(|(n, _)| n.contains(&alias)) {
            return Some(col);
        }
    }
    None
}

pub fn has_normalized(headers: &[String], name: &str) -> bool {
    headers.iter().any(|h| normalize(h) == name)
}

/// Field to header assignment; each header is used at most once.
#[derive(Clone, Debug, Default)]
pub struct ColumnMap {
    map: BTreeMap<Field, String>,
}

impl ColumnMap {
    pub fn detect(headers: &[String], order: &[Field]) -> Self {
        let mut used: HashSet<&str> = HashSet::new();
        let mut map = BTreeMap::new();

        for field in order {
            let free: Vec<&str> = headers
                .iter()
                .map(String::as_str)
                .filter(|h| !used.contains(h))
                .collect();
            if let Some(header) = find_best_match(&free, *field) {
                used.insert(header);
                map.insert(*field, header.to_string());
            }
        }

        Self { map }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.map.get(&field).map(String::as_str)
    }

    pub fn has(&self, field: Field) -> bool {
        self.map.contains_key(&field)
    }

    pub fn detected(&self) -> BTreeMap<String, String> {
        self.map
            .iter()
            .map(|(field, header)| (field.to_string(), header.clone()))
            .collect()
    }

    pub fn unmapped(&self, headers: &[String]) -> Vec<String> {
        headers
            .iter()
            .filter(|h| !self.map.values().any(|mapped| mapped == *h))
            .cloned()
            .collect()
    }
}
