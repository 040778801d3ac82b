use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub added: usize,
    pub updated: usize,
    pub closed: usize,
    pub skipped: usize,
    pub transactions_added: usize,
    pub duplicates_ignored: usize,
    pub errors: Vec<String>,
}

impl ImportResult {
    pub fn merge(&mut self, other: ImportResult) {
        self.added += other.added;
        self.updated += other.updated;
        self.closed += other.closed;
        self.skipped += other.skipped;
        self.transactions_added += other.transactions_added;
        self.duplicates_ignored += other.duplicates_ignored;
        self.errors.extend(other.errors);
    }
}
