pub mod fmp;
pub mod fmp_dto;
pub mod utils;

use async_trait::async_trait;

use crate::{error::LookupError, models::SymbolCandidate};

pub use fmp::FmpApi;

/// External instrument search. Candidates come back best first.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// False when the source cannot be used at all, e.g. without credentials.
    fn is_available(&self) -> bool;

    async fn search_by_isin(&self, isin: &str) -> Result<Vec<SymbolCandidate>, LookupError>;

    async fn search_by_symbol(
        &self,
        symbol: &str,
        exchange_hint: Option<&str>,
    ) -> Result<Vec<SymbolCandidate>, LookupError>;
}
