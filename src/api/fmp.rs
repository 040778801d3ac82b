use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{
    ReferenceSource,
    fmp_dto::{FmpProfileDto, FmpSearchIsinDto, FmpSearchSymbolDto},
    utils::{make_request, parse_response_array},
};
use crate::{error::LookupError, models::SymbolCandidate};

const BASE_URL: &str = "https://financialmodelingprep.com/stable";

#[derive(Clone, Debug)]
pub struct FmpApi {
    client: Client,
    api_key: Option<String>,
}

impl FmpApi {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    async fn request(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<serde_json::Value, LookupError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LookupError::Unavailable("FMP_API_KEY is not set".to_string()))?;
        make_request(&self.client, BASE_URL, endpoint, params, api_key).await
    }

    async fn profile(&self, symbol: &str) -> Result<Option<FmpProfileDto>, LookupError> {
        let result = self.request("profile", &[("symbol", symbol)]).await?;
        Ok(parse_response_array::<FmpProfileDto>(result)?.into_iter().next())
    }
}

#[async_trait]
impl ReferenceSource for FmpApi {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search_by_isin(&self, isin: &str) -> Result<Vec<SymbolCandidate>, LookupError> {
        let result = self.request("search-isin", &[("isin", isin)]).await?;
        let hits = parse_response_array::<FmpSearchIsinDto>(result)?;
        debug!("FMP returned {} hits for ISIN {}", hits.len(), isin);

        let mut candidates = Vec::with_capacity(hits.len());
        for (idx, hit) in hits.iter().enumerate() {
            // Only the best hit is worth a profile call.
            let profile = if idx == 0 {
                self.profile(hit.symbol()).await.ok().flatten()
            } else {
                None
            };
            candidates.push(match profile {
                Some(profile) => profile.to_candidate(hit.name()),
                None => SymbolCandidate::new(
                    hit.symbol().clone(),
                    hit.name().clone(),
                    None,
                    None,
                    None,
                    None,
                    None,
                    None,
                    None,
                ),
            });
        }
        Ok(candidates)
    }

    async fn search_by_symbol(
        &self,
        symbol: &str,
        exchange_hint: Option<&str>,
    ) -> Result<Vec<SymbolCandidate>, LookupError> {
        let mut params = vec![("query", symbol), ("limit", "10")];
        if let Some(exchange) = exchange_hint.filter(|e| !e.trim().is_empty()) {
            params.push(("exchange", exchange));
        }
        let result = self.request("search-symbol", &params).await?;
        let hits = parse_response_array::<FmpSearchSymbolDto>(result)?;
        debug!("FMP returned {} hits for symbol {}", hits.len(), symbol);

        Ok(hits.iter().map(FmpSearchSymbolDto::to_candidate).collect())
    }
}
