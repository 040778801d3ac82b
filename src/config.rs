use std::{env, time::Duration};

use anyhow::{Context, Result};

const DEFAULT_DATABASE: &str = "~/.portfolio-import/portfolio.db";

#[derive(Clone, Debug)]
pub struct ImportConfig {
    pub database_path: String,
    pub fmp_api_key: Option<String>,
    pub resolve_concurrency: usize,
    pub lookup_timeout: Duration,
    pub execute_concurrency: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            database_path: shellexpand::tilde(DEFAULT_DATABASE).into_owned(),
            fmp_api_key: None,
            resolve_concurrency: 5,
            lookup_timeout: Duration::from_secs(10),
            execute_concurrency: 4,
        }
    }
}

impl ImportConfig {
    /// Reads `.env` and the process environment on top of the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let database_path = match env::var("PORTFOLIO_DB") {
            Ok(path) => shellexpand::tilde(&path).into_owned(),
            Err(_) => defaults.database_path,
        };

        Ok(Self {
            database_path,
            fmp_api_key: env::var("FMP_API_KEY").ok().filter(|key| !key.trim().is_empty()),
            resolve_concurrency: read_usize("IMPORT_RESOLVE_CONCURRENCY")?
                .unwrap_or(defaults.resolve_concurrency)
                .max(1),
            lookup_timeout: read_usize("IMPORT_LOOKUP_TIMEOUT_SECS")?
                .map(|secs| Duration::from_secs(secs as u64))
                .unwrap_or(defaults.lookup_timeout),
            execute_concurrency: read_usize("IMPORT_EXECUTE_CONCURRENCY")?
                .unwrap_or(defaults.execute_concurrency)
                .max(1),
        })
    }
}

fn read_usize(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .with_context(|| format!("Failed to parse {} '{}'", name, value)),
        Err(_) => Ok(None),
    }
}
