use thiserror::Error;

/// Fields that must be set before an import can be executed.
#[derive(Clone, Copy, Debug, Error, Eq, Hash, PartialEq)]
pub enum ValidationError {
    #[error("a target portfolio must be selected")]
    MissingPortfolio,
    #[error("a platform label is required")]
    MissingPlatform,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not parse statement: {}", .0.join("; "))]
    Parse(Vec<String>),
    /// Every field still missing, in form order.
    #[error("import is not ready: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Validation(Vec<ValidationError>),
    #[error("failed to write {symbol}: {message}")]
    Execution { symbol: String, message: String },
    #[error("{0}")]
    InvalidTransition(String),
    #[error("symbol resolution was cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Failure of a single reference lookup. Never fatal for a batch.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup timed out after {0}s")]
    Timeout(u64),
    #[error("reference source unavailable: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    Http(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        LookupError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for LookupError {
    fn from(err: serde_json::Error) -> Self {
        LookupError::Decode(err.to_string())
    }
}
