//! Error taxonomy: CSV/symbol parse failures vs. market data gateway failures.

use thiserror::Error;

/// Malformed export structure. Fatal for the single call, never retried.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("export has no header row")]
    MissingHeader,

    #[error("export is missing required column {0:?}")]
    MissingColumn(String),

    #[error("malformed option symbol {0:?} (want \"UNDERLYING MM/DD/YYYY STRIKE C|P\")")]
    BadOptionSymbol(String),

    #[error("bad expiration date {0:?}")]
    BadDate(String, #[source] chrono::ParseError),

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Failures from the market data gateway. Rendered to the caller as an
/// `{"error": ...}` object, never a panic.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("no data found for {0}")]
    NotFound(String),

    #[error("no options available for {0}")]
    NoOptions(String),

    #[error("{0}")]
    Restricted(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
