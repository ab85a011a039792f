//! Crate-wide error taxonomy (spec §7).
//!
//! Components raise their own narrow error enum (`ExchangeError`,
//! `IndicatorError`, `LlmError`, `TradeError`); `CoreError` composes them only
//! at the boundary the Scheduler catches, so a job failure can be logged and
//! the schedule continued without every layer needing to know about every
//! other layer's error type.

use thiserror::Error;

use crate::domain::repositories::exchange_client::ExchangeError;
use crate::domain::repositories::llm_client::LlmError;
use crate::domain::services::indicators::IndicatorError;
use crate::persistence::DatabaseError;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Value must be non-negative")]
    MustBeNonNegative,

    #[error("Value must be finite")]
    MustBeFinite,
}

impl From<ValidationError> for String {
    fn from(error: ValidationError) -> Self {
        error.to_string()
    }
}

/// Errors the Trader's `Open`/`Close` flow can raise (spec §4.5, §7).
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("position already exists for {0}")]
    AlreadyOpen(String),

    #[error("maximum concurrent trades reached")]
    MaxConcurrentTrades,

    #[error("no position found for {0}")]
    NotFound(String),

    #[error("stop-loss distance is ~0, refusing to size the position")]
    BadStopDistance,

    #[error("required margin exceeds available balance")]
    InsufficientMargin,

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Top-level error composed at the Scheduler boundary; a job that returns
/// this is logged and the schedule continues (spec §7: a panicking job is
/// caught at the job boundary too, never the process).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
