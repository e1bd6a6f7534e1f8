// =============================================================================
// Error taxonomy for exchange-facing operations
// =============================================================================

use thiserror::Error;

/// Binance code returned when cancelling on a symbol with no open orders.
pub const CODE_UNKNOWN_ORDER: i64 = -2011;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The exchange declined the request (insufficient funds, filter failure,
    /// symbol halted, ...).
    #[error("order rejected by exchange ({code}): {msg}")]
    OrderRejected { code: i64, msg: String },

    /// Transport failure, timeout, 5xx or rate-limit response.
    #[error("network error: {0}")]
    Network(String),

    /// A quantity still fails the symbol filters after normalisation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl ExchangeError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::OrderRejected { .. })
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
