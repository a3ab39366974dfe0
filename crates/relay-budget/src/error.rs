//! Budget subsystem errors.

use relay_core::{BudgetId, RelayError};
use thiserror::Error;

/// Errors raised by the budget registry and tracker.
#[derive(Debug, Error)]
pub enum BudgetError {
    /// No budget with the given id exists.
    #[error("budget not found: {0}")]
    NotFound(BudgetId),

    /// Period configuration is inconsistent.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// Warning/critical thresholds are out of order or out of range.
    #[error("thresholds invalid: {0}")]
    ThresholdsInvalid(String),

    /// Currency is not a known ISO-4217 code.
    #[error("unknown currency: {0}")]
    CurrencyUnknown(String),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),
}

impl From<BudgetError> for RelayError {
    fn from(error: BudgetError) -> Self {
        match error {
            BudgetError::Store(message) => Self::internal(message),
            other @ (BudgetError::NotFound(_)
            | BudgetError::InvalidPeriod(_)
            | BudgetError::ThresholdsInvalid(_)
            | BudgetError::CurrencyUnknown(_)) => {
                Self::invalid_request(other.to_string(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_internal() {
        let relay: RelayError = BudgetError::Store("connection reset".to_string()).into();
        assert_eq!(relay.code(), "internal");
        // Detail never leaks to callers
        assert_eq!(relay.public_message(), "internal error");
    }

    #[test]
    fn test_validation_errors_map_to_invalid_request() {
        let relay: RelayError =
            BudgetError::CurrencyUnknown("DOGE".to_string()).into();
        assert_eq!(relay.code(), "invalid_request");
    }
}
