//! Error types for planning

use crate::amount::Amount;

/// Plan generation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanGenerationError {
    /// Total stake was zero
    #[error("total stake must be positive")]
    NonPositiveTotal,

    /// Total cannot be split into the requested number of non-zero stakes
    #[error("total stake {total} too small to split across {stake_steps} stake steps")]
    TotalTooSmall {
        /// Requested total
        total: Amount,
        /// Number of stake steps
        stake_steps: usize,
    },
}

/// Errors parsing a decimal amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Input was empty
    #[error("empty amount")]
    Empty,

    /// Input contained something other than digits and one decimal point
    #[error("invalid amount '{0}'")]
    Invalid(String),

    /// More fractional digits than the fixed-point scale holds
    #[error("amount '{0}' has more than 18 decimal places")]
    TooPrecise(String),

    /// Value does not fit the fixed-point range
    #[error("amount '{0}' out of range")]
    Overflow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_error_display() {
        let err = PlanGenerationError::TotalTooSmall {
            total: Amount::from_base_units(3),
            stake_steps: 5,
        };
        assert!(err.to_string().contains("5 stake steps"));
        assert_eq!(
            PlanGenerationError::NonPositiveTotal.to_string(),
            "total stake must be positive"
        );
    }
}
