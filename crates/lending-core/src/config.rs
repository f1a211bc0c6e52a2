use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{LendingError, LendingResult};

/// Days a copy may stay out before it is expected back.
pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 14;

/// Longest loan period a configuration may ask for (ten years).
pub const MAX_LOAN_PERIOD_DAYS: u32 = 3650;

/// Configuration for the lending workflow engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Loan period added to the issue date to get the expected return date.
    pub loan_period_days: u32,
    /// When `true`, raising a borrow request for a title with no copies on
    /// the shelf fails with `OutOfStock`. When `false` the check only logs
    /// and the request is queued for an approver; approval re-checks either
    /// way.
    pub raise_requires_stock: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            raise_requires_stock: true,
        }
    }
}

impl EngineConfig {
    pub fn loan_period(&self) -> Duration {
        Duration::days(i64::from(self.loan_period_days))
    }

    pub fn validate(&self) -> LendingResult<()> {
        if self.loan_period_days == 0 {
            return Err(LendingError::InvalidOperation(
                "loan_period_days must be at least 1".into(),
            ));
        }
        if self.loan_period_days > MAX_LOAN_PERIOD_DAYS {
            return Err(LendingError::InvalidOperation(format!(
                "loan_period_days must be at most {MAX_LOAN_PERIOD_DAYS}, got {}",
                self.loan_period_days
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loan_period_is_two_weeks() {
        let c = EngineConfig::default();
        assert_eq!(c.loan_period(), Duration::days(14));
        assert!(c.raise_requires_stock);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_day_period_rejected() {
        let c = EngineConfig {
            loan_period_days: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn oversized_period_rejected() {
        let c = EngineConfig {
            loan_period_days: 100_000_000,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(LendingError::InvalidOperation(_))));

        let longest = EngineConfig {
            loan_period_days: MAX_LOAN_PERIOD_DAYS,
            ..Default::default()
        };
        assert!(longest.validate().is_ok());
    }
}
