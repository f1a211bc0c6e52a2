//! The loan registry: who holds which copy, since when, and until when.
//!
//! Loans are never deleted. Returning a copy flips the loan to `returned`
//! and stamps who accepted it back and when.

use chrono::{DateTime, Duration, Utc};
use lending_store::Transaction;
use lending_types::{ActorId, CatalogId, LoanId, LoanRecord, LoanStatus};
use tracing::debug;

use crate::commands::LoanFilter;
use crate::config::DEFAULT_LOAN_PERIOD_DAYS;
use crate::error::{Entity, LendingError, LendingResult};

#[derive(Debug, Clone, Copy)]
pub struct LoanRegistry {
    loan_period: Duration,
}

impl Default for LoanRegistry {
    fn default() -> Self {
        Self::new(Duration::days(i64::from(DEFAULT_LOAN_PERIOD_DAYS)))
    }
}

impl LoanRegistry {
    pub fn new(loan_period: Duration) -> Self {
        Self { loan_period }
    }

    pub fn loan_period(&self) -> Duration {
        self.loan_period
    }

    /// Issue a copy to `requester`. The registry re-checks that the reader
    /// does not already hold the title even though request dedup should have
    /// prevented it.
    pub fn open_loan<T: Transaction>(
        &self,
        tx: &mut T,
        requester: ActorId,
        catalog: &CatalogId,
        approver: ActorId,
        issued_at: DateTime<Utc>,
    ) -> LendingResult<LoanRecord> {
        if tx.active_loan(requester, catalog)?.is_some() {
            return Err(LendingError::DuplicateLoan {
                requester,
                catalog: catalog.clone(),
            });
        }
        let expected_return_at = issued_at
            .checked_add_signed(self.loan_period)
            .ok_or_else(|| {
                LendingError::InvalidOperation(format!(
                    "loan period of {} days from {issued_at} is out of range",
                    self.loan_period.num_days()
                ))
            })?;
        let record = LoanRecord {
            id: tx.next_loan_id()?,
            tenant: tx.tenant(),
            requester,
            catalog: catalog.clone(),
            approver,
            status: LoanStatus::Active,
            issued_at,
            expected_return_at,
            returned_at: None,
            return_approver: None,
        };
        tx.insert_loan(record.clone())?;
        debug!(
            tenant = %record.tenant,
            loan = %record.id,
            %requester,
            %catalog,
            %approver,
            due = %record.expected_return_at,
            "loan opened"
        );
        Ok(record)
    }

    /// Mark an active loan returned. A copy cannot come back before it went
    /// out.
    pub fn close_loan<T: Transaction>(
        &self,
        tx: &mut T,
        id: LoanId,
        return_approver: ActorId,
        returned_at: DateTime<Utc>,
    ) -> LendingResult<LoanRecord> {
        let mut record = tx
            .loan(id)?
            .ok_or_else(|| LendingError::not_found(Entity::Loan, id))?;
        if !record.is_active() {
            return Err(LendingError::AlreadyReturned { loan: id });
        }
        if returned_at < record.issued_at {
            return Err(LendingError::InvalidOperation(format!(
                "loan {id} issued at {} cannot be returned at {returned_at}",
                record.issued_at
            )));
        }
        record.status = LoanStatus::Returned;
        record.returned_at = Some(returned_at);
        record.return_approver = Some(return_approver);
        tx.update_loan(record.clone())?;
        debug!(tenant = %record.tenant, loan = %id, approver = %return_approver, "loan closed");
        Ok(record)
    }

    pub fn find_active_loan<T: Transaction>(
        &self,
        tx: &T,
        requester: ActorId,
        catalog: &CatalogId,
    ) -> LendingResult<LoanRecord> {
        tx.active_loan(requester, catalog)?.ok_or_else(|| {
            LendingError::not_found(Entity::Loan, format!("active loan of {catalog} by {requester}"))
        })
    }

    /// Earliest expected return among the title's active loans.
    pub fn next_availability_date<T: Transaction>(
        &self,
        tx: &T,
        catalog: &CatalogId,
    ) -> LendingResult<Option<DateTime<Utc>>> {
        Ok(tx
            .active_loans_for(catalog)?
            .iter()
            .map(|l| l.expected_return_at)
            .min())
    }

    /// Number of copies of `catalog` currently out.
    pub fn count_active<T: Transaction>(&self, tx: &T, catalog: &CatalogId) -> LendingResult<u32> {
        let count = tx.active_loans_for(catalog)?.len();
        u32::try_from(count).map_err(|_| {
            LendingError::ConsistencyFault(format!("{count} active loans of {catalog}"))
        })
    }

    pub fn list<T: Transaction>(&self, tx: &T, filter: &LoanFilter) -> LendingResult<Vec<LoanRecord>> {
        Ok(tx
            .loans()?
            .into_iter()
            .filter(|l| filter.matches(l))
            .collect())
    }
}
