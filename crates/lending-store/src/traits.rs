//! The [`LendingStore`] and [`Transaction`] traits.
//!
//! A backend (in-memory, relational) implements these to give the engine
//! all-or-nothing units of work over the three lending tables: inventory,
//! outstanding requests, and loans.

use lending_types::{
    ActorId, CatalogId, InventoryRecord, LoanId, LoanRecord, RequestId, RequestKind,
    RequestRecord, TenantId,
};

use crate::error::StoreResult;

/// A transactional store for lending state.
///
/// Implementations must guarantee:
/// - Writes staged in a [`Transaction`] become visible only on
///   [`Transaction::commit`]. Dropping an uncommitted transaction discards
///   them.
/// - Two open transactions that touch the same `(tenant, catalog id)` never
///   interleave their writes. The second waits for the first to commit or
///   drop, up to a backend-defined timeout. Transactions on different titles
///   or tenants do not wait on each other.
/// - At most one outstanding request per `(tenant, requester, catalog, kind)`
///   and at most one active loan per `(tenant, requester, catalog)`.
pub trait LendingStore: Send + Sync {
    type Tx<'a>: Transaction
    where
        Self: 'a;

    /// Open a transaction scoped to `tenant`.
    ///
    /// Opening never blocks. Reads and writes of a title block while another
    /// transaction holds that title.
    fn begin(&self, tenant: TenantId) -> StoreResult<Self::Tx<'_>>;

    /// Every tenant with committed state, in ascending order.
    fn tenants(&self) -> StoreResult<Vec<TenantId>>;
}

/// One unit of work against a single tenant's lending state.
pub trait Transaction {
    fn tenant(&self) -> TenantId;

    // ---- inventory ----

    fn inventory(&self, catalog: &CatalogId) -> StoreResult<Option<InventoryRecord>>;

    /// Insert or replace the inventory row for `record.catalog`.
    fn put_inventory(&mut self, record: InventoryRecord) -> StoreResult<()>;

    /// Returns `true` if the row existed.
    fn delete_inventory(&mut self, catalog: &CatalogId) -> StoreResult<bool>;

    // ---- requests ----

    /// Allocate the next request id. Ids are store-wide and monotonic; an id
    /// handed out to a transaction that later rolls back is not reused.
    fn next_request_id(&mut self) -> StoreResult<RequestId>;

    fn request(&self, id: RequestId) -> StoreResult<Option<RequestRecord>>;

    fn find_request(
        &self,
        requester: ActorId,
        catalog: &CatalogId,
        kind: RequestKind,
    ) -> StoreResult<Option<RequestRecord>>;

    /// Fails with `UniqueViolation` if an outstanding request with the same
    /// requester, catalog id and kind exists.
    fn insert_request(&mut self, record: RequestRecord) -> StoreResult<()>;

    /// Returns `true` if the row existed.
    fn delete_request(&mut self, id: RequestId) -> StoreResult<bool>;

    /// All outstanding requests in insertion order.
    fn requests(&self) -> StoreResult<Vec<RequestRecord>>;

    /// Outstanding requests that reference `catalog`.
    fn requests_for(&self, catalog: &CatalogId) -> StoreResult<Vec<RequestRecord>> {
        Ok(self
            .requests()?
            .into_iter()
            .filter(|r| &r.catalog == catalog)
            .collect())
    }

    // ---- loans ----

    fn next_loan_id(&mut self) -> StoreResult<LoanId>;

    fn loan(&self, id: LoanId) -> StoreResult<Option<LoanRecord>>;

    fn active_loan(
        &self,
        requester: ActorId,
        catalog: &CatalogId,
    ) -> StoreResult<Option<LoanRecord>>;

    /// Fails with `UniqueViolation` if `record` is active and an active loan
    /// for the same requester and catalog id exists.
    fn insert_loan(&mut self, record: LoanRecord) -> StoreResult<()>;

    /// Replace an existing loan row. Fails with `MissingRow` if absent.
    fn update_loan(&mut self, record: LoanRecord) -> StoreResult<()>;

    /// All loans, active and returned, in id order.
    fn loans(&self) -> StoreResult<Vec<LoanRecord>>;

    /// Active loans of `catalog`, in id order.
    fn active_loans_for(&self, catalog: &CatalogId) -> StoreResult<Vec<LoanRecord>> {
        Ok(self
            .loans()?
            .into_iter()
            .filter(|l| l.is_active() && &l.catalog == catalog)
            .collect())
    }

    /// Publish every write staged in this transaction.
    fn commit(self) -> StoreResult<()>
    where
        Self: Sized;
}
