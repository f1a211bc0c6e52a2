//! The lending workflow engine.
//!
//! Orchestrates the inventory ledger, request registry and loan registry.
//! Every state-changing operation is one unit of work: a single store
//! transaction that either commits all of its steps or none of them.
//!
//! Per request, from the reader's side:
//!
//! ```text
//! none -> pending -> approved -> loan(active) -> pending return -> loan(returned)
//!                 -> rejected -> none
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lending_store::{LendingStore, Transaction};
use lending_types::{
    ActorId, CatalogId, Clock, InventoryRecord, LoanRecord, RequestId, RequestKind, RequestRecord,
    SystemClock, TenantId,
};
use tracing::{debug, error, info, warn};

use crate::commands::{Decision, LoanFilter, ProcessOutcome, SearchResult, StockUpdate};
use crate::config::EngineConfig;
use crate::error::{LendingError, LendingResult};
use crate::inventory::InventoryLedger;
use crate::loans::LoanRegistry;
use crate::requests::RequestRegistry;

/// The lending workflow engine over a store `S`.
///
/// The engine holds no lending state of its own; it is safe to share across
/// threads and call concurrently. Concurrent operations on one title are
/// serialized by the store.
pub struct LendingEngine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    inventory: InventoryLedger,
    requests: RequestRegistry,
    loans: LoanRegistry,
}

impl<S: LendingStore> LendingEngine<S> {
    /// Create an engine on the system clock.
    pub fn new(store: S, config: EngineConfig) -> LendingResult<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: S,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> LendingResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            inventory: InventoryLedger::new(),
            requests: RequestRegistry::new(config.raise_requires_stock),
            loans: LoanRegistry::new(config.loan_period()),
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ---- Units of work ----

    /// Run `work` in a fresh transaction on `tenant`; commit if it succeeds,
    /// roll back if it fails. Faults are logged here, once.
    fn unit_of_work<'s, T>(
        &'s self,
        tenant: TenantId,
        op: &'static str,
        work: impl FnOnce(&mut S::Tx<'s>) -> LendingResult<T>,
    ) -> LendingResult<T> {
        let result = self
            .store
            .begin(tenant)
            .map_err(LendingError::from)
            .and_then(|mut tx| {
                let value = work(&mut tx)?;
                tx.commit()?;
                Ok(value)
            });
        report(tenant, op, &result);
        result
    }

    /// Like [`unit_of_work`](Self::unit_of_work) for reads: the transaction
    /// is always dropped without committing.
    fn read<'s, T>(
        &'s self,
        tenant: TenantId,
        op: &'static str,
        work: impl FnOnce(&S::Tx<'s>) -> LendingResult<T>,
    ) -> LendingResult<T> {
        let result = self
            .store
            .begin(tenant)
            .map_err(LendingError::from)
            .and_then(|tx| work(&tx));
        report(tenant, op, &result);
        result
    }

    // ---- Stock ----

    /// Add `copies` to a title's total and available counts, creating the
    /// title on first stock.
    pub fn add_stock(
        &self,
        tenant: TenantId,
        catalog: &CatalogId,
        copies: u32,
    ) -> LendingResult<InventoryRecord> {
        self.unit_of_work(tenant, "add_stock", |tx| {
            self.inventory.add_stock(tx, catalog, copies)
        })
    }

    /// Apply a partial counter update. The total may not drop below the
    /// number of copies currently on loan.
    pub fn adjust_stock(
        &self,
        tenant: TenantId,
        catalog: &CatalogId,
        update: StockUpdate,
    ) -> LendingResult<InventoryRecord> {
        self.unit_of_work(tenant, "adjust_stock", |tx| {
            let on_loan = self.loans.count_active(tx, catalog)?;
            self.inventory.apply_update(tx, catalog, update, on_loan)
        })
    }

    /// Delete a title. Refused while a copy is out or a request references it.
    pub fn remove_title(&self, tenant: TenantId, catalog: &CatalogId) -> LendingResult<()> {
        self.unit_of_work(tenant, "remove_title", |tx| {
            let on_loan = self.loans.count_active(tx, catalog)?;
            if on_loan > 0 {
                return Err(LendingError::InvalidOperation(format!(
                    "{catalog} has {on_loan} copies on loan"
                )));
            }
            let pending = self.requests.list_for(tx, catalog)?;
            if !pending.is_empty() {
                return Err(LendingError::InvalidOperation(format!(
                    "{catalog} has {} outstanding requests",
                    pending.len()
                )));
            }
            self.inventory.remove(tx, catalog)
        })
    }

    pub fn availability(
        &self,
        tenant: TenantId,
        catalog: &CatalogId,
    ) -> LendingResult<InventoryRecord> {
        self.read(tenant, "availability", |tx| {
            self.inventory.availability(tx, catalog)
        })
    }

    /// Availability plus, when the shelf is empty, the earliest date a copy
    /// is due back.
    pub fn search(&self, tenant: TenantId, catalog: &CatalogId) -> LendingResult<SearchResult> {
        self.read(tenant, "search", |tx| {
            let stock = self.inventory.availability(tx, catalog)?;
            let expected_available_at = if stock.available_copies == 0 {
                let next = self.loans.next_availability_date(tx, catalog)?;
                if next.is_none() {
                    warn!(%tenant, %catalog, total = stock.total_copies, "no copies available and none on loan");
                }
                next
            } else {
                None
            };
            Ok(SearchResult {
                catalog: stock.catalog,
                total_copies: stock.total_copies,
                available_copies: stock.available_copies,
                expected_available_at,
            })
        })
    }

    // ---- Raising requests ----

    /// Raise a request of either kind.
    pub fn raise(
        &self,
        tenant: TenantId,
        requester: ActorId,
        catalog: &CatalogId,
        kind: RequestKind,
    ) -> LendingResult<RequestRecord> {
        match kind {
            RequestKind::Borrow => self.raise_borrow(tenant, requester, catalog),
            RequestKind::Return => self.raise_return(tenant, requester, catalog),
        }
    }

    /// Ask to borrow a title. Availability is only peeked at here; the copy
    /// is reserved when an approver approves.
    pub fn raise_borrow(
        &self,
        tenant: TenantId,
        requester: ActorId,
        catalog: &CatalogId,
    ) -> LendingResult<RequestRecord> {
        let now = self.now();
        self.unit_of_work(tenant, "raise_borrow", |tx| {
            let stock = self.inventory.availability(tx, catalog)?;
            debug!(%tenant, %catalog, available = stock.available_copies, "borrow pre-check");
            self.requests
                .raise(tx, requester, catalog, RequestKind::Borrow, now)
        })
    }

    /// Ask to return a title the reader currently holds.
    pub fn raise_return(
        &self,
        tenant: TenantId,
        requester: ActorId,
        catalog: &CatalogId,
    ) -> LendingResult<RequestRecord> {
        let now = self.now();
        self.unit_of_work(tenant, "raise_return", |tx| {
            self.loans
                .find_active_loan(tx, requester, catalog)
                .map_err(|e| match e {
                    LendingError::NotFound { .. } => LendingError::NoActiveLoan {
                        requester,
                        catalog: catalog.clone(),
                    },
                    other => other,
                })?;
            self.requests
                .raise(tx, requester, catalog, RequestKind::Return, now)
        })
    }

    // ---- Processing requests ----

    /// Approve a borrow request: reserve a copy, open the loan, drop the
    /// request. If the shelf emptied since the request was raised this fails
    /// with `OutOfStock` and the request stays pending.
    pub fn approve_borrow(
        &self,
        tenant: TenantId,
        request: RequestId,
        approver: ActorId,
    ) -> LendingResult<LoanRecord> {
        let now = self.now();
        self.unit_of_work(tenant, "approve_borrow", |tx| {
            let req = self.requests.get_of_kind(tx, request, RequestKind::Borrow)?;
            self.inventory.reserve_one_copy(tx, &req.catalog)?;
            let loan = self
                .loans
                .open_loan(tx, req.requester, &req.catalog, approver, now)?;
            self.requests.remove(tx, request)?;
            info!(%tenant, request = %request, loan = %loan.id, %approver, "borrow approved");
            Ok(loan)
        })
    }

    /// Reject a borrow request. Inventory and loans are untouched.
    pub fn reject_borrow(
        &self,
        tenant: TenantId,
        request: RequestId,
    ) -> LendingResult<RequestRecord> {
        self.unit_of_work(tenant, "reject_borrow", |tx| {
            let req = self.requests.get_of_kind(tx, request, RequestKind::Borrow)?;
            self.requests.remove(tx, request)?;
            debug!(%tenant, request = %request, "borrow rejected");
            Ok(req)
        })
    }

    /// Reject a request of either kind. Rejecting a return leaves the loan
    /// active.
    pub fn reject(&self, tenant: TenantId, request: RequestId) -> LendingResult<RequestRecord> {
        self.unit_of_work(tenant, "reject", |tx| {
            let req = self.requests.get(tx, request)?;
            self.requests.remove(tx, request)?;
            debug!(%tenant, request = %request, kind = %req.kind, "request rejected");
            Ok(req)
        })
    }

    /// Accept a copy back, stamped with the current time.
    pub fn complete_return(
        &self,
        tenant: TenantId,
        request: RequestId,
        approver: ActorId,
    ) -> LendingResult<LoanRecord> {
        self.complete_return_at(tenant, request, approver, self.now())
    }

    /// Accept a copy back: close the loan, put the copy on the shelf, drop
    /// the request.
    pub fn complete_return_at(
        &self,
        tenant: TenantId,
        request: RequestId,
        approver: ActorId,
        returned_at: DateTime<Utc>,
    ) -> LendingResult<LoanRecord> {
        self.unit_of_work(tenant, "complete_return", |tx| {
            let req = self.requests.get_of_kind(tx, request, RequestKind::Return)?;
            let active = self
                .loans
                .find_active_loan(tx, req.requester, &req.catalog)?;
            let loan = self.loans.close_loan(tx, active.id, approver, returned_at)?;
            self.inventory.release_one_copy(tx, &req.catalog)?;
            self.requests.remove(tx, request)?;
            info!(%tenant, request = %request, loan = %loan.id, %approver, "return completed");
            Ok(loan)
        })
    }

    /// Apply an approver's decision to a request of either kind.
    pub fn process(
        &self,
        tenant: TenantId,
        request: RequestId,
        approver: ActorId,
        decision: Decision,
    ) -> LendingResult<ProcessOutcome> {
        let kind = self.request(tenant, request)?.kind;
        match (kind, decision) {
            (RequestKind::Borrow, Decision::Approve) => self
                .approve_borrow(tenant, request, approver)
                .map(|loan| ProcessOutcome::Issued { loan }),
            (RequestKind::Return, Decision::Approve) => self
                .complete_return(tenant, request, approver)
                .map(|loan| ProcessOutcome::Returned { loan }),
            (_, Decision::Reject) => self
                .reject(tenant, request)
                .map(|request| ProcessOutcome::Rejected { request }),
        }
    }

    // ---- Listing ----

    pub fn request(&self, tenant: TenantId, request: RequestId) -> LendingResult<RequestRecord> {
        self.read(tenant, "get_request", |tx| self.requests.get(tx, request))
    }

    /// Outstanding requests in insertion order, for one tenant or all.
    pub fn list_requests(&self, tenant: Option<TenantId>) -> LendingResult<Vec<RequestRecord>> {
        let tenants = match tenant {
            Some(t) => vec![t],
            None => self.store.tenants()?,
        };
        let mut all = Vec::new();
        for t in tenants {
            all.extend(self.read(t, "list_requests", |tx| self.requests.list(tx))?);
        }
        all.sort_by_key(|r| r.id);
        Ok(all)
    }

    pub fn list_loans(&self, tenant: TenantId, filter: &LoanFilter) -> LendingResult<Vec<LoanRecord>> {
        self.read(tenant, "list_loans", |tx| self.loans.list(tx, filter))
    }
}

fn report<T>(tenant: TenantId, op: &'static str, result: &LendingResult<T>) {
    match result {
        Ok(_) => {}
        Err(e) if e.is_fault() => {
            error!(%tenant, op, kind = e.kind(), error = %e, "lending operation failed; rolled back");
        }
        Err(e) => {
            debug!(%tenant, op, kind = e.kind(), error = %e, "lending operation rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use lending_store::{InMemoryStore, StoreConfig, StoreError};
    use lending_types::{FixedClock, LoanStatus};
    use proptest::prelude::*;
    use std::sync::Barrier;
    use std::thread;

    use crate::error::Entity;

    const TENANT_A: TenantId = TenantId::new(1);
    const TENANT_B: TenantId = TenantId::new(2);
    const ADMIN: ActorId = ActorId::new(1);
    const READER_1: ActorId = ActorId::new(101);
    const READER_2: ActorId = ActorId::new(102);

    fn isbn(s: &str) -> CatalogId {
        CatalogId::new(s).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
    }

    fn engine() -> (LendingEngine<InMemoryStore>, Arc<FixedClock>) {
        engine_with(EngineConfig::default())
    }

    fn engine_with(config: EngineConfig) -> (LendingEngine<InMemoryStore>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(start()));
        let engine =
            LendingEngine::with_clock(InMemoryStore::new(), config, clock.clone()).unwrap();
        (engine, clock)
    }

    // ---- Scenario A: stock, raise, approve ----
    #[test]
    fn borrow_approval_issues_a_copy() {
        let (engine, _) = engine();
        let stock = engine.add_stock(TENANT_A, &isbn("ISBN1"), 5).unwrap();
        assert_eq!((stock.total_copies, stock.available_copies), (5, 5));

        let req = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        assert_eq!(engine.list_requests(Some(TENANT_A)).unwrap(), vec![req.clone()]);

        let loan = engine.approve_borrow(TENANT_A, req.id, ADMIN).unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.requester, READER_1);
        assert_eq!(loan.approver, ADMIN);
        assert_eq!(loan.issued_at, start());
        assert_eq!(loan.expected_return_at, start() + Duration::days(14));

        assert_eq!(engine.availability(TENANT_A, &isbn("ISBN1")).unwrap().available_copies, 4);
        assert!(engine.list_requests(Some(TENANT_A)).unwrap().is_empty());
        let active = engine
            .list_loans(TENANT_A, &LoanFilter { requester: None, status: Some(LoanStatus::Active) })
            .unwrap();
        assert_eq!(active, vec![loan]);
    }

    // ---- Scenario B: duplicate borrow ----
    #[test]
    fn duplicate_borrow_rejected() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 5).unwrap();
        engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        let err = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap_err();
        assert!(matches!(err, LendingError::DuplicateRequest { kind: RequestKind::Borrow, .. }));
        assert_eq!(engine.list_requests(Some(TENANT_A)).unwrap().len(), 1);
    }

    // ---- Scenario C: stock exhausted between raise and approval ----
    #[test]
    fn approval_after_exhaustion_fails_and_keeps_request() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 1).unwrap();
        let first = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        let second = engine.raise_borrow(TENANT_A, READER_2, &isbn("ISBN1")).unwrap();

        engine.approve_borrow(TENANT_A, first.id, ADMIN).unwrap();
        assert_eq!(engine.availability(TENANT_A, &isbn("ISBN1")).unwrap().available_copies, 0);

        let err = engine.approve_borrow(TENANT_A, second.id, ADMIN).unwrap_err();
        assert!(matches!(err, LendingError::OutOfStock { .. }));
        assert_eq!(engine.request(TENANT_A, second.id).unwrap(), second);
        assert_eq!(
            engine.list_loans(TENANT_A, &LoanFilter::default()).unwrap().len(),
            1
        );
    }

    #[test]
    fn advisory_raise_queues_on_empty_shelf() {
        let (engine, _) = engine_with(EngineConfig {
            raise_requires_stock: false,
            ..Default::default()
        });
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 1).unwrap();
        let first = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        engine.approve_borrow(TENANT_A, first.id, ADMIN).unwrap();

        let late = engine.raise_borrow(TENANT_A, READER_2, &isbn("ISBN1")).unwrap();
        let err = engine.approve_borrow(TENANT_A, late.id, ADMIN).unwrap_err();
        assert!(matches!(err, LendingError::OutOfStock { .. }));
        assert!(engine.request(TENANT_A, late.id).is_ok());
    }

    #[test]
    fn strict_raise_rejects_empty_shelf() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 1).unwrap();
        let first = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        engine.approve_borrow(TENANT_A, first.id, ADMIN).unwrap();

        let err = engine.raise_borrow(TENANT_A, READER_2, &isbn("ISBN1")).unwrap_err();
        assert!(matches!(err, LendingError::OutOfStock { .. }));
    }

    // ---- Scenario D: return round trip ----
    #[test]
    fn return_puts_copy_back() {
        let (engine, clock) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 5).unwrap();
        let req = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        let loan = engine.approve_borrow(TENANT_A, req.id, ADMIN).unwrap();

        clock.advance(Duration::days(3));
        let ret = engine.raise_return(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        assert_eq!(ret.kind, RequestKind::Return);

        let closed = engine.complete_return(TENANT_A, ret.id, ADMIN).unwrap();
        assert_eq!(closed.id, loan.id);
        assert_eq!(closed.status, LoanStatus::Returned);
        assert_eq!(closed.returned_at, Some(start() + Duration::days(3)));
        assert_eq!(closed.return_approver, Some(ADMIN));

        assert_eq!(engine.availability(TENANT_A, &isbn("ISBN1")).unwrap().available_copies, 5);
        assert!(engine.list_requests(Some(TENANT_A)).unwrap().is_empty());

        // The reader may borrow the title again.
        engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
    }

    // ---- Scenario E: return of a title never borrowed ----
    #[test]
    fn return_without_loan_fails() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 5).unwrap();
        let err = engine.raise_return(TENANT_A, READER_1, &isbn("ISBN1")).unwrap_err();
        assert_eq!(
            err,
            LendingError::NoActiveLoan { requester: READER_1, catalog: isbn("ISBN1") }
        );
    }

    #[test]
    fn reject_twice_fails_second_time() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 2).unwrap();
        let req = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();

        assert_eq!(engine.reject_borrow(TENANT_A, req.id).unwrap(), req);
        let err = engine.reject_borrow(TENANT_A, req.id).unwrap_err();
        assert!(matches!(err, LendingError::NotFound { entity: Entity::Request, .. }));

        let stock = engine.availability(TENANT_A, &isbn("ISBN1")).unwrap();
        assert_eq!((stock.total_copies, stock.available_copies), (2, 2));
        assert!(engine.list_loans(TENANT_A, &LoanFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn approve_rejects_return_request_as_not_found() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 2).unwrap();
        let req = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        engine.approve_borrow(TENANT_A, req.id, ADMIN).unwrap();
        let ret = engine.raise_return(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();

        assert!(matches!(
            engine.approve_borrow(TENANT_A, ret.id, ADMIN),
            Err(LendingError::NotFound { .. })
        ));
        assert!(matches!(
            engine.reject_borrow(TENANT_A, ret.id),
            Err(LendingError::NotFound { .. })
        ));
        assert!(matches!(
            engine.complete_return(TENANT_A, RequestId::new(9999), ADMIN),
            Err(LendingError::NotFound { .. })
        ));
    }

    #[test]
    fn requests_are_tenant_scoped() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 2).unwrap();
        let req = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();

        assert!(matches!(
            engine.approve_borrow(TENANT_B, req.id, ADMIN),
            Err(LendingError::NotFound { .. })
        ));
        assert!(matches!(
            engine.raise_borrow(TENANT_B, READER_1, &isbn("ISBN1")),
            Err(LendingError::NotFound { entity: Entity::Title, .. })
        ));
    }

    #[test]
    fn list_requests_across_tenants_in_insertion_order() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 2).unwrap();
        engine.add_stock(TENANT_B, &isbn("ISBN1"), 2).unwrap();
        let a1 = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        let b1 = engine.raise_borrow(TENANT_B, READER_1, &isbn("ISBN1")).unwrap();
        let a2 = engine.raise_borrow(TENANT_A, READER_2, &isbn("ISBN1")).unwrap();

        let ids: Vec<RequestId> = engine
            .list_requests(None)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![a1.id, b1.id, a2.id]);
        assert_eq!(engine.list_requests(Some(TENANT_B)).unwrap(), vec![b1]);
    }

    #[test]
    fn process_dispatches_on_kind_and_decision() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 2).unwrap();

        let req = engine.raise(TENANT_A, READER_1, &isbn("ISBN1"), RequestKind::Borrow).unwrap();
        let issued = engine.process(TENANT_A, req.id, ADMIN, Decision::Approve).unwrap();
        let loan = match issued {
            ProcessOutcome::Issued { loan } => loan,
            other => panic!("expected Issued, got {other:?}"),
        };

        // Rejecting a return leaves the loan active.
        let ret = engine.raise(TENANT_A, READER_1, &isbn("ISBN1"), RequestKind::Return).unwrap();
        let rejected = engine.process(TENANT_A, ret.id, ADMIN, Decision::Reject).unwrap();
        assert!(matches!(rejected, ProcessOutcome::Rejected { .. }));
        assert_eq!(
            engine.list_loans(TENANT_A, &LoanFilter::default()).unwrap()[0].status,
            LoanStatus::Active
        );

        let ret = engine.raise(TENANT_A, READER_1, &isbn("ISBN1"), RequestKind::Return).unwrap();
        match engine.process(TENANT_A, ret.id, ADMIN, Decision::Approve).unwrap() {
            ProcessOutcome::Returned { loan: closed } => assert_eq!(closed.id, loan.id),
            other => panic!("expected Returned, got {other:?}"),
        }
        assert_eq!(engine.availability(TENANT_A, &isbn("ISBN1")).unwrap().available_copies, 2);
    }

    #[test]
    fn search_reports_next_due_date_when_shelf_empty() {
        let (engine, clock) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 2).unwrap();
        let r1 = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        engine.approve_borrow(TENANT_A, r1.id, ADMIN).unwrap();

        let partial = engine.search(TENANT_A, &isbn("ISBN1")).unwrap();
        assert_eq!(partial.available_copies, 1);
        assert_eq!(partial.expected_available_at, None);

        clock.advance(Duration::days(2));
        let r2 = engine.raise_borrow(TENANT_A, READER_2, &isbn("ISBN1")).unwrap();
        engine.approve_borrow(TENANT_A, r2.id, ADMIN).unwrap();

        let empty = engine.search(TENANT_A, &isbn("ISBN1")).unwrap();
        assert_eq!(empty.available_copies, 0);
        assert_eq!(empty.total_copies, 2);
        assert_eq!(empty.expected_available_at, Some(start() + Duration::days(14)));

        assert!(matches!(
            engine.search(TENANT_A, &isbn("NOPE")),
            Err(LendingError::NotFound { entity: Entity::Title, .. })
        ));
    }

    #[test]
    fn search_with_withdrawn_copies_has_no_due_date() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 2).unwrap();
        engine
            .adjust_stock(
                TENANT_A,
                &isbn("ISBN1"),
                StockUpdate { total_copies: None, available_copies: Some(0) },
            )
            .unwrap();
        let result = engine.search(TENANT_A, &isbn("ISBN1")).unwrap();
        assert_eq!(result.available_copies, 0);
        assert_eq!(result.expected_available_at, None);
    }

    #[test]
    fn adjust_stock_respects_loans() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 3).unwrap();
        for reader in [READER_1, READER_2] {
            let r = engine.raise_borrow(TENANT_A, reader, &isbn("ISBN1")).unwrap();
            engine.approve_borrow(TENANT_A, r.id, ADMIN).unwrap();
        }

        let shrink = StockUpdate { total_copies: Some(1), available_copies: None };
        assert!(matches!(
            engine.adjust_stock(TENANT_A, &isbn("ISBN1"), shrink),
            Err(LendingError::InvalidOperation(_))
        ));

        let to_two = StockUpdate { total_copies: Some(2), available_copies: None };
        let rec = engine.adjust_stock(TENANT_A, &isbn("ISBN1"), to_two).unwrap();
        assert_eq!((rec.total_copies, rec.available_copies), (2, 0));

        assert!(matches!(
            engine.adjust_stock(TENANT_A, &isbn("ISBN1"), StockUpdate::default()),
            Err(LendingError::InvalidOperation(_))
        ));
    }

    #[test]
    fn remove_title_guarded_by_loans_and_requests() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 1).unwrap();
        let req = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        assert!(matches!(
            engine.remove_title(TENANT_A, &isbn("ISBN1")),
            Err(LendingError::InvalidOperation(_))
        ));

        engine.approve_borrow(TENANT_A, req.id, ADMIN).unwrap();
        assert!(matches!(
            engine.remove_title(TENANT_A, &isbn("ISBN1")),
            Err(LendingError::InvalidOperation(_))
        ));

        let ret = engine.raise_return(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        engine.complete_return(TENANT_A, ret.id, ADMIN).unwrap();
        engine.remove_title(TENANT_A, &isbn("ISBN1")).unwrap();
        assert!(engine.availability(TENANT_A, &isbn("ISBN1")).is_err());
        // History survives.
        assert_eq!(engine.list_loans(TENANT_A, &LoanFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn failed_return_leaves_no_partial_effect() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 2).unwrap();
        let req = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        engine.approve_borrow(TENANT_A, req.id, ADMIN).unwrap();
        let ret = engine.raise_return(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();

        // Corrupt the counters so the release step trips after the loan was
        // already closed inside the transaction.
        {
            let mut tx = engine.store().begin(TENANT_A).unwrap();
            let mut rec = tx.inventory(&isbn("ISBN1")).unwrap().unwrap();
            rec.available_copies = rec.total_copies;
            tx.put_inventory(rec).unwrap();
            tx.commit().unwrap();
        }

        let err = engine.complete_return(TENANT_A, ret.id, ADMIN).unwrap_err();
        assert!(matches!(err, LendingError::ConsistencyFault(_)));

        let loans = engine.list_loans(TENANT_A, &LoanFilter::default()).unwrap();
        assert_eq!(loans[0].status, LoanStatus::Active);
        assert!(loans[0].returned_at.is_none());
        assert_eq!(engine.request(TENANT_A, ret.id).unwrap(), ret);
    }

    #[test]
    fn approval_proceeds_while_another_title_is_held() {
        let store = InMemoryStore::from_config(&StoreConfig {
            lock_timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();
        let clock = Arc::new(FixedClock::new(start()));
        let engine = LendingEngine::with_clock(store, EngineConfig::default(), clock).unwrap();
        engine.add_stock(TENANT_A, &isbn("ISBN-A"), 1).unwrap();
        engine.add_stock(TENANT_A, &isbn("ISBN-B"), 1).unwrap();
        let req = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN-B")).unwrap();

        let mut holding = engine.store().begin(TENANT_A).unwrap();
        let mut rec = holding.inventory(&isbn("ISBN-A")).unwrap().unwrap();
        rec.available_copies = 0;
        holding.put_inventory(rec).unwrap();

        let loan = engine.approve_borrow(TENANT_A, req.id, ADMIN).unwrap();
        assert_eq!(loan.catalog, isbn("ISBN-B"));
        // A tenant whose id collides with the held one on the directory
        // shards is not affected either.
        let colliding = TenantId::new(17);
        engine.add_stock(colliding, &isbn("ISBN-A"), 2).unwrap();
        let other = engine.raise_borrow(colliding, READER_2, &isbn("ISBN-A")).unwrap();
        engine.approve_borrow(colliding, other.id, ADMIN).unwrap();

        // The held title itself waits and then times out.
        let err = engine.availability(TENANT_A, &isbn("ISBN-A")).unwrap_err();
        assert!(matches!(
            err,
            LendingError::StoreFailure(StoreError::LockTimeout { .. })
        ));

        holding.commit().unwrap();
        assert_eq!(engine.availability(TENANT_A, &isbn("ISBN-A")).unwrap().available_copies, 0);
        assert_eq!(engine.availability(TENANT_A, &isbn("ISBN-B")).unwrap().available_copies, 0);
    }

    #[test]
    fn return_dated_before_issue_is_refused() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 1).unwrap();
        let req = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        engine.approve_borrow(TENANT_A, req.id, ADMIN).unwrap();
        let ret = engine.raise_return(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();

        let err = engine
            .complete_return_at(TENANT_A, ret.id, ADMIN, start() - Duration::days(1))
            .unwrap_err();
        assert!(matches!(err, LendingError::InvalidOperation(_)));
        assert_eq!(engine.availability(TENANT_A, &isbn("ISBN1")).unwrap().available_copies, 0);
        assert_eq!(engine.request(TENANT_A, ret.id).unwrap(), ret);

        let closed = engine
            .complete_return_at(TENANT_A, ret.id, ADMIN, start() + Duration::days(2))
            .unwrap();
        assert_eq!(closed.returned_at, Some(start() + Duration::days(2)));
    }

    #[test]
    fn oversized_loan_period_refused_at_construction() {
        let config = EngineConfig {
            loan_period_days: 100_000_000,
            ..Default::default()
        };
        let result = LendingEngine::new(InMemoryStore::new(), config);
        assert!(matches!(result, Err(LendingError::InvalidOperation(_))));
    }

    #[test]
    fn racing_approvals_issue_the_last_copy_once() {
        let (engine, _) = engine();
        engine.add_stock(TENANT_A, &isbn("ISBN1"), 1).unwrap();
        let r1 = engine.raise_borrow(TENANT_A, READER_1, &isbn("ISBN1")).unwrap();
        let r2 = engine.raise_borrow(TENANT_A, READER_2, &isbn("ISBN1")).unwrap();

        let barrier = Barrier::new(2);
        let results: Vec<LendingResult<LoanRecord>> = thread::scope(|s| {
            let handles: Vec<_> = [r1.id, r2.id]
                .into_iter()
                .map(|id| {
                    let engine = &engine;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        engine.approve_borrow(TENANT_A, id, ADMIN)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let issued: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        let refused: Vec<_> = results
            .iter()
            .filter(|r| matches!(r, Err(LendingError::OutOfStock { .. })))
            .collect();
        assert_eq!(issued.len(), 1);
        assert_eq!(refused.len(), 1);

        assert_eq!(engine.availability(TENANT_A, &isbn("ISBN1")).unwrap().available_copies, 0);
        assert_eq!(engine.list_requests(Some(TENANT_A)).unwrap().len(), 1);
        assert_eq!(engine.list_loans(TENANT_A, &LoanFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_borrowers_never_overdraw() {
        let (engine, _) = engine();
        let copies = 5u32;
        let readers = 20u64;
        engine.add_stock(TENANT_A, &isbn("ISBN1"), copies).unwrap();

        let barrier = Barrier::new(readers as usize);
        let issued = thread::scope(|s| {
            let handles: Vec<_> = (0..readers)
                .map(|n| {
                    let engine = &engine;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        let reader = ActorId::new(1000 + n);
                        let Ok(req) = engine.raise_borrow(TENANT_A, reader, &isbn("ISBN1")) else {
                            return 0u32;
                        };
                        u32::from(engine.approve_borrow(TENANT_A, req.id, ADMIN).is_ok())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum::<u32>()
        });

        assert_eq!(issued, copies);
        let stock = engine.availability(TENANT_A, &isbn("ISBN1")).unwrap();
        assert_eq!(stock.available_copies, 0);
        assert_eq!(stock.total_copies, copies);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Stock(u8, u32),
        Borrow(u8, u8),
        Return(u8, u8),
        Approve(usize),
        Reject(usize),
        Shrink(u8, u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..3u8, 1..4u32).prop_map(|(t, n)| Op::Stock(t, n)),
            (0..3u8, 0..4u8).prop_map(|(t, r)| Op::Borrow(t, r)),
            (0..3u8, 0..4u8).prop_map(|(t, r)| Op::Return(t, r)),
            (0..16usize).prop_map(Op::Approve),
            (0..16usize).prop_map(Op::Reject),
            (0..3u8, 0..6u32).prop_map(|(t, n)| Op::Shrink(t, n)),
        ]
    }

    proptest! {
        #[test]
        fn invariants_hold_under_random_workloads(ops in prop::collection::vec(op(), 1..60)) {
            let (engine, _) = engine();
            let titles = ["ISBN1", "ISBN2", "ISBN3"];

            for op in ops {
                match op {
                    Op::Stock(t, n) => { let _ = engine.add_stock(TENANT_A, &isbn(titles[t as usize]), n); }
                    Op::Borrow(t, r) => {
                        let _ = engine.raise_borrow(TENANT_A, ActorId::new(u64::from(r) + 100), &isbn(titles[t as usize]));
                    }
                    Op::Return(t, r) => {
                        let _ = engine.raise_return(TENANT_A, ActorId::new(u64::from(r) + 100), &isbn(titles[t as usize]));
                    }
                    Op::Approve(i) => {
                        let pending = engine.list_requests(Some(TENANT_A)).unwrap();
                        if let Some(req) = pending.get(i % pending.len().max(1)) {
                            let _ = engine.process(TENANT_A, req.id, ADMIN, Decision::Approve);
                        }
                    }
                    Op::Reject(i) => {
                        let pending = engine.list_requests(Some(TENANT_A)).unwrap();
                        if let Some(req) = pending.get(i % pending.len().max(1)) {
                            let _ = engine.reject(TENANT_A, req.id);
                        }
                    }
                    Op::Shrink(t, n) => {
                        let update = StockUpdate { total_copies: Some(n), available_copies: None };
                        let _ = engine.adjust_stock(TENANT_A, &isbn(titles[t as usize]), update);
                    }
                }

                let loans = engine.list_loans(TENANT_A, &LoanFilter::default()).unwrap();
                let requests = engine.list_requests(Some(TENANT_A)).unwrap();
                for title in titles {
                    let catalog = isbn(title);
                    let active: Vec<_> = loans.iter().filter(|l| l.is_active() && l.catalog == catalog).collect();
                    if let Ok(stock) = engine.availability(TENANT_A, &catalog) {
                        prop_assert!(stock.available_copies <= stock.total_copies);
                        prop_assert!(active.len() as u32 + stock.available_copies <= stock.total_copies);
                    }
                    for reader in 100..104u64 {
                        let held = active.iter().filter(|l| l.requester == ActorId::new(reader)).count();
                        prop_assert!(held <= 1);
                        for kind in [RequestKind::Borrow, RequestKind::Return] {
                            let outstanding = requests
                                .iter()
                                .filter(|r| r.requester == ActorId::new(reader) && r.catalog == catalog && r.kind == kind)
                                .count();
                            prop_assert!(outstanding <= 1);
                        }
                    }
                }
            }
        }
    }
}
