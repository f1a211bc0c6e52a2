//! In-memory lending store for tests, demos, and embedding.
//!
//! [`InMemoryStore`] keeps one shelf per tenant, found through a sharded
//! directory. Rows are grouped by title. A transaction takes a lease on each
//! title it reads or writes, stages its writes in a private delta, and
//! applies the delta under the shelf's data lock on commit. Dropping the
//! transaction throws the delta away and hands its leases back.
//!
//! Two transactions wait on each other only when they touch the same title
//! of the same tenant.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use lending_types::{
    ActorId, CatalogId, InventoryRecord, LoanId, LoanRecord, RequestId, RequestKind,
    RequestRecord, TenantId,
};
use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::{LendingStore, Transaction};

/// Committed rows of one title.
#[derive(Debug, Default)]
struct Title {
    inventory: Option<InventoryRecord>,
    requests: BTreeMap<RequestId, RequestRecord>,
    loans: BTreeMap<LoanId, LoanRecord>,
    /// Active loan of each requester.
    active: BTreeMap<ActorId, LoanId>,
}

impl Title {
    fn is_empty(&self) -> bool {
        self.inventory.is_none() && self.requests.is_empty() && self.loans.is_empty()
    }
}

/// Committed rows of one tenant, with id indexes back to their title.
#[derive(Debug, Default)]
struct TenantData {
    titles: HashMap<CatalogId, Title>,
    request_titles: HashMap<RequestId, CatalogId>,
    loan_titles: HashMap<LoanId, CatalogId>,
}

/// Everything the store keeps for one tenant.
#[derive(Debug, Default)]
struct Shelf {
    data: Mutex<TenantData>,
    /// Titles leased to an open transaction.
    leases: Mutex<HashSet<CatalogId>>,
    released: Condvar,
}

type Directory = HashMap<TenantId, Arc<Shelf>>;

/// An in-memory implementation of [`LendingStore`].
///
/// Data is lost when the store is dropped.
#[derive(Debug)]
pub struct InMemoryStore {
    shards: Vec<RwLock<Directory>>,
    lock_timeout: Duration,
    next_request: AtomicU64,
    next_loan: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        Self::build(&StoreConfig::default())
    }

    /// Create an empty store from configuration.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &StoreConfig) -> Self {
        let count = config.shards.max(1);
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
            lock_timeout: config.lock_timeout(),
            next_request: AtomicU64::new(1),
            next_loan: AtomicU64::new(1),
        }
    }

    fn shard(&self, tenant: TenantId) -> &RwLock<Directory> {
        let index = (tenant.get() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    fn shelf(&self, tenant: TenantId) -> StoreResult<Arc<Shelf>> {
        let shard = self.shard(tenant);
        if let Some(shelf) = shard.read().map_err(poisoned)?.get(&tenant) {
            return Ok(Arc::clone(shelf));
        }
        let mut directory = shard.write().map_err(poisoned)?;
        Ok(Arc::clone(directory.entry(tenant).or_default()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Poisoned(e.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(poisoned)
}

impl LendingStore for InMemoryStore {
    type Tx<'a> = InMemoryTransaction<'a>
    where
        Self: 'a;

    fn begin(&self, tenant: TenantId) -> StoreResult<InMemoryTransaction<'_>> {
        let shelf = self.shelf(tenant)?;
        trace!(%tenant, "transaction opened");
        Ok(InMemoryTransaction {
            tenant,
            shelf,
            held: RefCell::new(BTreeSet::new()),
            delta: Delta::default(),
            store: self,
        })
    }

    fn tenants(&self) -> StoreResult<Vec<TenantId>> {
        let mut tenants = Vec::new();
        for shard in &self.shards {
            for (tenant, shelf) in shard.read().map_err(poisoned)?.iter() {
                if !lock(&shelf.data)?.titles.is_empty() {
                    tenants.push(*tenant);
                }
            }
        }
        tenants.sort();
        Ok(tenants)
    }
}

/// Writes staged by a transaction. `None` marks a deleted row.
#[derive(Debug, Default)]
struct Delta {
    inventory: BTreeMap<CatalogId, Option<InventoryRecord>>,
    requests: BTreeMap<RequestId, Option<RequestRecord>>,
    loans: BTreeMap<LoanId, LoanRecord>,
}

impl Delta {
    fn is_empty(&self) -> bool {
        self.inventory.is_empty() && self.requests.is_empty() && self.loans.is_empty()
    }
}

/// A transaction on an [`InMemoryStore`].
///
/// Holds a lease on every title it has touched until committed or dropped.
pub struct InMemoryTransaction<'a> {
    tenant: TenantId,
    shelf: Arc<Shelf>,
    held: RefCell<BTreeSet<CatalogId>>,
    delta: Delta,
    store: &'a InMemoryStore,
}

impl InMemoryTransaction<'_> {
    fn check_tenant(&self, record: TenantId) -> StoreResult<()> {
        if record != self.tenant {
            return Err(StoreError::TenantMismatch {
                tx: self.tenant,
                record,
            });
        }
        Ok(())
    }

    /// Lease `catalog` to this transaction, waiting up to the store's lock
    /// timeout while another transaction holds it.
    fn acquire(&self, catalog: &CatalogId) -> StoreResult<()> {
        if self.held.borrow().contains(catalog) {
            return Ok(());
        }
        let timeout = self.store.lock_timeout;
        let deadline = Instant::now() + timeout;
        let mut leases = lock(&self.shelf.leases)?;
        while leases.contains(catalog) {
            let now = Instant::now();
            if now >= deadline {
                debug!(tenant = %self.tenant, %catalog, "title lease timed out");
                return Err(StoreError::LockTimeout {
                    tenant: self.tenant,
                    catalog: catalog.to_string(),
                    waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            let (guard, _) = self
                .shelf
                .released
                .wait_timeout(leases, deadline - now)
                .map_err(poisoned)?;
            leases = guard;
        }
        leases.insert(catalog.clone());
        drop(leases);
        self.held.borrow_mut().insert(catalog.clone());
        trace!(tenant = %self.tenant, %catalog, "title leased");
        Ok(())
    }

    fn data(&self) -> StoreResult<MutexGuard<'_, TenantData>> {
        lock(&self.shelf.data)
    }

    /// Outstanding requests of a leased title, staged writes applied.
    fn merged_requests(&self, catalog: &CatalogId) -> StoreResult<BTreeMap<RequestId, RequestRecord>> {
        let mut merged = self
            .data()?
            .titles
            .get(catalog)
            .map(|t| t.requests.clone())
            .unwrap_or_default();
        for (id, staged) in &self.delta.requests {
            match staged {
                Some(r) if &r.catalog == catalog => {
                    merged.insert(*id, r.clone());
                }
                Some(_) => {}
                None => {
                    merged.remove(id);
                }
            }
        }
        Ok(merged)
    }

    /// Active loans of a leased title, staged writes applied.
    fn merged_active_loans(&self, catalog: &CatalogId) -> StoreResult<BTreeMap<LoanId, LoanRecord>> {
        let mut merged = BTreeMap::new();
        if let Some(title) = self.data()?.titles.get(catalog) {
            for id in title.active.values() {
                if let Some(loan) = title.loans.get(id) {
                    merged.insert(*id, loan.clone());
                }
            }
        }
        for (id, staged) in &self.delta.loans {
            if &staged.catalog == catalog && staged.is_active() {
                merged.insert(*id, staged.clone());
            } else {
                merged.remove(id);
            }
        }
        Ok(merged)
    }

    fn release(&mut self) {
        let held = mem::take(self.held.get_mut());
        if held.is_empty() {
            return;
        }
        let mut leases = self
            .shelf
            .leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for catalog in &held {
            leases.remove(catalog);
        }
        drop(leases);
        self.shelf.released.notify_all();
    }
}

impl Drop for InMemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.delta.is_empty() {
            trace!(tenant = %self.tenant, "transaction rolled back");
        }
        self.release();
    }
}

impl Transaction for InMemoryTransaction<'_> {
    fn tenant(&self) -> TenantId {
        self.tenant
    }

    fn inventory(&self, catalog: &CatalogId) -> StoreResult<Option<InventoryRecord>> {
        self.acquire(catalog)?;
        if let Some(staged) = self.delta.inventory.get(catalog) {
            return Ok(staged.clone());
        }
        Ok(self
            .data()?
            .titles
            .get(catalog)
            .and_then(|t| t.inventory.clone()))
    }

    fn put_inventory(&mut self, record: InventoryRecord) -> StoreResult<()> {
        self.check_tenant(record.tenant)?;
        self.acquire(&record.catalog)?;
        self.delta
            .inventory
            .insert(record.catalog.clone(), Some(record));
        Ok(())
    }

    fn delete_inventory(&mut self, catalog: &CatalogId) -> StoreResult<bool> {
        let existed = self.inventory(catalog)?.is_some();
        self.delta.inventory.insert(catalog.clone(), None);
        Ok(existed)
    }

    fn next_request_id(&mut self) -> StoreResult<RequestId> {
        let raw = self.store.next_request.fetch_add(1, Ordering::Relaxed);
        Ok(RequestId::new(raw))
    }

    fn request(&self, id: RequestId) -> StoreResult<Option<RequestRecord>> {
        if let Some(staged) = self.delta.requests.get(&id) {
            return Ok(staged.clone());
        }
        let Some(catalog) = self.data()?.request_titles.get(&id).cloned() else {
            return Ok(None);
        };
        self.acquire(&catalog)?;
        Ok(self
            .data()?
            .titles
            .get(&catalog)
            .and_then(|t| t.requests.get(&id).cloned()))
    }

    fn find_request(
        &self,
        requester: ActorId,
        catalog: &CatalogId,
        kind: RequestKind,
    ) -> StoreResult<Option<RequestRecord>> {
        self.acquire(catalog)?;
        Ok(self
            .merged_requests(catalog)?
            .into_values()
            .find(|r| r.requester == requester && r.kind == kind))
    }

    fn insert_request(&mut self, record: RequestRecord) -> StoreResult<()> {
        self.check_tenant(record.tenant)?;
        if self
            .find_request(record.requester, &record.catalog, record.kind)?
            .is_some()
        {
            return Err(StoreError::UniqueViolation {
                constraint: "requests_outstanding_unique",
                key: format!(
                    "{}/{}/{}/{}",
                    record.tenant, record.requester, record.catalog, record.kind
                ),
            });
        }
        if self.request(record.id)?.is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: "requests_pkey",
                key: record.id.to_string(),
            });
        }
        self.delta.requests.insert(record.id, Some(record));
        Ok(())
    }

    fn delete_request(&mut self, id: RequestId) -> StoreResult<bool> {
        if self.request(id)?.is_none() {
            return Ok(false);
        }
        self.delta.requests.insert(id, None);
        Ok(true)
    }

    fn requests(&self) -> StoreResult<Vec<RequestRecord>> {
        let mut all: BTreeMap<RequestId, RequestRecord> = self
            .data()?
            .titles
            .values()
            .flat_map(|t| t.requests.iter().map(|(id, r)| (*id, r.clone())))
            .collect();
        for (id, staged) in &self.delta.requests {
            match staged {
                Some(r) => {
                    all.insert(*id, r.clone());
                }
                None => {
                    all.remove(id);
                }
            }
        }
        Ok(all.into_values().collect())
    }

    fn requests_for(&self, catalog: &CatalogId) -> StoreResult<Vec<RequestRecord>> {
        self.acquire(catalog)?;
        Ok(self.merged_requests(catalog)?.into_values().collect())
    }

    fn next_loan_id(&mut self) -> StoreResult<LoanId> {
        let raw = self.store.next_loan.fetch_add(1, Ordering::Relaxed);
        Ok(LoanId::new(raw))
    }

    fn loan(&self, id: LoanId) -> StoreResult<Option<LoanRecord>> {
        if let Some(staged) = self.delta.loans.get(&id) {
            return Ok(Some(staged.clone()));
        }
        let Some(catalog) = self.data()?.loan_titles.get(&id).cloned() else {
            return Ok(None);
        };
        self.acquire(&catalog)?;
        Ok(self
            .data()?
            .titles
            .get(&catalog)
            .and_then(|t| t.loans.get(&id).cloned()))
    }

    fn active_loan(
        &self,
        requester: ActorId,
        catalog: &CatalogId,
    ) -> StoreResult<Option<LoanRecord>> {
        self.acquire(catalog)?;
        Ok(self
            .merged_active_loans(catalog)?
            .into_values()
            .find(|l| l.requester == requester))
    }

    fn insert_loan(&mut self, record: LoanRecord) -> StoreResult<()> {
        self.check_tenant(record.tenant)?;
        self.acquire(&record.catalog)?;
        if record.is_active()
            && self
                .active_loan(record.requester, &record.catalog)?
                .is_some()
        {
            return Err(StoreError::UniqueViolation {
                constraint: "loans_active_unique",
                key: format!("{}/{}/{}", record.tenant, record.requester, record.catalog),
            });
        }
        if self.loan(record.id)?.is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: "loans_pkey",
                key: record.id.to_string(),
            });
        }
        self.delta.loans.insert(record.id, record);
        Ok(())
    }

    fn update_loan(&mut self, record: LoanRecord) -> StoreResult<()> {
        self.check_tenant(record.tenant)?;
        if self.loan(record.id)?.is_none() {
            return Err(StoreError::MissingRow {
                table: "loans",
                key: record.id.to_string(),
            });
        }
        self.acquire(&record.catalog)?;
        self.delta.loans.insert(record.id, record);
        Ok(())
    }

    fn loans(&self) -> StoreResult<Vec<LoanRecord>> {
        let mut all: BTreeMap<LoanId, LoanRecord> = self
            .data()?
            .titles
            .values()
            .flat_map(|t| t.loans.iter().map(|(id, l)| (*id, l.clone())))
            .collect();
        for (id, staged) in &self.delta.loans {
            all.insert(*id, staged.clone());
        }
        Ok(all.into_values().collect())
    }

    fn active_loans_for(&self, catalog: &CatalogId) -> StoreResult<Vec<LoanRecord>> {
        self.acquire(catalog)?;
        Ok(self.merged_active_loans(catalog)?.into_values().collect())
    }

    fn commit(mut self) -> StoreResult<()> {
        let delta = mem::take(&mut self.delta);
        {
            let mut data = self.data()?;
            apply(&mut data, delta);
        }
        trace!(tenant = %self.tenant, "transaction committed");
        Ok(())
    }
}

/// Fold a delta into committed data. Titles left with no rows are dropped.
fn apply(data: &mut TenantData, delta: Delta) {
    let mut touched = BTreeSet::new();

    for (catalog, staged) in delta.inventory {
        data.titles.entry(catalog.clone()).or_default().inventory = staged;
        touched.insert(catalog);
    }

    for (id, staged) in delta.requests {
        match staged {
            Some(record) => {
                let catalog = record.catalog.clone();
                data.titles
                    .entry(catalog.clone())
                    .or_default()
                    .requests
                    .insert(id, record);
                data.request_titles.insert(id, catalog.clone());
                touched.insert(catalog);
            }
            None => {
                if let Some(catalog) = data.request_titles.remove(&id) {
                    if let Some(title) = data.titles.get_mut(&catalog) {
                        title.requests.remove(&id);
                    }
                    touched.insert(catalog);
                }
            }
        }
    }

    for (id, record) in delta.loans {
        let catalog = record.catalog.clone();
        if let Some(previous) = data.loan_titles.insert(id, catalog.clone()) {
            if let Some(title) = data.titles.get_mut(&previous) {
                if let Some(old) = title.loans.remove(&id) {
                    if title.active.get(&old.requester) == Some(&id) {
                        title.active.remove(&old.requester);
                    }
                }
            }
            touched.insert(previous);
        }
        let title = data.titles.entry(catalog.clone()).or_default();
        if record.is_active() {
            title.active.insert(record.requester, id);
        }
        title.loans.insert(id, record);
        touched.insert(catalog);
    }

    for catalog in touched {
        if data.titles.get(&catalog).is_some_and(Title::is_empty) {
            data.titles.remove(&catalog);
        }
    }
}
