//! The request registry: outstanding borrow and return requests.
//!
//! A request lives here from the moment a reader raises it until an approver
//! processes it. Processed requests are deleted, never kept in a "done"
//! state; what happened to them is recorded by the loan registry.

use chrono::{DateTime, Utc};
use lending_store::Transaction;
use lending_types::{ActorId, CatalogId, RequestId, RequestKind, RequestRecord};
use tracing::{debug, warn};

use crate::error::{Entity, LendingError, LendingResult};

#[derive(Debug, Clone, Copy)]
pub struct RequestRegistry {
    raise_requires_stock: bool,
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RequestRegistry {
    pub fn new(raise_requires_stock: bool) -> Self {
        Self {
            raise_requires_stock,
        }
    }

    /// Record a new outstanding request.
    ///
    /// Rejections, in order:
    /// - `DuplicateRequest` if the reader already has one of this kind
    ///   outstanding for the title
    /// - return: `NoActiveLoan` unless the reader holds the title
    /// - borrow: `NotFound` for a never-stocked title, `OutOfStock` if no copy
    ///   is on the shelf (peeked, not reserved)
    pub fn raise<T: Transaction>(
        &self,
        tx: &mut T,
        requester: ActorId,
        catalog: &CatalogId,
        kind: RequestKind,
        now: DateTime<Utc>,
    ) -> LendingResult<RequestRecord> {
        if tx.find_request(requester, catalog, kind)?.is_some() {
            return Err(LendingError::DuplicateRequest {
                requester,
                catalog: catalog.clone(),
                kind,
            });
        }

        match kind {
            RequestKind::Return => {
                if tx.active_loan(requester, catalog)?.is_none() {
                    return Err(LendingError::NoActiveLoan {
                        requester,
                        catalog: catalog.clone(),
                    });
                }
            }
            RequestKind::Borrow => {
                let stock = tx
                    .inventory(catalog)?
                    .ok_or_else(|| LendingError::not_found(Entity::Title, catalog))?;
                if stock.available_copies == 0 {
                    if self.raise_requires_stock {
                        return Err(LendingError::OutOfStock {
                            catalog: catalog.clone(),
                        });
                    }
                    warn!(tenant = %tx.tenant(), %catalog, %requester, "borrow raised with no copies on the shelf");
                }
            }
        }

        let record = RequestRecord {
            id: tx.next_request_id()?,
            tenant: tx.tenant(),
            requester,
            catalog: catalog.clone(),
            kind,
            created_at: now,
        };
        tx.insert_request(record.clone())?;
        debug!(tenant = %record.tenant, request = %record.id, %requester, %catalog, %kind, "request raised");
        Ok(record)
    }

    pub fn get<T: Transaction>(&self, tx: &T, id: RequestId) -> LendingResult<RequestRecord> {
        tx.request(id)?
            .ok_or_else(|| LendingError::not_found(Entity::Request, id))
    }

    /// Load a request and require it to be of `kind`. A request of the other
    /// kind is reported as `NotFound`: there is no such borrow (or return)
    /// request.
    pub fn get_of_kind<T: Transaction>(
        &self,
        tx: &T,
        id: RequestId,
        kind: RequestKind,
    ) -> LendingResult<RequestRecord> {
        let record = self.get(tx, id)?;
        if record.kind != kind {
            return Err(LendingError::not_found(
                Entity::Request,
                format!("{kind} request {id}"),
            ));
        }
        Ok(record)
    }

    /// Delete a processed request.
    pub fn remove<T: Transaction>(&self, tx: &mut T, id: RequestId) -> LendingResult<()> {
        if !tx.delete_request(id)? {
            return Err(LendingError::not_found(Entity::Request, id));
        }
        debug!(tenant = %tx.tenant(), request = %id, "request removed");
        Ok(())
    }

    /// Outstanding requests of the transaction's tenant, oldest first.
    pub fn list<T: Transaction>(&self, tx: &T) -> LendingResult<Vec<RequestRecord>> {
        Ok(tx.requests()?)
    }

    pub fn list_for<T: Transaction>(
        &self,
        tx: &T,
        catalog: &CatalogId,
    ) -> LendingResult<Vec<RequestRecord>> {
        Ok(tx.requests_for(catalog)?)
    }
}
