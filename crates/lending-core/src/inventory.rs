//! The inventory ledger: per-title total and available copy counters.
//!
//! Every operation runs inside the caller's transaction and touches nothing
//! but the inventory row. Counter arithmetic is checked; a result outside
//! `0 <= available <= total` is never written.

use lending_store::Transaction;
use lending_types::{CatalogId, InventoryRecord};
use tracing::debug;

use crate::commands::StockUpdate;
use crate::error::{Entity, LendingError, LendingResult};

#[derive(Debug, Default, Clone, Copy)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Current counters for `catalog`. Fails with `NotFound` if the title
    /// was never stocked.
    pub fn availability<T: Transaction>(
        &self,
        tx: &T,
        catalog: &CatalogId,
    ) -> LendingResult<InventoryRecord> {
        let record = tx
            .inventory(catalog)?
            .ok_or_else(|| LendingError::not_found(Entity::Title, catalog))?;
        check_consistent(&record)?;
        Ok(record)
    }

    /// Take one copy off the shelf.
    pub fn reserve_one_copy<T: Transaction>(
        &self,
        tx: &mut T,
        catalog: &CatalogId,
    ) -> LendingResult<InventoryRecord> {
        let mut record = self.availability(tx, catalog)?;
        record.available_copies = record
            .available_copies
            .checked_sub(1)
            .ok_or_else(|| LendingError::OutOfStock {
                catalog: catalog.clone(),
            })?;
        tx.put_inventory(record.clone())?;
        debug!(tenant = %tx.tenant(), %catalog, available = record.available_copies, "copy reserved");
        Ok(record)
    }

    /// Put one copy back on the shelf. A shelf that is already full means the
    /// counters disagree with the loans, which is a `ConsistencyFault`.
    pub fn release_one_copy<T: Transaction>(
        &self,
        tx: &mut T,
        catalog: &CatalogId,
    ) -> LendingResult<InventoryRecord> {
        let mut record = self.availability(tx, catalog)?;
        if record.available_copies >= record.total_copies {
            return Err(LendingError::ConsistencyFault(format!(
                "releasing a copy of {catalog} would exceed its total of {}",
                record.total_copies
            )));
        }
        record.available_copies += 1;
        tx.put_inventory(record.clone())?;
        debug!(tenant = %tx.tenant(), %catalog, available = record.available_copies, "copy released");
        Ok(record)
    }

    /// Add `copies` to both counters, creating the row if needed.
    pub fn add_stock<T: Transaction>(
        &self,
        tx: &mut T,
        catalog: &CatalogId,
        copies: u32,
    ) -> LendingResult<InventoryRecord> {
        if copies == 0 {
            return Err(LendingError::InvalidOperation(
                "stock additions must add at least one copy".into(),
            ));
        }
        let record = match tx.inventory(catalog)? {
            Some(mut existing) => {
                check_consistent(&existing)?;
                let overflow = || {
                    LendingError::InvalidOperation(format!(
                        "adding {copies} copies of {catalog} overflows the copy count"
                    ))
                };
                existing.total_copies = existing.total_copies.checked_add(copies).ok_or_else(overflow)?;
                existing.available_copies =
                    existing.available_copies.checked_add(copies).ok_or_else(overflow)?;
                existing
            }
            None => InventoryRecord::new(tx.tenant(), catalog.clone(), copies),
        };
        tx.put_inventory(record.clone())?;
        debug!(
            tenant = %tx.tenant(),
            %catalog,
            total = record.total_copies,
            available = record.available_copies,
            "stock added"
        );
        Ok(record)
    }

    /// Apply a partial counter update, given how many copies are out on loan.
    ///
    /// - A new total moves `available` by the same delta. If that would take
    ///   `available` below zero, or the total below `on_loan`, the update is
    ///   rejected.
    /// - An explicit `available` may not exceed `total - on_loan`.
    pub fn apply_update<T: Transaction>(
        &self,
        tx: &mut T,
        catalog: &CatalogId,
        update: StockUpdate,
        on_loan: u32,
    ) -> LendingResult<InventoryRecord> {
        if update.is_empty() {
            return Err(LendingError::InvalidOperation("nothing to update".into()));
        }
        let mut record = self.availability(tx, catalog)?;

        let total = update.total_copies.unwrap_or(record.total_copies);
        let shelf_capacity = total.checked_sub(on_loan).ok_or_else(|| {
            LendingError::InvalidOperation(format!(
                "total of {total} is below the {on_loan} copies of {catalog} on loan"
            ))
        })?;

        let available = match update.available_copies {
            Some(available) => available,
            None => {
                let delta = i64::from(total) - i64::from(record.total_copies);
                let moved = i64::from(record.available_copies) + delta;
                u32::try_from(moved).map_err(|_| {
                    LendingError::InvalidOperation(format!(
                        "shrinking {catalog} to {total} copies would leave {moved} available"
                    ))
                })?
            }
        };
        if available > shelf_capacity {
            return Err(LendingError::InvalidOperation(format!(
                "{available} available exceeds the {shelf_capacity} copies of {catalog} not on loan"
            )));
        }

        record.total_copies = total;
        record.available_copies = available;
        tx.put_inventory(record.clone())?;
        debug!(tenant = %tx.tenant(), %catalog, total, available, "stock adjusted");
        Ok(record)
    }

    /// Delete the title's row. Fails with `NotFound` if absent.
    pub fn remove<T: Transaction>(&self, tx: &mut T, catalog: &CatalogId) -> LendingResult<()> {
        if !tx.delete_inventory(catalog)? {
            return Err(LendingError::not_found(Entity::Title, catalog));
        }
        debug!(tenant = %tx.tenant(), %catalog, "title removed");
        Ok(())
    }
}

fn check_consistent(record: &InventoryRecord) -> LendingResult<()> {
    if !record.is_consistent() {
        return Err(LendingError::ConsistencyFault(format!(
            "{} has {} available of {} total",
            record.catalog, record.available_copies, record.total_copies
        )));
    }
    Ok(())
}
