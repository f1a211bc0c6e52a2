//! Foundation types for the lending engine.
//!
//! Every other crate in the workspace depends on `lending-types`.
//!
//! # Key Types
//!
//! - [`TenantId`], [`ActorId`], [`Role`], [`Actor`]: who is acting, and for which library
//! - [`CatalogId`]: validated title identifier (usually an ISBN)
//! - [`InventoryRecord`]: total/available copy counters per title
//! - [`RequestRecord`]: an outstanding borrow or return request
//! - [`LoanRecord`]: an issued copy, active or returned
//! - [`Clock`]: time source, swappable for tests

pub mod catalog;
pub mod error;
pub mod identity;
pub mod records;
pub mod temporal;

pub use catalog::{validate_catalog_id, CatalogId, MAX_CATALOG_ID_LEN};
pub use error::TypeError;
pub use identity::{Actor, ActorId, Role, TenantId};
pub use records::{
    InventoryRecord, LoanId, LoanRecord, LoanStatus, RequestId, RequestKind, RequestRecord,
};
pub use temporal::{Clock, FixedClock, SystemClock};
