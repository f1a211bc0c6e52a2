//! Transactional storage for the lending engine.
//!
//! The engine never talks to a database directly. It opens a
//! [`Transaction`] through a [`LendingStore`], performs every step of an
//! operation against it, and commits once. Any failure drops the
//! transaction and nothing is published.
//!
//! # Tables
//!
//! - inventory: one row per `(tenant, catalog id)` with copy counters
//! - requests: outstanding borrow/return requests, unique per
//!   `(tenant, requester, catalog id, kind)`
//! - loans: issued copies, at most one active per
//!   `(tenant, requester, catalog id)`
//!
//! # Backends
//!
//! - [`InMemoryStore`]: per-title leases and delta-staged transactions, for
//!   tests and embedding

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use traits::{LendingStore, Transaction};
