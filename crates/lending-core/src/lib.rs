//! The lending workflow engine.
//!
//! This crate is the heart of the workspace. It provides:
//! - [`InventoryLedger`]: checked total/available copy counters per title
//! - [`RequestRegistry`]: outstanding borrow and return requests
//! - [`LoanRegistry`]: issued copies and their expected return dates
//! - [`LendingEngine`]: the borrow/return state machine, running each
//!   operation as one atomic unit of work against a
//!   [`LendingStore`](lending_store::LendingStore)

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod loans;
pub mod requests;

pub use commands::{
    AddStock, Decision, LoanFilter, ProcessOutcome, RaiseRequest, SearchResult, StockUpdate,
};
pub use config::{EngineConfig, DEFAULT_LOAN_PERIOD_DAYS, MAX_LOAN_PERIOD_DAYS};
pub use engine::LendingEngine;
pub use error::{Entity, LendingError, LendingResult};
pub use inventory::InventoryLedger;
pub use loans::LoanRegistry;
pub use requests::RequestRegistry;
