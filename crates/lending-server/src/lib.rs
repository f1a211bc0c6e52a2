//! HTTP server for the lending engine.
//!
//! Exposes the borrow/return workflow as a small JSON API. Callers are
//! authenticated upstream; the gateway forwards tenant, actor and role in
//! trusted headers (see [`auth`]).

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{AccessGate, Action, Caller, RoleGate};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use router::build_router;
pub use server::LendingServer;
pub use state::AppState;
