use std::sync::Arc;

use lending_core::LendingEngine;
use lending_store::InMemoryStore;

use crate::auth::{AccessGate, RoleGate};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LendingEngine<InMemoryStore>>,
    pub gate: Arc<dyn AccessGate>,
}

impl AppState {
    pub fn new(engine: LendingEngine<InMemoryStore>) -> Self {
        Self::with_gate(engine, Arc::new(RoleGate))
    }

    pub fn with_gate(engine: LendingEngine<InMemoryStore>, gate: Arc<dyn AccessGate>) -> Self {
        Self {
            engine: Arc::new(engine),
            gate,
        }
    }
}
