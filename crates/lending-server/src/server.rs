use tokio::net::TcpListener;

use lending_core::LendingEngine;
use lending_store::InMemoryStore;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// Lending HTTP server.
pub struct LendingServer {
    config: ServerConfig,
}

impl LendingServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build a fresh store and engine from the configuration.
    pub fn state(&self) -> ServerResult<AppState> {
        self.config.validate()?;
        let store = InMemoryStore::from_config(&self.config.store)
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let engine = LendingEngine::new(store, self.config.engine.clone())?;
        Ok(AppState::new(engine))
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> ServerResult<axum::Router> {
        Ok(build_router(self.state()?))
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router()?;
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            loan_period_days = self.config.engine.loan_period_days,
            shards = self.config.store.shards,
            "lending server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
