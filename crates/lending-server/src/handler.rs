use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;

use lending_core::{
    AddStock, Decision, LendingResult, LoanFilter, ProcessOutcome, RaiseRequest, SearchResult,
    StockUpdate,
};
use lending_types::{
    Actor, ActorId, CatalogId, InventoryRecord, LoanRecord, LoanStatus, RequestId, RequestRecord,
    Role,
};

use crate::auth::{Action, Caller};
use crate::error::{ServerError, ServerResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

/// Run a synchronous engine call on the blocking pool. Engine calls may wait
/// on a title another request holds; that wait must not park an async
/// worker.
async fn blocking<T, F>(work: F) -> ServerResult<T>
where
    F: FnOnce() -> LendingResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServerError::Internal(format!("engine task failed: {e}")))?
        .map_err(ServerError::from)
}

/// Health check handler.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "lending-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    ApiPath(catalog): ApiPath<String>,
) -> ServerResult<Json<SearchResult>> {
    state.gate.authorize(&actor, Action::Search).await?;
    let catalog = CatalogId::new(catalog)?;
    let engine = Arc::clone(&state.engine);
    let found = blocking(move || engine.search(actor.tenant, &catalog)).await?;
    Ok(Json(found))
}

pub async fn add_stock_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    ApiPath(catalog): ApiPath<String>,
    ApiJson(body): ApiJson<AddStock>,
) -> ServerResult<(StatusCode, Json<InventoryRecord>)> {
    state.gate.authorize(&actor, Action::ManageStock).await?;
    let catalog = CatalogId::new(catalog)?;
    let engine = Arc::clone(&state.engine);
    let record = blocking(move || engine.add_stock(actor.tenant, &catalog, body.copies)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn adjust_stock_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    ApiPath(catalog): ApiPath<String>,
    ApiJson(update): ApiJson<StockUpdate>,
) -> ServerResult<Json<InventoryRecord>> {
    state.gate.authorize(&actor, Action::ManageStock).await?;
    let catalog = CatalogId::new(catalog)?;
    let engine = Arc::clone(&state.engine);
    let record = blocking(move || engine.adjust_stock(actor.tenant, &catalog, update)).await?;
    Ok(Json(record))
}

pub async fn remove_title_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    ApiPath(catalog): ApiPath<String>,
) -> ServerResult<StatusCode> {
    state.gate.authorize(&actor, Action::ManageStock).await?;
    let catalog = CatalogId::new(catalog)?;
    let engine = Arc::clone(&state.engine);
    blocking(move || engine.remove_title(actor.tenant, &catalog)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A reader raises a request on their own behalf.
pub async fn raise_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    ApiJson(body): ApiJson<RaiseRequest>,
) -> ServerResult<(StatusCode, Json<RequestRecord>)> {
    state.gate.authorize(&actor, Action::RaiseRequest).await?;
    let engine = Arc::clone(&state.engine);
    let record =
        blocking(move || engine.raise(actor.tenant, actor.id, &body.catalog, body.kind)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_requests_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ServerResult<Json<Vec<RequestRecord>>> {
    state.gate.authorize(&actor, Action::ListRequests).await?;
    let engine = Arc::clone(&state.engine);
    let requests = blocking(move || engine.list_requests(Some(actor.tenant))).await?;
    Ok(Json(requests))
}

pub async fn approve_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ServerResult<Json<ProcessOutcome>> {
    decide(state, actor, id, Decision::Approve).await
}

pub async fn reject_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    ApiPath(id): ApiPath<u64>,
) -> ServerResult<Json<ProcessOutcome>> {
    decide(state, actor, id, Decision::Reject).await
}

async fn decide(
    state: AppState,
    actor: Actor,
    id: u64,
    decision: Decision,
) -> ServerResult<Json<ProcessOutcome>> {
    state.gate.authorize(&actor, Action::DecideRequest).await?;
    let engine = Arc::clone(&state.engine);
    let outcome = blocking(move || {
        engine.process(actor.tenant, RequestId::new(id), actor.id, decision)
    })
    .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoansQuery {
    pub requester: Option<ActorId>,
    pub status: Option<LoanStatus>,
}

/// Approvers see every loan of their tenant; readers only their own.
pub async fn list_loans_handler(
    State(state): State<AppState>,
    Caller(actor): Caller,
    ApiQuery(query): ApiQuery<LoansQuery>,
) -> ServerResult<Json<Vec<LoanRecord>>> {
    state.gate.authorize(&actor, Action::ListLoans).await?;
    let requester = match actor.role {
        Role::Reader => Some(actor.id),
        Role::Owner | Role::Admin => query.requester,
    };
    let filter = LoanFilter {
        requester,
        status: query.status,
    };
    let engine = Arc::clone(&state.engine);
    let loans = blocking(move || engine.list_loans(actor.tenant, &filter)).await?;
    Ok(Json(loans))
}
