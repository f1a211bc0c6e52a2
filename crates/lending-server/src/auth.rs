//! Caller identity and role checks.
//!
//! The server sits behind a gateway that has already authenticated the
//! caller. The gateway forwards who the caller is in three trusted headers;
//! this module turns them into an [`Actor`] and decides what that actor may
//! do.

use std::fmt;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use lending_types::{Actor, ActorId, Role, TenantId};

use crate::error::{ServerError, ServerResult};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ROLE_HEADER: &str = "x-actor-role";

/// Something a caller asks to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Search,
    ManageStock,
    RaiseRequest,
    ListRequests,
    DecideRequest,
    ListLoans,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Search => "search titles",
            Self::ManageStock => "manage stock",
            Self::RaiseRequest => "raise requests",
            Self::ListRequests => "list requests",
            Self::DecideRequest => "decide requests",
            Self::ListLoans => "list loans",
        })
    }
}

#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn authorize(&self, actor: &Actor, action: Action) -> ServerResult<()>;
}

/// Gate on role alone: approvers manage stock and decide requests, readers
/// raise requests, everyone may search and list loans.
pub struct RoleGate;

#[async_trait]
impl AccessGate for RoleGate {
    async fn authorize(&self, actor: &Actor, action: Action) -> ServerResult<()> {
        let allowed = match action {
            Action::Search | Action::ListLoans => true,
            Action::ManageStock | Action::ListRequests | Action::DecideRequest => {
                actor.role.can_approve()
            }
            Action::RaiseRequest => actor.role == Role::Reader,
        };
        if allowed {
            Ok(())
        } else {
            Err(ServerError::AuthorizationDenied {
                role: actor.role.to_string(),
                action: action.to_string(),
            })
        }
    }
}

/// The authenticated caller of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller(pub Actor);

impl Caller {
    pub fn from_headers(headers: &HeaderMap) -> ServerResult<Self> {
        let tenant: TenantId = header(headers, TENANT_HEADER)?;
        let id: ActorId = header(headers, ACTOR_HEADER)?;
        let role: Role = header(headers, ROLE_HEADER)?;
        Ok(Self(Actor::new(tenant, id, role)))
    }
}

fn header<T>(headers: &HeaderMap, name: &str) -> ServerResult<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let raw = headers
        .get(name)
        .ok_or_else(|| ServerError::AuthFailed(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| ServerError::AuthFailed(format!("{name} is not valid text")))?;
    raw.parse()
        .map_err(|e| ServerError::AuthFailed(format!("invalid {name}: {e}")))
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
