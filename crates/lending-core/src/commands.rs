//! Typed inputs and outputs of engine operations.
//!
//! These are what the HTTP layer deserializes request bodies into, so
//! validation (catalog id shape, known request kinds) happens before the
//! engine is called.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lending_types::{ActorId, CatalogId, LoanRecord, LoanStatus, RequestKind, RequestRecord};

use crate::error::LendingError;

/// Body of a reader's request submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaiseRequest {
    pub catalog: CatalogId,
    pub kind: RequestKind,
}

/// Body of a stock addition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStock {
    pub copies: u32,
}

/// Partial update of a title's copy counters. Absent fields are left as they
/// are; an update with no field present is rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_copies: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_copies: Option<u32>,
}

impl StockUpdate {
    pub fn is_empty(&self) -> bool {
        self.total_copies.is_none() && self.available_copies.is_none()
    }
}

/// An approver's verdict on an outstanding request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        })
    }
}

impl FromStr for Decision {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            _ => Err(LendingError::InvalidOperation(format!(
                "unknown decision {s:?}; expected approve or reject"
            ))),
        }
    }
}

/// What processing a request did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// A borrow was approved and a copy issued.
    Issued { loan: LoanRecord },
    /// A return was completed and the copy is back on the shelf.
    Returned { loan: LoanRecord },
    /// The request was dropped without touching inventory or loans.
    Rejected { request: RequestRecord },
}

/// Restricts a loan listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanFilter {
    #[serde(default)]
    pub requester: Option<ActorId>,
    #[serde(default)]
    pub status: Option<LoanStatus>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &LoanRecord) -> bool {
        self.requester.map_or(true, |r| loan.requester == r)
            && self.status.map_or(true, |s| loan.status == s)
    }
}

/// Availability of a title as shown to readers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub catalog: CatalogId,
    pub total_copies: u32,
    pub available_copies: u32,
    /// Earliest expected return among active loans. Only filled in when no
    /// copy is on the shelf.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_available_at: Option<DateTime<Utc>>,
}
