//! Persisted entity records: inventory counters, outstanding requests, and
//! loans.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogId;
use crate::error::TypeError;
use crate::identity::{ActorId, TenantId};

/// Identifier of an outstanding request. Allocated from a store-wide
/// monotonic counter, so ordering by id is insertion order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Identifier of a loan record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(u64);

impl LoanId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoanId({})", self.0)
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loan#{}", self.0)
    }
}

/// What a request asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Borrow,
    Return,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Borrow => "borrow",
            Self::Return => "return",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // "issue" is what older clients send for a borrow.
            "borrow" | "issue" => Ok(Self::Borrow),
            "return" => Ok(Self::Return),
            _ => Err(TypeError::InvalidRequestKind(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Returned => "returned",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "issued" => Ok(Self::Active),
            "returned" => Ok(Self::Returned),
            _ => Err(TypeError::InvalidLoanStatus(s.to_string())),
        }
    }
}

/// Copy counters for one `(tenant, catalog id)` pair.
///
/// Invariant: `available_copies <= total_copies`. Both are unsigned, so the
/// lower bound holds by construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub tenant: TenantId,
    pub catalog: CatalogId,
    pub total_copies: u32,
    pub available_copies: u32,
}

impl InventoryRecord {
    /// A fresh record with `copies` on the shelf.
    pub fn new(tenant: TenantId, catalog: CatalogId, copies: u32) -> Self {
        Self {
            tenant,
            catalog,
            total_copies: copies,
            available_copies: copies,
        }
    }

    /// Copies currently out on loan, or `None` if the counters are corrupt.
    pub fn on_loan(&self) -> Option<u32> {
        self.total_copies.checked_sub(self.available_copies)
    }

    pub fn is_consistent(&self) -> bool {
        self.available_copies <= self.total_copies
    }
}

/// An outstanding borrow or return request. Removed from the store the
/// moment it is processed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub tenant: TenantId,
    pub requester: ActorId,
    pub catalog: CatalogId,
    pub kind: RequestKind,
    pub created_at: DateTime<Utc>,
}

/// One issued copy, from approval until (and after) its return.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub id: LoanId,
    pub tenant: TenantId,
    pub requester: ActorId,
    pub catalog: CatalogId,
    pub approver: ActorId,
    pub status: LoanStatus,
    pub issued_at: DateTime<Utc>,
    pub expected_return_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub return_approver: Option<ActorId>,
}

impl LoanRecord {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// `true` if the loan is still out past its expected return date.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now > self.expected_return_at
    }
}
