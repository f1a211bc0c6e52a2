//! Catalog id validation.
//!
//! A catalog id names a title (usually its ISBN) within a tenant. Valid ids:
//! - Must be non-empty and at most [`MAX_CATALOG_ID_LEN`] bytes
//! - May contain only ASCII letters, digits, `-`, `_` and `.`
//! - Must not start or end with a separator (`-`, `_`, `.`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest catalog id accepted.
pub const MAX_CATALOG_ID_LEN: usize = 64;

const SEPARATORS: &[char] = &['-', '_', '.'];

/// Validate a catalog id, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use lending_types::catalog::validate_catalog_id;
///
/// assert!(validate_catalog_id("ISBN1").is_ok());
/// assert!(validate_catalog_id("978-0-13-110362-7").is_ok());
/// assert!(validate_catalog_id("").is_err());
/// assert!(validate_catalog_id("has space").is_err());
/// ```
pub fn validate_catalog_id(id: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidCatalogId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if id.len() > MAX_CATALOG_ID_LEN {
        return Err(invalid(&format!(
            "longer than {MAX_CATALOG_ID_LEN} bytes"
        )));
    }
    if let Some(ch) = id
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !SEPARATORS.contains(c))
    {
        return Err(invalid(&format!("contains forbidden character: {ch:?}")));
    }
    if id.starts_with(SEPARATORS) || id.ends_with(SEPARATORS) {
        return Err(invalid("must not start or end with a separator"));
    }
    Ok(())
}

/// Title identifier scoped within a tenant.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CatalogId(String);

impl CatalogId {
    /// Build a validated catalog id.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        validate_catalog_id(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CatalogId({})", self.0)
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CatalogId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CatalogId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CatalogId> for String {
    fn from(id: CatalogId) -> Self {
        id.0
    }
}
