//! Identity types shared by the ledger, permission, and strategy crates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// External user identifier (opaque UUID, owned by the auth database).
///
/// The control plane reads this identifier but never assigns meaning to it
/// beyond equality and the `user:` display prefix used in logs and audit
/// rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Create a new random user id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid_str = s.strip_prefix("user:").unwrap_or(s);
        Ok(Self(Uuid::parse_str(uuid_str)?))
    }
}

/// Short alphanumeric employee number, unique across the HR sync store.
///
/// Kept distinct from [`UserId`] because permission-store operations are
/// keyed by employee number once EmployeeSync has resolved an external
/// user id (see `spec.md` §4.2, "Identifier indirection").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeNumber(String);

impl EmployeeNumber {
    /// Wrap a raw employee number, rejecting the empty string.
    ///
    /// `EmployeeDepartment`'s invariant (`spec.md` §3) requires uniqueness,
    /// not non-emptiness, but an empty employee number can never be
    /// assigned by the HR sync collaborator, so treat it as a validation
    /// failure here rather than threading `Option<EmployeeNumber>` through
    /// every caller.
    pub fn new(raw: impl Into<String>) -> Result<Self, crate::QcpError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(crate::QcpError::Validation(
                "employee number must not be empty".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmployeeNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An employee's department path, root to leaf, as an ordered list of
/// segment names.
///
/// `spec.md` §3 stores this as a comma-joined string; this type is the
/// parsed form used everywhere except at the HR sync boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentPath(Vec<String>);

impl DepartmentPath {
    /// Parse a comma-joined path, rejecting an empty path (≥1 segment
    /// invariant from `spec.md` §3).
    pub fn parse(raw: &str) -> Result<Self, crate::QcpError> {
        let segments: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return Err(crate::QcpError::Validation(
                "department path must have at least one segment".to_string(),
            ));
        }
        Ok(Self(segments))
    }

    /// Segments from root to leaf.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Segments from leaf to root, the order permission resolution walks.
    pub fn leaf_to_root(&self) -> impl Iterator<Item = &String> {
        self.0.iter().rev()
    }

    /// The leaf (most specific) segment.
    pub fn leaf(&self) -> &str {
        self.0.last().expect("non-empty by construction")
    }

    pub fn to_comma_joined(&self) -> String {
        self.0.join(",")
    }
}

/// Unique identifier for a quota strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(Uuid);

impl StrategyId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StrategyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "strategy:{}", self.0)
    }
}

/// Single-use nonce embedded in a voucher; the ledger's redemption table is
/// keyed on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherNonce(Uuid);

impl VoucherNonce {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VoucherNonce {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VoucherNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
