//! Common value types used across the control plane.

use serde::{Deserialize, Serialize};

/// A signed quota amount, in whatever unit the downstream gateway counts
/// (`spec.md` §3 calls this "signed rational"; the gateway's wire format
/// is a signed integer, so this crate stores the same).
///
/// Negative values are meaningful: a negative RECHARGE is a debit (see
/// `DESIGN.md`, Open Question 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaAmount(i64);

impl QuotaAmount {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(&self, other: QuotaAmount) -> Option<QuotaAmount> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: QuotaAmount) -> Option<QuotaAmount> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn negate(&self) -> QuotaAmount {
        Self(-self.0)
    }
}

impl std::fmt::Display for QuotaAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for QuotaAmount {
    type Output = QuotaAmount;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::Sub for QuotaAmount {
    type Output = QuotaAmount;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Millisecond-precision timestamp, wrapping `chrono::DateTime<Utc>` for
/// consistent serialization across repository and wire boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from the current time.
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    /// Create a timestamp from milliseconds since Unix epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Get milliseconds since Unix epoch.
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Convert to a `chrono::DateTime<Utc>`.
    pub fn to_datetime(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.0).unwrap_or_else(chrono::Utc::now)
    }

    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Timestamp {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}
