//! Permission settings: the raw rows a user- or department-level override is
//! stored as (`spec.md` §4.2, §3).

use chrono::{DateTime, Utc};
use qcp_common::{EmployeeNumber, QcpError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three domains a setting can govern (`spec.md` §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionDomain {
    ModelWhitelist,
    StarCheck,
    QuotaCheck,
}

impl PermissionDomain {
    pub const ALL: [PermissionDomain; 3] = [
        PermissionDomain::ModelWhitelist,
        PermissionDomain::StarCheck,
        PermissionDomain::QuotaCheck,
    ];
}

/// What a setting is attached to: a specific user (by employee number, not
/// external user id — see `spec.md` §4.2 "Identifier indirection") or a
/// department, identified by a single path segment name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    User(EmployeeNumber),
    Department(String),
}

/// A domain's value, shaped per domain (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    ModelWhitelist(Vec<String>),
    Flag(bool),
}

impl SettingValue {
    pub fn domain_default(domain: PermissionDomain) -> Self {
        match domain {
            // No whitelist configured anywhere in the chain means no
            // restriction, not "deny everything" (spec.md §4.2, default
            // resolution).
            PermissionDomain::ModelWhitelist => SettingValue::ModelWhitelist(Vec::new()),
            PermissionDomain::StarCheck => SettingValue::Flag(false),
            PermissionDomain::QuotaCheck => SettingValue::Flag(false),
        }
    }

    fn matches_domain(&self, domain: PermissionDomain) -> bool {
        matches!(
            (self, domain),
            (SettingValue::ModelWhitelist(_), PermissionDomain::ModelWhitelist)
                | (SettingValue::Flag(_), PermissionDomain::StarCheck)
                | (SettingValue::Flag(_), PermissionDomain::QuotaCheck)
        )
    }

    /// Whether this value counts as "not configured" for resolution
    /// purposes (`spec.md` §4.2, resolution rule 1/2): an empty whitelist is
    /// empty, a boolean flag is always a concrete value and never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            SettingValue::ModelWhitelist(models) => models.is_empty(),
            SettingValue::Flag(_) => false,
        }
    }
}

/// A single persisted permission override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub id: Uuid,
    pub target: TargetType,
    pub domain: PermissionDomain,
    pub value: SettingValue,
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    pub fn new(target: TargetType, domain: PermissionDomain, value: SettingValue) -> Result<Self, QcpError> {
        if !value.matches_domain(domain) {
            return Err(QcpError::Validation(format!(
                "setting value does not match domain {domain:?}"
            )));
        }
        Ok(Self {
            id: Uuid::now_v7(),
            target,
            domain,
            value,
            updated_at: Utc::now(),
        })
    }
}
