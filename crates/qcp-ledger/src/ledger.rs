//! Quota records and the audit trail (`spec.md` §4.1).
//!
//! A user's quota is not a single balance: it is a set of (amount, expiry)
//! records. The ledger stores amounts as issued and never mutates a record
//! to reflect ordinary consumption — the gateway owns `used`. Remainders
//! are derived at read time by applying the gateway's reported `used`
//! against records in ascending (expiry, created_at) order, so the soonest
//! to expire is reported as consumed first without requiring a write on
//! every request. A record's `amount` only changes when quota is
//! structurally removed from it: a transfer-out debit, or an expiry.

use chrono::{DateTime, Utc};
use qcp_common::{QcpError, QcpResult, QuotaAmount, StrategyId, UserId, VoucherNonce};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a single quota record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaStatus {
    /// Not yet past its expiry; still eligible to be drawn down.
    Active,
    /// Past its expiry; excluded from allocation and swept by `sweep.rs`.
    Expired,
}

/// One grant of quota: a recharge, a transfer-in, or a strategy credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: QuotaAmount,
    pub expires_at: DateTime<Utc>,
    pub status: QuotaStatus,
    pub created_at: DateTime<Utc>,
    /// Strategy that produced this record, if any (`spec.md` §4.3).
    pub source_strategy_id: Option<StrategyId>,
}

impl QuotaRecord {
    pub fn new(
        user_id: UserId,
        amount: QuotaAmount,
        expires_at: DateTime<Utc>,
        source_strategy_id: Option<StrategyId>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            amount,
            expires_at,
            status: QuotaStatus::Active,
            created_at: Utc::now(),
            source_strategy_id,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == QuotaStatus::Expired || now >= self.expires_at
    }
}

/// Kinds of audit entry (`spec.md` §4.1, "Audit log").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    Recharge,
    TransferIn,
    TransferOut,
    Expire,
}

/// A single append-only audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaAudit {
    pub id: Uuid,
    pub user_id: UserId,
    pub operation: AuditOperation,
    pub amount: QuotaAmount,
    pub record_id: Option<Uuid>,
    pub counterparty_user_id: Option<UserId>,
    pub voucher_nonce: Option<VoucherNonce>,
    pub balance_after: QuotaAmount,
    pub created_at: DateTime<Utc>,
}

impl QuotaAudit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        operation: AuditOperation,
        amount: QuotaAmount,
        record_id: Option<Uuid>,
        counterparty_user_id: Option<UserId>,
        voucher_nonce: Option<VoucherNonce>,
        balance_after: QuotaAmount,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            operation,
            amount,
            record_id,
            counterparty_user_id,
            voucher_nonce,
            balance_after,
            created_at: Utc::now(),
        }
    }
}

/// A monthly snapshot of gateway-reported usage, taken when the records
/// covering that usage expire (`spec.md` §3, §4.1 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyQuotaUsage {
    pub user_id: UserId,
    /// `"YYYY-MM"` key of the month the snapshot covers.
    pub year_month: String,
    pub used_quota: i64,
    pub recorded_at: DateTime<Utc>,
}

impl MonthlyQuotaUsage {
    pub fn new(user_id: UserId, year_month: String, used_quota: i64) -> Self {
        Self { user_id, year_month, used_quota, recorded_at: Utc::now() }
    }
}

/// Per-record view of quota remaining, derived at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecordRemainder {
    pub record_id: Uuid,
    pub amount_remaining: QuotaAmount,
    pub expires_at: DateTime<Utc>,
}

/// Aggregate view of a user's quota, as reported by
/// `QuotaLedgerService::get_user_quota` (`spec.md` §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSummary {
    pub total_remaining: QuotaAmount,
    pub total_used: QuotaAmount,
    pub per_record: Vec<QuotaRecordRemainder>,
}

/// Apply the gateway's reported `used` against `records` in ascending
/// `(expires_at, created_at)` order — soonest-to-expire consumed first
/// (`spec.md` §4.1, "Consumption order"). Records themselves are not
/// mutated; this is a read-time projection.
pub fn apply_consumption_order(records: &[QuotaRecord], used: QuotaAmount) -> (Vec<QuotaRecordRemainder>, QuotaAmount) {
    let mut ordered: Vec<&QuotaRecord> = records.iter().collect();
    ordered.sort_by_key(|r| (r.expires_at, r.created_at));

    let mut remaining_to_consume = used.value().max(0);
    let mut total_remaining = 0i64;
    let mut per_record = Vec::with_capacity(ordered.len());
    for record in ordered {
        let consumed = remaining_to_consume.min(record.amount.value());
        remaining_to_consume -= consumed;
        let remaining = record.amount.value() - consumed;
        total_remaining += remaining;
        per_record.push(QuotaRecordRemainder {
            record_id: record.id,
            amount_remaining: QuotaAmount::new(remaining),
            expires_at: record.expires_at,
        });
    }
    (per_record, QuotaAmount::new(total_remaining))
}

/// Debit a list of exact `(amount, expiry)` items against a user's active
/// records (`spec.md` §4.1, "Transfer out"). Validates that, for every
/// item, the sum of active records whose `expires_at` exactly matches the
/// item's expiry is at least the item's amount before mutating anything.
/// Decrements the matching records' `amount` earliest-created first,
/// returning the records whose `amount` changed so the caller can persist
/// them.
pub fn debit_items(
    user_id: UserId,
    records: &mut [QuotaRecord],
    items: &[(QuotaAmount, DateTime<Utc>)],
) -> QcpResult<Vec<QuotaRecord>> {
    for &(amount, expiry) in items {
        let available: i64 = records.iter().filter(|r| r.expires_at == expiry).map(|r| r.amount.value()).sum();
        if amount.value() > available {
            return Err(QcpError::InsufficientQuota {
                user_id: user_id.to_string(),
                requested: amount.value(),
                available,
            });
        }
    }

    let mut changed_ids = std::collections::HashSet::new();
    for &(amount, expiry) in items {
        let mut remaining = amount.value();
        let mut matching: Vec<&mut QuotaRecord> = records.iter_mut().filter(|r| r.expires_at == expiry).collect();
        matching.sort_by_key(|r| r.created_at);
        for record in matching {
            if remaining <= 0 {
                break;
            }
            let take = remaining.min(record.amount.value());
            record.amount = QuotaAmount::new(record.amount.value() - take);
            remaining -= take;
            changed_ids.insert(record.id);
        }
    }

    Ok(records.iter().filter(|r| changed_ids.contains(&r.id)).cloned().collect())
}
