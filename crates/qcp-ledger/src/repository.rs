//! Persistence for quota records, audit rows, and voucher redemptions.
//!
//! Uses runtime SQL queries (`sqlx::query`, not `query!`) to avoid requiring
//! `DATABASE_URL` at compile time, matching this workspace's existing
//! repository convention.

use chrono::{DateTime, Utc};
use qcp_common::{QcpError, StrategyId, UserId, VoucherNonce};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::ledger::{AuditOperation, MonthlyQuotaUsage, QuotaAudit, QuotaRecord, QuotaStatus};

#[trait_variant::make(LedgerRepository: Send)]
pub trait LocalLedgerRepository {
    /// All active (non-expired-by-status) records for a user, soonest
    /// expiry first.
    async fn list_active_records(&self, user_id: UserId) -> Result<Vec<QuotaRecord>, QcpError>;

    /// Records across every user whose `expires_at` has passed and whose
    /// status is still `Active`, for the expiry sweep. Bounded by `limit`
    /// so a sweep run can page through a large table.
    async fn list_expirable(
        &self,
        as_of: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QuotaRecord>, QcpError>;

    async fn insert_record(&self, record: &QuotaRecord) -> Result<(), QcpError>;

    /// Persist a record's `amount` and `status` after a transfer-out debit
    /// or an expiry transition.
    async fn update_record(&self, record: &QuotaRecord) -> Result<(), QcpError>;

    async fn insert_audit(&self, audit: &QuotaAudit) -> Result<(), QcpError>;

    /// Audit rows for a user within `[start, end)`, newest first
    /// (`spec.md` §1.2 supplemental audit query surface).
    async fn list_audit(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<QuotaAudit>, QcpError>;

    /// Record a voucher nonce as redeemed, inside the caller's transfer-in
    /// transaction. Returns `Ok(false)` (no error) if the nonce was already
    /// present, so the caller can treat transfer-in as idempotent rather
    /// than surfacing a constraint-violation error.
    async fn try_mark_voucher_redeemed(
        &self,
        nonce: VoucherNonce,
        issuing_user_id: UserId,
        redeeming_user_id: UserId,
    ) -> Result<bool, QcpError>;

    /// Insert a `MonthlyQuotaUsage` snapshot if one doesn't already exist
    /// for `(user_id, year_month)`. Returns `true` if inserted, so the
    /// expiry sweep's step 6 stays idempotent across re-runs.
    async fn try_insert_monthly_usage(&self, usage: &MonthlyQuotaUsage) -> Result<bool, QcpError>;
}

/// PostgreSQL implementation over the `quota`, `quota_audit`, and
/// `voucher_redemption` tables.
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<QuotaRecord, QcpError> {
        let status_str: String = row.get("status");
        let status = match status_str.as_str() {
            "active" => QuotaStatus::Active,
            "expired" => QuotaStatus::Expired,
            other => {
                return Err(QcpError::Internal(format!("unknown quota status: {other}")));
            }
        };
        let user_id: Uuid = row.get("user_id");
        let source_strategy_id: Option<Uuid> = row.get("source_strategy_id");
        Ok(QuotaRecord {
            id: row.get("id"),
            user_id: UserId::from_uuid(user_id),
            amount: qcp_common::QuotaAmount::new(row.get("amount")),
            expires_at: row.get("expires_at"),
            status,
            created_at: row.get("created_at"),
            source_strategy_id: source_strategy_id.map(StrategyId::from_uuid),
        })
    }

    fn status_db_str(status: QuotaStatus) -> &'static str {
        match status {
            QuotaStatus::Active => "active",
            QuotaStatus::Expired => "expired",
        }
    }

    fn row_to_audit(row: &sqlx::postgres::PgRow) -> Result<QuotaAudit, QcpError> {
        let op_str: String = row.get("operation");
        let operation = match op_str.as_str() {
            "RECHARGE" => AuditOperation::Recharge,
            "TRANSFER_IN" => AuditOperation::TransferIn,
            "TRANSFER_OUT" => AuditOperation::TransferOut,
            "EXPIRE" => AuditOperation::Expire,
            other => {
                return Err(QcpError::Internal(format!("unknown audit operation: {other}")));
            }
        };
        let user_id: Uuid = row.get("user_id");
        let counterparty: Option<Uuid> = row.get("counterparty_user_id");
        let nonce: Option<Uuid> = row.get("voucher_nonce");
        Ok(QuotaAudit {
            id: row.get("id"),
            user_id: UserId::from_uuid(user_id),
            operation,
            amount: qcp_common::QuotaAmount::new(row.get("amount")),
            record_id: row.get("record_id"),
            counterparty_user_id: counterparty.map(UserId::from_uuid),
            voucher_nonce: nonce.map(qcp_common::VoucherNonce::from_uuid),
            balance_after: qcp_common::QuotaAmount::new(row.get("balance_after")),
            created_at: row.get("created_at"),
        })
    }
}

impl LedgerRepository for PgLedgerRepository {
    async fn list_active_records(&self, user_id: UserId) -> Result<Vec<QuotaRecord>, QcpError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, amount, expires_at, status, created_at, source_strategy_id
            FROM quota
            WHERE user_id = $1 AND status = 'active'
            ORDER BY expires_at ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_expirable(
        &self,
        as_of: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QuotaRecord>, QcpError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, amount, expires_at, status, created_at, source_strategy_id
            FROM quota
            WHERE status = 'active' AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(as_of)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn insert_record(&self, record: &QuotaRecord) -> Result<(), QcpError> {
        sqlx::query(
            r#"
            INSERT INTO quota (id, user_id, amount, expires_at, status, created_at, source_strategy_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id.as_uuid())
        .bind(record.amount.value())
        .bind(record.expires_at)
        .bind(Self::status_db_str(record.status))
        .bind(record.created_at)
        .bind(record.source_strategy_id.map(|s| *s.as_uuid()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a record's `amount` and `status` after a transfer-out debit
    /// or an expiry transition — the only two ways a record changes once
    /// inserted.
    async fn update_record(&self, record: &QuotaRecord) -> Result<(), QcpError> {
        sqlx::query(
            r#"
            UPDATE quota SET amount = $2, status = $3
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.amount.value())
        .bind(Self::status_db_str(record.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_audit(&self, audit: &QuotaAudit) -> Result<(), QcpError> {
        let op_str = match audit.operation {
            AuditOperation::Recharge => "RECHARGE",
            AuditOperation::TransferIn => "TRANSFER_IN",
            AuditOperation::TransferOut => "TRANSFER_OUT",
            AuditOperation::Expire => "EXPIRE",
        };
        sqlx::query(
            r#"
            INSERT INTO quota_audit (
                id, user_id, operation, amount, record_id,
                counterparty_user_id, voucher_nonce, balance_after, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(audit.id)
        .bind(audit.user_id.as_uuid())
        .bind(op_str)
        .bind(audit.amount.value())
        .bind(audit.record_id)
        .bind(audit.counterparty_user_id.map(|u| *u.as_uuid()))
        .bind(audit.voucher_nonce.map(|n| *n.as_uuid()))
        .bind(audit.balance_after.value())
        .bind(audit.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<QuotaAudit>, QcpError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, operation, amount, record_id,
                   counterparty_user_id, voucher_nonce, balance_after, created_at
            FROM quota_audit
            WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_audit).collect()
    }

    async fn try_mark_voucher_redeemed(
        &self,
        nonce: VoucherNonce,
        issuing_user_id: UserId,
        redeeming_user_id: UserId,
    ) -> Result<bool, QcpError> {
        let result = sqlx::query(
            r#"
            INSERT INTO voucher_redemption (nonce, issuing_user_id, redeeming_user_id, redeemed_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (nonce) DO NOTHING
            "#,
        )
        .bind(nonce.as_uuid())
        .bind(issuing_user_id.as_uuid())
        .bind(redeeming_user_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn try_insert_monthly_usage(&self, usage: &MonthlyQuotaUsage) -> Result<bool, QcpError> {
        let result = sqlx::query(
            r#"
            INSERT INTO monthly_quota_usage (user_id, year_month, used_quota, recorded_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, year_month) DO NOTHING
            "#,
        )
        .bind(usage.user_id.as_uuid())
        .bind(&usage.year_month)
        .bind(usage.used_quota)
        .bind(usage.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
