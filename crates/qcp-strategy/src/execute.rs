//! Idempotent record of a strategy firing for a single user on a single
//! period, keyed by `(strategy_id, user_id, period_key)`.
//!
//! A scheduler tick can be delivered more than once (process restart
//! mid-sweep, overlapping runs); the unique key lets
//! [`crate::service::StrategyEngine`] attempt to record every firing and
//! treat "already recorded" as success rather than as a conflict to
//! retry around, the same posture `qcp-ledger`'s voucher redemption table
//! takes toward replay.

use chrono::{DateTime, Utc};
use qcp_common::{QcpError, QcpResult, QuotaAmount, StrategyId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecuteStatus {
    Credited,
    Skipped,
}

impl ExecuteStatus {
    pub fn is_terminal(&self) -> bool {
        true
    }
}

/// One row of the idempotency ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaExecute {
    pub strategy_id: StrategyId,
    pub user_id: UserId,
    pub period_key: String,
    pub amount: QuotaAmount,
    pub status: ExecuteStatus,
    pub fired_at: DateTime<Utc>,
}

impl QuotaExecute {
    pub fn credited(
        strategy_id: StrategyId,
        user_id: UserId,
        period_key: String,
        amount: QuotaAmount,
    ) -> Self {
        Self {
            strategy_id,
            user_id,
            period_key,
            amount,
            status: ExecuteStatus::Credited,
            fired_at: Utc::now(),
        }
    }

    pub fn skipped(strategy_id: StrategyId, user_id: UserId, period_key: String) -> Self {
        Self {
            strategy_id,
            user_id,
            period_key,
            amount: QuotaAmount::new(0),
            status: ExecuteStatus::Skipped,
            fired_at: Utc::now(),
        }
    }
}

/// Repository for the idempotency ledger.
///
/// `try_claim` is the load-bearing call: it must atomically insert the
/// `(strategy_id, user_id, period_key)` key and report whether this call
/// was the one that inserted it, the same `INSERT ... ON CONFLICT DO
/// NOTHING` shape `qcp-ledger::repository::try_mark_voucher_redeemed`
/// uses for the same problem.
#[trait_variant::make(ExecuteRepository: Send)]
pub trait LocalExecuteRepository {
    async fn try_claim(
        &self,
        strategy_id: StrategyId,
        user_id: UserId,
        period_key: &str,
    ) -> QcpResult<bool>;

    async fn record(&self, execute: &QuotaExecute) -> QcpResult<()>;

    async fn find(
        &self,
        strategy_id: StrategyId,
        user_id: UserId,
        period_key: &str,
    ) -> QcpResult<Option<QuotaExecute>>;
}

pub struct PgExecuteRepository {
    pool: sqlx::PgPool,
}

impl PgExecuteRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

impl LocalExecuteRepository for PgExecuteRepository {
    async fn try_claim(
        &self,
        strategy_id: StrategyId,
        user_id: UserId,
        period_key: &str,
    ) -> QcpResult<bool> {
        let result = sqlx::query(
            "INSERT INTO quota_execute_claim (strategy_id, user_id, period_key, claimed_at) \
             VALUES ($1, $2, $3, now()) ON CONFLICT (strategy_id, user_id, period_key) DO NOTHING",
        )
        .bind(strategy_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(period_key)
        .execute(&self.pool)
        .await
        .map_err(QcpError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record(&self, execute: &QuotaExecute) -> QcpResult<()> {
        let status = match execute.status {
            ExecuteStatus::Credited => "CREDITED",
            ExecuteStatus::Skipped => "SKIPPED",
        };
        sqlx::query(
            "INSERT INTO quota_execute (strategy_id, user_id, period_key, amount, status, fired_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (strategy_id, user_id, period_key) DO UPDATE SET \
             amount = EXCLUDED.amount, status = EXCLUDED.status, fired_at = EXCLUDED.fired_at",
        )
        .bind(execute.strategy_id.as_uuid())
        .bind(execute.user_id.as_uuid())
        .bind(&execute.period_key)
        .bind(execute.amount.value())
        .bind(status)
        .bind(execute.fired_at)
        .execute(&self.pool)
        .await
        .map_err(QcpError::Database)?;
        Ok(())
    }

    async fn find(
        &self,
        strategy_id: StrategyId,
        user_id: UserId,
        period_key: &str,
    ) -> QcpResult<Option<QuotaExecute>> {
        let row = sqlx::query_as::<_, (String, i64, DateTime<Utc>)>(
            "SELECT status, amount, fired_at FROM quota_execute \
             WHERE strategy_id = $1 AND user_id = $2 AND period_key = $3",
        )
        .bind(strategy_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(period_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(QcpError::Database)?;

        Ok(row.map(|(status, amount, fired_at)| QuotaExecute {
            strategy_id,
            user_id,
            period_key: period_key.to_string(),
            amount: QuotaAmount::new(amount),
            status: if status == "CREDITED" { ExecuteStatus::Credited } else { ExecuteStatus::Skipped },
            fired_at,
        }))
    }
}
