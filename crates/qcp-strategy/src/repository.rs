//! Persistence for strategies.

use qcp_common::{QcpError, QcpResult, QuotaAmount, StrategyId};
use sqlx::PgPool;

use crate::strategy::{QuotaStrategy, StrategySchedule, StrategyState};

#[trait_variant::make(StrategyRepository: Send)]
pub trait LocalStrategyRepository {
    async fn insert(&self, strategy: &QuotaStrategy) -> QcpResult<()>;
    async fn update(&self, strategy: &QuotaStrategy) -> QcpResult<()>;
    async fn find(&self, id: StrategyId) -> QcpResult<Option<QuotaStrategy>>;
    async fn list_enabled(&self) -> QcpResult<Vec<QuotaStrategy>>;
}

pub struct PgStrategyRepository {
    pool: PgPool,
}

impl PgStrategyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn schedule_to_db(schedule: &StrategySchedule) -> (&'static str, Option<String>, Option<chrono::DateTime<chrono::Utc>>) {
    match schedule {
        StrategySchedule::Cron(expr) => ("CRON", Some(expr.clone()), None),
        StrategySchedule::Single(at) => ("SINGLE", None, Some(*at)),
    }
}

fn schedule_from_db(
    kind: &str,
    cron_expr: Option<String>,
    single_at: Option<chrono::DateTime<chrono::Utc>>,
) -> QcpResult<StrategySchedule> {
    match kind {
        "CRON" => cron_expr
            .map(StrategySchedule::Cron)
            .ok_or_else(|| QcpError::Internal("strategy row missing cron_expr for CRON schedule".to_string())),
        "SINGLE" => single_at
            .map(StrategySchedule::Single)
            .ok_or_else(|| QcpError::Internal("strategy row missing single_at for SINGLE schedule".to_string())),
        other => Err(QcpError::Internal(format!("unknown schedule kind '{other}' in strategy row"))),
    }
}

fn row_to_strategy(
    id: uuid::Uuid,
    name: String,
    condition_source: String,
    schedule_kind: String,
    cron_expr: Option<String>,
    single_at: Option<chrono::DateTime<chrono::Utc>>,
    amount: i64,
    expires_in_seconds: i64,
    state: String,
    created_at: chrono::DateTime<chrono::Utc>,
) -> QcpResult<QuotaStrategy> {
    Ok(QuotaStrategy {
        id: StrategyId::from_uuid(id),
        name,
        condition_source,
        schedule: schedule_from_db(&schedule_kind, cron_expr, single_at)?,
        amount: QuotaAmount::new(amount),
        expires_in: chrono::Duration::seconds(expires_in_seconds),
        state: if state == "ENABLED" { StrategyState::Enabled } else { StrategyState::Disabled },
        created_at,
    })
}

impl LocalStrategyRepository for PgStrategyRepository {
    async fn insert(&self, strategy: &QuotaStrategy) -> QcpResult<()> {
        let (kind, cron_expr, single_at) = schedule_to_db(&strategy.schedule);
        let state = match strategy.state {
            StrategyState::Enabled => "ENABLED",
            StrategyState::Disabled => "DISABLED",
        };
        sqlx::query(
            "INSERT INTO quota_strategy \
             (id, name, condition_source, schedule_kind, cron_expr, single_at, amount, expires_in_seconds, state, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(strategy.id.as_uuid())
        .bind(&strategy.name)
        .bind(&strategy.condition_source)
        .bind(kind)
        .bind(cron_expr)
        .bind(single_at)
        .bind(strategy.amount.value())
        .bind(strategy.expires_in.num_seconds())
        .bind(state)
        .bind(strategy.created_at)
        .execute(&self.pool)
        .await
        .map_err(QcpError::Database)?;
        Ok(())
    }

    async fn update(&self, strategy: &QuotaStrategy) -> QcpResult<()> {
        let (kind, cron_expr, single_at) = schedule_to_db(&strategy.schedule);
        let state = match strategy.state {
            StrategyState::Enabled => "ENABLED",
            StrategyState::Disabled => "DISABLED",
        };
        sqlx::query(
            "UPDATE quota_strategy SET name = $2, condition_source = $3, schedule_kind = $4, \
             cron_expr = $5, single_at = $6, amount = $7, expires_in_seconds = $8, state = $9 \
             WHERE id = $1",
        )
        .bind(strategy.id.as_uuid())
        .bind(&strategy.name)
        .bind(&strategy.condition_source)
        .bind(kind)
        .bind(cron_expr)
        .bind(single_at)
        .bind(strategy.amount.value())
        .bind(strategy.expires_in.num_seconds())
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(QcpError::Database)?;
        Ok(())
    }

    async fn find(&self, id: StrategyId) -> QcpResult<Option<QuotaStrategy>> {
        let row = sqlx::query_as::<_, (
            uuid::Uuid, String, String, String, Option<String>, Option<chrono::DateTime<chrono::Utc>>,
            i64, i64, String, chrono::DateTime<chrono::Utc>,
        )>(
            "SELECT id, name, condition_source, schedule_kind, cron_expr, single_at, \
             amount, expires_in_seconds, state, created_at FROM quota_strategy WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(QcpError::Database)?;

        row.map(|(id, name, cs, kind, cron_expr, single_at, amount, expires_in, state, created_at)| {
            row_to_strategy(id, name, cs, kind, cron_expr, single_at, amount, expires_in, state, created_at)
        })
        .transpose()
    }

    async fn list_enabled(&self) -> QcpResult<Vec<QuotaStrategy>> {
        let rows = sqlx::query_as::<_, (
            uuid::Uuid, String, String, String, Option<String>, Option<chrono::DateTime<chrono::Utc>>,
            i64, i64, String, chrono::DateTime<chrono::Utc>,
        )>(
            "SELECT id, name, condition_source, schedule_kind, cron_expr, single_at, \
             amount, expires_in_seconds, state, created_at FROM quota_strategy WHERE state = 'ENABLED'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(QcpError::Database)?;

        rows.into_iter()
            .map(|(id, name, cs, kind, cron_expr, single_at, amount, expires_in, state, created_at)| {
                row_to_strategy(id, name, cs, kind, cron_expr, single_at, amount, expires_in, state, created_at)
            })
            .collect()
    }
}
