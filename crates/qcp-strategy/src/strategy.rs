//! Quota strategies: a condition, a schedule, and an amount to credit
//! each time the schedule fires and the condition holds for a user.

use chrono::{DateTime, Utc};
use qcp_common::{QcpError, QcpResult, QuotaAmount, StrategyId, UserId};
use serde::{Deserialize, Serialize};

use crate::dsl::ast::Condition;
use crate::dsl::parser;

/// When a strategy is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategySchedule {
    /// Standard 5-field cron expression, evaluated in UTC.
    Cron(String),
    /// Fires exactly once, at the given instant.
    Single(DateTime<Utc>),
}

impl StrategySchedule {
    fn validate(&self) -> QcpResult<()> {
        match self {
            StrategySchedule::Cron(expr) => {
                expr.parse::<cron::Schedule>()
                    .map_err(|e| QcpError::Validation(format!("invalid cron expression: {e}")))?;
                Ok(())
            }
            StrategySchedule::Single(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyState {
    Enabled,
    Disabled,
}

/// A scheduled quota-crediting rule.
///
/// `amount` is not constrained to be positive: a strategy can also claw
/// back quota on a schedule (`DESIGN.md`, Open Question 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStrategy {
    pub id: StrategyId,
    pub name: String,
    pub condition_source: String,
    pub schedule: StrategySchedule,
    pub amount: QuotaAmount,
    pub expires_in: chrono::Duration,
    pub state: StrategyState,
    pub created_at: DateTime<Utc>,
}

impl QuotaStrategy {
    /// Build and validate a new strategy: the condition source must parse
    /// and the schedule must be well-formed before it is ever persisted.
    pub fn new(
        name: impl Into<String>,
        condition_source: impl Into<String>,
        schedule: StrategySchedule,
        amount: QuotaAmount,
        expires_in: chrono::Duration,
    ) -> QcpResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(QcpError::Validation("strategy name must not be empty".to_string()));
        }
        let condition_source = condition_source.into();
        parser::parse(&condition_source)?;
        schedule.validate()?;
        if expires_in <= chrono::Duration::zero() {
            return Err(QcpError::Validation(
                "strategy expires_in must be positive".to_string(),
            ));
        }

        Ok(Self {
            id: StrategyId::new(),
            name,
            condition_source,
            schedule,
            amount,
            expires_in,
            state: StrategyState::Enabled,
            created_at: Utc::now(),
        })
    }

    /// Parse the stored condition source. Re-parses on every call rather
    /// than caching the AST, since strategies are evaluated at most once
    /// per schedule tick per user.
    pub fn condition(&self) -> QcpResult<Condition> {
        parser::parse(&self.condition_source)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, StrategyState::Enabled)
    }
}

/// The period key a single scheduler firing is stamped with, used by
/// [`crate::execute::QuotaExecute`] to enforce idempotent crediting.
///
/// For a [`StrategySchedule::Cron`] strategy this is the fire instant
/// truncated to the minute; for [`StrategySchedule::Single`] it is a
/// constant, since the schedule can only ever fire once.
pub fn period_key(schedule: &StrategySchedule, fired_at: DateTime<Utc>) -> String {
    match schedule {
        StrategySchedule::Cron(_) => fired_at.format("%Y-%m-%dT%H:%M").to_string(),
        StrategySchedule::Single(_) => "single".to_string(),
    }
}

/// A user the strategy engine is considering crediting on this tick.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub user_id: UserId,
}
