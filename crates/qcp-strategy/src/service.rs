//! `StrategyEngine`: ties the condition DSL, the scheduler, the
//! idempotency ledger, and `qcp-ledger`'s quota service together.

use chrono::Utc;
use qcp_common::{GatewayClient, QcpResult, QuotaAmount, StrategyId, UserId};
use qcp_ledger::{LedgerRepository, QuotaLedgerService};

use crate::dsl::eval::{evaluate, EvalContext};
use crate::execute::{ExecuteRepository, ExecuteStatus, QuotaExecute};
use crate::repository::StrategyRepository;
use crate::scheduler::StrategyScheduler;
use crate::strategy::{period_key, QuotaStrategy, StrategySchedule, StrategyState};

/// Outcome of evaluating one strategy against one candidate user on one
/// tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Credited,
    ConditionNotMet,
    AlreadyFired,
    AmountNotPositive,
}

pub struct StrategyEngine<SR, ER, LR, G>
where
    SR: StrategyRepository,
    ER: ExecuteRepository,
    LR: LedgerRepository,
    G: GatewayClient,
{
    strategies: SR,
    executions: ER,
    ledger: QuotaLedgerService<LR, G>,
    scheduler: StrategyScheduler,
}

impl<SR, ER, LR, G> StrategyEngine<SR, ER, LR, G>
where
    SR: StrategyRepository,
    ER: ExecuteRepository,
    LR: LedgerRepository,
    G: GatewayClient,
{
    pub fn new(strategies: SR, executions: ER, ledger: QuotaLedgerService<LR, G>) -> Self {
        Self { strategies, executions, ledger, scheduler: StrategyScheduler::new() }
    }

    pub async fn create(&self, strategy: QuotaStrategy) -> QcpResult<()> {
        self.strategies.insert(&strategy).await
    }

    pub async fn set_enabled(&self, id: StrategyId, enabled: bool) -> QcpResult<()> {
        if let Some(mut strategy) = self.strategies.find(id).await? {
            strategy.state = if enabled { StrategyState::Enabled } else { StrategyState::Disabled };
            self.strategies.update(&strategy).await?;
            if !enabled {
                self.scheduler.forget(id);
            }
        }
        Ok(())
    }

    /// Attempt to fire `strategy` for `user_id`, if due and the condition
    /// holds. Idempotent: calling this twice for the same
    /// `(strategy, user, period_key)` only credits once.
    pub async fn fire(
        &self,
        strategy: &QuotaStrategy,
        user_id: UserId,
        ctx: &EvalContext,
    ) -> QcpResult<FireOutcome> {
        let condition = strategy.condition()?;
        if !evaluate(&condition, ctx) {
            return Ok(FireOutcome::ConditionNotMet);
        }

        let now = Utc::now();
        let key = period_key(&strategy.schedule, now);

        let claimed = self.executions.try_claim(strategy.id, user_id, &key).await?;
        if !claimed {
            return Ok(FireOutcome::AlreadyFired);
        }

        if strategy.amount.value() <= 0 {
            let record = QuotaExecute::skipped(strategy.id, user_id, key);
            self.executions.record(&record).await?;
            return Ok(FireOutcome::AmountNotPositive);
        }

        let expires_at = now + strategy.expires_in;
        self.ledger.add_quota(user_id, strategy.amount, Some(expires_at)).await?;

        let record = QuotaExecute::credited(strategy.id, user_id, key, strategy.amount);
        self.executions.record(&record).await?;

        Ok(FireOutcome::Credited)
    }

    /// Run one scheduler tick: for every enabled strategy whose schedule is
    /// due, fire it against every candidate. Candidates are supplied by
    /// the caller (typically every known user, or a narrower population
    /// specific to the strategy's condition) because this crate has no
    /// user directory of its own.
    pub async fn tick(
        &self,
        candidates: &[(UserId, EvalContext)],
    ) -> QcpResult<Vec<(StrategyId, UserId, FireOutcome)>> {
        let now = Utc::now();
        let mut outcomes = Vec::new();

        for strategy in self.strategies.list_enabled().await? {
            if !self.scheduler.poll_due(strategy.id, &strategy.schedule, now)? {
                continue;
            }
            for (user_id, ctx) in candidates {
                let outcome = self.fire(&strategy, *user_id, ctx).await?;
                outcomes.push((strategy.id, *user_id, outcome));
            }
        }

        Ok(outcomes)
    }
}
