//! Cron/single-fire scheduling for strategies.
//!
//! Tracks, per strategy, the next instant it is due and whether a given
//! tick has crossed that instant. The actual crediting work lives in
//! [`crate::service::StrategyEngine`]; this module only answers "is it
//! time yet".

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use qcp_common::StrategyId;
use thiserror::Error;

use crate::strategy::StrategySchedule;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid cron expression: {0}")]
    InvalidCronExpression(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Compute the next instant `schedule` fires strictly after `after`.
///
/// A [`StrategySchedule::Single`] fires at most once: once `after` is past
/// its instant, it never becomes due again.
pub fn next_run(schedule: &StrategySchedule, after: DateTime<Utc>) -> SchedulerResult<Option<DateTime<Utc>>> {
    match schedule {
        StrategySchedule::Cron(expr) => {
            let parsed = CronSchedule::from_str(expr)
                .map_err(|e| SchedulerError::InvalidCronExpression(e.to_string()))?;
            Ok(parsed.after(&after).next())
        }
        StrategySchedule::Single(at) => Ok(if *at > after { Some(*at) } else { None }),
    }
}

/// Tracks the next-due instant for every strategy the engine knows about,
/// so repeated ticks don't re-derive a cron expression's next fire time
/// from scratch every call.
#[derive(Default)]
pub struct StrategyScheduler {
    next_runs: RwLock<HashMap<StrategyId, Option<DateTime<Utc>>>>,
}

impl StrategyScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy's schedule if not already tracked, seeding its
    /// next-due instant relative to `now`.
    pub fn track(&self, strategy_id: StrategyId, schedule: &StrategySchedule, now: DateTime<Utc>) -> SchedulerResult<()> {
        let mut next_runs = self.next_runs.write().unwrap();
        if !next_runs.contains_key(&strategy_id) {
            next_runs.insert(strategy_id, next_run(schedule, now)?);
        }
        Ok(())
    }

    /// Returns `true` exactly once per due instant: the first poll after
    /// the tracked next-run instant has passed, advancing the tracked
    /// instant to the following fire time.
    pub fn poll_due(&self, strategy_id: StrategyId, schedule: &StrategySchedule, now: DateTime<Utc>) -> SchedulerResult<bool> {
        self.track(strategy_id, schedule, now)?;

        let due = {
            let next_runs = self.next_runs.read().unwrap();
            matches!(next_runs.get(&strategy_id), Some(Some(at)) if *at <= now)
        };

        if due {
            let mut next_runs = self.next_runs.write().unwrap();
            next_runs.insert(strategy_id, next_run(schedule, now)?);
        }

        Ok(due)
    }

    /// Drop tracking state for a strategy, e.g. after it is disabled or
    /// deleted.
    pub fn forget(&self, strategy_id: StrategyId) {
        self.next_runs.write().unwrap().remove(&strategy_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn single_schedule_fires_once() {
        let fire_at = at("2026-06-01T00:00:00Z");
        let schedule = StrategySchedule::Single(fire_at);

        assert_eq!(next_run(&schedule, at("2026-05-01T00:00:00Z")).unwrap(), Some(fire_at));
        assert_eq!(next_run(&schedule, at("2026-06-01T00:00:01Z")).unwrap(), None);
    }

    #[test]
    fn cron_schedule_advances() {
        let schedule = StrategySchedule::Cron("0 0 0 1 * * *".to_string());
        let first = next_run(&schedule, at("2026-01-15T00:00:00Z")).unwrap().unwrap();
        assert_eq!(first, at("2026-02-01T00:00:00Z"));
    }

    #[test]
    fn poll_due_fires_once_per_instant_then_advances() {
        let scheduler = StrategyScheduler::new();
        let strategy_id = StrategyId::new();
        let schedule = StrategySchedule::Single(at("2026-06-01T00:00:00Z"));

        assert!(!scheduler.poll_due(strategy_id, &schedule, at("2026-05-01T00:00:00Z")).unwrap());
        assert!(scheduler.poll_due(strategy_id, &schedule, at("2026-06-01T00:00:00Z")).unwrap());
        assert!(!scheduler.poll_due(strategy_id, &schedule, at("2026-06-02T00:00:00Z")).unwrap());
    }

    #[test]
    fn invalid_cron_expression_errors() {
        let schedule = StrategySchedule::Cron("not a cron".to_string());
        assert!(next_run(&schedule, Utc::now()).is_err());
    }
}
