//! # qcp-strategy
//!
//! Condition DSL, schedule tracking, and the idempotent strategy engine
//! (`spec.md` §4.3): scheduled quota crediting keyed by
//! `(strategy, user, period_key)`.

pub mod dsl;
pub mod execute;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod strategy;

pub use dsl::ast::Condition;
pub use dsl::eval::EvalContext;
pub use execute::{ExecuteRepository, ExecuteStatus, PgExecuteRepository, QuotaExecute};
pub use repository::{PgStrategyRepository, StrategyRepository};
pub use scheduler::{SchedulerError, StrategyScheduler};
pub use service::{FireOutcome, StrategyEngine};
pub use strategy::{QuotaStrategy, StrategySchedule, StrategyState};
