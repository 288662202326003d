//! # qcp-common
//!
//! Shared types and utilities for the AiGateway quota & model-access
//! control plane.
//!
//! This crate provides foundational types used across the other control
//! plane crates:
//! - `qcp-ledger`: quota accounting, expiry, and voucher transfer
//! - `qcp-permissions`: layered permission resolution and gateway notification
//! - `qcp-strategy`: condition DSL and scheduled quota crediting

pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod identity;
pub mod types;

pub use error::{QcpError, QcpResult};
pub use gateway::{GatewayClient, GatewayQuotaSnapshot, HttpGatewayClient, MockGatewayClient};
pub use health::{health_check, HealthResponse};
pub use identity::{DepartmentPath, EmployeeNumber, StrategyId, UserId, VoucherNonce};
pub use types::{QuotaAmount, Timestamp};

pub use config::{
    load_config, load_qcp_config, DatabaseConfig, GatewayConfig, ObservabilityConfig, QcpConfig,
    SchedulerConfig, VoucherConfig,
};
