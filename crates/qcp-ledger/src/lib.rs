//! # qcp-ledger
//!
//! The Quota Ledger (`spec.md` §4.1): per-expiry quota records, expiry
//! sweep reconciliation against the gateway's total/used, voucher-based
//! transfer, and the audit trail behind both.

pub mod ledger;
pub mod period;
pub mod repository;
pub mod service;
pub mod sweep;
pub mod voucher;

pub use ledger::{
    AuditOperation, MonthlyQuotaUsage, QuotaAudit, QuotaRecord, QuotaRecordRemainder, QuotaStatus, QuotaSummary,
};
pub use repository::{LedgerRepository, PgLedgerRepository};
pub use service::QuotaLedgerService;
pub use sweep::{ExpirySweep, SweepReport};
pub use voucher::{Voucher, VoucherItem};
