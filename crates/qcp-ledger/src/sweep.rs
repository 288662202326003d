//! Daily expiry sweep (`spec.md` §4.1, "Expiry sweep").
//!
//! For each user with at least one record past its expiry: read the
//! gateway's reported `total`/`used`, compute what the user's headroom and
//! consumption should be once the expiring amount is removed, push both
//! deltas to the gateway, then mark the records `Expired` and write one
//! `EXPIRE` audit row per record. Expiring quota first cancels
//! already-consumed usage; any remainder reduces headroom. Both gateway
//! calls must succeed for a user's records to be marked expired — a
//! partial failure leaves that user's records untouched for the next pass
//! (`spec.md` §4.1, "Failure semantics").

use chrono::{DateTime, Utc};
use qcp_common::{GatewayClient, QcpResult, QuotaAmount, UserId};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::ledger::{AuditOperation, MonthlyQuotaUsage, QuotaAudit, QuotaRecord, QuotaStatus};
use crate::period::previous_month_key;
use crate::repository::LedgerRepository;

/// Outcome of a single sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub records_expired: usize,
    pub users_reconciled: usize,
    pub total_reclaimed: i64,
}

/// Runs the expiry sweep against a repository and reconciles the gateway's
/// `total`/`used` per affected user.
pub struct ExpirySweep<R: LedgerRepository, G: GatewayClient> {
    repository: R,
    gateway: G,
}

impl<R: LedgerRepository, G: GatewayClient> ExpirySweep<R, G> {
    pub fn new(repository: R, gateway: G) -> Self {
        Self { repository, gateway }
    }

    /// Run one sweep pass over up to `batch_size` expirable records as of
    /// `as_of`. Call repeatedly (e.g. from the scheduler, `spec.md` §4.3)
    /// until `records_expired < batch_size` to drain a large backlog.
    /// Re-running the sweep over already-expired records is a no-op: only
    /// `Active` records are ever selected, so the gateway deltas are zero
    /// on a second pass.
    pub async fn run(&self, as_of: DateTime<Utc>, batch_size: i64) -> QcpResult<SweepReport> {
        let expirable = self.repository.list_expirable(as_of, batch_size).await?;
        let mut report = SweepReport::default();
        if expirable.is_empty() {
            return Ok(report);
        }

        let mut by_user: HashMap<UserId, Vec<QuotaRecord>> = HashMap::new();
        for record in expirable {
            by_user.entry(record.user_id).or_default().push(record);
        }

        for (user_id, mut records) in by_user {
            let expiring_sum: i64 = records.iter().map(|r| r.amount.value()).sum();

            let total = match self.gateway.get_quota(&user_id.to_string()).await {
                Ok(t) => t,
                Err(err) => {
                    warn!(%user_id, %err, "expiry sweep failed to read gateway total, skipping user");
                    continue;
                }
            };
            let used = match self.gateway.get_used(&user_id.to_string()).await {
                Ok(u) => u,
                Err(err) => {
                    warn!(%user_id, %err, "expiry sweep failed to read gateway used, skipping user");
                    continue;
                }
            };

            let new_total = (total - expiring_sum).max(0);
            let new_used = (used - expiring_sum).max(0);

            if let Err(err) = self.gateway.delta_quota(&user_id.to_string(), new_total - total).await {
                warn!(%user_id, %err, "expiry sweep failed to reconcile gateway total, skipping user");
                continue;
            }
            if let Err(err) = self.gateway.delta_used(&user_id.to_string(), new_used - used).await {
                warn!(%user_id, %err, "expiry sweep failed to reconcile gateway used, skipping user");
                continue;
            }

            let balance_after = QuotaAmount::new(new_total - new_used);
            for record in &mut records {
                record.status = QuotaStatus::Expired;
                self.repository.update_record(record).await?;

                let audit = QuotaAudit::new(
                    user_id,
                    AuditOperation::Expire,
                    QuotaAmount::new(-record.amount.value()),
                    Some(record.id),
                    None,
                    None,
                    balance_after,
                );
                self.repository.insert_audit(&audit).await?;
                report.records_expired += 1;
            }

            if used > 0 {
                let snapshot = MonthlyQuotaUsage::new(user_id, previous_month_key(as_of), used);
                self.repository.try_insert_monthly_usage(&snapshot).await?;
            }

            report.users_reconciled += 1;
            report.total_reclaimed += expiring_sum;
            info!(%user_id, expiring_sum, new_total, new_used, "expiry sweep reconciled gateway quota");
        }

        Ok(report)
    }
}
