//! `QuotaLedgerService`: the façade the rest of the control plane calls
//! into for quota mutation (`spec.md` §4.1).
//!
//! Every mutating method here is meant to run inside a single database
//! transaction that also issues the matching gateway call, per `spec.md`
//! §5 ("transactional mutation across local DB + remote gateway"). This
//! crate does not own transaction demarcation itself — the repository
//! trait's methods are expected to be called against a transaction-bound
//! connection by a caller that also commits/rolls back the gateway call's
//! outcome. See Open Question 1 in `DESIGN.md` for the race this leaves
//! unresolved.

use chrono::Utc;
use qcp_common::{GatewayClient, QcpError, QcpResult, QuotaAmount, UserId, VoucherConfig};

use crate::ledger::{apply_consumption_order, debit_items, AuditOperation, QuotaAudit, QuotaRecord, QuotaSummary};
use crate::period::end_of_month;
use crate::repository::LedgerRepository;
use crate::voucher::{self, Voucher, VoucherItem};

pub struct QuotaLedgerService<R: LedgerRepository, G: GatewayClient> {
    repository: R,
    gateway: G,
    voucher_config: VoucherConfig,
}

impl<R: LedgerRepository, G: GatewayClient> QuotaLedgerService<R, G> {
    pub fn new(repository: R, gateway: G, voucher_config: VoucherConfig) -> Self {
        Self { repository, gateway, voucher_config }
    }

    /// Recharge: create a new quota record and push the delta to the
    /// gateway, in that order, writing a `RECHARGE` audit row.
    pub async fn add_quota(
        &self,
        user_id: UserId,
        amount: QuotaAmount,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> QcpResult<QuotaRecord> {
        if amount.value() <= 0 {
            return Err(QcpError::Validation("recharge amount must be positive".to_string()));
        }
        let expires_at = expires_at.unwrap_or_else(|| end_of_month(Utc::now()));
        let record = QuotaRecord::new(user_id, amount, expires_at, None);

        self.repository.insert_record(&record).await?;
        self.gateway.delta_quota(&user_id.to_string(), amount.value()).await?;

        let summary = self.get_user_quota(user_id).await?;
        let audit = QuotaAudit::new(
            user_id,
            AuditOperation::Recharge,
            amount,
            Some(record.id),
            None,
            None,
            summary.total_remaining,
        );
        self.repository.insert_audit(&audit).await?;

        Ok(record)
    }

    /// Reads local records for per-record remainders and the gateway for
    /// `used`, applying consumption soonest-expiry-first (`spec.md` §4.1,
    /// "Consumption order"). Used quota is owned by the gateway; the
    /// ledger only reflects it here, it never tracks it itself.
    pub async fn get_user_quota(&self, user_id: UserId) -> QcpResult<QuotaSummary> {
        let records = self.repository.list_active_records(user_id).await?;
        let used = self.gateway.get_used(&user_id.to_string()).await?;
        let (per_record, total_remaining) = apply_consumption_order(&records, QuotaAmount::new(used));
        Ok(QuotaSummary { total_remaining, total_used: QuotaAmount::new(used), per_record })
    }

    /// Transfer quota out to `receiver_id`: for each `(amount, expiry)`
    /// item, debit the issuer's records whose expiry exactly matches,
    /// issue a signed voucher naming the receiver, notify the gateway, and
    /// write a `TRANSFER_OUT` audit row (`spec.md` §4.1).
    pub async fn transfer_out(
        &self,
        issuer_user_id: UserId,
        receiver_id: UserId,
        items: Vec<(QuotaAmount, chrono::DateTime<Utc>)>,
    ) -> QcpResult<Voucher> {
        if items.is_empty() || items.iter().any(|(amount, _)| amount.value() <= 0) {
            return Err(QcpError::Validation("transfer items must be non-empty with positive amounts".to_string()));
        }

        let mut records = self.repository.list_active_records(issuer_user_id).await?;
        let changed = debit_items(issuer_user_id, &mut records, &items)?;
        for record in &changed {
            self.repository.update_record(record).await?;
        }

        let total: i64 = items.iter().map(|(amount, _)| amount.value()).sum();
        self.gateway.delta_quota(&issuer_user_id.to_string(), -total).await?;

        let voucher_items =
            items.iter().map(|&(amount, expires_at)| VoucherItem { amount, expires_at }).collect();
        let voucher = voucher::issue(
            &self.voucher_config.hmac_secret,
            issuer_user_id,
            receiver_id,
            voucher_items,
            chrono::Duration::seconds(self.voucher_config.ttl_seconds as i64),
        );

        let summary = self.get_user_quota(issuer_user_id).await?;
        let audit = QuotaAudit::new(
            issuer_user_id,
            AuditOperation::TransferOut,
            QuotaAmount::new(total),
            None,
            Some(receiver_id),
            Some(voucher.nonce),
            summary.total_remaining,
        );
        self.repository.insert_audit(&audit).await?;

        Ok(voucher)
    }

    /// Redeem a voucher: verify its signature, deadline, and that
    /// `redeeming_user_id` is the named receiver; atomically mark its
    /// nonce redeemed (at-most-once, `spec.md` §4.1); and create a new
    /// record per item, preserving each item's original expiry so a
    /// transfer that straddles a month boundary does not silently gain or
    /// lose its remaining lifetime (`spec.md` §4.1, universal property 5).
    pub async fn transfer_in(&self, redeeming_user_id: UserId, voucher: &Voucher) -> QcpResult<Vec<QuotaRecord>> {
        voucher::verify(&self.voucher_config.hmac_secret, voucher, redeeming_user_id)?;

        let first_redemption = self
            .repository
            .try_mark_voucher_redeemed(voucher.nonce, voucher.issuer_user_id, redeeming_user_id)
            .await?;
        if !first_redemption {
            return Err(QcpError::Conflict(format!("voucher {} already redeemed", voucher.nonce)));
        }

        let mut records = Vec::with_capacity(voucher.items.len());
        for item in &voucher.items {
            let record = QuotaRecord::new(redeeming_user_id, item.amount, item.expires_at, None);
            self.repository.insert_record(&record).await?;
            records.push(record);
        }

        let total = voucher.total_amount();
        self.gateway.delta_quota(&redeeming_user_id.to_string(), total.value()).await?;

        let summary = self.get_user_quota(redeeming_user_id).await?;
        let audit = QuotaAudit::new(
            redeeming_user_id,
            AuditOperation::TransferIn,
            total,
            None,
            Some(voucher.issuer_user_id),
            Some(voucher.nonce),
            summary.total_remaining,
        );
        self.repository.insert_audit(&audit).await?;

        Ok(records)
    }

    /// Audit rows for a user within `[start, end)` (`spec.md` §1.2
    /// supplemental audit query surface).
    pub async fn list_audit(
        &self,
        user_id: UserId,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) -> QcpResult<Vec<QuotaAudit>> {
        self.repository.list_audit(user_id, start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MonthlyQuotaUsage, QuotaStatus};
    use qcp_common::{GatewayQuotaSnapshot, MockGatewayClient};
    use std::sync::Mutex;

    struct InMemoryRepo {
        records: Mutex<Vec<QuotaRecord>>,
        audits: Mutex<Vec<QuotaAudit>>,
        redeemed: Mutex<std::collections::HashSet<uuid::Uuid>>,
        monthly_usage: Mutex<Vec<MonthlyQuotaUsage>>,
    }

    impl InMemoryRepo {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                audits: Mutex::new(Vec::new()),
                redeemed: Mutex::new(std::collections::HashSet::new()),
                monthly_usage: Mutex::new(Vec::new()),
            }
        }
    }

    impl LedgerRepository for InMemoryRepo {
        async fn list_active_records(&self, user_id: UserId) -> Result<Vec<QuotaRecord>, QcpError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id && r.status == QuotaStatus::Active)
                .cloned()
                .collect())
        }

        async fn list_expirable(
            &self,
            _as_of: chrono::DateTime<Utc>,
            _limit: i64,
        ) -> Result<Vec<QuotaRecord>, QcpError> {
            Ok(Vec::new())
        }

        async fn insert_record(&self, record: &QuotaRecord) -> Result<(), QcpError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn update_record(&self, record: &QuotaRecord) -> Result<(), QcpError> {
            let mut records = self.records.lock().unwrap();
            if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
                *existing = record.clone();
            }
            Ok(())
        }

        async fn insert_audit(&self, audit: &QuotaAudit) -> Result<(), QcpError> {
            self.audits.lock().unwrap().push(audit.clone());
            Ok(())
        }

        async fn list_audit(
            &self,
            _user_id: UserId,
            _start: chrono::DateTime<Utc>,
            _end: chrono::DateTime<Utc>,
        ) -> Result<Vec<QuotaAudit>, QcpError> {
            Ok(self.audits.lock().unwrap().clone())
        }

        async fn try_mark_voucher_redeemed(
            &self,
            nonce: qcp_common::VoucherNonce,
            _issuing_user_id: UserId,
            _redeeming_user_id: UserId,
        ) -> Result<bool, QcpError> {
            Ok(self.redeemed.lock().unwrap().insert(*nonce.as_uuid()))
        }

        async fn try_insert_monthly_usage(&self, usage: &MonthlyQuotaUsage) -> Result<bool, QcpError> {
            let mut rows = self.monthly_usage.lock().unwrap();
            if rows.iter().any(|r| r.user_id == usage.user_id && r.year_month == usage.year_month) {
                return Ok(false);
            }
            rows.push(usage.clone());
            Ok(true)
        }
    }

    fn service() -> QuotaLedgerService<InMemoryRepo, MockGatewayClient> {
        QuotaLedgerService::new(InMemoryRepo::new(), MockGatewayClient::new(), VoucherConfig {
            hmac_secret: secrecy::SecretString::from("test-secret".to_string()),
            ttl_seconds: 3600,
        })
    }

    #[tokio::test]
    async fn recharge_then_query_reflects_balance() {
        let svc = service();
        let user = UserId::new();
        svc.add_quota(user, QuotaAmount::new(1000), None).await.unwrap();
        let summary = svc.get_user_quota(user).await.unwrap();
        assert_eq!(summary.total_remaining.value(), 1000);
        assert_eq!(summary.total_used.value(), 0);
    }

    #[tokio::test]
    async fn get_user_quota_reflects_gateway_used_not_local_state() {
        let svc = service();
        let user = UserId::new();
        svc.add_quota(user, QuotaAmount::new(1000), None).await.unwrap();
        svc.gateway.seed(&user.to_string(), GatewayQuotaSnapshot { total: 1000, used: 400 });

        let summary = svc.get_user_quota(user).await.unwrap();
        assert_eq!(summary.total_used.value(), 400);
        assert_eq!(summary.total_remaining.value(), 600);
    }

    #[tokio::test]
    async fn transfer_out_then_in_moves_quota_between_users() {
        let svc = service();
        let alice = UserId::new();
        let bob = UserId::new();
        let record = svc.add_quota(alice, QuotaAmount::new(1000), None).await.unwrap();

        let voucher = svc.transfer_out(alice, bob, vec![(QuotaAmount::new(300), record.expires_at)]).await.unwrap();
        assert_eq!(svc.get_user_quota(alice).await.unwrap().total_remaining.value(), 700);

        svc.transfer_in(bob, &voucher).await.unwrap();
        assert_eq!(svc.get_user_quota(bob).await.unwrap().total_remaining.value(), 300);
    }

    #[tokio::test]
    async fn transfer_in_preserves_original_expiry() {
        let svc = service();
        let alice = UserId::new();
        let bob = UserId::new();
        let expiry = Utc::now() + chrono::Duration::days(3);
        svc.add_quota(alice, QuotaAmount::new(1000), Some(expiry)).await.unwrap();

        let voucher = svc.transfer_out(alice, bob, vec![(QuotaAmount::new(300), expiry)]).await.unwrap();
        let records = svc.transfer_in(bob, &voucher).await.unwrap();
        assert_eq!(records[0].expires_at, expiry);
    }

    #[tokio::test]
    async fn transfer_in_rejects_wrong_receiver() {
        let svc = service();
        let alice = UserId::new();
        let bob = UserId::new();
        let stranger = UserId::new();
        let record = svc.add_quota(alice, QuotaAmount::new(1000), None).await.unwrap();
        let voucher = svc.transfer_out(alice, bob, vec![(QuotaAmount::new(300), record.expires_at)]).await.unwrap();

        let err = svc.transfer_in(stranger, &voucher).await.unwrap_err();
        assert!(matches!(err, QcpError::AuthFailure(_)));
    }

    #[tokio::test]
    async fn transfer_in_rejects_replayed_voucher() {
        let svc = service();
        let alice = UserId::new();
        let bob = UserId::new();
        let record = svc.add_quota(alice, QuotaAmount::new(1000), None).await.unwrap();
        let voucher = svc.transfer_out(alice, bob, vec![(QuotaAmount::new(300), record.expires_at)]).await.unwrap();

        svc.transfer_in(bob, &voucher).await.unwrap();
        let err = svc.transfer_in(bob, &voucher).await.unwrap_err();
        assert!(matches!(err, QcpError::Conflict(_)));
    }

    #[tokio::test]
    async fn transfer_out_rejects_insufficient_quota_at_that_expiry() {
        let svc = service();
        let alice = UserId::new();
        let bob = UserId::new();
        let record = svc.add_quota(alice, QuotaAmount::new(100), None).await.unwrap();
        let err = svc.transfer_out(alice, bob, vec![(QuotaAmount::new(500), record.expires_at)]).await.unwrap_err();
        assert!(matches!(err, QcpError::InsufficientQuota { .. }));
    }

    #[tokio::test]
    async fn transfer_out_rejects_item_with_no_matching_expiry() {
        let svc = service();
        let alice = UserId::new();
        let bob = UserId::new();
        svc.add_quota(alice, QuotaAmount::new(1000), None).await.unwrap();
        let mismatched_expiry = Utc::now() + chrono::Duration::days(9999);
        let err = svc.transfer_out(alice, bob, vec![(QuotaAmount::new(10), mismatched_expiry)]).await.unwrap_err();
        assert!(matches!(err, QcpError::InsufficientQuota { available: 0, .. }));
    }
}
