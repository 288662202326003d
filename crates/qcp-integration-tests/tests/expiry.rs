//! Expiry sweep scenarios (S1, S2) and universal properties 2 and 3.

use std::sync::Arc;

use chrono::{Duration, Utc};
use qcp_common::{GatewayQuotaSnapshot, MockGatewayClient, QuotaAmount, UserId};
use qcp_integration_tests::common::InMemoryLedgerRepo;
use qcp_ledger::{ExpirySweep, QuotaRecord, QuotaStatus, SweepReport};

fn aged_record(user: UserId, amount: i64, age: Duration) -> QuotaRecord {
    QuotaRecord::new(user, QuotaAmount::new(amount), Utc::now() - age, None)
}

#[tokio::test]
async fn s1_expiry_with_leftover_usage() {
    let user = UserId::new();
    let record = aged_record(user, 200, Duration::days(1));
    let repo = InMemoryLedgerRepo::seeded(vec![record]);
    let gateway = Arc::new(MockGatewayClient::new());
    gateway.seed(&user.to_string(), GatewayQuotaSnapshot { total: 200, used: 80 });

    let sweep = ExpirySweep::new(repo.clone(), gateway.clone());
    let report = sweep.run(Utc::now(), 10).await.unwrap();

    assert_eq!(report.records_expired, 1);
    assert_eq!(report.total_reclaimed, 200);

    let stored = repo.all_records();
    assert_eq!(stored[0].status, QuotaStatus::Expired);

    let audits = repo.all_audits();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].amount, QuotaAmount::new(-200));

    // The whole record (200) expires: it first cancels the 80 already
    // consumed, and the remaining 120 comes out of headroom.
    assert_eq!(gateway.snapshot(&user.to_string()), GatewayQuotaSnapshot { total: 0, used: 0 });
}

#[tokio::test]
async fn s2_mixed_expiry_only_sweeps_newly_expired_active_records() {
    let user = UserId::new();
    let mut already_expired = aged_record(user, 150, Duration::days(1));
    already_expired.status = QuotaStatus::Expired;

    let records = vec![
        aged_record(user, 100, Duration::days(1)),
        aged_record(user, 200, Duration::days(-30)), // not yet due
        already_expired,
        aged_record(user, 80, Duration::days(1)),
        aged_record(user, 120, Duration::hours(1)),
    ];
    let repo = InMemoryLedgerRepo::seeded(records);
    let gateway = Arc::new(MockGatewayClient::new());
    gateway.seed(&user.to_string(), GatewayQuotaSnapshot { total: 650, used: 150 });

    let sweep = ExpirySweep::new(repo.clone(), gateway.clone());
    let report = sweep.run(Utc::now(), 10).await.unwrap();

    // Three previously-active records pass their expiry: 100, 80, 120.
    // The 200 record is not yet due.
    assert_eq!(report.records_expired, 3);
    assert_eq!(report.total_reclaimed, 300);

    let active_remaining: i64 =
        repo.all_records().iter().filter(|r| r.status == QuotaStatus::Active).map(|r| r.amount.value()).sum();
    assert_eq!(active_remaining, 200);

    assert_eq!(repo.all_audits().len(), 3);
    // expiring_sum (300) exceeds used (150), so used clamps to 0 and
    // total drops by the full expiring sum.
    assert_eq!(gateway.snapshot(&user.to_string()), GatewayQuotaSnapshot { total: 350, used: 0 });
}

#[tokio::test]
async fn universal_2_gateway_total_matches_active_sum_after_sweep() {
    let user = UserId::new();
    let records = vec![aged_record(user, 100, Duration::days(1)), aged_record(user, 300, Duration::days(-10))];
    let repo = InMemoryLedgerRepo::seeded(records);
    let gateway = Arc::new(MockGatewayClient::new());
    gateway.seed(&user.to_string(), GatewayQuotaSnapshot { total: 400, used: 20 });

    let sweep = ExpirySweep::new(repo.clone(), gateway.clone());
    sweep.run(Utc::now(), 10).await.unwrap();

    let active_total: i64 =
        repo.all_records().iter().filter(|r| r.status == QuotaStatus::Active).map(|r| r.amount.value()).sum();
    assert_eq!(active_total, 300);
    assert_eq!(gateway.snapshot(&user.to_string()).total, active_total);
    assert!(gateway.snapshot(&user.to_string()).used <= gateway.snapshot(&user.to_string()).total);
}

#[tokio::test]
async fn universal_3_rerunning_expire_is_a_noop() {
    let user = UserId::new();
    let record = aged_record(user, 200, Duration::days(1));
    let repo = InMemoryLedgerRepo::seeded(vec![record]);
    let gateway = Arc::new(MockGatewayClient::new());
    gateway.seed(&user.to_string(), GatewayQuotaSnapshot { total: 200, used: 80 });

    let sweep = ExpirySweep::new(repo.clone(), gateway.clone());
    let first = sweep.run(Utc::now(), 10).await.unwrap();
    assert_eq!(first.records_expired, 1);

    let before = repo.all_audits().len();
    let before_calls = gateway.call_count();
    let second = sweep.run(Utc::now(), 10).await.unwrap();
    assert_eq!(second, SweepReport::default());
    assert_eq!(repo.all_audits().len(), before);
    assert_eq!(gateway.call_count(), before_calls);
}

#[tokio::test]
async fn sweep_snapshots_monthly_usage_when_records_expire() {
    let user = UserId::new();
    let record = aged_record(user, 200, Duration::days(1));
    let repo = InMemoryLedgerRepo::seeded(vec![record]);
    let gateway = Arc::new(MockGatewayClient::new());
    gateway.seed(&user.to_string(), GatewayQuotaSnapshot { total: 200, used: 80 });

    let sweep = ExpirySweep::new(repo.clone(), gateway);
    sweep.run(Utc::now(), 10).await.unwrap();

    let snapshots = repo.all_monthly_usage();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].user_id, user);
    assert_eq!(snapshots[0].used_quota, 80);
}
