//! Property-based tests for the consumption-order projection and the
//! exact-expiry debit used by transfer-out.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use qcp_common::{QuotaAmount, UserId};
use qcp_ledger::ledger::{apply_consumption_order, debit_items};
use qcp_ledger::QuotaRecord;

fn record(amount: i64, offset_minutes: i64) -> QuotaRecord {
    QuotaRecord::new(UserId::new(), QuotaAmount::new(amount), Utc::now() + Duration::minutes(offset_minutes), None)
}

proptest! {
    #[test]
    fn prop_consumption_order_never_reports_negative_remainder(
        amounts in prop::collection::vec(0i64..500, 1..8),
        used in 0i64..4000,
    ) {
        let records: Vec<QuotaRecord> = amounts
            .iter()
            .enumerate()
            .map(|(i, &amount)| record(amount, i as i64))
            .collect();

        let (per_record, total_remaining) = apply_consumption_order(&records, QuotaAmount::new(used));

        for r in &per_record {
            prop_assert!(r.amount_remaining.value() >= 0);
        }
        let total: i64 = amounts.iter().sum();
        prop_assert_eq!(total_remaining.value(), (total - used).max(0));
        prop_assert_eq!(per_record.iter().map(|r| r.amount_remaining.value()).sum::<i64>(), total_remaining.value());
    }

    #[test]
    fn prop_consumption_order_drains_soonest_expiry_before_later(
        amounts in prop::collection::vec(50i64..200, 2..6),
        used in 0i64..1500,
    ) {
        let records: Vec<QuotaRecord> = amounts
            .iter()
            .enumerate()
            .map(|(i, &amount)| record(amount, i as i64))
            .collect();
        let original: std::collections::HashMap<uuid::Uuid, i64> =
            records.iter().map(|r| (r.id, r.amount.value())).collect();

        let (mut per_record, _) = apply_consumption_order(&records, QuotaAmount::new(used));
        per_record.sort_by_key(|r| r.expires_at);

        // Once a record is only partially drained, every later-expiring
        // record must be untouched — soonest expiry is consumed first.
        let mut seen_partial = false;
        for r in &per_record {
            let full = original[&r.record_id];
            if seen_partial {
                prop_assert_eq!(r.amount_remaining.value(), full);
            } else if r.amount_remaining.value() < full {
                seen_partial = true;
            }
        }
    }

    #[test]
    fn prop_debit_items_never_overdraws_the_matching_expiry(
        amount in 0i64..500,
        requested in 0i64..2000,
    ) {
        let expiry = Utc::now() + Duration::days(30);
        let mut records = vec![record(amount, 30 * 24 * 60)];
        records[0].expires_at = expiry;
        let user = UserId::new();

        let result = debit_items(user, &mut records, &[(QuotaAmount::new(requested), expiry)]);
        if requested <= amount {
            prop_assert!(result.is_ok());
            prop_assert_eq!(records[0].amount.value(), amount - requested);
        } else {
            prop_assert!(result.is_err());
            // A rejected item leaves every record untouched.
            prop_assert_eq!(records[0].amount.value(), amount);
        }
    }

    #[test]
    fn prop_debit_items_ignores_records_with_a_different_expiry(
        amount in 0i64..500,
        requested in 0i64..500,
    ) {
        let held_expiry = Utc::now() + Duration::days(30);
        let other_expiry = Utc::now() + Duration::days(60);
        let mut records = vec![record(amount, 30 * 24 * 60)];
        records[0].expires_at = held_expiry;
        let user = UserId::new();

        let result = debit_items(user, &mut records, &[(QuotaAmount::new(requested), other_expiry)]);
        if requested == 0 {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
        // Either way, the held record was never a match for `other_expiry`.
        prop_assert_eq!(records[0].amount.value(), amount);
    }
}
