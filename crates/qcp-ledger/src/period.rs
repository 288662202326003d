//! Expiry computation for recharged quota.
//!
//! A quota record's default expiry is the end of the month it was granted
//! in, at 23:59:59.999 UTC, unless an explicit expiry was supplied by the
//! caller (`spec.md` §4.1, "Recharge").

use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Compute the end-of-month instant for the month containing `now`.
pub fn end_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let start_of_next_month = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("valid calendar date");
    start_of_next_month - chrono::Duration::milliseconds(1)
}

/// The `"YYYY-MM"` key of the month before the one containing `as_of`,
/// used to snapshot `MonthlyQuotaUsage` at expiry time (`spec.md` §4.1
/// step 6: usage is attributed to the month that just ended).
pub fn previous_month_key(as_of: DateTime<Utc>) -> String {
    let (year, month) = if as_of.month() == 1 { (as_of.year() - 1, 12) } else { (as_of.year(), as_of.month() - 1) };
    format!("{year:04}-{month:02}")
}
