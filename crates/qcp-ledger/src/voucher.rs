//! Voucher issuance and verification (`spec.md` §4.1, "Transfer out"/"Transfer in").
//!
//! A voucher is an HMAC-signed, bearer-style credential a user's
//! transfer-out produces and a named receiver's transfer-in redeems. The
//! signature binds the nonce, issuer, receiver, and item list so a voucher
//! cannot be replayed with a different amount, rerouted to a different
//! receiver, or claimed by forging the issuer field; the nonce itself is
//! what makes redemption at-most-once, enforced by
//! `LedgerRepository::try_mark_voucher_redeemed`'s unique constraint.

use chrono::{DateTime, Utc};
use qcp_common::{QcpError, QcpResult, QuotaAmount, UserId, VoucherNonce};
use ring::hmac;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// One `(amount, expiry)` pair carried by a voucher. `expires_at` is the
/// quota expiry the receiver's new record must preserve, not the voucher's
/// own redemption deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherItem {
    pub amount: QuotaAmount,
    pub expires_at: DateTime<Utc>,
}

/// A voucher as handed to the redeeming user, wire-serializable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub nonce: VoucherNonce,
    pub issuer_user_id: UserId,
    pub receiver_id: UserId,
    pub items: Vec<VoucherItem>,
    pub issued_at: DateTime<Utc>,
    /// Redemption deadline for the voucher itself (its bearer-credential
    /// TTL), distinct from each item's quota `expires_at`.
    pub redeem_by: DateTime<Utc>,
    /// Base64-encoded HMAC-SHA256 signature over the fields above.
    pub signature: String,
}

impl Voucher {
    pub fn total_amount(&self) -> QuotaAmount {
        QuotaAmount::new(self.items.iter().map(|i| i.amount.value()).sum())
    }
}

fn signing_key(secret: &SecretString) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, secret.expose_secret().as_bytes())
}

fn signing_payload(
    nonce: VoucherNonce,
    issuer_user_id: UserId,
    receiver_id: UserId,
    items: &[VoucherItem],
    issued_at: DateTime<Utc>,
    redeem_by: DateTime<Utc>,
) -> String {
    let items_str =
        items.iter().map(|i| format!("{}:{}", i.amount.value(), i.expires_at.timestamp_millis())).collect::<Vec<_>>().join(";");
    format!(
        "{}|{}|{}|{}|{}|{}",
        nonce,
        issuer_user_id,
        receiver_id,
        items_str,
        issued_at.timestamp_millis(),
        redeem_by.timestamp_millis(),
    )
}

/// Issue a new voucher carrying `items`, signed with `secret`, redeemable
/// until `ttl` from now.
pub fn issue(
    secret: &SecretString,
    issuer_user_id: UserId,
    receiver_id: UserId,
    items: Vec<VoucherItem>,
    ttl: chrono::Duration,
) -> Voucher {
    let nonce = VoucherNonce::new();
    let issued_at = Utc::now();
    let redeem_by = issued_at + ttl;
    let payload = signing_payload(nonce, issuer_user_id, receiver_id, &items, issued_at, redeem_by);
    let tag = hmac::sign(&signing_key(secret), payload.as_bytes());
    Voucher {
        nonce,
        issuer_user_id,
        receiver_id,
        items,
        issued_at,
        redeem_by,
        signature: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, tag.as_ref()),
    }
}

/// Verify a voucher's signature, redemption deadline, and that
/// `redeeming_user_id` is the named receiver. Does not check redemption
/// status; that is the repository's job inside the transfer-in transaction.
pub fn verify(secret: &SecretString, voucher: &Voucher, redeeming_user_id: UserId) -> QcpResult<()> {
    if Utc::now() > voucher.redeem_by {
        return Err(QcpError::Validation("voucher has expired".to_string()));
    }
    if voucher.receiver_id != redeeming_user_id {
        return Err(QcpError::AuthFailure("voucher receiver does not match redeeming user".to_string()));
    }
    let payload = signing_payload(
        voucher.nonce,
        voucher.issuer_user_id,
        voucher.receiver_id,
        &voucher.items,
        voucher.issued_at,
        voucher.redeem_by,
    );
    let expected_tag = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &voucher.signature)
        .map_err(|_| QcpError::Validation("voucher signature is not valid base64".to_string()))?;

    hmac::verify(&signing_key(secret), payload.as_bytes(), &expected_tag)
        .map_err(|_| QcpError::Validation("voucher signature mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("test-voucher-secret".to_string())
    }

    fn items() -> Vec<VoucherItem> {
        vec![VoucherItem { amount: QuotaAmount::new(500), expires_at: Utc::now() + chrono::Duration::days(30) }]
    }

    #[test]
    fn issue_then_verify_succeeds() {
        let receiver = UserId::new();
        let voucher = issue(&secret(), UserId::new(), receiver, items(), chrono::Duration::days(1));
        verify(&secret(), &voucher, receiver).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_amount() {
        let receiver = UserId::new();
        let mut voucher = issue(&secret(), UserId::new(), receiver, items(), chrono::Duration::days(1));
        voucher.items[0].amount = QuotaAmount::new(5000);
        assert!(verify(&secret(), &voucher, receiver).is_err());
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let receiver = UserId::new();
        let voucher = issue(&secret(), UserId::new(), receiver, items(), chrono::Duration::days(1));
        let other = SecretString::from("a-different-secret".to_string());
        assert!(verify(&other, &voucher, receiver).is_err());
    }

    #[test]
    fn verify_rejects_expired_voucher() {
        let receiver = UserId::new();
        let voucher = issue(&secret(), UserId::new(), receiver, items(), chrono::Duration::seconds(-1));
        assert!(verify(&secret(), &voucher, receiver).is_err());
    }

    #[test]
    fn verify_rejects_wrong_receiver() {
        let receiver = UserId::new();
        let voucher = issue(&secret(), UserId::new(), receiver, items(), chrono::Duration::days(1));
        let stranger = UserId::new();
        let err = verify(&secret(), &voucher, stranger).unwrap_err();
        assert!(matches!(err, QcpError::AuthFailure(_)));
    }

    #[test]
    fn total_amount_sums_items() {
        let voucher = issue(
            &secret(),
            UserId::new(),
            UserId::new(),
            vec![
                VoucherItem { amount: QuotaAmount::new(100), expires_at: Utc::now() },
                VoucherItem { amount: QuotaAmount::new(50), expires_at: Utc::now() + chrono::Duration::days(1) },
            ],
            chrono::Duration::days(1),
        );
        assert_eq!(voucher.total_amount().value(), 150);
    }
}
