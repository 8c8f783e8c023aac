use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::AccountTransaction;

type HmacSha256 = Hmac<Sha256>;

/// Signs transfers so ledger entries can later be checked for tampering.
#[derive(Clone)]
pub struct TransferSigner {
    secret: Vec<u8>,
}

impl TransferSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn payload(
        id: Uuid,
        from: &str,
        to: &str,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    ) -> String {
        // normalize so 100 and 100.00 sign identically
        format!(
            "{id}|{from}|{to}|{}|{}",
            amount.normalize(),
            timestamp.timestamp_millis()
        )
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        HmacSha256::new_from_slice(&self.secret).expect("hmac key of any size")
    }

    pub fn sign(
        &self,
        id: Uuid,
        from: &str,
        to: &str,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    ) -> String {
        let mut mac = self.mac();
        mac.update(Self::payload(id, from, to, amount, timestamp).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(
        &self,
        id: Uuid,
        from: &str,
        to: &str,
        amount: Decimal,
        timestamp: DateTime<Utc>,
        signature: &str,
    ) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(Self::payload(id, from, to, amount, timestamp).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    /// Checks the signature stored in a transfer entry's metadata.
    pub fn verify_entry(&self, entry: &AccountTransaction) -> bool {
        let meta = &entry.metadata;
        let (Some(signature), Some(from), Some(to), Some(signed_at)) = (
            meta.get("signature").and_then(|v| v.as_str()),
            meta.get("from_account").and_then(|v| v.as_str()),
            meta.get("to_account").and_then(|v| v.as_str()),
            meta.get("signed_at").and_then(|v| v.as_i64()),
        ) else {
            return false;
        };
        let Some(timestamp) = DateTime::<Utc>::from_timestamp_millis(signed_at) else {
            return false;
        };
        self.verify(entry.reference_id, from, to, entry.amount, timestamp, signature)
    }
}
