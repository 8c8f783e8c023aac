use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Locked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Locked => "LOCKED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AccountStatus::Active),
            "LOCKED" => Ok(AccountStatus::Locked),
            other => Err(UnknownVariant::new("account status", other)),
        }
    }
}

/// A seller's internal wallet. One per seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerAccount {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub account_number: String,
    pub balance: Decimal,
    pub total_received: Decimal,
    pub status: AccountStatus,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SellerAccount {
    pub fn new(seller_id: Uuid, account_number: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            seller_id,
            account_number,
            balance: Decimal::ZERO,
            total_received: Decimal::ZERO,
            status: AccountStatus::Active,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A lock without an expiry holds until an admin lifts it; an expired lock no longer applies.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.locked_until) {
            (AccountStatus::Active, _) => false,
            (AccountStatus::Locked, None) => true,
            (AccountStatus::Locked, Some(until)) => until > now,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked_at(Utc::now())
    }
}

/// Random 8 digit account number. Leading digit is never zero.
pub fn generate_account_number() -> String {
    use rand::Rng;
    let n: u32 = rand::thread_rng().gen_range(10_000_000..100_000_000);
    n.to_string()
}

pub fn is_valid_account_number(number: &str) -> bool {
    number.len() == 8 && number.chars().all(|c| c.is_ascii_digit())
}
