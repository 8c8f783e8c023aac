use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Processing,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    /// Statuses that block a seller from opening another withdrawal.
    pub const IN_FLIGHT: [WithdrawalStatus; 3] = [
        WithdrawalStatus::Pending,
        WithdrawalStatus::Approved,
        WithdrawalStatus::Processing,
    ];

    pub fn is_in_flight(&self) -> bool {
        Self::IN_FLIGHT.contains(self)
    }

    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Approved => "APPROVED",
            WithdrawalStatus::Rejected => "REJECTED",
            WithdrawalStatus::Processing => "PROCESSING",
            WithdrawalStatus::Completed => "COMPLETED",
            WithdrawalStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(WithdrawalStatus::Pending),
            "APPROVED" => Ok(WithdrawalStatus::Approved),
            "REJECTED" => Ok(WithdrawalStatus::Rejected),
            "PROCESSING" => Ok(WithdrawalStatus::Processing),
            "COMPLETED" => Ok(WithdrawalStatus::Completed),
            "FAILED" => Ok(WithdrawalStatus::Failed),
            other => Err(UnknownVariant::new("withdrawal status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixKeyType {
    Cpf,
    Cnpj,
    Email,
    Phone,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankAccountType {
    Checking,
    Savings,
}

/// Where the payout goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutMethod {
    Pix {
        key: String,
        key_type: PixKeyType,
    },
    BankTransfer {
        bank_code: String,
        agency: String,
        account: String,
        account_type: BankAccountType,
    },
}

impl PayoutMethod {
    /// Returns the names of the fields that fail validation.
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        match self {
            PayoutMethod::Pix { key, key_type } => {
                let key = key.trim();
                let valid = match key_type {
                    _ if key.is_empty() || key.len() > 77 => false,
                    PixKeyType::Cpf => digits_only(key) && key.len() == 11,
                    PixKeyType::Cnpj => digits_only(key) && key.len() == 14,
                    PixKeyType::Email => key.contains('@'),
                    PixKeyType::Phone => {
                        let rest = key.strip_prefix('+').unwrap_or(key);
                        digits_only(rest) && (10..=13).contains(&rest.len())
                    }
                    PixKeyType::Random => key.len() == 36,
                };
                if !valid {
                    fields.push("key");
                }
            }
            PayoutMethod::BankTransfer {
                bank_code,
                agency,
                account,
                ..
            } => {
                if !(digits_only(bank_code) && bank_code.len() == 3) {
                    fields.push("bank_code");
                }
                if !(digits_only(agency) && (1..=5).contains(&agency.len())) {
                    fields.push("agency");
                }
                let account_digits = account.replace('-', "");
                if !(digits_only(&account_digits) && (2..=13).contains(&account_digits.len())) {
                    fields.push("account");
                }
            }
        }
        fields
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PayoutMethod::Pix { .. } => "PIX",
            PayoutMethod::BankTransfer { .. } => "BANK_TRANSFER",
        }
    }
}

fn digits_only(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub payout: PayoutMethod,
    pub status: WithdrawalStatus,
    pub reviewed_by: Option<Uuid>,
    pub note: Option<String>,
    /// Ledger reference of the debit, set on approval.
    pub ledger_reference: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(seller_id: Uuid, account_id: Uuid, amount: Decimal, payout: PayoutMethod) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            seller_id,
            account_id,
            amount,
            payout,
            status: WithdrawalStatus::Pending,
            reviewed_by: None,
            note: None,
            ledger_reference: None,
            created_at: now,
            updated_at: now,
        }
    }
}
