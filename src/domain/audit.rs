use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    TransferSucceeded,
    TransferFailed,
    TransferRateLimited,
    TransferSuspicious,
    WithdrawalRequested,
    WithdrawalReviewed,
    AccountCredited,
    AccountLocked,
    AccountUnlocked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::TransferSucceeded => "TRANSFER_SUCCEEDED",
            AuditAction::TransferFailed => "TRANSFER_FAILED",
            AuditAction::TransferRateLimited => "TRANSFER_RATE_LIMITED",
            AuditAction::TransferSuspicious => "TRANSFER_SUSPICIOUS",
            AuditAction::WithdrawalRequested => "WITHDRAWAL_REQUESTED",
            AuditAction::WithdrawalReviewed => "WITHDRAWAL_REVIEWED",
            AuditAction::AccountCredited => "ACCOUNT_CREDITED",
            AuditAction::AccountLocked => "ACCOUNT_LOCKED",
            AuditAction::AccountUnlocked => "ACCOUNT_UNLOCKED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSFER_SUCCEEDED" => Ok(AuditAction::TransferSucceeded),
            "TRANSFER_FAILED" => Ok(AuditAction::TransferFailed),
            "TRANSFER_RATE_LIMITED" => Ok(AuditAction::TransferRateLimited),
            "TRANSFER_SUSPICIOUS" => Ok(AuditAction::TransferSuspicious),
            "WITHDRAWAL_REQUESTED" => Ok(AuditAction::WithdrawalRequested),
            "WITHDRAWAL_REVIEWED" => Ok(AuditAction::WithdrawalReviewed),
            "ACCOUNT_CREDITED" => Ok(AuditAction::AccountCredited),
            "ACCOUNT_LOCKED" => Ok(AuditAction::AccountLocked),
            "ACCOUNT_UNLOCKED" => Ok(AuditAction::AccountUnlocked),
            other => Err(UnknownVariant::new("audit action", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor: Option<Uuid>,
    pub action: AuditAction,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor: Option<Uuid>, action: AuditAction, detail: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            action,
            detail,
            created_at: Utc::now(),
        }
    }
}
