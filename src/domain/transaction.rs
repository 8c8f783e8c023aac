use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Largest balance an account can hold, the range of a `NUMERIC(14, 2)` column.
pub fn max_balance() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// An append-only ledger entry of a seller account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reference_id: Uuid,
    pub status: EntryStatus,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AccountTransaction {
    /// Builds an entry whose `balance_after` follows from `balance_before`, `kind` and `amount`.
    /// `None` when the movement would push the balance past [`max_balance`].
    pub fn record(
        account_id: Uuid,
        kind: EntryKind,
        amount: Decimal,
        balance_before: Decimal,
        reference_id: Uuid,
        description: Option<String>,
        metadata: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Option<Self> {
        Some(Self {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount,
            balance_before,
            balance_after: kind.apply(balance_before, amount)?,
            reference_id,
            status: EntryStatus::Completed,
            description,
            metadata,
            created_at,
        })
    }

    pub fn is_consistent(&self) -> bool {
        self.kind.apply(self.balance_before, self.amount) == Some(self.balance_after)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    TransferIn,
    TransferOut,
    Credit,
    Withdrawal,
    WithdrawalRefund,
}

impl EntryKind {
    pub fn is_debit(&self) -> bool {
        matches!(self, EntryKind::TransferOut | EntryKind::Withdrawal)
    }

    pub fn apply(&self, balance: Decimal, amount: Decimal) -> Option<Decimal> {
        let next = if self.is_debit() {
            balance.checked_sub(amount)?
        } else {
            balance.checked_add(amount)?
        };
        (next <= max_balance()).then_some(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::TransferIn => "TRANSFER_IN",
            EntryKind::TransferOut => "TRANSFER_OUT",
            EntryKind::Credit => "CREDIT",
            EntryKind::Withdrawal => "WITHDRAWAL",
            EntryKind::WithdrawalRefund => "WITHDRAWAL_REFUND",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSFER_IN" => Ok(EntryKind::TransferIn),
            "TRANSFER_OUT" => Ok(EntryKind::TransferOut),
            "CREDIT" => Ok(EntryKind::Credit),
            "WITHDRAWAL" => Ok(EntryKind::Withdrawal),
            "WITHDRAWAL_REFUND" => Ok(EntryKind::WithdrawalRefund),
            other => Err(UnknownVariant::new("entry kind", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Completed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for EntryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(EntryStatus::Completed),
            other => Err(UnknownVariant::new("entry status", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_after_follows_entry_direction() {
        let now = Utc::now();
        let reference = Uuid::new_v4();
        let out = AccountTransaction::record(
            Uuid::new_v4(),
            EntryKind::TransferOut,
            dec!(100),
            dec!(150),
            reference,
            None,
            serde_json::Value::Null,
            now,
        )
        .unwrap();
        assert_eq!(out.balance_after, dec!(50));
        assert!(out.is_consistent());

        let refund = AccountTransaction::record(
            Uuid::new_v4(),
            EntryKind::WithdrawalRefund,
            dec!(25.50),
            dec!(0),
            reference,
            None,
            serde_json::Value::Null,
            now,
        )
        .unwrap();
        assert_eq!(refund.balance_after, dec!(25.50));
    }

    #[test]
    fn credits_stop_at_the_balance_ceiling() {
        assert_eq!(
            EntryKind::Credit.apply(max_balance() - dec!(1), dec!(1)),
            Some(max_balance())
        );
        assert_eq!(EntryKind::Credit.apply(max_balance(), dec!(0.01)), None);
        assert_eq!(EntryKind::TransferIn.apply(Decimal::MAX, Decimal::MAX), None);

        let entry = AccountTransaction::record(
            Uuid::new_v4(),
            EntryKind::Credit,
            dec!(10),
            max_balance(),
            Uuid::new_v4(),
            None,
            serde_json::Value::Null,
            Utc::now(),
        );
        assert!(entry.is_none());
    }

    #[test]
    fn kind_labels_parse_back() {
        for kind in [
            EntryKind::TransferIn,
            EntryKind::TransferOut,
            EntryKind::Credit,
            EntryKind::Withdrawal,
            EntryKind::WithdrawalRefund,
        ] {
            assert_eq!(kind.as_str().parse::<EntryKind>().unwrap(), kind);
        }
        assert!("DEPOSIT".parse::<EntryKind>().is_err());
    }
}
