pub mod account;
pub mod audit;
pub mod order;
pub mod transaction;
pub mod user;
pub mod withdrawal;

pub use account::{AccountStatus, SellerAccount};
pub use audit::{AuditAction, AuditEvent};
pub use order::{DropshipItem, FulfilmentKind, OrderStatus};
pub use transaction::{max_balance, AccountTransaction, EntryKind, EntryStatus};
pub use user::{Role, User};
pub use withdrawal::{BankAccountType, PayoutMethod, PixKeyType, Withdrawal, WithdrawalStatus};

/// Error returned when a stored enum label does not match any known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
