//! Storage ports and their adapters.
//!
//! Services only see the traits below; `postgres` backs them with sqlx and
//! `memory` with a single mutex-guarded state used for local runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::domain::{
    AccountStatus, AccountTransaction, AuditAction, AuditEvent, EntryKind, Role, SellerAccount,
    UnknownVariant, User, Withdrawal, WithdrawalStatus,
};

pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("insufficient balance")]
    InsufficientFunds,
    #[error("balance limit exceeded")]
    BalanceLimit,
    #[error("duplicate value for {0}")]
    Conflict(&'static str),
    #[error("withdrawal is {current}")]
    InvalidTransition { current: WithdrawalStatus },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(#[from] UnknownVariant),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: Option<&'a str>,
    pub role: Role,
}

/// A fully validated transfer, ready to be applied atomically.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub reference_id: Uuid,
    pub source: SellerAccount,
    pub destination: SellerAccount,
    pub amount: Decimal,
    pub description: Option<String>,
    pub signature: String,
    pub signed_at: DateTime<Utc>,
}

impl TransferPlan {
    /// Metadata stored on the ledger entry of one side of the transfer.
    pub fn metadata_for(&self, kind: EntryKind) -> serde_json::Value {
        let counterparty = if kind == EntryKind::TransferOut {
            &self.destination
        } else {
            &self.source
        };
        json!({
            "signature": self.signature,
            "signed_at": self.signed_at.timestamp_millis(),
            "from_account": self.source.account_number,
            "to_account": self.destination.account_number,
            "counterparty_account": counterparty.account_number,
            "counterparty_seller": counterparty.seller_id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub debit: AccountTransaction,
    pub credit: AccountTransaction,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser<'_>) -> StoreResult<User>;
    /// Creates a seller together with its account in one unit of work.
    async fn create_seller(
        &self,
        user: NewUser<'_>,
        account_number: &str,
    ) -> StoreResult<(User, SellerAccount)>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn verify_refresh_token(&self, token: &str) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account_by_seller(&self, seller_id: Uuid) -> StoreResult<Option<SellerAccount>>;
    async fn account_by_number(&self, number: &str) -> StoreResult<Option<SellerAccount>>;
    async fn set_lock(
        &self,
        account_id: Uuid,
        status: AccountStatus,
        locked_until: Option<DateTime<Utc>>,
    ) -> StoreResult<SellerAccount>;
    /// Sum of `TRANSFER_OUT` entries created at or after `since`.
    async fn outgoing_transfers_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Decimal>;
    /// Re-reads the source balance under lock and applies both ledger sides, or nothing.
    async fn execute_transfer(&self, plan: &TransferPlan) -> StoreResult<TransferOutcome>;
    /// Credits sale proceeds; raises both balance and total received.
    async fn credit_account(
        &self,
        account_id: Uuid,
        amount: Decimal,
        reference_id: Uuid,
        description: Option<String>,
    ) -> StoreResult<AccountTransaction>;
    async fn entries(&self, account_id: Uuid) -> StoreResult<Vec<AccountTransaction>>;
    async fn entry(
        &self,
        account_id: Uuid,
        entry_id: Uuid,
    ) -> StoreResult<Option<AccountTransaction>>;
}

#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Fails with `Conflict` when the seller already has a withdrawal in flight.
    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> StoreResult<()>;
    async fn withdrawal(&self, id: Uuid) -> StoreResult<Option<Withdrawal>>;
    async fn withdrawals_by_seller(&self, seller_id: Uuid) -> StoreResult<Vec<Withdrawal>>;
    async fn withdrawals_by_status(&self, status: WithdrawalStatus)
        -> StoreResult<Vec<Withdrawal>>;
    async fn has_withdrawal_in_flight(&self, seller_id: Uuid) -> StoreResult<bool>;
    /// `PENDING -> APPROVED` together with the ledger debit.
    async fn approve_withdrawal(
        &self,
        id: Uuid,
        reviewer: Uuid,
        reference_id: Uuid,
    ) -> StoreResult<(Withdrawal, AccountTransaction)>;
    /// `PROCESSING -> FAILED` together with the ledger refund.
    async fn fail_withdrawal(
        &self,
        id: Uuid,
        reviewer: Uuid,
        reason: &str,
        reference_id: Uuid,
    ) -> StoreResult<(Withdrawal, AccountTransaction)>;
    /// Transitions without ledger effect, refused unless the current status leads to `to`.
    async fn transition_withdrawal(
        &self,
        id: Uuid,
        to: WithdrawalStatus,
        reviewer: Uuid,
        note: Option<&str>,
    ) -> StoreResult<Withdrawal>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Supplier cost of dropshipping items on orders that are still open.
    async fn encumbered_supplier_cost(&self, seller_id: Uuid) -> StoreResult<Decimal>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record_audit(&self, event: &AuditEvent) -> StoreResult<()>;
    async fn count_audit_since(
        &self,
        actor: Uuid,
        action: AuditAction,
        since: DateTime<Utc>,
    ) -> StoreResult<i64>;
}

pub trait Store: UserStore + AccountStore + WithdrawalStore + OrderStore + AuditStore {}

impl<T> Store for T where T: UserStore + AccountStore + WithdrawalStore + OrderStore + AuditStore {}
