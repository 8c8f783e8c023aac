use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::{AccountStore, AuditStore, OrderStore, Store, StoreError, WithdrawalStore};
use crate::domain::{
    AccountTransaction, AuditAction, AuditEvent, PayoutMethod, SellerAccount, Withdrawal,
    WithdrawalStatus,
};
use crate::security::mask::mask;

#[derive(Debug, thiserror::Error)]
pub enum WithdrawalError {
    #[error("invalid withdrawal request")]
    Validation(Vec<&'static str>),
    #[error("minimum withdrawal is {0}")]
    BelowMinimum(Decimal),
    #[error("amount exceeds available balance of {0}")]
    ExceedsAvailable(Decimal),
    #[error("a withdrawal is already in progress")]
    AlreadyInFlight,
    #[error("account not found")]
    AccountNotFound,
    #[error("account is locked")]
    AccountLocked,
    #[error("withdrawal not found")]
    NotFound,
    #[error("withdrawal is {current} and cannot become {requested}")]
    InvalidTransition {
        current: WithdrawalStatus,
        requested: WithdrawalStatus,
    },
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    #[serde(flatten)]
    pub payout: PayoutMethod,
}

/// Ledger balance split into what is owed to suppliers and what can be paid out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSummary {
    pub account_number: String,
    pub balance: Decimal,
    pub total_received: Decimal,
    pub encumbered: Decimal,
    pub available: Decimal,
    pub status: crate::domain::AccountStatus,
    pub locked: bool,
}

impl BalanceSummary {
    fn new(account: &SellerAccount, encumbered: Decimal) -> Self {
        Self {
            account_number: account.account_number.clone(),
            balance: account.balance,
            total_received: account.total_received,
            encumbered,
            available: (account.balance - encumbered).max(Decimal::ZERO),
            status: account.status,
            locked: account.is_locked(),
        }
    }
}

pub struct WithdrawalService {
    store: Arc<dyn Store>,
    min_amount: Decimal,
}

impl WithdrawalService {
    pub fn new(store: Arc<dyn Store>, min_amount: Decimal) -> Self {
        Self { store, min_amount }
    }

    pub async fn balance(&self, seller_id: Uuid) -> Result<BalanceSummary, WithdrawalError> {
        let account = self
            .store
            .account_by_seller(seller_id)
            .await?
            .ok_or(WithdrawalError::AccountNotFound)?;
        let encumbered = self.store.encumbered_supplier_cost(seller_id).await?;
        Ok(BalanceSummary::new(&account, encumbered))
    }

    /// Opens a `PENDING` withdrawal. The ledger is only debited on approval.
    pub async fn request(
        &self,
        seller_id: Uuid,
        req: WithdrawalRequest,
    ) -> Result<Withdrawal, WithdrawalError> {
        let mut invalid = req.payout.invalid_fields();
        if req.amount <= Decimal::ZERO || req.amount.normalize().scale() > 2 {
            invalid.insert(0, "amount");
        }
        if !invalid.is_empty() {
            return Err(WithdrawalError::Validation(invalid));
        }
        if req.amount < self.min_amount {
            return Err(WithdrawalError::BelowMinimum(self.min_amount));
        }

        let account = self
            .store
            .account_by_seller(seller_id)
            .await?
            .ok_or(WithdrawalError::AccountNotFound)?;
        if account.is_locked() {
            return Err(WithdrawalError::AccountLocked);
        }

        if self.store.has_withdrawal_in_flight(seller_id).await? {
            return Err(WithdrawalError::AlreadyInFlight);
        }

        let encumbered = self.store.encumbered_supplier_cost(seller_id).await?;
        let summary = BalanceSummary::new(&account, encumbered);
        if req.amount > summary.available {
            return Err(WithdrawalError::ExceedsAvailable(summary.available));
        }

        let withdrawal = Withdrawal::new(seller_id, account.id, req.amount, req.payout);
        self.store
            .create_withdrawal(&withdrawal)
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => WithdrawalError::AlreadyInFlight,
                other => WithdrawalError::Store(other),
            })?;

        tracing::info!(
            "withdrawal {} of {} requested by seller {} via {}",
            withdrawal.id,
            withdrawal.amount,
            seller_id,
            withdrawal.payout.kind()
        );
        self.audit(
            seller_id,
            AuditAction::WithdrawalRequested,
            json!({
                "withdrawal_id": withdrawal.id,
                "amount": withdrawal.amount,
                "method": withdrawal.payout.kind(),
                "destination": masked_destination(&withdrawal.payout),
            }),
        )
        .await;
        Ok(withdrawal)
    }

    pub async fn list_for_seller(&self, seller_id: Uuid) -> Result<Vec<Withdrawal>, WithdrawalError> {
        Ok(self.store.withdrawals_by_seller(seller_id).await?)
    }

    pub async fn list_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> Result<Vec<Withdrawal>, WithdrawalError> {
        Ok(self.store.withdrawals_by_status(status).await?)
    }

    /// Approves and debits the ledger in one step.
    pub async fn approve(
        &self,
        id: Uuid,
        admin: Uuid,
    ) -> Result<(Withdrawal, AccountTransaction), WithdrawalError> {
        let result = self
            .store
            .approve_withdrawal(id, admin, Uuid::new_v4())
            .await
            .map_err(|err| transition_error(err, WithdrawalStatus::Approved))?;
        self.reviewed(admin, &result.0).await;
        Ok(result)
    }

    pub async fn reject(
        &self,
        id: Uuid,
        admin: Uuid,
        reason: Option<&str>,
    ) -> Result<Withdrawal, WithdrawalError> {
        self.transition(id, admin, WithdrawalStatus::Rejected, reason).await
    }

    pub async fn start_processing(&self, id: Uuid, admin: Uuid) -> Result<Withdrawal, WithdrawalError> {
        self.transition(id, admin, WithdrawalStatus::Processing, None).await
    }

    pub async fn complete(&self, id: Uuid, admin: Uuid) -> Result<Withdrawal, WithdrawalError> {
        self.transition(id, admin, WithdrawalStatus::Completed, None).await
    }

    /// Marks a payout as failed and returns the money to the seller's balance.
    pub async fn fail(
        &self,
        id: Uuid,
        admin: Uuid,
        reason: &str,
    ) -> Result<(Withdrawal, AccountTransaction), WithdrawalError> {
        let result = self
            .store
            .fail_withdrawal(id, admin, reason, Uuid::new_v4())
            .await
            .map_err(|err| transition_error(err, WithdrawalStatus::Failed))?;
        self.reviewed(admin, &result.0).await;
        Ok(result)
    }

    async fn transition(
        &self,
        id: Uuid,
        admin: Uuid,
        to: WithdrawalStatus,
        note: Option<&str>,
    ) -> Result<Withdrawal, WithdrawalError> {
        let withdrawal = self
            .store
            .transition_withdrawal(id, to, admin, note)
            .await
            .map_err(|err| transition_error(err, to))?;
        self.reviewed(admin, &withdrawal).await;
        Ok(withdrawal)
    }

    async fn reviewed(&self, admin: Uuid, withdrawal: &Withdrawal) {
        tracing::info!(
            "withdrawal {} moved to {} by admin {}",
            withdrawal.id,
            withdrawal.status,
            admin
        );
        self.audit(
            admin,
            AuditAction::WithdrawalReviewed,
            json!({
                "withdrawal_id": withdrawal.id,
                "seller_id": withdrawal.seller_id,
                "status": withdrawal.status,
            }),
        )
        .await;
    }

    async fn audit(&self, actor: Uuid, action: AuditAction, detail: serde_json::Value) {
        let event = AuditEvent::new(Some(actor), action, detail);
        if let Err(err) = self.store.record_audit(&event).await {
            tracing::error!("failed to write audit event {action}: {err}");
        }
    }
}

fn transition_error(err: StoreError, requested: WithdrawalStatus) -> WithdrawalError {
    match err {
        StoreError::NotFound => WithdrawalError::NotFound,
        StoreError::InsufficientFunds => WithdrawalError::InsufficientBalance,
        StoreError::InvalidTransition { current } => {
            WithdrawalError::InvalidTransition { current, requested }
        }
        other => WithdrawalError::Store(other),
    }
}

fn masked_destination(payout: &PayoutMethod) -> String {
    match payout {
        PayoutMethod::Pix { key, .. } => mask(key, 4),
        PayoutMethod::BankTransfer {
            bank_code, account, ..
        } => format!("{bank_code}/{}", mask(account, 3)),
    }
}
