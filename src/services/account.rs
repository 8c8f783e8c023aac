use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::{AccountStore, AuditStore, Store, StoreError};
use crate::domain::{
    max_balance, AccountStatus, AccountTransaction, AuditAction, AuditEvent, EntryKind,
    SellerAccount,
};
use crate::security::{mask::mask_account, TransferSigner};

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("account not found")]
    AccountNotFound,
    #[error("transaction not found")]
    EntryNotFound,
    #[error("amount must be positive with at most 2 decimal places")]
    InvalidAmount,
    #[error("credit would take the balance past {0}")]
    BalanceLimit(Decimal),
    #[error("lock expiry must be in the future")]
    InvalidLockExpiry,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A ledger entry with the outcome of its signature check.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedEntry {
    #[serde(flatten)]
    pub entry: AccountTransaction,
    /// `None` for entries that carry no signature.
    pub signature_valid: Option<bool>,
}

/// Ledger reads and admin account operations.
pub struct AccountService {
    store: Arc<dyn Store>,
    signer: TransferSigner,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, signer: TransferSigner) -> Self {
        Self { store, signer }
    }

    async fn seller_account(&self, seller_id: Uuid) -> Result<SellerAccount, AccountError> {
        self.store
            .account_by_seller(seller_id)
            .await?
            .ok_or(AccountError::AccountNotFound)
    }

    async fn numbered_account(&self, number: &str) -> Result<SellerAccount, AccountError> {
        self.store
            .account_by_number(number)
            .await?
            .ok_or(AccountError::AccountNotFound)
    }

    pub async fn statement(&self, seller_id: Uuid) -> Result<Vec<AccountTransaction>, AccountError> {
        let account = self.seller_account(seller_id).await?;
        Ok(self.store.entries(account.id).await?)
    }

    pub async fn entry(&self, seller_id: Uuid, entry_id: Uuid) -> Result<VerifiedEntry, AccountError> {
        let account = self.seller_account(seller_id).await?;
        let entry = self
            .store
            .entry(account.id, entry_id)
            .await?
            .ok_or(AccountError::EntryNotFound)?;
        let signature_valid = matches!(entry.kind, EntryKind::TransferIn | EntryKind::TransferOut)
            .then(|| self.signer.verify_entry(&entry));
        if signature_valid == Some(false) {
            tracing::error!("signature mismatch on ledger entry {}", entry.id);
        }
        Ok(VerifiedEntry {
            entry,
            signature_valid,
        })
    }

    /// Credits settled sale proceeds to an account.
    pub async fn credit(
        &self,
        admin: Uuid,
        account_number: &str,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<AccountTransaction, AccountError> {
        if amount <= Decimal::ZERO || amount.normalize().scale() > 2 {
            return Err(AccountError::InvalidAmount);
        }
        if amount > max_balance() {
            return Err(AccountError::BalanceLimit(max_balance()));
        }
        let account = self.numbered_account(account_number).await?;
        let entry = self
            .store
            .credit_account(account.id, amount, Uuid::new_v4(), description)
            .await
            .map_err(|err| match err {
                StoreError::BalanceLimit => AccountError::BalanceLimit(max_balance()),
                other => AccountError::Store(other),
            })?;
        tracing::info!(
            "credited {} to account {}",
            amount,
            mask_account(&account.account_number)
        );
        self.audit(
            admin,
            AuditAction::AccountCredited,
            json!({ "account_id": account.id, "amount": amount, "reference_id": entry.reference_id }),
        )
        .await;
        Ok(entry)
    }

    pub async fn lock(
        &self,
        admin: Uuid,
        account_number: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<SellerAccount, AccountError> {
        if until.is_some_and(|until| until <= Utc::now()) {
            return Err(AccountError::InvalidLockExpiry);
        }
        let account = self.numbered_account(account_number).await?;
        let account = self
            .store
            .set_lock(account.id, AccountStatus::Locked, until)
            .await?;
        tracing::warn!(
            "account {} locked until {:?}",
            mask_account(&account.account_number),
            until
        );
        self.audit(
            admin,
            AuditAction::AccountLocked,
            json!({ "account_id": account.id, "locked_until": until }),
        )
        .await;
        Ok(account)
    }

    pub async fn unlock(&self, admin: Uuid, account_number: &str) -> Result<SellerAccount, AccountError> {
        let account = self.numbered_account(account_number).await?;
        let account = self
            .store
            .set_lock(account.id, AccountStatus::Active, None)
            .await?;
        tracing::info!("account {} unlocked", mask_account(&account.account_number));
        self.audit(
            admin,
            AuditAction::AccountUnlocked,
            json!({ "account_id": account.id }),
        )
        .await;
        Ok(account)
    }

    async fn audit(&self, actor: Uuid, action: AuditAction, detail: serde_json::Value) {
        let event = AuditEvent::new(Some(actor), action, detail);
        if let Err(err) = self.store.record_audit(&event).await {
            tracing::error!("failed to write audit event {action}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::{NewUser, UserStore};
    use crate::domain::Role;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn setup() -> (MemoryStore, AccountService, SellerAccount) {
        let store = MemoryStore::new();
        let (_, account) = store
            .create_seller(
                NewUser {
                    email: "seller@example.com",
                    password_hash: "hash",
                    full_name: None,
                    role: Role::Seller,
                },
                "50000005",
            )
            .await
            .unwrap();
        let service = AccountService::new(Arc::new(store.clone()), TransferSigner::new("secret"));
        (store, service, account)
    }

    #[tokio::test]
    async fn credit_raises_balance_and_total_received() {
        let (store, service, account) = setup().await;
        let admin = Uuid::new_v4();
        let entry = service
            .credit(admin, "50000005", dec!(80.25), Some("order 42".into()))
            .await
            .unwrap();
        assert_eq!(entry.kind, EntryKind::Credit);
        let stored = store.account(account.id).await.unwrap();
        assert_eq!(stored.balance, dec!(80.25));
        assert_eq!(stored.total_received, dec!(80.25));

        let statement = service.statement(account.seller_id).await.unwrap();
        assert_eq!(statement.len(), 1);
        let detail = service.entry(account.seller_id, entry.id).await.unwrap();
        assert_eq!(detail.signature_valid, None);

        assert!(matches!(
            service.credit(admin, "50000005", dec!(-1), None).await,
            Err(AccountError::InvalidAmount)
        ));
        assert!(matches!(
            service.credit(admin, "00000000", dec!(1), None).await,
            Err(AccountError::AccountNotFound)
        ));
    }

    #[tokio::test]
    async fn credits_are_capped_at_the_balance_limit() {
        let (store, service, account) = setup().await;
        let admin = Uuid::new_v4();
        assert!(matches!(
            service.credit(admin, "50000005", Decimal::MAX, None).await,
            Err(AccountError::BalanceLimit(_))
        ));

        service
            .credit(admin, "50000005", max_balance() - dec!(10), None)
            .await
            .unwrap();
        assert!(matches!(
            service.credit(admin, "50000005", dec!(10.01), None).await,
            Err(AccountError::BalanceLimit(_))
        ));
        let stored = store.account(account.id).await.unwrap();
        assert_eq!(stored.balance, max_balance() - dec!(10));
        assert_eq!(service.statement(account.seller_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lock_and_unlock() {
        let (_, service, _) = setup().await;
        let admin = Uuid::new_v4();
        let until = Utc::now() + Duration::hours(2);
        let locked = service.lock(admin, "50000005", Some(until)).await.unwrap();
        assert!(locked.is_locked());

        let past = Utc::now() - Duration::hours(2);
        assert!(matches!(
            service.lock(admin, "50000005", Some(past)).await,
            Err(AccountError::InvalidLockExpiry)
        ));

        let unlocked = service.unlock(admin, "50000005").await.unwrap();
        assert!(!unlocked.is_locked());
        assert_eq!(unlocked.locked_until, None);
    }
}
