use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AccountStore, AuditStore, NewUser, OrderStore, StoreError, StoreResult, TransferOutcome,
    TransferPlan, UserStore, WithdrawalStore,
};
use crate::domain::{
    max_balance, AccountStatus, AccountTransaction, AuditAction, AuditEvent, DropshipItem,
    EntryKind, SellerAccount, User, Withdrawal, WithdrawalStatus,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<String, (Uuid, DateTime<Utc>)>,
    accounts: HashMap<Uuid, SellerAccount>,
    entries: Vec<AccountTransaction>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    order_items: Vec<DropshipItem>,
    audit: Vec<AuditEvent>,
}

impl MemoryState {
    fn account_mut(&mut self, account_id: Uuid) -> StoreResult<&mut SellerAccount> {
        self.accounts.get_mut(&account_id).ok_or(StoreError::NotFound)
    }

    /// Applies one ledger movement to an account and appends its entry.
    fn post_entry(
        &mut self,
        account_id: Uuid,
        kind: EntryKind,
        amount: Decimal,
        reference_id: Uuid,
        description: Option<String>,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<AccountTransaction> {
        let account = self.account_mut(account_id)?;
        if kind.is_debit() && account.balance < amount {
            return Err(StoreError::InsufficientFunds);
        }
        let entry = AccountTransaction::record(
            account_id,
            kind,
            amount,
            account.balance,
            reference_id,
            description,
            metadata,
            at,
        )
        .ok_or(StoreError::BalanceLimit)?;
        account.balance = entry.balance_after;
        account.updated_at = at;
        self.entries.push(entry.clone());
        Ok(entry)
    }
}

/// Process-local store. All operations serialize on one lock, which gives
/// every multi-record update the same all-or-nothing behaviour as a database transaction.
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order_item(&self, item: DropshipItem) {
        self.state.lock().await.order_items.push(item);
    }

    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.state.lock().await.audit.clone()
    }

    pub async fn account(&self, account_id: Uuid) -> Option<SellerAccount> {
        self.state.lock().await.accounts.get(&account_id).cloned()
    }
}

fn build_user(user: NewUser<'_>) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        email: user.email.to_string(),
        password_hash: user.password_hash.to_string(),
        full_name: user.full_name.map(str::to_string),
        role: user.role,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser<'_>) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email"));
        }
        let user = build_user(user);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_seller(
        &self,
        user: NewUser<'_>,
        account_number: &str,
    ) -> StoreResult<(User, SellerAccount)> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email"));
        }
        if state
            .accounts
            .values()
            .any(|a| a.account_number == account_number)
        {
            return Err(StoreError::Conflict("account_number"));
        }
        let user = build_user(user);
        let account = SellerAccount::new(user.id, account_number.to_string());
        state.users.insert(user.id, user.clone());
        state.accounts.insert(account.id, account.clone());
        Ok((user, account))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state
            .refresh_tokens
            .insert(token.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn verify_refresh_token(&self, token: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        let now = Utc::now();
        Ok(state
            .refresh_tokens
            .get(token)
            .filter(|(_, expires_at)| *expires_at > now)
            .and_then(|(user_id, _)| state.users.get(user_id).cloned()))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn account_by_seller(&self, seller_id: Uuid) -> StoreResult<Option<SellerAccount>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.seller_id == seller_id)
            .cloned())
    }

    async fn account_by_number(&self, number: &str) -> StoreResult<Option<SellerAccount>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.account_number == number)
            .cloned())
    }

    async fn set_lock(
        &self,
        account_id: Uuid,
        status: AccountStatus,
        locked_until: Option<DateTime<Utc>>,
    ) -> StoreResult<SellerAccount> {
        let mut state = self.state.lock().await;
        let account = state.account_mut(account_id)?;
        account.status = status;
        account.locked_until = locked_until;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn outgoing_transfers_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Decimal> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| {
                e.account_id == account_id
                    && e.kind == EntryKind::TransferOut
                    && e.created_at >= since
            })
            .map(|e| e.amount)
            .sum())
    }

    async fn execute_transfer(&self, plan: &TransferPlan) -> StoreResult<TransferOutcome> {
        let mut state = self.state.lock().await;

        // fresh read under the lock, the plan's snapshot may be stale
        let source_balance = state.account_mut(plan.source.id)?.balance;
        let destination_balance = state.account_mut(plan.destination.id)?.balance;
        if source_balance < plan.amount {
            return Err(StoreError::InsufficientFunds);
        }
        // both sides must post or neither does
        if EntryKind::TransferIn
            .apply(destination_balance, plan.amount)
            .is_none()
        {
            return Err(StoreError::BalanceLimit);
        }

        let debit = state.post_entry(
            plan.source.id,
            EntryKind::TransferOut,
            plan.amount,
            plan.reference_id,
            plan.description.clone(),
            plan.metadata_for(EntryKind::TransferOut),
            plan.signed_at,
        )?;
        let credit = state.post_entry(
            plan.destination.id,
            EntryKind::TransferIn,
            plan.amount,
            plan.reference_id,
            plan.description.clone(),
            plan.metadata_for(EntryKind::TransferIn),
            plan.signed_at,
        )?;
        Ok(TransferOutcome { debit, credit })
    }

    async fn credit_account(
        &self,
        account_id: Uuid,
        amount: Decimal,
        reference_id: Uuid,
        description: Option<String>,
    ) -> StoreResult<AccountTransaction> {
        let mut state = self.state.lock().await;
        let total_received = state
            .account_mut(account_id)?
            .total_received
            .checked_add(amount)
            .filter(|total| *total <= max_balance())
            .ok_or(StoreError::BalanceLimit)?;
        let entry = state.post_entry(
            account_id,
            EntryKind::Credit,
            amount,
            reference_id,
            description,
            serde_json::Value::Null,
            Utc::now(),
        )?;
        state.account_mut(account_id)?.total_received = total_received;
        Ok(entry)
    }

    async fn entries(&self, account_id: Uuid) -> StoreResult<Vec<AccountTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn entry(
        &self,
        account_id: Uuid,
        entry_id: Uuid,
    ) -> StoreResult<Option<AccountTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .find(|e| e.account_id == account_id && e.id == entry_id)
            .cloned())
    }
}

#[async_trait]
impl WithdrawalStore for MemoryStore {
    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state
            .withdrawals
            .values()
            .any(|w| w.seller_id == withdrawal.seller_id && w.status.is_in_flight())
        {
            return Err(StoreError::Conflict("withdrawal"));
        }
        state.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(())
    }

    async fn withdrawal(&self, id: Uuid) -> StoreResult<Option<Withdrawal>> {
        Ok(self.state.lock().await.withdrawals.get(&id).cloned())
    }

    async fn withdrawals_by_seller(&self, seller_id: Uuid) -> StoreResult<Vec<Withdrawal>> {
        let state = self.state.lock().await;
        let mut found: Vec<_> = state
            .withdrawals
            .values()
            .filter(|w| w.seller_id == seller_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn withdrawals_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> StoreResult<Vec<Withdrawal>> {
        let state = self.state.lock().await;
        let mut found: Vec<_> = state
            .withdrawals
            .values()
            .filter(|w| w.status == status)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn has_withdrawal_in_flight(&self, seller_id: Uuid) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .withdrawals
            .values()
            .any(|w| w.seller_id == seller_id && w.status.is_in_flight()))
    }

    async fn approve_withdrawal(
        &self,
        id: Uuid,
        reviewer: Uuid,
        reference_id: Uuid,
    ) -> StoreResult<(Withdrawal, AccountTransaction)> {
        let mut state = self.state.lock().await;
        let withdrawal = state.withdrawals.get(&id).cloned().ok_or(StoreError::NotFound)?;
        if !withdrawal.status.can_transition_to(WithdrawalStatus::Approved) {
            return Err(StoreError::InvalidTransition {
                current: withdrawal.status,
            });
        }
        let entry = state.post_entry(
            withdrawal.account_id,
            EntryKind::Withdrawal,
            withdrawal.amount,
            reference_id,
            Some(format!("withdrawal {}", withdrawal.id)),
            serde_json::json!({ "withdrawal_id": withdrawal.id }),
            Utc::now(),
        )?;
        let stored = state.withdrawals.get_mut(&id).ok_or(StoreError::NotFound)?;
        stored.status = WithdrawalStatus::Approved;
        stored.reviewed_by = Some(reviewer);
        stored.ledger_reference = Some(reference_id);
        stored.updated_at = entry.created_at;
        Ok((stored.clone(), entry))
    }

    async fn fail_withdrawal(
        &self,
        id: Uuid,
        reviewer: Uuid,
        reason: &str,
        reference_id: Uuid,
    ) -> StoreResult<(Withdrawal, AccountTransaction)> {
        let mut state = self.state.lock().await;
        let withdrawal = state.withdrawals.get(&id).cloned().ok_or(StoreError::NotFound)?;
        if !withdrawal.status.can_transition_to(WithdrawalStatus::Failed) {
            return Err(StoreError::InvalidTransition {
                current: withdrawal.status,
            });
        }
        let entry = state.post_entry(
            withdrawal.account_id,
            EntryKind::WithdrawalRefund,
            withdrawal.amount,
            reference_id,
            Some(format!("refund of withdrawal {}", withdrawal.id)),
            serde_json::json!({ "withdrawal_id": withdrawal.id, "reason": reason }),
            Utc::now(),
        )?;
        let stored = state.withdrawals.get_mut(&id).ok_or(StoreError::NotFound)?;
        stored.status = WithdrawalStatus::Failed;
        stored.reviewed_by = Some(reviewer);
        stored.note = Some(reason.to_string());
        stored.updated_at = entry.created_at;
        Ok((stored.clone(), entry))
    }

    async fn transition_withdrawal(
        &self,
        id: Uuid,
        to: WithdrawalStatus,
        reviewer: Uuid,
        note: Option<&str>,
    ) -> StoreResult<Withdrawal> {
        let mut state = self.state.lock().await;
        let stored = state.withdrawals.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !stored.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                current: stored.status,
            });
        }
        stored.status = to;
        stored.reviewed_by = Some(reviewer);
        if let Some(note) = note {
            stored.note = Some(note.to_string());
        }
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn encumbered_supplier_cost(&self, seller_id: Uuid) -> StoreResult<Decimal> {
        let state = self.state.lock().await;
        Ok(state
            .order_items
            .iter()
            .filter(|item| item.seller_id == seller_id && item.encumbers_balance())
            .map(|item| item.supplier_cost)
            .sum())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn record_audit(&self, event: &AuditEvent) -> StoreResult<()> {
        self.state.lock().await.audit.push(event.clone());
        Ok(())
    }

    async fn count_audit_since(
        &self,
        actor: Uuid,
        action: AuditAction,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .audit
            .iter()
            .filter(|e| e.actor == Some(actor) && e.action == action && e.created_at >= since)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FulfilmentKind, OrderStatus, Role};
    use rust_decimal_macros::dec;

    async fn seller(store: &MemoryStore, email: &str, number: &str) -> SellerAccount {
        let (_, account) = store
            .create_seller(
                NewUser {
                    email,
                    password_hash: "hash",
                    full_name: None,
                    role: Role::Seller,
                },
                number,
            )
            .await
            .unwrap();
        account
    }

    fn plan(source: &SellerAccount, destination: &SellerAccount, amount: Decimal) -> TransferPlan {
        TransferPlan {
            reference_id: Uuid::new_v4(),
            source: source.clone(),
            destination: destination.clone(),
            amount,
            description: None,
            signature: "sig".into(),
            signed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn transfer_moves_balance_and_shares_reference() {
        let store = MemoryStore::new();
        let a = seller(&store, "a@example.com", "10000001").await;
        let b = seller(&store, "b@example.com", "10000002").await;
        store
            .credit_account(a.id, dec!(150), Uuid::new_v4(), None)
            .await
            .unwrap();

        let outcome = store.execute_transfer(&plan(&a, &b, dec!(100))).await.unwrap();
        assert_eq!(outcome.debit.reference_id, outcome.credit.reference_id);
        assert_eq!(outcome.debit.balance_after, dec!(50));
        assert_eq!(outcome.credit.balance_after, dec!(100));
        assert_eq!(store.account(a.id).await.unwrap().balance, dec!(50));
        assert_eq!(store.account(b.id).await.unwrap().balance, dec!(100));
    }

    #[tokio::test]
    async fn overdraw_leaves_state_untouched() {
        let store = MemoryStore::new();
        let a = seller(&store, "a@example.com", "10000001").await;
        let b = seller(&store, "b@example.com", "10000002").await;
        store
            .credit_account(a.id, dec!(150), Uuid::new_v4(), None)
            .await
            .unwrap();

        let err = store
            .execute_transfer(&plan(&a, &b, dec!(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds));
        assert_eq!(store.account(a.id).await.unwrap().balance, dec!(150));
        assert_eq!(store.account(b.id).await.unwrap().balance, dec!(0));
        assert_eq!(store.entries(b.id).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn full_accounts_refuse_credits_and_transfers() {
        let store = MemoryStore::new();
        let a = seller(&store, "a@example.com", "10000001").await;
        let b = seller(&store, "b@example.com", "10000002").await;
        store
            .credit_account(a.id, dec!(150), Uuid::new_v4(), None)
            .await
            .unwrap();
        store
            .credit_account(b.id, max_balance(), Uuid::new_v4(), None)
            .await
            .unwrap();

        let err = store
            .credit_account(b.id, dec!(0.01), Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BalanceLimit));

        let err = store
            .execute_transfer(&plan(&a, &b, dec!(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BalanceLimit));
        assert_eq!(store.account(a.id).await.unwrap().balance, dec!(150));
        assert_eq!(store.entries(a.id).await.unwrap().len(), 1);
        assert_eq!(store.account(b.id).await.unwrap().balance, max_balance());
    }

    #[tokio::test]
    async fn duplicate_account_number_is_rejected() {
        let store = MemoryStore::new();
        seller(&store, "a@example.com", "10000001").await;
        let err = store
            .create_seller(
                NewUser {
                    email: "b@example.com",
                    password_hash: "hash",
                    full_name: None,
                    role: Role::Seller,
                },
                "10000001",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict("account_number")));
    }

    #[tokio::test]
    async fn encumbered_cost_sums_open_drop_items() {
        let store = MemoryStore::new();
        let seller_id = Uuid::new_v4();
        for (status, kind, cost) in [
            (OrderStatus::Paid, FulfilmentKind::Drop, dec!(30)),
            (OrderStatus::Shipped, FulfilmentKind::Drop, dec!(12.5)),
            (OrderStatus::Delivered, FulfilmentKind::Drop, dec!(100)),
            (OrderStatus::Paid, FulfilmentKind::Own, dec!(100)),
        ] {
            store
                .insert_order_item(DropshipItem {
                    id: Uuid::new_v4(),
                    seller_id,
                    order_status: status,
                    fulfilment: kind,
                    supplier_cost: cost,
                })
                .await;
        }
        assert_eq!(
            store.encumbered_supplier_cost(seller_id).await.unwrap(),
            dec!(42.5)
        );
    }
}
