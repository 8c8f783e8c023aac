use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgRow, PgConnection, PgPool, Row};
use uuid::Uuid;

use super::{
    AccountStore, AuditStore, NewUser, OrderStore, StoreError, StoreResult, TransferOutcome,
    TransferPlan, UserStore, WithdrawalStore,
};
use crate::domain::{
    AccountStatus, AccountTransaction, AuditAction, AuditEvent, EntryKind, OrderStatus,
    SellerAccount, User, Withdrawal, WithdrawalStatus,
};

const ACCOUNT_COLUMNS: &str = "id, seller_id, account_number, balance, total_received, status, \
     locked_until, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, account_id, kind, amount, balance_before, balance_after, \
     reference_id, status, description, metadata, created_at";
const WITHDRAWAL_COLUMNS: &str = "id, seller_id, account_id, amount, payout, status, reviewed_by, \
     note, ledger_reference, created_at, updated_at";

// Database repository
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        full_name: row.try_get("full_name")?,
        role: row.try_get::<String, _>("role")?.parse()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn account_from_row(row: &PgRow) -> StoreResult<SellerAccount> {
    Ok(SellerAccount {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        account_number: row.try_get("account_number")?,
        balance: row.try_get("balance")?,
        total_received: row.try_get("total_received")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        locked_until: row.try_get("locked_until")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> StoreResult<AccountTransaction> {
    Ok(AccountTransaction {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        kind: row.try_get::<String, _>("kind")?.parse()?,
        amount: row.try_get("amount")?,
        balance_before: row.try_get("balance_before")?,
        balance_after: row.try_get("balance_after")?,
        reference_id: row.try_get("reference_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        description: row.try_get("description")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn withdrawal_from_row(row: &PgRow) -> StoreResult<Withdrawal> {
    Ok(Withdrawal {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        payout: serde_json::from_value(row.try_get("payout")?)?,
        status: row.try_get::<String, _>("status")?.parse()?,
        reviewed_by: row.try_get("reviewed_by")?,
        note: row.try_get("note")?,
        ledger_reference: row.try_get("ledger_reference")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Maps unique-constraint violations to `Conflict`, naming the offending field.
fn map_unique(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some(c) if c.contains("email") => "email",
                Some(c) if c.contains("account_number") => "account_number",
                Some(c) if c.contains("in_flight") => "withdrawal",
                _ => "unique",
            };
            return StoreError::Conflict(field);
        }
    }
    StoreError::Database(err)
}

async fn insert_user(conn: &mut PgConnection, user: NewUser<'_>) -> StoreResult<User> {
    let row = sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, email, password_hash, full_name, role, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.full_name)
    .bind(user.role.as_str())
    .fetch_one(conn)
    .await
    .map_err(map_unique)?;
    user_from_row(&row)
}

async fn insert_entry(conn: &mut PgConnection, entry: &AccountTransaction) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO seller_account_transactions
            (id, account_id, kind, amount, balance_before, balance_after,
             reference_id, status, description, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(entry.id)
    .bind(entry.account_id)
    .bind(entry.kind.as_str())
    .bind(entry.amount)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(entry.reference_id)
    .bind(entry.status.as_str())
    .bind(entry.description.as_deref())
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn set_balance(
    conn: &mut PgConnection,
    account_id: Uuid,
    balance: Decimal,
    received_delta: Decimal,
    at: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        "UPDATE seller_accounts SET balance = $1, total_received = total_received + $2, updated_at = $3 WHERE id = $4",
    )
    .bind(balance)
    .bind(received_delta)
    .bind(at)
    .bind(account_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn locked_balance(conn: &mut PgConnection, account_id: Uuid) -> StoreResult<Decimal> {
    let row = sqlx::query("SELECT balance FROM seller_accounts WHERE id = $1 FOR UPDATE")
        .bind(account_id)
        .fetch_optional(conn)
        .await?
        .ok_or(StoreError::NotFound)?;
    Ok(row.try_get("balance")?)
}

async fn locked_withdrawal(conn: &mut PgConnection, id: Uuid) -> StoreResult<Withdrawal> {
    let row = sqlx::query(&format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(StoreError::NotFound)?;
    withdrawal_from_row(&row)
}

async fn update_withdrawal(conn: &mut PgConnection, w: &Withdrawal) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE withdrawals
        SET status = $1, reviewed_by = $2, note = $3, ledger_reference = $4, updated_at = $5
        WHERE id = $6
        "#,
    )
    .bind(w.status.as_str())
    .bind(w.reviewed_by)
    .bind(w.note.as_deref())
    .bind(w.ledger_reference)
    .bind(w.updated_at)
    .bind(w.id)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser<'_>) -> StoreResult<User> {
        let mut conn = self.pool.acquire().await?;
        insert_user(&mut conn, user).await
    }

    async fn create_seller(
        &self,
        user: NewUser<'_>,
        account_number: &str,
    ) -> StoreResult<(User, SellerAccount)> {
        let mut tx = self.pool.begin().await?;
        let user = insert_user(&mut tx, user).await?;
        let account = SellerAccount::new(user.id, account_number.to_string());
        sqlx::query(
            r#"
            INSERT INTO seller_accounts (id, seller_id, account_number, balance, total_received, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id)
        .bind(account.seller_id)
        .bind(&account.account_number)
        .bind(account.balance)
        .bind(account.total_received)
        .bind(account.status.as_str())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_unique)?;
        tx.commit().await?;
        Ok((user, account))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query(
            r#"
            SELECT id, email, password_hash, full_name, role, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| user_from_row(&row))
        .transpose()
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn verify_refresh_token(&self, token: &str) -> StoreResult<Option<User>> {
        sqlx::query(
            r#"
            SELECT u.id, u.email, u.password_hash, u.full_name, u.role, u.created_at, u.updated_at
            FROM users u
            INNER JOIN refresh_tokens rt ON rt.user_id = u.id
            WHERE rt.token = $1 AND rt.expires_at > CURRENT_TIMESTAMP
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| user_from_row(&row))
        .transpose()
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn account_by_seller(&self, seller_id: Uuid) -> StoreResult<Option<SellerAccount>> {
        sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM seller_accounts WHERE seller_id = $1"
        ))
        .bind(seller_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| account_from_row(&row))
        .transpose()
    }

    async fn account_by_number(&self, number: &str) -> StoreResult<Option<SellerAccount>> {
        sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM seller_accounts WHERE account_number = $1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| account_from_row(&row))
        .transpose()
    }

    async fn set_lock(
        &self,
        account_id: Uuid,
        status: AccountStatus,
        locked_until: Option<DateTime<Utc>>,
    ) -> StoreResult<SellerAccount> {
        let row = sqlx::query(&format!(
            "UPDATE seller_accounts SET status = $1, locked_until = $2, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $3 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(locked_until)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        account_from_row(&row)
    }

    async fn outgoing_transfers_since(
        &self,
        account_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total
            FROM seller_account_transactions
            WHERE account_id = $1 AND kind = $2 AND created_at >= $3
            "#,
        )
        .bind(account_id)
        .bind(EntryKind::TransferOut.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }

    async fn execute_transfer(&self, plan: &TransferPlan) -> StoreResult<TransferOutcome> {
        let mut tx = self.pool.begin().await?;

        // lock both rows in id order so opposite transfers cannot deadlock
        let rows = sqlx::query(
            "SELECT id, balance FROM seller_accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(vec![plan.source.id, plan.destination.id])
        .fetch_all(&mut *tx)
        .await?;

        let mut source_balance = None;
        let mut destination_balance = None;
        for row in &rows {
            let id: Uuid = row.try_get("id")?;
            let balance: Decimal = row.try_get("balance")?;
            if id == plan.source.id {
                source_balance = Some(balance);
            } else if id == plan.destination.id {
                destination_balance = Some(balance);
            }
        }
        let (Some(source_balance), Some(destination_balance)) =
            (source_balance, destination_balance)
        else {
            return Err(StoreError::NotFound);
        };

        if source_balance < plan.amount {
            return Err(StoreError::InsufficientFunds);
        }

        let debit = AccountTransaction::record(
            plan.source.id,
            EntryKind::TransferOut,
            plan.amount,
            source_balance,
            plan.reference_id,
            plan.description.clone(),
            plan.metadata_for(EntryKind::TransferOut),
            plan.signed_at,
        )
        .ok_or(StoreError::BalanceLimit)?;
        let credit = AccountTransaction::record(
            plan.destination.id,
            EntryKind::TransferIn,
            plan.amount,
            destination_balance,
            plan.reference_id,
            plan.description.clone(),
            plan.metadata_for(EntryKind::TransferIn),
            plan.signed_at,
        )
        .ok_or(StoreError::BalanceLimit)?;

        set_balance(&mut tx, plan.source.id, debit.balance_after, Decimal::ZERO, plan.signed_at)
            .await?;
        set_balance(
            &mut tx,
            plan.destination.id,
            credit.balance_after,
            Decimal::ZERO,
            plan.signed_at,
        )
        .await?;
        insert_entry(&mut tx, &debit).await?;
        insert_entry(&mut tx, &credit).await?;

        tx.commit().await?;
        Ok(TransferOutcome { debit, credit })
    }

    async fn credit_account(
        &self,
        account_id: Uuid,
        amount: Decimal,
        reference_id: Uuid,
        description: Option<String>,
    ) -> StoreResult<AccountTransaction> {
        let mut tx = self.pool.begin().await?;
        let balance = locked_balance(&mut tx, account_id).await?;
        let entry = AccountTransaction::record(
            account_id,
            EntryKind::Credit,
            amount,
            balance,
            reference_id,
            description,
            serde_json::Value::Null,
            Utc::now(),
        )
        .ok_or(StoreError::BalanceLimit)?;
        set_balance(&mut tx, account_id, entry.balance_after, amount, entry.created_at).await?;
        insert_entry(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn entries(&self, account_id: Uuid) -> StoreResult<Vec<AccountTransaction>> {
        sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM seller_account_transactions WHERE account_id = $1 ORDER BY created_at"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(entry_from_row)
        .collect()
    }

    async fn entry(
        &self,
        account_id: Uuid,
        entry_id: Uuid,
    ) -> StoreResult<Option<AccountTransaction>> {
        sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM seller_account_transactions WHERE id = $1 AND account_id = $2"
        ))
        .bind(entry_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| entry_from_row(&row))
        .transpose()
    }
}

#[async_trait]
impl WithdrawalStore for PgStore {
    async fn create_withdrawal(&self, w: &Withdrawal) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO withdrawals ({WITHDRAWAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(w.id)
        .bind(w.seller_id)
        .bind(w.account_id)
        .bind(w.amount)
        .bind(serde_json::to_value(&w.payout)?)
        .bind(w.status.as_str())
        .bind(w.reviewed_by)
        .bind(w.note.as_deref())
        .bind(w.ledger_reference)
        .bind(w.created_at)
        .bind(w.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique)?;
        Ok(())
    }

    async fn withdrawal(&self, id: Uuid) -> StoreResult<Option<Withdrawal>> {
        sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| withdrawal_from_row(&row))
        .transpose()
    }

    async fn withdrawals_by_seller(&self, seller_id: Uuid) -> StoreResult<Vec<Withdrawal>> {
        sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE seller_id = $1 ORDER BY created_at DESC"
        ))
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(withdrawal_from_row)
        .collect()
    }

    async fn withdrawals_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> StoreResult<Vec<Withdrawal>> {
        sqlx::query(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(withdrawal_from_row)
        .collect()
    }

    async fn has_withdrawal_in_flight(&self, seller_id: Uuid) -> StoreResult<bool> {
        let statuses: Vec<String> = WithdrawalStatus::IN_FLIGHT
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM withdrawals WHERE seller_id = $1 AND status = ANY($2)) AS found",
        )
        .bind(seller_id)
        .bind(statuses)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("found")?)
    }

    async fn approve_withdrawal(
        &self,
        id: Uuid,
        reviewer: Uuid,
        reference_id: Uuid,
    ) -> StoreResult<(Withdrawal, AccountTransaction)> {
        let mut tx = self.pool.begin().await?;
        let mut withdrawal = locked_withdrawal(&mut tx, id).await?;
        if !withdrawal.status.can_transition_to(WithdrawalStatus::Approved) {
            return Err(StoreError::InvalidTransition {
                current: withdrawal.status,
            });
        }
        let balance = locked_balance(&mut tx, withdrawal.account_id).await?;
        if balance < withdrawal.amount {
            return Err(StoreError::InsufficientFunds);
        }
        let entry = AccountTransaction::record(
            withdrawal.account_id,
            EntryKind::Withdrawal,
            withdrawal.amount,
            balance,
            reference_id,
            Some(format!("withdrawal {}", withdrawal.id)),
            serde_json::json!({ "withdrawal_id": withdrawal.id }),
            Utc::now(),
        )
        .ok_or(StoreError::BalanceLimit)?;
        set_balance(
            &mut tx,
            withdrawal.account_id,
            entry.balance_after,
            Decimal::ZERO,
            entry.created_at,
        )
        .await?;
        insert_entry(&mut tx, &entry).await?;

        withdrawal.status = WithdrawalStatus::Approved;
        withdrawal.reviewed_by = Some(reviewer);
        withdrawal.ledger_reference = Some(reference_id);
        withdrawal.updated_at = entry.created_at;
        update_withdrawal(&mut tx, &withdrawal).await?;

        tx.commit().await?;
        Ok((withdrawal, entry))
    }

    async fn fail_withdrawal(
        &self,
        id: Uuid,
        reviewer: Uuid,
        reason: &str,
        reference_id: Uuid,
    ) -> StoreResult<(Withdrawal, AccountTransaction)> {
        let mut tx = self.pool.begin().await?;
        let mut withdrawal = locked_withdrawal(&mut tx, id).await?;
        if !withdrawal.status.can_transition_to(WithdrawalStatus::Failed) {
            return Err(StoreError::InvalidTransition {
                current: withdrawal.status,
            });
        }
        let balance = locked_balance(&mut tx, withdrawal.account_id).await?;
        let entry = AccountTransaction::record(
            withdrawal.account_id,
            EntryKind::WithdrawalRefund,
            withdrawal.amount,
            balance,
            reference_id,
            Some(format!("refund of withdrawal {}", withdrawal.id)),
            serde_json::json!({ "withdrawal_id": withdrawal.id, "reason": reason }),
            Utc::now(),
        )
        .ok_or(StoreError::BalanceLimit)?;
        set_balance(
            &mut tx,
            withdrawal.account_id,
            entry.balance_after,
            Decimal::ZERO,
            entry.created_at,
        )
        .await?;
        insert_entry(&mut tx, &entry).await?;

        withdrawal.status = WithdrawalStatus::Failed;
        withdrawal.reviewed_by = Some(reviewer);
        withdrawal.note = Some(reason.to_string());
        withdrawal.updated_at = entry.created_at;
        update_withdrawal(&mut tx, &withdrawal).await?;

        tx.commit().await?;
        Ok((withdrawal, entry))
    }

    async fn transition_withdrawal(
        &self,
        id: Uuid,
        to: WithdrawalStatus,
        reviewer: Uuid,
        note: Option<&str>,
    ) -> StoreResult<Withdrawal> {
        let mut tx = self.pool.begin().await?;
        let mut withdrawal = locked_withdrawal(&mut tx, id).await?;
        if !withdrawal.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                current: withdrawal.status,
            });
        }
        withdrawal.status = to;
        withdrawal.reviewed_by = Some(reviewer);
        if let Some(note) = note {
            withdrawal.note = Some(note.to_string());
        }
        withdrawal.updated_at = Utc::now();
        update_withdrawal(&mut tx, &withdrawal).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn encumbered_supplier_cost(&self, seller_id: Uuid) -> StoreResult<Decimal> {
        let active: Vec<String> = OrderStatus::ACTIVE
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(supplier_cost), 0) AS total
            FROM order_items
            WHERE seller_id = $1 AND fulfilment = 'DROP' AND order_status = ANY($2)
            "#,
        )
        .bind(seller_id)
        .bind(active)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn record_audit(&self, event: &AuditEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, actor, action, detail, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id)
        .bind(event.actor)
        .bind(event.action.as_str())
        .bind(&event.detail)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_audit_since(
        &self,
        actor: Uuid,
        action: AuditAction,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM audit_logs WHERE actor = $1 AND action = $2 AND created_at >= $3",
        )
        .bind(actor)
        .bind(action.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }
}
