use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::{AccountStore, AuditStore, Store, StoreError, TransferPlan};
use crate::domain::{account::is_valid_account_number, AccountTransaction, AuditAction, AuditEvent};
use crate::security::{mask::mask_account, RateLimiter, SuspicionPolicy, TransferSigner};

const MAX_DESCRIPTION_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct TransferLimits {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub daily_limit: Decimal,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            min_amount: Decimal::ONE,
            max_amount: Decimal::new(50_000, 0),
            daily_limit: Decimal::new(100_000, 0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub destination_account: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferRequest {
    /// Reads a request out of an arbitrary JSON body, naming every field
    /// that is missing or of the wrong type.
    pub fn from_json(body: serde_json::Value) -> Result<Self, Vec<&'static str>> {
        let serde_json::Value::Object(mut body) = body else {
            return Err(vec!["body"]);
        };
        let mut fields = Vec::new();
        let destination_account = match body.remove("destination_account") {
            Some(serde_json::Value::String(number)) => number,
            _ => {
                fields.push("destination_account");
                String::new()
            }
        };
        let amount = match body.remove("amount").map(serde_json::from_value::<Decimal>) {
            Some(Ok(amount)) => amount,
            _ => {
                fields.push("amount");
                Decimal::ZERO
            }
        };
        let description = match body.remove("description") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(description)) => Some(description),
            Some(_) => {
                fields.push("description");
                None
            }
        };
        if !fields.is_empty() {
            return Err(fields);
        }
        Ok(Self {
            destination_account,
            amount,
            description,
        })
    }

    fn invalid_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if !is_valid_account_number(self.destination_account.trim()) {
            fields.push("destination_account");
        }
        if self.amount <= Decimal::ZERO || self.amount.normalize().scale() > 2 {
            fields.push("amount");
        }
        if self
            .description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
        {
            fields.push("description");
        }
        fields
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub reference_id: Uuid,
    pub from_account: String,
    pub to_account: String,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub signature: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("too many transfer attempts, try again later")]
    RateLimited,
    #[error("invalid transfer payload")]
    Validation(Vec<&'static str>),
    #[error("amount must be between {min} and {max}")]
    AmountOutOfBounds { min: Decimal, max: Decimal },
    #[error("source account not found")]
    SourceNotFound,
    #[error("account is locked")]
    AccountLocked { until: Option<DateTime<Utc>> },
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("daily transfer limit of {limit} exceeded, {used} already transferred today")]
    DailyLimitExceeded { limit: Decimal, used: Decimal },
    #[error("transfer blocked for review: {0}")]
    Suspicious(String),
    #[error("destination account not found")]
    DestinationNotFound,
    #[error("destination account is not active")]
    DestinationInactive,
    #[error("cannot transfer to the same account")]
    SelfTransfer,
    #[error("destination account cannot receive this amount")]
    DestinationLimit,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransferError {
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::RateLimited => "rate_limited",
            TransferError::Validation(_) => "validation",
            TransferError::AmountOutOfBounds { .. } => "amount_out_of_bounds",
            TransferError::SourceNotFound => "source_not_found",
            TransferError::AccountLocked { .. } => "account_locked",
            TransferError::InsufficientBalance => "insufficient_balance",
            TransferError::DailyLimitExceeded { .. } => "daily_limit",
            TransferError::Suspicious(_) => "suspicious",
            TransferError::DestinationNotFound => "destination_not_found",
            TransferError::DestinationInactive => "destination_inactive",
            TransferError::SelfTransfer => "self_transfer",
            TransferError::DestinationLimit => "destination_limit",
            TransferError::Store(_) => "store",
        }
    }
}

/// Seller to seller balance transfers.
pub struct TransferService {
    store: Arc<dyn Store>,
    signer: TransferSigner,
    limiter: RateLimiter<Uuid>,
    limits: TransferLimits,
    suspicion: SuspicionPolicy,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn Store>,
        signer: TransferSigner,
        limiter: RateLimiter<Uuid>,
        limits: TransferLimits,
        suspicion: SuspicionPolicy,
    ) -> Self {
        Self {
            store,
            signer,
            limiter,
            limits,
            suspicion,
        }
    }

    /// Forgets rate-limit windows of sellers that have gone quiet.
    pub fn purge_rate_limits(&self) {
        self.limiter.purge();
    }

    /// Runs every check in order, then applies the transfer atomically.
    /// Each outcome lands in the audit log.
    pub async fn transfer(
        &self,
        seller_id: Uuid,
        req: TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        self.admit(seller_id, json!({ "amount": req.amount })).await?;

        match self.validate_and_apply(seller_id, &req).await {
            Ok(receipt) => {
                tracing::info!(
                    "transfer {} of {} from {} to {} completed",
                    receipt.reference_id,
                    receipt.amount,
                    mask_account(&receipt.from_account),
                    mask_account(&receipt.to_account)
                );
                self.audit(
                    seller_id,
                    AuditAction::TransferSucceeded,
                    json!({
                        "reference_id": receipt.reference_id,
                        "to_account": mask_account(&receipt.to_account),
                        "amount": receipt.amount,
                    }),
                )
                .await;
                Ok(receipt)
            }
            Err(err) => {
                match &err {
                    TransferError::Store(store_err) => {
                        tracing::error!("transfer by seller {seller_id} failed: {store_err}")
                    }
                    other => tracing::warn!("transfer by seller {seller_id} rejected: {other}"),
                }
                let action = match err {
                    TransferError::Suspicious(_) => AuditAction::TransferSuspicious,
                    _ => AuditAction::TransferFailed,
                };
                self.audit(
                    seller_id,
                    action,
                    json!({
                        "reason": err.code(),
                        "to_account": mask_account(req.destination_account.trim()),
                        "amount": req.amount,
                    }),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Settles an attempt whose payload could not be read. It passes the
    /// limiter and is audited as a failure like any other rejected transfer.
    pub async fn reject_malformed(
        &self,
        seller_id: Uuid,
        fields: Vec<&'static str>,
    ) -> TransferError {
        if let Err(err) = self.admit(seller_id, json!({ "fields": fields })).await {
            return err;
        }
        tracing::warn!("transfer by seller {seller_id} rejected: unreadable {fields:?}");
        self.audit(
            seller_id,
            AuditAction::TransferFailed,
            json!({ "reason": "validation", "fields": fields }),
        )
        .await;
        TransferError::Validation(fields)
    }

    async fn admit(&self, seller_id: Uuid, detail: serde_json::Value) -> Result<(), TransferError> {
        if self.limiter.check(&seller_id) {
            return Ok(());
        }
        tracing::warn!("transfer rate limit hit by seller: {seller_id}");
        self.audit(seller_id, AuditAction::TransferRateLimited, detail).await;
        Err(TransferError::RateLimited)
    }

    async fn validate_and_apply(
        &self,
        seller_id: Uuid,
        req: &TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        let invalid = req.invalid_fields();
        if !invalid.is_empty() {
            return Err(TransferError::Validation(invalid));
        }

        let amount = req.amount;
        if amount < self.limits.min_amount || amount > self.limits.max_amount {
            return Err(TransferError::AmountOutOfBounds {
                min: self.limits.min_amount,
                max: self.limits.max_amount,
            });
        }

        let now = Utc::now();
        let source = self
            .store
            .account_by_seller(seller_id)
            .await?
            .ok_or(TransferError::SourceNotFound)?;
        if source.is_locked_at(now) {
            return Err(TransferError::AccountLocked {
                until: source.locked_until,
            });
        }

        if source.balance < amount {
            return Err(TransferError::InsufficientBalance);
        }

        let start_of_day = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let used = self
            .store
            .outgoing_transfers_since(source.id, start_of_day)
            .await?;
        if used + amount > self.limits.daily_limit {
            return Err(TransferError::DailyLimitExceeded {
                limit: self.limits.daily_limit,
                used,
            });
        }

        if let Some(suspicion) = self.suspicion.assess(self.store.as_ref(), seller_id).await? {
            return Err(TransferError::Suspicious(suspicion.reason()));
        }

        let destination = self
            .store
            .account_by_number(req.destination_account.trim())
            .await?
            .ok_or(TransferError::DestinationNotFound)?;
        if destination.id == source.id {
            return Err(TransferError::SelfTransfer);
        }
        if destination.is_locked_at(now) {
            return Err(TransferError::DestinationInactive);
        }

        let reference_id = Uuid::new_v4();
        let signature = self.signer.sign(
            reference_id,
            &source.account_number,
            &destination.account_number,
            amount,
            now,
        );
        let plan = TransferPlan {
            reference_id,
            source,
            destination,
            amount,
            description: req.description.clone(),
            signature,
            signed_at: now,
        };

        let outcome = self
            .store
            .execute_transfer(&plan)
            .await
            .map_err(|err| match err {
                StoreError::InsufficientFunds => TransferError::InsufficientBalance,
                StoreError::BalanceLimit => TransferError::DestinationLimit,
                other => TransferError::Store(other),
            })?;

        Ok(TransferReceipt {
            reference_id,
            from_account: plan.source.account_number,
            to_account: plan.destination.account_number,
            amount,
            balance_after: outcome.debit.balance_after,
            signature: plan.signature,
            created_at: outcome.debit.created_at,
        })
    }

    /// Whether a ledger entry's stored signature matches its contents.
    pub fn verify(&self, entry: &AccountTransaction) -> bool {
        self.signer.verify_entry(entry)
    }

    async fn audit(&self, actor: Uuid, action: AuditAction, detail: serde_json::Value) {
        let event = AuditEvent::new(Some(actor), action, detail);
        if let Err(err) = self.store.record_audit(&event).await {
            tracing::error!("failed to write audit event {action}: {err}");
        }
    }
}
