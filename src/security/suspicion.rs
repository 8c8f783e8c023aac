use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::db::{AuditStore, StoreResult};
use crate::domain::AuditAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspicion {
    RepeatedFailures(i64),
    TooManyTransfers(i64),
}

impl Suspicion {
    pub fn reason(&self) -> String {
        match self {
            Suspicion::RepeatedFailures(n) => format!("{n} failed transfers in the last hour"),
            Suspicion::TooManyTransfers(n) => format!("{n} transfers in a short period"),
        }
    }
}

/// Heuristics over the audit log that flag an account for manual review.
#[derive(Debug, Clone)]
pub struct SuspicionPolicy {
    pub max_failed_attempts: i64,
    pub failure_window: Duration,
    pub max_transfers: i64,
    pub burst_window: Duration,
}

impl Default for SuspicionPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            failure_window: Duration::hours(1),
            max_transfers: 10,
            burst_window: Duration::minutes(10),
        }
    }
}

impl SuspicionPolicy {
    pub async fn assess<A: AuditStore + ?Sized>(
        &self,
        audit: &A,
        actor: Uuid,
    ) -> StoreResult<Option<Suspicion>> {
        let now = Utc::now();
        let failures = audit
            .count_audit_since(actor, AuditAction::TransferFailed, now - self.failure_window)
            .await?;
        if failures >= self.max_failed_attempts {
            return Ok(Some(Suspicion::RepeatedFailures(failures)));
        }
        let recent = audit
            .count_audit_since(actor, AuditAction::TransferSucceeded, now - self.burst_window)
            .await?;
        if recent >= self.max_transfers {
            return Ok(Some(Suspicion::TooManyTransfers(recent)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::domain::AuditEvent;

    #[tokio::test]
    async fn flags_repeated_failures() {
        let store = MemoryStore::new();
        let actor = Uuid::new_v4();
        let policy = SuspicionPolicy {
            max_failed_attempts: 3,
            ..Default::default()
        };
        for _ in 0..2 {
            store
                .record_audit(&AuditEvent::new(
                    Some(actor),
                    AuditAction::TransferFailed,
                    serde_json::Value::Null,
                ))
                .await
                .unwrap();
        }
        assert_eq!(policy.assess(&store, actor).await.unwrap(), None);

        store
            .record_audit(&AuditEvent::new(
                Some(actor),
                AuditAction::TransferFailed,
                serde_json::Value::Null,
            ))
            .await
            .unwrap();
        assert_eq!(
            policy.assess(&store, actor).await.unwrap(),
            Some(Suspicion::RepeatedFailures(3))
        );
        assert_eq!(policy.assess(&store, Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn flags_transfer_bursts() {
        let store = MemoryStore::new();
        let actor = Uuid::new_v4();
        let policy = SuspicionPolicy::default();
        for _ in 0..policy.max_transfers - 1 {
            store
                .record_audit(&AuditEvent::new(
                    Some(actor),
                    AuditAction::TransferSucceeded,
                    serde_json::Value::Null,
                ))
                .await
                .unwrap();
        }
        assert_eq!(policy.assess(&store, actor).await.unwrap(), None);

        store
            .record_audit(&AuditEvent::new(
                Some(actor),
                AuditAction::TransferSucceeded,
                serde_json::Value::Null,
            ))
            .await
            .unwrap();
        assert_eq!(
            policy.assess(&store, actor).await.unwrap(),
            Some(Suspicion::TooManyTransfers(10))
        );
        assert_eq!(policy.assess(&store, Uuid::new_v4()).await.unwrap(), None);
    }
}
