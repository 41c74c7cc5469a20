//! Record of work that succeeded on the ledger but not downstream.
//!
//! When a ledger commit lands and the follow-up step (mirror write, wallet
//! refund) fails, the caller still succeeds. The failed step is recorded
//! here so it stays observable and can be retried by reconciliation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use wayfare_types::{BookingId, IdempotencyKey, Money, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RepairTask {
    /// Re-read the booking from the ledger and upsert it into the mirror.
    #[serde(rename_all = "camelCase")]
    MirrorUpsert { booking_id: BookingId },
    /// Credit a wallet refund that did not go through. The key is the one
    /// the original attempt used, so a retry cannot pay twice.
    #[serde(rename_all = "camelCase")]
    Refund {
        user_id: UserId,
        booking_id: BookingId,
        amount: Money,
        idempotency_key: IdempotencyKey,
    },
}

impl RepairTask {
    /// Deduplication key: one pending mirror task per booking, one pending
    /// refund per wallet and idempotency key.
    pub fn key(&self) -> String {
        match self {
            Self::MirrorUpsert { booking_id } => format!("mirror:{booking_id}"),
            Self::Refund {
                user_id,
                idempotency_key,
                ..
            } => format!("refund:{user_id}:{idempotency_key}"),
        }
    }

    pub fn booking_id(&self) -> &BookingId {
        match self {
            Self::MirrorUpsert { booking_id } | Self::Refund { booking_id, .. } => booking_id,
        }
    }
}

impl fmt::Display for RepairTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MirrorUpsert { booking_id } => write!(f, "mirror upsert of {booking_id}"),
            Self::Refund {
                user_id,
                booking_id,
                amount,
                ..
            } => write!(f, "refund of {amount} to {user_id} for {booking_id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRepair {
    pub task: RepairTask,
    pub attempts: u32,
    pub last_error: String,
    pub first_recorded: DateTime<Utc>,
    pub last_recorded: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RepairLog {
    pending: Mutex<BTreeMap<String, PendingRepair>>,
}

impl RepairLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed step. A task already pending has its attempt count
    /// bumped instead of being duplicated.
    pub fn record(&self, task: RepairTask, error: impl fmt::Display) {
        let error = error.to_string();
        let now = Utc::now();
        warn!(task = %task, error = %error, "deferred for repair");

        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending
            .entry(task.key())
            .and_modify(|p| {
                p.attempts += 1;
                p.last_error = error.clone();
                p.last_recorded = now;
            })
            .or_insert(PendingRepair {
                task,
                attempts: 1,
                last_error: error,
                first_recorded: now,
                last_recorded: now,
            });
    }

    /// Drop a task once it has been carried out. Returns whether it was pending.
    pub fn resolve(&self, task: &RepairTask) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&task.key())
            .is_some()
    }

    pub fn contains(&self, task: &RepairTask) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&task.key())
    }

    /// Snapshot of everything pending, oldest key first.
    pub fn pending(&self) -> Vec<PendingRepair> {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn pending_for(&self, booking: &BookingId) -> Vec<PendingRepair> {
        self.pending()
            .into_iter()
            .filter(|p| p.task.booking_id() == booking)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
