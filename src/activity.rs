//! Best-effort audit trail and user notifications.
//!
//! Producers hand entries to a bounded queue and move on. A single worker
//! drains the queue into the store; a full queue or a failed write drops the
//! entry with a warning and never reaches the request that produced it.

use chrono::Utc;
use serde_json::Value;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    models::{ActivityEntry, Notification},
    store::{ActivityRepository, SharedStore},
};

#[derive(Debug)]
enum SideEffect {
    Activity(ActivityEntry),
    Notify(Notification),
}

#[derive(Clone)]
pub struct ActivityLog {
    tx: mpsc::Sender<SideEffect>,
}

impl ActivityLog {
    pub fn spawn(store: SharedStore, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<SideEffect>(capacity);
        let worker = tokio::spawn(async move {
            while let Some(effect) = rx.recv().await {
                let res = match effect {
                    SideEffect::Activity(entry) => store.insert_activity(entry).await,
                    SideEffect::Notify(n) => store.insert_notification(n).await,
                };
                if let Err(e) = res {
                    tracing::warn!(error = %e, "dropping activity entry");
                }
            }
            tracing::debug!("activity worker stopped");
        });
        (Self { tx }, worker)
    }

    pub fn record(&self, actor_id: Option<Uuid>, action: &str, subject_id: Option<Uuid>, detail: Value) {
        self.push(SideEffect::Activity(ActivityEntry {
            id: Uuid::new_v4(),
            actor_id,
            action: action.to_string(),
            subject_id,
            detail,
            created_at: Utc::now(),
        }));
    }

    pub fn notify(&self, user_id: Uuid, message: impl Into<String>) {
        self.push(SideEffect::Notify(Notification {
            id: Uuid::new_v4(),
            user_id,
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }));
    }

    fn push(&self, effect: SideEffect) {
        match self.tx.try_send(effect) {
            Ok(()) => {}
            Err(TrySendError::Full(e)) => tracing::warn!(?e, "activity queue full; entry dropped"),
            Err(TrySendError::Closed(e)) => {
                tracing::warn!(?e, "activity worker gone; entry dropped")
            }
        }
    }
}
