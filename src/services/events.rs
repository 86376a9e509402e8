//! Live change feed.
//!
//! Handlers publish a [`SyncEvent`] after every successful write; the
//! WebSocket handler forwards each subscriber only its own events so open
//! clients can refresh their view.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    ActionChanged {
        user_id: Uuid,
        action_id: Uuid,
        op: ChangeOp,
    },
    DailyLogChanged {
        user_id: Uuid,
        action_id: Uuid,
        date: NaiveDate,
    },
    DataCleared {
        user_id: Uuid,
    },
}

impl SyncEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            SyncEvent::ActionChanged { user_id, .. }
            | SyncEvent::DailyLogChanged { user_id, .. }
            | SyncEvent::DataCleared { user_id } => *user_id,
        }
    }
}

/// Send an event to current subscribers. Having none is not an error.
pub fn publish(tx: Option<&broadcast::Sender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}
