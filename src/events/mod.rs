use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use utoipa::ToSchema;

use crate::db::{collections, to_document, DocumentStore};
use crate::utils::utc_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AssignmentDonePending,
    ExtendRequested,
    ExtendApproved,
}

/// Write-only record of a state change that someone may want to hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub assignment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, assignment_id: impl Into<String>) -> Self {
        Self {
            kind,
            assignment_id: assignment_id.into(),
            request_id: None,
            actor: None,
            created_at: utc_now(),
        }
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

pub type EventBus = broadcast::Sender<Notification>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Notification>) {
    broadcast::channel(1024)
}

/// Fire and forget: a notification that nobody receives is dropped.
pub fn emit(bus: &EventBus, notification: Notification) {
    tracing::debug!(kind = ?notification.kind, assignment_id = %notification.assignment_id, "notification emitted");
    let _ = bus.send(notification);
}

/// Persists every notification into the notifications collection until the bus closes.
pub async fn start_notification_listener(mut rx: broadcast::Receiver<Notification>, store: Arc<dyn DocumentStore>) {
    tracing::info!("Notification listener started");

    loop {
        let notification = match rx.recv().await {
            Ok(notification) => notification,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notification listener lagged, events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let result = match to_document(&notification) {
            Ok(data) => store.add(collections::NOTIFICATIONS, data).await.map(|_| ()),
            Err(err) => Err(err),
        };

        if let Err(e) = result {
            tracing::error!("Failed to save notification: {}", e);
        }
    }

    tracing::info!("Notification listener stopped");
}
