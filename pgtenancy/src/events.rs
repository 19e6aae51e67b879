//! Tenant lifecycle notifications

use crate::tenant::Tenant;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgtenancy_log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What happened to a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantEventKind {
    Created,
    Updated,
    Deleted,
}

/// A lifecycle notification with a snapshot of the tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantEvent {
    pub id: Uuid,
    pub kind: TenantEventKind,
    pub tenant: Tenant,
    pub occurred_at: DateTime<Utc>,
}

impl TenantEvent {
    pub fn new(kind: TenantEventKind, tenant: Tenant) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            tenant,
            occurred_at: Utc::now(),
        }
    }

    pub fn created(tenant: Tenant) -> Self {
        Self::new(TenantEventKind::Created, tenant)
    }

    pub fn updated(tenant: Tenant) -> Self {
        Self::new(TenantEventKind::Updated, tenant)
    }

    pub fn deleted(tenant: Tenant) -> Self {
        Self::new(TenantEventKind::Deleted, tenant)
    }
}

/// Receives lifecycle notifications.
///
/// Publishing is fire-and-forget: sinks handle their own failures.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: TenantEvent);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: TenantEvent) {}
}

/// Fans events out to in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<TenantEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TenantEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish(&self, event: TenantEvent) {
        let kind = event.kind;
        match self.sender.send(event) {
            Ok(receivers) => debug!("Published {:?} event to {} subscribers", kind, receivers),
            Err(_) => warn!("Dropped {:?} event: no subscribers", kind),
        }
    }
}
