//! Notification feed for approval outcomes and attendance marks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{require_approved, Principal};
use crate::error::Result;
use crate::store::Store;
use crate::types::{IdentityId, NotificationId};

const FEED_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: IdentityId,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

pub struct Notifier<S> {
    store: Arc<S>,
}

impl<S> Clone for Notifier<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> Notifier<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Best-effort delivery: a failed write is logged, never propagated.
    pub(crate) async fn send(
        &self,
        recipient: IdentityId,
        title: impl Into<String>,
        body: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        let notification = Notification {
            id: NotificationId::generate(),
            recipient,
            title: title.into(),
            body: body.into(),
            read: false,
            created_at: at,
        };
        if let Err(err) = self.store.push_notification(notification).await {
            tracing::warn!(%recipient, error = %err, "failed to store notification");
        }
    }

    /// Latest notifications for the caller, newest first.
    pub async fn feed(&self, principal: &Principal) -> Result<Vec<Notification>> {
        require_approved(principal)?;
        Ok(self
            .store
            .list_notifications(principal.id, FEED_LIMIT)
            .await?)
    }

    pub async fn unread(&self, principal: &Principal) -> Result<usize> {
        Ok(self.feed(principal).await?.iter().filter(|n| !n.read).count())
    }

    pub async fn mark_read(&self, principal: &Principal) -> Result<usize> {
        require_approved(principal)?;
        Ok(self.store.mark_notifications_read(principal.id).await?)
    }
}
