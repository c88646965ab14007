//! Event Registry: admin-owned event CRUD.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{gate, require_approved, Action, Principal};
use crate::error::{Error, Result};
use crate::identity::Role;
use crate::locks::EventLocks;
use crate::store::{Deletion, Store};
use crate::types::{EventId, IdentityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Active,
    Closed,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(EventStatus::Active),
            "closed" => Ok(EventStatus::Closed),
            _ => Err(Error::UnknownVariant {
                kind: "event status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub description: String,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// The admin who created the event.
    pub owner: IdentityId,
    pub status: EventStatus,
    /// Coordinators allowed to view this event's records.
    pub shared_with: BTreeSet<IdentityId>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }

    pub fn is_shared_with(&self, id: IdentityId) -> bool {
        self.shared_with.contains(&id)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidEvent("name must not be empty".into()));
        }
        if self.starts_at > self.ends_at {
            return Err(Error::InvalidEvent(format!(
                "window starts at {} after it ends at {}",
                self.starts_at, self.ends_at
            )));
        }
        Ok(())
    }
}

/// Fields supplied when creating an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

/// What [`EventRegistry::delete`] did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Removal {
    /// Attendance exists: the event was kept and closed.
    Closed { event: Event },
    Deleted { id: EventId },
}

pub struct EventRegistry<S> {
    store: Arc<S>,
    locks: EventLocks,
}

impl<S: Store> EventRegistry<S> {
    /// `locks` must be shared with the decision core.
    pub fn new(store: Arc<S>, locks: EventLocks) -> Self {
        Self { store, locks }
    }

    pub async fn create(
        &self,
        admin: &Principal,
        new: NewEvent,
        at: DateTime<Utc>,
    ) -> Result<Event> {
        gate(admin, Action::CreateEvent, None)?;
        let event = Event {
            id: EventId::generate(),
            name: new.name,
            description: new.description,
            venue: new.venue,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            owner: admin.id,
            status: EventStatus::Active,
            shared_with: BTreeSet::new(),
            created_at: at,
        };
        event.validate()?;
        self.store.insert_event(event.clone()).await?;
        tracing::info!(event = %event.id, name = %event.name, by = %admin.id, "event created");
        Ok(event)
    }

    pub async fn edit(&self, admin: &Principal, id: EventId, patch: EventPatch) -> Result<Event> {
        gate(admin, Action::EditEvent, None)?;
        let _guard = self.locks.lock(id).await;
        let mut event = self.get(id).await?;

        if let Some(name) = patch.name {
            event.name = name;
        }
        if let Some(description) = patch.description {
            event.description = description;
        }
        if let Some(venue) = patch.venue {
            event.venue = venue;
        }
        if let Some(starts_at) = patch.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = patch.ends_at {
            event.ends_at = ends_at;
        }
        event.validate()?;

        self.put(event.clone()).await?;
        tracing::info!(event = %id, by = %admin.id, "event edited");
        Ok(event)
    }

    /// Remove the event, or close it when attendance records exist.
    pub async fn delete(&self, admin: &Principal, id: EventId) -> Result<Removal> {
        gate(admin, Action::DeleteEvent, None)?;
        let _guard = self.locks.lock(id).await;
        let mut event = self.get(id).await?;

        if self.store.count_records(id).await? == 0 {
            match self.store.delete_event(id).await? {
                Deletion::Deleted => {
                    self.locks.forget(id);
                    tracing::info!(event = %id, by = %admin.id, "event deleted");
                    return Ok(Removal::Deleted { id });
                }
                Deletion::Missing => return Err(Error::not_found("event", id)),
                Deletion::Referenced => {}
            }
        }

        event.status = EventStatus::Closed;
        self.put(event.clone()).await?;
        tracing::info!(event = %id, by = %admin.id, "event closed, attendance kept");
        Ok(Removal::Closed { event })
    }

    /// Hard delete. Refused while attendance records exist.
    pub async fn purge(&self, admin: &Principal, id: EventId) -> Result<()> {
        gate(admin, Action::DeleteEvent, None)?;
        let _guard = self.locks.lock(id).await;

        match self.store.delete_event(id).await? {
            Deletion::Deleted => {
                self.locks.forget(id);
                tracing::info!(event = %id, by = %admin.id, "event purged");
                Ok(())
            }
            Deletion::Missing => Err(Error::not_found("event", id)),
            Deletion::Referenced => Err(Error::has_dependent_records("event", id)),
        }
    }

    /// Let a coordinator view the event's records.
    pub async fn share(
        &self,
        admin: &Principal,
        id: EventId,
        coordinator: IdentityId,
    ) -> Result<Event> {
        gate(admin, Action::EditEvent, None)?;
        let account = self
            .store
            .get_account(coordinator)
            .await?
            .ok_or_else(|| Error::not_found("identity", coordinator))?;
        if account.role != Role::Coordinator {
            return Err(Error::RoleMismatch {
                expected: Role::Coordinator,
                found: account.role,
            });
        }

        let _guard = self.locks.lock(id).await;
        let mut event = self.get(id).await?;
        if event.shared_with.insert(coordinator) {
            self.put(event.clone()).await?;
            tracing::info!(event = %id, %coordinator, "event shared");
        }
        Ok(event)
    }

    pub async fn unshare(
        &self,
        admin: &Principal,
        id: EventId,
        coordinator: IdentityId,
    ) -> Result<Event> {
        gate(admin, Action::EditEvent, None)?;
        let _guard = self.locks.lock(id).await;
        let mut event = self.get(id).await?;
        if event.shared_with.remove(&coordinator) {
            self.put(event.clone()).await?;
            tracing::info!(event = %id, %coordinator, "event unshared");
        }
        Ok(event)
    }

    pub async fn get(&self, id: EventId) -> Result<Event> {
        self.store
            .get_event(id)
            .await?
            .ok_or_else(|| Error::not_found("event", id))
    }

    /// Events visible to `viewer`: all for the admin, shared ones for a
    /// coordinator, active ones for a user.
    pub async fn list(&self, viewer: &Principal) -> Result<Vec<Event>> {
        require_approved(viewer)?;
        let events = self.store.list_events().await?;
        Ok(match viewer.role {
            Role::Admin => events,
            Role::Coordinator => events
                .into_iter()
                .filter(|e| e.is_shared_with(viewer.id))
                .collect(),
            Role::User => events.into_iter().filter(Event::is_active).collect(),
        })
    }

    async fn put(&self, event: Event) -> Result<()> {
        let id = event.id;
        if self.store.update_event(event).await? {
            Ok(())
        } else {
            Err(Error::not_found("event", id))
        }
    }
}
