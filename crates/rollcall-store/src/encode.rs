//! Conversions between rollcall domain types and SQLite column text.
//!
//! Timestamps are RFC 3339 UTC with fixed nanosecond precision so that text
//! order equals time order. Embeddings and share lists are compact JSON.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use rollcall_core::{
    AccessRequest, Account, AttendanceRecord, Embedding, Event, EventId, IdentityId,
    Notification, NotificationId, Person, RecordId, RequestId,
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String {
    id.hyphenated().to_string()
}

pub fn decode_uuid(s: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(s)?)
}

fn decode_opt_identity(s: Option<String>) -> Result<Option<IdentityId>> {
    s.as_deref().map(decode_uuid).transpose().map(|id| id.map(IdentityId))
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_references(references: &[Embedding]) -> Result<String> {
    Ok(serde_json::to_string(references)?)
}

pub fn encode_reference(reference: &Embedding) -> Result<String> {
    Ok(serde_json::to_string(reference)?)
}

pub fn encode_shared_with(shared: &BTreeSet<IdentityId>) -> Result<String> {
    Ok(serde_json::to_string(shared)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub struct RawAccount {
    pub identity_id: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
}

impl RawAccount {
    pub fn into_account(self) -> Result<Account> {
        Ok(Account {
            id: IdentityId(decode_uuid(&self.identity_id)?),
            name: self.name,
            role: self.role.parse()?,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

pub struct RawPerson {
    pub person_id: String,
    pub display_name: String,
    pub references_json: String,
}

impl RawPerson {
    pub fn into_person(self) -> Result<Person> {
        Ok(Person {
            id: IdentityId(decode_uuid(&self.person_id)?),
            display_name: self.display_name,
            references: serde_json::from_str(&self.references_json)?,
        })
    }
}

pub struct RawRequest {
    pub request_id: String,
    pub requester_id: String,
    pub status: String,
    pub submitted_at: String,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
}

impl RawRequest {
    pub fn into_request(self) -> Result<AccessRequest> {
        Ok(AccessRequest {
            id: RequestId(decode_uuid(&self.request_id)?),
            requester: IdentityId(decode_uuid(&self.requester_id)?),
            status: self.status.parse()?,
            submitted_at: decode_dt(&self.submitted_at)?,
            resolved_at: self.resolved_at.as_deref().map(decode_dt).transpose()?,
            resolved_by: decode_opt_identity(self.resolved_by)?,
        })
    }
}

pub struct RawEvent {
    pub event_id: String,
    pub name: String,
    pub description: String,
    pub venue: String,
    pub starts_at: String,
    pub ends_at: String,
    pub owner_id: String,
    pub status: String,
    pub shared_with: String,
    pub created_at: String,
}

impl RawEvent {
    pub fn into_event(self) -> Result<Event> {
        Ok(Event {
            id: EventId(decode_uuid(&self.event_id)?),
            name: self.name,
            description: self.description,
            venue: self.venue,
            starts_at: decode_dt(&self.starts_at)?,
            ends_at: decode_dt(&self.ends_at)?,
            owner: IdentityId(decode_uuid(&self.owner_id)?),
            status: self.status.parse()?,
            shared_with: serde_json::from_str(&self.shared_with)?,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

pub struct RawRecord {
    pub record_id: String,
    pub event_id: String,
    pub person_id: String,
    pub recorded_at: String,
    pub source: String,
    pub similarity: Option<f64>,
    pub marked_by: Option<String>,
    pub notes: Option<String>,
}

impl RawRecord {
    pub fn into_record(self) -> Result<AttendanceRecord> {
        Ok(AttendanceRecord {
            id: RecordId(decode_uuid(&self.record_id)?),
            event: EventId(decode_uuid(&self.event_id)?),
            person: IdentityId(decode_uuid(&self.person_id)?),
            timestamp: decode_dt(&self.recorded_at)?,
            source: self.source.parse()?,
            similarity: self.similarity.map(|s| s as f32),
            marked_by: decode_opt_identity(self.marked_by)?,
            notes: self.notes,
        })
    }
}

pub struct RawNotification {
    pub notification_id: String,
    pub recipient_id: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: String,
}

impl RawNotification {
    pub fn into_notification(self) -> Result<Notification> {
        Ok(Notification {
            id: NotificationId(decode_uuid(&self.notification_id)?),
            recipient: IdentityId(decode_uuid(&self.recipient_id)?),
            title: self.title,
            body: self.body,
            read: self.read,
            created_at: decode_dt(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_timestamps_sort_chronologically() {
        let whole = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = whole + chrono::Duration::milliseconds(5);
        assert!(encode_dt(whole) < encode_dt(later));
        assert_eq!(decode_dt(&encode_dt(later)).unwrap(), later);
    }

    #[test]
    fn test_bad_role_is_decode_error() {
        let raw = RawAccount {
            identity_id: encode_uuid(Uuid::new_v4()),
            name: "x".into(),
            role: "superuser".into(),
            created_at: encode_dt(Utc::now()),
        };
        assert!(matches!(raw.into_account(), Err(Error::Decode(_))));
    }
}
