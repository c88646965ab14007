//! Attendance Decision Core.
//!
//! Decides, for a face observed at an event, who it is and whether a new
//! attendance record is written. At most one record exists per
//! (event, person): the check and the write run under the event's lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{gate, require_approved, Action, Principal};
use crate::error::{Error, Result};
use crate::identity::Person;
use crate::locks::EventLocks;
use crate::notify::Notifier;
use crate::registry::Event;
use crate::store::{RecordQuery, Store};
use crate::types::{
    Candidate, Comparison, CosineMatcher, Embedding, EventId, IdentityId, MatchPolicy, Matcher,
    RecordId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    FaceDetection,
    Manual,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::FaceDetection => "face_detection",
            Source::Manual => "manual",
        }
    }
}

impl std::str::FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "face_detection" => Ok(Source::FaceDetection),
            "manual" => Ok(Source::Manual),
            _ => Err(Error::UnknownVariant {
                kind: "attendance source",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub event: EventId,
    pub person: IdentityId,
    pub timestamp: DateTime<Utc>,
    pub source: Source,
    /// Matcher score for face records.
    pub similarity: Option<f32>,
    /// Admin who marked a manual record.
    pub marked_by: Option<IdentityId>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: IdentityId,
    pub display_name: String,
}

impl From<&Person> for PersonRef {
    fn from(person: &Person) -> Self {
        Self {
            id: person.id,
            display_name: person.display_name.clone(),
        }
    }
}

/// Outcome of one observation. `NoMatch` and `Ambiguous` are valid results,
/// not errors: the caller retries capture or falls back to manual marking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchResult {
    Marked {
        person: PersonRef,
        record: RecordId,
        similarity: Option<f32>,
    },
    AlreadyMarked {
        person: PersonRef,
        record: RecordId,
    },
    NoMatch {
        best_similarity: Option<f32>,
    },
    Ambiguous {
        candidates: Vec<Candidate>,
    },
}

impl MatchResult {
    pub fn person(&self) -> Option<&PersonRef> {
        match self {
            MatchResult::Marked { person, .. } | MatchResult::AlreadyMarked { person, .. } => {
                Some(person)
            }
            _ => None,
        }
    }

    pub fn is_marked(&self) -> bool {
        matches!(self, MatchResult::Marked { .. })
    }
}

/// Per-event totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub event: EventId,
    pub total: usize,
    pub face_detection: usize,
    pub manual: usize,
}

pub struct DecisionCore<S> {
    store: Arc<S>,
    locks: EventLocks,
    matcher: Arc<dyn Matcher>,
    policy: MatchPolicy,
    embedding_dim: usize,
    notices: Notifier<S>,
}

impl<S: Store> DecisionCore<S> {
    /// `locks` must be shared with the event registry. An invalid `policy`
    /// (see [`MatchPolicy::validate`]) makes every observation fail with
    /// `InvalidPolicy` instead of matching.
    pub fn new(store: Arc<S>, locks: EventLocks, policy: MatchPolicy, embedding_dim: usize) -> Self {
        Self {
            notices: Notifier::new(Arc::clone(&store)),
            store,
            locks,
            matcher: Arc::new(CosineMatcher),
            policy,
            embedding_dim,
        }
    }

    /// Replace the default cosine matcher.
    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Arc::new(matcher);
        self
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Decide one observed face.
    pub async fn observe(
        &self,
        event_id: EventId,
        embedding: &Embedding,
        at: DateTime<Utc>,
    ) -> Result<MatchResult> {
        self.policy.validate()?;
        embedding.validate(self.embedding_dim)?;

        let _guard = self.locks.lock(event_id).await;
        let event = self.active_event(event_id).await?;
        let gallery = self.store.list_people().await?;
        self.decide(&event, embedding, &gallery, at).await
    }

    /// Decide every face of a group photo in order, under one hold of the
    /// event lock. A face seen twice yields `Marked` then `AlreadyMarked`.
    pub async fn observe_group(
        &self,
        event_id: EventId,
        embeddings: &[Embedding],
        at: DateTime<Utc>,
    ) -> Result<Vec<MatchResult>> {
        self.policy.validate()?;
        for embedding in embeddings {
            embedding.validate(self.embedding_dim)?;
        }

        let _guard = self.locks.lock(event_id).await;
        let event = self.active_event(event_id).await?;
        let gallery = self.store.list_people().await?;

        let mut results = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            results.push(self.decide(&event, embedding, &gallery, at).await?);
        }
        tracing::info!(
            event = %event_id,
            faces = embeddings.len(),
            marked = results.iter().filter(|r| r.is_marked()).count(),
            "group observation decided"
        );
        Ok(results)
    }

    /// Admin marks a person present without face matching.
    pub async fn mark_manual(
        &self,
        event_id: EventId,
        person_id: IdentityId,
        admin: &Principal,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<MatchResult> {
        gate(admin, Action::MarkManualAttendance, None)?;

        let _guard = self.locks.lock(event_id).await;
        let event = self.active_event(event_id).await?;
        let person = self
            .store
            .get_person(person_id)
            .await?
            .ok_or_else(|| Error::not_found("person", person_id))?;

        let record = AttendanceRecord {
            id: RecordId::generate(),
            event: event.id,
            person: person.id,
            timestamp: at,
            source: Source::Manual,
            similarity: None,
            marked_by: Some(admin.id),
            notes,
        };
        self.record(&event, PersonRef::from(&person), record).await
    }

    /// Snapshot of an event's records. Takes no event lock.
    pub async fn records(&self, viewer: &Principal, event_id: EventId) -> Result<Vec<AttendanceRecord>> {
        let event = self.event(event_id).await?;
        gate(viewer, Action::ViewRecords, Some(&event))?;
        Ok(self
            .store
            .list_records(RecordQuery {
                event: Some(event_id),
                person: None,
            })
            .await?)
    }

    pub async fn summary(&self, viewer: &Principal, event_id: EventId) -> Result<AttendanceSummary> {
        let records = self.records(viewer, event_id).await?;
        let face_detection = records
            .iter()
            .filter(|r| r.source == Source::FaceDetection)
            .count();
        Ok(AttendanceSummary {
            event: event_id,
            total: records.len(),
            face_detection,
            manual: records.len() - face_detection,
        })
    }

    /// The caller's own attendance history.
    pub async fn own_records(&self, viewer: &Principal) -> Result<Vec<AttendanceRecord>> {
        require_approved(viewer)?;
        Ok(self
            .store
            .list_records(RecordQuery {
                event: None,
                person: Some(viewer.id),
            })
            .await?)
    }

    async fn event(&self, id: EventId) -> Result<Event> {
        self.store
            .get_event(id)
            .await?
            .ok_or_else(|| Error::not_found("event", id))
    }

    async fn active_event(&self, id: EventId) -> Result<Event> {
        let event = self.event(id).await?;
        if !event.is_active() {
            return Err(Error::EventNotActive(id));
        }
        Ok(event)
    }

    /// Caller holds the event lock.
    async fn decide(
        &self,
        event: &Event,
        embedding: &Embedding,
        gallery: &[Person],
        at: DateTime<Utc>,
    ) -> Result<MatchResult> {
        let candidate = match self.matcher.compare(embedding, gallery, &self.policy) {
            Comparison::Match(candidate) => candidate,
            Comparison::NoMatch { best_similarity } => {
                tracing::debug!(event = %event.id, ?best_similarity, "no match");
                return Ok(MatchResult::NoMatch { best_similarity });
            }
            Comparison::Ambiguous(candidates) => {
                tracing::warn!(
                    event = %event.id,
                    candidates = ?candidates.iter().map(|c| (c.person, c.similarity)).collect::<Vec<_>>(),
                    "ambiguous match; nothing recorded"
                );
                return Ok(MatchResult::Ambiguous { candidates });
            }
        };

        let person = PersonRef {
            id: candidate.person,
            display_name: candidate.display_name,
        };
        let record = AttendanceRecord {
            id: RecordId::generate(),
            event: event.id,
            person: person.id,
            timestamp: at,
            source: Source::FaceDetection,
            similarity: Some(candidate.similarity),
            marked_by: None,
            notes: None,
        };
        self.record(event, person, record).await
    }

    /// Caller holds the event lock.
    async fn record(
        &self,
        event: &Event,
        person: PersonRef,
        record: AttendanceRecord,
    ) -> Result<MatchResult> {
        if let Some(existing) = self.store.find_record(event.id, person.id).await? {
            return Ok(MatchResult::AlreadyMarked {
                person,
                record: existing.id,
            });
        }

        if !self.store.insert_record(record.clone()).await? {
            // Another writer outside this process got there first.
            let existing = self
                .store
                .find_record(event.id, person.id)
                .await?
                .ok_or_else(|| Error::not_found("attendance record", record.id))?;
            return Ok(MatchResult::AlreadyMarked {
                person,
                record: existing.id,
            });
        }

        tracing::info!(
            event = %event.id,
            person = %person.id,
            source = record.source.as_str(),
            similarity = ?record.similarity,
            "attendance marked"
        );

        if self.store.get_account(person.id).await?.is_some() {
            self.notices
                .send(
                    person.id,
                    "Attendance marked",
                    format!("Your attendance was recorded for {}.", event.name),
                    record.timestamp,
                )
                .await;
        }

        Ok(MatchResult::Marked {
            person,
            record: record.id,
            similarity: record.similarity,
        })
    }
}
