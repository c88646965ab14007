//! The [`Store`] persistence trait.
//!
//! Backends hand out owned snapshots; nothing returned by a store aliases its
//! internal state. The conditional writes (`insert_account`, `insert_request`,
//! `replace_request`, `insert_record`, `delete_event`, `delete_person`) and
//! the person upserts (`upsert_person`, `append_reference`,
//! `clear_references`) must each be atomic in the backend.

use std::future::Future;

use thiserror::Error;

use crate::decision::AttendanceRecord;
use crate::identity::{Account, Person};
use crate::ledger::{AccessRequest, RequestStatus};
use crate::notify::Notification;
use crate::registry::Event;
use crate::types::{Embedding, EventId, IdentityId, RequestId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("storage lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of [`Store::delete_event`] and [`Store::delete_person`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    Missing,
    /// Attendance records still reference the row; nothing was removed.
    Referenced,
}

/// Filter for [`Store::list_records`]. Empty matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordQuery {
    pub event: Option<EventId>,
    pub person: Option<IdentityId>,
}

/// Durable storage for every rollcall entity.
pub trait Store: Send + Sync + 'static {
    // ── Accounts ──────────────────────────────────────────────────────────

    /// Insert a new account. Returns `false` if the id or the name is taken,
    /// or if the account is an admin and an admin already exists.
    fn insert_account(
        &self,
        account: Account,
    ) -> impl Future<Output = StoreResult<bool>> + Send + '_;

    fn get_account(
        &self,
        id: IdentityId,
    ) -> impl Future<Output = StoreResult<Option<Account>>> + Send + '_;

    /// Overwrite an existing account. Returns `false` if it does not exist.
    fn update_account(
        &self,
        account: Account,
    ) -> impl Future<Output = StoreResult<bool>> + Send + '_;

    fn list_accounts(&self) -> impl Future<Output = StoreResult<Vec<Account>>> + Send + '_;

    // ── People ────────────────────────────────────────────────────────────

    /// Insert or replace a person wholesale.
    fn put_person(&self, person: Person) -> impl Future<Output = StoreResult<()>> + Send + '_;

    /// Create the person with no references, or rename it keeping its
    /// references. Returns the stored person.
    fn upsert_person(
        &self,
        id: IdentityId,
        display_name: String,
    ) -> impl Future<Output = StoreResult<Person>> + Send + '_;

    /// Create or rename the person and append `reference` to whatever
    /// references are stored at the time of the write.
    fn append_reference(
        &self,
        id: IdentityId,
        display_name: String,
        reference: Embedding,
    ) -> impl Future<Output = StoreResult<Person>> + Send + '_;

    /// Drop every reference of the person. `None` if it does not exist.
    fn clear_references(
        &self,
        id: IdentityId,
    ) -> impl Future<Output = StoreResult<Option<Person>>> + Send + '_;

    /// Remove a person that no attendance record references.
    fn delete_person(
        &self,
        id: IdentityId,
    ) -> impl Future<Output = StoreResult<Deletion>> + Send + '_;

    fn get_person(
        &self,
        id: IdentityId,
    ) -> impl Future<Output = StoreResult<Option<Person>>> + Send + '_;

    fn list_people(&self) -> impl Future<Output = StoreResult<Vec<Person>>> + Send + '_;

    // ── Access requests ───────────────────────────────────────────────────

    /// Insert a request. Returns `false` without writing if the requester
    /// already has a pending request.
    fn insert_request(
        &self,
        request: AccessRequest,
    ) -> impl Future<Output = StoreResult<bool>> + Send + '_;

    fn get_request(
        &self,
        id: RequestId,
    ) -> impl Future<Output = StoreResult<Option<AccessRequest>>> + Send + '_;

    /// Compare-and-set: overwrite the request only if its stored status is
    /// still `expected`. Returns whether the write happened.
    fn replace_request(
        &self,
        expected: RequestStatus,
        request: AccessRequest,
    ) -> impl Future<Output = StoreResult<bool>> + Send + '_;

    /// Requests oldest first, optionally for one requester.
    fn list_requests(
        &self,
        requester: Option<IdentityId>,
    ) -> impl Future<Output = StoreResult<Vec<AccessRequest>>> + Send + '_;

    // ── Events ────────────────────────────────────────────────────────────

    fn insert_event(&self, event: Event) -> impl Future<Output = StoreResult<()>> + Send + '_;

    fn get_event(
        &self,
        id: EventId,
    ) -> impl Future<Output = StoreResult<Option<Event>>> + Send + '_;

    /// Overwrite an existing event. Returns `false` if it does not exist.
    fn update_event(&self, event: Event) -> impl Future<Output = StoreResult<bool>> + Send + '_;

    fn delete_event(
        &self,
        id: EventId,
    ) -> impl Future<Output = StoreResult<Deletion>> + Send + '_;

    /// Events oldest first.
    fn list_events(&self) -> impl Future<Output = StoreResult<Vec<Event>>> + Send + '_;

    // ── Attendance ────────────────────────────────────────────────────────

    /// Insert a record. Returns `false` without writing if the
    /// (event, person) pair already has one.
    fn insert_record(
        &self,
        record: AttendanceRecord,
    ) -> impl Future<Output = StoreResult<bool>> + Send + '_;

    fn find_record(
        &self,
        event: EventId,
        person: IdentityId,
    ) -> impl Future<Output = StoreResult<Option<AttendanceRecord>>> + Send + '_;

    /// Records newest first.
    fn list_records(
        &self,
        query: RecordQuery,
    ) -> impl Future<Output = StoreResult<Vec<AttendanceRecord>>> + Send + '_;

    fn count_records(&self, event: EventId) -> impl Future<Output = StoreResult<usize>> + Send + '_;

    // ── Notifications ─────────────────────────────────────────────────────

    fn push_notification(
        &self,
        notification: Notification,
    ) -> impl Future<Output = StoreResult<()>> + Send + '_;

    /// Newest first, at most `limit`.
    fn list_notifications(
        &self,
        recipient: IdentityId,
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<Notification>>> + Send + '_;

    /// Mark every unread notification of `recipient` read; returns how many changed.
    fn mark_notifications_read(
        &self,
        recipient: IdentityId,
    ) -> impl Future<Output = StoreResult<usize>> + Send + '_;
}
