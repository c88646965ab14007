//! [`SqliteStore`]: the SQLite implementation of [`Store`].
//!
//! Conditional writes lean on table constraints (`INSERT OR IGNORE` against
//! the unique indexes, guarded `UPDATE ... WHERE status = ?`) so each one is a
//! single atomic statement.

use std::path::Path;

use rusqlite::OptionalExtension as _;

use rollcall_core::{
    AccessRequest, Account, AttendanceRecord, Deletion, Embedding, Event, EventId, IdentityId,
    Notification, Person, RecordQuery, RequestId, RequestStatus, Store, StoreResult,
};

use crate::{
    encode::{
        encode_dt, encode_reference, encode_references, encode_shared_with, encode_uuid,
        RawAccount, RawEvent, RawNotification, RawPerson, RawRecord, RawRequest,
    },
    schema::SCHEMA,
    Result,
};

const ACCOUNT_COLUMNS: &str = "identity_id, name, role, created_at";
const PERSON_COLUMNS: &str = "person_id, display_name, references_json";
const REQUEST_COLUMNS: &str =
    "request_id, requester_id, status, submitted_at, resolved_at, resolved_by";
const EVENT_COLUMNS: &str = "event_id, name, description, venue, starts_at, ends_at, \
     owner_id, status, shared_with, created_at";
const RECORD_COLUMNS: &str =
    "record_id, event_id, person_id, recorded_at, source, similarity, marked_by, notes";
const NOTIFICATION_COLUMNS: &str =
    "notification_id, recipient_id, title, body, read, created_at";

fn account_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAccount> {
    Ok(RawAccount {
        identity_id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn person_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPerson> {
    Ok(RawPerson {
        person_id: row.get(0)?,
        display_name: row.get(1)?,
        references_json: row.get(2)?,
    })
}

fn request_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRequest> {
    Ok(RawRequest {
        request_id: row.get(0)?,
        requester_id: row.get(1)?,
        status: row.get(2)?,
        submitted_at: row.get(3)?,
        resolved_at: row.get(4)?,
        resolved_by: row.get(5)?,
    })
}

fn event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        event_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        venue: row.get(3)?,
        starts_at: row.get(4)?,
        ends_at: row.get(5)?,
        owner_id: row.get(6)?,
        status: row.get(7)?,
        shared_with: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        record_id: row.get(0)?,
        event_id: row.get(1)?,
        person_id: row.get(2)?,
        recorded_at: row.get(3)?,
        source: row.get(4)?,
        similarity: row.get(5)?,
        marked_by: row.get(6)?,
        notes: row.get(7)?,
    })
}

fn notification_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawNotification> {
    Ok(RawNotification {
        notification_id: row.get(0)?,
        recipient_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Rollcall storage backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection handle is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio_rusqlite::Connection::open(&path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        tracing::info!(path = %path.display(), "sqlite store opened");
        Ok(store)
    }

    /// Open an in-memory store; used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // The inherent methods below return this crate's `Error`; the `Store`
    // impl at the bottom of the file boxes it into `StoreError`.

    // ── Accounts ──────────────────────────────────────────────────────────

    pub async fn insert_account(&self, account: Account) -> Result<bool> {
        let id = encode_uuid(account.id.0);
        let role = account.role.as_str();
        let created_at = encode_dt(account.created_at);
        let name = account.name;

        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "INSERT OR IGNORE INTO accounts (identity_id, name, role, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, name, role, created_at],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    pub async fn get_account(&self, id: IdentityId) -> Result<Option<Account>> {
        let id = encode_uuid(id.0);
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE identity_id = ?1"),
                        rusqlite::params![id],
                        account_row,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(RawAccount::into_account).transpose()
    }

    pub async fn update_account(&self, account: Account) -> Result<bool> {
        let id = encode_uuid(account.id.0);
        let role = account.role.as_str();
        let name = account.name;

        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE accounts SET name = ?2, role = ?3 WHERE identity_id = ?1",
                    rusqlite::params![id, name, role],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let raws = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, rowid"
                ))?;
                let rows = stmt
                    .query_map([], account_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawAccount::into_account).collect()
    }

    // ── People ────────────────────────────────────────────────────────────

    pub async fn put_person(&self, person: Person) -> Result<()> {
        let id = encode_uuid(person.id.0);
        let references = encode_references(&person.references)?;
        let display_name = person.display_name;

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO people (person_id, display_name, references_json)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (person_id) DO UPDATE SET
                       display_name    = excluded.display_name,
                       references_json = excluded.references_json",
                    rusqlite::params![id, display_name, references],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn upsert_person(&self, id: IdentityId, display_name: String) -> Result<Person> {
        let id = encode_uuid(id.0);
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    &format!(
                        "INSERT INTO people (person_id, display_name) VALUES (?1, ?2)
                         ON CONFLICT (person_id) DO UPDATE SET
                           display_name = excluded.display_name
                         RETURNING {PERSON_COLUMNS}"
                    ),
                    rusqlite::params![id, display_name],
                    person_row,
                )?)
            })
            .await?;
        raw.into_person()
    }

    /// One statement: the append happens against the stored array, so
    /// concurrent enrollments never drop each other's references.
    pub async fn append_reference(
        &self,
        id: IdentityId,
        display_name: String,
        reference: Embedding,
    ) -> Result<Person> {
        let id = encode_uuid(id.0);
        let reference = encode_reference(&reference)?;
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    &format!(
                        "INSERT INTO people (person_id, display_name, references_json)
                         VALUES (?1, ?2, json_array(json(?3)))
                         ON CONFLICT (person_id) DO UPDATE SET
                           display_name    = excluded.display_name,
                           references_json = json_insert(people.references_json, '$[#]', json(?3))
                         RETURNING {PERSON_COLUMNS}"
                    ),
                    rusqlite::params![id, display_name, reference],
                    person_row,
                )?)
            })
            .await?;
        raw.into_person()
    }

    pub async fn clear_references(&self, id: IdentityId) -> Result<Option<Person>> {
        let id = encode_uuid(id.0);
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "UPDATE people SET references_json = '[]' WHERE person_id = ?1
                             RETURNING {PERSON_COLUMNS}"
                        ),
                        rusqlite::params![id],
                        person_row,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(RawPerson::into_person).transpose()
    }

    pub async fn delete_person(&self, id: IdentityId) -> Result<Deletion> {
        let id = encode_uuid(id.0);
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let records: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM attendance WHERE person_id = ?1",
                    rusqlite::params![id],
                    |r| r.get(0),
                )?;
                if records > 0 {
                    return Ok(Deletion::Referenced);
                }
                let removed =
                    tx.execute("DELETE FROM people WHERE person_id = ?1", rusqlite::params![id])?;
                tx.commit()?;
                Ok(if removed == 1 {
                    Deletion::Deleted
                } else {
                    Deletion::Missing
                })
            })
            .await?;
        Ok(outcome)
    }

    pub async fn get_person(&self, id: IdentityId) -> Result<Option<Person>> {
        let id = encode_uuid(id.0);
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {PERSON_COLUMNS} FROM people WHERE person_id = ?1"),
                        rusqlite::params![id],
                        person_row,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(RawPerson::into_person).transpose()
    }

    pub async fn list_people(&self) -> Result<Vec<Person>> {
        let raws = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {PERSON_COLUMNS} FROM people ORDER BY rowid"))?;
                let rows = stmt
                    .query_map([], person_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawPerson::into_person).collect()
    }

    // ── Access requests ───────────────────────────────────────────────────

    pub async fn insert_request(&self, request: AccessRequest) -> Result<bool> {
        let id = encode_uuid(request.id.0);
        let requester = encode_uuid(request.requester.0);
        let status = request.status.as_str();
        let submitted_at = encode_dt(request.submitted_at);
        let resolved_at = request.resolved_at.map(encode_dt);
        let resolved_by = request.resolved_by.map(|id| encode_uuid(id.0));

        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "INSERT OR IGNORE INTO access_requests (
                       request_id, requester_id, status, submitted_at, resolved_at, resolved_by
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![id, requester, status, submitted_at, resolved_at, resolved_by],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    pub async fn get_request(&self, id: RequestId) -> Result<Option<AccessRequest>> {
        let id = encode_uuid(id.0);
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {REQUEST_COLUMNS} FROM access_requests WHERE request_id = ?1"
                        ),
                        rusqlite::params![id],
                        request_row,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(RawRequest::into_request).transpose()
    }

    pub async fn replace_request(
        &self,
        expected: RequestStatus,
        request: AccessRequest,
    ) -> Result<bool> {
        let id = encode_uuid(request.id.0);
        let expected = expected.as_str();
        let status = request.status.as_str();
        let resolved_at = request.resolved_at.map(encode_dt);
        let resolved_by = request.resolved_by.map(|id| encode_uuid(id.0));

        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE access_requests
                     SET status = ?3, resolved_at = ?4, resolved_by = ?5
                     WHERE request_id = ?1 AND status = ?2",
                    rusqlite::params![id, expected, status, resolved_at, resolved_by],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    pub async fn list_requests(&self, requester: Option<IdentityId>) -> Result<Vec<AccessRequest>> {
        let requester = requester.map(|id| encode_uuid(id.0));
        let raws = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM access_requests
                     WHERE ?1 IS NULL OR requester_id = ?1
                     ORDER BY submitted_at, rowid"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![requester], request_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawRequest::into_request).collect()
    }

    // ── Events ────────────────────────────────────────────────────────────

    pub async fn insert_event(&self, event: Event) -> Result<()> {
        let shared_with = encode_shared_with(&event.shared_with)?;
        let id = encode_uuid(event.id.0);
        let starts_at = encode_dt(event.starts_at);
        let ends_at = encode_dt(event.ends_at);
        let owner = encode_uuid(event.owner.0);
        let status = event.status.as_str();
        let created_at = encode_dt(event.created_at);
        let (name, description, venue) = (event.name, event.description, event.venue);

        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO events ({EVENT_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                    ),
                    rusqlite::params![
                        id,
                        name,
                        description,
                        venue,
                        starts_at,
                        ends_at,
                        owner,
                        status,
                        shared_with,
                        created_at,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_event(&self, id: EventId) -> Result<Option<Event>> {
        let id = encode_uuid(id.0);
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?1"),
                        rusqlite::params![id],
                        event_row,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(RawEvent::into_event).transpose()
    }

    pub async fn update_event(&self, event: Event) -> Result<bool> {
        let shared_with = encode_shared_with(&event.shared_with)?;
        let id = encode_uuid(event.id.0);
        let starts_at = encode_dt(event.starts_at);
        let ends_at = encode_dt(event.ends_at);
        let status = event.status.as_str();
        let (name, description, venue) = (event.name, event.description, event.venue);

        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE events SET
                       name = ?2, description = ?3, venue = ?4,
                       starts_at = ?5, ends_at = ?6, status = ?7, shared_with = ?8
                     WHERE event_id = ?1",
                    rusqlite::params![
                        id,
                        name,
                        description,
                        venue,
                        starts_at,
                        ends_at,
                        status,
                        shared_with,
                    ],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    pub async fn delete_event(&self, id: EventId) -> Result<Deletion> {
        let id = encode_uuid(id.0);
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM events WHERE event_id = ?1",
                        rusqlite::params![id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if !exists {
                    return Ok(Deletion::Missing);
                }
                let records: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM attendance WHERE event_id = ?1",
                    rusqlite::params![id],
                    |r| r.get(0),
                )?;
                if records > 0 {
                    return Ok(Deletion::Referenced);
                }
                tx.execute("DELETE FROM events WHERE event_id = ?1", rusqlite::params![id])?;
                tx.commit()?;
                Ok(Deletion::Deleted)
            })
            .await?;
        Ok(outcome)
    }

    pub async fn list_events(&self) -> Result<Vec<Event>> {
        let raws = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at, rowid"
                ))?;
                let rows = stmt
                    .query_map([], event_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawEvent::into_event).collect()
    }

    // ── Attendance ────────────────────────────────────────────────────────

    pub async fn insert_record(&self, record: AttendanceRecord) -> Result<bool> {
        let id = encode_uuid(record.id.0);
        let event = encode_uuid(record.event.0);
        let person = encode_uuid(record.person.0);
        let recorded_at = encode_dt(record.timestamp);
        let source = record.source.as_str();
        let similarity = record.similarity.map(f64::from);
        let marked_by = record.marked_by.map(|id| encode_uuid(id.0));
        let notes = record.notes;

        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    &format!(
                        "INSERT OR IGNORE INTO attendance ({RECORD_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                    ),
                    rusqlite::params![
                        id,
                        event,
                        person,
                        recorded_at,
                        source,
                        similarity,
                        marked_by,
                        notes,
                    ],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    pub async fn find_record(
        &self,
        event: EventId,
        person: IdentityId,
    ) -> Result<Option<AttendanceRecord>> {
        let event = encode_uuid(event.0);
        let person = encode_uuid(person.0);
        let raw = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {RECORD_COLUMNS} FROM attendance
                             WHERE event_id = ?1 AND person_id = ?2"
                        ),
                        rusqlite::params![event, person],
                        record_row,
                    )
                    .optional()?)
            })
            .await?;
        raw.map(RawRecord::into_record).transpose()
    }

    pub async fn list_records(&self, query: RecordQuery) -> Result<Vec<AttendanceRecord>> {
        let event = query.event.map(|id| encode_uuid(id.0));
        let person = query.person.map(|id| encode_uuid(id.0));
        let raws = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RECORD_COLUMNS} FROM attendance
                     WHERE (?1 IS NULL OR event_id = ?1)
                       AND (?2 IS NULL OR person_id = ?2)
                     ORDER BY recorded_at DESC, rowid DESC"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![event, person], record_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    pub async fn count_records(&self, event: EventId) -> Result<usize> {
        let event = encode_uuid(event.0);
        let count: i64 = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM attendance WHERE event_id = ?1",
                    rusqlite::params![event],
                    |r| r.get(0),
                )?)
            })
            .await?;
        Ok(count as usize)
    }

    // ── Notifications ─────────────────────────────────────────────────────

    pub async fn push_notification(&self, notification: Notification) -> Result<()> {
        let id = encode_uuid(notification.id.0);
        let recipient = encode_uuid(notification.recipient.0);
        let created_at = encode_dt(notification.created_at);
        let (title, body, read) = (notification.title, notification.body, notification.read);

        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO notifications ({NOTIFICATION_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                    ),
                    rusqlite::params![id, recipient, title, body, read, created_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn list_notifications(
        &self,
        recipient: IdentityId,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let recipient = encode_uuid(recipient.0);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let raws = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                     WHERE recipient_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![recipient, limit], notification_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        raws.into_iter().map(RawNotification::into_notification).collect()
    }

    pub async fn mark_notifications_read(&self, recipient: IdentityId) -> Result<usize> {
        let recipient = encode_uuid(recipient.0);
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE notifications SET read = 1 WHERE recipient_id = ?1 AND read = 0",
                    rusqlite::params![recipient],
                )?)
            })
            .await?;
        Ok(changed)
    }
}

// ─── Store impl ──────────────────────────────────────────────────────────────

impl Store for SqliteStore {
    async fn insert_account(&self, account: Account) -> StoreResult<bool> {
        Ok(SqliteStore::insert_account(self, account).await?)
    }

    async fn get_account(&self, id: IdentityId) -> StoreResult<Option<Account>> {
        Ok(SqliteStore::get_account(self, id).await?)
    }

    async fn update_account(&self, account: Account) -> StoreResult<bool> {
        Ok(SqliteStore::update_account(self, account).await?)
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(SqliteStore::list_accounts(self).await?)
    }

    async fn put_person(&self, person: Person) -> StoreResult<()> {
        Ok(SqliteStore::put_person(self, person).await?)
    }

    async fn upsert_person(&self, id: IdentityId, display_name: String) -> StoreResult<Person> {
        Ok(SqliteStore::upsert_person(self, id, display_name).await?)
    }

    async fn append_reference(
        &self,
        id: IdentityId,
        display_name: String,
        reference: Embedding,
    ) -> StoreResult<Person> {
        Ok(SqliteStore::append_reference(self, id, display_name, reference).await?)
    }

    async fn clear_references(&self, id: IdentityId) -> StoreResult<Option<Person>> {
        Ok(SqliteStore::clear_references(self, id).await?)
    }

    async fn delete_person(&self, id: IdentityId) -> StoreResult<Deletion> {
        Ok(SqliteStore::delete_person(self, id).await?)
    }

    async fn get_person(&self, id: IdentityId) -> StoreResult<Option<Person>> {
        Ok(SqliteStore::get_person(self, id).await?)
    }

    async fn list_people(&self) -> StoreResult<Vec<Person>> {
        Ok(SqliteStore::list_people(self).await?)
    }

    async fn insert_request(&self, request: AccessRequest) -> StoreResult<bool> {
        Ok(SqliteStore::insert_request(self, request).await?)
    }

    async fn get_request(&self, id: RequestId) -> StoreResult<Option<AccessRequest>> {
        Ok(SqliteStore::get_request(self, id).await?)
    }

    async fn replace_request(
        &self,
        expected: RequestStatus,
        request: AccessRequest,
    ) -> StoreResult<bool> {
        Ok(SqliteStore::replace_request(self, expected, request).await?)
    }

    async fn list_requests(&self, requester: Option<IdentityId>) -> StoreResult<Vec<AccessRequest>> {
        Ok(SqliteStore::list_requests(self, requester).await?)
    }

    async fn insert_event(&self, event: Event) -> StoreResult<()> {
        Ok(SqliteStore::insert_event(self, event).await?)
    }

    async fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Ok(SqliteStore::get_event(self, id).await?)
    }

    async fn update_event(&self, event: Event) -> StoreResult<bool> {
        Ok(SqliteStore::update_event(self, event).await?)
    }

    async fn delete_event(&self, id: EventId) -> StoreResult<Deletion> {
        Ok(SqliteStore::delete_event(self, id).await?)
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        Ok(SqliteStore::list_events(self).await?)
    }

    async fn insert_record(&self, record: AttendanceRecord) -> StoreResult<bool> {
        Ok(SqliteStore::insert_record(self, record).await?)
    }

    async fn find_record(
        &self,
        event: EventId,
        person: IdentityId,
    ) -> StoreResult<Option<AttendanceRecord>> {
        Ok(SqliteStore::find_record(self, event, person).await?)
    }

    async fn list_records(&self, query: RecordQuery) -> StoreResult<Vec<AttendanceRecord>> {
        Ok(SqliteStore::list_records(self, query).await?)
    }

    async fn count_records(&self, event: EventId) -> StoreResult<usize> {
        Ok(SqliteStore::count_records(self, event).await?)
    }

    async fn push_notification(&self, notification: Notification) -> StoreResult<()> {
        Ok(SqliteStore::push_notification(self, notification).await?)
    }

    async fn list_notifications(
        &self,
        recipient: IdentityId,
        limit: usize,
    ) -> StoreResult<Vec<Notification>> {
        Ok(SqliteStore::list_notifications(self, recipient, limit).await?)
    }

    async fn mark_notifications_read(&self, recipient: IdentityId) -> StoreResult<usize> {
        Ok(SqliteStore::mark_notifications_read(self, recipient).await?)
    }
}
