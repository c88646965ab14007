//! SQL schema for the rollcall SQLite store.
//!
//! Executed on every open; `PRAGMA user_version` records the layout version.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS accounts (
    identity_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    role        TEXT NOT NULL CHECK (role IN ('admin', 'coordinator', 'user')),
    created_at  TEXT NOT NULL
);

-- Account names are login names.
CREATE UNIQUE INDEX IF NOT EXISTS accounts_name ON accounts(name);

-- Exactly one administrator may ever exist.
CREATE UNIQUE INDEX IF NOT EXISTS accounts_single_admin
    ON accounts(role) WHERE role = 'admin';

CREATE TABLE IF NOT EXISTS people (
    person_id       TEXT PRIMARY KEY,
    display_name    TEXT NOT NULL,
    references_json TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS access_requests (
    request_id   TEXT PRIMARY KEY,
    requester_id TEXT NOT NULL REFERENCES accounts(identity_id),
    status       TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
    submitted_at TEXT NOT NULL,
    resolved_at  TEXT,
    resolved_by  TEXT
);

-- At most one pending request per requester.
CREATE UNIQUE INDEX IF NOT EXISTS access_requests_one_pending
    ON access_requests(requester_id) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS events (
    event_id     TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    description  TEXT NOT NULL DEFAULT '',
    venue        TEXT NOT NULL DEFAULT '',
    starts_at    TEXT NOT NULL,
    ends_at      TEXT NOT NULL,
    owner_id     TEXT NOT NULL,
    status       TEXT NOT NULL CHECK (status IN ('active', 'closed')),
    shared_with  TEXT NOT NULL DEFAULT '[]',  -- JSON array of identity ids
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    record_id   TEXT PRIMARY KEY,
    event_id    TEXT NOT NULL REFERENCES events(event_id),
    person_id   TEXT NOT NULL REFERENCES people(person_id),
    recorded_at TEXT NOT NULL,
    source      TEXT NOT NULL CHECK (source IN ('face_detection', 'manual')),
    similarity  REAL,
    marked_by   TEXT,
    notes       TEXT,
    UNIQUE (event_id, person_id)
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id TEXT PRIMARY KEY,
    recipient_id    TEXT NOT NULL,
    title           TEXT NOT NULL,
    body            TEXT NOT NULL,
    read            INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS attendance_person_idx      ON attendance(person_id);
CREATE INDEX IF NOT EXISTS requests_requester_idx     ON access_requests(requester_id);
CREATE INDEX IF NOT EXISTS notifications_recipient_idx ON notifications(recipient_id, read);

PRAGMA user_version = 1;
";
