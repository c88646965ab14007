//! rollcall-core: attendance decisions for face-detected event check-in.
//!
//! A fixed role policy gates every operation. Identities become usable once
//! an administrator approves their access request. Observed face embeddings
//! are matched against the enrolled gallery and turned into at most one
//! attendance record per (event, person).

pub mod access;
pub mod decision;
pub mod error;
pub mod extract;
pub mod identity;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod notify;
pub mod registry;
pub mod store;
pub mod types;

pub use access::{authorize, gate, Action, Decision, DenyReason, Principal};
pub use decision::{AttendanceRecord, AttendanceSummary, DecisionCore, MatchResult, PersonRef, Source};
pub use error::{Error, Result};
pub use extract::{ExtractError, FaceEmbedder};
pub use identity::{Account, IdentityStore, Person, Role};
pub use ledger::{AccessLedger, AccessRequest, RequestStatus, Resolution};
pub use locks::EventLocks;
pub use memory::MemoryStore;
pub use notify::{Notification, Notifier};
pub use registry::{Event, EventPatch, EventRegistry, EventStatus, NewEvent, Removal};
pub use store::{Deletion, RecordQuery, Store, StoreError, StoreResult};
pub use types::{
    Candidate, Comparison, CosineMatcher, Embedding, EventId, IdentityId, MatchPolicy, Matcher,
    NotificationId, RecordId, RequestId, DEFAULT_AMBIGUITY_MARGIN, DEFAULT_EMBEDDING_DIM,
    DEFAULT_SIMILARITY_THRESHOLD,
};

#[cfg(test)]
mod tests;
