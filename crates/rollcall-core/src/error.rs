//! Error types for `rollcall-core`.

use std::time::Duration;

use thiserror::Error;

use crate::access::DenyReason;
use crate::identity::Role;
use crate::store::StoreError;
use crate::types::{EventId, IdentityId, RequestId};

#[derive(Error, Debug)]
pub enum Error {
    #[error("unauthorized: {0}")]
    Unauthorized(DenyReason),
    #[error("identity has not been approved by an administrator")]
    NotApproved,
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("access request {0} is already resolved")]
    AlreadyResolved(RequestId),
    #[error("identity {0} already has a pending access request")]
    IdempotencyViolation(IdentityId),
    #[error("event {0} is not active")]
    EventNotActive(EventId),
    #[error("{kind} {id} still has attendance records")]
    HasDependentRecords { kind: &'static str, id: String },
    #[error("face embedding extraction timed out after {0:?}")]
    DetectionTimeout(Duration),
    #[error("no face found in image")]
    NoFaceFound,
    #[error("expected exactly one face, found {0}")]
    MultipleFacesFound(usize),
    #[error("embedding extraction failed: {0}")]
    Extraction(String),
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("invalid match policy: {0}")]
    InvalidPolicy(String),
    #[error("expected role {expected}, found {found}")]
    RoleMismatch { expected: Role, found: Role },
    #[error("identity {0} has already been approved")]
    AlreadyApproved(IdentityId),
    #[error("account name {0:?} is already taken")]
    NameTaken(String),
    #[error("an administrator has already been provisioned")]
    AdminAlreadyProvisioned,
    #[error("the administrator role cannot be granted or changed")]
    AdminImmutable,
    #[error("unknown {kind}: {value:?}")]
    UnknownVariant { kind: &'static str, value: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn has_dependent_records(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::HasDependentRecords {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable reason code for user-visible error reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(reason) => reason.code(),
            Self::NotApproved => DenyReason::NotApproved.code(),
            Self::NotFound { .. } => "not_found",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::IdempotencyViolation(_) => "idempotency_violation",
            Self::EventNotActive(_) => "event_not_active",
            Self::HasDependentRecords { .. } => "has_dependent_records",
            Self::DetectionTimeout(_) => "detection_timeout",
            Self::NoFaceFound => "no_face_found",
            Self::MultipleFacesFound(_) => "multiple_faces_found",
            Self::Extraction(_) => "extraction_failed",
            Self::InvalidEmbedding(_) => "invalid_embedding",
            Self::InvalidEvent(_) => "invalid_event",
            Self::InvalidPolicy(_) => "invalid_policy",
            Self::RoleMismatch { .. } => "role_mismatch",
            Self::AlreadyApproved(_) => "already_approved",
            Self::NameTaken(_) => "name_taken",
            Self::AdminAlreadyProvisioned => "admin_already_provisioned",
            Self::AdminImmutable => "admin_immutable",
            Self::UnknownVariant { .. } => "unknown_variant",
            Self::Store(_) => "storage",
        }
    }

    /// Whether the caller may retry with fresh input (e.g. the next camera frame).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DetectionTimeout(_) | Self::NoFaceFound | Self::MultipleFacesFound(_)
        )
    }
}
