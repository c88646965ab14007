//! Role Gate: the single authorization check in front of every mutating operation.
//!
//! The policy is a fixed table keyed by (role, action). It is compiled in and
//! cannot be changed at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::Role;
use crate::registry::Event;
use crate::types::IdentityId;

/// Gated actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ApproveRequest,
    CreateEvent,
    EditEvent,
    DeleteEvent,
    MarkManualAttendance,
    MarkFaceAttendance,
    ViewRecords,
    /// Enrollment of reference faces and role assignment.
    ManagePeople,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::ApproveRequest,
        Action::CreateEvent,
        Action::EditEvent,
        Action::DeleteEvent,
        Action::MarkManualAttendance,
        Action::MarkFaceAttendance,
        Action::ViewRecords,
        Action::ManagePeople,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::ApproveRequest => "approve_request",
            Action::CreateEvent => "create_event",
            Action::EditEvent => "edit_event",
            Action::DeleteEvent => "delete_event",
            Action::MarkManualAttendance => "mark_manual_attendance",
            Action::MarkFaceAttendance => "mark_face_attendance",
            Action::ViewRecords => "view_records",
            Action::ManagePeople => "manage_people",
        }
    }
}

/// Why an action was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotApproved,
    InsufficientRole,
    EventNotShared,
}

impl DenyReason {
    pub fn code(self) -> &'static str {
        match self {
            DenyReason::NotApproved => "not_approved",
            DenyReason::InsufficientRole => "insufficient_role",
            DenyReason::EventNotShared => "event_not_shared",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// `NotApproved` keeps its own error kind; every other denial is `Unauthorized`.
    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::NotApproved) => Err(Error::NotApproved),
            Decision::Deny(reason) => Err(Error::Unauthorized(reason)),
        }
    }
}

/// The explicit identity a call is made on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: IdentityId,
    pub role: Role,
    /// Admin, or the latest access request is approved.
    pub approved: bool,
}

impl Principal {
    pub fn new(id: IdentityId, role: Role, approved: bool) -> Self {
        Self { id, role, approved }
    }
}

enum Grant {
    Always,
    SharedEventOnly,
    Never,
}

const fn grant(role: Role, action: Action) -> Grant {
    match (role, action) {
        (Role::Admin, _) => Grant::Always,
        (Role::Coordinator, Action::ViewRecords) => Grant::SharedEventOnly,
        (Role::Coordinator, _) | (Role::User, _) => Grant::Never,
    }
}

/// Decide whether `principal` may perform `action`, optionally on `event`.
///
/// Checks run in a fixed order: role table, approval, event sharing.
/// Pure function, no side effects.
pub fn authorize(principal: &Principal, action: Action, event: Option<&Event>) -> Decision {
    match grant(principal.role, action) {
        Grant::Never => Decision::Deny(DenyReason::InsufficientRole),
        _ if !principal.approved => Decision::Deny(DenyReason::NotApproved),
        Grant::Always => Decision::Allow,
        Grant::SharedEventOnly => match event {
            Some(e) if e.is_shared_with(principal.id) => Decision::Allow,
            _ => Decision::Deny(DenyReason::EventNotShared),
        },
    }
}

/// [`authorize`] as a `Result`, logging denials.
pub fn gate(principal: &Principal, action: Action, event: Option<&Event>) -> Result<()> {
    let decision = authorize(principal, action, event);
    if let Decision::Deny(reason) = decision {
        tracing::warn!(
            principal = %principal.id,
            role = %principal.role,
            action = action.as_str(),
            %reason,
            "action denied"
        );
    }
    decision.into_result()
}

/// Guard for ungated self-service reads.
pub fn require_approved(principal: &Principal) -> Result<()> {
    if principal.approved {
        Ok(())
    } else {
        Err(Error::NotApproved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Event, EventStatus};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn principal(role: Role, approved: bool) -> Principal {
        Principal::new(IdentityId::generate(), role, approved)
    }

    fn event(shared_with: &[IdentityId]) -> Event {
        let now = Utc::now();
        Event {
            id: crate::types::EventId::generate(),
            name: "Workshop".into(),
            description: String::new(),
            venue: String::new(),
            starts_at: now,
            ends_at: now,
            owner: IdentityId::generate(),
            status: EventStatus::Active,
            shared_with: shared_with.iter().copied().collect::<BTreeSet<_>>(),
            created_at: now,
        }
    }

    #[test]
    fn test_admin_allowed_everything() {
        let admin = principal(Role::Admin, true);
        for action in Action::ALL {
            assert_eq!(authorize(&admin, action, None), Decision::Allow, "{action:?}");
        }
    }

    #[test]
    fn test_user_denied_everything() {
        let user = principal(Role::User, true);
        for action in Action::ALL {
            assert_eq!(
                authorize(&user, action, None),
                Decision::Deny(DenyReason::InsufficientRole)
            );
        }
    }

    #[test]
    fn test_coordinator_views_only_shared_events() {
        let coordinator = principal(Role::Coordinator, true);
        let shared = event(&[coordinator.id]);
        let other = event(&[]);

        assert_eq!(
            authorize(&coordinator, Action::ViewRecords, Some(&shared)),
            Decision::Allow
        );
        assert_eq!(
            authorize(&coordinator, Action::ViewRecords, Some(&other)),
            Decision::Deny(DenyReason::EventNotShared)
        );
        assert_eq!(
            authorize(&coordinator, Action::ViewRecords, None),
            Decision::Deny(DenyReason::EventNotShared)
        );
        for action in Action::ALL.into_iter().filter(|a| *a != Action::ViewRecords) {
            assert_eq!(
                authorize(&coordinator, action, Some(&shared)),
                Decision::Deny(DenyReason::InsufficientRole)
            );
        }
    }

    #[test]
    fn test_unapproved_coordinator_is_not_approved() {
        let coordinator = principal(Role::Coordinator, false);
        let shared = event(&[coordinator.id]);
        assert_eq!(
            authorize(&coordinator, Action::ViewRecords, Some(&shared)),
            Decision::Deny(DenyReason::NotApproved)
        );
        // Role check comes first for actions the role never holds.
        assert_eq!(
            authorize(&coordinator, Action::CreateEvent, None),
            Decision::Deny(DenyReason::InsufficientRole)
        );
    }

    #[test]
    fn test_into_result_error_kinds() {
        assert!(Decision::Allow.into_result().is_ok());
        assert!(matches!(
            Decision::Deny(DenyReason::NotApproved).into_result(),
            Err(Error::NotApproved)
        ));
        assert!(matches!(
            Decision::Deny(DenyReason::InsufficientRole).into_result(),
            Err(Error::Unauthorized(DenyReason::InsufficientRole))
        ));
    }
}
