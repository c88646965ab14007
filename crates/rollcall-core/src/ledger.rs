//! Access Request Ledger.
//!
//! Each request is a small state machine: `Pending -> Approved | Rejected`.
//! Resolved states are terminal; re-application creates a new request.
//! Requests are never deleted.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{gate, Action, Principal};
use crate::error::{Error, Result};
use crate::identity::Role;
use crate::notify::Notifier;
use crate::store::Store;
use crate::types::{IdentityId, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// The only valid transitions are out of `Pending`.
    pub fn transition(self, resolution: Resolution) -> Option<RequestStatus> {
        match (self, resolution) {
            (RequestStatus::Pending, Resolution::Approve) => Some(RequestStatus::Approved),
            (RequestStatus::Pending, Resolution::Reject) => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(Error::UnknownVariant {
                kind: "request status",
                value: s.to_string(),
            }),
        }
    }
}

/// Admin decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Approve,
    Reject,
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Resolution::Approve),
            "reject" | "rejected" => Ok(Resolution::Reject),
            _ => Err(Error::UnknownVariant {
                kind: "resolution",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: RequestId,
    pub requester: IdentityId,
    pub status: RequestStatus,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<IdentityId>,
}

impl AccessRequest {
    /// Apply `resolution`, rejecting any transition out of a terminal state.
    pub fn resolved(
        &self,
        resolution: Resolution,
        by: IdentityId,
        at: DateTime<Utc>,
    ) -> Result<AccessRequest> {
        let status = self
            .status
            .transition(resolution)
            .ok_or(Error::AlreadyResolved(self.id))?;
        Ok(AccessRequest {
            status,
            resolved_at: Some(at),
            resolved_by: Some(by),
            ..self.clone()
        })
    }
}

/// Status of the most recently submitted request.
pub(crate) fn latest_status(requests: &[AccessRequest]) -> Option<RequestStatus> {
    requests
        .iter()
        .max_by_key(|r| r.submitted_at)
        .map(|r| r.status)
}

pub struct AccessLedger<S> {
    store: Arc<S>,
    notices: Notifier<S>,
}

impl<S: Store> AccessLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            notices: Notifier::new(Arc::clone(&store)),
            store,
        }
    }

    /// Open a new request. Not gated: any registered identity may apply.
    ///
    /// Approval follows the latest request, so an identity that is currently
    /// approved cannot apply again (`AlreadyApproved`); re-application is for
    /// rejected identities.
    pub async fn submit(&self, requester: IdentityId, at: DateTime<Utc>) -> Result<AccessRequest> {
        let account = self
            .store
            .get_account(requester)
            .await?
            .ok_or_else(|| Error::not_found("identity", requester))?;
        if account.role == Role::Admin
            || latest_status(&self.store.list_requests(Some(requester)).await?)
                == Some(RequestStatus::Approved)
        {
            return Err(Error::AlreadyApproved(requester));
        }

        let request = AccessRequest {
            id: RequestId::generate(),
            requester,
            status: RequestStatus::Pending,
            submitted_at: at,
            resolved_at: None,
            resolved_by: None,
        };
        if !self.store.insert_request(request.clone()).await? {
            return Err(Error::IdempotencyViolation(requester));
        }
        tracing::info!(request = %request.id, %requester, "access request submitted");

        for admin in self
            .store
            .list_accounts()
            .await?
            .into_iter()
            .filter(|a| a.role == Role::Admin)
        {
            self.notices
                .send(
                    admin.id,
                    "Approval required",
                    format!("{} ({}) requested access.", account.name, account.role),
                    at,
                )
                .await;
        }
        Ok(request)
    }

    /// Resolve a pending request. Atomic per request: the store only accepts
    /// the write while the stored status is still `Pending`.
    pub async fn resolve(
        &self,
        id: RequestId,
        resolution: Resolution,
        admin: &Principal,
        at: DateTime<Utc>,
    ) -> Result<AccessRequest> {
        gate(admin, Action::ApproveRequest, None)?;

        let current = self
            .store
            .get_request(id)
            .await?
            .ok_or_else(|| Error::not_found("access request", id))?;
        let updated = current.resolved(resolution, admin.id, at)?;

        if !self
            .store
            .replace_request(RequestStatus::Pending, updated.clone())
            .await?
        {
            return Err(Error::AlreadyResolved(id));
        }
        tracing::info!(
            request = %id,
            requester = %updated.requester,
            status = %updated.status,
            by = %admin.id,
            "access request resolved"
        );

        let (title, body) = match updated.status {
            RequestStatus::Approved => ("Access approved", "Your access request has been approved."),
            _ => ("Access rejected", "Your access request has been rejected."),
        };
        self.notices.send(updated.requester, title, body, at).await;
        Ok(updated)
    }

    pub async fn get(&self, id: RequestId) -> Result<AccessRequest> {
        self.store
            .get_request(id)
            .await?
            .ok_or_else(|| Error::not_found("access request", id))
    }

    /// Pending requests, oldest first.
    pub async fn pending(&self, admin: &Principal) -> Result<Vec<AccessRequest>> {
        gate(admin, Action::ApproveRequest, None)?;
        Ok(self
            .store
            .list_requests(None)
            .await?
            .into_iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .collect())
    }

    /// An identity's requests, oldest first. Reading someone else's history
    /// takes `ApproveRequest`.
    pub async fn history(
        &self,
        viewer: &Principal,
        requester: IdentityId,
    ) -> Result<Vec<AccessRequest>> {
        if viewer.id != requester {
            gate(viewer, Action::ApproveRequest, None)?;
        }
        Ok(self.store.list_requests(Some(requester)).await?)
    }

    /// Status of the identity's most recent request, if it ever applied.
    pub async fn approval(&self, requester: IdentityId) -> Result<Option<RequestStatus>> {
        Ok(latest_status(&self.store.list_requests(Some(requester)).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityStore;
    use crate::memory::MemoryStore;

    struct Fixture {
        ids: IdentityStore<MemoryStore>,
        ledger: AccessLedger<MemoryStore>,
        admin: Principal,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ids = IdentityStore::new(Arc::clone(&store), 3);
        let ledger = AccessLedger::new(Arc::clone(&store));
        let admin = ids.provision_admin("root", Utc::now()).await.unwrap();
        let admin = ids.principal(admin.id).await.unwrap();
        Fixture { ids, ledger, admin }
    }

    #[test]
    fn test_transitions_only_out_of_pending() {
        use RequestStatus::*;
        assert_eq!(Pending.transition(Resolution::Approve), Some(Approved));
        assert_eq!(Pending.transition(Resolution::Reject), Some(Rejected));
        for terminal in [Approved, Rejected] {
            assert!(terminal.is_terminal());
            assert_eq!(terminal.transition(Resolution::Approve), None);
            assert_eq!(terminal.transition(Resolution::Reject), None);
        }
    }

    #[tokio::test]
    async fn test_submit_twice_is_idempotency_violation() {
        let f = fixture().await;
        let user = f.ids.register("bob", Role::User, Utc::now()).await.unwrap();

        f.ledger.submit(user.id, Utc::now()).await.unwrap();
        assert!(matches!(
            f.ledger.submit(user.id, Utc::now()).await,
            Err(Error::IdempotencyViolation(id)) if id == user.id
        ));
        let me = f.ids.principal(user.id).await.unwrap();
        assert_eq!(f.ledger.history(&me, user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_unknown_identity() {
        let f = fixture().await;
        assert!(matches!(
            f.ledger.submit(IdentityId::generate(), Utc::now()).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_then_resolve_again() {
        let f = fixture().await;
        let user = f.ids.register("bob", Role::User, Utc::now()).await.unwrap();
        let request = f.ledger.submit(user.id, Utc::now()).await.unwrap();

        let approved = f
            .ledger
            .resolve(request.id, Resolution::Approve, &f.admin, Utc::now())
            .await
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.resolved_by, Some(f.admin.id));

        assert!(matches!(
            f.ledger.resolve(request.id, Resolution::Reject, &f.admin, Utc::now()).await,
            Err(Error::AlreadyResolved(id)) if id == request.id
        ));
        assert_eq!(
            f.ledger.get(request.id).await.unwrap().status,
            RequestStatus::Approved
        );
        assert!(f.ids.principal(user.id).await.unwrap().approved);
    }

    #[tokio::test]
    async fn test_resolve_requires_admin() {
        let f = fixture().await;
        let user = f.ids.register("bob", Role::User, Utc::now()).await.unwrap();
        let coordinator = f.ids.register("cat", Role::Coordinator, Utc::now()).await.unwrap();
        let request = f.ledger.submit(user.id, Utc::now()).await.unwrap();
        let not_admin = Principal::new(coordinator.id, Role::Coordinator, true);

        assert!(matches!(
            f.ledger.resolve(request.id, Resolution::Approve, &not_admin, Utc::now()).await,
            Err(Error::Unauthorized(_))
        ));
        assert_eq!(
            f.ledger.get(request.id).await.unwrap().status,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_resolve_unknown_request() {
        let f = fixture().await;
        assert!(matches!(
            f.ledger
                .resolve(RequestId::generate(), Resolution::Approve, &f.admin, Utc::now())
                .await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reapply_after_rejection() {
        let f = fixture().await;
        let user = f.ids.register("bob", Role::User, Utc::now()).await.unwrap();
        let first = f.ledger.submit(user.id, Utc::now()).await.unwrap();
        f.ledger
            .resolve(first.id, Resolution::Reject, &f.admin, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            f.ledger.approval(user.id).await.unwrap(),
            Some(RequestStatus::Rejected)
        );

        let second = f.ledger.submit(user.id, Utc::now()).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(f.ledger.pending(&f.admin).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_approved_identity_cannot_reapply() {
        let f = fixture().await;
        let user = f.ids.register("bob", Role::User, Utc::now()).await.unwrap();
        let request = f.ledger.submit(user.id, Utc::now()).await.unwrap();
        f.ledger
            .resolve(request.id, Resolution::Approve, &f.admin, Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            f.ledger.submit(user.id, Utc::now()).await,
            Err(Error::AlreadyApproved(id)) if id == user.id
        ));
        assert!(f.ids.principal(user.id).await.unwrap().approved);
        assert!(matches!(
            f.ledger.submit(f.admin.id, Utc::now()).await,
            Err(Error::AlreadyApproved(_))
        ));
    }

    #[tokio::test]
    async fn test_history_of_others_needs_admin() {
        let f = fixture().await;
        let bob = f.ids.register("bob", Role::User, Utc::now()).await.unwrap();
        let cat = f.ids.register("cat", Role::Coordinator, Utc::now()).await.unwrap();
        f.ledger.submit(bob.id, Utc::now()).await.unwrap();
        let cat = f.ids.principal(cat.id).await.unwrap();

        assert!(matches!(
            f.ledger.history(&cat, bob.id).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(f.ledger.history(&cat, cat.id).await.unwrap().is_empty());
        assert_eq!(f.ledger.history(&f.admin, bob.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_have_one_winner() {
        let f = fixture().await;
        let user = f.ids.register("bob", Role::User, Utc::now()).await.unwrap();
        let request = f.ledger.submit(user.id, Utc::now()).await.unwrap();
        let ledger = Arc::new(f.ledger);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let ledger = Arc::clone(&ledger);
            let admin = f.admin;
            let resolution = if i % 2 == 0 {
                Resolution::Approve
            } else {
                Resolution::Reject
            };
            tasks.push(tokio::spawn(async move {
                ledger.resolve(request.id, resolution, &admin, Utc::now()).await
            }));
        }

        let mut wins = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => wins += 1,
                Err(Error::AlreadyResolved(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
    }
}
