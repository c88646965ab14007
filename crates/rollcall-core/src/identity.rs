//! Identity Store: accounts, roles and enrolled people.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{gate, Action, Principal};
use crate::error::{Error, Result};
use crate::ledger::{latest_status, RequestStatus};
use crate::store::{Deletion, Store};
use crate::types::{Embedding, IdentityId};

/// Role assigned to an identity. `Admin` is a singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Coordinator,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Coordinator => "coordinator",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "coordinator" => Ok(Role::Coordinator),
            "user" => Ok(Role::User),
            _ => Err(Error::UnknownVariant {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// A registered identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: IdentityId,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A person known to the face gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: IdentityId,
    pub display_name: String,
    /// Reference embeddings; a person needs at least one to be matched.
    pub references: Vec<Embedding>,
}

impl Person {
    pub fn is_matchable(&self) -> bool {
        !self.references.is_empty()
    }
}

/// Accounts and people, backed by a [`Store`].
pub struct IdentityStore<S> {
    store: Arc<S>,
    embedding_dim: usize,
}

impl<S: Store> IdentityStore<S> {
    pub fn new(store: Arc<S>, embedding_dim: usize) -> Self {
        Self {
            store,
            embedding_dim,
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Create the singleton administrator. Fails once one exists.
    pub async fn provision_admin(&self, name: &str, at: DateTime<Utc>) -> Result<Account> {
        let account = Account {
            id: IdentityId::generate(),
            name: name.to_string(),
            role: Role::Admin,
            created_at: at,
        };
        if !self.store.insert_account(account.clone()).await? {
            return Err(match self.admin().await? {
                Some(_) => Error::AdminAlreadyProvisioned,
                None => Error::NameTaken(account.name),
            });
        }
        tracing::info!(id = %account.id, name, "administrator provisioned");
        Ok(account)
    }

    /// Self-registration. New identities still need an approved access request.
    /// Names are unique across accounts.
    pub async fn register(&self, name: &str, role: Role, at: DateTime<Utc>) -> Result<Account> {
        if role == Role::Admin {
            return Err(Error::AdminImmutable);
        }
        let account = Account {
            id: IdentityId::generate(),
            name: name.to_string(),
            role,
            created_at: at,
        };
        if !self.store.insert_account(account.clone()).await? {
            return Err(Error::NameTaken(account.name));
        }
        tracing::info!(id = %account.id, name, %role, "identity registered");
        Ok(account)
    }

    pub async fn account(&self, id: IdentityId) -> Result<Account> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| Error::not_found("identity", id))
    }

    /// The provisioned administrator, if any.
    pub async fn admin(&self) -> Result<Option<Account>> {
        Ok(self
            .store
            .list_accounts()
            .await?
            .into_iter()
            .find(|a| a.role == Role::Admin))
    }

    /// Resolve the explicit principal used for every gated call.
    pub async fn principal(&self, id: IdentityId) -> Result<Principal> {
        let account = self.account(id).await?;
        let approved = match account.role {
            Role::Admin => true,
            _ => {
                let requests = self.store.list_requests(Some(id)).await?;
                latest_status(&requests) == Some(RequestStatus::Approved)
            }
        };
        Ok(Principal::new(account.id, account.role, approved))
    }

    /// Change the role of a non-admin identity.
    pub async fn assign_role(
        &self,
        admin: &Principal,
        id: IdentityId,
        role: Role,
    ) -> Result<Account> {
        gate(admin, Action::ManagePeople, None)?;
        let mut account = self.account(id).await?;
        if role == Role::Admin || account.role == Role::Admin {
            return Err(Error::AdminImmutable);
        }
        account.role = role;
        if !self.store.update_account(account.clone()).await? {
            return Err(Error::not_found("identity", id));
        }
        tracing::info!(by = %admin.id, id = %id, %role, "role assigned");
        Ok(account)
    }

    /// Add a person without reference embeddings (manual attendance only),
    /// or rename an existing one. Stored references are kept.
    pub async fn add_person(
        &self,
        admin: &Principal,
        id: IdentityId,
        display_name: &str,
    ) -> Result<Person> {
        gate(admin, Action::ManagePeople, None)?;
        Ok(self.store.upsert_person(id, display_name.to_string()).await?)
    }

    /// Append a reference embedding, creating the person if needed.
    pub async fn enroll(
        &self,
        admin: &Principal,
        id: IdentityId,
        display_name: &str,
        embedding: Embedding,
    ) -> Result<Person> {
        gate(admin, Action::ManagePeople, None)?;
        embedding.validate(self.embedding_dim)?;

        let person = self
            .store
            .append_reference(id, display_name.to_string(), embedding)
            .await?;

        tracing::info!(
            person = %id,
            references = person.references.len(),
            "reference embedding enrolled"
        );
        Ok(person)
    }

    pub async fn person(&self, id: IdentityId) -> Result<Person> {
        self.store
            .get_person(id)
            .await?
            .ok_or_else(|| Error::not_found("person", id))
    }

    /// By-value snapshot of every enrolled person.
    pub async fn gallery(&self) -> Result<Vec<Person>> {
        Ok(self.store.list_people().await?)
    }

    /// The gallery, for administrators.
    pub async fn people(&self, admin: &Principal) -> Result<Vec<Person>> {
        gate(admin, Action::ManagePeople, None)?;
        self.gallery().await
    }

    /// Forget every reference face of a person. The person stays available
    /// for manual attendance.
    pub async fn clear_references(&self, admin: &Principal, id: IdentityId) -> Result<Person> {
        gate(admin, Action::ManagePeople, None)?;
        let person = self
            .store
            .clear_references(id)
            .await?
            .ok_or_else(|| Error::not_found("person", id))?;
        tracing::info!(person = %id, by = %admin.id, "reference embeddings cleared");
        Ok(person)
    }

    /// Remove a person. Refused while attendance records reference them.
    pub async fn remove_person(&self, admin: &Principal, id: IdentityId) -> Result<()> {
        gate(admin, Action::ManagePeople, None)?;
        match self.store.delete_person(id).await? {
            Deletion::Deleted => {
                tracing::info!(person = %id, by = %admin.id, "person removed");
                Ok(())
            }
            Deletion::Missing => Err(Error::not_found("person", id)),
            Deletion::Referenced => Err(Error::has_dependent_records("person", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn identities() -> IdentityStore<MemoryStore> {
        IdentityStore::new(Arc::new(MemoryStore::new()), 3)
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Coordinator".parse::<Role>().unwrap(), Role::Coordinator);
        assert!("owner".parse::<Role>().is_err());
    }

    #[tokio::test]
    async fn test_admin_is_a_singleton() {
        let ids = identities();
        ids.provision_admin("root", Utc::now()).await.unwrap();
        assert!(matches!(
            ids.provision_admin("second", Utc::now()).await,
            Err(Error::AdminAlreadyProvisioned)
        ));
        assert!(matches!(
            ids.register("sneaky", Role::Admin, Utc::now()).await,
            Err(Error::AdminImmutable)
        ));
    }

    #[tokio::test]
    async fn test_admin_role_cannot_change() {
        let ids = identities();
        let admin = ids.provision_admin("root", Utc::now()).await.unwrap();
        let principal = ids.principal(admin.id).await.unwrap();
        assert!(principal.approved);

        let user = ids.register("bob", Role::User, Utc::now()).await.unwrap();
        assert!(matches!(
            ids.assign_role(&principal, admin.id, Role::User).await,
            Err(Error::AdminImmutable)
        ));
        assert!(matches!(
            ids.assign_role(&principal, user.id, Role::Admin).await,
            Err(Error::AdminImmutable)
        ));
        let promoted = ids.assign_role(&principal, user.id, Role::Coordinator).await.unwrap();
        assert_eq!(promoted.role, Role::Coordinator);
    }

    #[tokio::test]
    async fn test_unapproved_identity_principal() {
        let ids = identities();
        let user = ids.register("carol", Role::User, Utc::now()).await.unwrap();
        let principal = ids.principal(user.id).await.unwrap();
        assert_eq!(principal.role, Role::User);
        assert!(!principal.approved);
    }

    #[tokio::test]
    async fn test_enroll_validates_dimension_and_appends() {
        let ids = identities();
        let admin = ids.provision_admin("root", Utc::now()).await.unwrap();
        let admin = ids.principal(admin.id).await.unwrap();
        let alice = IdentityId::generate();

        assert!(matches!(
            ids.enroll(&admin, alice, "Alice", Embedding::new(vec![1.0, 0.0])).await,
            Err(Error::InvalidEmbedding(_))
        ));

        ids.enroll(&admin, alice, "Alice", Embedding::new(vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        let person = ids
            .enroll(&admin, alice, "Alice", Embedding::new(vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(person.references.len(), 2);
        assert!(person.is_matchable());
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let ids = identities();
        ids.register("bob", Role::User, Utc::now()).await.unwrap();
        assert!(matches!(
            ids.register("bob", Role::Coordinator, Utc::now()).await,
            Err(Error::NameTaken(name)) if name == "bob"
        ));
        assert!(matches!(
            ids.provision_admin("bob", Utc::now()).await,
            Err(Error::NameTaken(_))
        ));
        assert!(ids.admin().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enrolls_keep_every_reference() {
        let ids = Arc::new(identities());
        let admin = ids.provision_admin("root", Utc::now()).await.unwrap();
        let admin = ids.principal(admin.id).await.unwrap();
        let alice = IdentityId::generate();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let ids = Arc::clone(&ids);
                tokio::spawn(async move {
                    let reference = Embedding::new(vec![1.0, i as f32, 0.0]);
                    ids.enroll(&admin, alice, "Alice", reference).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Renaming keeps the stored references.
        let renamed = ids.add_person(&admin, alice, "Alice L.").await.unwrap();
        assert_eq!(renamed.display_name, "Alice L.");
        assert_eq!(renamed.references.len(), 16);
        assert_eq!(ids.person(alice).await.unwrap().references.len(), 16);
    }

    #[tokio::test]
    async fn test_clear_and_remove_person() {
        let ids = identities();
        let admin = ids.provision_admin("root", Utc::now()).await.unwrap();
        let admin = ids.principal(admin.id).await.unwrap();
        let alice = IdentityId::generate();
        ids.enroll(&admin, alice, "Alice", Embedding::new(vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(ids.people(&admin).await.unwrap().len(), 1);

        let cleared = ids.clear_references(&admin, alice).await.unwrap();
        assert!(!cleared.is_matchable());

        ids.remove_person(&admin, alice).await.unwrap();
        assert!(ids.people(&admin).await.unwrap().is_empty());
        assert!(matches!(
            ids.remove_person(&admin, alice).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            ids.clear_references(&admin, alice).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_person_with_attendance_cannot_be_removed() {
        use crate::decision::{AttendanceRecord, Source};
        use crate::types::{EventId, RecordId};

        let store = Arc::new(MemoryStore::new());
        let ids = IdentityStore::new(Arc::clone(&store), 3);
        let admin = ids.provision_admin("root", Utc::now()).await.unwrap();
        let admin = ids.principal(admin.id).await.unwrap();
        let alice = IdentityId::generate();
        ids.add_person(&admin, alice, "Alice").await.unwrap();
        store
            .insert_record(AttendanceRecord {
                id: RecordId::generate(),
                event: EventId::generate(),
                person: alice,
                timestamp: Utc::now(),
                source: Source::Manual,
                similarity: None,
                marked_by: Some(admin.id),
                notes: None,
            })
            .await
            .unwrap();

        assert!(matches!(
            ids.remove_person(&admin, alice).await,
            Err(Error::HasDependentRecords { kind: "person", .. })
        ));
        assert!(ids.person(alice).await.is_ok());
    }

    #[tokio::test]
    async fn test_people_management_requires_admin() {
        let ids = identities();
        let user = ids.register("erin", Role::Coordinator, Utc::now()).await.unwrap();
        let coordinator = Principal::new(user.id, Role::Coordinator, true);
        assert!(matches!(
            ids.people(&coordinator).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            ids.remove_person(&coordinator, user.id).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_enroll_requires_admin() {
        let ids = identities();
        let user = ids.register("dave", Role::Coordinator, Utc::now()).await.unwrap();
        let principal = ids.principal(user.id).await.unwrap();
        assert!(matches!(
            ids.enroll(&principal, user.id, "Dave", Embedding::new(vec![1.0, 0.0, 0.0])).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(ids.gallery().await.unwrap().is_empty());
    }
}
