use std::str::FromStr;

use chrono::Utc;
use rollcall_core::{
    gate, AccessLedger, Action, DecisionCore, Error, EventPatch, EventRegistry, IdentityStore,
    NewEvent, Notifier, Person, Principal,
};
use rollcall_store::SqliteStore;
use serde::Serialize;
use zbus::{fdo, interface};

use crate::engine::EngineHandle;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the rollcall daemon.
///
/// Every call that acts on behalf of someone takes the caller's identity id
/// as its first argument. Results are JSON strings. Errors carry the stable
/// reason code as a `code: message` prefix.
pub struct AttendanceService {
    pub identities: IdentityStore<SqliteStore>,
    pub ledger: AccessLedger<SqliteStore>,
    pub registry: EventRegistry<SqliteStore>,
    pub core: DecisionCore<SqliteStore>,
    pub notices: Notifier<SqliteStore>,
    pub engine: EngineHandle,
}

fn to_fdo(err: Error) -> fdo::Error {
    let message = format!("{}: {err}", err.code());
    match err {
        Error::Unauthorized(_) | Error::NotApproved => fdo::Error::AccessDenied(message),
        Error::NotFound { .. } => fdo::Error::UnknownObject(message),
        Error::DetectionTimeout(_) => fdo::Error::TimedOut(message),
        Error::InvalidEmbedding(_)
        | Error::InvalidEvent(_)
        | Error::UnknownVariant { .. }
        | Error::NameTaken(_)
        | Error::RoleMismatch { .. } => fdo::Error::InvalidArgs(message),
        _ => fdo::Error::Failed(message),
    }
}

fn json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(e.to_string()))
}

fn parse<T: FromStr<Err = Error>>(value: &str) -> fdo::Result<T> {
    value.parse().map_err(to_fdo)
}

fn parse_json<'a, T: serde::Deserialize<'a>>(what: &str, value: &'a str) -> fdo::Result<T> {
    serde_json::from_str(value).map_err(|e| fdo::Error::InvalidArgs(format!("{what}: {e}")))
}

/// People are reported without their embedding vectors.
fn person_json(person: &Person) -> serde_json::Value {
    serde_json::json!({
        "id": person.id,
        "display_name": person.display_name,
        "references": person.references.len(),
    })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl AttendanceService {
    async fn principal(&self, caller: &str) -> fdo::Result<Principal> {
        self.identities
            .principal(parse(caller)?)
            .await
            .map_err(to_fdo)
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        let admin = self.identities.admin().await.map_err(to_fdo)?;
        let policy = self.core.policy();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "admin_provisioned": admin.is_some(),
            "similarity_threshold": policy.threshold,
            "ambiguity_margin": policy.ambiguity_margin,
            "embedding_dim": self.identities.embedding_dim(),
        })
        .to_string())
    }

    // ── Identities ────────────────────────────────────────────────────────

    async fn provision_admin(&self, name: &str) -> fdo::Result<String> {
        let account = self
            .identities
            .provision_admin(name, Utc::now())
            .await
            .map_err(to_fdo)?;
        json(&account)
    }

    async fn register(&self, name: &str, role: &str) -> fdo::Result<String> {
        let account = self
            .identities
            .register(name, parse(role)?, Utc::now())
            .await
            .map_err(to_fdo)?;
        json(&account)
    }

    async fn whoami(&self, caller: &str) -> fdo::Result<String> {
        json(&self.principal(caller).await?)
    }

    async fn assign_role(&self, caller: &str, identity: &str, role: &str) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        let account = self
            .identities
            .assign_role(&admin, parse(identity)?, parse(role)?)
            .await
            .map_err(to_fdo)?;
        json(&account)
    }

    /// Enroll a reference face extracted from `image`.
    async fn enroll(
        &self,
        caller: &str,
        person: &str,
        display_name: &str,
        image: Vec<u8>,
    ) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        gate(&admin, Action::ManagePeople, None).map_err(to_fdo)?;
        let embedding = self
            .engine
            .embed(image)
            .await
            .map_err(|e| to_fdo(e.into()))?;
        let person = self
            .identities
            .enroll(&admin, parse(person)?, display_name, embedding)
            .await
            .map_err(to_fdo)?;
        tracing::info!(person = %person.id, "enrolled via D-Bus");
        json(&person_json(&person))
    }

    async fn add_person(&self, caller: &str, person: &str, display_name: &str) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        let person = self
            .identities
            .add_person(&admin, parse(person)?, display_name)
            .await
            .map_err(to_fdo)?;
        json(&person_json(&person))
    }

    async fn list_people(&self, caller: &str) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        let people = self.identities.people(&admin).await.map_err(to_fdo)?;
        json(&people.iter().map(person_json).collect::<Vec<_>>())
    }

    /// Drop every reference face of `person`; manual marking still works.
    async fn clear_references(&self, caller: &str, person: &str) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        let person = self
            .identities
            .clear_references(&admin, parse(person)?)
            .await
            .map_err(to_fdo)?;
        json(&person_json(&person))
    }

    async fn remove_person(&self, caller: &str, person: &str) -> fdo::Result<()> {
        let admin = self.principal(caller).await?;
        self.identities
            .remove_person(&admin, parse(person)?)
            .await
            .map_err(to_fdo)
    }

    // ── Access requests ───────────────────────────────────────────────────

    async fn submit_request(&self, caller: &str) -> fdo::Result<String> {
        let request = self
            .ledger
            .submit(parse(caller)?, Utc::now())
            .await
            .map_err(to_fdo)?;
        json(&request)
    }

    async fn resolve_request(
        &self,
        caller: &str,
        request: &str,
        resolution: &str,
    ) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        let request = self
            .ledger
            .resolve(parse(request)?, parse(resolution)?, &admin, Utc::now())
            .await
            .map_err(to_fdo)?;
        json(&request)
    }

    async fn pending_requests(&self, caller: &str) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        json(&self.ledger.pending(&admin).await.map_err(to_fdo)?)
    }

    /// Request history of `identity`, oldest first; an empty `identity`
    /// means the caller. Other identities' history is admin only.
    async fn request_history(&self, caller: &str, identity: &str) -> fdo::Result<String> {
        let viewer = self.principal(caller).await?;
        let requester = match non_empty(identity) {
            Some(id) => parse(&id)?,
            None => viewer.id,
        };
        json(&self.ledger.history(&viewer, requester).await.map_err(to_fdo)?)
    }

    // ── Events ────────────────────────────────────────────────────────────

    /// `event` is a JSON object with `name`, `starts_at`, `ends_at` and
    /// optional `description` and `venue`.
    async fn create_event(&self, caller: &str, event: &str) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        let new: NewEvent = parse_json("event", event)?;
        json(&self.registry.create(&admin, new, Utc::now()).await.map_err(to_fdo)?)
    }

    async fn edit_event(&self, caller: &str, event: &str, patch: &str) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        let patch: EventPatch = parse_json("patch", patch)?;
        json(&self.registry.edit(&admin, parse(event)?, patch).await.map_err(to_fdo)?)
    }

    async fn delete_event(&self, caller: &str, event: &str) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        json(&self.registry.delete(&admin, parse(event)?).await.map_err(to_fdo)?)
    }

    async fn purge_event(&self, caller: &str, event: &str) -> fdo::Result<()> {
        let admin = self.principal(caller).await?;
        self.registry.purge(&admin, parse(event)?).await.map_err(to_fdo)
    }

    async fn share_event(&self, caller: &str, event: &str, coordinator: &str) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        json(
            &self
                .registry
                .share(&admin, parse(event)?, parse(coordinator)?)
                .await
                .map_err(to_fdo)?,
        )
    }

    async fn unshare_event(
        &self,
        caller: &str,
        event: &str,
        coordinator: &str,
    ) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        json(
            &self
                .registry
                .unshare(&admin, parse(event)?, parse(coordinator)?)
                .await
                .map_err(to_fdo)?,
        )
    }

    async fn list_events(&self, caller: &str) -> fdo::Result<String> {
        let viewer = self.principal(caller).await?;
        json(&self.registry.list(&viewer).await.map_err(to_fdo)?)
    }

    // ── Attendance ────────────────────────────────────────────────────────

    /// Decide one face captured at `event`.
    async fn observe(&self, caller: &str, event: &str, image: Vec<u8>) -> fdo::Result<String> {
        let camera = self.principal(caller).await?;
        gate(&camera, Action::MarkFaceAttendance, None).map_err(to_fdo)?;
        let event = parse(event)?;
        let embedding = self
            .engine
            .embed(image)
            .await
            .map_err(|e| to_fdo(e.into()))?;
        let result = self
            .core
            .observe(event, &embedding, Utc::now())
            .await
            .map_err(to_fdo)?;
        json(&result)
    }

    /// Decide every face of a group photo captured at `event`.
    async fn observe_group(&self, caller: &str, event: &str, image: Vec<u8>) -> fdo::Result<String> {
        let camera = self.principal(caller).await?;
        gate(&camera, Action::MarkFaceAttendance, None).map_err(to_fdo)?;
        let event = parse(event)?;
        let faces = self
            .engine
            .embed_all(image)
            .await
            .map_err(|e| to_fdo(e.into()))?;
        if faces.is_empty() {
            return Err(to_fdo(Error::NoFaceFound));
        }
        let results = self
            .core
            .observe_group(event, &faces, Utc::now())
            .await
            .map_err(to_fdo)?;
        json(&results)
    }

    /// `notes` may be empty.
    async fn mark_manual(
        &self,
        caller: &str,
        event: &str,
        person: &str,
        notes: &str,
    ) -> fdo::Result<String> {
        let admin = self.principal(caller).await?;
        let result = self
            .core
            .mark_manual(parse(event)?, parse(person)?, &admin, non_empty(notes), Utc::now())
            .await
            .map_err(to_fdo)?;
        json(&result)
    }

    async fn records(&self, caller: &str, event: &str) -> fdo::Result<String> {
        let viewer = self.principal(caller).await?;
        json(&self.core.records(&viewer, parse(event)?).await.map_err(to_fdo)?)
    }

    async fn summary(&self, caller: &str, event: &str) -> fdo::Result<String> {
        let viewer = self.principal(caller).await?;
        json(&self.core.summary(&viewer, parse(event)?).await.map_err(to_fdo)?)
    }

    async fn my_attendance(&self, caller: &str) -> fdo::Result<String> {
        let viewer = self.principal(caller).await?;
        json(&self.core.own_records(&viewer).await.map_err(to_fdo)?)
    }

    // ── Notifications ─────────────────────────────────────────────────────

    async fn notifications(&self, caller: &str) -> fdo::Result<String> {
        let viewer = self.principal(caller).await?;
        json(&self.notices.feed(&viewer).await.map_err(to_fdo)?)
    }

    async fn mark_notifications_read(&self, caller: &str) -> fdo::Result<u32> {
        let viewer = self.principal(caller).await?;
        let changed = self.notices.mark_read(&viewer).await.map_err(to_fdo)?;
        Ok(u32::try_from(changed).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{DenyReason, EventId};

    #[test]
    fn test_error_mapping_keeps_reason_code() {
        match to_fdo(Error::Unauthorized(DenyReason::InsufficientRole)) {
            fdo::Error::AccessDenied(msg) => assert!(msg.starts_with("insufficient_role:")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(to_fdo(Error::NotApproved), fdo::Error::AccessDenied(_)));
        assert!(matches!(
            to_fdo(Error::not_found("event", EventId::generate())),
            fdo::Error::UnknownObject(_)
        ));
        assert!(matches!(
            to_fdo(Error::DetectionTimeout(std::time::Duration::from_millis(5))),
            fdo::Error::TimedOut(_)
        ));
        match to_fdo(Error::EventNotActive(EventId::generate())) {
            fdo::Error::Failed(msg) => assert!(msg.starts_with("event_not_active:")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bad_identity_is_invalid_args() {
        assert!(matches!(
            parse::<rollcall_core::IdentityId>("nope"),
            Err(fdo::Error::InvalidArgs(_))
        ));
    }

    #[test]
    fn test_person_json_hides_vectors() {
        let person = Person {
            id: rollcall_core::IdentityId::generate(),
            display_name: "Alice".into(),
            references: vec![rollcall_core::Embedding::new(vec![1.0, 0.0])],
        };
        let value = person_json(&person);
        assert_eq!(value["references"], 1);
        assert_eq!(value["display_name"], "Alice");
        assert!(matches!(
            to_fdo(Error::has_dependent_records("person", person.id)),
            fdo::Error::Failed(msg) if msg.starts_with("has_dependent_records:")
        ));
        assert!(matches!(
            to_fdo(Error::NameTaken("alice".into())),
            fdo::Error::InvalidArgs(_)
        ));
    }

    #[test]
    fn test_blank_notes_are_none() {
        assert_eq!(non_empty("  "), None);
        assert_eq!(non_empty(" late "), Some("late".to_string()));
    }
}
