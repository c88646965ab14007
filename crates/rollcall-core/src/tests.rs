//! End-to-end flows across the ledger, registry and decision core.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    AccessLedger, DecisionCore, Embedding, Error, EventLocks, EventRegistry, IdentityStore,
    MatchPolicy, MatchResult, MemoryStore, NewEvent, Notifier, Resolution, Role, Source,
};

const DIM: usize = 2;

struct System {
    identities: IdentityStore<MemoryStore>,
    ledger: AccessLedger<MemoryStore>,
    registry: EventRegistry<MemoryStore>,
    core: DecisionCore<MemoryStore>,
    notices: Notifier<MemoryStore>,
}

fn system(threshold: f32) -> System {
    let store = Arc::new(MemoryStore::new());
    let locks = EventLocks::new();
    System {
        identities: IdentityStore::new(Arc::clone(&store), DIM),
        ledger: AccessLedger::new(Arc::clone(&store)),
        registry: EventRegistry::new(Arc::clone(&store), locks.clone()),
        core: DecisionCore::new(
            Arc::clone(&store),
            locks,
            MatchPolicy {
                threshold,
                ..MatchPolicy::default()
            },
            DIM,
        ),
        notices: Notifier::new(store),
    }
}

fn workshop(name: &str) -> NewEvent {
    let start = Utc::now();
    NewEvent {
        name: name.into(),
        description: String::new(),
        venue: "Lab 3".into(),
        starts_at: start,
        ends_at: start + Duration::hours(3),
    }
}

#[tokio::test]
async fn approved_user_checks_in_once() {
    let sys = system(0.8);
    let now = Utc::now();

    let admin_account = sys.identities.provision_admin("root", now).await.unwrap();
    let admin = sys.identities.principal(admin_account.id).await.unwrap();
    let event = sys.registry.create(&admin, workshop("Workshop1"), now).await.unwrap();

    let alice = sys.identities.register("alice", Role::User, now).await.unwrap();
    let pending = sys.identities.principal(alice.id).await.unwrap();
    assert!(!pending.approved);
    assert!(matches!(
        sys.registry.list(&pending).await,
        Err(Error::NotApproved)
    ));

    let request = sys.ledger.submit(alice.id, now).await.unwrap();
    sys.ledger
        .resolve(request.id, Resolution::Approve, &admin, now)
        .await
        .unwrap();
    let alice_principal = sys.identities.principal(alice.id).await.unwrap();
    assert!(alice_principal.approved);

    sys.identities
        .enroll(&admin, alice.id, "Alice", Embedding::new(vec![1.0, 0.0]))
        .await
        .unwrap();

    // Cosine similarity 0.92 against the enrolled reference.
    let probe = Embedding::new(vec![0.92, (1.0f32 - 0.92 * 0.92).sqrt()]);

    match sys.core.observe(event.id, &probe, now).await.unwrap() {
        MatchResult::Marked {
            person, similarity, ..
        } => {
            assert_eq!(person.id, alice.id);
            assert!(similarity.is_some_and(|s| (s - 0.92).abs() < 1e-4));
        }
        other => panic!("expected marked, got {other:?}"),
    }
    assert!(matches!(
        sys.core.observe(event.id, &probe, now).await.unwrap(),
        MatchResult::AlreadyMarked { .. }
    ));

    let records = sys.core.own_records(&alice_principal).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, Source::FaceDetection);

    let titles: Vec<String> = sys
        .notices
        .feed(&alice_principal)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert!(titles.contains(&"Access approved".to_string()));
    assert!(titles.contains(&"Attendance marked".to_string()));
}

#[tokio::test]
async fn coordinator_sees_only_shared_event_records() {
    let sys = system(0.8);
    let now = Utc::now();

    let admin_account = sys.identities.provision_admin("root", now).await.unwrap();
    let admin = sys.identities.principal(admin_account.id).await.unwrap();
    let shared = sys.registry.create(&admin, workshop("Shared"), now).await.unwrap();
    let private = sys.registry.create(&admin, workshop("Private"), now).await.unwrap();

    let cat = sys.identities.register("cat", Role::Coordinator, now).await.unwrap();
    let request = sys.ledger.submit(cat.id, now).await.unwrap();
    sys.ledger
        .resolve(request.id, Resolution::Approve, &admin, now)
        .await
        .unwrap();
    sys.registry.share(&admin, shared.id, cat.id).await.unwrap();
    let coordinator = sys.identities.principal(cat.id).await.unwrap();

    let bob = sys.identities.register("bob", Role::User, now).await.unwrap();
    sys.identities.add_person(&admin, bob.id, "Bob").await.unwrap();
    sys.core
        .mark_manual(shared.id, bob.id, &admin, None, now)
        .await
        .unwrap();

    let records = sys.core.records(&coordinator, shared.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].person, bob.id);
    assert!(matches!(
        sys.core.records(&coordinator, private.id).await,
        Err(Error::Unauthorized(_))
    ));
}

#[tokio::test]
async fn rejected_identity_stays_locked_out() {
    let sys = system(0.8);
    let now = Utc::now();

    let admin_account = sys.identities.provision_admin("root", now).await.unwrap();
    let admin = sys.identities.principal(admin_account.id).await.unwrap();
    let eve = sys.identities.register("eve", Role::User, now).await.unwrap();

    let request = sys.ledger.submit(eve.id, now).await.unwrap();
    sys.ledger
        .resolve(request.id, Resolution::Reject, &admin, now)
        .await
        .unwrap();
    assert!(matches!(
        sys.ledger
            .resolve(request.id, Resolution::Approve, &admin, now)
            .await,
        Err(Error::AlreadyResolved(_))
    ));

    let principal = sys.identities.principal(eve.id).await.unwrap();
    assert!(!principal.approved);
    assert!(matches!(
        sys.core.own_records(&principal).await,
        Err(Error::NotApproved)
    ));
}
