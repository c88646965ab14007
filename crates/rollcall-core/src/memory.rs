//! In-process [`Store`] backed by hash maps behind a single `RwLock`.
//!
//! Every conditional write runs under the write lock, so the checks and the
//! write are atomic. Useful for tests and for embedding the core without a
//! database.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::decision::AttendanceRecord;
use crate::identity::{Account, Person, Role};
use crate::ledger::{AccessRequest, RequestStatus};
use crate::notify::Notification;
use crate::registry::Event;
use crate::store::{Deletion, RecordQuery, Store, StoreError, StoreResult};
use crate::types::{Embedding, EventId, IdentityId, RequestId};

#[derive(Default)]
struct Tables {
    accounts: HashMap<IdentityId, Account>,
    people: HashMap<IdentityId, Person>,
    requests: Vec<AccessRequest>,
    events: Vec<Event>,
    records: Vec<AttendanceRecord>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for MemoryStore {
    async fn insert_account(&self, account: Account) -> StoreResult<bool> {
        let mut t = self.write()?;
        let admin_taken =
            account.role == Role::Admin && t.accounts.values().any(|a| a.role == Role::Admin);
        let name_taken = t.accounts.values().any(|a| a.name == account.name);
        if admin_taken || name_taken || t.accounts.contains_key(&account.id) {
            return Ok(false);
        }
        t.accounts.insert(account.id, account);
        Ok(true)
    }

    async fn get_account(&self, id: IdentityId) -> StoreResult<Option<Account>> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    async fn update_account(&self, account: Account) -> StoreResult<bool> {
        let mut t = self.write()?;
        match t.accounts.get_mut(&account.id) {
            Some(slot) => {
                *slot = account;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.read()?.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn put_person(&self, person: Person) -> StoreResult<()> {
        self.write()?.people.insert(person.id, person);
        Ok(())
    }

    async fn upsert_person(&self, id: IdentityId, display_name: String) -> StoreResult<Person> {
        let mut t = self.write()?;
        let person = t.people.entry(id).or_insert_with(|| Person {
            id,
            display_name: String::new(),
            references: Vec::new(),
        });
        person.display_name = display_name;
        Ok(person.clone())
    }

    async fn append_reference(
        &self,
        id: IdentityId,
        display_name: String,
        reference: Embedding,
    ) -> StoreResult<Person> {
        let mut t = self.write()?;
        let person = t.people.entry(id).or_insert_with(|| Person {
            id,
            display_name: String::new(),
            references: Vec::new(),
        });
        person.display_name = display_name;
        person.references.push(reference);
        Ok(person.clone())
    }

    async fn clear_references(&self, id: IdentityId) -> StoreResult<Option<Person>> {
        let mut t = self.write()?;
        Ok(t.people.get_mut(&id).map(|person| {
            person.references.clear();
            person.clone()
        }))
    }

    async fn delete_person(&self, id: IdentityId) -> StoreResult<Deletion> {
        let mut t = self.write()?;
        if t.records.iter().any(|r| r.person == id) {
            return Ok(Deletion::Referenced);
        }
        Ok(match t.people.remove(&id) {
            Some(_) => Deletion::Deleted,
            None => Deletion::Missing,
        })
    }

    async fn get_person(&self, id: IdentityId) -> StoreResult<Option<Person>> {
        Ok(self.read()?.people.get(&id).cloned())
    }

    async fn list_people(&self) -> StoreResult<Vec<Person>> {
        let mut people: Vec<Person> = self.read()?.people.values().cloned().collect();
        people.sort_by_key(|p| p.id);
        Ok(people)
    }

    async fn insert_request(&self, request: AccessRequest) -> StoreResult<bool> {
        let mut t = self.write()?;
        let pending = t
            .requests
            .iter()
            .any(|r| r.requester == request.requester && r.status == RequestStatus::Pending);
        if pending {
            return Ok(false);
        }
        t.requests.push(request);
        Ok(true)
    }

    async fn get_request(&self, id: RequestId) -> StoreResult<Option<AccessRequest>> {
        Ok(self.read()?.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn replace_request(
        &self,
        expected: RequestStatus,
        request: AccessRequest,
    ) -> StoreResult<bool> {
        let mut t = self.write()?;
        match t.requests.iter_mut().find(|r| r.id == request.id) {
            Some(slot) if slot.status == expected => {
                *slot = request;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_requests(&self, requester: Option<IdentityId>) -> StoreResult<Vec<AccessRequest>> {
        Ok(self
            .read()?
            .requests
            .iter()
            .filter(|r| requester.map_or(true, |id| r.requester == id))
            .cloned()
            .collect())
    }

    async fn insert_event(&self, event: Event) -> StoreResult<()> {
        self.write()?.events.push(event);
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.read()?.events.iter().find(|e| e.id == id).cloned())
    }

    async fn update_event(&self, event: Event) -> StoreResult<bool> {
        let mut t = self.write()?;
        match t.events.iter_mut().find(|e| e.id == event.id) {
            Some(slot) => {
                *slot = event;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_event(&self, id: EventId) -> StoreResult<Deletion> {
        let mut t = self.write()?;
        if t.records.iter().any(|r| r.event == id) {
            return Ok(Deletion::Referenced);
        }
        let before = t.events.len();
        t.events.retain(|e| e.id != id);
        Ok(if t.events.len() < before {
            Deletion::Deleted
        } else {
            Deletion::Missing
        })
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        Ok(self.read()?.events.clone())
    }

    async fn insert_record(&self, record: AttendanceRecord) -> StoreResult<bool> {
        let mut t = self.write()?;
        if t
            .records
            .iter()
            .any(|r| r.event == record.event && r.person == record.person)
        {
            return Ok(false);
        }
        t.records.push(record);
        Ok(true)
    }

    async fn find_record(
        &self,
        event: EventId,
        person: IdentityId,
    ) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self
            .read()?
            .records
            .iter()
            .find(|r| r.event == event && r.person == person)
            .cloned())
    }

    async fn list_records(&self, query: RecordQuery) -> StoreResult<Vec<AttendanceRecord>> {
        let mut records: Vec<AttendanceRecord> = self
            .read()?
            .records
            .iter()
            .filter(|r| query.event.map_or(true, |e| r.event == e))
            .filter(|r| query.person.map_or(true, |p| r.person == p))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn count_records(&self, event: EventId) -> StoreResult<usize> {
        Ok(self.read()?.records.iter().filter(|r| r.event == event).count())
    }

    async fn push_notification(&self, notification: Notification) -> StoreResult<()> {
        self.write()?.notifications.push(notification);
        Ok(())
    }

    async fn list_notifications(
        &self,
        recipient: IdentityId,
        limit: usize,
    ) -> StoreResult<Vec<Notification>> {
        Ok(self
            .read()?
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient == recipient)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_notifications_read(&self, recipient: IdentityId) -> StoreResult<usize> {
        let mut t = self.write()?;
        let mut changed = 0;
        for n in t
            .notifications
            .iter_mut()
            .filter(|n| n.recipient == recipient && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }
}
