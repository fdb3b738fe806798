// src/store.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::{AuditKey, NewNotification, Notification, NotificationAudit, Person, PersonId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error ({context}): {source}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
    #[error("JSON error in {}: {source}", path.display())]
    Json {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        #[source]
        source: csv::Error,
        path: PathBuf,
    },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator owned by the HR application.
#[async_trait]
pub trait ResidenceStore: Send + Sync {
    /// Active people with a residence expiry date on record.
    async fn active_persons_with_expiry(&self) -> Result<Vec<Person>, StoreError>;

    async fn person(&self, id: PersonId) -> Result<Option<Person>, StoreError>;

    /// Active holders of an oversight role.
    async fn oversight_users(&self) -> Result<Vec<Person>, StoreError>;

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, StoreError>;

    async fn insert_audit(&self, audit: NotificationAudit) -> Result<(), StoreError>;

    async fn audit_exists(&self, key: &AuditKey) -> Result<bool, StoreError>;
}

// --- In-memory store ---

#[derive(Debug, Default)]
struct MemoryState {
    people: HashMap<PersonId, Person>,
    notifications: Vec<Notification>,
    audits: Vec<NotificationAudit>,
    next_notification_id: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_people(people: impl IntoIterator<Item = Person>) -> Self {
        let store = Self::new();
        for person in people {
            store.upsert_person(person).await;
        }
        store
    }

    /// The HR update path; returns the previous record if there was one.
    pub async fn upsert_person(&self, person: Person) -> Option<Person> {
        debug!("Upserting person {} ({})", person.id, person.name);
        self.state.lock().await.people.insert(person.id, person)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }

    pub async fn audits(&self) -> Vec<NotificationAudit> {
        self.state.lock().await.audits.clone()
    }
}

pub(crate) fn sorted_by_id(mut people: Vec<Person>) -> Vec<Person> {
    people.sort_by_key(|p| p.id);
    people
}

#[async_trait]
impl ResidenceStore for MemoryStore {
    async fn active_persons_with_expiry(&self) -> Result<Vec<Person>, StoreError> {
        let state = self.state.lock().await;
        let people = state
            .people
            .values()
            .filter(|p| p.is_active && p.residence_expiry_date.is_some())
            .cloned()
            .collect();
        Ok(sorted_by_id(people))
    }

    async fn person(&self, id: PersonId) -> Result<Option<Person>, StoreError> {
        Ok(self.state.lock().await.people.get(&id).cloned())
    }

    async fn oversight_users(&self) -> Result<Vec<Person>, StoreError> {
        let state = self.state.lock().await;
        let people = state
            .people
            .values()
            .filter(|p| p.is_active && p.role.is_oversight())
            .cloned()
            .collect();
        Ok(sorted_by_id(people))
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let mut state = self.state.lock().await;
        state.next_notification_id += 1;
        let stored = Notification::from_new(state.next_notification_id, notification);
        state.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn insert_audit(&self, audit: NotificationAudit) -> Result<(), StoreError> {
        self.state.lock().await.audits.push(audit);
        Ok(())
    }

    async fn audit_exists(&self, key: &AuditKey) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.audits.iter().any(|a| key.matches(a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn active_persons_with_expiry_filters_inactive_and_undated() {
        let expiry = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let store = MemoryStore::with_people([
            Person::new(3, "Dated", Role::Engineer).with_expiry(expiry),
            Person::new(1, "Undated", Role::Engineer),
            Person::new(2, "Gone", Role::Engineer).with_expiry(expiry).inactive(),
            Person::new(4, "Also dated", Role::HrManager).with_expiry(expiry),
        ])
        .await;

        let ids: Vec<_> = store
            .active_persons_with_expiry()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn oversight_users_are_active_hr_gm_and_admins() {
        let store = MemoryStore::with_people([
            Person::new(1, "Hr", Role::HrManager),
            Person::new(2, "Gm", Role::GeneralManager),
            Person::new(3, "Admin", Role::Admin).inactive(),
            Person::new(4, "Pm", Role::ProjectManager),
        ])
        .await;

        let ids: Vec<_> = store
            .oversight_users()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn upsert_replaces_the_previous_record() {
        let store = MemoryStore::new();
        assert!(store.upsert_person(Person::new(1, "Old", Role::Engineer)).await.is_none());
        let previous = store.upsert_person(Person::new(1, "New", Role::Engineer)).await;
        assert_eq!(previous.map(|p| p.name), Some("Old".to_string()));
        assert_eq!(store.person(1).await.unwrap().map(|p| p.name), Some("New".to_string()));
    }
}
