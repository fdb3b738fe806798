// src/file_store.rs
//
// File-backed store for running outside the HR database: the staff roster is a
// CSV export, notifications and audit rows are kept as JSON next to it.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::model::{AuditKey, NewNotification, Notification, NotificationAudit, Person, PersonId};
use crate::store::{sorted_by_id, ResidenceStore, StoreError};

pub const PEOPLE_FILE_NAME: &str = "people.csv";
pub const NOTIFICATIONS_FILE_NAME: &str = "notifications.json";
pub const AUDIT_FILE_NAME: &str = "notification_audit.json";

#[derive(Debug)]
struct Ledger {
    notifications: Vec<Notification>,
    audits: Vec<NotificationAudit>,
}

#[derive(Debug)]
pub struct FileStore {
    data_dir: PathBuf,
    ledger: Mutex<Ledger>,
}

impl FileStore {
    /// Opens (creating if needed) the data directory and loads existing notifications and audits.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            source,
            context: format!("creating data directory {}", data_dir.display()),
        })?;

        let notifications: Vec<Notification> = read_json_or_default(&data_dir.join(NOTIFICATIONS_FILE_NAME))?;
        let audits: Vec<NotificationAudit> = read_json_or_default(&data_dir.join(AUDIT_FILE_NAME))?;
        info!(
            "Opened file store at {} ({} notifications, {} audit records)",
            data_dir.display(),
            notifications.len(),
            audits.len()
        );

        Ok(Self {
            data_dir,
            ledger: Mutex::new(Ledger {
                notifications,
                audits,
            }),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // Re-read on every call so roster edits are picked up by the next sweep.
    fn load_people(&self) -> Result<Vec<Person>, StoreError> {
        let path = self.data_dir.join(PEOPLE_FILE_NAME);
        if !path.exists() {
            warn!("People roster {} not found; treating as empty", path.display());
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|source| StoreError::Csv {
            source,
            path: path.clone(),
        })?;

        let mut people = Vec::new();
        for (row, record) in reader.deserialize::<Person>().enumerate() {
            match record {
                Ok(person) => people.push(person),
                // One bad row should not hide everyone else from the sweep.
                Err(e) => warn!("Skipping roster row {} in {}: {}", row + 2, path.display(), e),
            }
        }
        debug!("Loaded {} people from {}", people.len(), path.display());
        Ok(people)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.ledger.lock().await.notifications.clone()
    }

    pub async fn audits(&self) -> Vec<NotificationAudit> {
        self.ledger.lock().await.audits.clone()
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        source,
        context: format!("reading {}", path.display()),
    })?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        source,
        path: path.to_path_buf(),
    })
}

// Write to a sibling temp file, then rename, so a crash never leaves half a ledger.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        source,
        path: path.to_path_buf(),
    })?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).map_err(|source| StoreError::Io {
        source,
        context: format!("writing {}", tmp_path.display()),
    })?;
    fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
        source,
        context: format!("replacing {}", path.display()),
    })
}

#[async_trait]
impl ResidenceStore for FileStore {
    async fn active_persons_with_expiry(&self) -> Result<Vec<Person>, StoreError> {
        let people = self
            .load_people()?
            .into_iter()
            .filter(|p| p.is_active && p.residence_expiry_date.is_some())
            .collect();
        Ok(sorted_by_id(people))
    }

    async fn person(&self, id: PersonId) -> Result<Option<Person>, StoreError> {
        Ok(self.load_people()?.into_iter().find(|p| p.id == id))
    }

    async fn oversight_users(&self) -> Result<Vec<Person>, StoreError> {
        let people = self
            .load_people()?
            .into_iter()
            .filter(|p| p.is_active && p.role.is_oversight())
            .collect();
        Ok(sorted_by_id(people))
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let mut ledger = self.ledger.lock().await;
        let next_id = ledger.notifications.iter().map(|n| n.id).max().unwrap_or(0) + 1;
        let stored = Notification::from_new(next_id, notification);
        ledger.notifications.push(stored.clone());
        if let Err(e) = write_json(&self.data_dir.join(NOTIFICATIONS_FILE_NAME), &ledger.notifications) {
            ledger.notifications.pop();
            return Err(e);
        }
        Ok(stored)
    }

    async fn insert_audit(&self, audit: NotificationAudit) -> Result<(), StoreError> {
        let mut ledger = self.ledger.lock().await;
        ledger.audits.push(audit);
        if let Err(e) = write_json(&self.data_dir.join(AUDIT_FILE_NAME), &ledger.audits) {
            ledger.audits.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn audit_exists(&self, key: &AuditKey) -> Result<bool, StoreError> {
        Ok(self.ledger.lock().await.audits.iter().any(|a| key.matches(a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::NotificationTier;
    use crate::model::{LocalizedText, NotificationKind, Priority, Role};
    use chrono::NaiveDate;
    use rand::{distributions::Alphanumeric, thread_rng, Rng};

    fn temp_data_dir() -> PathBuf {
        let suffix: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        std::env::temp_dir().join(format!("residency-notifier-test-{}", suffix))
    }

    const ROSTER: &str = "\
id,name,name_ar,role,residence_expiry_date,is_active
1,Ahmed,أحمد,engineer,2025-07-08,true
2,Huda,,hr_manager,,true
3,Bilal,,engineer,not-a-date,true
4,Rana,,engineer,2025-08-01,false
5,Tariq,,admin,2025-09-15,true
6,Broken,,astronaut,2025-07-08,true
";

    #[tokio::test]
    async fn roster_rows_are_filtered_and_bad_rows_skipped() {
        let dir = temp_data_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(PEOPLE_FILE_NAME), ROSTER).unwrap();
        let store = FileStore::open(&dir).unwrap();

        let dated: Vec<_> = store
            .active_persons_with_expiry()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(dated, vec![1, 5]);

        let oversight: Vec<_> = store
            .oversight_users()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(oversight, vec![2, 5]);

        let bilal = store.person(3).await.unwrap().unwrap();
        assert_eq!(bilal.residence_expiry_date, None);
        assert_eq!(store.person(1).await.unwrap().unwrap().display_name_ar(), "أحمد");
        assert!(store.person(6).await.unwrap().is_none());

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn notifications_and_audits_survive_reopen() {
        let dir = temp_data_dir();
        let expiry = NaiveDate::from_ymd_opt(2025, 7, 8).unwrap();
        let now = NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        {
            let store = FileStore::open(&dir).unwrap();
            let text = LocalizedText {
                en: "t".to_string(),
                ar: "ت".to_string(),
            };
            let first = store
                .insert_notification(NewNotification {
                    recipient_id: 1,
                    title: text.clone(),
                    message: text,
                    priority: Priority::High,
                    kind: NotificationKind::ResidenceExpiry,
                    related_person_id: 1,
                    created_at: now,
                })
                .await
                .unwrap();
            assert_eq!(first.id, 1);
            store
                .insert_audit(NotificationAudit {
                    person_id: 1,
                    tier: NotificationTier::SevenDay,
                    expiry_date: expiry,
                    days_until_expiry: 7,
                    fired_on: now.date(),
                    recipients: vec![1],
                    processed: true,
                    created_at: now,
                })
                .await
                .unwrap();
        }

        let reopened = FileStore::open(&dir).unwrap();
        assert_eq!(reopened.notifications().await.len(), 1);
        let key = AuditKey::new(1, NotificationTier::SevenDay, expiry, now.date());
        assert!(reopened.audit_exists(&key).await.unwrap());
        assert!(reopened.active_persons_with_expiry().await.unwrap().is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn corrupt_ledger_is_reported_on_open() {
        let dir = temp_data_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(AUDIT_FILE_NAME), "{ not json").unwrap();

        let result = FileStore::open(&dir);
        assert!(matches!(result, Err(StoreError::Json { .. })));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn people_roster_role_column_uses_snake_case() {
        let person = Person::new(9, "Zaid", Role::GeneralManager);
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(&person).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(out.contains("general_manager"));
    }
}
