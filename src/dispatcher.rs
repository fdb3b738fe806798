// src/dispatcher.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::expiry::NotificationTier;
use crate::model::{AuditKey, NewNotification, NotificationAudit, NotificationKind, Person, PersonId};
use crate::store::{ResidenceStore, StoreError};
use crate::templates::{self, Audience};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Could not check audit history for {tier} notice: {source}")]
    AuditLookup {
        tier: NotificationTier,
        #[source]
        source: StoreError,
    },
    #[error("Failed to write {tier} notification for recipient {recipient_id}: {source}")]
    NotificationWrite {
        tier: NotificationTier,
        recipient_id: PersonId,
        #[source]
        source: StoreError,
    },
    #[error("Failed to write {tier} audit record: {source}")]
    AuditWrite {
        tier: NotificationTier,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DispatchOutcome {
    Sent { notifications: usize },
    AlreadyNotified,
}

/// One tier firing for one person, as selected by the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct DueNotice<'a> {
    pub person: &'a Person,
    pub tier: NotificationTier,
    pub expiry_date: NaiveDate,
    pub days: i64,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn ResidenceStore>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn ResidenceStore>) -> Self {
        Self { store }
    }

    /// Writes the holder's notification, one copy per oversight user and the audit row.
    /// Returns `AlreadyNotified` without writing if this tier already fired.
    pub async fn dispatch(
        &self,
        notice: DueNotice<'_>,
        oversight: &[Person],
        now: NaiveDateTime,
    ) -> Result<DispatchOutcome, DispatchError> {
        let person = notice.person;
        let tier = notice.tier;
        let key = AuditKey::new(person.id, tier, notice.expiry_date, now.date());

        let already_fired = self
            .store
            .audit_exists(&key)
            .await
            .map_err(|source| DispatchError::AuditLookup { tier, source })?;
        if already_fired {
            debug!(
                "Skipping {} notice for person {}: already sent for expiry {}",
                tier, person.id, notice.expiry_date
            );
            return Ok(DispatchOutcome::AlreadyNotified);
        }

        let recipients: Vec<(PersonId, Audience)> = std::iter::once((person.id, Audience::Holder))
            .chain(
                oversight
                    .iter()
                    .map(|user| (user.id, Audience::Oversight)),
            )
            .collect();

        // The audit row goes in only after every copy is written. A partial failure
        // leaves no row, so the next sweep re-sends the whole tier.
        for (recipient_id, audience) in &recipients {
            let notification = NewNotification {
                recipient_id: *recipient_id,
                title: templates::title(tier, *audience),
                message: templates::message(person, notice.expiry_date, notice.days, *audience),
                priority: tier.priority(),
                kind: NotificationKind::ResidenceExpiry,
                related_person_id: person.id,
                created_at: now,
            };
            self.store
                .insert_notification(notification)
                .await
                .map_err(|source| DispatchError::NotificationWrite {
                    tier,
                    recipient_id: *recipient_id,
                    source,
                })?;
        }

        let audit = NotificationAudit {
            person_id: person.id,
            tier,
            expiry_date: notice.expiry_date,
            days_until_expiry: notice.days,
            fired_on: now.date(),
            recipients: recipients.iter().map(|(id, _)| *id).collect(),
            processed: true,
            created_at: now,
        };
        self.store
            .insert_audit(audit)
            .await
            .map_err(|source| DispatchError::AuditWrite { tier, source })?;

        info!(
            "Sent {} residence notice for person {} ({} days left) to {} recipients",
            tier,
            person.id,
            notice.days,
            recipients.len()
        );
        Ok(DispatchOutcome::Sent {
            notifications: recipients.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Role};
    use crate::store::MemoryStore;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn oversight() -> Vec<Person> {
        vec![
            Person::new(100, "Hr", Role::HrManager),
            Person::new(101, "Gm", Role::GeneralManager),
            Person::new(102, "Admin", Role::Admin),
        ]
    }

    #[tokio::test]
    async fn writes_one_notification_per_recipient_and_one_audit() {
        let store = MemoryStore::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(store.clone()));
        let expiry = NaiveDate::from_ymd_opt(2025, 7, 31).unwrap();
        let person = Person::new(1, "Ali", Role::Engineer).with_expiry(expiry);

        let outcome = dispatcher
            .dispatch(
                DueNotice {
                    person: &person,
                    tier: NotificationTier::ThirtyDay,
                    expiry_date: expiry,
                    days: 30,
                },
                &oversight(),
                now(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Sent { notifications: 4 });
        let notifications = store.notifications().await;
        assert_eq!(notifications.len(), 4);
        assert!(notifications.iter().all(|n| n.priority == Priority::Medium));
        assert!(notifications.iter().all(|n| n.related_person_id == 1 && !n.is_read));
        let audits = store.audits().await;
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].recipients, vec![1, 100, 101, 102]);
        assert!(audits[0].processed);
    }

    #[tokio::test]
    async fn oversight_user_with_expiring_residence_gets_both_copies() {
        let store = MemoryStore::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(store.clone()));
        let expiry = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let hr = Person::new(100, "Hr", Role::HrManager).with_expiry(expiry);

        let outcome = dispatcher
            .dispatch(
                DueNotice {
                    person: &hr,
                    tier: NotificationTier::NinetyDay,
                    expiry_date: expiry,
                    days: 62,
                },
                &oversight(),
                now(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Sent { notifications: 4 });
        let to_hr: Vec<_> = store
            .notifications()
            .await
            .into_iter()
            .filter(|n| n.recipient_id == 100)
            .collect();
        assert_eq!(to_hr.len(), 2);
        assert_eq!(to_hr[0].title, templates::title(NotificationTier::NinetyDay, Audience::Holder));
        assert_eq!(to_hr[1].title, templates::title(NotificationTier::NinetyDay, Audience::Oversight));
        assert_eq!(store.audits().await[0].recipients, vec![100, 100, 101, 102]);
    }

    #[tokio::test]
    async fn second_dispatch_of_the_same_tier_is_suppressed() {
        let store = MemoryStore::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(store.clone()));
        let expiry = NaiveDate::from_ymd_opt(2025, 7, 8).unwrap();
        let person = Person::new(1, "Ali", Role::Engineer).with_expiry(expiry);
        let notice = DueNotice {
            person: &person,
            tier: NotificationTier::SevenDay,
            expiry_date: expiry,
            days: 7,
        };

        dispatcher.dispatch(notice, &[], now()).await.unwrap();
        let again = dispatcher.dispatch(notice, &[], now()).await.unwrap();

        assert_eq!(again, DispatchOutcome::AlreadyNotified);
        assert_eq!(store.notifications().await.len(), 1);
        assert_eq!(store.audits().await.len(), 1);
    }
}
