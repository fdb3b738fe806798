// src/sweep.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::dispatcher::{DispatchOutcome, DueNotice, NotificationDispatcher};
use crate::expiry::{evaluate, Evaluation, NotificationTier, SkipReason};
use crate::model::{Person, PersonId};
use crate::store::{ResidenceStore, StoreError};

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Failed to load people with residence expiry dates: {0}")]
    LoadPeople(#[source] StoreError),
    #[error("Failed to load oversight users: {0}")]
    LoadOversight(#[source] StoreError),
    #[error("Failed to load person {id}: {source}")]
    LoadPerson {
        id: PersonId,
        #[source]
        source: StoreError,
    },
    #[error("Person not found: {0}")]
    PersonNotFound(PersonId),
}

// --- Reports ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierResult {
    pub tier: NotificationTier,
    #[serde(flatten)]
    pub result: TierStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TierStatus {
    Dispatched(DispatchOutcome),
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PersonStatus {
    Skipped { reason: SkipReason },
    Expired { expiry_date: NaiveDate, days: i64 },
    Evaluated {
        expiry_date: NaiveDate,
        days: i64,
        tiers: Vec<TierResult>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonOutcome {
    pub person_id: PersonId,
    #[serde(flatten)]
    pub status: PersonStatus,
}

impl PersonOutcome {
    /// Notifications written for this person across all tiers, or the first failure.
    pub fn result(&self) -> Result<usize, String> {
        let PersonStatus::Evaluated { tiers, .. } = &self.status else {
            return Ok(0);
        };
        let mut sent = 0;
        for tier in tiers {
            match &tier.result {
                TierStatus::Dispatched(DispatchOutcome::Sent { notifications }) => sent += notifications,
                TierStatus::Dispatched(DispatchOutcome::AlreadyNotified) => {}
                TierStatus::Failed { reason } => return Err(reason.clone()),
            }
        }
        Ok(sent)
    }

    /// Notifications written for this person, counting tiers that succeeded before or after a failure.
    pub fn notifications_sent(&self) -> usize {
        let PersonStatus::Evaluated { tiers, .. } = &self.status else {
            return 0;
        };
        tiers
            .iter()
            .map(|t| match t.result {
                TierStatus::Dispatched(DispatchOutcome::Sent { notifications }) => notifications,
                _ => 0,
            })
            .sum()
    }

    pub fn fired_tiers(&self) -> Vec<NotificationTier> {
        match &self.status {
            PersonStatus::Evaluated { tiers, .. } => tiers
                .iter()
                .filter(|t| {
                    matches!(
                        t.result,
                        TierStatus::Dispatched(DispatchOutcome::Sent { .. })
                    )
                })
                .map(|t| t.tier)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub started_at: NaiveDateTime,
    pub outcomes: Vec<PersonOutcome>,
}

impl SweepReport {
    pub fn notifications_sent(&self) -> usize {
        self.outcomes.iter().map(PersonOutcome::notifications_sent).sum()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result().is_err()).count()
    }

    pub fn outcome_for(&self, person_id: PersonId) -> Option<&PersonOutcome> {
        self.outcomes.iter().find(|o| o.person_id == person_id)
    }
}

// --- Service ---

/// Evaluates people against the tier table and dispatches what is due.
pub struct ResidenceExpiryService {
    store: Arc<dyn ResidenceStore>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    // Serialises full sweeps with edit-triggered checks.
    run_lock: Mutex<()>,
}

impl ResidenceExpiryService {
    pub fn new(store: Arc<dyn ResidenceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dispatcher: NotificationDispatcher::new(store.clone()),
            store,
            clock,
            run_lock: Mutex::new(()),
        }
    }

    pub async fn run_sweep(&self) -> Result<SweepReport, SweepError> {
        let _guard = self.run_lock.lock().await;
        let started_at = self.clock.now();
        info!("Starting residence expiry sweep at {}", started_at);

        let oversight = self
            .store
            .oversight_users()
            .await
            .map_err(SweepError::LoadOversight)?;
        let people = self
            .store
            .active_persons_with_expiry()
            .await
            .map_err(SweepError::LoadPeople)?;

        let mut outcomes = Vec::with_capacity(people.len());
        for person in &people {
            outcomes.push(self.process_person(person, &oversight, started_at).await);
        }

        let report = SweepReport {
            started_at,
            outcomes,
        };
        info!(
            "Finished residence expiry sweep: {} people evaluated, {} notifications sent, {} failures",
            report.outcomes.len(),
            report.notifications_sent(),
            report.failures()
        );
        Ok(report)
    }

    /// Re-checks one person right after their record changed.
    pub async fn run_sweep_for_person(&self, person_id: PersonId) -> Result<PersonOutcome, SweepError> {
        let _guard = self.run_lock.lock().await;
        let now = self.clock.now();
        info!("Re-checking residence expiry for person {}", person_id);

        let person = self
            .store
            .person(person_id)
            .await
            .map_err(|source| SweepError::LoadPerson {
                id: person_id,
                source,
            })?
            .ok_or(SweepError::PersonNotFound(person_id))?;
        let oversight = self
            .store
            .oversight_users()
            .await
            .map_err(SweepError::LoadOversight)?;

        Ok(self.process_person(&person, &oversight, now).await)
    }

    // Never fails as a whole: dispatch errors are kept per tier so the caller can move on.
    async fn process_person(&self, person: &Person, oversight: &[Person], now: NaiveDateTime) -> PersonOutcome {
        let status = match evaluate(person, now) {
            Evaluation::Skipped(reason) => {
                if reason == SkipReason::NoExpiryDate {
                    warn!("Person {} has no usable residence expiry date; skipping", person.id);
                }
                PersonStatus::Skipped { reason }
            }
            Evaluation::Expired { expiry_date, days } => {
                warn!(
                    "Residence of person {} expired on {} ({} days ago); no tier applies",
                    person.id,
                    expiry_date,
                    -days
                );
                PersonStatus::Expired { expiry_date, days }
            }
            Evaluation::Due {
                expiry_date,
                days,
                tiers,
            } => {
                let mut results = Vec::with_capacity(tiers.len());
                for tier in tiers {
                    let notice = DueNotice {
                        person,
                        tier,
                        expiry_date,
                        days,
                    };
                    let result = match self.dispatcher.dispatch(notice, oversight, now).await {
                        Ok(outcome) => TierStatus::Dispatched(outcome),
                        Err(e) => {
                            error!("Residence notice for person {} failed: {}", person.id, e);
                            TierStatus::Failed {
                                reason: e.to_string(),
                            }
                        }
                    };
                    results.push(TierResult { tier, result });
                }
                PersonStatus::Evaluated {
                    expiry_date,
                    days,
                    tiers: results,
                }
            }
        };
        PersonOutcome {
            person_id: person.id,
            status,
        }
    }
}
