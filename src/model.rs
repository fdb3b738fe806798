// src/model.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

use crate::expiry::NotificationTier;

pub type PersonId = u64;
pub type NotificationId = u64;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// --- Roles ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    GeneralManager,
    HrManager,
    ProjectManager,
    Engineer,
    Employee,
}

impl Role {
    /// Roles that receive a copy of every residence expiry notification.
    pub fn is_oversight(self) -> bool {
        match self {
            Role::Admin | Role::GeneralManager | Role::HrManager => true,
            Role::ProjectManager | Role::Engineer | Role::Employee => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::GeneralManager => "general_manager",
            Role::HrManager => "hr_manager",
            Role::ProjectManager => "project_manager",
            Role::Engineer => "engineer",
            Role::Employee => "employee",
        };
        f.write_str(s)
    }
}

// --- People ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    #[serde(default)]
    pub name_ar: Option<String>,
    pub role: Role,
    #[serde(default, deserialize_with = "lenient_date")]
    pub residence_expiry_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl Person {
    pub fn new(id: PersonId, name: &str, role: Role) -> Self {
        Self {
            id,
            name: name.to_string(),
            name_ar: None,
            role,
            residence_expiry_date: None,
            is_active: true,
        }
    }

    pub fn with_expiry(mut self, date: NaiveDate) -> Self {
        self.residence_expiry_date = Some(date);
        self
    }

    pub fn with_arabic_name(mut self, name_ar: &str) -> Self {
        self.name_ar = Some(name_ar.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Arabic display name, falling back to the Latin one.
    pub fn display_name_ar(&self) -> &str {
        self.name_ar.as_deref().unwrap_or(&self.name)
    }
}

// Empty and malformed dates both become `None`; the HR side stores free text here.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_expiry_date(&s)))
}

pub fn parse_expiry_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Timestamps like "2025-07-08T00:00:00Z" carry the date in their first ten chars.
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    match NaiveDate::parse_from_str(date_part, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            warn!("Ignoring malformed residence expiry date '{}': {}", raw, e);
            None
        }
    }
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ResidenceExpiry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub en: String,
    pub ar: String,
}

/// A notification before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: PersonId,
    pub title: LocalizedText,
    pub message: LocalizedText,
    pub priority: Priority,
    pub kind: NotificationKind,
    pub related_person_id: PersonId,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: PersonId,
    pub title: LocalizedText,
    pub message: LocalizedText,
    pub priority: Priority,
    pub kind: NotificationKind,
    pub related_person_id: PersonId,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

impl Notification {
    pub fn from_new(id: NotificationId, new: NewNotification) -> Self {
        Self {
            id,
            recipient_id: new.recipient_id,
            title: new.title,
            message: new.message,
            priority: new.priority,
            kind: new.kind,
            related_person_id: new.related_person_id,
            is_read: false,
            created_at: new.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAudit {
    pub person_id: PersonId,
    pub tier: NotificationTier,
    pub expiry_date: NaiveDate,
    pub days_until_expiry: i64,
    pub fired_on: NaiveDate,
    pub recipients: Vec<PersonId>,
    pub processed: bool,
    pub created_at: NaiveDateTime,
}

/// Identifies one firing of a tier. Threshold tiers fire once per expiry date,
/// the daily tier once per expiry date and calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuditKey {
    pub person_id: PersonId,
    pub tier: NotificationTier,
    pub expiry_date: NaiveDate,
    pub fired_on: Option<NaiveDate>,
}

impl AuditKey {
    pub fn new(person_id: PersonId, tier: NotificationTier, expiry_date: NaiveDate, today: NaiveDate) -> Self {
        let fired_on = if tier.repeats_daily() { Some(today) } else { None };
        Self {
            person_id,
            tier,
            expiry_date,
            fired_on,
        }
    }

    pub fn matches(&self, audit: &NotificationAudit) -> bool {
        audit.person_id == self.person_id
            && audit.tier == self.tier
            && audit.expiry_date == self.expiry_date
            && self.fired_on.map_or(true, |day| audit.fired_on == day)
    }
}
