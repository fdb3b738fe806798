// src/expiry.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::model::{Person, Priority};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

// --- Tiers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTier {
    NinetyDay,
    ThirtyDay,
    SevenDay,
    Daily,
}

impl NotificationTier {
    pub const ALL: [NotificationTier; 4] = [
        NotificationTier::NinetyDay,
        NotificationTier::ThirtyDay,
        NotificationTier::SevenDay,
        NotificationTier::Daily,
    ];

    /// Window bounds as (lower, upper, lower_inclusive).
    fn window(self) -> (i64, i64, bool) {
        match self {
            NotificationTier::NinetyDay => (30, 90, false),
            NotificationTier::ThirtyDay => (7, 30, false),
            NotificationTier::SevenDay => (1, 7, false),
            NotificationTier::Daily => (0, 7, true),
        }
    }

    pub fn matches(self, days_until_expiry: i64) -> bool {
        let (lower, upper, lower_inclusive) = self.window();
        let above_lower = if lower_inclusive {
            days_until_expiry >= lower
        } else {
            days_until_expiry > lower
        };
        above_lower && days_until_expiry <= upper
    }

    pub fn priority(self) -> Priority {
        match self {
            NotificationTier::NinetyDay => Priority::Low,
            NotificationTier::ThirtyDay => Priority::Medium,
            NotificationTier::SevenDay | NotificationTier::Daily => Priority::High,
        }
    }

    /// The daily tier keeps firing on every run while inside its window.
    pub fn repeats_daily(self) -> bool {
        matches!(self, NotificationTier::Daily)
    }
}

impl fmt::Display for NotificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationTier::NinetyDay => "90-day",
            NotificationTier::ThirtyDay => "30-day",
            NotificationTier::SevenDay => "7-day",
            NotificationTier::Daily => "daily",
        };
        f.write_str(s)
    }
}

// --- Evaluation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    NoExpiryDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Skipped(SkipReason),
    /// Already past the expiry date; no tier covers negative days.
    Expired { expiry_date: NaiveDate, days: i64 },
    /// `tiers` may be empty when the expiry is further out than any window.
    Due {
        expiry_date: NaiveDate,
        days: i64,
        tiers: Vec<NotificationTier>,
    },
}

/// Whole days until `expiry` (midnight), rounded up, measured from `now`.
pub fn days_until_expiry(now: NaiveDateTime, expiry: NaiveDate) -> i64 {
    let expiry_start = expiry.and_time(chrono::NaiveTime::MIN);
    let seconds = (expiry_start - now).num_seconds();
    // Ceiling division that also holds for negative spans.
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    if seconds.rem_euclid(SECONDS_PER_DAY) == 0 {
        days
    } else {
        days + 1
    }
}

pub fn tiers_for(days_until_expiry: i64) -> Vec<NotificationTier> {
    NotificationTier::ALL
        .into_iter()
        .filter(|tier| tier.matches(days_until_expiry))
        .collect()
}

pub fn evaluate(person: &Person, now: NaiveDateTime) -> Evaluation {
    if !person.is_active {
        return Evaluation::Skipped(SkipReason::Inactive);
    }
    let Some(expiry_date) = person.residence_expiry_date else {
        return Evaluation::Skipped(SkipReason::NoExpiryDate);
    };

    let days = days_until_expiry(now, expiry_date);
    debug!(
        "Evaluated person {}: expiry={}, days_until_expiry={}",
        person.id, expiry_date, days
    );
    if days < 0 {
        return Evaluation::Expired { expiry_date, days };
    }
    Evaluation::Due {
        expiry_date,
        days,
        tiers: tiers_for(days),
    }
}
