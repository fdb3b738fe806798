// src/templates.rs
//
// Bilingual notification texts. English is the primary language of the
// tracker UI; Arabic is shown when the user switches locale.

use chrono::NaiveDate;

use crate::expiry::NotificationTier;
use crate::model::{LocalizedText, Person, DATE_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The person whose residence is expiring.
    Holder,
    /// HR manager, general manager or admin receiving a copy.
    Oversight,
}

pub fn title(tier: NotificationTier, audience: Audience) -> LocalizedText {
    let (en, ar) = match (tier, audience) {
        (NotificationTier::NinetyDay, Audience::Holder) => (
            "Residence expires in less than 3 months",
            "تنتهي الإقامة خلال أقل من 3 أشهر",
        ),
        (NotificationTier::ThirtyDay, Audience::Holder) => (
            "Residence expires in less than a month",
            "تنتهي الإقامة خلال أقل من شهر",
        ),
        (NotificationTier::SevenDay, Audience::Holder) => (
            "Residence expires within a week",
            "تنتهي الإقامة خلال أسبوع",
        ),
        (NotificationTier::Daily, Audience::Holder) => (
            "Urgent: residence about to expire",
            "عاجل: الإقامة على وشك الانتهاء",
        ),
        (NotificationTier::NinetyDay, Audience::Oversight) => (
            "Staff residence expiring in 3 months",
            "إقامة موظف تنتهي خلال 3 أشهر",
        ),
        (NotificationTier::ThirtyDay, Audience::Oversight) => (
            "Staff residence expiring this month",
            "إقامة موظف تنتهي خلال شهر",
        ),
        (NotificationTier::SevenDay, Audience::Oversight) => (
            "Staff residence expiring this week",
            "إقامة موظف تنتهي خلال أسبوع",
        ),
        (NotificationTier::Daily, Audience::Oversight) => (
            "Urgent: staff residence about to expire",
            "عاجل: إقامة موظف على وشك الانتهاء",
        ),
    };
    LocalizedText {
        en: en.to_string(),
        ar: ar.to_string(),
    }
}

fn days_phrase_en(days: i64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "in 1 day".to_string(),
        n => format!("in {} days", n),
    }
}

fn days_phrase_ar(days: i64) -> String {
    match days {
        0 => "اليوم".to_string(),
        1 => "خلال يوم واحد".to_string(),
        2 => "خلال يومين".to_string(),
        n @ 3..=10 => format!("خلال {} أيام", n),
        n => format!("خلال {} يومًا", n),
    }
}

pub fn message(
    person: &Person,
    expiry_date: NaiveDate,
    days: i64,
    audience: Audience,
) -> LocalizedText {
    let date = expiry_date.format(DATE_FORMAT);
    match audience {
        Audience::Holder => LocalizedText {
            en: format!(
                "Your residence permit expires {} ({}). Please start the renewal with HR.",
                days_phrase_en(days),
                date
            ),
            ar: format!(
                "تنتهي إقامتك {} ({}). يرجى البدء بإجراءات التجديد مع الموارد البشرية.",
                days_phrase_ar(days),
                date
            ),
        },
        Audience::Oversight => LocalizedText {
            en: format!(
                "The residence permit of {} expires {} ({}).",
                person.name,
                days_phrase_en(days),
                date
            ),
            ar: format!(
                "تنتهي إقامة {} {} ({}).",
                person.display_name_ar(),
                days_phrase_ar(days),
                date
            ),
        },
    }
}
