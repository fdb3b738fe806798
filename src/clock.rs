// src/clock.rs
use chrono::{Duration, Local, NaiveDateTime};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the server's local time zone; expiry dates are local calendar dates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock {
    current_time: Arc<Mutex<NaiveDateTime>>,
}

impl FixedClock {
    pub fn new(datetime_str: &str) -> Self {
        let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .expect("Failed to parse datetime string in FixedClock::new");
        Self::at(dt)
    }

    pub fn at(dt: NaiveDateTime) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(dt)),
        }
    }

    pub fn set_time(&self, datetime_str: &str) {
        *self.lock() = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .expect("Failed to parse datetime string in FixedClock::set_time");
    }

    pub fn advance(&self, duration: Duration) {
        *self.lock() += duration;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NaiveDateTime> {
        // A poisoned clock still holds a valid timestamp.
        self.current_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.lock()
    }
}
