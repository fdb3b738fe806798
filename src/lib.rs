// src/lib.rs
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod expiry;
pub mod file_store;
pub mod model;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod sweep;
pub mod templates;


pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use dispatcher::{DispatchError, DispatchOutcome, NotificationDispatcher};
pub use expiry::{days_until_expiry, evaluate, Evaluation, NotificationTier};
pub use file_store::FileStore;
pub use model::{Notification, NotificationAudit, Person, PersonId, Priority, Role};
pub use scheduler::{ExpiryScheduler, DEFAULT_SWEEP_INTERVAL};
pub use store::{MemoryStore, ResidenceStore, StoreError};
pub use sweep::{PersonOutcome, ResidenceExpiryService, SweepError, SweepReport};
