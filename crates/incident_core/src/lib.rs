//! Incident mutation coordination.
//!
//! Writes incidents to the authoritative store and propagates each change to
//! the alert index, tenant notifications, automation and summary jobs. Only
//! the store decides whether a call succeeded.

pub mod automation;
pub mod config;
pub mod db;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod search;
pub mod service;

pub use automation::{AutomationEngine, AutomationError, QueuedAutomationEngine};
pub use config::{ConfigError, CoordinatorConfig};
pub use jobs::{InMemoryJobPool, JobError, JobHandle, JobPool, JobQueue, SUMMARY_JOB_NAME};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::alert::{Alert, AlertId, IndexedAlert};
pub use model::event::{ChangeAction, ChangeEvent, NotificationSignal, SummaryJobRequest};
pub use model::incident::{
    Incident, IncidentDraft, IncidentId, IncidentSeverity, IncidentValidationError, TenantId,
};
pub use notify::{BroadcastNotificationClient, NotificationClient, NotifyError};
pub use repo::incident_repo::{
    IncidentRepository, RepoError, RepoResult, SqliteIncidentRepository,
};
pub use search::fts::{AlertIndexClient, SearchError, SqliteAlertIndex};
pub use service::incident_service::{
    Collaborators, CoordinatorError, CoordinatorResult, IncidentCoordinator,
};
pub use service::summary::{SummaryGate, SummaryScheduling};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
