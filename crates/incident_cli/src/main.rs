//! CLI smoke entry point.
//!
//! # Responsibility
//! - Drive one incident lifecycle through the coordinator with the in-process
//!   reference collaborators.
//! - Print what each downstream system received.
//!
//! Settings come from `EE_ENABLED`, `REDIS` and
//! `MIN_INCIDENT_ALERTS_FOR_SUMMARY_GENERATION`. Set `INCIDENT_LOG_DIR` to an
//! absolute path to also write rolling logs.

use incident_core::db::open_db_in_memory;
use incident_core::{
    default_log_level, init_logging, Alert, BroadcastNotificationClient, Collaborators,
    CoordinatorConfig, InMemoryJobPool, IncidentCoordinator, IncidentDraft, IncidentRepository,
    QueuedAutomationEngine, SqliteAlertIndex, SqliteIncidentRepository,
};
use log::info;
use std::error::Error;
use std::sync::Arc;

const TENANT: &str = "demo";
const ENV_LOG_DIR: &str = "INCIDENT_LOG_DIR";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var(ENV_LOG_DIR) {
        init_logging(default_log_level(), &log_dir)?;
    }
    let config = CoordinatorConfig::from_env()?;
    println!(
        "config extended_enabled={} job_backend_available={} summary_threshold={}",
        config.extended_enabled, config.job_backend_available, config.summary_threshold
    );

    let conn = open_db_in_memory()?;
    let repo = SqliteIncidentRepository::try_new(&conn)?;
    let alert_ids = (0..8)
        .map(|n| {
            let alert = Alert::new(TENANT, format!("fp-{}", n % 7), format!("disk usage {n}"), n)
                .with_source("cli");
            repo.insert_alert(&alert)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let index = Arc::new(SqliteAlertIndex::open_in_memory(true)?);
    let notifier = Arc::new(BroadcastNotificationClient::new());
    let mut pushes = notifier.subscribe();
    let (automation, mut workflow_events) = QueuedAutomationEngine::new(64);
    let pool = Arc::new(InMemoryJobPool::new());

    let coordinator = IncidentCoordinator::new(
        repo,
        Collaborators {
            index: index.clone(),
            notifier: Some(notifier.clone()),
            automation: Arc::new(automation),
            jobs: pool.clone(),
        },
        config,
    );

    let incident =
        coordinator.create_incident(TENANT, &IncidentDraft::new("Disk filling up"), false)?;
    coordinator
        .add_alerts_to_incident(TENANT, incident.id, &alert_ids, false)
        .await?;
    coordinator.delete_alerts_from_incident(TENANT, incident.id, &alert_ids[..1])?;
    coordinator.update_incident(
        TENANT,
        incident.id,
        &IncidentDraft::new("Disk filling up on db-1").with_assignee("oncall"),
        false,
    )?;

    let stored = coordinator.repository().get_incident(TENANT, incident.id)?;
    println!(
        "incident id={} alerts_count={}",
        incident.id,
        stored.map_or(0, |value| value.alerts_count)
    );
    coordinator.delete_incident(TENANT, incident.id)?;

    let mut push_count = 0;
    while pushes.try_recv().is_ok() {
        push_count += 1;
    }
    let mut actions = Vec::new();
    while let Ok(event) = workflow_events.try_recv() {
        actions.push(event.action.as_str());
    }

    println!("indexed_alerts={}", index.indexed_count(TENANT)?);
    println!("notifications={push_count}");
    println!("automation_events={}", actions.join(","));
    for job in pool.queue().jobs().await {
        println!("job={}", job.handle);
    }
    info!("event=cli_run module=cli status=ok tenant_id={TENANT}");
    Ok(())
}
