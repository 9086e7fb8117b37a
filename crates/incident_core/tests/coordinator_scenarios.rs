use incident_core::db::open_db_in_memory;
use incident_core::search::fts::AlertSearchQuery;
use incident_core::{
    Alert, BroadcastNotificationClient, ChangeAction, Collaborators, CoordinatorConfig,
    InMemoryJobPool, IncidentCoordinator, IncidentDraft, IncidentRepository,
    QueuedAutomationEngine, SqliteAlertIndex, SqliteIncidentRepository, SUMMARY_JOB_NAME,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn incident_lifecycle_reaches_every_reference_collaborator() {
    let conn = open_db_in_memory().unwrap();
    let index = Arc::new(SqliteAlertIndex::open_in_memory(true).unwrap());
    let notifier = Arc::new(BroadcastNotificationClient::new());
    let mut pushes = notifier.subscribe();
    let (automation, mut workflow_events) = QueuedAutomationEngine::new(16);
    let pool = Arc::new(InMemoryJobPool::new());

    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();
    let alert_ids = (1..=6)
        .map(|n| {
            let alert = Alert::new("t1", format!("fp-{n}"), format!("db replica lag {n}"), n);
            repo.insert_alert(&alert).unwrap()
        })
        .collect::<Vec<_>>();

    let coordinator = IncidentCoordinator::new(
        repo,
        Collaborators {
            index: index.clone(),
            notifier: Some(notifier.clone()),
            automation: Arc::new(automation),
            jobs: pool.clone(),
        },
        CoordinatorConfig::default()
            .with_extended_enabled(true)
            .with_job_backend_available(true)
            .with_summary_threshold(5),
    );

    let incident = coordinator
        .create_incident("t1", &IncidentDraft::new("Replica lag"), false)
        .unwrap();
    coordinator
        .add_alerts_to_incident("t1", incident.id, &alert_ids, false)
        .await
        .unwrap();

    let stored = coordinator
        .repository()
        .get_incident("t1", incident.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.alerts_count, 6);

    assert_eq!(index.indexed_count("t1").unwrap(), 6);
    let hits = index
        .search_alerts(&AlertSearchQuery::new("t1", "replica"))
        .unwrap();
    assert_eq!(hits.len(), 6);
    assert!(hits.iter().all(|hit| hit.incident_ids == vec![incident.id]));

    let created_push = pushes.try_recv().unwrap();
    assert_eq!(created_push.channel, "private-t1");
    assert_eq!(created_push.event, "incident-change");
    assert_eq!(created_push.payload, json!({ "incident_id": null }));
    let updated_push = pushes.try_recv().unwrap();
    assert_eq!(
        updated_push.payload,
        json!({ "incident_id": incident.id.to_string() })
    );

    assert_eq!(
        workflow_events.try_recv().unwrap().action,
        ChangeAction::Created
    );
    assert_eq!(
        workflow_events.try_recv().unwrap().action,
        ChangeAction::Updated
    );

    let jobs = pool.queue().jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].handle.job_name, SUMMARY_JOB_NAME);

    coordinator.delete_incident("t1", incident.id).unwrap();
    let deleted = workflow_events.try_recv().unwrap();
    assert_eq!(deleted.action, ChangeAction::Deleted);
    assert_eq!(deleted.incident.alerts_count, 6);
    assert_eq!(
        pushes.try_recv().unwrap().payload,
        json!({ "incident_id": null })
    );
}

#[tokio::test]
async fn higher_threshold_suppresses_summary_job() {
    let conn = open_db_in_memory().unwrap();
    let pool = Arc::new(InMemoryJobPool::new());
    let (automation, _workflow_events) = QueuedAutomationEngine::new(16);

    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();
    let alert_ids = (1..=6)
        .map(|n| {
            let alert = Alert::new("t1", format!("fp-{n}"), "cpu", n);
            repo.insert_alert(&alert).unwrap()
        })
        .collect::<Vec<_>>();
    let coordinator = IncidentCoordinator::new(
        repo,
        Collaborators {
            index: Arc::new(SqliteAlertIndex::open_in_memory(false).unwrap()),
            notifier: None,
            automation: Arc::new(automation),
            jobs: pool.clone(),
        },
        CoordinatorConfig::default()
            .with_extended_enabled(true)
            .with_job_backend_available(true)
            .with_summary_threshold(10),
    );

    let incident = coordinator
        .create_incident("t1", &IncidentDraft::new("cpu"), false)
        .unwrap();
    coordinator
        .add_alerts_to_incident("t1", incident.id, &alert_ids, false)
        .await
        .unwrap();

    assert!(pool.queue().jobs().await.is_empty());
}

#[tokio::test]
async fn full_automation_queue_does_not_fail_mutations() {
    let conn = open_db_in_memory().unwrap();
    let (automation, _workflow_events) = QueuedAutomationEngine::new(1);
    let coordinator = IncidentCoordinator::new(
        SqliteIncidentRepository::try_new(&conn).unwrap(),
        Collaborators {
            index: Arc::new(SqliteAlertIndex::open_in_memory(true).unwrap()),
            notifier: None,
            automation: Arc::new(automation),
            jobs: Arc::new(InMemoryJobPool::new()),
        },
        CoordinatorConfig::default(),
    );

    let first = coordinator
        .create_incident("t1", &IncidentDraft::new("first"), false)
        .unwrap();
    let second = coordinator
        .update_incident("t1", first.id, &IncidentDraft::new("renamed"), false)
        .unwrap();

    assert_eq!(second.name(), Some("renamed"));
}

/// Runs `add_alerts(T1, I1, [A1])` against an incident already holding six
/// distinct fingerprints and returns the number of queued summary jobs.
async fn jobs_after_single_alert(threshold: u64) -> usize {
    let conn = open_db_in_memory().unwrap();
    let pool = Arc::new(InMemoryJobPool::new());
    let (automation, _workflow_events) = QueuedAutomationEngine::new(16);

    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();
    let incident = repo
        .create_incident("T1", &IncidentDraft::new("I1"), false)
        .unwrap();
    let existing = (1..=6)
        .map(|n| {
            let alert = Alert::new("T1", format!("fp-{n}"), "api 5xx", n);
            repo.insert_alert(&alert).unwrap()
        })
        .collect::<Vec<_>>();
    repo.add_alerts("T1", incident.id, &existing, false).unwrap();
    let a1 = repo
        .insert_alert(&Alert::new("T1", "fp-1", "api 5xx", 7))
        .unwrap();

    let coordinator = IncidentCoordinator::new(
        repo,
        Collaborators {
            index: Arc::new(SqliteAlertIndex::open_in_memory(true).unwrap()),
            notifier: None,
            automation: Arc::new(automation),
            jobs: pool.clone(),
        },
        CoordinatorConfig::default()
            .with_extended_enabled(true)
            .with_job_backend_available(true)
            .with_summary_threshold(threshold),
    );

    coordinator
        .add_alerts_to_incident("T1", incident.id, &[a1], false)
        .await
        .unwrap();

    let stored = coordinator
        .repository()
        .get_incident("T1", incident.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.alerts_count, 7);
    assert_eq!(
        coordinator
            .repository()
            .count_unique_fingerprints("T1", incident.id)
            .unwrap(),
        6
    );

    let jobs = pool.queue().jobs().await;
    for job in &jobs {
        assert_eq!(job.handle.job_name, SUMMARY_JOB_NAME);
        assert_eq!(job.params.get("tenant_id"), Some(&json!("T1")));
        assert_eq!(
            job.params.get("incident_id"),
            Some(&json!(incident.id.to_string()))
        );
    }
    jobs.len()
}

#[tokio::test]
async fn single_alert_on_incident_above_threshold_queues_one_job() {
    assert_eq!(jobs_after_single_alert(5).await, 1);
}

#[tokio::test]
async fn single_alert_on_incident_below_threshold_queues_nothing() {
    assert_eq!(jobs_after_single_alert(10).await, 0);
}
