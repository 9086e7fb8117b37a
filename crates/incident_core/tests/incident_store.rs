use incident_core::db::open_db_in_memory;
use incident_core::{
    Alert, IncidentDraft, IncidentRepository, IncidentSeverity, RepoError,
    SqliteIncidentRepository,
};
use uuid::Uuid;

fn seed_alerts(
    repo: &SqliteIncidentRepository<'_>,
    tenant: &str,
    fingerprints: &[&str],
) -> Vec<Uuid> {
    fingerprints
        .iter()
        .enumerate()
        .map(|(offset, fingerprint)| {
            let name = format!("alert {fingerprint}");
            let alert = Alert::new(tenant, *fingerprint, name, 1_000 + offset as i64);
            repo.insert_alert(&alert).unwrap()
        })
        .collect()
}

#[test]
fn create_then_get_round_trips_user_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();

    let draft = IncidentDraft::new("  Checkout latency ")
        .with_assignee("oncall@example.com")
        .with_severity(IncidentSeverity::High);
    let created = repo.create_incident("t1", &draft, false).unwrap();

    assert_eq!(created.user_generated_name.as_deref(), Some("Checkout latency"));
    assert_eq!(created.ai_generated_name, None);
    assert_eq!(created.severity, IncidentSeverity::High);
    assert_eq!(created.alerts_count, 0);
    assert!(created.is_confirmed);
    assert!(!created.generated_by_ai);

    let loaded = repo.get_incident("t1", created.id).unwrap().unwrap();
    assert_eq!(loaded, created);
}

#[test]
fn ai_created_incident_is_unconfirmed_and_uses_generated_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();

    let draft = IncidentDraft::new("Disk pressure").with_summary("nodes are filling up");
    let created = repo.create_incident("t1", &draft, true).unwrap();

    assert_eq!(created.ai_generated_name.as_deref(), Some("Disk pressure"));
    assert_eq!(created.generated_summary.as_deref(), Some("nodes are filling up"));
    assert_eq!(created.user_summary, None);
    assert!(!created.is_confirmed);
    assert!(!created.has_user_summary());
}

#[test]
fn blank_name_is_rejected_before_insert() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();

    let err = repo
        .create_incident("t1", &IncidentDraft::new("   "), false)
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));

    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM incidents;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn incidents_are_invisible_to_other_tenants() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();
    let created = repo
        .create_incident("t1", &IncidentDraft::new("tenant one"), false)
        .unwrap();

    assert!(repo.get_incident("t2", created.id).unwrap().is_none());
    assert!(!repo.delete_incident("t2", created.id).unwrap());
    assert!(matches!(
        repo.update_incident("t2", created.id, &IncidentDraft::new("stolen"), false),
        Err(RepoError::NotFound(id)) if id == created.id
    ));
    assert!(matches!(
        repo.add_alerts("t2", created.id, &[], false),
        Err(RepoError::NotFound(_))
    ));
    assert!(repo.get_incident("t1", created.id).unwrap().is_some());
}

#[test]
fn add_alerts_maintains_count_and_ignores_duplicates_and_unknowns() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();
    let incident = repo
        .create_incident("t1", &IncidentDraft::new("count me"), false)
        .unwrap();
    let alert_ids = seed_alerts(&repo, "t1", &["fp-a", "fp-b", "fp-a"]);
    let foreign = seed_alerts(&repo, "t2", &["fp-x"]);

    let mut batch = alert_ids.clone();
    batch.push(Uuid::new_v4());
    batch.extend(foreign);
    repo.add_alerts("t1", incident.id, &batch, false).unwrap();
    repo.add_alerts("t1", incident.id, &alert_ids, false).unwrap();

    let loaded = repo.get_incident("t1", incident.id).unwrap().unwrap();
    assert_eq!(loaded.alerts_count, 3);
    assert_eq!(repo.count_unique_fingerprints("t1", incident.id).unwrap(), 2);

    repo.remove_alerts("t1", incident.id, &alert_ids[..1]).unwrap();
    let loaded = repo.get_incident("t1", incident.id).unwrap().unwrap();
    assert_eq!(loaded.alerts_count, 2);
    assert_eq!(repo.count_unique_fingerprints("t1", incident.id).unwrap(), 2);
}

#[test]
fn list_incident_alerts_returns_newest_first_within_limit() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();
    let incident = repo
        .create_incident("t1", &IncidentDraft::new("ordering"), false)
        .unwrap();
    let alert_ids = seed_alerts(&repo, "t1", &["fp-1", "fp-2", "fp-3"]);
    repo.add_alerts("t1", incident.id, &alert_ids, false).unwrap();

    let alerts = repo.list_incident_alerts("t1", incident.id, 2).unwrap();
    let listed = alerts.iter().map(|alert| alert.id).collect::<Vec<_>>();
    assert_eq!(listed, vec![alert_ids[2], alert_ids[1]]);

    assert!(repo.list_incident_alerts("t1", incident.id, 0).unwrap().is_empty());
}

#[test]
fn alert_incident_ids_reports_every_membership() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();
    let first = repo
        .create_incident("t1", &IncidentDraft::new("first"), false)
        .unwrap();
    let second = repo
        .create_incident("t1", &IncidentDraft::new("second"), false)
        .unwrap();
    let alert_ids = seed_alerts(&repo, "t1", &["shared", "lonely"]);
    repo.add_alerts("t1", first.id, &alert_ids, false).unwrap();
    repo.add_alerts("t1", second.id, &alert_ids[..1], true).unwrap();

    let mapping = repo.alert_incident_ids("t1", &alert_ids).unwrap();

    let mut expected_shared = vec![first.id, second.id];
    expected_shared.sort();
    assert_eq!(mapping[&alert_ids[0]], expected_shared);
    assert_eq!(mapping[&alert_ids[1]], vec![first.id]);
}

#[test]
fn delete_incident_removes_alert_links() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();
    let incident = repo
        .create_incident("t1", &IncidentDraft::new("short lived"), false)
        .unwrap();
    let alert_ids = seed_alerts(&repo, "t1", &["fp-1"]);
    repo.add_alerts("t1", incident.id, &alert_ids, false).unwrap();

    assert!(repo.delete_incident("t1", incident.id).unwrap());
    assert!(!repo.delete_incident("t1", incident.id).unwrap());

    let links: i64 = conn
        .query_row("SELECT COUNT(*) FROM alert_to_incident;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(links, 0);
    assert!(repo.get_alert("t1", alert_ids[0]).unwrap().is_some());
}

#[test]
fn update_keeps_other_provenance_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteIncidentRepository::try_new(&conn).unwrap();
    let incident = repo
        .create_incident("t1", &IncidentDraft::new("human name"), false)
        .unwrap();

    let updated = repo
        .update_incident(
            "t1",
            incident.id,
            &IncidentDraft::new("machine name").with_summary("generated"),
            true,
        )
        .unwrap();

    assert_eq!(updated.user_generated_name.as_deref(), Some("human name"));
    assert_eq!(updated.ai_generated_name.as_deref(), Some("machine name"));
    assert_eq!(updated.generated_summary.as_deref(), Some("generated"));
    assert_eq!(updated.name(), Some("human name"));
    assert!(updated.updated_at_ms >= updated.created_at_ms);
}
