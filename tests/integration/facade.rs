//! Facade behavior end to end, with an in-memory connector.

use crate::support::{RecordingConnector, SharedConnector};
use std::sync::Arc;
use std::time::Duration;
use tenant_connections::{
    school_catalog, ConnectionState, RegistrationStatus, ResolveError, Settings,
    TenantConnectionManager, TenantIdentity,
};

const BASE: &str = "postgres://app:secret@db:5432/maindb?sslmode=require";

fn manager(
    connector: RecordingConnector,
) -> (TenantConnectionManager<SharedConnector>, Arc<RecordingConnector>) {
    let connector = Arc::new(connector);
    let manager = TenantConnectionManager::new(
        SharedConnector(Arc::clone(&connector)),
        &Settings::with_base_uri(BASE),
        school_catalog(),
    );
    (manager, connector)
}

#[tokio::test]
async fn domain_names_the_tenant_database() {
    let (manager, connector) = manager(RecordingConnector::default());
    let tenant = TenantIdentity::new("tenant-17")
        .with_name("Blue High School")
        .with_domain("bluehighschool.edu");

    let resolved = manager.resolve_tenant_connection(&tenant).await.unwrap();

    assert_eq!(
        resolved.connection.uri,
        "postgres://app:secret@db:5432/bluehighschool?sslmode=require"
    );
    assert_eq!(connector.attempts(), 1);
    assert_eq!(resolved.models.len(), school_catalog().len());
    assert!(resolved.registration.is_complete());
}

#[tokio::test]
async fn broken_entity_leaves_the_rest_usable() {
    let (manager, _connector) = manager(RecordingConnector::with_broken_table("grades"));

    let resolved = manager
        .resolve_tenant_connection(&TenantIdentity::new("t1"))
        .await
        .unwrap();

    assert!(!resolved.models.contains("Grade"));
    assert!(resolved.models.contains("Student"));
    assert!(resolved.models.contains("Rating"));
    assert_eq!(
        resolved.registration.outcome("Grade").map(|o| o.status),
        Some(RegistrationStatus::Failed)
    );
    assert_eq!(resolved.registration.failed().count(), 1);
    assert_eq!(
        resolved.models.get("Student").map(|m| m.relation()),
        Some("\"public\".\"students\"".to_string())
    );
}

#[tokio::test]
async fn list_active_reports_ready_tenants_with_redacted_targets() {
    let (manager, _connector) = manager(RecordingConnector::default());
    for (id, domain) in [("b", "beta.edu"), ("a", "alpha.edu")] {
        manager
            .resolve_tenant_connection(&TenantIdentity::new(id).with_domain(domain))
            .await
            .unwrap();
    }

    let active = manager.list_active();

    let ids: Vec<_> = active.iter().map(|a| a.tenant_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(active[0].database.as_deref(), Some("alpha"));
    assert_eq!(active[0].target, "postgres://***@db:5432/alpha?sslmode=require");
    assert!(active[0].models.contains(&"Payment".to_string()));
}

#[tokio::test]
async fn close_all_empties_the_cache_and_closes_each_handle_once() {
    let (manager, connector) = manager(RecordingConnector::default());
    for id in ["s1", "s2", "s3"] {
        manager
            .resolve_tenant_connection(&TenantIdentity::new(id))
            .await
            .unwrap();
    }

    assert_eq!(manager.close_all().await, 3);

    assert!(manager.list_active().is_empty());
    assert!(manager.peek_connection("s1").is_none());
    let closes: Vec<_> = connector.opened().iter().map(|c| c.closes()).collect();
    assert_eq!(closes, vec![1, 1, 1]);
}

#[tokio::test(start_paused = true)]
async fn unreachable_tenant_exhausts_retries() {
    let (manager, connector) = manager(RecordingConnector::refusing());
    let started = tokio::time::Instant::now();

    let err = manager
        .resolve_tenant_connection(&TenantIdentity::new("down"))
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::ConnectionExhausted { attempts: 3, .. }));
    assert!(!err.to_string().contains("secret"));
    assert_eq!(connector.attempts(), 3);
    assert_eq!(started.elapsed(), Duration::from_millis(3000));
    assert_eq!(manager.state_of("down"), Some(ConnectionState::Failed));
}

#[tokio::test]
async fn resolve_can_run_on_spawned_tasks() {
    let (manager, connector) = manager(RecordingConnector::default());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .resolve_tenant_connection(&TenantIdentity::new("shared"))
                    .await
                    .map(|r| r.connection_id)
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn invalid_identity_is_rejected_before_connecting() {
    let (manager, connector) = manager(RecordingConnector::default());
    let err = manager
        .resolve_tenant_connection(&TenantIdentity::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::InvalidTenant(_)));
    assert_eq!(connector.attempts(), 0);
}
