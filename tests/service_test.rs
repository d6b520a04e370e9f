mod helpers;

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use event_reset::auth::AuthError;
use event_reset::cascade::EventId;
use event_reset::service::{ResetOutcome, ResetRequest, ServiceError};
use helpers::{
    event_state, recording_gateway, remaining, seed_full_event, service_over, ADMIN_TOKEN, ROLELESS_TOKEN,
    VIEWER_TOKEN,
};

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

#[tokio::test]
async fn admin_can_reset() {
    let gw = recording_gateway(|conn| seed_full_event(conn, "E1"));
    let service = service_over(gw.clone());

    let identity = service.authenticate(&bearer(ADMIN_TOKEN)).await.unwrap();
    let outcome = service.execute(&identity, ResetRequest::new("E1")).await.unwrap();

    match outcome {
        ResetOutcome::Reset(summary) => assert_eq!(summary.total(), 22),
        other => panic!("expected reset, got {other:?}"),
    }
    assert!(!service.locks().is_held("E1"));
}

#[tokio::test]
async fn missing_or_bad_credentials_are_unauthorized() {
    let gw = recording_gateway(|conn| seed_full_event(conn, "E1"));
    let service = service_over(gw.clone());

    let err = service.authenticate(&HeaderMap::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(AuthError::MissingToken)));

    let err = service.authenticate(&bearer("not-a-token")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(AuthError::Rejected)));

    assert!(gw.calls().is_empty());
}

#[tokio::test]
async fn authenticated_but_unprivileged_caller_is_forbidden() {
    let gw = recording_gateway(|conn| seed_full_event(conn, "E1"));
    let service = service_over(gw.clone());

    for token in [VIEWER_TOKEN, ROLELESS_TOKEN] {
        let identity = service.authenticate(&bearer(token)).await.unwrap();
        let err = service
            .execute(&identity, ResetRequest::new("E1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden { .. }), "{token}: {err:?}");
    }

    assert!(gw.calls().is_empty());
    let conn = gw.connection();
    assert_eq!(remaining(&conn.lock().unwrap(), "E1")["invoices"], 3);
}

#[tokio::test]
async fn empty_event_id_is_a_validation_error() {
    let gw = recording_gateway(|conn| seed_full_event(conn, "E1"));
    let service = service_over(gw.clone());

    let identity = service.authenticate(&bearer(ADMIN_TOKEN)).await.unwrap();
    let err = service
        .execute(&identity, ResetRequest::new(""))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(gw.calls().is_empty());
}

#[tokio::test]
async fn concurrent_reset_of_same_event_is_rejected() {
    let gw = recording_gateway(|conn| seed_full_event(conn, "E1"));
    let service = service_over(gw.clone());
    let identity = service.authenticate(&bearer(ADMIN_TOKEN)).await.unwrap();

    let held = service
        .locks()
        .try_acquire(&EventId::parse("E1").unwrap())
        .unwrap();

    let err = service
        .execute(&identity, ResetRequest::new("E1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InProgress(ref id) if id == "E1"));
    assert!(gw.calls().is_empty());

    drop(held);
    assert!(service.execute(&identity, ResetRequest::new("E1")).await.is_ok());
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let gw = recording_gateway(|conn| seed_full_event(conn, "E1"));
    let service = service_over(gw.clone());
    let identity = service.authenticate(&bearer(ADMIN_TOKEN)).await.unwrap();

    let err = service
        .execute(&identity, ResetRequest::new("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert!(!service.locks().is_held("nope"));
}

#[tokio::test]
async fn dry_run_counts_without_deleting() {
    let gw = recording_gateway(|conn| seed_full_event(conn, "E1"));
    let service = service_over(gw.clone());
    let identity = service.authenticate(&bearer(ADMIN_TOKEN)).await.unwrap();

    let request = ResetRequest {
        dry_run: true,
        ..ResetRequest::new("E1")
    };
    match service.execute(&identity, request).await.unwrap() {
        ResetOutcome::Preview(summary) => assert_eq!(summary.deleted["invoice_items"], 7),
        other => panic!("expected preview, got {other:?}"),
    }

    let conn = gw.connection();
    let conn = conn.lock().unwrap();
    assert_eq!(remaining(&conn, "E1")["invoice_items"], 7);
    assert_eq!(event_state(&conn, "E1").0, "active");
}

#[tokio::test]
async fn store_failure_surfaces_as_partial_failure() {
    let gw = recording_gateway(|conn| seed_full_event(conn, "E1"));
    gw.fail_on(Some(helpers::Call::Delete("allocation_lines".into())));
    let service = service_over(gw.clone());
    let identity = service.authenticate(&bearer(ADMIN_TOKEN)).await.unwrap();

    let err = service
        .execute(&identity, ResetRequest::new("E1"))
        .await
        .unwrap_err();
    match err {
        ServiceError::PartialFailure(p) => {
            assert_eq!(p.completed_branches, vec!["invoices".to_string()]);
            assert_eq!(p.failed_branch, "allocations");
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
    // The guard is released even when the cascade fails
    assert!(!service.locks().is_held("E1"));
}

#[tokio::test]
async fn service_without_reset_roles_denies_everyone() {
    use event_reset::config::{EventResetConfig, StaticToken};

    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = EventResetConfig::default();
    config.storage.db_path = tmp.path().join("events.db").to_string_lossy().into_owned();
    config.auth.reset_roles = Vec::new();
    config.auth.tokens = vec![StaticToken {
        token: ADMIN_TOKEN.into(),
        subject: "ops@example.com".into(),
        roles: Some(vec!["admin".into()]),
    }];

    let service = event_reset::server::build_service(&config).unwrap();
    let identity = service.authenticate(&bearer(ADMIN_TOKEN)).await.unwrap();

    let err = service
        .execute(&identity, ResetRequest::new("E1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden { .. }));
}
