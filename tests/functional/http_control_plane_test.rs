//! Functional tests for the HTTP control-plane client

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gateway_failover::backend::http_backend::HttpControlPlane;
use gateway_failover::backend::traits::{AlarmState, ControlPlane, HealthStatus, LifecycleResult};
use gateway_failover::gateway::{CallPolicy, RouteTableRegistry, UpsertOutcome};
use gateway_failover::AppError;

fn client(server: &MockServer) -> HttpControlPlane {
    HttpControlPlane::with_endpoint(&server.uri(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_describe_group() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups/az1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "az1",
            "instances": [{ "id": "i-1", "health_status": "Healthy" }],
            "tags": { "RouteTableIds": "rt-1,rt-3" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups/az9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let cp = client(&server);
    let group = cp.describe_group("az1").await.unwrap().unwrap();
    assert_eq!(group.instances[0].health_status, HealthStatus::Healthy);
    assert_eq!(group.tags["RouteTableIds"], "rt-1,rt-3");
    assert!(cp.describe_group("az9").await.unwrap().is_none());
}

#[tokio::test]
async fn test_describe_alarms_sends_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/alarms"))
        .and(query_param("name_prefix", "squid-alarm_"))
        .and(query_param("action_prefix", "arn:topic"))
        .and(query_param("state", "OK"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "squid-alarm_az2", "state": "OK", "actions": ["arn:topic"] }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let alarms = client(&server)
        .describe_alarms("squid-alarm_", "arn:topic", AlarmState::Ok)
        .await
        .unwrap();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].state, AlarmState::Ok);
}

#[tokio::test]
async fn test_set_health_and_complete_lifecycle_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/instances/i-1/health"))
        .and(body_json(json!({ "status": "Unhealthy" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups/az1/lifecycle-hooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hooks": [{ "name": "launch" }] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/groups/az1/lifecycle-actions"))
        .and(body_json(json!({ "hook": "launch", "instance_id": "i-1b", "result": "CONTINUE" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cp = client(&server);
    cp.set_instance_health("i-1", HealthStatus::Unhealthy).await.unwrap();
    assert_eq!(cp.describe_lifecycle_hooks("az1").await.unwrap(), vec!["launch".to_string()]);
    cp.complete_lifecycle_action("launch", "az1", "i-1b", LifecycleResult::Continue)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_route_status_codes_map_to_route_errors() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/route-tables/rt-1/routes"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/route-tables/rt-1/routes"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let cp = client(&server);
    assert!(matches!(
        cp.replace_route("rt-1", "0.0.0.0/0", "i-2").await,
        Err(AppError::RouteNotFound { .. })
    ));
    assert!(matches!(
        cp.create_route("rt-1", "0.0.0.0/0", "i-2").await,
        Err(AppError::RouteAlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_server_error_is_control_plane_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/route-tables"))
        .respond_with(ResponseTemplate::new(503).set_body_string("throttled"))
        .mount(&server)
        .await;

    let err = client(&server)
        .describe_route_tables("AutoScalingGroupName", "az1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::ControlPlaneStatus { status: 503, ref body, .. } if body.contains("throttled")
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_group_name_is_encoded_into_one_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups/prod"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "prod" })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups/prod%3Fx=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "prod?x=1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/groups/az1%2F..%2Faz2/lifecycle-actions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cp = client(&server);
    let group = cp.describe_group("prod?x=1").await.unwrap().unwrap();
    assert_eq!(group.name, "prod?x=1");
    cp.complete_lifecycle_action("launch", "az1/../az2", "i-1", LifecycleResult::Continue)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/instances/i-1/health"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/instances/i-2/health"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let cp = client(&server);
    let policy = CallPolicy {
        timeout: Duration::from_secs(1),
        attempts: 3,
        base_delay: Duration::from_millis(1),
    };

    let err = policy
        .retry("set_instance_health", || cp.set_instance_health("i-1", HealthStatus::Unhealthy))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ControlPlaneStatus { status: 403, .. }));

    let err = policy
        .retry("set_instance_health", || cp.set_instance_health("i-2", HealthStatus::Unhealthy))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ControlPlaneStatus { status: 500, .. }));
}

#[tokio::test]
async fn test_upsert_over_http_falls_back_to_create() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/route-tables/rt-1/routes"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/route-tables/rt-1/routes"))
        .and(body_json(json!({ "destination": "0.0.0.0/0", "instance_id": "i-2" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/route-tables/rt-1/tags"))
        .and(body_json(json!({ "key": "AutoScalingGroupName", "value": "az2" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let registry = RouteTableRegistry::new(
        Arc::new(client(&server)),
        CallPolicy::default(),
        "AutoScalingGroupName",
        "0.0.0.0/0",
    );
    assert_eq!(
        registry.upsert_default_route("rt-1", "i-2").await.unwrap(),
        UpsertOutcome::Created
    );
    registry.set_serving_group_tag("rt-1", "az2").await.unwrap();
}
