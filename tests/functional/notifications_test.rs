//! Functional tests for the notification endpoint

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use gateway_failover::api::routes::create_router;
use gateway_failover::backend::memory::InMemoryControlPlane;
use gateway_failover::backend::traits::{AlarmState, GatewayInstance, HealthStatus};
use gateway_failover::config::Settings;
use gateway_failover::AppState;

const TOPIC: &str = "arn:aws:sns:eu-west-1:123456789012:squid-alarms";
const DEFAULT: &str = "0.0.0.0/0";

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.controller.topic_arn = TOPIC.to_string();
    settings.controller.retry_base_delay_ms = 1;
    settings.control_plane.kind = "memory".to_string();
    settings
}

fn control_plane() -> Arc<InMemoryControlPlane> {
    Arc::new(
        InMemoryControlPlane::new()
            .with_group("az1", vec![GatewayInstance::new("i-1", HealthStatus::Healthy)], &["rt-1"])
            .with_group("az2", vec![GatewayInstance::new("i-2", HealthStatus::Healthy)], &["rt-2"])
            .with_alarm("squid-alarm_az1", AlarmState::Alarm, &[TOPIC])
            .with_alarm("squid-alarm_az2", AlarmState::Ok, &[TOPIC])
            .with_route_table("rt-1", DEFAULT, Some("i-1"), "az1")
            .with_route_table("rt-2", DEFAULT, Some("i-2"), "az2"),
    )
}

fn app(settings: Settings, cp: Arc<InMemoryControlPlane>) -> Router {
    create_router(Arc::new(AppState::new(settings, cp)))
}

fn record(alarm: &str, state: &str) -> Value {
    json!({
        "EventSource": "aws:sns",
        "Sns": {
            "Type": "Notification",
            "Timestamp": "2021-03-04T05:06:07.000Z",
            "Message": json!({
                "AlarmName": alarm,
                "NewStateValue": state,
                "OldStateValue": "OK",
                "StateChangeTime": "2021-03-04T05:06:06.500+0000"
            })
            .to_string()
        }
    })
}

fn post(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/notifications")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_alarm_record_fails_over() {
    let cp = control_plane();
    let body = json!({ "Records": [record("squid-alarm_az1", "ALARM")] }).to_string();

    let response = app(settings(), cp.clone()).oneshot(post(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await;
    assert_eq!(summary["dropped"], 0);
    assert_eq!(summary["reports"][0]["action"], "failed_over");
    assert_eq!(summary["reports"][0]["serving_group"], "az2");
    assert_eq!(cp.route_table("rt-1").unwrap().route_target(DEFAULT), Some("i-2"));
}

#[tokio::test]
async fn test_bare_notification_is_accepted() {
    let cp = control_plane();
    let body = json!({
        "Type": "Notification",
        "Message": json!({"AlarmName": "squid-alarm_az2", "NewStateValue": "OK"}).to_string()
    })
    .to_string();

    let response = app(settings(), cp.clone()).oneshot(post(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await;
    assert_eq!(summary["reports"][0]["action"], "reclaimed");
}

#[tokio::test]
async fn test_malformed_records_are_dropped() {
    let cp = control_plane();
    let body = json!({
        "Records": [
            { "Sns": { "Message": "not json" } },
            { "Sns": { "Message": json!({"AlarmName": "squid-alarm_az1"}).to_string() } },
            { "Sns": { "Message": json!({"AlarmName": "nodelimiter", "NewStateValue": "ALARM"}).to_string() } },
            { "EventSource": "aws:sqs" }
        ]
    })
    .to_string();

    let response = app(settings(), cp.clone()).oneshot(post(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await;
    assert_eq!(summary["dropped"], 4);
    assert!(cp.mutations().is_empty());
}

#[tokio::test]
async fn test_unparseable_body_is_bad_request() {
    let response = app(settings(), control_plane())
        .oneshot(post("[1, 2, 3]".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = json_body(response).await;
    assert_eq!(error["error"]["code"], "malformed_event");
}

#[tokio::test]
async fn test_objects_that_are_not_envelopes_are_bad_requests() {
    for body in [json!({ "foo": 1 }), json!({ "Records": "oops" })] {
        let cp = control_plane();
        let response = app(settings(), cp.clone()).oneshot(post(body.to_string())).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {}", body);
        let error = json_body(response).await;
        assert_eq!(error["error"]["code"], "malformed_event");
        assert!(cp.mutations().is_empty());
    }
}

#[tokio::test]
async fn test_no_healthy_peer_is_service_unavailable() {
    let cp = control_plane();
    cp.set_alarm_state("squid-alarm_az2", AlarmState::Alarm);
    let body = json!({ "Records": [record("squid-alarm_az1", "ALARM")] }).to_string();

    let response = app(settings(), cp.clone()).oneshot(post(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let error = json_body(response).await;
    assert_eq!(error["error"]["code"], "no_healthy_peer");
    assert!(cp.route_mutations().is_empty());
}

#[tokio::test]
async fn test_fatal_record_does_not_stop_later_records() {
    let cp = control_plane();
    let body = json!({
        "Records": [record("squid-alarm_az9", "OK"), record("squid-alarm_az1", "ALARM")]
    })
    .to_string();

    let response = app(settings(), cp.clone()).oneshot(post(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = json_body(response).await;
    assert_eq!(error["error"]["code"], "group_not_found");
    assert_eq!(cp.route_table("rt-1").unwrap().route_target(DEFAULT), Some("i-2"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = app(settings(), control_plane())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}
