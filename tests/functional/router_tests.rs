//! HTTP-level tests for the webhook and health routers.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use lxcfs_admission_webhook::HealthState;
use lxcfs_admission_webhook::health::create_router;
use lxcfs_admission_webhook::webhooks::{WebhookState, create_webhook_router};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::common::{PodBuilder, pods_resource, review_json};

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_mutation_is_counted_in_metrics() {
    let health = Arc::new(HealthState::new());
    let webhook = create_webhook_router(Arc::new(WebhookState::new(health.clone())));

    let pod = PodBuilder::new("web").container("app").build();
    let review = review_json(&pod, pods_resource());
    let (status, body) = send(webhook.clone(), post("/mutate", &review)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["apiVersion"], "admission.k8s.io/v1");
    assert_eq!(body["kind"], "AdmissionReview");
    assert_eq!(body["response"]["allowed"], true);

    let deployments = json!({"group": "apps", "version": "v1", "resource": "deployments"});
    let (status, body) = send(webhook, post("/mutate", &review_json(&pod, deployments))).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["response"]["allowed"], false);

    let (status, metrics) = send(create_router(health), get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    let metrics = String::from_utf8(metrics).unwrap();
    assert!(metrics.contains(r#"lxcfs_webhook_admission_requests_total{outcome="mutated"} 1"#));
    assert!(metrics.contains(r#"lxcfs_webhook_admission_requests_total{outcome="rejected"} 1"#));
    assert!(metrics.contains("lxcfs_webhook_patch_operations_count 1"));
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let health = Arc::new(HealthState::new());
    let webhook = create_webhook_router(Arc::new(WebhookState::new(health)));

    let request = Request::builder()
        .method("POST")
        .uri("/mutate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(webhook, request).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let state = WebhookState::new(Arc::new(HealthState::new()));
    let webhook = create_webhook_router(Arc::new(state));
    let (status, _) = send(webhook, post("/validate", &json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_probes_follow_readiness() {
    let health = Arc::new(HealthState::new());
    let router = create_router(health.clone());

    let (status, _) = send(router.clone(), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(router.clone(), get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    health.set_ready(true).await;
    let (status, body) = send(router, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ready");
}
