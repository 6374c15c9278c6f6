use ampsim::config::{Config, DeviceConfig, Vendor};
use ampsim::sim::{build_device, device_router};
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

fn goe_config() -> DeviceConfig {
    DeviceConfig {
        vendor: Vendor::Goe,
        port: 8000,
        session_start_parameter: 0.0,
        phases: 3,
        max_current: 32.0,
        persistence_id: None,
        seed: Some(42),
    }
}

fn goe_router() -> axum::Router {
    let device = build_device(&goe_config(), None).unwrap();
    device_router(Arc::new(tokio::sync::Mutex::new(device)))
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}

#[tokio::test]
async fn get_status_returns_vendor_record() {
    let response = goe_router()
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );

    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json.get("version").and_then(|v| v.as_str()), Some("B"));
}

#[tokio::test]
async fn post_command_reaches_the_device() {
    let router = goe_router();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mqtt?payload=amp=6")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json.get("amp").and_then(|v| v.as_str()), Some("6"));
}

#[tokio::test]
async fn unknown_path_is_served_by_the_fallback() {
    let response = goe_router()
        .oneshot(
            Request::builder()
                .uri("/completely/unknown?x=1")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(json.get("state").is_some());
}

#[tokio::test]
async fn other_methods_are_rejected() {
    let response = goe_router()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/status")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[test]
fn simulator_builds_from_default_config() {
    let config = Config::default();
    assert!(ampsim::sim::Simulator::from_config(&config).is_ok());
}
