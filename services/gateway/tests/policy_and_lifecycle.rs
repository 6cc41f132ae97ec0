
use harness::{instance_for, storefront_routes, GatewayHandle, GatewayOptions};
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_health_returns_200_regardless_of_backends() {
    // No backend instances registered anywhere.
    let gateway = GatewayHandle::spawn(storefront_routes()).await;

    let response = reqwest::get(gateway.url("/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = response.json::<serde_json::Value>().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "gateway");

    gateway.stop().await;
}

#[tokio::test]
async fn test_rate_limit_ceiling_is_exact_then_429() {
    let options = GatewayOptions {
        rate_limit_max: 3,
        rate_limit_window: Duration::from_secs(60),
        ..GatewayOptions::default()
    };
    let gateway = GatewayHandle::spawn_with(storefront_routes(), options).await;

    let client = reqwest::Client::new();

    // The C-th request in the window is still processed (404 here, since
    // the path has no route), the (C+1)-th is rejected.
    for _ in 0..3 {
        let response = client.get(gateway.url("/api/unknown/x")).send().await.unwrap();
        assert_eq!(response.status(), 404);
    }

    let response = client.get(gateway.url("/api/unknown/x")).send().await.unwrap();
    assert_eq!(response.status(), 429);
    assert_eq!(
        response.json::<serde_json::Value>().await.unwrap(),
        serde_json::json!({ "error": "rate limit exceeded" })
    );

    gateway.stop().await;
}

#[tokio::test]
async fn test_rate_limit_window_rollover_allows_again() {
    let options = GatewayOptions {
        rate_limit_max: 1,
        rate_limit_window: Duration::from_millis(100),
        ..GatewayOptions::default()
    };
    let gateway = GatewayHandle::spawn_with(storefront_routes(), options).await;

    let client = reqwest::Client::new();

    assert_eq!(
        client.get(gateway.url("/api/unknown/x")).send().await.unwrap().status(),
        404
    );
    assert_eq!(
        client.get(gateway.url("/api/unknown/x")).send().await.unwrap().status(),
        429
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        client.get(gateway.url("/api/unknown/x")).send().await.unwrap().status(),
        404
    );

    gateway.stop().await;
}

#[tokio::test]
async fn test_rate_limit_does_not_throttle_health() {
    let options = GatewayOptions {
        rate_limit_max: 1,
        rate_limit_window: Duration::from_secs(60),
        ..GatewayOptions::default()
    };
    let gateway = GatewayHandle::spawn_with(storefront_routes(), options).await;

    let client = reqwest::Client::new();
    let _ = client.get(gateway.url("/api/unknown/x")).send().await.unwrap();

    // The proxied ceiling is exhausted; the discovery backend's probes of
    // /health must keep answering.
    for _ in 0..5 {
        let response = client.get(gateway.url("/health")).send().await.unwrap();
        assert_eq!(response.status(), 200);
    }

    gateway.stop().await;
}

#[tokio::test]
async fn test_cors_reflects_only_allow_listed_origins() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;

    let options = GatewayOptions {
        allowed_origins: vec!["https://shop.example.com".to_string()],
        ..GatewayOptions::default()
    };
    let gateway = GatewayHandle::spawn_with(storefront_routes(), options).await;
    gateway
        .set_instances(
            "product-service",
            vec![instance_for(backend.address(), "product-service", true)],
        )
        .await;

    let client = reqwest::Client::new();

    let allowed = client
        .get(gateway.url("/api/products/list"))
        .header("origin", "https://shop.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(
        allowed
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "https://shop.example.com"
    );

    let blocked = client
        .get(gateway.url("/api/products/list"))
        .header("origin", "https://evil.example.com")
        .send()
        .await
        .unwrap();
    assert!(blocked
        .headers()
        .get("access-control-allow-origin")
        .is_none());

    gateway.stop().await;
}

#[tokio::test]
async fn test_graceful_shutdown_deregisters_exactly_once() {
    let gateway = GatewayHandle::spawn(storefront_routes()).await;

    let registrations = gateway.backend.registrations().await;
    assert_eq!(registrations.len(), 1);
    let instance_id = registrations[0].instance_id.clone();

    let backend = std::sync::Arc::clone(&gateway.backend);
    gateway.stop().await;

    assert_eq!(backend.deregistrations().await, vec![instance_id]);
}

#[tokio::test]
async fn test_instances_recover_after_discovery_outage() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;

    let gateway = GatewayHandle::spawn(storefront_routes()).await;
    gateway
        .set_instances(
            "product-service",
            vec![instance_for(backend.address(), "product-service", true)],
        )
        .await;

    // Discovery goes down; the cached snapshot keeps serving.
    gateway.backend.set_unavailable(true);
    gateway.registry.refresh_once().await;
    let response = reqwest::get(gateway.url("/api/products/list")).await.unwrap();
    assert_eq!(response.status(), 200);

    // Discovery comes back with the instance gone.
    gateway.backend.set_unavailable(false);
    gateway.backend.clear_service("product-service").await;
    gateway.registry.refresh_once().await;
    let response = reqwest::get(gateway.url("/api/products/list")).await.unwrap();
    assert_eq!(response.status(), 503);

    gateway.stop().await;
}
