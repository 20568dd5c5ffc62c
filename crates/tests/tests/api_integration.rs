use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use tracko_api::{build_app, ApiConfig};

async fn app() -> Router {
    build_app(ApiConfig::default())
        .await
        .expect("app should build")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, parsed)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_backend_and_metrics() {
    let (status, body) = send(app().await, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["remote_fallback"], false);
    assert!(body["metrics"]["requests_total"].is_number());
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    let response = app().await.oneshot(get("/health")).await.unwrap();

    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
}

#[tokio::test]
async fn lists_seeded_buses() {
    let (status, body) = send(app().await, get("/api/buses")).await;

    assert_eq!(status, StatusCode::OK);
    let buses = body.as_array().unwrap();
    assert_eq!(buses.len(), 8);
    assert_eq!(buses[0]["id"], "221H");
    assert!(buses.iter().all(|bus| bus["crowd"].as_u64().unwrap() <= 100));
}

#[tokio::test]
async fn route_stops_for_known_and_unknown_bus() {
    let app = app().await;

    let (status, body) = send(app.clone(), get("/api/routes/a1/stops")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "A1");
    assert_eq!(body["stops"][0]["name"], "Thiruvanmiyur");
    assert_eq!(body["stops"][0]["isSource"], true);

    let (status, body) = send(app, get("/api/routes/999Z/stops")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Route not found");
}

#[tokio::test]
async fn crowd_update_requires_vehicle_id() {
    let (status, body) = send(
        app().await,
        post_json("/api/crowd/update", json!({ "people_count": 12 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "vehicle_id is required");
}

#[tokio::test]
async fn crowd_update_changes_live_snapshot() {
    let app = app().await;

    let (status, body) = send(
        app.clone(),
        post_json(
            "/api/crowd/update",
            json!({ "vehicle_id": "A1", "people_count": 25 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["crowdLevel"], 50);
    assert_eq!(body["data"]["passengers"], 25);

    let (_, buses) = send(app, get("/api/buses")).await;
    let a1 = buses
        .as_array()
        .unwrap()
        .iter()
        .find(|bus| bus["id"] == "A1")
        .unwrap();
    assert_eq!(a1["crowd"], 50);
    assert_eq!(a1["passengers"], 25);
}

#[tokio::test]
async fn crowd_status_defaults_to_12a_and_tracks_updates() {
    let app = app().await;

    let (status, body) = send(app.clone(), get("/api/crowd/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capacityPercentage"], 65);
    assert!(body["lastUpdate"].is_string());

    send(
        app.clone(),
        post_json(
            "/api/crowd/update",
            json!({ "vehicle_id": "12A", "people_count": 20 }),
        ),
    )
    .await;

    let (status, body) = send(app, get("/api/crowd/status?id=12a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passengers"], 20);
    assert_eq!(body["capacityPercentage"], 40);
}

#[tokio::test]
async fn crowd_status_for_unknown_bus_reports_zero() {
    let (status, body) = send(app().await, get("/api/crowd/status?id=999Z")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passengers"], 0);
    assert_eq!(body["capacityPercentage"], 0);
    assert!(body["lastUpdate"].is_string());
}

#[tokio::test]
async fn lists_route_catalogue() {
    let (status, body) = send(app().await, get("/api/routes")).await;

    assert_eq!(status, StatusCode::OK);
    let routes = body.as_array().unwrap();
    assert_eq!(routes.len(), 8);
    let route = routes.iter().find(|route| route["id"] == "45C").unwrap();
    assert_eq!(route["destination"], "Airport");
    assert!(route["stopCount"].as_u64().unwrap() > 1);
}

#[tokio::test]
async fn chat_rejects_empty_message() {
    let app = app().await;

    let (status, body) = send(app.clone(), post_json("/api/chat", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reply"], "Please say something!");

    let (status, _) = send(app, post_json("/api/chat", json!({ "message": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_greets_the_user() {
    let (status, body) = send(
        app().await,
        post_json("/api/chat", json!({ "message": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["reply"].as_str().unwrap().contains("Tracko"));
    assert_eq!(body["nlp"]["intent"], "greeting");
    assert_eq!(body["usedFallback"], false);
}

#[tokio::test]
async fn chat_lists_least_crowded_buses() {
    let (status, body) = send(
        app().await,
        post_json("/api/chat", json!({ "message": "Which bus is least crowded?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let reply = body["reply"].as_str().unwrap();
    assert!(reply.starts_with("Least crowded buses:"));
    assert!(reply.contains("Bus A1: 15%"));
}

#[tokio::test]
async fn chat_answers_bus_stop_question() {
    let (status, body) = send(
        app().await,
        post_json("/api/chat", json!({ "message": "Does bus A1 go to Adyar?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["reply"]
        .as_str()
        .unwrap()
        .starts_with("Yes! Bus A1 goes to Adyar Depot."));
}

#[tokio::test]
async fn unmatched_chat_uses_static_fallback() {
    let (status, body) = send(
        app().await,
        post_json("/api/chat", json!({ "message": "xyzzy plugh" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usedFallback"], true);
    assert_eq!(body["nlp"]["intent"], Value::Null);
    assert_eq!(body["nlp"]["confidence"], 0.0);
}

#[tokio::test]
async fn nlp_endpoint_returns_raw_result() {
    let message = "Which bus has less people going to Airport?";
    let (status, body) = send(
        app().await,
        post_json("/api/nlp", json!({ "message": message })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["originalMessage"], message);
    assert_eq!(body["entities"]["crowdPreference"], "least");
    assert_eq!(body["entities"]["toLocation"], "airport");
    assert_eq!(body["entities"]["locations"], json!(["airport"]));
    assert!(body["confidence"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn rate_limit_blocks_api_but_not_health() {
    let app = build_app(ApiConfig {
        rate_limit_window: Duration::from_secs(60),
        rate_limit_max: 2,
        ..ApiConfig::default()
    })
    .await
    .unwrap();

    for _ in 0..2 {
        let (status, _) = send(app.clone(), get("/api/buses")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(app.clone(), get("/api/buses")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    let (status, _) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn sqlite_backend_serves_the_same_routes() {
    let app = build_app(ApiConfig {
        database_url: Some("sqlite::memory:".to_string()),
        ..ApiConfig::default()
    })
    .await
    .unwrap();

    let (_, health) = send(app.clone(), get("/health")).await;
    assert_eq!(health["store"], "sqlite");

    let (status, body) = send(app.clone(), get("/api/routes/A1/stops")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stops"].as_array().unwrap().len(), 25);

    let (status, body) = send(app.clone(), get("/api/routes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 8);

    let (status, body) = send(app.clone(), get("/api/crowd/status?id=A1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capacityPercentage"], 15);

    let (status, body) = send(
        app,
        post_json("/api/chat", json!({ "message": "take me to the airport" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["reply"].as_str().unwrap().contains("Best option: Bus 45C"));
}
