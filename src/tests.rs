// HTTP tests for the Booking API
// The full router runs against the in-memory store, so no database is needed.

use super::*;
use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::bookings::models::{Booking, BookingStatus};
use crate::ingestion::{DayInput, PropertyInput, RoomInput};
use crate::jobs::{queue::wait_for, JobStatus};

// ============================================================================
// Test Helpers
// ============================================================================

const JWT_SECRET: &str = "test-jwt-secret";
const WEBHOOK_SECRET: &str = "test-webhook-secret";

struct TestApp {
    server: TestServer,
    state: AppState,
    store: Arc<MemoryStore>,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::for_memory(JWT_SECRET);
    config.webhook_secret = Some(WEBHOOK_SECRET.to_string());
    config.jobs.retry_base = Duration::from_millis(1);
    config
}

/// App whose rate limiter never trips, for tests that are not about limits
fn create_test_app() -> TestApp {
    create_test_app_with_window(Duration::ZERO)
}

fn create_test_app_with_window(window: Duration) -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let mut state = AppState::build(&config, store.clone(), Arc::new(MemoryCache::new()));
    state.rate_limiter =
        Arc::new(RateLimiter::new(store.clone(), config.cache_ttl).with_window(window));

    let server = TestServer::new(create_router(state.clone())).unwrap();
    TestApp {
        server,
        state,
        store,
    }
}

fn date(s: &str) -> chrono::NaiveDate {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Property P1 with room R1 (capacity 2) open 2024-07-01..=2024-07-03 at 100
async fn seed_p1(app: &TestApp) {
    let days = ["2024-07-01", "2024-07-02", "2024-07-03"]
        .iter()
        .map(|d| DayInput {
            date: date(d),
            price: dec!(100),
            allotment: Some(1),
        })
        .collect();
    let batch = vec![PropertyInput {
        property_id: Some("P1".to_string()),
        name: Some("Seaside".to_string()),
        rooms: Some(vec![RoomInput {
            room_id: Some("R1".to_string()),
            name: Some("Double".to_string()),
            max_guests: Some(2),
            availabilities: days,
        }]),
    }];

    let results = app.state.ingestion.ingest(batch).await.unwrap();
    assert!(results.iter().all(|result| result.is_ok()));
}

trait Authorized {
    fn as_user(self, app: &TestApp, user_id: i32) -> Self;
}

impl Authorized for TestRequest {
    fn as_user(self, app: &TestApp, user_id: i32) -> Self {
        let token = app
            .state
            .tokens
            .generate_access_token(user_id, &format!("user{}@example.com", user_id))
            .unwrap();
        self.add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        )
    }
}

fn booking_payload(check_in: &str, check_out: &str, guests: i32) -> Value {
    json!({
        "room_id": 1,
        "property_id": 1,
        "check_in": check_in,
        "check_out": check_out,
        "guests": guests
    })
}

fn availability_params(
    property_id: &str,
    check_in: &str,
    check_out: &str,
    guests: i32,
) -> Vec<(&'static str, String)> {
    vec![
        ("property_id", property_id.to_string()),
        ("check_in", check_in.to_string()),
        ("check_out", check_out.to_string()),
        ("guests", guests.to_string()),
    ]
}

fn preview_params(
    room_id: i64,
    check_in: &str,
    check_out: &str,
    guests: i32,
) -> Vec<(&'static str, String)> {
    vec![
        ("room_id", room_id.to_string()),
        ("check_in", check_in.to_string()),
        ("check_out", check_out.to_string()),
        ("guests", guests.to_string()),
    ]
}

fn job_id(body: &Value) -> Uuid {
    body["job_id"].as_str().unwrap().parse().unwrap()
}

async fn finished(app: &TestApp, body: &Value) -> JobStatus {
    wait_for(app.state.jobs.registry(), job_id(body)).await
}

// ============================================================================
// Health & Auth
// ============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let app = create_test_app();
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = create_test_app();

    let response = app.server.get("/api/bookings").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = app
        .server
        .get("/api/bookings")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = create_test_app();
    let response = app.server.get("/api-docs/openapi.json").await;
    response.assert_status_ok();

    let doc: Value = response.json();
    let paths = doc["paths"].as_object().unwrap();
    for path in [
        "/health",
        "/api/availability",
        "/api/availability/ingest",
        "/api/bookings",
        "/api/bookings/{id}",
        "/api/bookings/pricing-preview",
        "/api/jobs/{id}",
        "/api/jobs/dead-letters",
        "/api/jobs/{id}/replay",
        "/api/dialogflow/webhook",
    ] {
        assert!(paths.contains_key(path), "missing {}", path);
    }
    assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
}

// ============================================================================
// Availability
// ============================================================================

#[tokio::test]
async fn test_availability_summary_sums_inclusive_days() {
    let app = create_test_app();
    seed_p1(&app).await;

    let response = app
        .server
        .get("/api/availability")
        .add_query_params(availability_params("P1", "2024-07-01", "2024-07-03", 2))
        .as_user(&app, 1)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["property_id"], "P1");
    assert_eq!(body["rooms"].as_array().unwrap().len(), 1);
    assert_eq!(body["rooms"][0]["room_id"], "R1");
    assert_eq!(body["rooms"][0]["total_price"], "300.00");
}

#[tokio::test]
async fn test_availability_range_limit() {
    let app = create_test_app();
    seed_p1(&app).await;

    let response = app
        .server
        .get("/api/availability")
        .add_query_params(availability_params("P1", "2024-07-01", "2024-07-31", 1))
        .as_user(&app, 1)
        .await;
    response.assert_status_ok();

    let response = app
        .server
        .get("/api/availability")
        .add_query_params(availability_params("P1", "2024-07-01", "2024-08-01", 1))
        .as_user(&app, 1)
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<Value>()["message"],
        "Date range cannot exceed 30 days"
    );
}

#[tokio::test]
async fn test_availability_unknown_property_is_404() {
    let app = create_test_app();

    let response = app
        .server
        .get("/api/availability")
        .add_query_params(availability_params("NOPE", "2024-07-01", "2024-07-03", 1))
        .as_user(&app, 1)
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn test_ingest_accepts_and_processes_batch() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/availability/ingest")
        .as_user(&app, 9)
        .json(&json!([{
            "property_id": "P2",
            "rooms": [{
                "room_id": 7,
                "availabilities": [
                    {"date": "2024-08-01", "price": 80, "allotment": 1},
                    {"date": "2024-08-02", "price": "85.50"}
                ]
            }]
        }]))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["message"], "Availability ingestion initiated successfully.");
    let ids = body["job_ids"].as_array().unwrap();
    assert_eq!(ids.len(), 1);

    let id: Uuid = ids[0].as_str().unwrap().parse().unwrap();
    let status = wait_for(app.state.jobs.registry(), id).await;
    assert_eq!(status, JobStatus::Succeeded { booking_id: None });

    let response = app
        .server
        .get("/api/availability")
        .add_query_params(availability_params("P2", "2024-08-01", "2024-08-02", 2))
        .as_user(&app, 9)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["rooms"][0]["room_id"], "7");
    assert_eq!(body["rooms"][0]["max_guests"], 2);
    assert_eq!(body["rooms"][0]["total_price"], "165.50");
}

#[tokio::test]
async fn test_ingest_rejects_malformed_payloads() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/availability/ingest")
        .as_user(&app, 1)
        .json(&json!([]))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/api/availability/ingest")
        .as_user(&app, 1)
        .json(&json!([{"rooms": [{"room_id": "R1"}]}]))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>()["message"],
        "Invalid data format: property_id missing"
    );

    let response = app
        .server
        .post("/api/availability/ingest")
        .as_user(&app, 1)
        .text("{not json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

// ============================================================================
// Bookings
// ============================================================================

#[tokio::test]
async fn test_create_booking_flow() {
    let app = create_test_app();
    seed_p1(&app).await;
    let mut events = app.state.notifications.subscribe();

    let response = app
        .server
        .post("/api/bookings")
        .as_user(&app, 1)
        .json(&booking_payload("2024-07-01", "2024-07-03", 2))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(
        body["message"],
        "Booking is being processed. You will receive a confirmation email shortly."
    );
    assert_eq!(
        body["status_url"],
        format!("/api/jobs/{}", job_id(&body))
    );

    let status = finished(&app, &body).await;
    let JobStatus::Succeeded {
        booking_id: Some(booking_id),
    } = status
    else {
        panic!("unexpected job status {:?}", status);
    };

    // Job status is visible to its owner
    let response = app
        .server
        .get(&format!("/api/jobs/{}", job_id(&body)))
        .as_user(&app, 1)
        .await;
    response.assert_status_ok();
    let job: Value = response.json();
    assert_eq!(job["kind"], "create_booking");
    assert_eq!(job["status"]["state"], "succeeded");
    assert_eq!(job["status"]["booking_id"], booking_id);

    let response = app
        .server
        .get(&format!("/api/bookings/{}", booking_id))
        .as_user(&app, 1)
        .await;
    response.assert_status_ok();
    let booking: Booking = response.json();
    assert_eq!(booking.nights, 2);
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.total_price, dec!(200.00));
    assert_eq!(booking.tax_amount, dec!(20.00));
    assert_eq!(booking.final_total, dec!(220.00));

    let listed: Vec<Booking> = app.server.get("/api/bookings").as_user(&app, 1).await.json();
    assert_eq!(listed.len(), 1);

    let event = events.recv().await.unwrap();
    assert_eq!(event.recipient, "user1@example.com");
    assert_eq!(event.booking.id, booking_id);

    // The booked nights are gone from the summary listing
    let body: Value = app
        .server
        .get("/api/availability")
        .add_query_params(availability_params("P1", "2024-07-01", "2024-07-02", 1))
        .as_user(&app, 1)
        .await
        .json();
    assert!(body["rooms"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_over_capacity_fails_the_job() {
    let app = create_test_app();
    seed_p1(&app).await;

    let body: Value = app
        .server
        .post("/api/bookings")
        .as_user(&app, 1)
        .json(&booking_payload("2024-07-01", "2024-07-03", 3))
        .await
        .json();

    let status = finished(&app, &body).await;
    assert!(matches!(status, JobStatus::Failed { .. }), "{:?}", status);

    // Nothing was reserved
    let body: Value = app
        .server
        .get("/api/availability")
        .add_query_params(availability_params("P1", "2024-07-01", "2024-07-03", 1))
        .as_user(&app, 1)
        .await
        .json();
    assert_eq!(body["rooms"][0]["total_price"], "300.00");
}

#[tokio::test]
async fn test_create_rejects_invalid_dates_synchronously() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/bookings")
        .as_user(&app, 1)
        .json(&booking_payload("2024-07-03", "2024-07-01", 2))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_bookings_are_owner_scoped() {
    let app = create_test_app();
    seed_p1(&app).await;

    let body: Value = app
        .server
        .post("/api/bookings")
        .as_user(&app, 1)
        .json(&booking_payload("2024-07-01", "2024-07-02", 1))
        .await
        .json();
    let JobStatus::Succeeded {
        booking_id: Some(booking_id),
    } = finished(&app, &body).await
    else {
        panic!("booking was not created");
    };

    let path = format!("/api/bookings/{}", booking_id);
    app.server
        .get(&path)
        .as_user(&app, 2)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .delete(&path)
        .as_user(&app, 2)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .put(&path)
        .as_user(&app, 2)
        .json(&json!({"guests": 2}))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    // Another user's job is hidden too
    app.server
        .get(&format!("/api/jobs/{}", job_id(&body)))
        .as_user(&app, 2)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_cancel_through_jobs() {
    let app = create_test_app();
    seed_p1(&app).await;

    let body: Value = app
        .server
        .post("/api/bookings")
        .as_user(&app, 1)
        .json(&booking_payload("2024-07-01", "2024-07-02", 1))
        .await
        .json();
    let JobStatus::Succeeded {
        booking_id: Some(booking_id),
    } = finished(&app, &body).await
    else {
        panic!("booking was not created");
    };
    let path = format!("/api/bookings/{}", booking_id);

    let response = app
        .server
        .put(&path)
        .as_user(&app, 1)
        .json(&json!({"check_in": "2024-07-02", "check_out": "2024-07-04"}))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert!(matches!(
        finished(&app, &body).await,
        JobStatus::Succeeded { .. }
    ));

    let booking: Booking = app.server.get(&path).as_user(&app, 1).await.json();
    assert_eq!(booking.check_in, date("2024-07-02"));
    assert_eq!(booking.nights, 2);

    let response = app.server.delete(&path).as_user(&app, 1).await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert!(matches!(
        finished(&app, &body).await,
        JobStatus::Succeeded { .. }
    ));

    let booking: Booking = app.server.get(&path).as_user(&app, 1).await.json();
    assert_eq!(booking.status, BookingStatus::Cancelled);

    // Released nights are bookable again
    let body: Value = app
        .server
        .get("/api/availability")
        .add_query_params(availability_params("P1", "2024-07-01", "2024-07-03", 1))
        .as_user(&app, 1)
        .await
        .json();
    assert_eq!(body["rooms"][0]["total_price"], "300.00");

    // A second cancel is accepted but the job fails on the terminal state
    let body: Value = app.server.delete(&path).as_user(&app, 1).await.json();
    assert!(matches!(
        finished(&app, &body).await,
        JobStatus::Failed { .. }
    ));
}

#[tokio::test]
async fn test_pricing_preview() {
    let app = create_test_app();
    seed_p1(&app).await;

    let response = app
        .server
        .get("/api/bookings/pricing-preview")
        .add_query_params(preview_params(1, "2024-07-01", "2024-07-03", 2))
        .as_user(&app, 1)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["available"], true);
    assert_eq!(body["pricing"]["final_total"], "220.00");

    let response = app
        .server
        .get("/api/bookings/pricing-preview")
        .add_query_params(preview_params(1, "2024-07-01", "2024-07-03", 3))
        .as_user(&app, 1)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["available"], false);
}

// ============================================================================
// Jobs
// ============================================================================

#[tokio::test]
async fn test_dead_letters_are_listed_and_replayed() {
    let app = create_test_app();
    seed_p1(&app).await;
    app.store.fail_next_writes(3);

    let response = app
        .server
        .post("/api/bookings")
        .as_user(&app, 1)
        .json(&booking_payload("2024-07-01", "2024-07-03", 2))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert!(matches!(
        finished(&app, &body).await,
        JobStatus::DeadLettered { attempts: 3, .. }
    ));
    let id = job_id(&body);

    let response = app
        .server
        .get("/api/jobs/dead-letters")
        .as_user(&app, 1)
        .await;
    response.assert_status_ok();
    let listed: Value = response.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], id.to_string());
    assert_eq!(listed[0]["status"]["state"], "dead_lettered");

    let response = app
        .server
        .get("/api/jobs/dead-letters")
        .as_user(&app, 2)
        .await;
    assert!(response.json::<Value>().as_array().unwrap().is_empty());

    let response = app
        .server
        .post(&format!("/api/jobs/{}/replay", id))
        .as_user(&app, 2)
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = app
        .server
        .post(&format!("/api/jobs/{}/replay", id))
        .as_user(&app, 1)
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(job_id(&body), id);
    assert!(matches!(
        finished(&app, &body).await,
        JobStatus::Succeeded { booking_id: Some(_) }
    ));

    let bookings: Vec<Booking> = app
        .server
        .get("/api/bookings")
        .as_user(&app, 1)
        .await
        .json();
    assert_eq!(bookings.len(), 1);
}

#[tokio::test]
async fn test_replaying_a_finished_job_conflicts() {
    let app = create_test_app();
    seed_p1(&app).await;

    let response = app
        .server
        .post("/api/bookings")
        .as_user(&app, 1)
        .json(&booking_payload("2024-07-01", "2024-07-03", 2))
        .await;
    let body: Value = response.json();
    finished(&app, &body).await;

    let response = app
        .server
        .post(&format!("/api/jobs/{}/replay", job_id(&body)))
        .as_user(&app, 1)
        .await;
    response.assert_status(StatusCode::CONFLICT);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_rate_limit_follows_plan() {
    let app = create_test_app_with_window(rate_limit_window());
    app.store.set_plan(2, "pro").await;

    // Basic: 2 requests per window
    for _ in 0..2 {
        app.server
            .get("/api/bookings")
            .as_user(&app, 1)
            .await
            .assert_status_ok();
    }
    let response = app.server.get("/api/bookings").as_user(&app, 1).await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert!(response.header("retry-after").to_str().is_ok());
    let body: Value = response.json();
    assert_eq!(body["message"], "Too many requests. Please try again later.");
    assert!(body["details"]["retry_after"].as_u64().unwrap() >= 1);

    // Pro: 4 requests per window, counted separately
    for _ in 0..4 {
        app.server
            .get("/api/bookings")
            .as_user(&app, 2)
            .await
            .assert_status_ok();
    }
    app.server
        .get("/api/bookings")
        .as_user(&app, 2)
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

fn rate_limit_window() -> Duration {
    crate::subscriptions::rate_limit::WINDOW
}

// ============================================================================
// Chat webhook
// ============================================================================

fn webhook_payload(intent: &str) -> Value {
    json!({
        "queryResult": {
            "intent": {"displayName": intent},
            "parameters": {
                "property_id": "P1",
                "check_in": "2024-07-01T12:00:00+02:00",
                "check_out": "2024-07-03T12:00:00+02:00",
                "guests": 2.0
            },
            "fulfillmentText": "Let me check."
        }
    })
}

#[tokio::test]
async fn test_webhook_requires_shared_secret() {
    let app = create_test_app();

    app.server
        .post("/api/dialogflow/webhook")
        .json(&webhook_payload("CheckAvailability"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    app.server
        .post("/api/dialogflow/webhook")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
        .json(&webhook_payload("CheckAvailability"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // A user token is not the webhook secret
    app.server
        .post("/api/dialogflow/webhook")
        .as_user(&app, 1)
        .json(&webhook_payload("CheckAvailability"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // Neither a prefix nor an extension of it
    for presented in [WEBHOOK_SECRET[..4].to_string(), format!("{}x", WEBHOOK_SECRET)] {
        app.server
            .post("/api/dialogflow/webhook")
            .add_header(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", presented)).unwrap(),
            )
            .json(&webhook_payload("CheckAvailability"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_webhook_answers_availability_intent() {
    let app = create_test_app();
    seed_p1(&app).await;
    let secret = HeaderValue::from_str(&format!("Bearer {}", WEBHOOK_SECRET)).unwrap();

    let response = app
        .server
        .post("/api/dialogflow/webhook")
        .add_header(header::AUTHORIZATION, secret.clone())
        .json(&webhook_payload("CheckAvailability"))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>()["fulfillmentText"],
        "Yes! We have 1 room(s) available from 2024-07-01 to 2024-07-03, starting at €300.00. Want to reserve now?"
    );

    let response = app
        .server
        .post("/api/dialogflow/webhook")
        .add_header(header::AUTHORIZATION, secret)
        .json(&webhook_payload("Default Welcome Intent"))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["fulfillmentText"], "Let me check.");
}
