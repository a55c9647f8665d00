use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use booking_server::config::Config;
use booking_server::models::{BronTariff, Event, SeatStatus, SeatTemplate, TicketDraft};
use booking_server::routes::create_routes;
use booking_server::services::ManualClock;
use booking_server::state::AppState;
use booking_server::store::MemoryStore;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
}

struct TestApp {
    router: Router,
    event: Event,
    template: SeatTemplate,
    tariff: BronTariff,
}

impl TestApp {
    async fn new() -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(at(8)));
        let event = store.add_event(Uuid::new_v4(), "Matinee").await;
        let template = store
            .add_seat_template(
                "Studio",
                &[
                    TicketDraft {
                        section: "A".to_string(),
                        seat_row: "1".to_string(),
                        name: "1".to_string(),
                        price: Decimal::new(1000, 2),
                        status: SeatStatus::Vacant,
                    },
                    TicketDraft {
                        section: "A".to_string(),
                        seat_row: "1".to_string(),
                        name: "2".to_string(),
                        price: Decimal::new(1000, 2),
                        status: SeatStatus::Vacant,
                    },
                ],
            )
            .await;
        let tariff = store.add_tariff("standard", at(8) + Duration::days(1)).await;

        let config = Config::from_lookup(|_| None);
        let state = AppState::new(Arc::new(store), clock, &config);

        Self {
            router: create_routes(state, &config.cors_allowed_origins),
            event,
            template,
            tariff,
        }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_session(&self, start: u32, end: u32) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/api/sessions",
            Some(json!({
                "event_id": self.event.id,
                "start_time": at(start),
                "end_time": at(end),
                "seat_template_id": self.template.id,
            })),
        )
        .await
    }

    async fn first_ticket(&self, session_id: &str) -> String {
        let (status, body) = self
            .send(Method::GET, &format!("/api/sessions/{}/tickets", session_id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"][0]["id"].as_str().unwrap().to_string()
    }

    async fn hold(&self, user_id: Uuid, ticket_id: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/api/holds",
            Some(json!({
                "user_id": user_id,
                "ticket_id": ticket_id,
                "tariff_id": self.tariff.id,
            })),
        )
        .await
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new().await;
    let (status, body) = app.send(Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn overlapping_session_is_rejected_with_details() {
    let app = TestApp::new().await;

    let (status, first) = app.create_session(10, 12).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.create_session(11, 13).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "SCHEDULING_CONFLICT");
    assert_eq!(body["error"]["details"][0]["id"], first["data"]["id"]);
}

#[tokio::test]
async fn reversed_session_range_is_bad_request() {
    let app = TestApp::new().await;
    let (status, body) = app.create_session(12, 10).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_RANGE");
}

#[tokio::test]
async fn tickets_of_unknown_session_are_not_found() {
    let app = TestApp::new().await;
    let uri = format!("/api/sessions/{}/tickets", Uuid::new_v4());
    let (status, body) = app.send(Method::GET, &uri, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn hold_conflict_and_cancel() {
    let app = TestApp::new().await;
    let (_, session) = app.create_session(20, 22).await;
    let session_id = session["data"]["id"].as_str().unwrap().to_string();
    let ticket_id = app.first_ticket(&session_id).await;

    let (status, bron) = app.hold(Uuid::new_v4(), &ticket_id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(bron["data"]["status"], "ACTIVE");
    // default hold length is five minutes
    let expected = (at(8) + Duration::minutes(5)).to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true);
    assert_eq!(bron["data"]["expire_time"], expected);

    let (status, body) = app.hold(Uuid::new_v4(), &ticket_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let bron_id = bron["data"]["id"].as_str().unwrap();
    let (status, cancelled) = app
        .send(Method::DELETE, &format!("/api/holds/{}", bron_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["data"]["status"], "CANCEL");

    let (_, tickets) = app
        .send(Method::GET, &format!("/api/sessions/{}/tickets", session_id), None)
        .await;
    let ticket = tickets["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == ticket_id.as_str())
        .unwrap();
    assert_eq!(ticket["status"], "VACANT");
}

#[tokio::test]
async fn non_positive_hold_duration_is_rejected() {
    let app = TestApp::new().await;
    let (_, session) = app.create_session(20, 22).await;
    let ticket_id = app.first_ticket(session["data"]["id"].as_str().unwrap()).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/holds",
            Some(json!({
                "user_id": Uuid::new_v4(),
                "ticket_id": ticket_id,
                "tariff_id": app.tariff.id,
                "duration_secs": 0,
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/holds",
            Some(json!({
                "user_id": Uuid::new_v4(),
                "ticket_id": ticket_id,
                "tariff_id": app.tariff.id,
                "duration_secs": 9_223_372_036_854_775_i64,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = app.hold(Uuid::new_v4(), &ticket_id).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn order_is_created_and_finished() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let (_, session) = app.create_session(20, 22).await;
    let session_id = session["data"]["id"].as_str().unwrap().to_string();
    let ticket_id = app.first_ticket(&session_id).await;
    let (status, _) = app.hold(user_id, &ticket_id).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, order) = app
        .send(
            Method::POST,
            "/api/orders",
            Some(json!({
                "user_id": user_id,
                "ticket_ids": [ticket_id, ticket_id],
                "order_type": "PAY_NOW",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["data"]["ticket_ids"].as_array().unwrap().len(), 1);
    assert!(order["data"]["expires_at"].is_string());

    let order_id = order["data"]["id"].as_str().unwrap();
    let uri = format!("/api/orders/{}/finish", order_id);
    let (status, finished) = app.send(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finished["data"]["finished"], true);
    assert!(finished["data"]["expires_at"].is_null());

    let (status, _) = app.send(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, tickets) = app
        .send(Method::GET, &format!("/api/sessions/{}/tickets", session_id), None)
        .await;
    let sold = tickets["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|t| t["status"] == "SOLD")
        .count();
    assert_eq!(sold, 1);
}

#[tokio::test]
async fn order_for_tickets_not_held_is_conflict() {
    let app = TestApp::new().await;
    let (_, session) = app.create_session(20, 22).await;
    let ticket_id = app.first_ticket(session["data"]["id"].as_str().unwrap()).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/orders",
            Some(json!({
                "user_id": Uuid::new_v4(),
                "ticket_ids": [ticket_id],
                "order_type": "PAY_AFTER",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}
