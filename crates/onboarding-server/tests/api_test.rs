// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP surface tests: envelope shape, error policy and webhook routes.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use onboarding_core::adapters::mock::MockCrm;
use onboarding_core::store::RecordStore;
use serde_json::json;

fn crm_with_client() -> MockCrm {
    MockCrm::new().with_record(
        "R1",
        json!({
            "Agreement_Required": "No",
            "Stripe_Required": "No",
            "Intake_Meeting_Required": "Yes",
        }),
    )
}

#[tokio::test]
async fn test_get_record_returns_envelope() {
    let app = TestApp::new(crm_with_client()).await;

    let (status, body) = app.get("/api/onboarding/get-record?recordId=R1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["message"], "Record retrieved successfully");
    assert!(body["timestamp"].is_string());
    let steps = body["data"]["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["name"], "Intake Meeting");
}

#[tokio::test]
async fn test_missing_record_id_is_bad_request() {
    let app = TestApp::new(crm_with_client()).await;

    let (status, body) = app.get("/api/onboarding/get-record").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["statusCode"], 400);
    assert!(body["data"].is_null());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(app.alerts.alerts().await.is_empty());
}

#[tokio::test]
async fn test_unknown_record_is_not_found_and_alerted() {
    let app = TestApp::new(crm_with_client()).await;

    let (status, body) = app.get("/api/onboarding/get-record?recordId=R404").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    assert_eq!(app.wait_for_alerts(1).await, 1);
    let alert = &app.alerts.alerts().await[0];
    assert_eq!(alert.status_code, 404);
    assert_eq!(alert.method, "GET");
    assert_eq!(alert.endpoint, "/api/onboarding/get-record");
    assert_eq!(alert.record_id.as_deref(), Some("R404"));
}

#[tokio::test]
async fn test_alert_record_id_is_percent_decoded() {
    let app = TestApp::new(crm_with_client()).await;

    let (status, _) = app
        .get("/api/onboarding/get-record?recordId=R%20404")
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.wait_for_alerts(1).await, 1);
    let alert = &app.alerts.alerts().await[0];
    assert_eq!(alert.record_id.as_deref(), Some("R 404"));
}

#[tokio::test]
async fn test_production_hides_server_error_details() {
    let app = TestApp::production(crm_with_client()).await;
    app.crm.set_unavailable(true);

    let (status, body) = app.get("/api/onboarding/get-record?recordId=R1").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["message"],
        "An internal server error occurred. Please try again later."
    );
    assert_eq!(app.wait_for_alerts(1).await, 1);
    assert_ne!(app.alerts.alerts().await[0].message, body["message"]);
}

#[tokio::test]
async fn test_development_keeps_error_details() {
    let app = TestApp::new(crm_with_client()).await;
    app.crm.set_unavailable(true);

    let (status, body) = app.get("/api/onboarding/get-record?recordId=R1").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().contains("zoho"));
}

#[tokio::test]
async fn test_complete_step_rejects_malformed_body() {
    let app = TestApp::new(crm_with_client()).await;

    let (status, body) = app
        .send(
            Request::post("/api/onboarding/complete-step")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_steps_catalogue_without_record() {
    let app = TestApp::new(crm_with_client()).await;

    let (status, body) = app.get("/api/onboarding/steps").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Operation successful");
    let catalogue = body["data"].as_array().unwrap();
    assert_eq!(catalogue.len(), 3);
}

#[tokio::test]
async fn test_stripe_webhook_rejects_bad_signature() {
    let app = TestApp::new(crm_with_client()).await;
    let payload = json!({"type": "payment_intent.succeeded", "data": {"object": {}}});

    let (status, body) = app
        .send(
            Request::post("/api/webhook/stripe")
                .header("Stripe-Signature", "t=1,v1=deadbeef")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_calendly_webhook_stores_booking() {
    let app = TestApp::new(crm_with_client()).await;
    let payload = json!({
        "event": "invitee.created",
        "payload": {
            "email": "jo@acme.test",
            "scheduled_event": {"start_time": "2026-11-02T15:00:00Z"},
            "tracking": {"utm_content": "R1"},
        }
    })
    .to_string();

    let (status, body) = app
        .send(
            Request::post("/api/webhook/calendly")
                .header(
                    "Calendly-Webhook-Signature",
                    signed_header(CALENDLY_SECRET, payload.as_bytes()),
                )
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["message"],
        "Calendly invitee.created event processed successfully"
    );
    assert!(app.store.get_meeting_booking("R1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_frontend_error_is_relayed() {
    let app = TestApp::new(crm_with_client()).await;

    let (status, body) = app
        .post_json(
            "/api/alerts/frontend-error",
            json!({"errorMessage": "Cannot read properties of undefined", "recordId": "R1"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    for _ in 0..50 {
        if !app.alerts.frontend_reports().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let reports = app.alerts.frontend_reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].record_id.as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_frontend_error_requires_message() {
    let app = TestApp::new(crm_with_client()).await;

    let (status, _) = app
        .post_json("/api/alerts/frontend-error", json!({"errorMessage": "  "}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(MockCrm::new()).await;

    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], true);
}

#[tokio::test]
async fn test_payment_socket_requires_upgrade() {
    let app = TestApp::new(MockCrm::new()).await;

    let (status, _) = app.get("/api/payments/ws?recordId=R1").await;

    assert!(status.is_client_error());
    assert_eq!(app.notifier.active_rooms(), 0);
}
