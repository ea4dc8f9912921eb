mod common;

use axum::http::{Method, StatusCode};
use common::{pair, response_json, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

async fn post_movement(app: &TestApp, sku: Uuid, loc: Uuid, delta: i32, kind: &str) -> Value {
    let response = app
        .request(
            Method::POST,
            "/api/v1/stock/movements",
            Some(json!({
                "sku_id": sku,
                "location_id": loc,
                "quantity_changed": delta,
                "movement_type": kind,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request(Method::GET, "/health/live", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request(Method::GET, "/health/version", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health/live", None).await;
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn movement_roundtrip_and_record_view() {
    let app = TestApp::new().await;
    let (sku, loc) = pair();

    let body = post_movement(&app, sku, loc, 25, "purchase").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["sequence"], 1);
    assert_eq!(body["data"]["quantity_after"], 25);
    assert_eq!(body["data"]["movement_type"], "purchase");
    let movement_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/movements/{}", movement_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["quantity_changed"], 25);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/records/{}/{}", sku, loc),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["quantity"], 25);
    assert_eq!(body["data"]["reserved_quantity"], 0);
    assert_eq!(body["data"]["available_quantity"], 25);
}

#[tokio::test]
async fn unknown_record_and_movement_are_404() {
    let app = TestApp::new().await;
    let (sku, loc) = pair();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/records/{}/{}", sku, loc),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/movements/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn overselling_is_unprocessable() {
    let app = TestApp::new().await;
    let (sku, loc) = pair();
    post_movement(&app, sku, loc, 2, "purchase").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/stock/movements",
            Some(json!({
                "sku_id": sku,
                "location_id": loc,
                "quantity_changed": -3,
                "movement_type": "sale",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["code"], "negative_stock");
    assert!(body["message"].as_str().is_some());
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn invalid_payloads_are_bad_requests() {
    let app = TestApp::new().await;
    let (sku, loc) = pair();

    let response = app
        .request(
            Method::POST,
            "/api/v1/stock/reservations/reserve",
            Some(json!({ "sku_id": sku, "location_id": loc, "quantity": 0 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "validation_error");

    let response = app
        .request(
            Method::POST,
            "/api/v1/stock/movements",
            Some(json!({
                "sku_id": sku,
                "location_id": loc,
                "quantity_changed": 4,
                "movement_type": "sale",
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reserve_and_consume_over_http() {
    let app = TestApp::new().await;
    let (sku, loc) = pair();
    let order = Uuid::new_v4();
    post_movement(&app, sku, loc, 10, "purchase").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/stock/reservations/reserve",
            Some(json!({ "sku_id": sku, "location_id": loc, "quantity": 4 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["reserved_quantity"], 4);
    assert_eq!(body["data"]["available_quantity"], 6);

    let response = app
        .request(
            Method::POST,
            "/api/v1/stock/reservations/reserve",
            Some(json!({ "sku_id": sku, "location_id": loc, "quantity": 7 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response_json(response).await["code"], "insufficient_available");

    let response = app
        .request(
            Method::POST,
            "/api/v1/stock/reservations/consume",
            Some(json!({
                "sku_id": sku,
                "location_id": loc,
                "quantity": 3,
                "order_id": order,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["record"]["quantity"], 7);
    assert_eq!(body["data"]["record"]["reserved_quantity"], 1);
    assert_eq!(body["data"]["movement"]["cause_type"], "order");

    let response = app
        .request(
            Method::POST,
            "/api/v1/stock/reservations/release",
            Some(json!({ "sku_id": sku, "location_id": loc, "quantity": 5 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["reserved_quantity"], 0);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/records/{}/{}/ledger-check", sku, loc),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["consistent"], true);
    assert_eq!(body["data"]["movement_count"], 2);
}

#[tokio::test]
async fn audit_flow_over_http() {
    let app = TestApp::new().await;
    let (sku, loc) = pair();
    post_movement(&app, sku, loc, 30, "purchase").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/stock/audits",
            Some(json!({
                "sku_id": sku,
                "location_id": loc,
                "auditor_id": Uuid::new_v4(),
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["quantity_before_audit"], 30);
    let audit_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/stock/audits/{}/count", audit_id),
            Some(json!({ "quantity_recorded": 27, "photo_ref": "bin-7.jpg" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/stock/audits/{}/complete", audit_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["audit"]["is_completed"], true);
    assert_eq!(body["data"]["adjustment"]["quantity_changed"], -3);
    assert_eq!(body["data"]["adjustment"]["cause_type"], "audit");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/stock/audits/{}/complete", audit_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(response_json(response).await["code"], "already_completed");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/audits?sku_id={}&status=completed", sku),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], audit_id.as_str());
}

#[tokio::test]
async fn movement_history_is_paginated() {
    let app = TestApp::new().await;
    let (sku, loc) = pair();
    for delta in 1..=5 {
        post_movement(&app, sku, loc, delta, "purchase").await;
    }

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/movements?sku_id={}&page=2&limit=2", sku),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(data["total"], 5);
    assert_eq!(data["page"], 2);
    assert_eq!(data["limit"], 2);
    assert_eq!(data["total_pages"], 3);
    assert_eq!(data["items"].as_array().unwrap().len(), 2);
    assert_eq!(data["items"][0]["sequence"], 3);

    // Oversized limits are capped at the configured maximum.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/movements?sku_id={}&limit=5000", sku),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["limit"], 100);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/locations/{}/records", loc),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["available_quantity"], 15);
}
