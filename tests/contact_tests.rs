mod common;

use axum::http::StatusCode;
use common::{TestOptions, body_json, create_test_app, create_test_app_with, json_request};
use oakshelf::rate_limit::RateLimitConfig;
use serde_json::json;
use std::sync::atomic::Ordering;

fn contact_form() -> serde_json::Value {
    json!({
        "name": "Jamie",
        "email": "jamie@example.com",
        "subject": "Delivery",
        "message": "Do you deliver to the coast?"
    })
}

#[tokio::test]
async fn test_contact_success() {
    let app = create_test_app().await;

    let response = app
        .send(json_request("POST", "/api/contact-us", contact_form()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Contact us mail sent successfully");

    let messages = app.relay.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].email, "jamie@example.com");
    assert_eq!(messages[0].subject, "Delivery");
}

#[tokio::test]
async fn test_contact_invalid_input() {
    let app = create_test_app().await;

    let mut missing = contact_form();
    missing.as_object_mut().unwrap().remove("subject");
    let mut bad_email = contact_form();
    bad_email["email"] = json!("jamie");
    let mut blank = contact_form();
    blank["message"] = json!("   ");

    for case in [missing, bad_email, blank] {
        let response = app
            .send(json_request("POST", "/api/contact-us", case.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "case {}", case);
    }
    assert!(app.relay.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_contact_relay_failure() {
    let app = create_test_app().await;
    app.relay.fail.store(true, Ordering::SeqCst);

    let response = app
        .send(json_request("POST", "/api/contact-us", contact_form()))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Error sending mail");
}

#[tokio::test]
async fn test_contact_rate_limited() {
    let app = create_test_app_with(TestOptions {
        rate_limits: RateLimitConfig::new(),
        ..TestOptions::default()
    })
    .await;

    let mut last = StatusCode::OK;
    for _ in 0..6 {
        last = app
            .send(json_request("POST", "/api/contact-us", contact_form()))
            .await
            .status();
    }
    assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);
}
