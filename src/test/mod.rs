//! End-to-end API tests over the real router with in-memory store fakes.


use crate::test_utils::create_test_app;
use axum::http::StatusCode;

#[test_log::test(tokio::test)]
async fn healthz_responds_ok() {
    let app = create_test_app().await;

    let response = app.server.get("/healthz").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.text(), "OK");
}

#[test_log::test(tokio::test)]
async fn openapi_spec_is_served() {
    let app = create_test_app().await;

    let response = app.server.get("/api-docs/openapi.json").await;
    response.assert_status(StatusCode::OK);

    let spec: serde_json::Value = response.json();
    assert!(spec["paths"]["/trees"].is_object());
    assert!(spec["paths"]["/trees/{id}"].is_object());
}
