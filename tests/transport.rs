mod common;

use common::*;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tircloud::prelude::*;
use tircloud::v1::tir::transport::Call;
use wiremock::{
    matchers::{any, header, header_exists, method, path, query_param},
    Mock, ResponseTemplate,
};

#[test]
fn every_call_carries_credentials_and_scope() {
    let api = Api::start();
    api.mount(
        Mock::given(method("GET"))
            .and(path(project_path("datasets/5/")))
            .and(query_param("apikey", API_KEY))
            .and(query_param("active_iam", "33"))
            .and(header("authorization", format!("Bearer {}", AUTH_TOKEN).as_str()))
            .and(header("content-type", "application/json"))
            .and(header_exists("user-agent"))
            .respond_with(ok(json!({"id": 5, "name": "eos"})))
            .expect(1),
    );
    let value: Value = api
        .rt
        .block_on(api.client.transport().send(scope().get("datasets", "5")))
        .unwrap();
    assert_eq!(value, json!({"id": 5, "name": "eos"}));
}

#[test]
fn call_specific_query_is_appended() {
    let api = Api::start();
    api.mount(
        Mock::given(method("PUT"))
            .and(path(project_path("notebooks/9/actions/")))
            .and(query_param("action", "stop"))
            .and(query_param("active_iam", "33"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1),
    );
    let call = scope()
        .put(format!("{}actions/", scope().item("notebooks", "9")))
        .query("action", "stop");
    let value = api.rt.block_on(api.client.transport().request(call)).unwrap();
    assert_eq!(value, Value::Null);
}

#[test]
fn not_found_is_its_own_error() {
    let api = Api::start();
    api.mount(Mock::given(any()).respond_with(ResponseTemplate::new(404)));
    let err = api
        .rt
        .block_on(api.client.transport().request(scope().get("datasets", "5")))
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[test]
fn unexpected_status_keeps_the_body() {
    let api = Api::start();
    api.mount(
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("{\"message\": \"bad sku\"}")),
    );
    let call = scope().post("datasets").json(&json!({"name": "eos"})).unwrap();
    match api.rt.block_on(api.client.transport().request(call)) {
        Err(ApiError::UnexpectedStatus {
            status,
            expected,
            body,
            ..
        }) => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(expected, StatusCode::CREATED);
            assert!(body.contains("bad sku"));
        }
        other => panic!("expected UnexpectedStatus, got {:?}", other),
    }
}

#[test]
fn error_body_is_returned_whole() {
    let api = Api::start();
    let raw = format!(
        "{{\"errors\": {{\n  \"sku_name\": \"prix invalide é\",\n  \"detail\": \"{}\"\n}}}}",
        "x".repeat(300)
    );
    api.mount(
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(400).set_body_string(raw.clone())),
    );
    let call = scope().post("datasets").json(&json!({"name": "eos"})).unwrap();
    match api.rt.block_on(api.client.transport().request(call)) {
        Err(ApiError::UnexpectedStatus { body, .. }) => {
            assert_eq!(body, raw);
            assert!(body.contains("prix invalide é"));
        }
        other => panic!("expected UnexpectedStatus, got {:?}", other),
    }
}

#[test]
fn success_code_must_match_exactly() {
    let api = Api::start();
    api.mount(Mock::given(method("POST")).respond_with(ok(json!({"id": 1}))));
    let call = scope().post("datasets").json(&json!({})).unwrap();
    let err = api
        .rt
        .block_on(api.client.transport().request(call))
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::OK));
    assert!(!err.is_not_found());
}

#[test]
fn malformed_body_is_a_decode_error() {
    let api = Api::start();
    api.mount(
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_string("<html>")),
    );
    let err = api
        .rt
        .block_on(api.client.transport().request(Call::get("/teams/", "33")))
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode { ref path, .. } if path == "/teams/"));
}

#[test]
fn missing_envelope_is_a_decode_error() {
    let api = Api::start();
    api.mount(
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1}))),
    );
    let err = api
        .rt
        .block_on(
            api.client
                .transport()
                .send::<Value>(Call::get("/teams/", "33")),
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
}

#[test]
fn connection_failure_is_a_transport_error() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config = ProviderConfig::new(API_KEY, AUTH_TOKEN).with_endpoint("http://127.0.0.1:1");
    let client = TirClient::new(&config).unwrap();
    let err = rt
        .block_on(client.transport().request(Call::get("/teams/", "33")))
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
    assert_eq!(err.status(), None);
}
