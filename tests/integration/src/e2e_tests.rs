//! End-to-end integration tests
//!
//! Each test loads a YAML config through the real loader, points providers
//! at wiremock upstreams, and talks to a listening gateway over HTTP.

use crate::fixtures::*;
use crate::helpers::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn fallback_gateway(openai: &MockServer, anthropic: &MockServer) -> TestGateway {
    let config = load_yaml(&fallback_yaml(openai, anthropic), &fallback_env());
    TestGateway::start(&config).await
}

/// E2E test: revoked key is skipped, second key answers, Anthropic untouched
#[tokio::test]
async fn test_e2e_credential_rotation() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-revoked"))
        .respond_with(ResponseTemplate::new(401).set_body_json(upstream_unauthorized()))
        .expect(1)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-live"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("4")))
        .expect(1)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_message("nope")))
        .expect(0)
        .mount(&anthropic)
        .await;

    let gateway = fallback_gateway(&openai, &anthropic).await;
    let response = gateway
        .post_json("/deep-think/v1/chat/completions", &chat_body("What is 2+2?"))
        .await;
    assert_status(&response, 200);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["choices"][0]["message"]["content"], "4");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

/// E2E test: every OpenAI key fails, Anthropic answers in OpenAI shape
#[tokio::test]
async fn test_e2e_provider_fallback() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(2)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-live"))
        .and(body_partial_json(json!({"model": "claude-3-5-sonnet-latest"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_message("Four.")))
        .expect(1)
        .mount(&anthropic)
        .await;

    let gateway = fallback_gateway(&openai, &anthropic).await;
    let response = gateway
        .post_json("/deep-think", &chat_body("What is 2+2?"))
        .await;
    assert_status(&response, 200);

    let body = TestGateway::json_body(response).await;
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(body["model"], "claude-3-5-sonnet-latest");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Four.");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

/// E2E test: every provider fails, client gets one aggregate error
#[tokio::test]
async fn test_e2e_all_providers_fail() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(upstream_unauthorized()))
        .expect(2)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .expect(1)
        .mount(&anthropic)
        .await;

    let gateway = fallback_gateway(&openai, &anthropic).await;
    let response = gateway
        .post_json("/deep-think", &chat_body("What is 2+2?"))
        .await;
    assert_status(&response, 500);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["error"]["type"], "server_error");
    assert_eq!(body["error"]["code"], "all_providers_failed");
    assert!(body["error"]["message"].as_str().unwrap().contains("Overloaded"));
}

/// E2E test: unknown paths fall back to the first configured route
#[tokio::test]
async fn test_e2e_unknown_path_uses_default_route() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("authorization", "Bearer sk-revoked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("hi")))
        .expect(1)
        .mount(&openai)
        .await;

    let gateway = fallback_gateway(&openai, &anthropic).await;
    let response = gateway
        .post_json("/not/a/route", &chat_body("hello"))
        .await;
    assert_status(&response, 200);
}

/// E2E test: health endpoint reports the loaded routes
#[tokio::test]
async fn test_e2e_health() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    let gateway = fallback_gateway(&openai, &anthropic).await;
    let response = gateway.get("/health").await;
    assert_status(&response, 200);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["routes"], 1);
}

/// E2E test: invalid bodies never reach an upstream
#[tokio::test]
async fn test_e2e_invalid_request_is_rejected_locally() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("x")))
        .expect(0)
        .mount(&openai)
        .await;

    let gateway = fallback_gateway(&openai, &anthropic).await;
    let response = gateway
        .post_json("/deep-think", &json!({"messages": []}))
        .await;
    assert_status(&response, 400);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}
