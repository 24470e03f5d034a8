//! Workers AI over REST, streaming and proxy authentication, end to end.

use crate::fixtures::*;
use crate::helpers::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn workers_gateway(workers: &MockServer, protected: bool) -> TestGateway {
    let config = load_yaml(&workers_yaml(workers, protected), &[]);
    TestGateway::start(&config).await
}

async fn mount_bad_key(workers: &MockServer) {
    Mock::given(method("POST"))
        .and(path(workers_path()))
        .and(header("authorization", "Bearer cf-bad"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "errors": [{"code": 10000, "message": "Authentication error"}]
        })))
        .mount(workers)
        .await;
}

#[tokio::test]
async fn test_workers_ai_text_after_rotation() {
    let workers = MockServer::start().await;
    mount_bad_key(&workers).await;
    Mock::given(method("POST"))
        .and(path(workers_path()))
        .and(header("authorization", "Bearer cf-good"))
        .and(body_partial_json(json!({
            "messages": [{"role": "user", "content": "What is 2+2?"}]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(workers_envelope(json!({"response": "2 + 2 = 4"}))),
        )
        .expect(1)
        .mount(&workers)
        .await;

    let gateway = workers_gateway(&workers, false).await;
    let response = gateway.post_json("/fast", &chat_body("What is 2+2?")).await;
    assert_status(&response, 200);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["model"], WORKERS_MODEL);
    assert_eq!(body["choices"][0]["message"]["content"], "2 + 2 = 4");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn test_workers_ai_tool_call_is_normalized() {
    let workers = MockServer::start().await;
    mount_bad_key(&workers).await;
    Mock::given(method("POST"))
        .and(path(workers_path()))
        .and(header("authorization", "Bearer cf-good"))
        .and(body_partial_json(json!({"tools": [{"name": "get_weather"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(workers_envelope(json!({
            "tool_calls": [{"name": "get_weather", "arguments": {"location": "Paris"}}]
        }))))
        .expect(1)
        .mount(&workers)
        .await;

    let gateway = workers_gateway(&workers, false).await;
    let response = gateway.post_json("/fast", &tool_body()).await;
    assert_status(&response, 200);

    let body = TestGateway::json_body(response).await;
    let message = &body["choices"][0]["message"];
    assert!(message["content"].is_null());
    assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");

    let call = &message["tool_calls"][0];
    assert!(!call["id"].as_str().unwrap().is_empty());
    assert_eq!(call["type"], "function");
    assert_eq!(call["function"]["name"], "get_weather");
    let arguments: serde_json::Value =
        serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(arguments, json!({"location": "Paris"}));
}

#[tokio::test]
async fn test_workers_ai_streaming() {
    let workers = MockServer::start().await;
    mount_bad_key(&workers).await;
    Mock::given(method("POST"))
        .and(path(workers_path()))
        .and(header("authorization", "Bearer cf-good"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(workers_sse(&["Hel", "lo"])),
        )
        .expect(1)
        .mount(&workers)
        .await;

    let gateway = workers_gateway(&workers, false).await;
    let (headers, frames) = gateway.post_streaming("/fast", &streaming_body("hi")).await;

    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(frames.last().map(String::as_str), Some("data: [DONE]"));
    assert_eq!(frames.iter().filter(|f| f.contains("[DONE]")).count(), 1);

    let payloads = frame_payloads(&frames);
    assert!(payloads.iter().all(|p| p["object"] == "chat.completion.chunk"));
    assert!(payloads.iter().all(|p| p["model"] == WORKERS_MODEL));

    let id = payloads[0]["id"].as_str().unwrap();
    assert!(payloads.iter().all(|p| p["id"] == id));
    assert_eq!(payloads[0]["choices"][0]["delta"]["role"], "assistant");

    let text: String = payloads
        .iter()
        .filter_map(|p| p["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(text, "Hello");

    let last = payloads.last().unwrap();
    assert_eq!(last["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn test_proxy_token_required() {
    let workers = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(workers_envelope(json!({"response": "ok"}))),
        )
        .expect(1)
        .mount(&workers)
        .await;

    let gateway = workers_gateway(&workers, true).await;

    let missing = gateway.post_json("/fast", &chat_body("hi")).await;
    assert_status(&missing, 401);
    let body = TestGateway::json_body(missing).await;
    assert_eq!(body["error"]["code"], "invalid_proxy_token");

    let wrong = gateway
        .post_json_with_token("/fast", &chat_body("hi"), Some("guess"))
        .await;
    assert_status(&wrong, 401);

    let accepted = gateway
        .post_json_with_token("/fast", &chat_body("hi"), Some(PROXY_TOKEN))
        .await;
    assert_status(&accepted, 200);

    let health = gateway.get("/health").await;
    assert_status(&health, 200);
}
