//! Test fixtures and sample data for integration tests

use serde_json::{json, Value};
use wiremock::MockServer;

/// Proxy token used by authenticated fixtures
pub const PROXY_TOKEN: &str = "proxy-secret";

/// Cloudflare account used by Workers AI fixtures
pub const ACCOUNT_ID: &str = "acct-123";

/// Workers AI model used by fixtures
pub const WORKERS_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";

/// Create a simple chat request body
pub fn chat_body(prompt: &str) -> Value {
    json!({
        "model": "client-side-model-is-ignored",
        "messages": [{"role": "user", "content": prompt}]
    })
}

/// Create a streaming chat request body
pub fn streaming_body(prompt: &str) -> Value {
    let mut body = chat_body(prompt);
    body["stream"] = json!(true);
    body
}

/// Create a chat request body declaring a `get_weather` tool
pub fn tool_body() -> Value {
    json!({
        "messages": [
            {"role": "system", "content": "Use tools when helpful."},
            {"role": "user", "content": "What's the weather in Paris?"}
        ],
        "tools": [{
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Current weather for a city",
                "parameters": {
                    "type": "object",
                    "properties": {"location": {"type": "string"}},
                    "required": ["location"]
                }
            }
        }]
    })
}

/// OpenAI-compatible upstream completion payload
pub fn openai_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-upstream",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 1, "total_tokens": 10}
    })
}

/// Anthropic Messages API text payload
pub fn anthropic_message(text: &str) -> Value {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "model": "claude-3-5-sonnet-latest",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 9, "output_tokens": 1}
    })
}

/// Workers AI REST envelope around `result`
pub fn workers_envelope(result: Value) -> Value {
    json!({
        "result": result,
        "success": true,
        "errors": [],
        "messages": []
    })
}

/// Upstream authentication failure payload
pub fn upstream_unauthorized() -> Value {
    json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}})
}

/// Workers AI SSE body streaming `parts`, terminated by `[DONE]`
pub fn workers_sse(parts: &[&str]) -> String {
    let mut body: String = parts
        .iter()
        .map(|part| format!("data: {}\n\n", json!({"response": part})))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

/// `/deep-think` tries OpenAI (one bad key, one good) then Anthropic
pub fn fallback_yaml(openai: &MockServer, anthropic: &MockServer) -> String {
    format!(
        r#"
routes:
  - path: /deep-think
    providers:
      - provider: openai
        model: gpt-4o-mini
        base_url: {openai}/v1
        api_keys: ["${{OPENAI_KEY_1}}", "${{OPENAI_KEY_2}}"]
      - provider: anthropic
        model: claude-3-5-sonnet-latest
        base_url: {anthropic}
        api_keys: ["${{ANTHROPIC_KEY}}"]
"#,
        openai = openai.uri(),
        anthropic = anthropic.uri(),
    )
}

/// Secrets referenced by [`fallback_yaml`]
pub fn fallback_env() -> Vec<(&'static str, &'static str)> {
    vec![
        ("OPENAI_KEY_1", "sk-revoked"),
        ("OPENAI_KEY_2", "sk-live"),
        ("ANTHROPIC_KEY", "sk-ant-live"),
    ]
}

/// `/fast` served by Workers AI over REST, optionally behind a proxy token
pub fn workers_yaml(workers: &MockServer, protected: bool) -> String {
    let auth = if protected {
        format!("auth:\n  proxy_tokens: [\"{PROXY_TOKEN}\"]\n")
    } else {
        String::new()
    };

    format!(
        r#"
{auth}
routes:
  - path: /fast
    providers:
      - provider: workers-ai
        model: "{WORKERS_MODEL}"
        account_id: {ACCOUNT_ID}
        base_url: {uri}/client/v4
        api_keys: ["cf-bad", "cf-good"]
"#,
        uri = workers.uri(),
    )
}

/// Path a Workers AI REST call for [`WORKERS_MODEL`] lands on
pub fn workers_path() -> String {
    format!("/client/v4/accounts/{ACCOUNT_ID}/ai/run/{WORKERS_MODEL}")
}
