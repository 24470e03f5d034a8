//! Test helper utilities for integration tests

use futures::StreamExt;
use gateway_config::{ConfigLoader, GatewayConfig};
use gateway_server::Server;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Initialize tracing for tests when `TEST_LOG` is set
pub fn init_tracing() {
    TRACING.call_once(|| {
        if std::env::var("TEST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

/// Load a YAML config document through the real loader
///
/// `env` backs `${VAR}` references in the document.
pub fn load_yaml(yaml: &str, env: &[(&str, &str)]) -> GatewayConfig {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create config file");
    file.write_all(yaml.as_bytes())
        .expect("Failed to write config file");

    let vars: HashMap<String, String> = env
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

    ConfigLoader::new()
        .with_file(file.path())
        .with_env(move |name: &str| vars.get(name).cloned())
        .load()
        .expect("Failed to load config")
}

/// A running gateway bound to an ephemeral port
pub struct TestGateway {
    /// The server address
    pub addr: SocketAddr,
    /// HTTP client for making requests
    pub client: Client,
    /// Base URL for the gateway
    pub base_url: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestGateway {
    /// Assemble the gateway from `config` and start serving
    pub async fn start(config: &GatewayConfig) -> Self {
        init_tracing();

        let server = Server::from_config(config).expect("Failed to build gateway");
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create client");

        Self {
            addr,
            client,
            base_url: format!("http://{addr}"),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.post_json_with_token(path, body, None).await
    }

    /// Make a POST request with JSON body and an optional bearer token
    pub async fn post_json_with_token(
        &self,
        path: &str,
        body: &Value,
        token: Option<&str>,
    ) -> Response {
        let mut builder = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder.send().await.expect("Request failed")
    }

    /// Make a streaming POST request and split the body into SSE frames
    pub async fn post_streaming(&self, path: &str, body: &Value) -> (HeaderMap, Vec<String>) {
        let response = self.post_json(path, body).await;
        let status = response.status();
        assert_eq!(status, 200, "streaming request failed with {status}");

        let mut text = String::new();
        let headers = response.headers().clone();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.expect("Stream read failed");
            text.push_str(&String::from_utf8_lossy(&bytes));
        }

        let frames = text
            .split("\n\n")
            .filter(|frame| !frame.is_empty())
            .map(str::to_string)
            .collect();

        (headers, frames)
    }

    /// Parse response body as JSON
    pub async fn json_body(response: Response) -> Value {
        response.json().await.expect("Failed to parse JSON")
    }

    /// Shutdown the gateway
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Payload of each `data:` frame, parsed as JSON (the `[DONE]` sentinel is skipped)
pub fn frame_payloads(frames: &[String]) -> Vec<Value> {
    frames
        .iter()
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).expect("Frame is not JSON"))
        .collect()
}

/// Assert a response has the expected status
pub fn assert_status(response: &Response, expected: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}
