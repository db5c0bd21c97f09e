#![allow(dead_code)]

use std::net::TcpListener;

use serde_json::{json, Value};
use wiremock::matchers::*;
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowchat_core::{RequestShape, Settings};

/// Mock assistant endpoint for completion client tests
pub struct AssistantMockServer {
    server: MockServer,
}

impl AssistantMockServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Endpoint the client is configured with
    pub fn endpoint(&self) -> String {
        format!("{}/assistant", self.server.uri())
    }

    /// Settings for the path-embedded request shape
    pub fn path_settings(&self) -> Settings {
        Settings {
            api_url: self.endpoint(),
            ..Settings::default()
        }
    }

    /// Settings for the JSON-body request shape
    pub fn json_settings(&self, api_key: &str) -> Settings {
        Settings {
            api_url: self.endpoint(),
            api_key: api_key.to_string(),
            max_tokens: 256,
            request_shape: RequestShape::JsonBody,
        }
    }

    /// Reply to `GET /assistant/<encoded>` with a JSON body
    pub async fn mock_path_reply(&self, encoded_prompt: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/assistant/{}", encoded_prompt)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Reply to any GET with a raw, possibly non-JSON body
    pub async fn mock_raw_reply(&self, body: &str) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Answer every request with `status`
    pub async fn mock_status(&self, status: u16) {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Reply to `POST /assistant` when the bearer key and body match
    pub async fn mock_json_reply(&self, api_key: &str, expected_body: Value, reply: &str) {
        Mock::given(method("POST"))
            .and(path("/assistant"))
            .and(header("authorization", format!("Bearer {}", api_key).as_str()))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(expected_body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": reply })))
            .expect(1)
            .mount(&self.server)
            .await;
    }
}

/// An endpoint nothing listens on.
///
/// Reserves a free port and releases it again. Mock servers are pooled and
/// keep listening after drop, so they cannot be used for this.
pub fn unreachable_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind a free port");
    let port = listener.local_addr().expect("local address").port();
    drop(listener);
    format!("http://127.0.0.1:{}/assistant", port)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
