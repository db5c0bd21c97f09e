//! Completion Client
//!
//! Builds the request for the remote assistant endpoint and turns its
//! response into reply text. The transport itself sits behind
//! [`CompletionClient`] so the browser host can use `fetch` while native
//! hosts and tests use [`HttpCompletionClient`].

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use flowchat_types::{RequestShape, Settings, Turn, DEFAULT_ENDPOINT};

#[cfg(feature = "native-client")]
mod http;

#[cfg(feature = "native-client")]
pub use http::HttpCompletionClient;

/// Turns of context sent with the JSON-body request shape
pub const HISTORY_WINDOW: usize = 10;

/// Reply used when the endpoint answers with something we cannot read
pub const FALLBACK_REPLY: &str =
    "I received a response, but I'm having trouble displaying it properly.";

/// Completion failures
///
/// The display text is the detail embedded in [`CompletionError::error_reply`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Transport(String),
    #[error("API request failed: {code} {text}")]
    Status { code: u16, text: String },
}

impl CompletionError {
    /// Assistant turn text describing this failure
    pub fn error_reply(&self) -> String {
        format!(
            "I apologize, but I encountered an error: {}. Please check your API settings and try again.",
            self
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// A transport-neutral HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON body, for POST requests
    pub body: Option<Value>,
}

impl CompletionRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Performs a [`CompletionRequest`] and interprets the response
#[async_trait(?Send)]
pub trait CompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[async_trait(?Send)]
impl<T: CompletionClient + ?Sized> CompletionClient for std::rc::Rc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request).await
    }
}

/// Build the request for `prompt`.
///
/// `history` is the conversation so far, including the turn holding
/// `prompt`; only the JSON-body shape sends it.
pub fn build_request(
    settings: &Settings,
    prompt: &str,
    history: &[Turn],
) -> Result<CompletionRequest, CompletionError> {
    match settings.request_shape {
        RequestShape::Path => build_path_request(settings, prompt),
        RequestShape::JsonBody => build_json_request(settings, prompt, history),
    }
}

fn build_path_request(settings: &Settings, prompt: &str) -> Result<CompletionRequest, CompletionError> {
    let endpoint = if settings.is_configured() {
        settings.api_url.trim()
    } else {
        DEFAULT_ENDPOINT
    };

    let mut url = Url::parse(endpoint)
        .map_err(|e| CompletionError::Config(format!("Invalid API endpoint '{}': {}", endpoint, e)))?;
    url.path_segments_mut()
        .map_err(|_| CompletionError::Config(format!("Invalid API endpoint '{}'", endpoint)))?
        .pop_if_empty()
        .push(prompt);

    Ok(CompletionRequest {
        method: HttpMethod::Get,
        url: url.into(),
        headers: Vec::new(),
        body: None,
    })
}

fn build_json_request(
    settings: &Settings,
    prompt: &str,
    history: &[Turn],
) -> Result<CompletionRequest, CompletionError> {
    if !settings.is_configured() {
        return Err(CompletionError::Config(
            "API endpoint not configured. Please configure it in settings.".to_string(),
        ));
    }

    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    if let Some(key) = settings.credential() {
        headers.push(("Authorization".to_string(), format!("Bearer {}", key)));
    }

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let body = json!({
        "message": prompt,
        "max_tokens": settings.max_tokens,
        "conversation_history": &history[start..],
    });

    Ok(CompletionRequest {
        method: HttpMethod::Post,
        url: settings.api_url.trim().to_string(),
        headers,
        body: Some(body),
    })
}

fn non_empty_str<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Reply text from a decoded response body
pub fn extract_reply(data: &Value) -> String {
    if let Some(reply) = non_empty_str(data, "response")
        .or_else(|| non_empty_str(data, "message"))
        .or_else(|| non_empty_str(data, "content"))
    {
        return reply.to_string();
    }

    match data {
        Value::String(s) => s.clone(),
        _ => {
            log::warn!("Unrecognized completion response shape: {}", data);
            FALLBACK_REPLY.to_string()
        }
    }
}

/// Interpret a raw HTTP response
pub fn interpret_response(
    status: u16,
    status_text: &str,
    body: &str,
) -> Result<String, CompletionError> {
    if !(200..300).contains(&status) {
        return Err(CompletionError::Status {
            code: status,
            text: status_text.to_string(),
        });
    }

    match serde_json::from_str::<Value>(body) {
        Ok(data) => Ok(extract_reply(&data)),
        Err(e) => {
            log::warn!("Completion response is not JSON: {}", e);
            Ok(FALLBACK_REPLY.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn configured(shape: RequestShape) -> Settings {
        Settings {
            api_url: "https://assistant.example/api".into(),
            api_key: "secret".into(),
            max_tokens: 500,
            request_shape: shape,
        }
    }

    #[test]
    fn test_path_request_uses_default_endpoint() {
        let request = build_request(&Settings::default(), "hello world?", &[]).unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "http://127.0.0.1:8000/assistant/hello%20world%3F");
        assert!(request.body.is_none());
    }

    #[test]
    fn test_path_request_encodes_slashes() {
        let settings = Settings {
            api_url: "http://localhost:9000/ask/".into(),
            ..Settings::default()
        };
        let request = build_request(&settings, "a/b", &[]).unwrap();
        assert_eq!(request.url, "http://localhost:9000/ask/a%2Fb");
    }

    #[test]
    fn test_path_request_rejects_bad_endpoint() {
        let settings = Settings {
            api_url: "not a url".into(),
            ..Settings::default()
        };
        assert!(matches!(
            build_request(&settings, "x", &[]),
            Err(CompletionError::Config(_))
        ));
    }

    #[test]
    fn test_json_request_requires_endpoint() {
        let settings = Settings {
            request_shape: RequestShape::JsonBody,
            ..Settings::default()
        };
        let err = build_request(&settings, "x", &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "API endpoint not configured. Please configure it in settings."
        );
    }

    #[test]
    fn test_json_request_carries_recent_history() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let history: Vec<Turn> = (0..12).map(|i| Turn::user(format!("m{}", i), at)).collect();

        let request = build_request(&configured(RequestShape::JsonBody), "m11", &history).unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.header("authorization"), Some("Bearer secret"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));

        let body = request.body.unwrap();
        assert_eq!(body["message"], "m11");
        assert_eq!(body["max_tokens"], 500);
        let sent = body["conversation_history"].as_array().unwrap();
        assert_eq!(sent.len(), HISTORY_WINDOW);
        assert_eq!(sent[0]["content"], "m2");
    }

    #[test]
    fn test_json_request_without_key_has_no_auth() {
        let settings = Settings {
            api_key: "  ".into(),
            ..configured(RequestShape::JsonBody)
        };
        let request = build_request(&settings, "x", &[]).unwrap();
        assert_eq!(request.header("Authorization"), None);
    }

    #[test]
    fn test_extract_reply_field_order() {
        assert_eq!(extract_reply(&json!({"response": "a", "message": "b"})), "a");
        assert_eq!(extract_reply(&json!({"response": "", "message": "b"})), "b");
        assert_eq!(extract_reply(&json!({"content": "c"})), "c");
        assert_eq!(extract_reply(&json!("bare")), "bare");
        assert_eq!(extract_reply(&json!({})), FALLBACK_REPLY);
        assert_eq!(extract_reply(&json!([1, 2])), FALLBACK_REPLY);
    }

    #[test]
    fn test_interpret_response() {
        assert_eq!(
            interpret_response(200, "OK", r#"{"message":"Hi there"}"#).unwrap(),
            "Hi there"
        );
        assert_eq!(interpret_response(200, "OK", "<html>").unwrap(), FALLBACK_REPLY);

        let err = interpret_response(404, "Not Found", "").unwrap_err();
        assert_eq!(err.to_string(), "API request failed: 404 Not Found");
        assert_eq!(
            err.error_reply(),
            "I apologize, but I encountered an error: API request failed: 404 Not Found. Please check your API settings and try again."
        );
    }
}
