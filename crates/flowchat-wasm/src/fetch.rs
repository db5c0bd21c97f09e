use async_trait::async_trait;
use gloo_net::http::{Method, RequestBuilder};

use flowchat_core::completion::{interpret_response, HttpMethod};
use flowchat_core::{CompletionClient, CompletionError, CompletionRequest};

/// Completion client on top of the browser's `fetch`
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchCompletionClient;

#[async_trait(?Send)]
impl CompletionClient for FetchCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        log::debug!("{} {}", request.method.as_str(), request.url);

        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut builder = RequestBuilder::new(&request.url).method(method);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = match &request.body {
            Some(body) => {
                let request = builder.json(body).map_err(|e| {
                    CompletionError::Transport(format!("Failed to serialize request: {}", e))
                })?;
                request.send().await
            }
            None => builder.send().await,
        }
        .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        let status_text = response.status_text();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        interpret_response(status, &status_text, &body)
    }
}
