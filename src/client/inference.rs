//! HTTP client for the chat-completions inference API.

use crate::client::RateLimiter;
use crate::models::{InferenceConfig, InferenceError, Result, SkilltagError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Chat-completions client with retry, backoff, and adaptive rate limiting.
pub struct InferenceClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
    temperature: f64,
    max_tokens: u32,
    rate_limiter: Arc<RateLimiter>,
}

impl InferenceClient {
    pub fn new(config: &InferenceConfig, api_key: String) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SkilltagError::Network)?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout,
            max_retries: config.max_retries,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            rate_limiter: Arc::new(RateLimiter::new()),
        })
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| SkilltagError::Internal(format!("invalid api key header: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Send one chat completion and return the reply content.
    ///
    /// Transient failures (network, timeout, 429, 5xx) are retried with the
    /// server's delay hint when one is present and exponential backoff
    /// otherwise; anything `SkilltagError::is_retryable` rejects surfaces
    /// immediately.
    pub async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let start = Instant::now();
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.headers()?;
        let mut last_error: Option<SkilltagError> = None;

        for attempt in 0..self.max_retries {
            self.rate_limiter.wait_if_needed(&self.model).await;

            let err = match self.attempt_once(&url, &headers, &request).await {
                Ok(content) => {
                    debug!(
                        model = %self.model,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Completion succeeded"
                    );
                    return Ok(content);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt < self.max_retries - 1 {
                let backoff = err
                    .retry_after()
                    .map(Duration::from_secs_f64)
                    .unwrap_or_else(|| Duration::from_secs(2u64.pow(attempt)));
                debug!(
                    attempt = attempt,
                    backoff_secs = backoff.as_secs_f64(),
                    error = %err,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(backoff).await;
            }
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| {
            SkilltagError::Inference(InferenceError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "unknown error".to_string(),
            })
        }))
    }

    /// One request/response round trip, classified into the error taxonomy.
    async fn attempt_once(
        &self,
        url: &str,
        headers: &HeaderMap,
        request: &ChatCompletionRequest,
    ) -> Result<String> {
        let response = self
            .client
            .post(url)
            .headers(headers.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SkilltagError::Timeout(self.timeout)
                } else {
                    SkilltagError::Network(e)
                }
            })?;

        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        self.rate_limiter
            .record_request(&self.model, status, &response_headers);

        if status == 429 {
            let retry_after = response_headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(1.0);
            return Err(SkilltagError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error = if status == 401 {
                InferenceError::AuthenticationFailed
            } else if status == 404 {
                InferenceError::ModelNotFound(self.model.clone())
            } else if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
                InferenceError::ApiError {
                    status,
                    message: api_error.error.message,
                }
            } else {
                InferenceError::ApiError {
                    status,
                    message: error_body,
                }
            };
            return Err(SkilltagError::Inference(error));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            SkilltagError::Inference(InferenceError::InvalidResponse(format!(
                "malformed completion body: {e}"
            )))
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                SkilltagError::Inference(InferenceError::InvalidResponse(
                    "response carried no choices".to_string(),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config(base_url: String) -> InferenceConfig {
        InferenceConfig {
            base_url,
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_retries: 3,
            temperature: 0.1,
            max_tokens: 256,
            ..Default::default()
        }
    }

    fn reply_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[tokio::test]
    async fn successful_completion_returns_content() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer key")
                .json_body_partial(r#"{"model": "test-model"}"#);
            then.status(200).json_body(reply_body("hello"));
        });

        let client = InferenceClient::new(&config(server.base_url()), "key".into()).unwrap();
        let content = client
            .complete(vec![Message::system("s"), Message::user("u")])
            .await
            .unwrap();
        assert_eq!(content, "hello");
        mock.assert();
    }

    #[tokio::test]
    async fn server_error_is_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("oops");
        });

        let client = InferenceClient::new(&config(server.base_url()), "key".into()).unwrap();
        let err = client.complete(vec![Message::user("u")]).await.unwrap_err();
        assert!(err.to_string().contains("500") || err.to_string().contains("oops"));
        assert_eq!(mock.hits(), 3);
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_response_and_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(serde_json::json!({"choices": []}));
        });

        let client = InferenceClient::new(&config(server.base_url()), "key".into()).unwrap();
        let err = client.complete(vec![Message::user("u")]).await.unwrap_err();
        assert!(matches!(
            err,
            SkilltagError::Inference(InferenceError::InvalidResponse(_))
        ));
        assert_eq!(mock.hits(), 1);
    }

    #[tokio::test]
    async fn rate_limiter_counts_traffic() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(reply_body("ok"));
        });

        let client = InferenceClient::new(&config(server.base_url()), "key".into()).unwrap();
        client.complete(vec![Message::user("u")]).await.unwrap();
        client.complete(vec![Message::user("u")]).await.unwrap();

        let stats = client.rate_limiter().stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_429s, 0);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401)
                .json_body(serde_json::json!({"error": {"message": "bad key"}}));
        });

        let client = InferenceClient::new(&config(server.base_url()), "key".into()).unwrap();
        let err = client.complete(vec![Message::user("u")]).await.unwrap_err();
        assert!(matches!(
            err,
            SkilltagError::Inference(InferenceError::AuthenticationFailed)
        ));
        assert_eq!(mock.hits(), 1);
    }
}
