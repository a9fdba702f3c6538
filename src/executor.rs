use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use serde_json::Value;

use crate::id;
use crate::store::models::{Attempt, ErrorType};

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Performs one outbound HTTP call and returns a fully classified Attempt.
/// Never propagates an error to its caller: every outcome, transport failure
/// or HTTP status, is folded into the returned Attempt.
#[derive(Debug, Clone)]
pub struct Executor {
    client: Client,
}

impl Executor {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::default())
            .build()?;

        Ok(Self { client })
    }

    #[tracing::instrument(name = "execute_http_request", skip(self, headers, body))]
    pub async fn execute(
        &self,
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
        timeout_seconds: u64,
    ) -> Attempt {
        let started_at = Utc::now();
        let start = Instant::now();

        let outcome = self.send(url, method, headers, body, timeout_seconds).await;

        let (status_code, latency_ms, response_size_bytes, error_type, error_message) =
            match outcome {
                Ok(response) => {
                    let status = response.status();
                    let latency_ms = elapsed_ms(start);
                    let body = response.bytes().await.unwrap_or_default();
                    let response_size_bytes = body.len() as i64;

                    let (error_type, error_message) = if status.is_client_error() {
                        (
                            Some(ErrorType::Http4xx),
                            Some(format!("HTTP {}", status.as_u16())),
                        )
                    } else if status.is_server_error() {
                        (
                            Some(ErrorType::Http5xx),
                            Some(format!("HTTP {}", status.as_u16())),
                        )
                    } else {
                        (None, None)
                    };

                    (
                        Some(status.as_u16() as i64),
                        Some(latency_ms),
                        Some(response_size_bytes),
                        error_type,
                        error_message,
                    )
                }
                Err(err) => {
                    let latency_ms = elapsed_ms(start);
                    let (error_type, message) = classify(&err);
                    (None, Some(latency_ms), None, Some(error_type), Some(truncate(&message)))
                }
            };

        let completed_at = Utc::now();

        Attempt {
            id: id::generate("attempt"),
            run_id: String::new(),
            attempt_number: 0,
            status_code,
            latency_ms,
            response_size_bytes,
            error_type,
            error_message,
            started_at,
            completed_at: Some(completed_at),
            created_at: completed_at,
        }
    }

    async fn send(
        &self,
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
        timeout_seconds: u64,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let method: reqwest::Method = method.parse().unwrap_or(reqwest::Method::GET);

        let mut req = self
            .client
            .request(method, url)
            .timeout(Duration::from_secs(timeout_seconds));

        for (name, value) in headers {
            req = req.header(name, value);
        }

        if let Some(body) = body {
            req = req.json(body);
        }

        req.send().await
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

fn truncate(message: &str) -> String {
    if message.len() <= MAX_ERROR_MESSAGE_LEN {
        message.to_string()
    } else {
        message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
    }
}

fn classify(err: &reqwest::Error) -> (ErrorType, String) {
    let message = err.to_string();

    if err.is_timeout() {
        return (ErrorType::Timeout, message);
    }

    if err.is_connect() {
        let lowered = message.to_lowercase();
        if lowered.contains("name resolution") || lowered.contains("dns") {
            return (ErrorType::Dns, message);
        }
        return (ErrorType::Connection, message);
    }

    (ErrorType::Unknown, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn success_response_has_no_error_type() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/ok");
            then.status(200).body("hello");
        });

        let executor = Executor::new().unwrap();
        let attempt = executor
            .execute(&server.url("/ok"), "GET", &HashMap::new(), None, 5)
            .await;

        mock.assert();
        assert_eq!(attempt.status_code, Some(200));
        assert!(attempt.error_type.is_none());
        assert_eq!(attempt.response_size_bytes, Some(5));
    }

    #[tokio::test]
    async fn server_error_is_classified_http_5xx() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/boom");
            then.status(500);
        });

        let executor = Executor::new().unwrap();
        let attempt = executor
            .execute(&server.url("/boom"), "GET", &HashMap::new(), None, 5)
            .await;

        assert_eq!(attempt.status_code, Some(500));
        assert_eq!(attempt.error_type, Some(ErrorType::Http5xx));
        assert_eq!(attempt.error_message.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn client_error_is_classified_http_4xx() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });

        let executor = Executor::new().unwrap();
        let attempt = executor
            .execute(&server.url("/missing"), "GET", &HashMap::new(), None, 5)
            .await;

        assert_eq!(attempt.error_type, Some(ErrorType::Http4xx));
    }

    #[tokio::test]
    async fn unreachable_port_is_classified_connection() {
        let executor = Executor::new().unwrap();
        let attempt = executor
            .execute("http://127.0.0.1:1", "GET", &HashMap::new(), None, 2)
            .await;

        assert!(attempt.status_code.is_none());
        assert!(matches!(
            attempt.error_type,
            Some(ErrorType::Connection) | Some(ErrorType::Timeout)
        ));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(2));
        });

        let executor = Executor::new().unwrap();
        let attempt = executor
            .execute(&server.url("/slow"), "GET", &HashMap::new(), None, 1)
            .await;

        assert_eq!(attempt.error_type, Some(ErrorType::Timeout));
        assert!(attempt.status_code.is_none());
    }
}
