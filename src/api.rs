use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

const INITIAL_BACKOFF_MS: u64 = 500;

/// Resolve the bearer token from the named environment variable.
pub fn resolve_api_key(api_key_env: &str) -> Result<String> {
    match std::env::var(api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::ConfigValidation(format!(
            "API key not found in ${api_key_env}"
        ))),
    }
}

/// Percent-encode an identifier (model id, guardrail ARN) for use as a single
/// path segment.
pub(crate) fn url_segment(raw: &str) -> String {
    raw.replace('%', "%25").replace(':', "%3A").replace('/', "%2F")
}

// ---------------------------------------------------------------------------
// Client abstraction (for testability)
// ---------------------------------------------------------------------------

/// Minimal JSON-over-HTTP client used by the validator, catalog and converse
/// generator.
pub trait ApiClient {
    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value>;
    fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value>;
}

/// Blocking `ureq` client with bearer auth and retry on transient errors.
pub struct HttpClient {
    base_url: String,
    api_key: String,
    max_retries: u32,
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: String,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            max_retries: max_retries.max(1),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{path}", self.base_url);
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut attempt = 1;
        loop {
            let mut request = self
                .agent
                .request(method, &url)
                .set("Authorization", &format!("Bearer {}", self.api_key))
                .set("Accept", "application/json");
            for (key, value) in query {
                request = request.query(key, value);
            }
            debug!(method, %url, attempt, "sending request");

            let response = match body {
                Some(body) => request
                    .set("Content-Type", "application/json")
                    .send_json(body),
                None => request.call(),
            };

            match response {
                Ok(response) => {
                    return response.into_json().map_err(|e| Error::Api {
                        code: "InvalidResponse".to_string(),
                        message: format!("failed to parse response from {url}: {e}"),
                    });
                }
                Err(ref e) if attempt < self.max_retries && is_retryable(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        backoff_ms,
                        "retrying request after transient error"
                    );
                    thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(into_api_error(e)),
            }
        }
    }
}

impl ApiClient for HttpClient {
    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        self.send("GET", path, query, None)
    }

    fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.send("POST", path, &[], Some(body))
    }
}

/// Only retry rate-limits (429), server errors (5xx), and transport/network errors.
fn is_retryable(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

fn into_api_error(err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(status, response) => {
            let header_code = response
                .header("x-amzn-ErrorType")
                .map(|h| h.split(':').next().unwrap_or(h).to_string());
            let body: Option<serde_json::Value> = response.into_json().ok();
            let (code, message) = parse_error_body(status, header_code, body.as_ref());
            Error::Api { code, message }
        }
        ureq::Error::Transport(t) => Error::Api {
            code: "TransportError".to_string(),
            message: t.to_string(),
        },
    }
}

/// Extract an error code and message from an AWS-style JSON error body.
pub fn parse_error_body(
    status: u16,
    header_code: Option<String>,
    body: Option<&serde_json::Value>,
) -> (String, String) {
    let body_code = body
        .and_then(|b| b.get("__type"))
        .and_then(|v| v.as_str())
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string());
    let code = header_code
        .filter(|c| !c.is_empty())
        .or(body_code)
        .unwrap_or_else(|| format!("Http{status}"));
    let message = body
        .and_then(|b| b.get("message").or_else(|| b.get("Message")))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("request failed with status {status}"));
    (code, message)
}
