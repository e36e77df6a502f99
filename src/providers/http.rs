use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use url::Url;

use crate::error::{ReleaseBotError, Result};

const MAX_RETRIES: u32 = 1;
const RETRY_DELAY_MILLIS: u64 = 500;

/// Read-only REST client shared by the CI and issue tracker adapters.
///
/// Requests carry basic-auth credentials when configured, time out after the
/// configured number of seconds and are retried once on transient failures
/// (connection errors, timeouts, 429 and 5xx responses).
pub(super) struct RestClient {
    client: Client,
    api_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl RestClient {
    pub fn new(
        base_url: &str,
        api_path: &str,
        username: Option<String>,
        password: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(concat!("releasebot/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ReleaseBotError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Url::join drops the last path segment unless it ends with a slash
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        let api_url = Url::parse(&base)
            .map_err(|e| ReleaseBotError::Config(format!("Invalid base URL: {e}")))?
            .join(api_path)
            .map_err(|e| ReleaseBotError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            username,
            password,
        })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| ReleaseBotError::Config(format!("Invalid endpoint URL: {e}")))
    }

    fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }

    /// Issues a GET request, retrying once on transient failures.
    ///
    /// Any other response is returned as-is so callers can decide how to
    /// treat statuses such as 404.
    pub async fn get(&self, url: Url) -> Result<Response> {
        let mut retry_count = 0;
        loop {
            debug!("GET {url}");
            let request = self.auth_request(self.client.get(url.clone()));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if retry_count >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({e}), retrying in {RETRY_DELAY_MILLIS}ms ({}/{MAX_RETRIES})...",
                        retry_count + 1
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MILLIS)).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(ReleaseBotError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: MAX_RETRIES,
                    });
                }
                warn!(
                    "API error (status {status}) from {url}, retrying in {RETRY_DELAY_MILLIS}ms ({}/{MAX_RETRIES})...",
                    retry_count + 1
                );
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MILLIS)).await;
                retry_count += 1;
                continue;
            }

            return Ok(response);
        }
    }
}

/// Turns an unsuccessful response into an `Api` error carrying its body.
pub(super) async fn api_error(response: Response) -> ReleaseBotError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());
    ReleaseBotError::Api { status, message }
}
