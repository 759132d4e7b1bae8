//! HTTP client for the media-server API.
//!
//! One [`ApiClient`] wraps a pooled `reqwest::Client` and applies the
//! MediaBrowser-style auth headers to every request. The configured timeout
//! covers connect + header exchange only; download bodies stream without a
//! read deadline (long transfers are expected and bounded by rate limiting
//! and cancellation instead).

mod types;

pub use types::{AuthResponse, Item, ItemsResponse, User};

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::RANGE;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

/// Client name reported in the auth header.
const CLIENT_NAME: &str = "jellydl";

/// Client version reported in the auth header.
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default timeout for the header exchange when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors from media-server API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection refused, TLS).
    #[error("network error calling {endpoint}: {source}")]
    Network {
        /// The endpoint path that failed.
        endpoint: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within the configured timeout.
    #[error("timeout calling {endpoint}")]
    Timeout {
        /// The endpoint path that timed out.
        endpoint: String,
    },

    /// Non-success HTTP status; carries the response body text.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Http {
        /// The endpoint path.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
        /// The response body text, trimmed.
        body: String,
    },

    /// The response body could not be decoded as the expected JSON.
    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        /// The endpoint path.
        endpoint: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    fn from_request(endpoint: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else {
            Self::Network {
                endpoint: endpoint.to_string(),
                source,
            }
        }
    }
}

/// Authenticated client for one media server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: String,
    user_id: String,
    device_id: String,
    device_name: String,
    timeout: Duration,
    client: Client,
}

impl ApiClient {
    /// Creates a client for `base_url` with the given credentials.
    ///
    /// `token`/`user_id` may be empty for unauthenticated calls (login).
    /// A zero `timeout` falls back to [`DEFAULT_TIMEOUT_SECS`].
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error if the HTTP client cannot be
    /// constructed with the requested timeout.
    #[instrument(skip(token), fields(base_url = %base_url))]
    pub fn new(
        base_url: &str,
        token: &str,
        user_id: &str,
        device_id: &str,
        device_name: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let timeout = if timeout.is_zero() {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            timeout
        };
        let device_name = if device_name.is_empty() {
            CLIENT_NAME
        } else {
            device_name
        };

        // Per-request timeouts are attached to the JSON calls only; the
        // download body streams unbounded so throttled transfers survive.
        let client = Client::builder()
            .connect_timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
            timeout,
            client,
        })
    }

    /// Returns the configured user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Replaces the stored credentials (after a successful login).
    pub fn set_auth(&mut self, token: &str, user_id: &str) {
        self.token = token.to_string();
        self.user_id = user_id.to_string();
    }

    /// Authenticates with username and password.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] with the server's body text when the
    /// credentials are rejected, or a transport-level variant otherwise.
    #[instrument(skip(self, password))]
    pub async fn authenticate_by_name(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let endpoint = "/Users/AuthenticateByName";
        let payload = HashMap::from([("Username", username), ("Pw", password)]);

        let response = self
            .client
            .post(format!("{}{endpoint}", self.base_url))
            .timeout(self.timeout)
            .header("X-Emby-Authorization", self.authorization_header())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ApiError::from_request(endpoint, e))?;

        let response = check_status(endpoint, response).await?;
        response.json().await.map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    /// Searches catalog items by term and type.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-success status.
    #[instrument(skip(self))]
    pub async fn search_items(
        &self,
        term: &str,
        types: &[&str],
        limit: i64,
    ) -> Result<Vec<Item>, ApiError> {
        let mut params: Vec<(&str, String)> = vec![("Recursive", "true".to_string())];
        if !term.is_empty() {
            params.push(("SearchTerm", term.to_string()));
        }
        if !types.is_empty() {
            params.push(("IncludeItemTypes", types.join(",")));
        }
        if limit > 0 {
            params.push(("Limit", limit.to_string()));
        }
        if !self.user_id.is_empty() {
            params.push(("UserId", self.user_id.clone()));
        }

        let response: ItemsResponse = self.get_json("/Items", &params).await?;
        Ok(response.items)
    }

    /// Fetches a single catalog item by id.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-success status.
    #[instrument(skip(self))]
    pub async fn get_item(&self, item_id: &str) -> Result<Item, ApiError> {
        self.get_json(&format!("/Items/{item_id}"), &[]).await
    }

    /// Lists all episodes of a series.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-success status.
    #[instrument(skip(self))]
    pub async fn series_episodes(&self, series_id: &str) -> Result<Vec<Item>, ApiError> {
        let mut params: Vec<(&str, String)> = vec![
            ("Recursive", "true".to_string()),
            ("IncludeItemTypes", "Episode".to_string()),
            ("ParentId", series_id.to_string()),
        ];
        if !self.user_id.is_empty() {
            params.push(("UserId", self.user_id.clone()));
        }

        let response: ItemsResponse = self.get_json("/Items", &params).await?;
        Ok(response.items)
    }

    /// Opens a download byte stream for an item.
    ///
    /// Issues `Range: bytes=<offset>-` when `offset > 0`. The caller must
    /// inspect the response status: the server may honor the range (206) or
    /// ignore it and reply with the full content (200).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] carrying the body text for any non-success
    /// status, or a transport-level variant otherwise.
    #[instrument(skip(self))]
    pub async fn open_download(
        &self,
        item_id: &str,
        offset: u64,
    ) -> Result<reqwest::Response, ApiError> {
        let endpoint = format!("/Items/{item_id}/Download");
        let mut request = self
            .client
            .get(format!("{}{endpoint}", self.base_url))
            .header("X-Emby-Authorization", self.authorization_header())
            .header("X-Emby-Token", &self.token);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::from_request(&endpoint, e))?;

        debug!(status = %response.status(), offset, "download stream opened");
        check_status(&endpoint, response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .get(format!("{}{endpoint}", self.base_url))
            .timeout(self.timeout)
            .query(params)
            .header("X-Emby-Authorization", self.authorization_header())
            .header("X-Emby-Token", &self.token)
            .send()
            .await
            .map_err(|e| ApiError::from_request(endpoint, e))?;

        let response = check_status(endpoint, response).await?;
        response.json().await.map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    fn authorization_header(&self) -> String {
        format!(
            "MediaBrowser Client=\"{CLIENT_NAME}\", Device=\"{}\", DeviceId=\"{}\", Version=\"{CLIENT_VERSION}\"",
            self.device_name, self.device_id
        )
    }
}

/// Promotes non-success statuses to [`ApiError::Http`] with the body text.
async fn check_status(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Http {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}
