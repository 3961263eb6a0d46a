//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`, with middleware for
//! exponential backoff retries, a hard per-request timeout and uniform
//! response handling for JSON and plain-text bodies.

use std::time::Duration;

use reqwest::{header::HeaderMap, Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

use crate::error::RetrieveError;

/// Longest error body kept in a [`RetrieveError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// A response together with its transaction metadata.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The decoded body, on success.
    pub data: Option<T>,
    /// The raw body returned with a non-2xx status.
    pub error_body: Option<String>,
    /// Numeric HTTP status.
    pub status: u16,
    /// `true` for 2xx.
    pub success: bool,
    /// Response headers.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// Turns a non-2xx response into [`RetrieveError::Status`].
    pub fn into_result(self, path: &str) -> Result<T, RetrieveError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => {
                let mut body = self.error_body.unwrap_or_default();
                if body.len() > MAX_ERROR_BODY {
                    let mut cut = MAX_ERROR_BODY;
                    while !body.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    body.truncate(cut);
                }
                Err(RetrieveError::Status {
                    status: self.status,
                    path: path.to_string(),
                    body,
                })
            }
        }
    }
}

/// Retrying HTTP client bound to one base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
}

impl ApiClient {
    /// Creates a client for `base_url` (absolute, ideally with a trailing
    /// slash) with the given timeout and number of transient retries.
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self, RetrieveError> {
        let url = Url::parse(base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(RetrieveError::Client)?;
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
        })
    }

    /// The base every path is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RetrieveError> {
        self.request::<T>(Method::GET, path, query).await?.into_result(path)
    }

    /// GET `path` and return the body as text.
    pub async fn get_text(&self, path: &str) -> Result<String, RetrieveError> {
        let (response, mut meta) = self.send(Method::GET, path, &[]).await?;
        if let Some(response) = response {
            meta.data = Some(response.text().await?);
        }
        meta.into_result(path)
    }

    /// Performs a request and decodes a JSON body on success.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, RetrieveError> {
        let (response, meta) = self.send(method, path, query).await?;
        let data = match response {
            Some(response) => Some(response.json::<T>().await?),
            None => None,
        };
        Ok(ApiResponse {
            data,
            error_body: meta.error_body,
            status: meta.status,
            success: meta.success,
            headers: meta.headers,
        })
    }

    /// Sends the request. On 2xx the response is handed back for decoding;
    /// otherwise the error body is captured into the metadata.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(Option<reqwest::Response>, ApiResponse<String>), RetrieveError> {
        // 1. Full URL
        let full_url = self.base_url.join(path.trim_start_matches('/'))?;
        let mut req = self
            .inner
            .request(method, full_url)
            .header(reqwest::header::CACHE_CONTROL, "no-store");
        if !query.is_empty() {
            req = req.query(query);
        }

        // 2. Execute and capture metadata
        let response = req.send().await?;
        let status = response.status();
        let mut meta = ApiResponse {
            data: None,
            error_body: None,
            status: status.as_u16(),
            success: status.is_success(),
            headers: response.headers().clone(),
        };

        // 3. Hand back the body or keep the error text
        if meta.success {
            Ok((Some(response), meta))
        } else {
            meta.error_body = response.text().await.ok();
            Ok((None, meta))
        }
    }
}
