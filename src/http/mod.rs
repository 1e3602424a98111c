//! HTTP transport: authenticated requests with retry, rate-limit honoring,
//! pagination, and cancellation.
//!
//! One [`RestClient`] wraps one base URL and auth strategy; connection
//! pooling is reqwest's job. Every blocking point (send, backoff sleep,
//! rate-limit wait, concurrency permit) races the ambient cancellation
//! token, so a fired deadline surfaces promptly as [`Error::Cancelled`]
//! and no request started after the cancellation instant reaches the wire.

pub mod auth;
pub mod recorder;
pub mod retry;

use crate::constants;
use crate::error::Error;
use auth::Auth;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use recorder::{redact_headers, RequestLog, RequestRecorder};
use reqwest::header::HeaderMap;
use reqwest::Method;
use retry::RetryConfig;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Installs the default rustls crypto provider the first time an HTTP
/// client is built. `rustls-no-provider` defers this choice to the
/// consuming binary; since this crate has none, it installs the `ring`
/// provider its own `[target.'cfg(not(windows))']`/`[target.'cfg(windows)']`
/// dependency sections already select.
static CRYPTO_PROVIDER_INIT: Once = Once::new();

pub(crate) fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        #[cfg(not(windows))]
        let _ = rustls::crypto::ring::default_provider().install_default();
        #[cfg(windows)]
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Transport knobs, usually built once per run via [`ClientOptions::from_env`].
#[derive(Clone)]
pub struct ClientOptions {
    pub retry: RetryConfig,
    pub recorder: Option<Arc<dyn RequestRecorder>>,
    /// Optional requests-per-second ceiling on top of the concurrency cap.
    pub requests_per_second: Option<u32>,
    /// Soft cap on concurrent outgoing requests per client.
    pub max_concurrent_requests: usize,
    /// Extra headers appended to every request.
    pub additional_headers: Vec<(String, String)>,
    pub cancel: CancellationToken,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            recorder: None,
            requests_per_second: None,
            max_concurrent_requests: constants::DEFAULT_CONCURRENT_REQUESTS,
            additional_headers: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("retry", &self.retry)
            .field("requests_per_second", &self.requests_per_second)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("additional_headers", &self.additional_headers)
            .finish_non_exhaustive()
    }
}

impl ClientOptions {
    /// Reads the process environment for transport overrides:
    /// `CONCURRENT_REQUESTS` and `DT_ADDITIONAL_HTTP_HEADERS`.
    #[must_use]
    pub fn from_env(cancel: CancellationToken) -> Self {
        let max_concurrent_requests = std::env::var(constants::ENV_CONCURRENT_REQUESTS)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(constants::DEFAULT_CONCURRENT_REQUESTS);

        let additional_headers = std::env::var(constants::ENV_ADDITIONAL_HTTP_HEADERS)
            .map(|v| parse_additional_headers(&v))
            .unwrap_or_default();

        Self {
            max_concurrent_requests,
            additional_headers,
            cancel,
            ..Self::default()
        }
    }
}

/// Parses a comma-separated `Key: Value` list. Malformed entries are
/// dropped with a warning rather than failing the run.
#[must_use]
pub fn parse_additional_headers(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (name, value) = entry.split_once(':').or_else(|| {
                warn!(entry, "ignoring malformed additional header");
                None
            })?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub headers: HeaderMap,
}

impl ApiResponse {
    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a JSON error when the body is not valid JSON.
    pub fn json(&self) -> Result<Value, Error> {
        serde_json::from_str(&self.body).map_err(Error::Json)
    }
}

/// Auth-aware HTTP client for one base URL.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    auth: Auth,
    options: ClientOptions,
    limiter: Option<DefaultDirectRateLimiter>,
    semaphore: Semaphore,
}

impl RestClient {
    /// Builds a client with pooled connections and sane timeouts.
    ///
    /// # Errors
    ///
    /// Fails when the underlying HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, auth: Auth, options: ClientOptions) -> Result<Self, Error> {
        ensure_crypto_provider();
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(Error::Network)?;

        let limiter = options.requests_per_second.and_then(NonZeroU32::new).map(|rps| {
            RateLimiter::direct(Quota::per_second(rps))
        });
        let semaphore = Semaphore::new(options.max_concurrent_requests.max(1));

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            options,
            limiter,
            semaphore,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// # Errors
    /// Propagates transport, response, and cancellation errors.
    pub async fn get(&self, path: &str) -> Result<ApiResponse, Error> {
        self.request(Method::GET, path, None, None).await
    }

    /// # Errors
    /// Propagates transport, response, and cancellation errors.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<ApiResponse, Error> {
        self.request(Method::POST, path, Some(body), None).await
    }

    /// # Errors
    /// Propagates transport, response, and cancellation errors.
    pub async fn put_json(&self, path: &str, body: &Value) -> Result<ApiResponse, Error> {
        self.request(Method::PUT, path, Some(body), None).await
    }

    /// # Errors
    /// Propagates transport, response, and cancellation errors.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse, Error> {
        self.request(Method::DELETE, path, None, None).await
    }

    /// GET-list that follows `nextPageKey` cursors, concatenating the named
    /// list property across pages.
    ///
    /// An empty page while a cursor chain is still in flight is treated as
    /// a recoverable error and re-requested up to the retry budget.
    ///
    /// # Errors
    ///
    /// Propagates transport errors; fails when empty-page retries are
    /// exhausted.
    pub async fn get_paginated(&self, path: &str, list_property: &str) -> Result<Vec<Value>, Error> {
        let mut items = Vec::new();
        let mut next_page_key: Option<String> = None;
        let mut empty_retries = 0usize;

        loop {
            let url = match &next_page_key {
                Some(key) => with_query(
                    path,
                    &format!("{}={}", constants::KEY_NEXT_PAGE, urlencoding::encode(key)),
                ),
                None => path.to_string(),
            };

            let response = self.get(&url).await?;
            let body = response.json()?;
            let page: Vec<Value> = body
                .get(list_property)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let next = body
                .get(constants::KEY_NEXT_PAGE)
                .and_then(Value::as_str)
                .filter(|k| !k.is_empty())
                .map(str::to_string);

            if next_page_key.is_some() && page.is_empty() && next.is_some() {
                empty_retries += 1;
                if empty_retries >= self.options.retry.max_attempts {
                    return Err(Error::retry_limit_exceeded(
                        empty_retries,
                        format!("empty page while following {} on {path}", constants::KEY_NEXT_PAGE),
                    ));
                }
                debug!(path, empty_retries, "empty page mid-pagination, re-requesting");
                let delay = retry::backoff_delay(&self.options.retry, empty_retries - 1);
                self.sleep_cancellable(delay).await?;
                continue;
            }

            empty_retries = 0;
            items.extend(page);

            match next {
                Some(key) => next_page_key = Some(key),
                None => break,
            }
        }

        Ok(items)
    }

    /// Issues one request with the full policy stack: concurrency permit,
    /// optional rate limiter, auth, retries with backoff, single token
    /// refresh on 401, and cancellation at every wait.
    ///
    /// # Errors
    ///
    /// - [`Error::HttpResponse`] for a non-2xx that survives retries
    /// - [`Error::Network`] for transport failures
    /// - [`Error::Cancelled`] when the ambient token fires
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        retry_override: Option<&RetryConfig>,
    ) -> Result<ApiResponse, Error> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let retry_config = retry_override.unwrap_or(&self.options.retry);
        let attempts = retry_config.max_attempts.max(1);

        let _permit = tokio::select! {
            () = self.options.cancel.cancelled() => return Err(Error::Cancelled),
            permit = self.semaphore.acquire() => {
                permit.map_err(|_| Error::deployment("request semaphore closed"))?
            }
        };

        if let Some(limiter) = &self.limiter {
            tokio::select! {
                () = self.options.cancel.cancelled() => return Err(Error::Cancelled),
                () = limiter.until_ready() => {}
            }
        }

        let mut refreshed = false;
        let mut attempt = 0;

        while attempt < attempts {
            if self.options.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let builder = self.build_request(&method, &url, body).await?;

            let send_result = tokio::select! {
                () = self.options.cancel.cancelled() => return Err(Error::Cancelled),
                result = builder.send() => result,
            };

            let response = match send_result {
                Ok(response) => response,
                Err(error) => {
                    if !retry::is_retryable_transport_error(&error) || attempt + 1 >= attempts {
                        return Err(Error::Network(error));
                    }
                    let delay = retry::backoff_delay(retry_config, attempt);
                    warn!(%url, %error, ?delay, "transport error, retrying");
                    self.sleep_cancellable(delay).await?;
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let text = tokio::select! {
                () = self.options.cancel.cancelled() => return Err(Error::Cancelled),
                text = response.text() => text.map_err(Error::Network)?,
            };

            if (200..300).contains(&status) {
                return Ok(ApiResponse {
                    status,
                    body: text,
                    headers,
                });
            }

            if status == 401 && !refreshed {
                debug!(%url, "401 response, attempting token refresh");
                if self.auth.refresh(&self.http).await? {
                    refreshed = true;
                    continue;
                }
            }

            if !retry::is_retryable_status(status) || attempt + 1 >= attempts {
                return Err(Error::http_response(status, text, url));
            }

            let delay = retry::delay_for_response(retry_config, attempt, status, &headers);
            warn!(%url, status, ?delay, "retryable response, backing off");
            self.sleep_cancellable(delay).await?;
            attempt += 1;
        }

        Err(Error::retry_limit_exceeded(attempts, format!("{method} {url}")))
    }

    async fn build_request(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let mut builder = self.http.request(method.clone(), url);
        let mut log_headers: Vec<(String, String)> = Vec::new();

        if let Some(header) = self.auth.authorization_header(&self.http).await? {
            builder = builder.header(constants::HEADER_AUTHORIZATION, &header);
            log_headers.push((constants::HEADER_AUTHORIZATION.to_string(), header));
        }

        for (name, value) in &self.options.additional_headers {
            builder = builder.header(name, value);
            log_headers.push((name.clone(), value.clone()));
        }

        if let Some(payload) = body {
            builder = builder.json(payload);
            log_headers.push((
                constants::HEADER_CONTENT_TYPE.to_string(),
                constants::CONTENT_TYPE_JSON.to_string(),
            ));
        }

        if let Some(recorder) = &self.options.recorder {
            recorder.record(RequestLog {
                method: method.to_string(),
                url: url.to_string(),
                headers: redact_headers(&log_headers),
                body: body.map(Value::to_string),
            });
        }

        Ok(builder)
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.options.retry
    }

    pub(crate) async fn sleep_cancellable(&self, delay: Duration) -> Result<(), Error> {
        tokio::select! {
            () = self.options.cancel.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Appends a query fragment, respecting an existing `?`.
fn with_query(path: &str, query: &str) -> String {
    if path.contains('?') {
        format!("{path}&{query}")
    } else {
        format!("{path}?{query}")
    }
}
