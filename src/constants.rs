//! Centralized constants shared across the deploy engine.
//!
//! Collecting header names, environment variables, reserved parameter names,
//! and timing defaults here keeps the individual modules free of magic
//! strings and makes the wire conventions auditable in one place.

use std::time::Duration;

// HTTP headers
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

// Content types
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

// Environment variables consumed by the engine
pub const ENV_CONCURRENT_REQUESTS: &str = "CONCURRENT_REQUESTS";
pub const ENV_ADDITIONAL_HTTP_HEADERS: &str = "DT_ADDITIONAL_HTTP_HEADERS";

// Reserved parameter names
pub const PARAM_NAME: &str = "name";
pub const PARAM_SCOPE: &str = "scope";
pub const PARAM_ID: &str = "id";

// Settings object identity
pub const EXTERNAL_ID_PREFIX: &str = "monaco:";
pub const SETTINGS_DEFAULT_SCOPE: &str = "environment";

// API paths
pub const PATH_SETTINGS_OBJECTS: &str = "/api/v2/settings/objects";
pub const PATH_BUCKET_DEFINITIONS: &str = "/platform/storage/management/v1/bucket-definitions";
pub const PATH_OAUTH_TOKEN: &str = "/sso/oauth2/token";

// Pagination
pub const KEY_NEXT_PAGE: &str = "nextPageKey";
pub const DEFAULT_LIST_PROPERTY: &str = "values";

// Retry and backoff defaults
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
pub const RATE_LIMIT_MIN_WAIT: Duration = Duration::from_secs(1);
pub const RATE_LIMIT_MAX_WAIT: Duration = Duration::from_secs(60);

// Bucket lifecycle polling
pub const BUCKET_AWAIT_MAX_WAIT: Duration = Duration::from_secs(60);
pub const BUCKET_AWAIT_INTERVAL: Duration = Duration::from_secs(2);
pub const BUCKET_STATUS_ACTIVE: &str = "active";
pub const BUCKET_DEFAULT_PREFIX: &str = "default_";

// Concurrency
pub const DEFAULT_CONCURRENT_REQUESTS: usize = 5;
