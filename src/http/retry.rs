//! Retry policy: exponential backoff with jitter and server-directed waits.
//!
//! Two wait sources are honored besides the generic backoff: the
//! `X-RateLimit-Reset` convention (a unix-epoch microsecond timestamp) and
//! the standard `Retry-After` header (seconds or HTTP-date). Server waits
//! are clamped so a misbehaving reset value can neither skip the wait nor
//! stall a worker for minutes.

use crate::constants;
use reqwest::header::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            base_delay: constants::RETRY_BASE_DELAY,
            max_delay: constants::RETRY_MAX_DELAY,
        }
    }
}

impl RetryConfig {
    /// A policy with a different attempt budget and default delays.
    #[must_use]
    pub fn with_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

/// Determines if an HTTP status code is worth retrying.
///
/// 408 and 429 are the only retryable client errors; 5xx are retryable
/// except 501 and 505, which no retry will fix.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    match status {
        408 | 429 => true,
        500..=599 => !matches!(status, 501 | 505),
        _ => false,
    }
}

/// Determines if a transport error is worth retrying.
#[must_use]
pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

/// Calculates the backoff delay for a retry attempt (0-indexed).
///
/// The base delay doubles per attempt up to the cap, then the whole delay
/// is multiplied by a uniform jitter factor in [1, 2].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn backoff_delay(config: &RetryConfig, attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt.min(30)).unwrap_or(30);
    let uncapped = config
        .base_delay
        .checked_mul(2u32.saturating_pow(exponent))
        .unwrap_or(config.max_delay);
    let capped = uncapped.min(config.max_delay);

    let jitter_factor = 1.0 + fastrand::f64();
    Duration::from_millis((capped.as_millis() as f64 * jitter_factor) as u64)
}

/// Extracts the wait the server asked for via `X-RateLimit-{Limit,Reset}`.
///
/// Returns `None` when either header is missing or unparseable; the caller
/// falls back to the generic backoff. The wait until the reset instant is
/// clamped to [1s, 60s]; a reset in the past still sleeps the floor.
#[must_use]
pub fn rate_limit_wait(headers: &HeaderMap) -> Option<Duration> {
    headers.get(constants::HEADER_RATE_LIMIT_LIMIT)?;
    let reset_micros: u64 = headers
        .get(constants::HEADER_RATE_LIMIT_RESET)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;

    let now_micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_micros();
    let wait = Duration::from_micros(reset_micros.saturating_sub(u64::try_from(now_micros).ok()?));

    Some(wait.clamp(constants::RATE_LIMIT_MIN_WAIT, constants::RATE_LIMIT_MAX_WAIT))
}

/// Parses a `Retry-After` header value: delay-seconds or HTTP-date.
///
/// Returns `None` if the header is absent, malformed, or in the past.
#[must_use]
pub fn retry_after_wait(headers: &HeaderMap) -> Option<Duration> {
    let value = headers
        .get(constants::HEADER_RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(value).ok()?;
    date.duration_since(SystemTime::now()).ok()
}

/// Picks the delay before the next attempt after a retryable response.
///
/// A 429 with rate-limit headers sleeps until the advertised reset; other
/// server-directed waits (`Retry-After`) extend the generic backoff but
/// never beyond the configured cap.
#[must_use]
pub fn delay_for_response(
    config: &RetryConfig,
    attempt: usize,
    status: u16,
    headers: &HeaderMap,
) -> Duration {
    if status == 429 {
        if let Some(wait) = rate_limit_wait(headers) {
            return wait;
        }
    }

    let backoff = backoff_delay(config, attempt);
    retry_after_wait(headers).map_or(backoff, |server_wait| {
        backoff.max(server_wait).min(config.max_delay)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(entries: &[(&str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in entries {
            map.insert(
                name.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    fn epoch_micros_in(duration_from_now: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_micros() as i64;
        (now + duration_from_now).max(0).to_string()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        };

        // Jitter multiplies by [1, 2], so check the envelope
        let d0 = backoff_delay(&config, 0);
        assert!(d0 >= Duration::from_secs(1) && d0 <= Duration::from_secs(2), "{d0:?}");

        let d3 = backoff_delay(&config, 3);
        assert!(d3 >= Duration::from_secs(8) && d3 <= Duration::from_secs(16), "{d3:?}");

        let capped = backoff_delay(&config, 20);
        assert!(capped <= Duration::from_secs(120), "{capped:?}");
        assert!(capped >= Duration::from_secs(60), "{capped:?}");
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(501));
        assert!(!is_retryable_status(505));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn rate_limit_wait_sleeps_until_reset() {
        let map = headers(&[
            ("x-ratelimit-limit", "100".to_string()),
            ("x-ratelimit-reset", epoch_micros_in(30_000_000)),
        ]);
        let wait = rate_limit_wait(&map).unwrap();
        assert!(wait > Duration::from_secs(25) && wait <= Duration::from_secs(30), "{wait:?}");
    }

    #[test]
    fn rate_limit_reset_in_the_past_sleeps_the_floor() {
        let map = headers(&[
            ("x-ratelimit-limit", "100".to_string()),
            ("x-ratelimit-reset", epoch_micros_in(-5_000_000)),
        ]);
        assert_eq!(rate_limit_wait(&map), Some(Duration::from_secs(1)));
    }

    #[test]
    fn rate_limit_reset_far_in_future_is_clamped() {
        let map = headers(&[
            ("x-ratelimit-limit", "100".to_string()),
            ("x-ratelimit-reset", epoch_micros_in(600_000_000)),
        ]);
        assert_eq!(rate_limit_wait(&map), Some(Duration::from_secs(60)));
    }

    #[test]
    fn rate_limit_wait_requires_both_headers() {
        let map = headers(&[("x-ratelimit-reset", epoch_micros_in(5_000_000))]);
        assert_eq!(rate_limit_wait(&map), None);

        let map = headers(&[("x-ratelimit-limit", "100".to_string())]);
        assert_eq!(rate_limit_wait(&map), None);
    }

    #[test]
    fn rate_limit_wait_rejects_garbage_reset() {
        let map = headers(&[
            ("x-ratelimit-limit", "100".to_string()),
            ("x-ratelimit-reset", "not-a-timestamp".to_string()),
        ]);
        assert_eq!(rate_limit_wait(&map), None);
    }

    #[test]
    fn retry_after_seconds() {
        let map = headers(&[("retry-after", "7".to_string())]);
        assert_eq!(retry_after_wait(&map), Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_absent() {
        assert_eq!(retry_after_wait(&HeaderMap::new()), None);
    }

    #[test]
    fn retry_after_invalid() {
        let map = headers(&[("retry-after", "soonish".to_string())]);
        assert_eq!(retry_after_wait(&map), None);
    }

    #[test]
    fn delay_prefers_rate_limit_reset_on_429() {
        let config = RetryConfig::default();
        let map = headers(&[
            ("x-ratelimit-limit", "100".to_string()),
            ("x-ratelimit-reset", epoch_micros_in(2_000_000)),
        ]);
        let delay = delay_for_response(&config, 0, 429, &map);
        assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(2), "{delay:?}");
    }

    #[test]
    fn delay_falls_back_to_backoff_without_headers() {
        let config = RetryConfig::default();
        let delay = delay_for_response(&config, 0, 503, &HeaderMap::new());
        assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(2), "{delay:?}");
    }
}
