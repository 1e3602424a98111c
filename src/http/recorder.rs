//! Optional request recording with automatic credential redaction.
//!
//! Every outgoing request (including retries) is offered to the configured
//! recorder. Implementations must tolerate concurrent calls; the bundled
//! [`MemoryRecorder`] serializes writes behind a mutex.

use std::sync::Mutex;

/// A single recorded request. The authorization header value is redacted
/// before the log ever reaches a recorder.
#[derive(Debug, Clone)]
pub struct RequestLog {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Sink for request traces.
pub trait RequestRecorder: Send + Sync {
    fn record(&self, log: RequestLog);
}

/// Replaces credential-bearing header values with a placeholder.
#[must_use]
pub fn redact_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case(crate::constants::HEADER_AUTHORIZATION) {
                (name.clone(), "<redacted>".to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

/// In-memory recorder, mainly for tests and dry-run inspection.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    logs: Mutex<Vec<RequestLog>>,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if a recording thread panicked while holding the lock.
    #[must_use]
    pub fn logs(&self) -> Vec<RequestLog> {
        self.logs.lock().expect("recorder lock poisoned").clone()
    }
}

impl RequestRecorder for MemoryRecorder {
    fn record(&self, log: RequestLog) {
        self.logs.lock().expect("recorder lock poisoned").push(log);
    }
}
