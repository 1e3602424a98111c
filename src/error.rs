//! Consolidated error handling for the deploy engine.
//!
//! All engine errors are categorized into a small set of [`ErrorKind`]s so
//! the orchestrator can decide per-node consequences (fail, skip, abort)
//! without string matching. Constructor helpers keep call sites terse and
//! the messages consistent.

use crate::project::Coordinate;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure: connect, DNS, timeout, protocol.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A non-2xx response that survived the retry policy.
    #[error("HTTP {status} from {url}: {body}")]
    HttpResponse {
        status: u16,
        body: String,
        url: String,
    },

    /// The ambient deadline fired; every pending operation reports this.
    #[error("operation cancelled")]
    Cancelled,

    /// Categorized engine error. The coordinate is present whenever the
    /// error is attributable to a single configuration.
    #[error("{kind}: {message}")]
    Engine {
        kind: ErrorKind,
        message: Cow<'static, str>,
        coordinate: Option<Coordinate>,
    },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Error categories the orchestrator dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Pre-flight invariants: uniqueness, cycles. Fatal for the run.
    Validation,
    /// Missing env var, unresolved reference, bad compound, parameter cycle.
    ParameterResolution,
    /// Template rendering failure (missing placeholder value).
    Render,
    /// Resource-client misuse or remote-state conflicts (multi-match, bad
    /// catalog entry, missing identity).
    Client,
    /// Token refresh / OAuth handshake failure.
    Authentication,
    /// Retries exhausted without a successful response.
    RetryExhausted,
    /// Deploy-level bookkeeping failures (worker panic, poisoned state).
    Deployment,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::ParameterResolution => "parameter resolution",
            Self::Render => "rendering",
            Self::Client => "client",
            Self::Authentication => "authentication",
            Self::RetryExhausted => "retries exhausted",
            Self::Deployment => "deployment",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// The category of this error, where one applies.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Engine { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The HTTP status, when this is a response error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The coordinate this error is attributable to, if any.
    #[must_use]
    pub fn coordinate(&self) -> Option<&Coordinate> {
        match self {
            Self::Engine { coordinate, .. } => coordinate.as_ref(),
            _ => None,
        }
    }

    /// Whether the orchestrator should treat this node as deliberately
    /// skipped rather than failed. An unresolved reference means the parent
    /// never deployed; retrying cannot help and the node is pruned.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::Engine { kind: ErrorKind::ParameterResolution, message, .. }
                if message.starts_with("unresolved reference")
        )
    }

    fn engine(kind: ErrorKind, message: String, coordinate: Option<Coordinate>) -> Self {
        Self::Engine {
            kind,
            message: Cow::Owned(message),
            coordinate,
        }
    }

    pub fn http_response(status: u16, body: impl Into<String>, url: impl Into<String>) -> Self {
        Self::HttpResponse {
            status,
            body: body.into(),
            url: url.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::engine(ErrorKind::Validation, message.into(), None)
    }

    pub fn duplicate_name(
        environment: &str,
        api: &str,
        name: &str,
        first: &Coordinate,
        second: &Coordinate,
    ) -> Self {
        Self::engine(
            ErrorKind::Validation,
            format!(
                "duplicate name '{name}' for {api} in environment '{environment}': \
                 {first} and {second} resolve to the same (name, scope)"
            ),
            Some(second.clone()),
        )
    }

    pub fn config_cycle(environment: &str, chain: &[Coordinate]) -> Self {
        let path = chain
            .iter()
            .map(Coordinate::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        Self::engine(
            ErrorKind::Validation,
            format!("dependency cycle in environment '{environment}': {path}"),
            chain.first().cloned(),
        )
    }

    pub fn missing_env_var(coordinate: &Coordinate, parameter: &str, variable: &str) -> Self {
        Self::engine(
            ErrorKind::ParameterResolution,
            format!(
                "environment variable '{variable}' required by parameter '{parameter}' is not set"
            ),
            Some(coordinate.clone()),
        )
    }

    pub fn unresolved_reference(
        coordinate: &Coordinate,
        parameter: &str,
        target: &Coordinate,
    ) -> Self {
        Self::engine(
            ErrorKind::ParameterResolution,
            format!(
                "unresolved reference in parameter '{parameter}': {target} has not been deployed"
            ),
            Some(coordinate.clone()),
        )
    }

    pub fn missing_reference_property(
        coordinate: &Coordinate,
        parameter: &str,
        target: &Coordinate,
        property: &str,
    ) -> Self {
        Self::engine(
            ErrorKind::ParameterResolution,
            format!(
                "parameter '{parameter}' references property '{property}' of {target}, \
                 which its deploy result does not carry"
            ),
            Some(coordinate.clone()),
        )
    }

    pub fn invalid_compound(coordinate: &Coordinate, parameter: &str, reason: &str) -> Self {
        Self::engine(
            ErrorKind::ParameterResolution,
            format!("invalid compound parameter '{parameter}': {reason}"),
            Some(coordinate.clone()),
        )
    }

    pub fn parameter_cycle(coordinate: &Coordinate, chain: &[String]) -> Self {
        Self::engine(
            ErrorKind::ParameterResolution,
            format!("parameter cycle: {}", chain.join(" -> ")),
            Some(coordinate.clone()),
        )
    }

    pub fn missing_template_var(coordinate: &Coordinate, placeholder: &str) -> Self {
        Self::engine(
            ErrorKind::Render,
            format!(
                "template references '{{{{.{placeholder}}}}}' but no such property was resolved"
            ),
            Some(coordinate.clone()),
        )
    }

    pub fn client_error(coordinate: &Coordinate, message: impl Into<String>) -> Self {
        Self::engine(ErrorKind::Client, message.into(), Some(coordinate.clone()))
    }

    pub fn ambiguous_name_match(coordinate: &Coordinate, name: &str, count: usize) -> Self {
        Self::engine(
            ErrorKind::Client,
            format!("found {count} remote entities named '{name}'; cannot pick an upsert target"),
            Some(coordinate.clone()),
        )
    }

    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::engine(ErrorKind::Authentication, reason.into(), None)
    }

    pub fn retry_limit_exceeded(attempts: usize, last_error: impl Into<String>) -> Self {
        Self::engine(
            ErrorKind::RetryExhausted,
            format!("giving up after {attempts} attempts: {}", last_error.into()),
            None,
        )
    }

    pub fn deployment(message: impl Into<String>) -> Self {
        Self::engine(ErrorKind::Deployment, message.into(), None)
    }
}
