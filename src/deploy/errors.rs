//! Error aggregation for deploy runs.
//!
//! Per-node errors collect into per-environment lists, which collect into
//! one run-level container. Nothing here masks failures: `ContinueOnError`
//! only changes how far a component worker presses on.

use crate::error::Error;
use crate::project::Coordinate;
use std::collections::BTreeMap;
use std::fmt;

/// One configuration's deploy failure and its cause.
#[derive(Debug)]
pub struct ConfigDeployError {
    pub coordinate: Option<Coordinate>,
    pub environment: String,
    pub error: Error,
}

impl ConfigDeployError {
    pub fn new(
        environment: impl Into<String>,
        coordinate: Option<Coordinate>,
        error: Error,
    ) -> Self {
        Self {
            coordinate,
            environment: environment.into(),
            error,
        }
    }
}

impl fmt::Display for ConfigDeployError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.coordinate {
            Some(coordinate) => write!(f, "{coordinate}: {}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Run-level aggregate: environment name → that environment's failures.
#[derive(Debug, Default)]
pub struct DeploymentErrors {
    by_environment: BTreeMap<String, Vec<ConfigDeployError>>,
}

impl DeploymentErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ConfigDeployError) {
        self.by_environment
            .entry(error.environment.clone())
            .or_default()
            .push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ConfigDeployError>) {
        for error in errors {
            self.push(error);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_environment.values().all(Vec::is_empty)
    }

    /// Total failure count across environments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_environment.values().map(Vec::len).sum()
    }

    /// Failures of one environment, if any were recorded.
    #[must_use]
    pub fn for_environment(&self, environment: &str) -> Option<&[ConfigDeployError]> {
        self.by_environment.get(environment).map(Vec::as_slice)
    }

    pub fn environments(&self) -> impl Iterator<Item = (&String, &Vec<ConfigDeployError>)> {
        self.by_environment.iter()
    }
}

impl fmt::Display for DeploymentErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no deployment errors");
        }
        writeln!(f, "{} deployment error(s):", self.len())?;
        for (environment, errors) in &self.by_environment {
            for error in errors {
                writeln!(f, "  [{environment}] {error}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for DeploymentErrors {}
