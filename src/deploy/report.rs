//! Per-node results and the run-level deploy report.
//!
//! Every configuration ends in exactly one terminal state. Skipped entries
//! carry their cause so the final summary can distinguish "parent failed"
//! pruning from deliberate skips and from aborts.

use super::errors::DeploymentErrors;
use crate::project::Coordinate;
use std::fmt;

/// Terminal state of one configuration in one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    /// The remote end reached the desired state; the id is the remote
    /// identity (synthesized under dry-run).
    Deployed { id: String },
    /// The node's own deploy failed; the cause is in the error aggregate.
    Failed,
    /// The node was removed from the graph without deploying.
    Skipped { cause: SkipCause },
}

/// Why a node was skipped rather than deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipCause {
    /// The configuration carries `skip: true`.
    ConfigFlag,
    /// Parameter resolution found an undeployed reference target.
    UnresolvedReference { detail: String },
    /// A sub-path configuration had no resolvable parent object id.
    MissingParent,
    /// A transitive ancestor failed or was skipped.
    Parent { parent: Coordinate },
    /// The component worker stopped early (`continue_on_error = false`).
    Aborted,
    /// Pre-flight validation failed; nothing in the environment deployed.
    ValidationFailed,
    /// The run was cancelled before this node deployed.
    Cancelled,
}

impl fmt::Display for SkipCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigFlag => write!(f, "skip flag set"),
            Self::UnresolvedReference { detail } => write!(f, "{detail}"),
            Self::MissingParent => write!(f, "parent object id did not resolve"),
            Self::Parent { parent } => write!(f, "parent {parent} was not deployed"),
            Self::Aborted => write!(f, "deploy aborted after an earlier failure"),
            Self::ValidationFailed => write!(f, "environment failed validation"),
            Self::Cancelled => write!(f, "run cancelled"),
        }
    }
}

/// One configuration's terminal record.
#[derive(Debug, Clone)]
pub struct NodeResult {
    pub coordinate: Coordinate,
    pub status: NodeStatus,
}

/// Everything that happened in one environment.
#[derive(Debug)]
pub struct EnvironmentReport {
    pub environment: String,
    pub results: Vec<NodeResult>,
}

impl EnvironmentReport {
    #[must_use]
    pub fn deployed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, NodeStatus::Deployed { .. }))
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, NodeStatus::Failed))
            .count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, NodeStatus::Skipped { .. }))
            .count()
    }

    #[must_use]
    pub fn result_for(&self, coordinate: &Coordinate) -> Option<&NodeResult> {
        self.results.iter().find(|r| &r.coordinate == coordinate)
    }
}

/// The run-level result: per-environment reports plus the error aggregate.
#[derive(Debug)]
pub struct DeploymentReport {
    pub environments: Vec<EnvironmentReport>,
    pub errors: DeploymentErrors,
}

impl DeploymentReport {
    /// Whether every configuration in every environment deployed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
            && self
                .environments
                .iter()
                .all(|env| env.failed() == 0 && env.skipped() == 0)
    }

    #[must_use]
    pub fn environment(&self, name: &str) -> Option<&EnvironmentReport> {
        self.environments.iter().find(|e| e.environment == name)
    }

    /// Human-readable final summary: every failed node with its cause,
    /// skipped entries listed separately.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for env in &self.environments {
            out.push_str(&format!(
                "environment '{}': {} deployed, {} failed, {} skipped\n",
                env.environment,
                env.deployed(),
                env.failed(),
                env.skipped()
            ));
            for result in &env.results {
                match &result.status {
                    NodeStatus::Deployed { .. } => {}
                    NodeStatus::Failed => {
                        let cause = self
                            .errors
                            .for_environment(&env.environment)
                            .and_then(|errors| {
                                errors
                                    .iter()
                                    .find(|e| e.coordinate.as_ref() == Some(&result.coordinate))
                            })
                            .map_or_else(String::new, |e| format!(": {}", e.error));
                        out.push_str(&format!("  FAILED  {}{cause}\n", result.coordinate));
                    }
                    NodeStatus::Skipped { cause } => {
                        out.push_str(&format!("  skipped {} ({cause})\n", result.coordinate));
                    }
                }
            }
        }
        out
    }
}
