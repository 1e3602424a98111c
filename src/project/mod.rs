//! Core data model for loaded projects.
//!
//! A project is a collection of configurations, each identified by a
//! [`Coordinate`] and carrying a template plus a parameter map. The engine
//! consumes this model fully materialized; file-system traversal and YAML
//! parsing happen in external loaders.

pub mod parameter;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub use parameter::{Parameter, ReferenceParameter};

/// Stable identity of a configuration: `(project, type, configId)`.
///
/// Coordinates are unique across a run; loaders reject duplicates before the
/// engine ever sees them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub project: String,
    #[serde(rename = "type")]
    pub config_type: String,
    #[serde(rename = "configId")]
    pub config_id: String,
}

impl Coordinate {
    pub fn new(
        project: impl Into<String>,
        config_type: impl Into<String>,
        config_id: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            config_type: config_type.into(),
            config_id: config_id.into(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.project, self.config_type, self.config_id
        )
    }
}

/// Automation resource families on the platform API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationResource {
    Workflow,
    BusinessCalendar,
    SchedulingRule,
}

impl AutomationResource {
    /// Base URL path for this resource family.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Workflow => "/platform/automation/v1/workflows",
            Self::BusinessCalendar => "/platform/automation/v1/business-calendars",
            Self::SchedulingRule => "/platform/automation/v1/scheduling-rules",
        }
    }
}

/// Document kinds on the platform document API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Dashboard,
    Notebook,
    Launchpad,
}

impl DocumentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Notebook => "notebook",
            Self::Launchpad => "launchpad",
        }
    }
}

/// The closed set of configuration families the engine can reconcile.
///
/// The deploy orchestrator matches on this tag to pick the resource client,
/// so adding a family is a compile-time-checked change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "kebab-case")]
pub enum ConfigKind {
    /// Name-keyed REST resources on the classic v1 config API. The string is
    /// the family id into the static API catalog.
    ClassicApi { api: String },
    /// Schema-driven, id-keyed objects on the v2 settings API.
    Settings {
        #[serde(rename = "schemaId")]
        schema_id: String,
        #[serde(rename = "schemaVersion", default)]
        schema_version: Option<String>,
    },
    /// Grail storage buckets (eventually consistent, name-idempotent).
    Bucket,
    Automation { resource: AutomationResource },
    Document { kind: DocumentKind },
    OpenPipeline { kind: String },
    Segment,
    Slo,
}

/// A single loaded configuration: coordinate, family tag, template body,
/// parameters, and deploy modifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub coordinate: Coordinate,
    pub kind: ConfigKind,
    /// Template body with `{{.name}}` placeholders.
    pub template: String,
    /// Parameter map in declaration order; order is user-visible in errors.
    pub parameters: IndexMap<String, Parameter>,
    /// Stable remote id from a prior import, if any.
    #[serde(rename = "originObjectId", default)]
    pub origin_object_id: Option<String>,
    /// Restricts this configuration to a single environment when set.
    #[serde(default)]
    pub environment: Option<String>,
    /// Deliberately not deployed; descendants are pruned too.
    #[serde(default)]
    pub skip: bool,
}

impl Configuration {
    /// All reference parameters of this configuration, including nested ones
    /// and the reserved `scope` parameter when it is a reference.
    #[must_use]
    pub fn references(&self) -> Vec<&ReferenceParameter> {
        let mut out = Vec::new();
        for parameter in self.parameters.values() {
            parameter.collect_references(&mut out);
        }
        out
    }

    /// Whether this configuration is assigned to the given environment.
    #[must_use]
    pub fn targets_environment(&self, environment: &str) -> bool {
        self.environment
            .as_deref()
            .is_none_or(|bound| bound == environment)
    }
}

/// Flat property map produced by parameter resolution, keyed by parameter
/// name. Values keep their JSON shape until rendering stringifies them.
pub type Properties = IndexMap<String, Value>;

/// The deploy result for one configuration. `properties` always contains
/// `id` and `name` once the remote call has returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub coordinate: Coordinate,
    pub name: String,
    pub properties: Properties,
}

impl ResolvedEntity {
    /// The remote-assigned id, if the entity carries one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.properties
            .get(crate::constants::PARAM_ID)
            .and_then(Value::as_str)
    }
}

/// Per-environment-deploy map from coordinate to deploy result.
///
/// Written once per node by the orchestrator, read by every downstream
/// parameter resolution. The orchestrator wraps it in a mutex; the type
/// itself is a plain map.
#[derive(Debug, Default)]
pub struct EntityMap {
    entries: HashMap<Coordinate, ResolvedEntity>,
}

impl EntityMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: ResolvedEntity) {
        self.entries.insert(entity.coordinate.clone(), entity);
    }

    #[must_use]
    pub fn get(&self, coordinate: &Coordinate) -> Option<&ResolvedEntity> {
        self.entries.get(coordinate)
    }

    #[must_use]
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.entries.contains_key(coordinate)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fully loaded project: a named collection of configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub configurations: Vec<Configuration>,
}

impl Project {
    /// Configurations assigned to the given environment.
    #[must_use]
    pub fn configurations_for(&self, environment: &str) -> Vec<&Configuration> {
        self.configurations
            .iter()
            .filter(|c| c.targets_environment(environment))
            .collect()
    }
}
