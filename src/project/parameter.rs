//! Parameter sum type and reference extraction.
//!
//! Parameters are the values substituted into a configuration's template.
//! `Reference` parameters point at other configurations and give the
//! dependency graph its edges; `Compound` parameters reference sibling
//! parameters by name and are ordered after their ingredients at resolve
//! time.

use super::Coordinate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pointer to a property of another configuration's deploy result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceParameter {
    pub target: Coordinate,
    /// Property of the target's resolved entity, typically `id` or `name`.
    pub property: String,
}

impl ReferenceParameter {
    pub fn new(target: Coordinate, property: impl Into<String>) -> Self {
        Self {
            target,
            property: property.into(),
        }
    }

    /// Shorthand for the common case of referencing the target's id.
    pub fn to_id(target: Coordinate) -> Self {
        Self::new(target, crate::constants::PARAM_ID)
    }
}

/// One parameter of a configuration.
///
/// Two names are reserved: `name` (the human identity used by name-keyed
/// families) and `scope` (the owning parent id for parented resources).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Parameter {
    /// A literal scalar or structured value.
    Value { value: Value },
    /// v1-import compatibility: rendered with newline-only escaping instead
    /// of full JSON string escaping. New configurations use `Value`.
    LegacyValue { value: Value },
    /// Reads a process environment variable at resolve time.
    Environment {
        name: String,
        #[serde(default)]
        default: Option<String>,
    },
    /// Points at another configuration; adds a dependency edge.
    Reference(ReferenceParameter),
    /// A small text template over sibling parameters, rendered after the
    /// siblings it names in `{{.sibling}}` placeholders.
    Compound { format: String },
    /// Composite list; elements resolve independently and join into a JSON
    /// array value.
    List { items: Vec<Parameter> },
}

impl Parameter {
    /// Convenience constructor for a literal string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::Value {
            value: Value::String(value.into()),
        }
    }

    /// Recursively collects every reference parameter in this tree.
    pub fn collect_references<'a>(&'a self, out: &mut Vec<&'a ReferenceParameter>) {
        match self {
            Self::Reference(reference) => out.push(reference),
            Self::List { items } => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Value { .. }
            | Self::LegacyValue { .. }
            | Self::Environment { .. }
            | Self::Compound { .. } => {}
        }
    }

    /// Whether resolving this parameter requires the entity map.
    ///
    /// Validation pre-resolves names using only the side-effect-free kinds;
    /// anything transitively containing a reference is excluded there.
    #[must_use]
    pub fn needs_entities(&self) -> bool {
        match self {
            Self::Reference(_) => true,
            Self::List { items } => items.iter().any(Self::needs_entities),
            Self::Value { .. }
            | Self::LegacyValue { .. }
            | Self::Environment { .. }
            | Self::Compound { .. } => false,
        }
    }
}
