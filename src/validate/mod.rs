//! Pre-flight validation: purely local invariants checked before any HTTP
//! traffic.
//!
//! Three families of checks run per environment: parameter-cycle freedom
//! per configuration, cross-configuration dependency-cycle freedom, and
//! `(name, scope)` uniqueness for unique-name classic families. Name
//! resolution here runs only the side-effect-free parameter kinds; a name
//! that transitively needs a reference is "not yet known" and excluded.

use crate::api;
use crate::error::Error;
use crate::graph::EnvironmentGraph;
use crate::project::{ConfigKind, Configuration, Coordinate};
use crate::resolve;
use std::collections::HashMap;

/// Validates the configurations of one environment.
///
/// Returns every violation rather than stopping at the first; an empty
/// result means the environment may deploy.
#[must_use]
pub fn validate_environment(environment: &str, configurations: &[Configuration]) -> Vec<Error> {
    let mut errors = Vec::new();

    for config in configurations {
        if let Err(error) = resolve::check_parameter_cycles(config) {
            errors.push(error);
        }
        if let ConfigKind::ClassicApi { api } = &config.kind {
            if api::lookup(api).is_none() {
                errors.push(Error::validation(format!(
                    "{}: unknown classic API family '{api}'",
                    config.coordinate
                )));
            }
        }
    }

    if let Err(error) = EnvironmentGraph::build(environment, configurations.to_vec()) {
        errors.push(error);
    }

    errors.extend(check_name_uniqueness(environment, configurations));
    errors
}

/// No two configurations of a unique-name classic family may resolve to
/// the same `(name, scope)` pair within one environment.
fn check_name_uniqueness(environment: &str, configurations: &[Configuration]) -> Vec<Error> {
    let mut errors = Vec::new();
    let mut seen: HashMap<(String, String, String), &Coordinate> = HashMap::new();

    for config in configurations {
        let ConfigKind::ClassicApi { api } = &config.kind else {
            continue;
        };
        let Some(spec) = api::lookup(api) else {
            continue; // already reported as unknown
        };
        if spec.non_unique_name || spec.single_configuration {
            continue;
        }
        let Some(name) = resolve::preresolve_name(config) else {
            continue; // name not yet known
        };
        let scope = resolve::validation_scope(config).unwrap_or_default();

        let key = (api.clone(), name.clone(), scope);
        match seen.get(&key) {
            Some(first) => {
                errors.push(Error::duplicate_name(
                    environment,
                    api,
                    &name,
                    first,
                    &config.coordinate,
                ));
            }
            None => {
                seen.insert(key, &config.coordinate);
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Parameter, ReferenceParameter};
    use indexmap::IndexMap;

    fn classic_config(api: &str, id: &str, name: Option<&str>) -> Configuration {
        let mut parameters = IndexMap::new();
        if let Some(name) = name {
            parameters.insert("name".to_string(), Parameter::string(name));
        }
        Configuration {
            coordinate: Coordinate::new("proj", api, id),
            kind: ConfigKind::ClassicApi { api: api.into() },
            template: "{}".into(),
            parameters,
            origin_object_id: None,
            environment: None,
            skip: false,
        }
    }

    #[test]
    fn distinct_names_pass() {
        let configs = vec![
            classic_config("alerting-profile", "a", Some("First")),
            classic_config("alerting-profile", "b", Some("Second")),
        ];
        assert!(validate_environment("dev", &configs).is_empty());
    }

    #[test]
    fn duplicate_names_in_same_family_fail() {
        let configs = vec![
            classic_config("alerting-profile", "a", Some("Same")),
            classic_config("alerting-profile", "b", Some("Same")),
        ];
        let errors = validate_environment("dev", &configs);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("Same"));
    }

    #[test]
    fn same_name_across_families_passes() {
        let configs = vec![
            classic_config("alerting-profile", "a", Some("Shared")),
            classic_config("management-zone", "b", Some("Shared")),
        ];
        assert!(validate_environment("dev", &configs).is_empty());
    }

    #[test]
    fn same_name_under_different_scopes_passes() {
        let parent_a = Coordinate::new("proj", "application-mobile", "app-a");
        let parent_b = Coordinate::new("proj", "application-mobile", "app-b");
        let mut first = classic_config("key-user-actions-mobile", "a", Some("Login"));
        first.parameters.insert(
            "scope".to_string(),
            Parameter::Reference(ReferenceParameter::to_id(parent_a)),
        );
        let mut second = classic_config("key-user-actions-mobile", "b", Some("Login"));
        second.parameters.insert(
            "scope".to_string(),
            Parameter::Reference(ReferenceParameter::to_id(parent_b)),
        );
        assert!(validate_environment("dev", &[first, second]).is_empty());
    }

    #[test]
    fn same_name_under_same_scope_fails() {
        let parent = Coordinate::new("proj", "application-mobile", "app");
        let mut first = classic_config("key-user-actions-mobile", "a", Some("Login"));
        first.parameters.insert(
            "scope".to_string(),
            Parameter::Reference(ReferenceParameter::to_id(parent.clone())),
        );
        let mut second = classic_config("key-user-actions-mobile", "b", Some("Login"));
        second.parameters.insert(
            "scope".to_string(),
            Parameter::Reference(ReferenceParameter::to_id(parent)),
        );
        let errors = validate_environment("dev", &[first, second]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn non_unique_name_families_allow_duplicates() {
        let configs = vec![
            classic_config("dashboard", "a", Some("Overview")),
            classic_config("dashboard", "b", Some("Overview")),
        ];
        assert!(validate_environment("dev", &configs).is_empty());
    }

    #[test]
    fn reference_names_are_excluded_from_uniqueness() {
        let target = Coordinate::new("proj", "alerting-profile", "other");
        let mut config = classic_config("alerting-profile", "a", None);
        config.parameters.insert(
            "name".to_string(),
            Parameter::Reference(ReferenceParameter::new(target, "name")),
        );
        let twin = classic_config("alerting-profile", "other", Some("Other"));
        assert!(validate_environment("dev", &[config, twin]).is_empty());
    }

    #[test]
    fn unknown_family_is_reported() {
        let configs = vec![classic_config("made-up-family", "a", Some("X"))];
        let errors = validate_environment("dev", &configs);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("made-up-family")));
    }

    #[test]
    fn reference_cycle_is_reported_before_any_deploy() {
        let a = Coordinate::new("proj", "alerting-profile", "a");
        let b = Coordinate::new("proj", "alerting-profile", "b");
        let mut first = classic_config("alerting-profile", "a", Some("A"));
        first.parameters.insert(
            "other".to_string(),
            Parameter::Reference(ReferenceParameter::to_id(b.clone())),
        );
        let mut second = classic_config("alerting-profile", "b", Some("B"));
        second.parameters.insert(
            "other".to_string(),
            Parameter::Reference(ReferenceParameter::to_id(a)),
        );
        let errors = validate_environment("dev", &[first, second]);
        assert!(errors.iter().any(|e| e.to_string().contains("cycle")));
    }

    #[test]
    fn parameter_cycles_are_reported() {
        let mut config = classic_config("alerting-profile", "a", Some("A"));
        config.parameters.insert(
            "x".to_string(),
            Parameter::Compound {
                format: "{{.y}}".into(),
            },
        );
        config.parameters.insert(
            "y".to_string(),
            Parameter::Compound {
                format: "{{.x}}".into(),
            },
        );
        let errors = validate_environment("dev", &[config]);
        assert!(errors.iter().any(|e| e.to_string().contains("parameter cycle")));
    }
}
