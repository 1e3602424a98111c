//! Parameter resolution: turns a configuration's parameter map into a flat
//! property map against the current entity map.
//!
//! Parameters are ordered by their intra-configuration references (compound
//! parameters name siblings), resolved in that order, and the results
//! collected into [`Properties`]. Reference parameters look up previously
//! deployed entities; a missing target is reported distinctly so the
//! orchestrator can prune instead of fail.

use crate::error::Error;
use crate::project::{Configuration, EntityMap, Parameter, Properties};
use crate::render;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// Resolves every parameter of `config` into a flat property map.
///
/// # Errors
///
/// Fails with a parameter-resolution error on a sibling cycle, a missing
/// environment variable, an unresolved reference, or a broken compound.
pub fn resolve_parameters(
    config: &Configuration,
    entities: &EntityMap,
) -> Result<Properties, Error> {
    let order = parameter_order(config)?;
    let mut properties = Properties::new();

    for name in order {
        let parameter = &config.parameters[name.as_str()];
        let value = resolve_single(config, &name, parameter, entities, &properties)?;
        properties.insert(name, value);
    }

    Ok(properties)
}

/// Pre-resolves the reserved `name` parameter without an entity map.
///
/// Used by validation: only side-effect-free parameter kinds participate.
/// Returns `None` when the name transitively needs a reference or cannot be
/// resolved yet; such configurations are excluded from uniqueness checks.
#[must_use]
pub fn preresolve_name(config: &Configuration) -> Option<String> {
    let parameter = config.parameters.get(crate::constants::PARAM_NAME)?;
    if parameter.needs_entities() {
        return None;
    }

    // Compounds may name siblings; resolve the side-effect-free subset in
    // dependency order and read the name off the result.
    let order = parameter_order(config).ok()?;
    let mut properties = Properties::new();
    for sibling in order {
        let sibling_param = &config.parameters[sibling.as_str()];
        if sibling_param.needs_entities() {
            continue;
        }
        let Ok(value) =
            resolve_single(config, &sibling, sibling_param, &EntityMap::new(), &properties)
        else {
            continue;
        };
        properties.insert(sibling, value);
    }

    properties
        .get(crate::constants::PARAM_NAME)
        .map(render::property_to_string)
}

/// A stable scope key for validation-time uniqueness checks.
///
/// A literal scope resolves to its value; a scope referencing another
/// configuration keys on the referenced coordinate, so two configurations
/// sharing a parent collide exactly when they should. `None` means the
/// configuration has no scope parameter.
#[must_use]
pub fn validation_scope(config: &Configuration) -> Option<String> {
    let parameter = config.parameters.get(crate::constants::PARAM_SCOPE)?;
    match parameter {
        Parameter::Reference(reference) => {
            Some(format!("ref:{}:{}", reference.target, reference.property))
        }
        Parameter::Value { value } | Parameter::LegacyValue { value } => {
            Some(render::property_to_string(value))
        }
        Parameter::Environment { name, default } => std::env::var(name)
            .ok()
            .or_else(|| default.clone())
            .map(|v| format!("env:{v}")),
        Parameter::Compound { .. } | Parameter::List { .. } => None,
    }
}

/// Proves a configuration's parameters free of sibling cycles without
/// resolving anything. Validation runs this before any HTTP traffic.
///
/// # Errors
///
/// Fails with the full cycle chain when one exists.
pub fn check_parameter_cycles(config: &Configuration) -> Result<(), Error> {
    parameter_order(config).map(|_| ())
}

/// Orders parameter names so every compound comes after the siblings it
/// names. Kahn's algorithm; a leftover means a cycle, reported with the
/// full chain.
fn parameter_order(config: &Configuration) -> Result<Vec<String>, Error> {
    let names: Vec<&str> = config.parameters.keys().map(String::as_str).collect();
    let index_of: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    // Edge ingredient -> compound
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
    let mut in_degree = vec![0usize; names.len()];

    for (i, name) in names.iter().enumerate() {
        let ingredients = sibling_ingredients(&config.parameters[*name]);
        for ingredient in ingredients {
            if ingredient == *name {
                // Self-reference: cycle of length one
                let chain = vec![(*name).to_string(), (*name).to_string()];
                return Err(Error::parameter_cycle(&config.coordinate, &chain));
            }
            if let Some(&dep) = index_of.get(ingredient.as_str()) {
                adjacency[dep].push(i);
                in_degree[i] += 1;
            }
            // Unknown ingredients surface later as an invalid compound
        }
    }

    let mut queue: VecDeque<usize> = (0..names.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(names.len());

    while let Some(node) = queue.pop_front() {
        order.push(names[node].to_string());
        for &succ in &adjacency[node] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                queue.push_back(succ);
            }
        }
    }

    if order.len() != names.len() {
        let stuck: Vec<usize> = (0..names.len()).filter(|&i| in_degree[i] > 0).collect();
        let chain = cycle_chain(&names, &adjacency, &stuck);
        return Err(Error::parameter_cycle(&config.coordinate, &chain));
    }

    Ok(order)
}

/// Walks the residual graph from a stuck node until a repeat, producing the
/// explicit cycle `[a, b, ..., a]`.
fn cycle_chain(names: &[&str], adjacency: &[Vec<usize>], stuck: &[usize]) -> Vec<String> {
    let stuck_set: HashSet<usize> = stuck.iter().copied().collect();
    let start = stuck[0];
    let mut chain = vec![start];
    let mut seen: HashSet<usize> = [start].into();
    let mut current = start;

    loop {
        let Some(next) = adjacency[current]
            .iter()
            .copied()
            .find(|succ| stuck_set.contains(succ))
        else {
            break;
        };
        if seen.contains(&next) {
            // Trim the lead-in so the chain starts and ends on the repeat
            let pos = chain.iter().position(|&n| n == next).unwrap_or(0);
            let mut cycle: Vec<String> =
                chain[pos..].iter().map(|&i| names[i].to_string()).collect();
            cycle.push(names[next].to_string());
            return cycle;
        }
        seen.insert(next);
        chain.push(next);
        current = next;
    }

    chain.iter().map(|&i| names[i].to_string()).collect()
}

/// Sibling parameter names a compound's format references.
fn sibling_ingredients(parameter: &Parameter) -> Vec<String> {
    match parameter {
        Parameter::Compound { format } => render::placeholders(format).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn resolve_single(
    config: &Configuration,
    name: &str,
    parameter: &Parameter,
    entities: &EntityMap,
    resolved: &Properties,
) -> Result<Value, Error> {
    match parameter {
        Parameter::Value { value } => Ok(escape_value(value)),
        Parameter::LegacyValue { value } => Ok(escape_value_legacy(value)),
        Parameter::Environment {
            name: variable,
            default,
        } => match std::env::var(variable) {
            Ok(value) => Ok(Value::String(value)),
            Err(_) => default.clone().map(Value::String).ok_or_else(|| {
                Error::missing_env_var(&config.coordinate, name, variable)
            }),
        },
        Parameter::Reference(reference) => {
            let entity = entities.get(&reference.target).ok_or_else(|| {
                Error::unresolved_reference(&config.coordinate, name, &reference.target)
            })?;
            entity.properties.get(&reference.property).cloned().ok_or_else(|| {
                Error::missing_reference_property(
                    &config.coordinate,
                    name,
                    &reference.target,
                    &reference.property,
                )
            })
        }
        Parameter::Compound { format } => {
            let rendered = render::render(
                &config.coordinate,
                format,
                resolved,
                &HashSet::new(),
            )
            .map_err(|e| {
                Error::invalid_compound(&config.coordinate, name, &e.to_string())
            })?;
            Ok(Value::String(rendered))
        }
        Parameter::List { items } => {
            let values = items
                .iter()
                .map(|item| resolve_single(config, name, item, entities, resolved))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(values))
        }
    }
}

/// String values are JSON-escaped at resolve time so templates can embed
/// them inside quoted JSON; structured values pass through untouched.
fn escape_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_json_string(s)),
        other => other.clone(),
    }
}

/// v1-import compatibility: only newlines are escaped.
fn escape_value_legacy(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace('\n', "\\n")),
        other => other.clone(),
    }
}

fn escape_json_string(s: &str) -> String {
    let quoted = serde_json::to_string(s).expect("serializing a str to JSON should never fail");
    quoted[1..quoted.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{ConfigKind, Coordinate, ReferenceParameter, ResolvedEntity};
    use indexmap::IndexMap;
    use serde_json::json;

    fn config_with(parameters: IndexMap<String, Parameter>) -> Configuration {
        Configuration {
            coordinate: Coordinate::new("proj", "alerting-profile", "cfg"),
            kind: ConfigKind::ClassicApi {
                api: "alerting-profile".into(),
            },
            template: "{}".into(),
            parameters,
            origin_object_id: None,
            environment: None,
            skip: false,
        }
    }

    fn entity(coord: &Coordinate, id: &str, name: &str) -> ResolvedEntity {
        let mut properties = Properties::new();
        properties.insert("id".into(), json!(id));
        properties.insert("name".into(), json!(name));
        ResolvedEntity {
            coordinate: coord.clone(),
            name: name.into(),
            properties,
        }
    }

    #[test]
    fn resolves_literal_values() {
        let mut params = IndexMap::new();
        params.insert("name".to_string(), Parameter::string("Profile-A"));
        params.insert(
            "threshold".to_string(),
            Parameter::Value { value: json!(42) },
        );
        let props = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap();
        assert_eq!(props["name"], json!("Profile-A"));
        assert_eq!(props["threshold"], json!(42));
    }

    #[test]
    fn value_strings_are_json_escaped() {
        let mut params = IndexMap::new();
        params.insert(
            "name".to_string(),
            Parameter::string("line\nbreak \"quoted\""),
        );
        let props = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap();
        assert_eq!(props["name"], json!("line\\nbreak \\\"quoted\\\""));
    }

    #[test]
    fn legacy_values_escape_newlines_only() {
        let mut params = IndexMap::new();
        params.insert(
            "desc".to_string(),
            Parameter::LegacyValue {
                value: json!("line\nbreak \"quoted\""),
            },
        );
        let props = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap();
        assert_eq!(props["desc"], json!("line\\nbreak \"quoted\""));
    }

    #[test]
    fn env_parameter_reads_variable() {
        std::env::set_var("CASCADE_TEST_RESOLVE_VAR", "from-env");
        let mut params = IndexMap::new();
        params.insert(
            "owner".to_string(),
            Parameter::Environment {
                name: "CASCADE_TEST_RESOLVE_VAR".into(),
                default: None,
            },
        );
        let props = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap();
        assert_eq!(props["owner"], json!("from-env"));
        std::env::remove_var("CASCADE_TEST_RESOLVE_VAR");
    }

    #[test]
    fn env_parameter_missing_without_default_fails() {
        let mut params = IndexMap::new();
        params.insert(
            "owner".to_string(),
            Parameter::Environment {
                name: "CASCADE_TEST_DEFINITELY_UNSET".into(),
                default: None,
            },
        );
        let err = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap_err();
        assert!(err.to_string().contains("CASCADE_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn env_parameter_falls_back_to_default() {
        let mut params = IndexMap::new();
        params.insert(
            "owner".to_string(),
            Parameter::Environment {
                name: "CASCADE_TEST_DEFINITELY_UNSET_2".into(),
                default: Some("fallback".into()),
            },
        );
        let props = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap();
        assert_eq!(props["owner"], json!("fallback"));
    }

    #[test]
    fn reference_resolves_against_entity_map() {
        let target = Coordinate::new("proj", "management-zone", "zone");
        let mut entities = EntityMap::new();
        entities.insert(entity(&target, "MZ-1234", "Zone"));

        let mut params = IndexMap::new();
        params.insert(
            "zoneId".to_string(),
            Parameter::Reference(ReferenceParameter::to_id(target)),
        );
        let props = resolve_parameters(&config_with(params), &entities).unwrap();
        assert_eq!(props["zoneId"], json!("MZ-1234"));
    }

    #[test]
    fn reference_to_undeployed_target_is_unresolved() {
        let target = Coordinate::new("proj", "management-zone", "zone");
        let mut params = IndexMap::new();
        params.insert(
            "zoneId".to_string(),
            Parameter::Reference(ReferenceParameter::to_id(target)),
        );
        let err = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn compound_resolves_after_its_ingredients() {
        let mut params = IndexMap::new();
        // Declared before its ingredient on purpose
        params.insert(
            "greeting".to_string(),
            Parameter::Compound {
                format: "Hello {{.who}}".into(),
            },
        );
        params.insert("who".to_string(), Parameter::string("world"));
        let props = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap();
        assert_eq!(props["greeting"], json!("Hello world"));
    }

    #[test]
    fn compound_with_unknown_ingredient_is_invalid() {
        let mut params = IndexMap::new();
        params.insert(
            "greeting".to_string(),
            Parameter::Compound {
                format: "Hello {{.nobody}}".into(),
            },
        );
        let err = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap_err();
        assert!(err.to_string().contains("greeting"), "got: {err}");
    }

    #[test]
    fn self_referencing_compound_reports_length_one_cycle() {
        let mut params = IndexMap::new();
        params.insert(
            "a".to_string(),
            Parameter::Compound {
                format: "{{.a}}".into(),
            },
        );
        let err = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap_err();
        assert!(err.to_string().contains("a -> a"), "got: {err}");
    }

    #[test]
    fn two_compounds_referencing_each_other_report_the_pair() {
        let mut params = IndexMap::new();
        params.insert(
            "a".to_string(),
            Parameter::Compound {
                format: "{{.b}}".into(),
            },
        );
        params.insert(
            "b".to_string(),
            Parameter::Compound {
                format: "{{.a}}".into(),
            },
        );
        let err = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap_err();
        let msg = err.to_string();
        assert!(
            msg.contains("a -> b -> a") || msg.contains("b -> a -> b"),
            "got: {msg}"
        );
    }

    #[test]
    fn long_compound_cycle_lists_every_member() {
        let mut params = IndexMap::new();
        for (name, ingredient) in [("a", "b"), ("b", "c"), ("c", "d"), ("d", "a")] {
            params.insert(
                name.to_string(),
                Parameter::Compound {
                    format: format!("{{{{.{ingredient}}}}}"),
                },
            );
        }
        let err = resolve_parameters(&config_with(params), &EntityMap::new()).unwrap_err();
        let msg = err.to_string();
        for name in ["a", "b", "c", "d"] {
            assert!(msg.contains(name), "cycle missing '{name}': {msg}");
        }
    }

    #[test]
    fn list_resolves_to_json_array() {
        let target = Coordinate::new("proj", "management-zone", "zone");
        let mut entities = EntityMap::new();
        entities.insert(entity(&target, "MZ-1", "Zone"));

        let mut params = IndexMap::new();
        params.insert(
            "zones".to_string(),
            Parameter::List {
                items: vec![
                    Parameter::string("literal"),
                    Parameter::Reference(ReferenceParameter::to_id(target)),
                ],
            },
        );
        let props = resolve_parameters(&config_with(params), &entities).unwrap();
        assert_eq!(props["zones"], json!(["literal", "MZ-1"]));
    }

    #[test]
    fn preresolve_name_handles_literals_and_compounds() {
        let mut params = IndexMap::new();
        params.insert(
            "name".to_string(),
            Parameter::Compound {
                format: "{{.prefix}}-profile".into(),
            },
        );
        params.insert("prefix".to_string(), Parameter::string("prod"));
        assert_eq!(
            preresolve_name(&config_with(params)),
            Some("prod-profile".into())
        );
    }

    #[test]
    fn preresolve_name_excludes_reference_names() {
        let mut params = IndexMap::new();
        params.insert(
            "name".to_string(),
            Parameter::Reference(ReferenceParameter::new(
                Coordinate::new("p", "t", "other"),
                "name",
            )),
        );
        assert_eq!(preresolve_name(&config_with(params)), None);
    }

    #[test]
    fn validation_scope_keys_reference_scopes_by_coordinate() {
        let parent = Coordinate::new("proj", "application-mobile", "app");
        let mut params = IndexMap::new();
        params.insert(
            "scope".to_string(),
            Parameter::Reference(ReferenceParameter::to_id(parent)),
        );
        let scope = validation_scope(&config_with(params)).unwrap();
        assert_eq!(scope, "ref:proj:application-mobile:app:id");
    }
}
