//! Client for classic (v1) name-keyed configuration APIs.
//!
//! Upsert semantics depend on the catalog flags: unique-name families match
//! by listing and comparing names; non-unique-name families address objects
//! by a stable id derived from the coordinate; single-configuration
//! families PUT one well-known URL.

use super::{dryrun, RemoteEntity};
use crate::api::ApiSpec;
use crate::error::Error;
use crate::http::RestClient;
use crate::project::Coordinate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fixed namespace for deriving stable object ids from coordinates.
const OBJECT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x61c6_62f7_79f2_4bea_9baf_a20a_06f6_5361);

/// Platform entity ids look like `MOBILE_APPLICATION-1234ABCD5678EF90`.
static PLATFORM_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z][A-Z0-9_]*-[0-9A-F]{16}$").expect("platform id pattern is valid")
});

/// The id a non-unique-name configuration deploys under: the literal
/// `configId` when it already is a UUID or platform entity id, otherwise a
/// v3 UUID over the fixed namespace.
#[must_use]
pub fn stable_object_id(project: &str, config_id: &str) -> String {
    if PLATFORM_ID.is_match(config_id) || Uuid::parse_str(config_id).is_ok() {
        return config_id.to_string();
    }
    Uuid::new_v3(
        &OBJECT_ID_NAMESPACE,
        format!("{project}-{config_id}").as_bytes(),
    )
    .to_string()
}

pub enum ClassicClient {
    Live { rest: Arc<RestClient> },
    Dry,
}

impl ClassicClient {
    /// Lists all remote entities of a family as `(id, name, raw)` triples.
    ///
    /// # Errors
    ///
    /// Propagates transport errors.
    pub async fn list(&self, spec: &ApiSpec) -> Result<Vec<Value>, Error> {
        match self {
            Self::Live { rest } => rest.get_paginated(&spec.url_path, spec.list_property).await,
            Self::Dry => Ok(Vec::new()),
        }
    }

    /// Fetches one entity by id, applying the family's response tweak.
    ///
    /// # Errors
    ///
    /// Propagates transport and response errors.
    pub async fn get(&self, spec: &ApiSpec, id: &str) -> Result<Value, Error> {
        match self {
            Self::Live { rest } => {
                let path = id_path(spec, id);
                let response = rest.get(&path).await?;
                let payload = response.json()?;
                Ok(match spec.tweak_response {
                    Some(tweak) => tweak(payload),
                    None => payload,
                })
            }
            Self::Dry => Ok(Value::Null),
        }
    }

    /// Creates or updates one configuration according to the family's
    /// identity semantics.
    ///
    /// # Errors
    ///
    /// Fails on ambiguous name matches, transport errors, and responses
    /// that carry no usable id.
    pub async fn upsert(
        &self,
        coordinate: &Coordinate,
        spec: &ApiSpec,
        name: &str,
        payload: &Value,
        origin_object_id: Option<&str>,
        allow_duplicate_names: bool,
    ) -> Result<RemoteEntity, Error> {
        if let Some(replacement) = spec.deprecated_by {
            warn!(family = spec.id, replacement, "deploying a deprecated configuration family");
        }

        let Self::Live { rest } = self else {
            return Ok(dryrun::synthesized_entity(coordinate, name));
        };

        if spec.single_configuration {
            rest.put_json(&spec.url_path, payload).await?;
            return Ok(RemoteEntity {
                id: spec.id.to_string(),
                name: name.to_string(),
            });
        }

        if spec.non_unique_name {
            return self
                .upsert_non_unique(coordinate, spec, name, payload, origin_object_id, allow_duplicate_names)
                .await;
        }

        self.upsert_by_name(coordinate, spec, name, payload).await
    }

    /// Unique-name flow: list, match by exact name, POST or PUT.
    async fn upsert_by_name(
        &self,
        coordinate: &Coordinate,
        spec: &ApiSpec,
        name: &str,
        payload: &Value,
    ) -> Result<RemoteEntity, Error> {
        let Self::Live { rest } = self else {
            return Ok(dryrun::synthesized_entity(coordinate, name));
        };

        let existing = self.list(spec).await?;
        let matches: Vec<&Value> = existing
            .iter()
            .filter(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
            .collect();

        match matches.as_slice() {
            [] => {
                debug!(family = spec.id, name, "no remote match, creating");
                let response = rest.post_json(&spec.url_path, payload).await?;
                let id = created_id(&response.body)
                    .ok_or_else(|| Error::client_error(coordinate, "create response carried no id"))?;
                Ok(RemoteEntity {
                    id,
                    name: name.to_string(),
                })
            }
            [single] => {
                let id = entry_id(single).ok_or_else(|| {
                    Error::client_error(coordinate, "remote list entry carried no id")
                })?;
                debug!(family = spec.id, name, %id, "matched existing entity, updating");
                rest.put_json(&id_path(spec, &id), payload).await?;
                Ok(RemoteEntity {
                    id,
                    name: name.to_string(),
                })
            }
            many => Err(Error::ambiguous_name_match(coordinate, name, many.len())),
        }
    }

    /// Non-unique-name flow: address by a stable explicit id, preferring a
    /// uniquely name-matched existing entity when duplicates are forbidden.
    async fn upsert_non_unique(
        &self,
        coordinate: &Coordinate,
        spec: &ApiSpec,
        name: &str,
        payload: &Value,
        origin_object_id: Option<&str>,
        allow_duplicate_names: bool,
    ) -> Result<RemoteEntity, Error> {
        let Self::Live { rest } = self else {
            return Ok(dryrun::synthesized_entity(coordinate, name));
        };

        let generated_id = origin_object_id.map_or_else(
            || stable_object_id(&coordinate.project, &coordinate.config_id),
            str::to_string,
        );

        let id = if allow_duplicate_names {
            generated_id
        } else {
            let existing = self.list(spec).await?;
            let mut matches: Vec<&Value> = existing
                .iter()
                .filter(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
                .collect();
            if let Some(equal) = spec.check_equal {
                matches.retain(|entry| equal(entry, payload));
            }
            match matches.as_slice() {
                [single] => entry_id(single).unwrap_or(generated_id),
                [] => generated_id,
                many => {
                    return Err(Error::ambiguous_name_match(coordinate, name, many.len()));
                }
            }
        };

        rest.put_json(&id_path(spec, &id), payload).await?;
        Ok(RemoteEntity {
            id,
            name: name.to_string(),
        })
    }

    /// Deletes one entity by name, honoring the family's delete semantics.
    ///
    /// # Errors
    ///
    /// Fails for non-deletable families, ambiguous matches, and transport
    /// errors. A name with no remote match is not an error.
    pub async fn delete_by_name(
        &self,
        coordinate: &Coordinate,
        spec: &ApiSpec,
        name: &str,
    ) -> Result<(), Error> {
        if spec.non_deletable {
            return Err(Error::client_error(
                coordinate,
                format!("family '{}' does not support deletion", spec.id),
            ));
        }

        let Self::Live { rest } = self else {
            return Ok(());
        };

        let existing = self.list(spec).await?;
        let matches: Vec<&Value> = existing
            .iter()
            .filter(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
            .collect();

        match matches.as_slice() {
            [] => {
                debug!(family = spec.id, name, "nothing to delete");
                Ok(())
            }
            [single] => {
                let id = entry_id(single).ok_or_else(|| {
                    Error::client_error(coordinate, "remote list entry carried no id")
                })?;
                rest.delete(&id_path(spec, &id)).await?;
                Ok(())
            }
            many => Err(Error::ambiguous_name_match(coordinate, name, many.len())),
        }
    }
}

fn id_path(spec: &ApiSpec, id: &str) -> String {
    format!("{}/{}", spec.url_path, urlencoding::encode(id))
}

fn entry_id(entry: &Value) -> Option<String> {
    entry.get("id").and_then(Value::as_str).map(str::to_string)
}

/// Pulls the id out of a create response body.
fn created_id(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed.get("id").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_passes_through_uuids() {
        let id = "f7f32f43-4a2b-4ab0-a8b5-3a2c2dfc0f73";
        assert_eq!(stable_object_id("proj", id), id);
    }

    #[test]
    fn stable_id_passes_through_platform_ids() {
        let id = "MOBILE_APPLICATION-1234ABCD5678EF90";
        assert_eq!(stable_object_id("proj", id), id);
    }

    #[test]
    fn stable_id_hashes_plain_config_ids() {
        let id = stable_object_id("proj", "my-dashboard");
        assert!(Uuid::parse_str(&id).is_ok());
        // Pure function of (project, configId)
        assert_eq!(id, stable_object_id("proj", "my-dashboard"));
        assert_ne!(id, stable_object_id("other", "my-dashboard"));
        assert_ne!(id, stable_object_id("proj", "other-dashboard"));
    }

    #[test]
    fn platform_id_pattern_rejects_lowercase_and_short_hashes() {
        assert!(!PLATFORM_ID.is_match("mobile_application-1234ABCD5678EF90"));
        assert!(!PLATFORM_ID.is_match("APP-1234"));
        assert!(PLATFORM_ID.is_match("SYNTHETIC_TEST-0000000000000001"));
    }

    #[test]
    fn created_id_reads_the_id_property() {
        assert_eq!(created_id(r#"{"id":"abc","name":"n"}"#), Some("abc".into()));
        assert_eq!(created_id(r#"{"name":"n"}"#), None);
        assert_eq!(created_id("not json"), None);
    }
}
