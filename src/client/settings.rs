//! Client for schema-driven settings objects (v2 API).
//!
//! Settings objects are id-keyed; the engine derives a deterministic
//! external id from the schema and config id so re-runs address the same
//! remote object without any local state.

use super::{dryrun, RemoteEntity};
use crate::constants;
use crate::error::Error;
use crate::http::retry;
use crate::http::RestClient;
use crate::project::Coordinate;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Derives the stable external id for a settings object.
///
/// `externalId = "monaco:" + base64url_nopad(sha256(schemaId + "$" + configId)[0..24])`
///
/// This is a pure function of its inputs; two runs of the same project
/// produce byte-identical external ids.
#[must_use]
pub fn external_id(schema_id: &str, config_id: &str) -> String {
    let digest = Sha256::digest(format!("{schema_id}${config_id}"));
    format!(
        "{}{}",
        constants::EXTERNAL_ID_PREFIX,
        URL_SAFE_NO_PAD.encode(&digest[..24])
    )
}

pub enum SettingsClient {
    Live { rest: Arc<RestClient> },
    Dry,
}

impl SettingsClient {
    /// Creates or updates one settings object.
    ///
    /// With an `originObjectId` the object is updated in place; otherwise
    /// the object is posted with its external id, which the remote end uses
    /// to upsert. Concurrent upserts of the same external id surface as
    /// 409; those are retried with backoff.
    ///
    /// # Errors
    ///
    /// Propagates transport errors; fails when the response carries no
    /// object id or 409 retries are exhausted.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        coordinate: &Coordinate,
        schema_id: &str,
        schema_version: Option<&str>,
        scope: &str,
        name: &str,
        origin_object_id: Option<&str>,
        payload: &Value,
    ) -> Result<RemoteEntity, Error> {
        let Self::Live { rest } = self else {
            return Ok(dryrun::synthesized_entity(coordinate, name));
        };

        if let Some(object_id) = origin_object_id {
            let mut body = json!({ "value": payload });
            if let Some(version) = schema_version {
                body["schemaVersion"] = json!(version);
            }
            let path = format!(
                "{}/{}",
                constants::PATH_SETTINGS_OBJECTS,
                urlencoding::encode(object_id)
            );
            rest.put_json(&path, &body).await?;
            return Ok(RemoteEntity {
                id: object_id.to_string(),
                name: name.to_string(),
            });
        }

        let external = external_id(schema_id, &coordinate.config_id);
        let mut record = json!({
            "externalId": external,
            "scope": scope,
            "schemaId": schema_id,
            "value": payload,
        });
        if let Some(version) = schema_version {
            record["schemaVersion"] = json!(version);
        }
        let body = Value::Array(vec![record]);

        let max_attempts = rest.retry_config().max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match rest.post_json(constants::PATH_SETTINGS_OBJECTS, &body).await {
                Ok(response) => {
                    let id = first_object_id(&response.body).ok_or_else(|| {
                        Error::client_error(coordinate, "settings response carried no objectId")
                    })?;
                    return Ok(RemoteEntity {
                        id,
                        name: name.to_string(),
                    });
                }
                Err(error) if error.status() == Some(409) && attempt + 1 < max_attempts => {
                    debug!(%coordinate, attempt, "settings upsert conflict, retrying");
                    let delay = retry::backoff_delay(rest.retry_config(), attempt);
                    rest.sleep_cancellable(delay).await?;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Fetches one settings object by id.
    ///
    /// # Errors
    ///
    /// Propagates transport and response errors.
    pub async fn get(&self, object_id: &str) -> Result<Value, Error> {
        match self {
            Self::Live { rest } => {
                let path = format!(
                    "{}/{}",
                    constants::PATH_SETTINGS_OBJECTS,
                    urlencoding::encode(object_id)
                );
                rest.get(&path).await?.json()
            }
            Self::Dry => Ok(Value::Null),
        }
    }

    /// Deletes one settings object by id. A 404 is not an error.
    ///
    /// # Errors
    ///
    /// Propagates transport errors other than not-found.
    pub async fn delete(&self, object_id: &str) -> Result<(), Error> {
        let Self::Live { rest } = self else {
            return Ok(());
        };
        let path = format!(
            "{}/{}",
            constants::PATH_SETTINGS_OBJECTS,
            urlencoding::encode(object_id)
        );
        match rest.delete(&path).await {
            Ok(_) => Ok(()),
            Err(error) if error.status() == Some(404) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

/// Reads `[{"objectId": "..."}]` out of an upsert response.
fn first_object_id(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .as_array()?
        .first()?
        .get("objectId")
        .and_then(Value::as_str)
        .map(str::to_string)
}
