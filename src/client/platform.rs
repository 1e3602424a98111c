//! Client for platform (v2) resource APIs: automation, document,
//! openpipeline, segment, and SLO families.
//!
//! These families share one shape: server-assigned UUID identities, POST to
//! create, PUT by id to update. Openpipeline is the exception: a fixed set
//! of singleton configurations addressed by kind.

use super::{dryrun, RemoteEntity};
use crate::error::Error;
use crate::http::RestClient;
use crate::project::Coordinate;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const DOCUMENTS_PATH: &str = "/platform/document/v1/documents";
pub const SEGMENTS_PATH: &str = "/platform/storage/filter-segments/v1/filter-segments";
pub const SLO_PATH: &str = "/platform/slo/v1/slos";
pub const OPENPIPELINE_PATH: &str = "/platform/openpipeline/v1/configurations";

pub enum PlatformClient {
    Live { rest: Arc<RestClient> },
    Dry,
}

impl PlatformClient {
    /// Creates or updates one platform resource under `base_path`.
    ///
    /// With an `originObjectId` the resource is updated in place; a 404 on
    /// that update falls back to creation (the imported object was deleted
    /// remotely).
    ///
    /// # Errors
    ///
    /// Propagates transport errors; fails when a create response carries no
    /// id.
    pub async fn upsert(
        &self,
        coordinate: &Coordinate,
        base_path: &str,
        name: &str,
        origin_object_id: Option<&str>,
        payload: &Value,
    ) -> Result<RemoteEntity, Error> {
        let Self::Live { rest } = self else {
            return Ok(dryrun::synthesized_entity(coordinate, name));
        };

        if let Some(object_id) = origin_object_id {
            let path = format!("{base_path}/{}", urlencoding::encode(object_id));
            match rest.put_json(&path, payload).await {
                Ok(_) => {
                    return Ok(RemoteEntity {
                        id: object_id.to_string(),
                        name: name.to_string(),
                    })
                }
                Err(error) if error.status() == Some(404) => {
                    debug!(%coordinate, object_id, "imported object gone, creating a new one");
                }
                Err(error) => return Err(error),
            }
        }

        let response = rest.post_json(base_path, payload).await?;
        let id = created_id(&response.body).ok_or_else(|| {
            Error::client_error(coordinate, "create response carried no id")
        })?;
        Ok(RemoteEntity {
            id,
            name: name.to_string(),
        })
    }

    /// Updates a singleton resource at a fixed path (openpipeline kinds).
    ///
    /// # Errors
    ///
    /// Propagates transport errors.
    pub async fn put_singleton(
        &self,
        coordinate: &Coordinate,
        path: &str,
        id: &str,
        name: &str,
        payload: &Value,
    ) -> Result<RemoteEntity, Error> {
        let Self::Live { rest } = self else {
            return Ok(dryrun::synthesized_entity(coordinate, name));
        };

        rest.put_json(path, payload).await?;
        Ok(RemoteEntity {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    /// Deletes one platform resource by id. A 404 is not an error.
    ///
    /// # Errors
    ///
    /// Propagates transport errors other than not-found.
    pub async fn delete(&self, base_path: &str, object_id: &str) -> Result<(), Error> {
        let Self::Live { rest } = self else {
            return Ok(());
        };
        let path = format!("{base_path}/{}", urlencoding::encode(object_id));
        match rest.delete(&path).await {
            Ok(_) => Ok(()),
            Err(error) if error.status() == Some(404) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

/// Reads the id out of a create response, accepting both bare objects and
/// single-element result arrays.
fn created_id(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let object = match &parsed {
        Value::Array(entries) => entries.first()?,
        other => other,
    };
    object
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
}
