//! Client for storage bucket definitions.
//!
//! The bucket endpoint is idempotent by name, but creation and update are
//! eventually consistent: after a write the bucket transitions through
//! intermediate states before becoming `active`. Writes therefore poll
//! until the bucket settles (or, for deletes, disappears).

use super::{dryrun, RemoteEntity};
use crate::constants;
use crate::error::Error;
use crate::http::RestClient;
use crate::project::Coordinate;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// The remote bucket name for a configuration: `<project>_<configId>`,
/// unless an imported `originObjectId` pins a different name.
#[must_use]
pub fn bucket_name(project: &str, config_id: &str) -> String {
    format!("{project}_{config_id}")
}

pub enum BucketClient {
    Live { rest: Arc<RestClient> },
    Dry,
}

impl BucketClient {
    /// Creates or updates a bucket and waits for it to become active.
    ///
    /// # Errors
    ///
    /// Propagates transport errors; fails when the bucket does not become
    /// active within the polling window.
    pub async fn upsert(
        &self,
        coordinate: &Coordinate,
        name: &str,
        payload: &Value,
    ) -> Result<RemoteEntity, Error> {
        let Self::Live { rest } = self else {
            return Ok(dryrun::synthesized_entity(coordinate, name));
        };

        let mut body = payload.clone();
        if let Some(object) = body.as_object_mut() {
            object.insert("bucketName".to_string(), Value::String(name.to_string()));
        }

        rest.put_json(&bucket_path(name), &body).await?;
        self.await_active(coordinate, name).await?;

        Ok(RemoteEntity {
            id: name.to_string(),
            name: name.to_string(),
        })
    }

    /// Deletes a bucket and waits for it to disappear. Built-in default
    /// buckets are never deleted.
    ///
    /// # Errors
    ///
    /// Propagates transport errors; fails when the bucket is still present
    /// after the polling window.
    pub async fn delete(&self, coordinate: &Coordinate, name: &str) -> Result<(), Error> {
        if name.starts_with(constants::BUCKET_DEFAULT_PREFIX) {
            warn!(bucket = name, "skipping delete of a built-in bucket");
            return Ok(());
        }

        let Self::Live { rest } = self else {
            return Ok(());
        };

        match rest.delete(&bucket_path(name)).await {
            Ok(_) => {}
            Err(error) if error.status() == Some(404) => return Ok(()),
            Err(error) => return Err(error),
        }

        self.await_gone(coordinate, name).await
    }

    /// Polls until the bucket reports `active`, every 2s for at most 60s.
    async fn await_active(&self, coordinate: &Coordinate, name: &str) -> Result<(), Error> {
        let Self::Live { rest } = self else {
            return Ok(());
        };

        let started = Instant::now();
        loop {
            let response = rest.get(&bucket_path(name)).await?;
            let status = response
                .json()?
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if status == constants::BUCKET_STATUS_ACTIVE {
                return Ok(());
            }

            if started.elapsed() >= constants::BUCKET_AWAIT_MAX_WAIT {
                return Err(Error::client_error(
                    coordinate,
                    format!("bucket '{name}' did not become active (last status: '{status}')"),
                ));
            }

            debug!(bucket = name, %status, "bucket not active yet");
            rest.sleep_cancellable(constants::BUCKET_AWAIT_INTERVAL).await?;
        }
    }

    /// Polls until GET returns 404, every 2s for at most 60s.
    async fn await_gone(&self, coordinate: &Coordinate, name: &str) -> Result<(), Error> {
        let Self::Live { rest } = self else {
            return Ok(());
        };

        let started = Instant::now();
        loop {
            match rest.get(&bucket_path(name)).await {
                Err(error) if error.status() == Some(404) => return Ok(()),
                Err(error) => return Err(error),
                Ok(_) if started.elapsed() >= constants::BUCKET_AWAIT_MAX_WAIT => {
                    return Err(Error::client_error(
                        coordinate,
                        format!("bucket '{name}' was still present after delete"),
                    ));
                }
                Ok(_) => {
                    debug!(bucket = name, "bucket still present after delete");
                    rest.sleep_cancellable(constants::BUCKET_AWAIT_INTERVAL).await?;
                }
            }
        }
    }
}

fn bucket_path(name: &str) -> String {
    format!(
        "{}/{}",
        constants::PATH_BUCKET_DEFINITIONS,
        urlencoding::encode(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_name_joins_project_and_config_id() {
        assert_eq!(bucket_name("infra", "audit-logs"), "infra_audit-logs");
    }

    #[test]
    fn bucket_name_is_deterministic() {
        assert_eq!(bucket_name("a", "b"), bucket_name("a", "b"));
    }

    #[tokio::test]
    async fn default_buckets_are_never_deleted() {
        let client = BucketClient::Dry;
        let coordinate = Coordinate::new("p", "bucket", "c");
        client.delete(&coordinate, "default_logs").await.unwrap();
    }
}
