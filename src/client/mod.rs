//! Resource clients: one per configuration family, bundled per environment.
//!
//! Each client translates high-level upsert/get/delete calls into transport
//! requests with the family's identity and uniqueness semantics. Every
//! client is an enum over a live and a dry-run variant; dry-run write paths
//! synthesize plausible ids without touching the network.

pub mod bucket;
pub mod classic;
pub mod dryrun;
pub mod platform;
pub mod settings;

use crate::environment::EnvironmentDefinition;
use crate::error::Error;
use crate::http::auth::Auth;
use crate::http::{ClientOptions, RestClient};
use std::sync::Arc;

pub use bucket::BucketClient;
pub use classic::ClassicClient;
pub use platform::PlatformClient;
pub use settings::SettingsClient;

/// The remote identity a deploy produced: the server-assigned id plus the
/// human name the engine deployed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntity {
    pub id: String,
    pub name: String,
}

/// Per-environment bundle of resource clients.
///
/// Classic and settings APIs share the token-authenticated client; bucket
/// and platform APIs share the OAuth client. Each shares one connection
/// pool per underlying [`RestClient`].
pub struct ClientSet {
    pub environment: String,
    pub classic: ClassicClient,
    pub settings: SettingsClient,
    pub bucket: BucketClient,
    pub platform: PlatformClient,
}

impl ClientSet {
    /// Builds live clients for one environment from its credentials.
    ///
    /// # Errors
    ///
    /// Fails when an underlying HTTP client cannot be constructed.
    pub fn live(
        definition: &EnvironmentDefinition,
        options: &ClientOptions,
    ) -> Result<Self, Error> {
        let token_auth = || {
            definition
                .auth
                .api_token
                .clone()
                .map_or(Auth::None, Auth::ApiToken)
        };

        let classic_rest = Arc::new(RestClient::new(
            &definition.url,
            token_auth(),
            options.clone(),
        )?);

        let platform_auth = definition.auth.oauth.as_ref().map_or_else(token_auth, |creds| {
            Auth::oauth(creds.clone(), &definition.url)
        });
        let platform_rest = Arc::new(RestClient::new(
            &definition.url,
            platform_auth,
            options.clone(),
        )?);

        Ok(Self {
            environment: definition.name.clone(),
            classic: ClassicClient::Live {
                rest: Arc::clone(&classic_rest),
            },
            settings: SettingsClient::Live { rest: classic_rest },
            bucket: BucketClient::Live {
                rest: Arc::clone(&platform_rest),
            },
            platform: PlatformClient::Live {
                rest: platform_rest,
            },
        })
    }

    /// Builds a set whose write paths never reach the network.
    #[must_use]
    pub fn dry_run(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            classic: ClassicClient::Dry,
            settings: SettingsClient::Dry,
            bucket: BucketClient::Dry,
            platform: PlatformClient::Dry,
        }
    }

    /// Whether this set performs real writes.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        matches!(self.classic, ClassicClient::Dry)
    }
}
