//! Target environment definitions and credentials.
//!
//! The manifest loader (out of scope here) materializes these from YAML.
//! Secrets arrive pre-resolved as opaque strings.

use serde::{Deserialize, Serialize};

/// One remote environment the engine reconciles against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDefinition {
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    /// Base URL, e.g. `https://abc123.live.example.com`.
    pub url: String,
    pub auth: AuthCredentials,
}

impl EnvironmentDefinition {
    pub fn new(name: impl Into<String>, url: impl Into<String>, auth: AuthCredentials) -> Self {
        Self {
            name: name.into(),
            group: None,
            url: url.into(),
            auth,
        }
    }
}

/// Credentials for one environment. Classic APIs use the API token;
/// platform APIs use OAuth client credentials. Either may be absent when
/// the project only touches one API generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthCredentials {
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub oauth: Option<OAuthCredentials>,
}

impl AuthCredentials {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            api_token: Some(token.into()),
            oauth: None,
        }
    }
}

/// OAuth client-credentials grant material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Token endpoint override; defaults to the platform SSO endpoint.
    #[serde(default)]
    pub token_endpoint: Option<String>,
}
