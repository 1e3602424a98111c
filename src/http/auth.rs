//! Request authentication: API tokens and OAuth client credentials.
//!
//! Classic APIs authenticate with a static API token; platform APIs use an
//! OAuth client-credentials grant whose access token is fetched lazily and
//! refreshed once when a request comes back 401.

use crate::constants;
use crate::environment::OAuthCredentials;
use crate::error::Error;
use serde::Deserialize;
use tokio::sync::RwLock;

/// Authentication strategy for one [`super::RestClient`].
#[derive(Debug)]
pub enum Auth {
    /// No authorization header (test servers, public endpoints).
    None,
    /// Static API token, sent as `Authorization: Api-Token <token>`.
    ApiToken(String),
    /// OAuth client credentials with a cached bearer token.
    OAuth(OAuthSession),
}

impl Auth {
    #[must_use]
    pub fn oauth(credentials: OAuthCredentials, default_sso_base: &str) -> Self {
        let token_endpoint = credentials.token_endpoint.clone().unwrap_or_else(|| {
            format!("{}{}", default_sso_base.trim_end_matches('/'), constants::PATH_OAUTH_TOKEN)
        });
        Self::OAuth(OAuthSession {
            credentials,
            token_endpoint,
            access_token: RwLock::new(None),
        })
    }

    /// The `Authorization` header value for the next request, fetching an
    /// OAuth token first if none is cached.
    ///
    /// # Errors
    ///
    /// Fails when the token endpoint rejects the client credentials.
    pub async fn authorization_header(
        &self,
        http: &reqwest::Client,
    ) -> Result<Option<String>, Error> {
        match self {
            Self::None => Ok(None),
            Self::ApiToken(token) => Ok(Some(format!("Api-Token {token}"))),
            Self::OAuth(session) => {
                if let Some(token) = session.access_token.read().await.as_ref() {
                    return Ok(Some(format!("Bearer {token}")));
                }
                let token = session.fetch_token(http).await?;
                Ok(Some(format!("Bearer {token}")))
            }
        }
    }

    /// Discards and re-fetches the cached token after a 401.
    ///
    /// Returns `false` for non-refreshable strategies, in which case the
    /// caller surfaces the 401 as-is.
    pub async fn refresh(&self, http: &reqwest::Client) -> Result<bool, Error> {
        match self {
            Self::None | Self::ApiToken(_) => Ok(false),
            Self::OAuth(session) => {
                *session.access_token.write().await = None;
                session.fetch_token(http).await?;
                Ok(true)
            }
        }
    }
}

/// Cached OAuth client-credentials state.
#[derive(Debug)]
pub struct OAuthSession {
    credentials: OAuthCredentials,
    token_endpoint: String,
    access_token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl OAuthSession {
    async fn fetch_token(&self, http: &reqwest::Client) -> Result<String, Error> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(Error::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth_failed(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::auth_failed(format!("malformed token response: {e}")))?;

        *self.access_token.write().await = Some(token.access_token.clone());
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn api_token_header_format() {
        crate::http::ensure_crypto_provider();
        let auth = Auth::ApiToken("dt0c01.sample".into());
        let header = auth
            .authorization_header(&reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(header.as_deref(), Some("Api-Token dt0c01.sample"));
    }

    #[tokio::test]
    async fn no_auth_produces_no_header() {
        crate::http::ensure_crypto_provider();
        let auth = Auth::None;
        let header = auth
            .authorization_header(&reqwest::Client::new())
            .await
            .unwrap();
        assert!(header.is_none());
    }

    #[tokio::test]
    async fn api_token_is_not_refreshable() {
        crate::http::ensure_crypto_provider();
        let auth = Auth::ApiToken("t".into());
        assert!(!auth.refresh(&reqwest::Client::new()).await.unwrap());
    }

    #[test]
    fn oauth_derives_token_endpoint_from_sso_base() {
        let auth = Auth::oauth(
            OAuthCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
                token_endpoint: None,
            },
            "https://sso.example.com/",
        );
        let Auth::OAuth(session) = auth else {
            panic!("expected oauth");
        };
        assert_eq!(
            session.token_endpoint,
            "https://sso.example.com/sso/oauth2/token"
        );
    }
}
