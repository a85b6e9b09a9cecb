//! Service-account access tokens for the Google REST APIs.
//!
//! Both stores authenticate the same way: sign a short-lived JWT with the
//! service account's RSA key, exchange it at the OAuth2 token endpoint, and
//! cache the returned access token until shortly before it expires.

use crate::config::GoogleConfig;
use crate::store::{Result, StoreError};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Scopes covering Firestore and Cloud Storage read/write.
const SCOPES: &str = "https://www.googleapis.com/auth/datastore https://www.googleapis.com/auth/devstorage.read_write";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are refreshed this many seconds before their actual expiry so an
/// in-flight request never carries a token that lapses mid-call.
const EXPIRY_LEEWAY_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

impl CachedToken {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at - EXPIRY_LEEWAY_SECS
    }
}

/// Source of bearer tokens for store clients.
pub struct TokenSource {
    inner: Inner,
}

enum Inner {
    ServiceAccount {
        client_email: String,
        token_uri: String,
        encoding_key: EncodingKey,
        http: reqwest::Client,
        cached: RwLock<Option<CachedToken>>,
    },
    /// A pre-issued token, used by tests pointing at mock servers.
    Fixed(String),
}

impl TokenSource {
    /// Build a token source from service-account credentials.
    ///
    /// Fails immediately when the private key is not parseable PEM, so a
    /// misconfigured deployment dies at startup rather than on first request.
    pub fn service_account(google: &GoogleConfig, http: reqwest::Client) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(google.private_key.as_bytes())
            .map_err(|e| StoreError::Credentials(format!("invalid service account private key: {e}")))?;

        Ok(Self {
            inner: Inner::ServiceAccount {
                client_email: google.client_email.clone(),
                token_uri: google.token_uri.clone(),
                encoding_key,
                http,
                cached: RwLock::new(None),
            },
        })
    }

    /// A token source that always yields the given token.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            inner: Inner::Fixed(token.into()),
        }
    }

    /// Current access token, refreshed through the token endpoint if the
    /// cached one is absent or near expiry.
    pub async fn token(&self) -> Result<String> {
        let (client_email, token_uri, encoding_key, http, cached) = match &self.inner {
            Inner::Fixed(token) => return Ok(token.clone()),
            Inner::ServiceAccount {
                client_email,
                token_uri,
                encoding_key,
                http,
                cached,
            } => (client_email, token_uri, encoding_key, http, cached),
        };

        let now = Utc::now().timestamp();
        if let Some(token) = cached.read().await.as_ref() {
            if !token.is_expired(now) {
                return Ok(token.access_token.clone());
            }
        }

        let mut slot = cached.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(token) = slot.as_ref() {
            if !token.is_expired(now) {
                return Ok(token.access_token.clone());
            }
        }

        let assertion = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &Claims {
                iss: client_email,
                scope: SCOPES,
                aud: token_uri,
                iat: now,
                exp: now + 3600,
            },
            encoding_key,
        )
        .map_err(|e| StoreError::Credentials(format!("failed to sign token assertion: {e}")))?;

        let response = http
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|source| StoreError::Transport {
                operation: "exchange service account token",
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                operation: "exchange service account token",
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|source| StoreError::Transport {
            operation: "exchange service account token",
            source,
        })?;

        tracing::debug!(expires_in = token.expires_in, "Refreshed service account access token");

        let cached_token = CachedToken {
            access_token: token.access_token.clone(),
            expires_at: now + token.expires_in,
        };
        *slot = Some(cached_token);

        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_source_returns_token_verbatim() {
        let source = TokenSource::fixed("test-token");
        assert_eq!(source.token().await.unwrap(), "test-token");
    }

    #[test]
    fn cached_token_expires_with_leeway() {
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: 1000,
        };
        assert!(!token.is_expired(1000 - EXPIRY_LEEWAY_SECS - 1));
        assert!(token.is_expired(1000 - EXPIRY_LEEWAY_SECS));
        assert!(token.is_expired(1001));
    }

    #[test]
    fn garbage_private_key_is_rejected_at_construction() {
        let google = GoogleConfig {
            private_key: "not a pem".to_string(),
            client_email: "svc@example.iam.gserviceaccount.com".to_string(),
            project_id: "example".to_string(),
            ..GoogleConfig::default()
        };
        let result = TokenSource::service_account(&google, reqwest::Client::new());
        assert!(matches!(result, Err(StoreError::Credentials(_))));
    }
}
