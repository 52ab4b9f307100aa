//! Google service account authentication
//!
//! Signs a JWT assertion with the account's private key and exchanges it for
//! an OAuth access token. The token is cached and refreshed shortly before it
//! expires.

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{Error, Result};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Refresh this many seconds before the cached token expires
const REFRESH_MARGIN_SECS: i64 = 300;

/// Lifetime of the signed assertion
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Fields of a service account key file
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: Option<String>,
}

/// JWT claims for the token exchange
#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: SecretString,
    expires_at: i64,
}

/// Access tokens for a service account
pub struct ServiceAccountAuth {
    client: Client,
    client_email: String,
    key: EncodingKey,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    /// Load a service account key file (Firebase Admin or GCP JSON key)
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or holds no usable key
    pub fn from_file(path: &Path, client: Client) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read service account {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content, client)
    }

    /// Parse a service account key from its JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the JSON or the private key does not parse
    pub fn from_json(json: &str, client: Client) -> Result<Self> {
        let account: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("failed to parse service account: {e}")))?;

        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| Error::Config(format!("invalid service account private key: {e}")))?;

        Ok(Self {
            client,
            client_email: account.client_email,
            key,
            token_url: account
                .token_uri
                .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            cached: Mutex::new(None),
        })
    }

    /// Service account identity
    #[must_use]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// A valid access token, exchanging a new assertion when needed
    ///
    /// # Errors
    ///
    /// Returns error if signing or the token exchange fails
    pub async fn access_token(&self) -> Result<SecretString> {
        let mut cached = self.cached.lock().await;

        let now = Utc::now().timestamp();
        if let Some(token) = cached
            .as_ref()
            .filter(|t| t.expires_at > now + REFRESH_MARGIN_SECS)
        {
            return Ok(token.access_token.clone());
        }

        let response = self.exchange(now).await?;
        let access_token = SecretString::from(response.access_token);

        tracing::debug!(
            account = %self.client_email,
            expires_in = response.expires_in,
            "service account token refreshed"
        );

        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: now + response.expires_in,
        });

        Ok(access_token)
    }

    fn create_jwt(&self, now: i64) -> Result<String> {
        let claims = JwtClaims {
            iss: &self.client_email,
            scope: STORAGE_SCOPE,
            aud: &self.token_url,
            exp: now + ASSERTION_LIFETIME_SECS,
            iat: now,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| Error::BlobStore(format!("JWT encoding failed: {e}")))
    }

    async fn exchange(&self, now: i64) -> Result<TokenResponse> {
        let jwt = self.create_jwt(now)?;

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::BlobStore(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BlobStore(format!(
                "token request returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::BlobStore(format!("token parse error: {e}")))
    }
}
