//! Authenticated media download from the messaging provider

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Downloads media attached to inbound messages
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the media bytes at `url` using the provider credentials
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Twilio media fetcher using account SID / auth token basic auth
pub struct TwilioMediaFetcher {
    client: Client,
    account_sid: String,
    auth_token: SecretString,
}

impl TwilioMediaFetcher {
    /// Create a fetcher with a bounded request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(account_sid: String, auth_token: SecretString, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("docket/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build media client: {e}")))?;

        Ok(Self {
            client,
            account_sid,
            auth_token,
        })
    }
}

#[async_trait]
impl MediaFetcher for TwilioMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::MediaFetch(format!("media download timed out: {e}"))
                } else {
                    Error::MediaFetch(format!("media download failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::MediaFetch(format!("media download returned {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::MediaFetch(format!("failed to read media body: {e}")))?;

        tracing::debug!(size = bytes.len(), "media downloaded");
        Ok(bytes.to_vec())
    }
}
