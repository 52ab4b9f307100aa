//! Google Cloud Storage blob store
//!
//! Firebase Storage buckets are plain GCS buckets, so this uses the JSON API
//! media upload with a public-read ACL and returns the public object URL.
//! Requests are authorized with a service account token.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;

use super::{BlobStore, ServiceAccountAuth};
use crate::{Error, Result};

const DEFAULT_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
const DEFAULT_PUBLIC_BASE: &str = "https://storage.googleapis.com";

/// Uploads blobs to a GCS bucket
pub struct GcsBlobStore {
    client: Client,
    bucket: String,
    auth: ServiceAccountAuth,
    upload_base: String,
    public_base: String,
}

impl GcsBlobStore {
    /// Create a store for `bucket` authenticated as the service account in
    /// `credentials_path`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built or the key file is
    /// unusable
    pub fn new(bucket: String, credentials_path: &Path, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build storage client: {e}")))?;
        let auth = ServiceAccountAuth::from_file(credentials_path, client.clone())?;

        tracing::info!(bucket = %bucket, account = %auth.client_email(), "gcs storage configured");

        Ok(Self {
            client,
            bucket,
            auth,
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            public_base: DEFAULT_PUBLIC_BASE.to_string(),
        })
    }

    /// Point uploads and public URLs at another endpoint (emulators)
    #[must_use]
    pub fn with_endpoints(mut self, upload_base: &str, public_base: &str) -> Self {
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self.public_base = public_base.trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self, path: &str) -> String {
        format!(
            "{}/b/{}/o?uploadType=media&predefinedAcl=publicRead&name={}",
            self.upload_base,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(path)
        )
    }

    fn public_url(&self, path: &str) -> String {
        let encoded: Vec<_> = path.split('/').map(urlencoding::encode).collect();
        format!("{}/{}/{}", self.public_base, self.bucket, encoded.join("/"))
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let size = bytes.len();
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .post(self.upload_url(path))
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::BlobStore(format!("upload timed out: {e}"))
                } else {
                    Error::BlobStore(format!("upload failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BlobStore(format!("upload returned {status}: {body}")));
        }

        tracing::debug!(bucket = %self.bucket, path, size, "blob uploaded");
        Ok(self.public_url(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");

    fn store() -> GcsBlobStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.json");
        let json = serde_json::json!({
            "client_email": "docket@my-app.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
        });
        std::fs::write(&path, json.to_string()).unwrap();

        GcsBlobStore::new("my-app.appspot.com".to_string(), &path, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_upload_url_encodes_object_name() {
        let url = store().upload_url("documents/pan_SM1.jpeg");
        assert_eq!(
            url,
            "https://storage.googleapis.com/upload/storage/v1/b/my-app.appspot.com/o?uploadType=media&predefinedAcl=publicRead&name=documents%2Fpan_SM1.jpeg"
        );
    }

    #[test]
    fn test_public_url_keeps_path_segments() {
        let url = store().public_url("documents/pan_SM1.jpeg");
        assert_eq!(
            url,
            "https://storage.googleapis.com/my-app.appspot.com/documents/pan_SM1.jpeg"
        );
    }

    #[test]
    fn test_custom_endpoints() {
        let store = store().with_endpoints("http://localhost:9199/upload/storage/v1/", "http://localhost:9199");
        assert!(store.upload_url("a").starts_with("http://localhost:9199/upload/storage/v1/b/"));
        assert_eq!(store.public_url("a"), "http://localhost:9199/my-app.appspot.com/a");
    }
}
