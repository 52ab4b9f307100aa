//! Filesystem blob store served under `/documents`

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use super::BlobStore;
use crate::{Error, Result};

/// Writes blobs below a root directory
///
/// `put("documents/pan_SM1.jpeg", ..)` lands at `<root>/documents/pan_SM1.jpeg`
/// and resolves to `<public_base_url>/documents/pan_SM1.jpeg`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: Url,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`
    ///
    /// # Errors
    ///
    /// Returns error if the public base URL does not parse
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Result<Self> {
        let mut base = public_base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let public_base_url = Url::parse(&base)
            .map_err(|e| Error::Config(format!("invalid public base URL {public_base_url}: {e}")))?;

        Ok(Self {
            root: root.into(),
            public_base_url,
        })
    }

    /// Directory blobs are written under
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::BlobStore(format!("refusing blob path {path:?}")));
        }

        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::BlobStore(format!("failed to create {}: {e}", parent.display())))?;
        }

        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| Error::BlobStore(format!("failed to write {}: {e}", target.display())))?;

        let url = self
            .public_base_url
            .join(path)
            .map_err(|e| Error::BlobStore(format!("failed to build URL for {path}: {e}")))?;

        tracing::debug!(path = %target.display(), size = bytes.len(), "blob written");
        Ok(url.to_string())
    }
}
