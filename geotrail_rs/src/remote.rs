// remote.rs - Remote transfer collaborators
//
// `DirectoryRemote` copies files into an outbox directory (a mounted share or
// a sync client's folder). `HttpRemote` PUTs them to an HTTP endpoint using
// the async reqwest client, driven from the upload thread through a tokio
// runtime handle. Both deliver the photo's tags next to it as `<name>.json`,
// the same sidecar layout `LocalPhotoStore` reads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::debug;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, ETAG};
use tokio::runtime::Handle;

use crate::error::{CaptureResult, GeotrailError};
use crate::metadata::PhotoTags;
use crate::storage::LocalPhotoStore;

pub trait RemoteStore: Send + Sync {
    /// Transfer `local` and its `tags` as `remote_name`, returning the remote
    /// revision id
    fn upload(&self, local: &Path, remote_name: &str, tags: &PhotoTags) -> CaptureResult<String>;
}

fn tags_json(tags: &PhotoTags) -> CaptureResult<String> {
    serde_json::to_string_pretty(tags).map_err(|e| GeotrailError::Upload(format!("tags: {}", e)))
}

// ─── Directory outbox ────────────────────────────────────────────────────────

pub struct DirectoryRemote {
    root: PathBuf,
    revision: AtomicU64,
}

impl DirectoryRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            revision: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RemoteStore for DirectoryRemote {
    fn upload(&self, local: &Path, remote_name: &str, tags: &PhotoTags) -> CaptureResult<String> {
        if !local.is_file() {
            return Err(GeotrailError::MissingFile(local.display().to_string()));
        }
        let json = tags_json(tags)?;
        fs::create_dir_all(&self.root)
            .map_err(|e| GeotrailError::Upload(format!("{}: {}", self.root.display(), e)))?;

        let target = self.root.join(remote_name);
        let bytes = fs::copy(local, &target)
            .map_err(|e| GeotrailError::Upload(format!("{}: {}", target.display(), e)))?;
        let sidecar = LocalPhotoStore::sidecar_path(&target);
        fs::write(&sidecar, json)
            .map_err(|e| GeotrailError::Upload(format!("{}: {}", sidecar.display(), e)))?;

        let rev = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("[remote] copied {} bytes to {}", bytes, target.display());
        Ok(format!("{:08x}", rev))
    }
}

// ─── HTTP PUT ────────────────────────────────────────────────────────────────

pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    runtime: Handle,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: Option<String>, runtime: Handle) -> CaptureResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GeotrailError::InvalidConfig(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            runtime,
        })
    }

    pub fn object_url(&self, remote_name: &str) -> String {
        format!("{}/{}", self.base_url, remote_name)
    }

    async fn put(&self, url: String, content_type: &str, body: Vec<u8>) -> CaptureResult<String> {
        let mut request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| GeotrailError::Upload(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeotrailError::Upload(format!("{}: HTTP {}", url, status.as_u16())));
        }

        let revision = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .unwrap_or_else(|| status.as_u16().to_string());
        Ok(revision)
    }

    /// Photo first, then its tags; the photo's revision is the one reported
    async fn put_with_tags(&self, name: &str, photo: Vec<u8>, tags: String) -> CaptureResult<String> {
        let revision = self.put(self.object_url(name), "image/jpeg", photo).await?;
        let sidecar = format!("{}.json", name);
        self.put(self.object_url(&sidecar), "application/json", tags.into_bytes())
            .await?;
        Ok(revision)
    }
}

impl RemoteStore for HttpRemote {
    /// Must be called from a plain thread, never from inside the runtime
    fn upload(&self, local: &Path, remote_name: &str, tags: &PhotoTags) -> CaptureResult<String> {
        if !local.is_file() {
            return Err(GeotrailError::MissingFile(local.display().to_string()));
        }
        let body = fs::read(local).map_err(|e| GeotrailError::storage(local, e))?;
        let json = tags_json(tags)?;
        debug!(
            "[remote] PUT {} ({} bytes, {} tags)",
            self.object_url(remote_name),
            body.len(),
            tags.len()
        );
        self.runtime
            .block_on(self.put_with_tags(remote_name, body, json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{TAG_GPS_LATITUDE, TAG_MAKE};
    use crate::storage::PhotoStore;
    use tempfile::tempdir;

    #[test]
    fn test_directory_remote_copies() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("photo.jpg");
        fs::write(&local, b"jpeg bytes").unwrap();

        let remote = DirectoryRemote::new(dir.path().join("outbox"));
        let rev1 = remote.upload(&local, "photo.jpg", &PhotoTags::new()).unwrap();
        let rev2 = remote.upload(&local, "copy.jpg", &PhotoTags::new()).unwrap();

        assert_ne!(rev1, rev2);
        assert_eq!(fs::read(remote.root().join("photo.jpg")).unwrap(), b"jpeg bytes");
        assert!(remote.root().join("copy.jpg").exists());
    }

    #[test]
    fn test_directory_remote_delivers_tags() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("photo.jpg");
        fs::write(&local, b"jpeg bytes").unwrap();
        let mut tags = PhotoTags::new();
        tags.set(TAG_MAKE, "Acme");
        tags.set(TAG_GPS_LATITUDE, "33/1,52/1,12000/1000");

        let remote = DirectoryRemote::new(dir.path().join("outbox"));
        remote.upload(&local, "photo.jpg", &tags).unwrap();

        let delivered = LocalPhotoStore::new()
            .read_metadata(&remote.root().join("photo.jpg"))
            .unwrap();
        assert_eq!(delivered, tags);
    }

    #[test]
    fn test_directory_remote_missing_file() {
        let dir = tempdir().unwrap();
        let remote = DirectoryRemote::new(dir.path().join("outbox"));
        let err = remote
            .upload(&dir.path().join("nope.jpg"), "nope.jpg", &PhotoTags::new())
            .unwrap_err();
        assert!(matches!(err, GeotrailError::MissingFile(_)));
    }

    #[test]
    fn test_http_remote_url() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let remote =
            HttpRemote::new("https://photos.example.org/upload/", None, runtime.handle().clone())
                .unwrap();
        assert_eq!(
            remote.object_url("2024-01-01_00-00-00_000.jpg"),
            "https://photos.example.org/upload/2024-01-01_00-00-00_000.jpg"
        );
    }
}
