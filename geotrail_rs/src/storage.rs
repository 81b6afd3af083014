// storage.rs - Local persistence of photos and their tag sets
//
// `LocalPhotoStore` writes the image bytes unchanged and keeps the tag set in
// a JSON sidecar next to the photo (`<name>.jpg.json`), so the bytes on disk
// are exactly what the pipeline produced.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{CaptureResult, GeotrailError};
use crate::metadata::PhotoTags;

/// Storage collaborator
pub trait PhotoStore: Send + Sync {
    fn ensure_dir(&self, dir: &Path) -> CaptureResult<()>;
    fn write(&self, path: &Path, data: &[u8]) -> CaptureResult<()>;
    fn read(&self, path: &Path) -> CaptureResult<Vec<u8>>;
    fn exists(&self, path: &Path) -> bool;
    /// Tags of a persisted photo; an untagged photo yields an empty set
    fn read_metadata(&self, path: &Path) -> CaptureResult<PhotoTags>;
    fn write_metadata(&self, path: &Path, tags: &PhotoTags) -> CaptureResult<()>;
    /// Delete a photo and its metadata; missing files are not an error
    fn remove(&self, path: &Path) -> CaptureResult<()>;
}

#[derive(Clone, Debug, Default)]
pub struct LocalPhotoStore;

impl LocalPhotoStore {
    pub fn new() -> Self {
        Self
    }

    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }
}

impl PhotoStore for LocalPhotoStore {
    fn ensure_dir(&self, dir: &Path) -> CaptureResult<()> {
        fs::create_dir_all(dir).map_err(|e| GeotrailError::storage(dir, e))
    }

    fn write(&self, path: &Path, data: &[u8]) -> CaptureResult<()> {
        fs::write(path, data).map_err(|e| GeotrailError::storage(path, e))?;
        debug!("[storage] wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    fn read(&self, path: &Path) -> CaptureResult<Vec<u8>> {
        if !path.exists() {
            return Err(GeotrailError::MissingFile(path.display().to_string()));
        }
        fs::read(path).map_err(|e| GeotrailError::storage(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_metadata(&self, path: &Path) -> CaptureResult<PhotoTags> {
        let sidecar = Self::sidecar_path(path);
        if !sidecar.exists() {
            return Ok(PhotoTags::new());
        }
        let json = fs::read_to_string(&sidecar).map_err(|e| GeotrailError::storage(&sidecar, e))?;
        serde_json::from_str(&json).map_err(|e| GeotrailError::storage(&sidecar, e))
    }

    fn write_metadata(&self, path: &Path, tags: &PhotoTags) -> CaptureResult<()> {
        if !path.exists() {
            return Err(GeotrailError::MissingFile(path.display().to_string()));
        }
        let sidecar = Self::sidecar_path(path);
        let json =
            serde_json::to_string_pretty(tags).map_err(|e| GeotrailError::storage(&sidecar, e))?;
        fs::write(&sidecar, json).map_err(|e| GeotrailError::storage(&sidecar, e))
    }

    fn remove(&self, path: &Path) -> CaptureResult<()> {
        for target in [path.to_path_buf(), Self::sidecar_path(path)] {
            match fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(GeotrailError::storage(&target, e)),
            }
        }
        Ok(())
    }
}
