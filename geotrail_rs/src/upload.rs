// upload.rs - Upload queue consumer
//
// Transfers persisted photos, optionally through a downsampled temporary copy
// that carries the original's tags. Delivery is best-effort: a failed transfer
// is logged, counted and forgotten.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::codec::{sample_factor, ImageCodec};
use crate::error::{CaptureResult, GeotrailError};
use crate::queue::UploadQueue;
use crate::remote::RemoteStore;
use crate::stats::PipelineStats;
use crate::storage::PhotoStore;

pub struct UploadWorker {
    store: Arc<dyn PhotoStore>,
    codec: Arc<dyn ImageCodec>,
    remote: Arc<dyn RemoteStore>,
    sample_factor: u32,
    temp_dir: PathBuf,
    stats: Arc<PipelineStats>,
}

impl UploadWorker {
    pub fn new(
        store: Arc<dyn PhotoStore>,
        codec: Arc<dyn ImageCodec>,
        remote: Arc<dyn RemoteStore>,
        upload_scale: f64,
        temp_dir: PathBuf,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            store,
            codec,
            remote,
            sample_factor: sample_factor(upload_scale),
            temp_dir,
            stats,
        }
    }

    pub fn sample_factor(&self) -> u32 {
        self.sample_factor
    }

    pub fn spawn(self, uploads: Arc<UploadQueue>) -> CaptureResult<JoinHandle<()>> {
        thread::Builder::new()
            .name("geotrail-uploader".into())
            .spawn(move || self.run(&uploads))
            .map_err(|e| GeotrailError::Internal(format!("uploader thread: {}", e)))
    }

    /// Drain `uploads` until the queue is halted
    pub fn run(&self, uploads: &UploadQueue) {
        info!("[uploader] started (sample factor 1/{})", self.sample_factor);
        while let Some(path) = uploads.pop() {
            match self.upload(&path) {
                Ok(revision) => {
                    info!("[uploader] {} uploaded, revision {}", path.display(), revision);
                    self.stats.record_upload(true);
                }
                Err(e) => {
                    warn!("[uploader] {} not uploaded: {}", path.display(), e);
                    self.stats.record_upload(false);
                }
            }
        }
        info!("[uploader] stopped");
    }

    /// Transfer one persisted photo and return the remote revision
    pub fn upload(&self, path: &Path) -> CaptureResult<String> {
        if !self.store.exists(path) {
            return Err(GeotrailError::MissingFile(path.display().to_string()));
        }
        let remote_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GeotrailError::Upload(format!("bad file name: {}", path.display())))?;

        if self.sample_factor <= 1 {
            let tags = self.store.read_metadata(path)?;
            return self.remote.upload(path, remote_name, &tags);
        }

        let (temp, dimensions) = self.write_downsampled(path, remote_name)?;
        let result = self.tag_and_send(path, &temp, dimensions, remote_name);
        if let Err(e) = self.store.remove(&temp) {
            warn!("[uploader] temp file {} left behind: {}", temp.display(), e);
        }
        result
    }

    fn write_downsampled(&self, original: &Path, name: &str) -> CaptureResult<(PathBuf, (u32, u32))> {
        let data = self.store.read(original)?;
        let small = self.codec.downsample(&data, self.sample_factor)?;

        self.store.ensure_dir(&self.temp_dir)?;
        let temp = self.temp_dir.join(name);
        if let Err(e) = self.store.write(&temp, &small.data) {
            // Partial writes still need cleaning up
            let _ = self.store.remove(&temp);
            return Err(e);
        }
        debug!(
            "[uploader] {} downsampled to {}x{} ({} -> {} bytes)",
            name,
            small.width,
            small.height,
            data.len(),
            small.data.len()
        );
        Ok((temp, (small.width, small.height)))
    }

    fn tag_and_send(
        &self,
        original: &Path,
        temp: &Path,
        (width, height): (u32, u32),
        name: &str,
    ) -> CaptureResult<String> {
        let tags = self.store.read_metadata(original)?.resized(width, height);
        self.store.write_metadata(temp, &tags)?;
        self.remote.upload(temp, name, &tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::test_jpeg;
    use crate::codec::JpegCodec;
    use crate::metadata::{PhotoTags, TAG_GPS_LATITUDE, TAG_MAKE};
    use crate::storage::LocalPhotoStore;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Remote that records what it was sent
    #[derive(Default)]
    struct RecordingRemote {
        sent: Mutex<Vec<(String, Vec<u8>, PhotoTags)>>,
        fail: bool,
    }

    impl RemoteStore for RecordingRemote {
        fn upload(
            &self,
            local: &Path,
            remote_name: &str,
            tags: &PhotoTags,
        ) -> CaptureResult<String> {
            if self.fail {
                return Err(GeotrailError::Upload("remote unavailable".into()));
            }
            let data = LocalPhotoStore::new().read(local)?;
            let mut sent = self.sent.lock().unwrap();
            sent.push((remote_name.to_string(), data, tags.clone()));
            Ok(format!("rev{}", sent.len()))
        }
    }

    fn persisted_photo(dir: &Path, width: u32, height: u32) -> PathBuf {
        let store = LocalPhotoStore::new();
        let path = dir.join("2024-05-01_08-30-00_000.jpg");
        store.write(&path, &test_jpeg(width, height)).unwrap();
        let mut tags = PhotoTags::new();
        tags.set(TAG_MAKE, "Acme");
        tags.set(TAG_GPS_LATITUDE, "33/1,52/1,12000/1000");
        tags.set("MakerNote", "blob");
        store.write_metadata(&path, &tags).unwrap();
        path
    }

    fn worker(remote: Arc<RecordingRemote>, scale: f64, temp: PathBuf) -> UploadWorker {
        UploadWorker::new(
            Arc::new(LocalPhotoStore::new()),
            Arc::new(JpegCodec::default()),
            remote,
            scale,
            temp,
            Arc::new(PipelineStats::new()),
        )
    }

    #[test]
    fn test_full_scale_uploads_original() {
        let dir = tempdir().unwrap();
        let path = persisted_photo(dir.path(), 64, 48);
        let remote = Arc::new(RecordingRemote::default());
        let worker = worker(Arc::clone(&remote), 1.0, dir.path().join("tmp"));

        assert_eq!(worker.upload(&path).unwrap(), "rev1");
        let sent = remote.sent.lock().unwrap();
        assert_eq!(sent[0].0, "2024-05-01_08-30-00_000.jpg");
        assert_eq!(sent[0].1, std::fs::read(&path).unwrap());
        assert_eq!(sent[0].2.get(TAG_MAKE), Some("Acme"));
        assert!(sent[0].2.get(TAG_GPS_LATITUDE).is_some());
    }

    #[test]
    fn test_downsampled_copy_carries_tags_and_is_removed() {
        let dir = tempdir().unwrap();
        let path = persisted_photo(dir.path(), 64, 48);
        let remote = Arc::new(RecordingRemote::default());
        let temp_dir = dir.path().join("tmp");
        let worker = worker(Arc::clone(&remote), 0.25, temp_dir.clone());
        assert_eq!(worker.sample_factor(), 4);

        worker.upload(&path).unwrap();

        let sent = remote.sent.lock().unwrap();
        let (name, data, tags) = &sent[0];
        assert_eq!(name, "2024-05-01_08-30-00_000.jpg");
        assert_eq!(JpegCodec::default().dimensions(data).unwrap(), (16, 12));
        assert_eq!(tags.dimensions(), Some((16, 12)));
        assert_eq!(tags.get(TAG_MAKE), Some("Acme"));
        assert!(tags.get(TAG_GPS_LATITUDE).is_some());
        assert!(tags.get("MakerNote").is_none());

        assert!(!temp_dir.join(name).exists());
        assert!(path.exists());
    }

    #[test]
    fn test_temp_removed_on_failure() {
        let dir = tempdir().unwrap();
        let path = persisted_photo(dir.path(), 64, 48);
        let remote = Arc::new(RecordingRemote {
            fail: true,
            ..RecordingRemote::default()
        });
        let temp_dir = dir.path().join("tmp");
        let worker = worker(remote, 0.5, temp_dir.clone());

        assert!(matches!(worker.upload(&path), Err(GeotrailError::Upload(_))));
        assert!(!temp_dir.join("2024-05-01_08-30-00_000.jpg").exists());
        assert!(!temp_dir.join("2024-05-01_08-30-00_000.jpg.json").exists());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempdir().unwrap();
        let worker = worker(Arc::new(RecordingRemote::default()), 1.0, dir.path().join("tmp"));
        let err = worker.upload(&dir.path().join("gone.jpg")).unwrap_err();
        assert!(matches!(err, GeotrailError::MissingFile(_)));
    }

    #[test]
    fn test_run_loop_survives_failures() {
        let dir = tempdir().unwrap();
        let good = persisted_photo(dir.path(), 32, 32);
        let remote = Arc::new(RecordingRemote::default());
        let stats = Arc::new(PipelineStats::new());
        let worker = UploadWorker::new(
            Arc::new(LocalPhotoStore::new()),
            Arc::new(JpegCodec::default()),
            Arc::clone(&remote) as Arc<dyn RemoteStore>,
            1.0,
            dir.path().join("tmp"),
            Arc::clone(&stats),
        );

        let queue = Arc::new(UploadQueue::unbounded());
        queue.push(dir.path().join("missing.jpg"));
        queue.push(good);
        let handle = worker.spawn(Arc::clone(&queue)).unwrap();

        for _ in 0..200 {
            if stats.snapshot().uploads_succeeded == 1 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        queue.halt();
        handle.join().unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.uploads_failed, 1);
        assert_eq!(snap.uploads_succeeded, 1);
    }
}
