use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use image::{DynamicImage, Rgb, RgbImage};
use tempfile::tempdir;

use geotrail_rs::metadata::{TAG_GPS_LATITUDE_REF, TAG_GPS_LONGITUDE_REF};
use geotrail_rs::{
    CaptureResult, CaptureTrigger, Collaborators, DirectoryRemote, Fix, FrameCallback,
    JpegCodec, LocalPhotoStore, LocationSource, PhotoStore, PhotoTags, RemoteStore, Session,
    SessionConfig, SessionState,
};

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([30, 90, 200]));
    JpegCodec::default()
        .encode_image(&DynamicImage::ImageRgb8(img))
        .unwrap()
        .data
}

/// Delivers the same landscape frame for every request
struct StillCamera {
    frame: Vec<u8>,
}

impl CaptureTrigger for StillCamera {
    fn request_capture(&self, deliver: FrameCallback) {
        deliver(Ok(self.frame.clone()));
    }
}

/// Blocks every upload until the gate opens
#[derive(Default)]
struct GatedRemote {
    open: Mutex<bool>,
    opened: Condvar,
    calls: Mutex<Vec<String>>,
}

impl GatedRemote {
    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl RemoteStore for GatedRemote {
    fn upload(&self, _local: &Path, remote_name: &str, _tags: &PhotoTags) -> CaptureResult<String> {
        self.calls.lock().unwrap().push(remote_name.to_string());
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        Ok("1".into())
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn photos_in(dir: &Path) -> Vec<PathBuf> {
    let mut photos: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map(|e| e == "jpg").unwrap_or(false))
        .collect();
    photos.sort();
    photos
}

#[test]
fn test_capture_is_geotagged_persisted_and_uploaded() {
    let dir = tempdir().unwrap();
    let remote = Arc::new(DirectoryRemote::new(dir.path().join("remote")));
    let session = Session::new(Collaborators {
        trigger: Arc::new(StillCamera { frame: jpeg(64, 48) }),
        feeds: Vec::new(),
        store: Arc::new(LocalPhotoStore::new()),
        codec: Arc::new(JpegCodec::default()),
        remote: remote.clone(),
    });

    session.push_fix(Fix::new(
        LocationSource::Gps,
        -33.8688,
        151.2093,
        58.0,
        4.0,
        0.0,
        1_709_953_507_250,
    ));

    // Held sideways: the landscape frame is stored as is
    session.set_device_orientation(90);

    // One fire right away, the next one far in the future
    let config = SessionConfig::time(600_000, 0, dir.path().join("photos")).with_upload_scale(0.5);
    session.start(config).unwrap();
    let session_dir = session.session_dir().unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        session.stats().uploads_succeeded == 1
    }));
    session.stop();

    let photos = photos_in(&session_dir);
    assert_eq!(photos.len(), 1);
    let name = photos[0].file_name().unwrap().to_str().unwrap().to_string();
    assert_eq!(session.last_saved().as_deref(), Some(name.as_str()));

    let tags = LocalPhotoStore::new().read_metadata(&photos[0]).unwrap();
    assert_abs_diff_eq!(tags.latitude().unwrap(), -33.8688, epsilon = 1e-5);
    assert_abs_diff_eq!(tags.longitude().unwrap(), 151.2093, epsilon = 1e-5);
    assert_eq!(tags.get(TAG_GPS_LATITUDE_REF), Some("S"));
    assert_eq!(tags.get(TAG_GPS_LONGITUDE_REF), Some("E"));
    assert_eq!(tags.dimensions(), Some((64, 48)));

    // The uploaded copy is half size and carries the geotag
    let uploaded = remote.root().join(&name);
    assert_eq!(image::image_dimensions(&uploaded).unwrap(), (32, 24));
    let delivered = LocalPhotoStore::new().read_metadata(&uploaded).unwrap();
    assert_abs_diff_eq!(delivered.latitude().unwrap(), -33.8688, epsilon = 1e-5);
    assert_abs_diff_eq!(delivered.longitude().unwrap(), 151.2093, epsilon = 1e-5);
    assert_eq!(delivered.get(TAG_GPS_LATITUDE_REF), Some("S"));
    assert_eq!(delivered.dimensions(), Some((32, 24)));
    assert!(!dir.path().join("photos").join("cache").join(&name).exists());
}

#[test]
fn test_stop_abandons_pending_uploads() {
    let dir = tempdir().unwrap();
    let remote = Arc::new(GatedRemote::default());
    let session = Arc::new(Session::new(Collaborators {
        trigger: Arc::new(StillCamera { frame: jpeg(32, 24) }),
        feeds: Vec::new(),
        store: Arc::new(LocalPhotoStore::new()),
        codec: Arc::new(JpegCodec::default()),
        remote: remote.clone(),
    }));

    session
        .start(SessionConfig::time(20, 0, dir.path().join("photos")))
        .unwrap();

    // One transfer in flight, at least five waiting behind it
    assert!(wait_until(Duration::from_secs(10), || {
        remote.calls() == 1 && session.live_status().upload_queue_len >= 5
    }));

    let stopper = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.stop())
    };
    assert!(wait_until(Duration::from_secs(5), || {
        session.state() == SessionState::Stopping
    }));
    remote.open();
    stopper.join().unwrap();

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(remote.calls(), 1);
    let stats = session.stats();
    assert_eq!(stats.uploads_succeeded, 1);
    assert_eq!(stats.uploads_failed, 0);
    assert!(stats.photos_written >= 6);
}

#[test]
fn test_distance_session_fires_on_movement() {
    let dir = tempdir().unwrap();
    let session = Session::new(Collaborators {
        trigger: Arc::new(StillCamera { frame: jpeg(32, 24) }),
        feeds: Vec::new(),
        store: Arc::new(LocalPhotoStore::new()),
        codec: Arc::new(JpegCodec::default()),
        remote: Arc::new(DirectoryRemote::new(dir.path().join("remote"))),
    });
    session
        .start(SessionConfig::distance(100.0, dir.path().join("photos")))
        .unwrap();

    let fix = |lat: f64, t: i64| Fix::new(LocationSource::Gps, lat, 0.0, 0.0, 5.0, 1.0, t);
    // First fix fires; about 55 m does not; about 111 m from the reference does
    session.push_fix(fix(0.0, 1_000));
    session.push_fix(fix(0.0005, 2_000));
    session.push_fix(fix(0.001, 3_000));

    assert!(wait_until(Duration::from_secs(10), || {
        session.stats().photos_written == 2
    }));
    session.stop();
    assert_eq!(session.stats().captures_fired, 2);
}
