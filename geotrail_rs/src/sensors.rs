use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use image::{DynamicImage, Rgb, RgbImage};
use log::{debug, info};

use crate::capture::{CaptureTrigger, FrameCallback};
use crate::codec::{EncodedImage, JpegCodec};
use crate::error::{CaptureResult, GeotrailError};
use crate::session::{FixSink, LocationFeed};
use crate::types::{Fix, LocationSource};

/// Metres per degree of latitude, close enough for a simulated walk
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Location feed for the CLI: asks Termux:API when present, otherwise walks
/// a straight line from `origin` at a fixed speed.
pub struct SimulatedLocationFeed {
    source: LocationSource,
    runtime: Handle,
    period: Duration,
    origin: (f64, f64),
    heading_deg: f64,
    speed_mps: f64,
    accuracy_m: f64,
    use_termux: bool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedLocationFeed {
    pub fn new(source: LocationSource, runtime: Handle, origin: (f64, f64)) -> Self {
        let (period_ms, accuracy_m) = match source {
            LocationSource::Gps => (1000, 5.0),
            LocationSource::Network => (5000, 40.0),
            LocationSource::Passive => (10_000, 80.0),
        };
        Self {
            source,
            runtime,
            period: Duration::from_millis(period_ms),
            origin,
            heading_deg: 45.0,
            speed_mps: 1.4,
            accuracy_m,
            use_termux: false,
            task: Mutex::new(None),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period.max(Duration::from_millis(1));
        self
    }

    pub fn with_motion(mut self, heading_deg: f64, speed_mps: f64) -> Self {
        self.heading_deg = heading_deg;
        self.speed_mps = speed_mps;
        self
    }

    pub fn with_termux(mut self, enabled: bool) -> Self {
        self.use_termux = enabled;
        self
    }
}

impl LocationFeed for SimulatedLocationFeed {
    fn source(&self) -> LocationSource {
        self.source
    }

    fn subscribe(&self, sink: FixSink) -> CaptureResult<()> {
        let mut task = self
            .task
            .lock()
            .map_err(|_| GeotrailError::Internal("feed lock poisoned".into()))?;
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let source = self.source;
        let period = self.period;
        let walk = Walk {
            origin: self.origin,
            heading_deg: self.heading_deg,
            speed_mps: self.speed_mps,
            accuracy_m: self.accuracy_m,
        };
        let use_termux = self.use_termux;

        *task = Some(self.runtime.spawn(async move {
            let mut ticker = interval(period);
            let mut sample_count = 0u64;
            loop {
                ticker.tick().await;
                let elapsed_s = sample_count as f64 * period.as_secs_f64();

                let fix = if use_termux {
                    read_termux_location(source).await
                } else {
                    None
                }
                .unwrap_or_else(|| walk.fix_at(source, elapsed_s));

                sink(fix);
                sample_count += 1;
                if sample_count % 10 == 0 {
                    debug!("[{}] {} fixes", source, sample_count);
                }
            }
        }));
        info!("[{}] feed started ({} ms)", source, period.as_millis());
        Ok(())
    }

    fn unsubscribe(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
                info!("[{}] feed stopped", self.source);
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Walk {
    origin: (f64, f64),
    heading_deg: f64,
    speed_mps: f64,
    accuracy_m: f64,
}

impl Walk {
    fn fix_at(&self, source: LocationSource, elapsed_s: f64) -> Fix {
        let (lat0, lon0) = self.origin;
        let distance = self.speed_mps * elapsed_s;
        let heading = self.heading_deg.to_radians();
        let north = distance * heading.cos();
        let east = distance * heading.sin();

        let latitude = lat0 + north / METRES_PER_DEGREE;
        let longitude = lon0 + east / (METRES_PER_DEGREE * lat0.to_radians().cos().max(1e-6));
        let jitter = (elapsed_s * 0.1).sin() * self.accuracy_m * 0.2;

        Fix::new(
            source,
            latitude,
            longitude,
            30.0,
            self.accuracy_m + jitter,
            self.speed_mps,
            chrono::Utc::now().timestamp_millis(),
        )
    }
}

#[derive(Deserialize)]
struct TermuxLocation {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    altitude: f64,
    #[serde(default)]
    accuracy: f64,
    #[serde(default)]
    speed: f64,
}

async fn read_termux_location(source: LocationSource) -> Option<Fix> {
    // termux-location -p gps|network|passive prints one JSON object
    let output = Command::new("termux-location")
        .arg("-p")
        .arg(source.name())
        .arg("-r")
        .arg("last")
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    parse_termux_location(&String::from_utf8_lossy(&output.stdout), source)
}

fn parse_termux_location(output: &str, source: LocationSource) -> Option<Fix> {
    let parsed: TermuxLocation = serde_json::from_str(output.trim()).ok()?;
    Some(Fix::new(
        source,
        parsed.latitude,
        parsed.longitude,
        parsed.altitude,
        parsed.accuracy,
        parsed.speed,
        chrono::Utc::now().timestamp_millis(),
    ))
}

/// Camera stand-in that renders a numbered landscape test frame
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    runtime: Handle,
    codec: Arc<JpegCodec>,
    frames: Arc<AtomicU64>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, runtime: Handle) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            runtime,
            codec: Arc::new(JpegCodec::new(85)),
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl CaptureTrigger for SyntheticCamera {
    fn request_capture(&self, deliver: FrameCallback) {
        let (width, height) = (self.width, self.height);
        let codec = Arc::clone(&self.codec);
        let frames = Arc::clone(&self.frames);

        // Encoding is CPU work; keep it off the scheduler thread
        self.runtime.spawn_blocking(move || {
            let seq = frames.fetch_add(1, Ordering::Relaxed);
            deliver(render_frame(&codec, width, height, seq).map(|img| img.data));
        });
    }
}

fn render_frame(
    codec: &JpegCodec,
    width: u32,
    height: u32,
    seq: u64,
) -> CaptureResult<EncodedImage> {
    let shade = (seq * 37 % 255) as u8;
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width) as u8,
            (y * 255 / height) as u8,
            shade,
        ])
    });
    codec.encode_image(&DynamicImage::ImageRgb8(img))
}
