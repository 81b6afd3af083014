use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::warn;
use serde::Serialize;
use tokio::time::{sleep, Duration, Instant};

use crate::types::LocationSource;

/// Availability and liveness of one location provider
#[derive(Debug)]
pub struct SourceHealth {
    pub source: LocationSource,
    available: AtomicBool,
    last_fix: Mutex<Option<Instant>>,
    fixes: AtomicU64,
    pub silence_threshold: Duration,
}

impl SourceHealth {
    pub fn new(source: LocationSource, silence_threshold_secs: u64) -> Self {
        SourceHealth {
            source,
            available: AtomicBool::new(false),
            last_fix: Mutex::new(None),
            fixes: AtomicU64::new(0),
            silence_threshold: Duration::from_secs(silence_threshold_secs),
        }
    }

    /// Platform reported the provider enabled/disabled
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// A fix arrived; an emitting provider is available by definition
    pub fn record_fix(&self) {
        if let Ok(mut last) = self.last_fix.lock() {
            *last = Some(Instant::now());
        }
        self.fixes.fetch_add(1, Ordering::Relaxed);
        self.set_available(true);
    }

    pub fn fix_count(&self) -> u64 {
        self.fixes.load(Ordering::Relaxed)
    }

    pub fn time_since_last_fix(&self) -> Option<Duration> {
        self.last_fix.lock().ok().and_then(|t| t.map(|t| t.elapsed()))
    }

    /// Available but quiet for longer than the threshold
    pub fn is_silent(&self) -> bool {
        self.is_available()
            && self
                .time_since_last_fix()
                .map(|d| d > self.silence_threshold)
                .unwrap_or(false)
    }
}

/// Health of the three location providers
#[derive(Debug)]
pub struct LocationHealth {
    pub gps: SourceHealth,
    pub network: SourceHealth,
    pub passive: SourceHealth,
    check_interval: Duration,
}

impl LocationHealth {
    pub fn new() -> Self {
        LocationHealth {
            gps: SourceHealth::new(LocationSource::Gps, 30),
            network: SourceHealth::new(LocationSource::Network, 120),
            passive: SourceHealth::new(LocationSource::Passive, 600),
            check_interval: Duration::from_secs(5),
        }
    }

    pub fn source(&self, source: LocationSource) -> &SourceHealth {
        match source {
            LocationSource::Gps => &self.gps,
            LocationSource::Network => &self.network,
            LocationSource::Passive => &self.passive,
        }
    }

    /// Passive piggybacks on the others and cannot produce fixes alone
    pub fn providers_available(&self) -> bool {
        self.gps.is_available() || self.network.is_available()
    }

    pub fn check_health(&self) -> HealthReport {
        let entry = |h: &SourceHealth| SourceReport {
            available: h.is_available(),
            silent: h.is_silent(),
            fixes: h.fix_count(),
            silence_secs: h.time_since_last_fix().map(|d| d.as_secs_f64()),
        };
        HealthReport {
            gps: entry(&self.gps),
            network: entry(&self.network),
            passive: entry(&self.passive),
            providers_available: self.providers_available(),
        }
    }

    pub fn format_status(&self) -> String {
        let part = |h: &SourceHealth| {
            if !h.is_available() {
                "off".to_string()
            } else if h.is_silent() {
                format!(
                    "⚠ (silent {:.1}s)",
                    h.time_since_last_fix()
                        .unwrap_or(Duration::from_secs(0))
                        .as_secs_f64()
                )
            } else {
                format!("✓ {}", h.fix_count())
            }
        };
        format!(
            "Location: GPS {} | Network {} | Passive {}",
            part(&self.gps),
            part(&self.network),
            part(&self.passive)
        )
    }
}

impl Default for LocationHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SourceReport {
    pub available: bool,
    pub silent: bool,
    pub fixes: u64,
    pub silence_secs: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub gps: SourceReport,
    pub network: SourceReport,
    pub passive: SourceReport,
    pub providers_available: bool,
}

/// Periodically warn about providers that went quiet
pub async fn health_monitor_task(health: Arc<LocationHealth>) {
    loop {
        sleep(health.check_interval).await;

        for source in LocationSource::ALL {
            let h = health.source(source);
            if h.is_silent() {
                if let Some(duration) = h.time_since_last_fix() {
                    warn!("[health] {} silent for {:.1}s", source, duration.as_secs_f64());
                }
            }
        }
        if !health.providers_available() {
            warn!("[health] no location provider available, photos will not be geotagged");
        }
    }
}
