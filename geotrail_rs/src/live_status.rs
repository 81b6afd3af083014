use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::stats::StatsSnapshot;
use crate::types::Fix;

/// JSON snapshot of a running session, polled by the app or written to disk
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub state: String,
    pub mode: Option<String>,
    pub uptime_seconds: u64,
    pub session_dir: Option<String>,
    // Pipeline
    pub captures_fired: u64,
    pub capture_failures: u64,
    pub captures_evicted: u64,
    pub photos_written: u64,
    pub processing_failures: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub capture_queue_len: usize,
    pub upload_queue_len: usize,
    pub last_saved: Option<String>,
    // Location
    pub providers_available: bool,
    pub best_fix: Option<Fix>,
    pub orientation_deg: u16,
}

impl LiveStatus {
    pub fn new(state: &str) -> Self {
        Self {
            timestamp: current_timestamp(),
            state: state.to_string(),
            mode: None,
            uptime_seconds: 0,
            session_dir: None,
            captures_fired: 0,
            capture_failures: 0,
            captures_evicted: 0,
            photos_written: 0,
            processing_failures: 0,
            uploads_succeeded: 0,
            uploads_failed: 0,
            capture_queue_len: 0,
            upload_queue_len: 0,
            last_saved: None,
            providers_available: false,
            best_fix: None,
            orientation_deg: 0,
        }
    }

    pub fn apply_stats(&mut self, stats: &StatsSnapshot) {
        self.captures_fired = stats.captures_fired;
        self.capture_failures = stats.capture_failures;
        self.captures_evicted = stats.captures_evicted;
        self.photos_written = stats.photos_written;
        self.processing_failures = stats.processing_failures;
        self.uploads_succeeded = stats.uploads_succeeded;
        self.uploads_failed = stats.uploads_failed;
        self.last_saved = stats.last_saved.clone();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json()?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
