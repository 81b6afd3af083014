use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Pipeline counters, updated from the scheduler and both workers
#[derive(Debug, Default)]
pub struct PipelineStats {
    captures_fired: AtomicU64,
    capture_failures: AtomicU64,
    captures_evicted: AtomicU64,
    photos_written: AtomicU64,
    processing_failures: AtomicU64,
    uploads_succeeded: AtomicU64,
    uploads_failed: AtomicU64,
    last_saved: Mutex<Option<String>>,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub captures_fired: u64,
    pub capture_failures: u64,
    pub captures_evicted: u64,
    pub photos_written: u64,
    pub processing_failures: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub last_saved: Option<String>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fire(&self) {
        self.captures_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.captures_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// A photo reached local storage; `file_name` becomes the last saved photo
    pub fn record_written(&self, file_name: &str) {
        self.photos_written.fetch_add(1, Ordering::Relaxed);
        *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(file_name.to_string());
    }

    pub fn record_processing_failure(&self) {
        self.processing_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self, ok: bool) {
        let counter = if ok {
            &self.uploads_succeeded
        } else {
            &self.uploads_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_saved(&self) -> Option<String> {
        self.last_saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            captures_fired: self.captures_fired.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            captures_evicted: self.captures_evicted.load(Ordering::Relaxed),
            photos_written: self.photos_written.load(Ordering::Relaxed),
            processing_failures: self.processing_failures.load(Ordering::Relaxed),
            uploads_succeeded: self.uploads_succeeded.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            last_saved: self.last_saved(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = PipelineStats::new();
        stats.record_fire();
        stats.record_fire();
        stats.record_eviction();
        stats.record_written("2024-01-01_00-00-00_000.jpg");
        stats.record_upload(true);
        stats.record_upload(false);

        let snap = stats.snapshot();
        assert_eq!(snap.captures_fired, 2);
        assert_eq!(snap.captures_evicted, 1);
        assert_eq!(snap.photos_written, 1);
        assert_eq!(snap.uploads_succeeded, 1);
        assert_eq!(snap.uploads_failed, 1);
        assert_eq!(snap.last_saved.as_deref(), Some("2024-01-01_00-00-00_000.jpg"));
    }
}
