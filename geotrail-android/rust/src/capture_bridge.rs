// capture_bridge.rs - Camera handshake with the Kotlin side
//
// The scheduler asks for a frame by parking a callback here. The app polls
// for the pending request id, takes the picture with its camera API and hands
// the JPEG bytes back with `deliver`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use geotrail_rs::{CaptureResult, CaptureTrigger, FrameCallback, GeotrailError};
use log::{debug, warn};

struct Pending {
    id: u64,
    deliver: FrameCallback,
}

#[derive(Default)]
pub struct PolledCaptureTrigger {
    pending: Mutex<Option<Pending>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PolledCaptureTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the request waiting for a frame, if any
    pub fn pending_request(&self) -> Option<u64> {
        lock(&self.pending).as_ref().map(|p| p.id)
    }

    /// Complete request `id`. Returns false when it is no longer pending.
    pub fn deliver(&self, id: u64, frame: CaptureResult<Vec<u8>>) -> bool {
        let pending = {
            let mut slot = lock(&self.pending);
            match slot.as_ref() {
                Some(p) if p.id == id => slot.take(),
                _ => None,
            }
        };
        match pending {
            Some(p) => {
                (p.deliver)(frame);
                true
            }
            None => {
                debug!("[capture] stale delivery for request {}", id);
                false
            }
        }
    }

    /// Fail the outstanding request, e.g. when the camera is released
    pub fn cancel(&self) {
        if let Some(p) = lock(&self.pending).take() {
            (p.deliver)(Err(GeotrailError::Capture("capture cancelled".into())));
        }
    }
}

impl CaptureTrigger for PolledCaptureTrigger {
    fn request_capture(&self, deliver: FrameCallback) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = lock(&self.pending).replace(Pending { id, deliver });
        if let Some(p) = previous {
            warn!("[capture] request {} superseded by {}", p.id, id);
            (p.deliver)(Err(GeotrailError::Capture(format!(
                "request {} superseded",
                p.id
            ))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn request(trigger: &PolledCaptureTrigger) -> mpsc::Receiver<CaptureResult<Vec<u8>>> {
        let (tx, rx) = mpsc::channel();
        trigger.request_capture(Box::new(move |frame| {
            tx.send(frame).unwrap();
        }));
        rx
    }

    #[test]
    fn test_poll_and_deliver() {
        let trigger = PolledCaptureTrigger::new();
        assert_eq!(trigger.pending_request(), None);

        let rx = request(&trigger);
        let id = trigger.pending_request().unwrap();
        assert!(!trigger.deliver(id + 1, Ok(vec![1])));
        assert!(trigger.deliver(id, Ok(vec![1, 2, 3])));
        assert_eq!(rx.recv().unwrap().unwrap(), vec![1, 2, 3]);

        assert_eq!(trigger.pending_request(), None);
        assert!(!trigger.deliver(id, Ok(vec![])));
    }

    #[test]
    fn test_new_request_fails_the_previous_one() {
        let trigger = PolledCaptureTrigger::new();
        let first = request(&trigger);
        let first_id = trigger.pending_request().unwrap();
        let _second = request(&trigger);

        assert!(first.recv().unwrap().is_err());
        assert_ne!(trigger.pending_request(), Some(first_id));
    }

    #[test]
    fn test_cancel() {
        let trigger = PolledCaptureTrigger::new();
        let rx = request(&trigger);
        trigger.cancel();
        assert_eq!(
            rx.recv().unwrap(),
            Err(GeotrailError::Capture("capture cancelled".into()))
        );
        assert_eq!(trigger.pending_request(), None);
    }
}
