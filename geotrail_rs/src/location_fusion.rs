// location_fusion.rs - Arbitration between independent location providers
//
// Three provider slots (gps, network, passive) each hold the best fix seen
// from that provider. The comparison rules are pure functions so they can be
// tested without any provider attached; notification is a plain synchronous
// broadcast to whoever subscribed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::debug;

use crate::types::{Fix, LocationSource};

// ─── Comparison rules ────────────────────────────────────────────────────────

/// A fix this much newer than the incumbent wins regardless of accuracy
pub const SIGNIFICANT_AGE_MS: i64 = 2 * 60 * 1000;

/// Accuracy loss still tolerated for a newer fix from the same provider
pub const SIGNIFICANT_ACCURACY_LOSS_M: f64 = 200.0;

/// Decide whether `candidate` should replace `incumbent` within one provider slot.
pub fn is_better(candidate: Option<&Fix>, incumbent: Option<&Fix>) -> bool {
    let incumbent = match incumbent {
        None => return true,
        Some(fix) => fix,
    };
    let candidate = match candidate {
        None => return false,
        Some(fix) => fix,
    };

    let time_delta = candidate.timestamp_ms - incumbent.timestamp_ms;
    if time_delta > SIGNIFICANT_AGE_MS {
        // Incumbent is stale, the device has likely moved
        return true;
    }
    if time_delta < -SIGNIFICANT_AGE_MS {
        return false;
    }

    let accuracy_delta = candidate.accuracy - incumbent.accuracy;
    let is_newer = time_delta > 0;

    if accuracy_delta < 0.0 {
        return true;
    }
    if is_newer && accuracy_delta <= 0.0 {
        return true;
    }
    is_newer
        && accuracy_delta <= SIGNIFICANT_ACCURACY_LOSS_M
        && candidate.source == incumbent.source
}

/// Compare fixes from two different provider slots.
///
/// Only the accuracy/recency clauses apply here: the staleness window and the
/// same-provider allowance are properties of a single slot.
pub fn is_better_across_sources(candidate: Option<&Fix>, incumbent: Option<&Fix>) -> bool {
    let incumbent = match incumbent {
        None => return true,
        Some(fix) => fix,
    };
    let candidate = match candidate {
        None => return false,
        Some(fix) => fix,
    };

    let accuracy_delta = candidate.accuracy - incumbent.accuracy;
    let is_newer = candidate.timestamp_ms > incumbent.timestamp_ms;

    accuracy_delta < 0.0 || (is_newer && accuracy_delta <= 0.0)
}

/// Pairwise reduction over the provider slots in gps, network, passive order
pub fn select_best<'a>(slots: &'a [Option<Fix>; 3]) -> Option<&'a Fix> {
    let mut best = slots[0].as_ref();
    for challenger in slots[1..].iter().map(Option::as_ref) {
        if !is_better_across_sources(best, challenger) {
            best = challenger;
        }
    }
    best
}

// ─── Observer fan-out ────────────────────────────────────────────────────────

/// Receives the overall best fix after every accepted update
pub type LocationObserver = Arc<dyn Fn(Option<&Fix>) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ─── Fusion ──────────────────────────────────────────────────────────────────

pub struct LocationFusion {
    slots: RwLock<[Option<Fix>; 3]>,
    observers: Mutex<Vec<(SubscriptionId, LocationObserver)>>,
    next_id: AtomicU64,
}

impl LocationFusion {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new([None, None, None]),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seed the slots with last-known fixes (no notification)
    pub fn with_last_known(fixes: impl IntoIterator<Item = Fix>) -> Self {
        let fusion = Self::new();
        {
            let mut slots = fusion.slots.write().unwrap_or_else(PoisonError::into_inner);
            for fix in fixes {
                let slot = &mut slots[fix.source.index()];
                if is_better(Some(&fix), slot.as_ref()) {
                    *slot = Some(fix);
                }
            }
        }
        fusion
    }

    /// Offer a fix to its provider slot.
    ///
    /// Returns `true` when the fix replaced the slot content; subscribers are
    /// then notified with the current overall best fix.
    pub fn update(&self, fix: Fix) -> bool {
        let source = fix.source;
        let best = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            let slot = &mut slots[source.index()];
            if !is_better(Some(&fix), slot.as_ref()) {
                debug!(
                    "[fusion] {} fix rejected (accuracy {:.1} m, t={})",
                    source, fix.accuracy, fix.timestamp_ms
                );
                return false;
            }
            *slot = Some(fix);
            select_best(&slots).cloned()
        };

        self.notify(best.as_ref());
        true
    }

    /// Best fix across all provider slots, `None` when no provider has reported
    pub fn best_fix(&self) -> Option<Fix> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        select_best(&slots).cloned()
    }

    /// Fix currently held for one provider
    pub fn fix_for(&self, source: LocationSource) -> Option<Fix> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots[source.index()].clone()
    }

    pub fn subscribe(&self, observer: LocationObserver) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Returns `false` if the subscription was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, best: Option<&Fix>) {
        // Snapshot so observers may (un)subscribe from inside the callback
        let observers: Vec<LocationObserver> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(best);
        }
    }
}

impl Default for LocationFusion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fix(source: LocationSource, accuracy: f64, timestamp_ms: i64) -> Fix {
        Fix::new(source, 48.85, 2.35, 35.0, accuracy, 0.0, timestamp_ms)
    }

    #[test]
    fn test_is_better_null_handling() {
        let a = fix(LocationSource::Gps, 10.0, 0);
        assert!(is_better(Some(&a), None));
        assert!(is_better(None, None));
        assert!(!is_better(None, Some(&a)));
    }

    #[test]
    fn test_is_better_is_irreflexive() {
        let a = fix(LocationSource::Gps, 10.0, 1_000);
        assert!(!is_better(Some(&a), Some(&a.clone())));
    }

    #[test]
    fn test_significantly_newer_always_wins() {
        let incumbent = fix(LocationSource::Gps, 3.0, 0);
        let candidate = fix(LocationSource::Gps, 5_000.0, SIGNIFICANT_AGE_MS + 1);
        assert!(is_better(Some(&candidate), Some(&incumbent)));

        let other_source = fix(LocationSource::Passive, 5_000.0, 120_001);
        assert!(is_better(Some(&other_source), Some(&incumbent)));
    }

    #[test]
    fn test_significantly_older_always_loses() {
        let incumbent = fix(LocationSource::Gps, 500.0, SIGNIFICANT_AGE_MS + 1);
        let candidate = fix(LocationSource::Gps, 1.0, 0);
        assert!(!is_better(Some(&candidate), Some(&incumbent)));
    }

    #[test]
    fn test_accuracy_and_recency_rules() {
        let incumbent = fix(LocationSource::Gps, 20.0, 10_000);

        // More accurate but slightly older
        assert!(is_better(Some(&fix(LocationSource::Gps, 10.0, 5_000)), Some(&incumbent)));
        // Newer and equally accurate
        assert!(is_better(Some(&fix(LocationSource::Gps, 20.0, 11_000)), Some(&incumbent)));
        // Newer, less accurate within tolerance, same provider
        assert!(is_better(Some(&fix(LocationSource::Gps, 220.0, 11_000)), Some(&incumbent)));
        // Newer, beyond tolerance
        assert!(!is_better(Some(&fix(LocationSource::Gps, 220.5, 11_000)), Some(&incumbent)));
        // Newer, less accurate, different provider
        assert!(!is_better(Some(&fix(LocationSource::Network, 25.0, 11_000)), Some(&incumbent)));
        // Older and less accurate
        assert!(!is_better(Some(&fix(LocationSource::Gps, 25.0, 9_000)), Some(&incumbent)));
    }

    #[test]
    fn test_best_fix_prefers_most_accurate() {
        let fusion = LocationFusion::new();
        fusion.update(fix(LocationSource::Gps, 20.0, 1_000));
        fusion.update(fix(LocationSource::Network, 5.0, 1_000));
        fusion.update(fix(LocationSource::Passive, 50.0, 1_000));

        let best = fusion.best_fix().unwrap();
        assert_eq!(best.source, LocationSource::Network);
        assert_eq!(best.accuracy, 5.0);
    }

    #[test]
    fn test_best_fix_empty() {
        let fusion = LocationFusion::new();
        assert!(fusion.best_fix().is_none());
    }

    #[test]
    fn test_best_fix_with_gaps() {
        let slots = [None, None, Some(fix(LocationSource::Passive, 80.0, 0))];
        assert_eq!(select_best(&slots).unwrap().source, LocationSource::Passive);

        let slots = [Some(fix(LocationSource::Gps, 8.0, 0)), None, None];
        assert_eq!(select_best(&slots).unwrap().source, LocationSource::Gps);
    }

    #[test]
    fn test_cross_source_prefers_newer_at_equal_accuracy() {
        let slots = [
            Some(fix(LocationSource::Gps, 10.0, 1_000)),
            Some(fix(LocationSource::Network, 10.0, 2_000)),
            None,
        ];
        assert_eq!(select_best(&slots).unwrap().source, LocationSource::Network);
    }

    #[test]
    fn test_slot_never_regresses() {
        let fusion = LocationFusion::new();
        assert!(fusion.update(fix(LocationSource::Gps, 5.0, 10_000)));
        // Older and worse: rejected
        assert!(!fusion.update(fix(LocationSource::Gps, 30.0, 9_000)));
        assert_eq!(fusion.fix_for(LocationSource::Gps).unwrap().accuracy, 5.0);
    }

    #[test]
    fn test_observers_receive_best_fix() {
        let fusion = LocationFusion::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let calls_clone = Arc::clone(&calls);
        let seen_clone = Arc::clone(&seen);
        let id = fusion.subscribe(Arc::new(move |best: Option<&Fix>| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            seen_clone.lock().unwrap().push(best.map(|f| f.source));
        }));

        fusion.update(fix(LocationSource::Network, 5.0, 1_000));
        fusion.update(fix(LocationSource::Gps, 20.0, 1_000));
        // Rejected update does not notify
        fusion.update(fix(LocationSource::Gps, 40.0, 500));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(LocationSource::Network), Some(LocationSource::Network)]
        );

        assert!(fusion.unsubscribe(id));
        assert!(!fusion.unsubscribe(id));
        fusion.update(fix(LocationSource::Passive, 1.0, 2_000));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_last_known_seed() {
        let fusion = LocationFusion::with_last_known(vec![
            fix(LocationSource::Gps, 12.0, 0),
            fix(LocationSource::Passive, 3.0, 0),
        ]);
        assert_eq!(fusion.best_fix().unwrap().source, LocationSource::Passive);
        assert_eq!(fusion.observer_count(), 0);
    }
}
