//! Keyed registry of refresh callbacks.
//!
//! Components that render galleries or queue views register a callback
//! under a stable key; the poller invokes [`ObserverRegistry::notify_all`]
//! once new assets have been republished. The registry is constructed once
//! at startup and shared via `Arc`, so observers survive re-creations of
//! the consumers that registered them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// A registered refresh callback.
pub type ObserverFn = Arc<dyn Fn() + Send + Sync>;

/// Ordered list of refresh callbacks, keyed for idempotent registration.
///
/// Invariants:
/// - a key appears at most once; re-registering replaces the callback
///   in place without changing its position;
/// - `unregister` removes exactly one entry if the key is present;
/// - `notify_all` invokes callbacks in registration order and isolates
///   panics so one failing observer cannot starve the rest.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<(String, ObserverFn)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback under `key`.
    ///
    /// Idempotent: registering an already-present key replaces the stored
    /// callback instead of adding a second entry.
    pub fn register(&self, key: &str, callback: ObserverFn) {
        let mut observers = self.observers.lock().expect("observer lock poisoned");
        if let Some(slot) = observers.iter_mut().find(|(k, _)| k == key) {
            slot.1 = callback;
        } else {
            observers.push((key.to_string(), callback));
        }
    }

    /// Remove the callback registered under `key`, if any.
    pub fn unregister(&self, key: &str) {
        let mut observers = self.observers.lock().expect("observer lock poisoned");
        observers.retain(|(k, _)| k != key);
    }

    /// Number of currently registered observers.
    pub fn len(&self) -> usize {
        self.observers.lock().expect("observer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every registered callback in registration order.
    ///
    /// The observer list is cloned before invocation so callbacks may
    /// register or unregister observers without deadlocking. A panicking
    /// observer is logged and skipped; the remaining observers still run.
    pub fn notify_all(&self) {
        let snapshot: Vec<(String, ObserverFn)> = {
            let observers = self.observers.lock().expect("observer lock poisoned");
            observers.clone()
        };

        for (key, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                tracing::warn!(observer = %key, "Observer callback panicked during notify");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_observer(counter: Arc<AtomicUsize>) -> ObserverFn {
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn duplicate_registration_fires_once() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        registry.register("gallery", counting_observer(Arc::clone(&count)));
        registry.register("gallery", counting_observer(Arc::clone(&count)));
        assert_eq!(registry.len(), 1);

        registry.notify_all();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_removes_exactly_one() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        registry.register("a", counting_observer(Arc::clone(&count)));
        registry.register("b", counting_observer(Arc::clone(&count)));
        registry.unregister("a");
        assert_eq!(registry.len(), 1);

        registry.notify_all();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Unregistering an absent key is a no-op.
        registry.unregister("a");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn panicking_observer_does_not_starve_others() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        registry.register("broken", Arc::new(|| panic!("observer bug")));
        registry.register("healthy", counting_observer(Arc::clone(&count)));

        registry.notify_all();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notify_with_no_observers_is_a_noop() {
        let registry = ObserverRegistry::new();
        registry.notify_all();
        assert!(registry.is_empty());
    }
}
