//! State-change observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::core::wand::WandState;

type Callback = Arc<dyn Fn(&WandState) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

/// Ordered list of callbacks that receive every new [`WandState`].
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    inner: Arc<Registry>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback. Registering the same function twice gives two independent entries.
    pub fn register<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&WandState) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        CallbackHandle {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Calls every callback in registration order.
    ///
    /// The list is snapshotted first, so a callback may unregister itself or others.
    pub fn fire(&self, state: &WandState) {
        let callbacks: Vec<Callback> = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(state);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Returned by [`CallbackRegistry::register`]; removes that one registration.
///
/// Dropping the handle keeps the callback registered.
#[must_use = "dropping the handle makes the callback impossible to unregister"]
pub struct CallbackHandle {
    registry: Weak<Registry>,
    id: u64,
}

impl CallbackHandle {
    pub fn unregister(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_calls_in_registration_order() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        let _a = registry.register(move |_| first.lock().unwrap().push("first"));
        let second = seen.clone();
        let _b = registry.register(move |_| second.lock().unwrap().push("second"));

        registry.fire(&WandState::default());

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_unregister_removes_only_that_entry() {
        let registry = CallbackRegistry::new();
        let count = Arc::new(AtomicU64::new(0));

        let callback = {
            let count = count.clone();
            move |_: &WandState| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };
        let a = registry.register(callback.clone());
        let _b = registry.register(callback);
        assert_eq!(registry.len(), 2);

        a.unregister();
        registry.fire(&WandState::default());

        assert_eq!(registry.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_after_registry_dropped_is_noop() {
        let registry = CallbackRegistry::new();
        let handle = registry.register(|_| {});
        drop(registry);
        handle.unregister();
    }
}
