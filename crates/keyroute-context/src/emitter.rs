//! Change notification emitter
//!
//! Listeners run synchronously inside [`Emitter::fire`]. A fire issued while
//! listeners are already running (for example a listener that mutates a
//! context key) is queued and delivered by the outermost call once the
//! current event has reached every listener.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct EmitterInner<T> {
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    queue: Mutex<VecDeque<T>>,
    delivering: AtomicBool,
    next_id: AtomicU64,
}

/// A multi-listener event source
pub struct Emitter<T> {
    inner: Arc<EmitterInner<T>>,
}

impl<T: Send + 'static> Emitter<T> {
    pub fn new() -> Self {
        Emitter {
            inner: Arc::new(EmitterInner {
                listeners: Mutex::new(Vec::new()),
                queue: Mutex::new(VecDeque::new()),
                delivering: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// subscription is dropped.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));

        let weak: Weak<EmitterInner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.lock().retain(|(other, _)| *other != id);
                }
            })),
        }
    }

    pub fn fire(&self, event: T) {
        self.inner.queue.lock().push_back(event);
        if self.inner.delivering.swap(true, Ordering::AcqRel) {
            return;
        }

        loop {
            {
                let _guard = DeliveringGuard(&self.inner.delivering);
                while let Some(event) = self.next_event() {
                    let listeners: Vec<Listener<T>> = self
                        .inner
                        .listeners
                        .lock()
                        .iter()
                        .map(|(_, listener)| Arc::clone(listener))
                        .collect();
                    for listener in listeners {
                        listener(&event);
                    }
                }
            }
            // An event queued between draining and releasing the flag would be stranded
            if self.inner.queue.lock().is_empty()
                || self.inner.delivering.swap(true, Ordering::AcqRel)
            {
                break;
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn next_event(&self) -> Option<T> {
        self.inner.queue.lock().pop_front()
    }
}

impl<T: Send + 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Emitter {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct DeliveringGuard<'a>(&'a AtomicBool);

impl Drop for DeliveringGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle for a registered listener; dropping it unsubscribes
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Keep the listener registered for the lifetime of the emitter
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_reaches_all_listeners() {
        let emitter: Emitter<u32> = Emitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = {
            let seen = Arc::clone(&seen);
            emitter.subscribe(move |e| seen.lock().push(("first", *e)))
        };
        let s2 = {
            let seen = Arc::clone(&seen);
            emitter.subscribe(move |e| seen.lock().push(("second", *e)))
        };

        emitter.fire(7);
        assert_eq!(*seen.lock(), vec![("first", 7), ("second", 7)]);
        drop((s1, s2));
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let emitter: Emitter<u32> = Emitter::new();
        let count = Arc::new(AtomicU64::new(0));

        let subscription = {
            let count = Arc::clone(&count);
            emitter.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        emitter.fire(1);
        drop(subscription);
        emitter.fire(2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_nested_fire_is_queued() {
        let emitter: Emitter<u32> = Emitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        {
            let order = Arc::clone(&order);
            let nested = emitter.clone();
            emitter
                .subscribe(move |e| {
                    order.lock().push(format!("a{}", e));
                    if *e == 1 {
                        nested.fire(2);
                    }
                })
                .detach();
        }
        {
            let order = Arc::clone(&order);
            emitter
                .subscribe(move |e| order.lock().push(format!("b{}", e)))
                .detach();
        }

        emitter.fire(1);

        // event 2 is delivered only after event 1 reached every listener
        assert_eq!(*order.lock(), vec!["a1", "b1", "a2", "b2"]);
    }
}
