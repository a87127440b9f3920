use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Core<T> {
    subscribers: RwLock<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
    // Keeps upstream subscriptions alive for derived streams (map/filter/merge).
    upstream: Mutex<Vec<Subscription>>,
}

impl<T> Core<T> {
    fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            upstream: Mutex::new(Vec::new()),
        }
    }
}

/// A hot push-based stream of values.
///
/// Subscribers receive every value emitted after they subscribe; there is no
/// replay. Dropping the returned [`Subscription`] unsubscribes.
pub struct Observable<T> {
    core: Arc<Core<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Observable<T> {
    pub fn new() -> Self {
        Self {
            core: Arc::new(Core::new()),
        }
    }

    /// Subscribe to values. The guard unsubscribes on drop.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.core.next_id.fetch_add(1, Ordering::SeqCst);
        self.core
            .subscribers
            .write()
            .unwrap()
            .push((id, Arc::new(callback)));

        // The guard keeps the source alive: a derived or gated stream stays
        // wired up for as long as someone holds its subscription.
        let core = Arc::clone(&self.core);
        Subscription::new(move || {
            core.subscribers
                .write()
                .unwrap()
                .retain(|(sid, _)| *sid != id);
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.subscribers.read().unwrap().len()
    }

    /// Whether anyone is listening. Producers use this for lazy activation:
    /// while a stream is inactive, events delivered to it are dropped.
    pub fn is_active(&self) -> bool {
        self.subscriber_count() > 0
    }

    pub(crate) fn emit(&self, value: &T) {
        // Snapshot the subscriber list so callbacks can subscribe/unsubscribe
        // without deadlocking on the lock.
        let subscribers: Vec<Callback<T>> = self
            .core
            .subscribers
            .read()
            .unwrap()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in subscribers {
            callback(value);
        }
    }

    pub(crate) fn retain_upstream(&self, subscription: Subscription) {
        self.core.upstream.lock().unwrap().push(subscription);
    }

    /// Derive a stream by applying a function to every value.
    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let out = Observable::new();
        let weak = Arc::downgrade(&out.core);
        let sub = self.subscribe(move |value| {
            if let Some(core) = weak.upgrade() {
                Observable { core }.emit(&f(value));
            }
        });
        out.retain_upstream(sub);
        out
    }

    /// Derive a stream keeping only values matching the predicate.
    pub fn filter<F>(&self, predicate: F) -> Observable<T>
    where
        T: Clone,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let out = Observable::new();
        let weak = Arc::downgrade(&out.core);
        let sub = self.subscribe(move |value| {
            if predicate(value) {
                if let Some(core) = weak.upgrade() {
                    Observable { core }.emit(value);
                }
            }
        });
        out.retain_upstream(sub);
        out
    }

    /// Merge this stream with another into one stream of both.
    pub fn merge(&self, other: &Observable<T>) -> Observable<T> {
        let out = Observable::new();

        let weak = Arc::downgrade(&out.core);
        let sub_a = self.subscribe(move |value| {
            if let Some(core) = weak.upgrade() {
                Observable { core }.emit(value);
            }
        });

        let weak = Arc::downgrade(&out.core);
        let sub_b = other.subscribe(move |value| {
            if let Some(core) = weak.upgrade() {
                Observable { core }.emit(value);
            }
        });

        out.retain_upstream(sub_a);
        out.retain_upstream(sub_b);
        out
    }
}

/// A stream with a remembered last value.
///
/// `subscribe` delivers the current value immediately and every change
/// afterwards; `changes` exposes the raw change stream without the initial
/// delivery.
pub struct Property<T> {
    current: Arc<RwLock<T>>,
    stream: Observable<T>,
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
            stream: self.stream.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
            stream: Observable::new(),
        }
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.current.read().unwrap().clone()
    }

    /// Subscribe; the callback is called immediately with the current value.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        // Clone before calling so a re-entrant `set` cannot deadlock.
        let current = self.get();
        callback(&current);
        self.stream.subscribe(callback)
    }

    /// The change stream, without the initial delivery.
    pub fn changes(&self) -> Observable<T> {
        self.stream.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.stream.subscriber_count()
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_active()
    }

    pub(crate) fn set(&self, value: T) {
        *self.current.write().unwrap() = value.clone();
        self.stream.emit(&value);
    }
}

/// RAII guard for a subscription. Unsubscribes on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe explicitly.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emits_to_subscribers() {
        let stream: Observable<i32> = Observable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _sub = stream.subscribe(move |v| seen_clone.lock().unwrap().push(*v));

        stream.emit(&1);
        stream.emit(&2);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let stream: Observable<i32> = Observable::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = Arc::clone(&count);
        let sub = stream.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        stream.emit(&1);
        drop(sub);
        stream.emit(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!stream.is_active());
    }

    #[test]
    fn map_derives_values() {
        let stream: Observable<i32> = Observable::new();
        let doubled = stream.map(|v| v * 2);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = doubled.subscribe(move |v| seen_clone.lock().unwrap().push(*v));

        stream.emit(&3);
        assert_eq!(*seen.lock().unwrap(), vec![6]);
    }

    #[test]
    fn merge_combines_streams() {
        let a: Observable<i32> = Observable::new();
        let b: Observable<i32> = Observable::new();
        let merged = a.merge(&b);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = merged.subscribe(move |v| seen_clone.lock().unwrap().push(*v));

        a.emit(&1);
        b.emit(&2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn property_remembers_last_value() {
        let property = Property::new(0);
        assert_eq!(property.get(), 0);

        property.set(5);
        assert_eq!(property.get(), 5);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = property.subscribe(move |v| seen_clone.lock().unwrap().push(*v));

        property.set(7);
        // Immediate delivery of the current value, then the change.
        assert_eq!(*seen.lock().unwrap(), vec![5, 7]);
    }

    #[test]
    fn property_changes_skip_current() {
        let property = Property::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = property
            .changes()
            .subscribe(move |v| seen_clone.lock().unwrap().push(*v));

        property.set(2);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }
}
