use std::sync::{Arc, Mutex};

type SettleCallback<T> = Box<dyn FnOnce(Result<T, String>) + Send>;

enum State<T> {
    Pending(Vec<SettleCallback<T>>),
    Settled(Result<T, String>),
}

/// A single-assignment deferred value, the vehicle for asynchronous
/// validators: the validator hands back the promise and keeps the
/// [`Resolver`], settling it whenever its work completes.
///
/// Settling synchronously invokes every registered callback on the
/// resolver's thread; a rejection carries a plain string.
pub struct Promise<T> {
    inner: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Create a pending promise and the handle that settles it.
    pub fn new() -> (Promise<T>, Resolver<T>) {
        let inner = Arc::new(Mutex::new(State::Pending(Vec::new())));
        (
            Promise {
                inner: Arc::clone(&inner),
            },
            Resolver { inner },
        )
    }

    /// An already-resolved promise.
    pub fn resolved(value: T) -> Promise<T> {
        Promise {
            inner: Arc::new(Mutex::new(State::Settled(Ok(value)))),
        }
    }

    /// An already-rejected promise.
    pub fn rejected(error: impl Into<String>) -> Promise<T> {
        Promise {
            inner: Arc::new(Mutex::new(State::Settled(Err(error.into())))),
        }
    }

    /// Register a callback for the settled result. Fires immediately if the
    /// promise has already settled.
    pub fn on_settle(&self, callback: impl FnOnce(Result<T, String>) + Send + 'static) {
        let mut state = self.inner.lock().unwrap();
        match &mut *state {
            State::Pending(callbacks) => callbacks.push(Box::new(callback)),
            State::Settled(result) => {
                let result = result.clone();
                drop(state);
                callback(result);
            }
        }
    }
}

/// The write half of a [`Promise`]. Consumed on settle; settling twice is
/// impossible by construction, and a resolver dropped unsettled leaves the
/// promise pending forever, like an abandoned callback.
pub struct Resolver<T> {
    inner: Arc<Mutex<State<T>>>,
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, error: impl Into<String>) {
        self.settle(Err(error.into()));
    }

    fn settle(self, result: Result<T, String>) {
        let callbacks = {
            let mut state = self.inner.lock().unwrap();
            if matches!(&*state, State::Settled(_)) {
                return;
            }
            match std::mem::replace(&mut *state, State::Settled(result.clone())) {
                State::Pending(callbacks) => callbacks,
                State::Settled(_) => Vec::new(),
            }
        };

        for callback in callbacks {
            callback(result.clone());
        }
    }
}
