use super::Observable;

/// An observable with an emit handle: the bus that drives handlers and
/// external event sources into a store.
pub struct Subject<T> {
    stream: Observable<T>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            stream: Observable::new(),
        }
    }

    /// Push a value to all current subscribers.
    pub fn emit(&self, value: T) {
        self.stream.emit(&value);
    }

    /// The read side of the subject.
    pub fn observable(&self) -> Observable<T> {
        self.stream.clone()
    }
}
