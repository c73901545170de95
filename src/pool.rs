use std::sync::Mutex;

/// A LIFO free-list of reusable values.
///
/// The dispatcher keeps one of these for request contexts: last-in-first-out
/// reuse keeps recently-used values (and their warmed buffers) in rotation.
/// Acquire and release are safe from concurrent request tasks.
pub(crate) struct Pool<T> {
    free: Mutex<Vec<T>>,
}

impl<T> Pool<T> {
    pub(crate) fn new() -> Self {
        Pool {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Takes the most recently released value, or constructs a fresh one.
    pub(crate) fn get<F: FnOnce() -> T>(&self, make: F) -> T {
        let taken = self.free.lock().expect("pool poisoned").pop();
        taken.unwrap_or_else(make)
    }

    /// Returns a value to the pool.  The caller resets it first.
    pub(crate) fn put(&self, value: T) {
        self.free.lock().expect("pool poisoned").push(value);
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.free.lock().expect("pool poisoned").len()
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("free", &self.free.lock().map(|v| v.len()).unwrap_or(0))
            .finish()
    }
}
