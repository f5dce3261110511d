//! One-shot completion signals standing in for the source's `ready`/`finished`
//! promises (see "Promise-based ready/finished signals" in spec.md's design
//! notes). A `Completion` is the reader half; a `Settler` is the single
//! writer half. The first `settle()` call wins; every later one is a no-op,
//! which is what makes "settling after close" harmless.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Shared<T, E> {
    state: Mutex<Option<Result<T, E>>>,
    cv: Condvar,
}

/// The writable half of a one-shot signal. Cheap to clone; every clone
/// settles the same underlying signal (first write wins).
pub struct Settler<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Settler<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// The readable half of a one-shot signal. Cheap to clone; every clone
/// observes the same eventual result.
pub struct Completion<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Completion<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Creates a fresh, unsettled signal pair.
pub fn pair<T, E>() -> (Settler<T, E>, Completion<T, E>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(None),
        cv: Condvar::new(),
    });
    (
        Settler {
            shared: Arc::clone(&shared),
        },
        Completion { shared },
    )
}

impl<T: Clone, E: Clone> Settler<T, E> {
    /// Settles the signal with `result`. Returns `true` if this call is the
    /// one that settled it, `false` if it was already settled.
    pub fn settle(&self, result: Result<T, E>) -> bool {
        let mut guard = self.shared.state.lock().expect("completion poisoned");
        if guard.is_some() {
            return false;
        }
        *guard = Some(result);
        self.shared.cv.notify_all();
        true
    }
}

impl<T: Clone, E: Clone> Completion<T, E> {
    /// Blocks until settled, then returns a clone of the result.
    pub fn wait(&self) -> Result<T, E> {
        let guard = self.shared.state.lock().expect("completion poisoned");
        let guard = self
            .shared
            .cv
            .wait_while(guard, |state| state.is_none())
            .expect("completion poisoned");
        guard.clone().expect("completion settled under wait_while")
    }

    /// Blocks until settled or `timeout` elapses, whichever comes first.
    /// Does not cancel the underlying operation if it times out; a later
    /// `settle()` call is simply not observed by this particular wait.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, E>> {
        let guard = self.shared.state.lock().expect("completion poisoned");
        let (guard, _) = self
            .shared
            .cv
            .wait_timeout_while(guard, timeout, |state| state.is_none())
            .expect("completion poisoned");
        guard.clone()
    }

    /// Returns the result immediately if already settled, without blocking.
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.shared
            .state
            .lock()
            .expect("completion poisoned")
            .clone()
    }

    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }
}
