//! Generic pub/sub used by the logger, process unit, and supervisor event streams.
//!
//! Every "on_foo(listener) -> unsubscribe" contract in the spec is the same shape:
//! an ordered set of callbacks, fired in append order, with O(1) removal via a
//! token. This is that shape, written once and reused.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Callback<Args> = Arc<dyn Fn(Args) + Send + Sync>;

/// An ordered set of subscribers to a single event source.
pub struct Listeners<Args> {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback<Args>)>>,
}

impl<Args> Default for Listeners<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args> Listeners<Args> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Registers `callback`. The returned token removes it, exactly once, on
    /// `unsubscribe()` or `Drop`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(Args) + Send + Sync + 'static,
    ) -> SubscriptionToken<Args> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks
            .lock()
            .expect("listener registry poisoned")
            .push((id, Arc::new(callback)));
        SubscriptionToken {
            id,
            owner: Arc::downgrade(self),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Invokes every live subscriber with a clone of `args`, in subscription order.
    ///
    /// Callbacks run with the registry lock released, so a callback that itself
    /// subscribes or unsubscribes cannot deadlock against this call.
    pub fn emit(&self, args: Args)
    where
        Args: Clone,
    {
        let snapshot: Vec<Callback<Args>> = self
            .callbacks
            .lock()
            .expect("listener registry poisoned")
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in snapshot {
            cb(args.clone());
        }
    }

    /// Removes every registered callback. Used by `Logger::reset` and by unit
    /// teardown.
    pub fn clear(&self) {
        self.callbacks
            .lock()
            .expect("listener registry poisoned")
            .clear();
    }

    fn remove(&self, id: u64) {
        self.callbacks
            .lock()
            .expect("listener registry poisoned")
            .retain(|(cb_id, _)| *cb_id != id);
    }
}

/// Handle returned by `Listeners::subscribe`. Unsubscribing is idempotent and
/// safe to call after the owning registry has already been dropped.
pub struct SubscriptionToken<Args> {
    id: u64,
    owner: Weak<Listeners<Args>>,
    cancelled: Arc<AtomicBool>,
}

impl<Args> SubscriptionToken<Args> {
    /// Removes the associated callback. Calling this more than once, or after
    /// the registry is gone, has no effect.
    pub fn unsubscribe(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(listeners) = self.owner.upgrade() {
            listeners.remove(self.id);
        }
    }

    /// Detaches this token from its auto-unsubscribe-on-drop behavior, leaving
    /// the callback registered for the registry's lifetime.
    pub fn leak(self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl<Args> Drop for SubscriptionToken<Args> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
