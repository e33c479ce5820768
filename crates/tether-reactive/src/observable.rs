#![forbid(unsafe_code)]

//! Observable value wrapper with change notification and version tracking.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value of type `T` in shared, reference-counted
//! storage (`Rc<RefCell<..>>`). When the value changes (determined by
//! `PartialEq`), all live subscribers are notified in registration order.
//! Notifications are routed through the observable's [`Dispatcher`], so an
//! open change block defers them.
//!
//! # Performance
//!
//! | Operation    | Complexity               |
//! |-------------|--------------------------|
//! | `get()`     | O(1)                     |
//! | `set()`     | O(S) where S = subscribers |
//! | `subscribe()` | O(1) amortized          |
//!
//! # Failure Modes
//!
//! - **Re-entrant set**: callbacks run after the internal borrow is released,
//!   so a subscriber may set this or any other observable. Cycles between
//!   observables are the caller's responsibility (see
//!   [`TwoWayBinding`](crate::TwoWayBinding) for a guarded mirror).
//! - **Subscriber leak**: If `Subscription` guards are stored indefinitely
//!   without being dropped, callbacks accumulate. Dead weak references are
//!   cleaned lazily during notification.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::batch::Dispatcher;

/// A subscriber callback stored as a strong `Rc` internally, handed out
/// as `Weak` to the observable.
type CallbackRc<T> = Rc<dyn Fn(&T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T)>;

/// Shared interior for [`Observable<T>`].
struct ObservableInner<T> {
    value: T,
    version: u64,
    /// Subscribers stored as weak references. Dead entries are pruned on notify.
    subscribers: Vec<CallbackWeak<T>>,
    /// Write-through links. They run synchronously on every write, even
    /// inside a change block.
    links: Vec<CallbackWeak<T>>,
}

/// A shared, version-tracked value with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** inner state:
/// both handles see the same value and share subscribers.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each value-changing mutation.
/// 2. `set(v)` where `v == current` is a no-op.
/// 3. `set_forced(v)` and `dispatch_change()` always notify.
/// 4. Subscribers are notified in registration order.
/// 5. Dead subscribers (dropped [`Subscription`] guards) are pruned lazily.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
    dispatcher: Dispatcher,
}

// Manual Clone: shares the same Rc.
impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a new observable with the given initial value and a private
    /// dispatcher of its own.
    ///
    /// The initial version is 0 and no subscribers are registered.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_dispatcher(&Dispatcher::new(), value)
    }

    /// Create a new observable that dispatches through `dispatcher`.
    #[must_use]
    pub fn with_dispatcher(dispatcher: &Dispatcher, value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
                links: Vec::new(),
            })),
            dispatcher: dispatcher.clone(),
        }
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// The closure `f` receives an immutable reference to the value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Set a new value. If the new value differs from the current value
    /// (by `PartialEq`), the version is incremented and all live subscribers
    /// are notified.
    pub fn set(&self, value: T) {
        if self.store(value, false) {
            self.propagate();
            self.notify();
        }
    }

    /// Set a new value and notify subscribers even when it equals the
    /// current value. The version only moves if the value changed.
    pub fn set_forced(&self, value: T) {
        self.store(value, true);
        self.propagate();
        self.notify();
    }

    /// Notify subscribers with the current value, regardless of whether
    /// anything changed.
    pub fn dispatch_change(&self) {
        self.propagate();
        self.notify();
    }

    /// Modify the value in place via a closure. If the value changes
    /// (compared by `PartialEq` against a snapshot), the version is
    /// incremented and subscribers are notified.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.value.clone();
            f(&mut inner.value);
            if inner.value != old {
                inner.version += 1;
                true
            } else {
                false
            }
        };
        if changed {
            self.propagate();
            self.notify();
        }
    }

    /// Subscribe to value changes. The callback is invoked with a reference
    /// to the new value each time it changes.
    ///
    /// Returns a [`Subscription`] guard. Dropping the guard unsubscribes
    /// the callback (it will not be called after drop, though it may still
    /// be in the subscriber list until the next notification prunes it).
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        let weak = Rc::downgrade(&strong);
        self.inner.borrow_mut().subscribers.push(weak);
        // Wrap in a holder struct that can be type-erased as `dyn Any`,
        // since `Rc<dyn Fn(&T)>` itself cannot directly coerce to `Rc<dyn Any>`.
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Register a write-through link. `callback` receives the new value
    /// synchronously on every write, before subscribers are dispatched and
    /// regardless of open change blocks.
    pub(crate) fn link(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        self.inner.borrow_mut().links.push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Store `value` arriving over a link and pass it on to this
    /// observable's own links. Subscriber dispatch is left to the caller.
    pub(crate) fn write_through(&self, value: T) {
        self.store(value, true);
        self.propagate();
    }

    /// Forget every registered subscriber. Outstanding [`Subscription`]
    /// guards stay valid but their callbacks are no longer reachable.
    pub fn clear_subscribers(&self) {
        self.inner.borrow_mut().subscribers.clear();
    }

    /// Current version number. Increments by 1 on each value-changing
    /// mutation. Useful for dirty-checking in render loops.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of currently registered subscribers (including dead ones
    /// not yet pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// The dispatcher notifications are routed through.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Whether two handles share the same inner state.
    #[must_use]
    pub fn ptr_eq(&self, other: &Observable<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Replace the value. Returns whether subscribers should hear about it:
    /// always when `forced`, otherwise only if the value changed.
    fn store(&self, value: T, forced: bool) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.value == value {
            return forced;
        }
        inner.value = value;
        inner.version += 1;
        true
    }

    fn propagate(&self) {
        let links: Vec<CallbackRc<T>> = {
            let mut inner = self.inner.borrow_mut();
            inner.links.retain(|w| w.strong_count() > 0);
            inner.links.iter().filter_map(|w| w.upgrade()).collect()
        };
        if links.is_empty() {
            return;
        }
        let value = self.get();
        for link in &links {
            link(&value);
        }
    }

    pub(crate) fn notify(&self) {
        let this = self.clone();
        self.dispatcher.dispatch(move || this.notify_now());
    }

    /// Notify live subscribers and prune dead ones.
    fn notify_now(&self) {
        // Collect live callbacks first (to avoid holding the borrow during calls).
        let callbacks: Vec<CallbackRc<T>> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner
                .subscribers
                .iter()
                .filter_map(|w| w.upgrade())
                .collect()
        };

        // Now call each callback outside the borrow.
        let value = self.inner.borrow().value.clone();
        for cb in &callbacks {
            cb(&value);
        }
    }
}

/// RAII guard for a subscriber callback.
///
/// Dropping the `Subscription` causes the associated callback to become
/// unreachable (the strong `Rc` is dropped, so the `Weak` in the
/// observable's subscriber list will fail to upgrade on the next
/// notification cycle).
pub struct Subscription {
    /// Type-erased strong reference keeping the callback `Rc` alive.
    _guard: Box<dyn std::any::Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
