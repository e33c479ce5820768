#![forbid(unsafe_code)]

//! Observers: handles that bind to an ancestor's observable by name.
//!
//! An [`Observer<T>`] owns no shared value of its own. [`connect`] resolves
//! an [`Observable<T>`] through a [`ScopeChain`]; reads and writes then go
//! to that observable, so every observer bound to the same name shares one
//! value. When resolution fails the observer stays disconnected and works
//! against a private fallback observable seeded with its default: reads
//! return the default, writes stay local.
//!
//! [`connect`]: Observer::connect
//!
//! # Lifecycle
//!
//! ```text
//! new ──connect──▶ bound ──start_observing──▶ observing
//!                    ▲                            │
//!                    └──────── stop_observing ────┘
//! any state ──disconnect──▶ unbound (fallback, no callback)
//! ```
//!
//! # Invariants
//!
//! 1. `start_observing` never registers the callback twice.
//! 2. After `disconnect`, source changes produce zero callback invocations.
//! 3. A [`SignalObserver`] never invokes its callback on `start_observing`.

use std::cell::RefCell;
use std::rc::Rc;

use tether_reactive::{Dispatcher, Observable, Subscription};

use crate::error::BindError;
use crate::scope::ScopeChain;

pub(crate) type Callback<T> = Rc<dyn Fn(&T)>;

struct ObserverState<T> {
    default: T,
    source: Observable<T>,
    connected: bool,
    name: Option<String>,
    source_path: Option<String>,
    callback: Option<Callback<T>>,
    subscription: Option<Subscription>,
}

/// A read/write handle bound to an ancestor's observable.
///
/// Cloning shares the binding: the component keeps one handle and the
/// tree's declaration machinery keeps another.
pub struct Observer<T: Clone + PartialEq + 'static> {
    state: Rc<RefCell<ObserverState<T>>>,
}

impl<T: Clone + PartialEq + 'static> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Clone + PartialEq + Default + 'static> Default for Observer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + std::fmt::Debug + 'static> std::fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Observer")
            .field("name", &state.name)
            .field("connected", &state.connected)
            .field("source", &state.source_path)
            .field("value", &state.source.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observer<T> {
    /// Create an unbound observer whose fallback value is `default`.
    ///
    /// The fallback gets a private [`Dispatcher`], so until the first
    /// [`connect`](Self::connect) writes to this observer are not covered
    /// by the tree's change blocks. Use
    /// [`with_dispatcher`](Self::with_dispatcher) when they must be.
    #[must_use]
    pub fn new(default: T) -> Self {
        Self::with_dispatcher(&Dispatcher::new(), default)
    }

    /// Create an unbound observer whose fallback dispatches through
    /// `dispatcher`, typically the tree's.
    #[must_use]
    pub fn with_dispatcher(dispatcher: &Dispatcher, default: T) -> Self {
        let source = Observable::with_dispatcher(dispatcher, default.clone());
        Self {
            state: Rc::new(RefCell::new(ObserverState {
                default,
                source,
                connected: false,
                name: None,
                source_path: None,
                callback: None,
                subscription: None,
            })),
        }
    }

    /// Bind to the nearest observable named `name` in `scope`, without a
    /// change callback.
    pub fn connect(&self, scope: &ScopeChain, name: &str) -> Result<(), BindError> {
        self.connect_inner(scope, name, None)
    }

    /// Bind to the nearest observable named `name` in `scope` and remember
    /// `callback` for [`start_observing`](Self::start_observing).
    pub fn connect_with(
        &self,
        scope: &ScopeChain,
        name: &str,
        callback: impl Fn(&T) + 'static,
    ) -> Result<(), BindError> {
        self.connect_inner(scope, name, Some(Rc::new(callback)))
    }

    pub(crate) fn connect_inner(
        &self,
        scope: &ScopeChain,
        name: &str,
        callback: Option<Callback<T>>,
    ) -> Result<(), BindError> {
        self.attach(scope, name, callback).inspect_err(BindError::emit)
    }

    /// Resolve and bind without logging the failure.
    pub(crate) fn attach(
        &self,
        scope: &ScopeChain,
        name: &str,
        callback: Option<Callback<T>>,
    ) -> Result<(), BindError> {
        self.disconnect();

        let result = scope.resolve::<T>(name);
        let mut state = self.state.borrow_mut();
        state.name = Some(name.to_owned());
        state.callback = callback;
        match result {
            Ok(resolved) => {
                state.source = resolved.observable;
                state.source_path = Some(resolved.source_path);
                state.connected = true;
                Ok(())
            }
            Err(err) => {
                state.source =
                    Observable::with_dispatcher(scope.dispatcher(), state.default.clone());
                Err(err)
            }
        }
    }

    /// Subscribe the bound callback and invoke it once with the current
    /// value. Does nothing when unbound or without a callback.
    pub fn start_observing(&self) {
        self.observe(true);
    }

    pub(crate) fn observe(&self, initial_sync: bool) {
        let (source, callback) = {
            let state = self.state.borrow();
            match (&state.callback, state.connected) {
                (Some(cb), true) => (state.source.clone(), Rc::clone(cb)),
                _ => return,
            }
        };

        // Unsubscribe-then-subscribe so repeated calls never duplicate.
        let previous = self.state.borrow_mut().subscription.take();
        drop(previous);

        let forward = Rc::clone(&callback);
        let subscription = source.subscribe(move |v| forward(v));
        self.state.borrow_mut().subscription = Some(subscription);

        if initial_sync {
            let value = source.get();
            callback(&value);
        }
    }

    /// Stop delivering changes to the callback. The binding is kept.
    pub fn stop_observing(&self) {
        let previous = self.state.borrow_mut().subscription.take();
        drop(previous);
    }

    /// Unsubscribe and fall back to an isolated observable holding the
    /// default value.
    pub fn disconnect(&self) {
        self.stop_observing();
        let mut state = self.state.borrow_mut();
        let fallback =
            Observable::with_dispatcher(state.source.dispatcher(), state.default.clone());
        state.source = fallback;
        state.connected = false;
        state.source_path = None;
        state.callback = None;
    }

    /// Whether the last `connect` found a matching observable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    /// Name passed to the last `connect`.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.state.borrow().name.clone()
    }

    /// Path of the data source this observer is bound to.
    #[must_use]
    pub fn source_path(&self) -> Option<String> {
        self.state.borrow().source_path.clone()
    }

    /// Current value (the bound observable's, or the fallback's).
    #[must_use]
    pub fn get(&self) -> T {
        self.source().get()
    }

    /// Write through to the bound observable. Equal values are ignored.
    pub fn set(&self, value: T) {
        self.source().set(value);
    }

    /// Write through and notify even if the value is unchanged.
    pub fn set_forced(&self, value: T) {
        self.source().set_forced(value);
    }

    /// Re-notify everyone observing the bound observable.
    pub fn dispatch_change(&self) {
        self.source().dispatch_change();
    }

    /// Handle to the observable reads and writes currently go to.
    #[must_use]
    pub fn source(&self) -> Observable<T> {
        self.state.borrow().source.clone()
    }
}

/// An observer for signals. Binding works like [`Observer`]; observing only
/// subscribes, since an event that already happened must not be replayed.
pub struct SignalObserver<T: Clone + PartialEq + 'static = ()> {
    inner: Observer<T>,
}

impl<T: Clone + PartialEq + 'static> Clone for SignalObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + Default + 'static> Default for SignalObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq + std::fmt::Debug + 'static> std::fmt::Debug for SignalObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SignalObserver").field(&self.inner).finish()
    }
}

impl<T: Clone + PartialEq + Default + 'static> SignalObserver<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Observer::new(T::default()),
        }
    }
}

impl<T: Clone + PartialEq + 'static> SignalObserver<T> {
    /// Bind to the nearest signal (or observable) named `name`.
    pub fn connect_with(
        &self,
        scope: &ScopeChain,
        name: &str,
        callback: impl Fn(&T) + 'static,
    ) -> Result<(), BindError> {
        self.inner.connect_inner(scope, name, Some(Rc::new(callback)))
    }

    /// Bind without a callback (send-only).
    pub fn connect(&self, scope: &ScopeChain, name: &str) -> Result<(), BindError> {
        self.inner.connect(scope, name)
    }

    /// Subscribe the callback. Unlike [`Observer::start_observing`], the
    /// callback is not invoked immediately.
    pub fn start_observing(&self) {
        self.inner.observe(false);
    }

    pub fn stop_observing(&self) {
        self.inner.stop_observing();
    }

    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Emit `payload` on the bound signal. Does nothing when unbound.
    pub fn send(&self, payload: T) {
        if self.inner.is_connected() {
            self.inner.set_forced(payload);
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// The most recent payload seen on the bound signal.
    #[must_use]
    pub fn last(&self) -> T {
        self.inner.get()
    }

    pub(crate) fn as_observer(&self) -> &Observer<T> {
        &self.inner
    }
}

impl SignalObserver<()> {
    /// Emit a payload-less event.
    pub fn fire(&self) {
        self.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentId;
    use crate::scope::{ScopeLevel, SourceRef};
    use crate::tree::NodeId;
    use std::cell::Cell;
    use tether_reactive::{Dispatcher, ObservableSet, Signal};

    fn scope_with(set: ObservableSet) -> ScopeChain {
        let node = NodeId::from_raw(0, 0);
        ScopeChain::new(
            "/root/leaf/Test".into(),
            Dispatcher::new(),
            vec![ScopeLevel {
                node,
                sources: vec![SourceRef {
                    component: ComponentId { node, index: 0 },
                    path: "/root/Model".into(),
                    observables: Rc::new(set),
                }],
            }],
        )
    }

    fn counting() -> (Rc<Cell<u32>>, impl Fn(&String) + 'static) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        (hits, move |_: &String| h.set(h.get() + 1))
    }

    #[test]
    fn connect_and_share_value() {
        let message = Observable::new("hello".to_string());
        let mut set = ObservableSet::new();
        set.expose("message", &message);
        let scope = scope_with(set);

        let observer = Observer::new(String::new());
        observer.connect(&scope, "message").expect("binds");
        assert!(observer.is_connected());
        assert_eq!(observer.get(), "hello");
        assert_eq!(observer.source_path().as_deref(), Some("/root/Model"));

        observer.set("from observer".into());
        assert_eq!(message.get(), "from observer");
    }

    #[test]
    fn start_observing_syncs_once_and_never_duplicates() {
        let message = Observable::new("a".to_string());
        let mut set = ObservableSet::new();
        set.expose("message", &message);
        let scope = scope_with(set);

        let (hits, cb) = counting();
        let observer = Observer::new(String::new());
        observer.connect_with(&scope, "message", cb).expect("binds");
        assert_eq!(hits.get(), 0);

        observer.start_observing();
        assert_eq!(hits.get(), 1, "initial sync");
        observer.start_observing();
        assert_eq!(hits.get(), 2, "second initial sync");

        message.set("b".into());
        assert_eq!(hits.get(), 3, "one subscription only");
    }

    #[test]
    fn disconnect_silences_and_resets() {
        let message = Observable::new("a".to_string());
        let mut set = ObservableSet::new();
        set.expose("message", &message);
        let scope = scope_with(set);

        let (hits, cb) = counting();
        let observer = Observer::new("default".to_string());
        observer.connect_with(&scope, "message", cb).expect("binds");
        observer.start_observing();
        observer.disconnect();

        message.set("b".into());
        assert_eq!(hits.get(), 1);
        assert!(!observer.is_connected());
        assert_eq!(observer.get(), "default");
    }

    #[test]
    fn unbound_observer_is_isolated() {
        let message = Observable::new("shared".to_string());
        let mut set = ObservableSet::new();
        set.expose("message", &message);
        let scope = scope_with(set);

        let observer = Observer::new("fallback".to_string());
        let err = observer.connect(&scope, "missing").unwrap_err();
        assert!(matches!(err, BindError::NotFound { .. }));
        assert_eq!(observer.get(), "fallback");

        observer.set("local".into());
        assert_eq!(observer.get(), "local");
        assert_eq!(message.get(), "shared");
    }

    #[test]
    fn unbound_fallback_follows_the_given_dispatcher() {
        let dispatcher = Dispatcher::new();
        let private = Observer::new(0);
        assert!(!private.source().dispatcher().same_as(&dispatcher));

        let observer = Observer::with_dispatcher(&dispatcher, 0);
        let (hits, cb) = counting();
        let _sub = observer.source().subscribe(move |v: &i32| cb(&v.to_string()));

        let block = dispatcher.begin_change_block();
        observer.set(5);
        assert_eq!(observer.get(), 5);
        assert_eq!(hits.get(), 0, "deferred by the block");
        block.end();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn type_mismatch_falls_back() {
        let count = Observable::new(1);
        let mut set = ObservableSet::new();
        set.expose("message", &count);
        let scope = scope_with(set);

        let observer = Observer::new("fallback".to_string());
        let err = observer.connect(&scope, "message").unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { found: "i32", .. }));
        assert!(!observer.is_connected());
    }

    #[test]
    fn signal_observer_skips_initial_call() {
        let signal: Signal<String> = Signal::new();
        let mut set = ObservableSet::new();
        set.expose_signal("ping", &signal);
        let scope = scope_with(set);

        let (hits, cb) = counting();
        let receiver = SignalObserver::<String>::new();
        receiver.connect_with(&scope, "ping", cb).expect("binds");
        receiver.start_observing();
        assert_eq!(hits.get(), 0);

        signal.send("x".into());
        signal.send("x".into());
        assert_eq!(hits.get(), 2);

        receiver.send("y".into());
        assert_eq!(hits.get(), 3);
        assert_eq!(signal.last(), "y");
    }

    #[test]
    fn unbound_signal_observer_send_is_inert() {
        let scope = ScopeChain::detached("/x", &Dispatcher::new());
        let receiver: SignalObserver = SignalObserver::new();
        assert!(receiver.connect(&scope, "ping").is_err());
        receiver.fire();
        assert!(!receiver.is_connected());
    }
}
