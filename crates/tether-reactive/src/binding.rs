#![forbid(unsafe_code)]

//! Mirrors between observables, and bags that own connections for the
//! duration of one activation.
//!
//! A [`TwoWayBinding`] keeps two observables of the same type equal. A proxy
//! that republishes an ancestor's value under its own component is one such
//! mirror: writes on the ancestor reach the proxy and vice versa.
//!
//! ```
//! use tether_reactive::{Observable, TwoWayBinding};
//!
//! let upstream = Observable::new(String::from("a"));
//! let proxy = Observable::new(String::new());
//! let mirror = TwoWayBinding::new(&upstream, &proxy);
//! assert_eq!(proxy.get(), "a");
//!
//! proxy.set("b".into());
//! assert_eq!(upstream.get(), "b");
//!
//! drop(mirror);
//! upstream.set("c".into());
//! assert_eq!(proxy.get(), "b");
//! ```
//!
//! # Invariants
//!
//! 1. A write crossing the mirror never bounces back to its origin.
//! 2. Forced dispatch on one side arrives as forced dispatch on the other.
//! 3. Both sides hold the same value as soon as either is written, even
//!    inside a change block. Only subscriber notifications are deferred.
//! 4. Dropping the mirror or the [`BindingScope`] holding it severs both
//!    directions.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use super::observable::{Observable, Subscription};

/// Keeps two observables equal in both directions.
pub struct TwoWayBinding<T: Clone + PartialEq + 'static> {
    links: [Subscription; 2],
    crossing: Rc<Cell<bool>>,
    _value: std::marker::PhantomData<T>,
}

impl<T: Clone + PartialEq + 'static> TwoWayBinding<T> {
    /// Mirror `upstream` and `proxy`. `proxy` takes `upstream`'s value first.
    pub fn new(upstream: &Observable<T>, proxy: &Observable<T>) -> Self {
        proxy.set(upstream.get());

        let crossing = Rc::new(Cell::new(false));
        let links = [
            relay(upstream, proxy, &crossing),
            relay(proxy, upstream, &crossing),
        ];
        Self {
            links,
            crossing,
            _value: std::marker::PhantomData,
        }
    }

    /// Whether a value is currently being copied across.
    #[must_use]
    pub fn is_crossing(&self) -> bool {
        self.crossing.get()
    }
}

/// Copy every write on `from` into `to` at write time, unless `crossing`
/// says the write originated from the other side. `to`'s subscribers are
/// dispatched once the copy is done.
fn relay<T: Clone + PartialEq + 'static>(
    from: &Observable<T>,
    to: &Observable<T>,
    crossing: &Rc<Cell<bool>>,
) -> Subscription {
    let to = to.clone();
    let crossing = Rc::clone(crossing);
    from.link(move |value| {
        if crossing.replace(true) {
            return;
        }
        to.write_through(value.clone());
        crossing.set(false);
        to.notify();
    })
}

impl<T: Clone + PartialEq + 'static> std::fmt::Debug for TwoWayBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoWayBinding")
            .field("links", &self.links.len())
            .field("crossing", &self.crossing.get())
            .finish()
    }
}

enum Held {
    Subscription(Subscription),
    Mirror(Box<dyn Any>),
}

/// Owns the subscriptions and mirrors created for one component activation.
/// Dropping or clearing it disconnects all of them at once.
#[derive(Default)]
pub struct BindingScope {
    held: Vec<Held>,
}

impl BindingScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `subscription`.
    pub fn hold(&mut self, subscription: Subscription) {
        self.held.push(Held::Subscription(subscription));
    }

    /// Take ownership of `mirror`.
    pub fn hold_mirror<T: Clone + PartialEq + 'static>(&mut self, mirror: TwoWayBinding<T>) {
        self.held.push(Held::Mirror(Box::new(mirror)));
    }

    /// Subscribe `callback` to `source`; the subscription lives as long as
    /// the scope.
    pub fn subscribe<T: Clone + PartialEq + 'static>(
        &mut self,
        source: &Observable<T>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        self.hold(source.subscribe(callback));
        self
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn mirror_count(&self) -> usize {
        self.held
            .iter()
            .filter(|held| matches!(held, Held::Mirror(_)))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Disconnect everything now. The scope can be reused afterwards.
    pub fn clear(&mut self) {
        self.held.clear();
    }
}

impl std::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.binding_count())
            .field("mirrors", &self.mirror_count())
            .finish()
    }
}
