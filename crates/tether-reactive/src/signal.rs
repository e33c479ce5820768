#![forbid(unsafe_code)]

//! Signals: observables that model discrete events instead of state.
//!
//! A [`Signal<T>`] is an [`Observable<T>`] whose every `send` notifies, even
//! when the payload repeats. `Signal<()>` (the default) carries no payload
//! and is triggered with [`fire`](Signal::fire).

use crate::batch::Dispatcher;
use crate::observable::{Observable, Subscription};

/// An event source. Cloning shares the same underlying observable.
pub struct Signal<T = ()> {
    inner: Observable<T>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signal").field(&self.inner).finish()
    }
}

impl<T: Clone + PartialEq + Default + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq + Default + 'static> Signal<T> {
    /// Create a signal with a private dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dispatcher(&Dispatcher::new())
    }

    /// Create a signal that dispatches through `dispatcher`.
    #[must_use]
    pub fn with_dispatcher(dispatcher: &Dispatcher) -> Self {
        Self {
            inner: Observable::with_dispatcher(dispatcher, T::default()),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Signal<T> {
    /// Emit `payload` to every receiver.
    pub fn send(&self, payload: T) {
        self.inner.set_forced(payload);
    }

    /// The most recently sent payload (or the default if nothing was sent).
    #[must_use]
    pub fn last(&self) -> T {
        self.inner.get()
    }

    /// Register a receiver.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.subscribe(callback)
    }

    /// The observable backing this signal, for exposure to descendants.
    #[must_use]
    pub fn observable(&self) -> &Observable<T> {
        &self.inner
    }
}

impl Signal<()> {
    /// Emit a payload-less event.
    pub fn fire(&self) {
        self.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn fire_notifies_every_time() {
        let signal: Signal = Signal::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let _sub = signal.subscribe(move |_| c.set(c.get() + 1));

        signal.fire();
        signal.fire();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn repeated_payload_still_delivered() {
        let signal: Signal<String> = Signal::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _sub = signal.subscribe(move |v: &String| l.borrow_mut().push(v.clone()));

        signal.send("ping".into());
        signal.send("ping".into());
        assert_eq!(*log.borrow(), vec!["ping", "ping"]);
        assert_eq!(signal.last(), "ping");
    }

    #[test]
    fn signal_respects_change_block() {
        let dispatcher = Dispatcher::new();
        let signal: Signal<u8> = Signal::with_dispatcher(&dispatcher);
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let _sub = signal.subscribe(move |_| c.set(c.get() + 1));

        let block = dispatcher.begin_change_block();
        signal.send(1);
        signal.send(1);
        assert_eq!(count.get(), 0);
        drop(block);
        assert_eq!(count.get(), 2);
    }
}
