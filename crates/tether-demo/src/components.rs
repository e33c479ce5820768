#![forbid(unsafe_code)]

//! Demo components.
//!
//! A small vocabulary that covers every wiring style the tree supports:
//! data sources ([`ModelDemo`], [`ControllerWithObservablesDemo`],
//! [`SyncedCounter`]), plain observers ([`ControllerDemo`]), proxies
//! ([`DataProxyDemo`]), signal traffic ([`SignalSenderDemo`],
//! [`SignalReceiverDemo`]) and runtime-chosen bindings ([`BoundLabel`]).
//!
//! Every component records what it saw so scenarios and tests can check
//! the outcome without scraping logs.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tether_reactive::{Dispatcher, Observable, ObservableSet, Signal};
use tether_tree::{Component, Declarations, Observer, SignalObserver};

/// Shared transcript of values a component observed.
pub type Seen<T> = Rc<RefCell<Vec<T>>>;

/// Root data model: a message and a list of item labels.
pub struct ModelDemo {
    pub message: Observable<String>,
    pub items: Observable<Vec<String>>,
}

impl ModelDemo {
    #[must_use]
    pub fn new(dispatcher: &Dispatcher, message: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            message: Observable::with_dispatcher(dispatcher, message.into()),
            items: Observable::with_dispatcher(dispatcher, items),
        }
    }
}

impl Component for ModelDemo {
    fn expose(&self, set: &mut ObservableSet) {
        set.expose("message", &self.message);
        set.expose("items", &self.items);
    }
}

/// Follows the nearest `message` and logs each value.
pub struct ControllerDemo {
    pub message: Observer<String>,
    pub seen: Seen<String>,
}

impl ControllerDemo {
    #[must_use]
    pub fn new() -> Self {
        Self {
            message: Observer::new(String::new()),
            seen: Rc::default(),
        }
    }
}

impl Default for ControllerDemo {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for ControllerDemo {
    fn declare(&self, decl: &mut Declarations) {
        let seen = Rc::clone(&self.seen);
        let node = decl.node();
        decl.bind(&self.message, "message").on_change(move |value| {
            tracing::info!(%node, message = %value, "controller saw message");
            seen.borrow_mut().push(value.clone());
        });
    }
}

/// A controller that is also a data source: it owns a `message` shadowing
/// any ancestor's, plus a `signal` carrying text events.
pub struct ControllerWithObservablesDemo {
    pub message: Observable<String>,
    pub signal: Signal<String>,
    pub changes: Rc<Cell<u32>>,
}

impl ControllerWithObservablesDemo {
    #[must_use]
    pub fn new(dispatcher: &Dispatcher, message: impl Into<String>) -> Self {
        Self {
            message: Observable::with_dispatcher(dispatcher, message.into()),
            signal: Signal::with_dispatcher(dispatcher),
            changes: Rc::default(),
        }
    }

    /// Send `text` to every receiver below this component.
    pub fn announce(&self, text: impl Into<String>) {
        self.signal.send(text.into());
    }
}

impl Component for ControllerWithObservablesDemo {
    fn expose(&self, set: &mut ObservableSet) {
        set.expose("message", &self.message);
        set.expose_signal("signal", &self.signal);
    }

    fn declare(&self, decl: &mut Declarations) {
        let changes = Rc::clone(&self.changes);
        decl.listen(&self.message, move |value: &String| {
            changes.set(changes.get() + 1);
            tracing::info!(message = %value, "own message changed");
        });
    }
}

/// Re-exposes the nearest ancestor `message` as its own, mirrored both ways.
pub struct DataProxyDemo {
    pub message: Observable<String>,
    pub changes: Rc<Cell<u32>>,
}

impl DataProxyDemo {
    #[must_use]
    pub fn new(dispatcher: &Dispatcher) -> Self {
        Self {
            message: Observable::with_dispatcher(dispatcher, String::new()),
            changes: Rc::default(),
        }
    }
}

impl Component for DataProxyDemo {
    fn expose(&self, set: &mut ObservableSet) {
        set.expose("message", &self.message);
    }

    fn declare(&self, decl: &mut Declarations) {
        decl.mirror(&self.message, "message");
        let changes = Rc::clone(&self.changes);
        decl.listen(&self.message, move |value: &String| {
            changes.set(changes.get() + 1);
            tracing::debug!(message = %value, "proxied message changed");
        });
    }
}

/// Sends on the nearest ancestor `signal`.
pub struct SignalSenderDemo {
    pub signal: SignalObserver<String>,
}

impl SignalSenderDemo {
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: SignalObserver::new(),
        }
    }

    pub fn send(&self, text: impl Into<String>) {
        self.signal.send(text.into());
    }
}

impl Default for SignalSenderDemo {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for SignalSenderDemo {
    fn declare(&self, decl: &mut Declarations) {
        decl.sender(&self.signal, "signal");
    }
}

/// Records every payload of the nearest ancestor `signal`.
#[derive(Default)]
pub struct SignalReceiverDemo {
    pub received: Seen<String>,
}

impl Component for SignalReceiverDemo {
    fn declare(&self, decl: &mut Declarations) {
        let received = Rc::clone(&self.received);
        decl.receive("signal", move |payload: &String| {
            tracing::info!(payload = %payload, "signal received");
            received.borrow_mut().push(payload.clone());
        });
    }
}

/// Renders whichever ancestor string its own `binding_field` names.
/// Changing `binding_field` at runtime rebinds the label.
pub struct BoundLabel {
    pub binding_field: Observable<String>,
    pub text: Observer<String>,
    pub rendered: Rc<RefCell<String>>,
}

impl BoundLabel {
    #[must_use]
    pub fn new(dispatcher: &Dispatcher, field: impl Into<String>) -> Self {
        Self {
            binding_field: Observable::with_dispatcher(dispatcher, field.into()),
            text: Observer::new(String::new()),
            rendered: Rc::default(),
        }
    }

    /// Current label text.
    #[must_use]
    pub fn rendered(&self) -> String {
        self.rendered.borrow().clone()
    }
}

impl Component for BoundLabel {
    fn expose(&self, set: &mut ObservableSet) {
        set.expose("binding_field", &self.binding_field);
    }

    fn declare(&self, decl: &mut Declarations) {
        decl.adopt(&self.text);
        let scope = decl.scope().clone();
        let text = self.text.clone();
        let rendered = Rc::clone(&self.rendered);
        decl.listen(&self.binding_field, move |field: &String| {
            let sink = Rc::clone(&rendered);
            let bound = text.connect_with(&scope, field, move |value: &String| {
                sink.borrow_mut().clone_from(value);
            });
            match bound {
                Ok(()) => text.start_observing(),
                Err(_) => rendered.borrow_mut().clone_from(&text.get()),
            }
        });
    }
}

/// A counter replicated across every live instance in the tree.
pub struct SyncedCounter {
    pub count: Observable<i64>,
}

impl SyncedCounter {
    #[must_use]
    pub fn new(dispatcher: &Dispatcher, count: i64) -> Self {
        Self {
            count: Observable::with_dispatcher(dispatcher, count),
        }
    }
}

impl Component for SyncedCounter {
    fn expose(&self, set: &mut ObservableSet) {
        set.expose("count", &self.count);
    }

    fn synced(&self) -> bool {
        true
    }
}

/// One entry of a generated list; the label is filled by its creator.
pub struct ItemView {
    pub label: Observable<String>,
}

impl ItemView {
    #[must_use]
    pub fn new(dispatcher: &Dispatcher, label: impl Into<String>) -> Self {
        Self {
            label: Observable::with_dispatcher(dispatcher, label.into()),
        }
    }
}

impl Component for ItemView {
    fn expose(&self, set: &mut ObservableSet) {
        set.expose("label", &self.label);
    }
}
