#![forbid(unsafe_code)]

//! Reactive primitives for Tether.
//!
//! Everything here is independent of the component tree:
//!
//! - [`Observable`] holds a value, counts its changes and calls its
//!   subscribers; [`Subscription`] unsubscribes when dropped.
//! - [`Dispatcher`] decides when subscribers run. A [`ChangeBlock`] opened
//!   on it queues notifications until the outermost block closes.
//! - [`Signal`] is an observable for events: every send notifies.
//! - [`TwoWayBinding`] mirrors two observables; [`BindingScope`] owns the
//!   connections of one activation.
//! - [`ObservableSet`] publishes observables under names behind the
//!   type-erased [`DynObservable`] interface.
//!
//! # Ownership
//!
//! Handles are `Rc<RefCell<..>>` clones, so everything is single-threaded.
//! An observable keeps only weak references to its callbacks and drops dead
//! ones on the next notification. Each observable remembers its dispatcher;
//! separate dispatchers (one per tree, one per test) never share a queue.
//!
//! # Invariants
//!
//! 1. The version grows by one for every write that changes the value.
//! 2. Subscribers run in the order they subscribed.
//! 3. Writing an equal value does nothing; forced dispatch always notifies.
//! 4. A dropped [`Subscription`] is not called again.
//! 5. Inside a change block writes land immediately and notifications wait
//!    for the outermost block to close.

pub mod batch;
pub mod binding;
pub mod erased;
pub mod observable;
pub mod signal;

pub use batch::{ChangeBlock, Dispatcher};
pub use binding::{BindingScope, TwoWayBinding};
pub use erased::{
    DynObservable, ErasedObservable, Lookup, ObservableEntry, ObservableKind, ObservableSet,
};
pub use observable::{Observable, Subscription};
pub use signal::Signal;
