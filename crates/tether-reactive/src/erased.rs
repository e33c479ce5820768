#![forbid(unsafe_code)]

//! Type-erased observables and named observable sets.
//!
//! A data source publishes its observables as an [`ObservableSet`]: an
//! ordered list of `(name, handle)` pairs where each handle is an
//! [`ErasedObservable`]. Consumers look entries up by name and either
//! downcast them back to a concrete [`Observable<T>`] ([`ObservableSet::typed`])
//! or work through the untyped [`DynObservable`] surface (inspection,
//! replication by name).
//!
//! # Invariants
//!
//! 1. Declaration order is lookup order.
//! 2. When a name is declared twice, the first declaration wins.
//! 3. `typed::<T>` only yields `Found` when the stored value type is exactly `T`.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::observable::{Observable, Subscription};
use crate::signal::Signal;

/// Shared handle to an observable of unknown value type.
pub type ErasedObservable = Rc<dyn DynObservable>;

/// Object-safe view of an [`Observable<T>`].
pub trait DynObservable {
    /// `TypeId` of the wrapped value.
    fn value_type_id(&self) -> TypeId;

    /// Human-readable name of the wrapped value type.
    fn value_type_name(&self) -> &'static str;

    /// The concrete `Observable<T>` as `Any`, for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Current version counter.
    fn version(&self) -> u64;

    /// `Debug` rendering of the current value.
    fn debug_value(&self) -> String;

    /// Copy the value of `other` into `self`. Returns `false` (and leaves
    /// `self` untouched) when the value types differ.
    fn copy_from(&self, other: &dyn DynObservable, force: bool) -> bool;

    /// Write a boxed value. The box is handed back when its type does not
    /// match the observable's value type.
    fn set_boxed(&self, value: Box<dyn Any>, force: bool) -> Result<(), Box<dyn Any>>;

    /// Subscribe without looking at the payload.
    fn subscribe_untyped(&self, callback: Box<dyn Fn()>) -> Subscription;

    /// Notify subscribers with the current value.
    fn dispatch_change(&self);

    /// Whether `other` is a handle to the same observable.
    fn same_as(&self, other: &dyn DynObservable) -> bool;
}

impl<T> DynObservable for Observable<T>
where
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn version(&self) -> u64 {
        Observable::version(self)
    }

    fn debug_value(&self) -> String {
        self.with(|v| format!("{v:?}"))
    }

    fn copy_from(&self, other: &dyn DynObservable, force: bool) -> bool {
        let Some(other) = other.as_any().downcast_ref::<Observable<T>>() else {
            return false;
        };
        let value = other.get();
        if force {
            self.set_forced(value);
        } else {
            self.set(value);
        }
        true
    }

    fn set_boxed(&self, value: Box<dyn Any>, force: bool) -> Result<(), Box<dyn Any>> {
        let value = value.downcast::<T>()?;
        if force {
            self.set_forced(*value);
        } else {
            self.set(*value);
        }
        Ok(())
    }

    fn subscribe_untyped(&self, callback: Box<dyn Fn()>) -> Subscription {
        self.subscribe(move |_| callback())
    }

    fn dispatch_change(&self) {
        Observable::dispatch_change(self);
    }

    fn same_as(&self, other: &dyn DynObservable) -> bool {
        other
            .as_any()
            .downcast_ref::<Observable<T>>()
            .is_some_and(|o| self.ptr_eq(o))
    }
}

/// What an exposed entry represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservableKind {
    /// Durable state.
    Value,
    /// Discrete events.
    Signal,
}

/// One named entry of an [`ObservableSet`].
#[derive(Clone)]
pub struct ObservableEntry {
    name: String,
    kind: ObservableKind,
    handle: ErasedObservable,
}

impl ObservableEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ObservableKind {
        self.kind
    }

    #[must_use]
    pub fn handle(&self) -> &ErasedObservable {
        &self.handle
    }

    /// Downcast to a concrete observable if the value type is `T`.
    #[must_use]
    pub fn downcast<T: Clone + PartialEq + 'static>(&self) -> Option<Observable<T>> {
        self.handle
            .as_any()
            .downcast_ref::<Observable<T>>()
            .cloned()
    }
}

impl fmt::Debug for ObservableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("type", &self.handle.value_type_name())
            .field("value", &self.handle.debug_value())
            .finish()
    }
}

/// Result of a typed lookup.
#[derive(Debug)]
pub enum Lookup<T> {
    /// An observable with the requested name and value type.
    Found(Observable<T>),
    /// The name exists but holds another value type.
    TypeMismatch { found: &'static str },
    /// No entry with that name.
    Missing,
}

/// Ordered, named observables exposed by one data source.
#[derive(Clone, Default)]
pub struct ObservableSet {
    entries: Vec<ObservableEntry>,
}

impl ObservableSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `observable` under `name`.
    pub fn expose<T>(&mut self, name: impl Into<String>, observable: &Observable<T>) -> &mut Self
    where
        T: Clone + PartialEq + fmt::Debug + 'static,
    {
        self.push(name.into(), ObservableKind::Value, Rc::new(observable.clone()));
        self
    }

    /// Publish `signal` under `name`.
    pub fn expose_signal<T>(&mut self, name: impl Into<String>, signal: &Signal<T>) -> &mut Self
    where
        T: Clone + PartialEq + fmt::Debug + 'static,
    {
        self.push(
            name.into(),
            ObservableKind::Signal,
            Rc::new(signal.observable().clone()),
        );
        self
    }

    fn push(&mut self, name: String, kind: ObservableKind, handle: ErasedObservable) {
        if self.get(&name).is_some() {
            tracing::warn!(name = %name, "observable declared twice; keeping the first");
        }
        self.entries.push(ObservableEntry { name, kind, handle });
    }

    /// First entry named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ObservableEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Look up `name` and check its value type against `T`.
    #[must_use]
    pub fn typed<T: Clone + PartialEq + 'static>(&self, name: &str) -> Lookup<T> {
        match self.get(name) {
            None => Lookup::Missing,
            Some(entry) => match entry.downcast::<T>() {
                Some(obs) => Lookup::Found(obs),
                None => Lookup::TypeMismatch {
                    found: entry.handle.value_type_name(),
                },
            },
        }
    }

    /// Entry names in declaration order (duplicates included).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservableEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ObservableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sample() -> (ObservableSet, Observable<String>, Observable<i32>) {
        let message = Observable::new("hi".to_string());
        let count = Observable::new(3);
        let mut set = ObservableSet::new();
        set.expose("message", &message).expose("count", &count);
        (set, message, count)
    }

    #[test]
    fn typed_lookup_found() {
        let (set, message, _) = sample();
        match set.typed::<String>("message") {
            Lookup::Found(obs) => assert!(obs.ptr_eq(&message)),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn typed_lookup_mismatch_reports_found_type() {
        let (set, _, _) = sample();
        match set.typed::<String>("count") {
            Lookup::TypeMismatch { found } => assert_eq!(found, "i32"),
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
        assert!(matches!(set.typed::<i32>("nope"), Lookup::Missing));
    }

    #[test]
    fn first_declaration_wins() {
        let first = Observable::new(1);
        let second = Observable::new(2);
        let mut set = ObservableSet::new();
        set.expose("n", &first).expose("n", &second);

        assert_eq!(set.len(), 2);
        let Lookup::Found(found) = set.typed::<i32>("n") else {
            panic!("expected Found");
        };
        assert!(found.ptr_eq(&first));
    }

    #[test]
    fn copy_from_respects_types() {
        let (set, _, count) = sample();
        let other = Observable::new(10);
        let entry = set.get("count").expect("count exposed");

        assert!(entry.handle().copy_from(&other, false));
        assert_eq!(count.get(), 10);

        let text = Observable::new("x".to_string());
        assert!(!entry.handle().copy_from(&text, false));
        assert_eq!(count.get(), 10);
    }

    #[test]
    fn set_boxed_returns_wrong_type() {
        let (set, message, _) = sample();
        let handle = set.get("message").expect("message exposed").handle();

        assert!(handle.set_boxed(Box::new("yo".to_string()), false).is_ok());
        assert_eq!(message.get(), "yo");

        let rejected = handle.set_boxed(Box::new(5u8), false);
        assert!(rejected.is_err());
    }

    #[test]
    fn untyped_subscription_and_debug_value() {
        let (set, _, count) = sample();
        let handle = set.get("count").expect("count exposed").handle();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = handle.subscribe_untyped(Box::new(move || h.set(h.get() + 1)));

        count.set(4);
        handle.dispatch_change();
        assert_eq!(hits.get(), 2);
        assert_eq!(handle.debug_value(), "4");
        assert_eq!(handle.version(), 1);
    }

    #[test]
    fn signals_are_tagged() {
        let signal: Signal<u8> = Signal::new();
        let mut set = ObservableSet::new();
        set.expose_signal("ping", &signal);
        let entry = set.get("ping").expect("ping exposed");
        assert_eq!(entry.kind(), ObservableKind::Signal);
        assert!(entry.downcast::<u8>().is_some_and(|o| o.ptr_eq(signal.observable())));
    }

    #[test]
    fn same_as_compares_identity() {
        let (set, message, _) = sample();
        let handle = set.get("message").expect("message exposed").handle();
        assert!(handle.same_as(&message));
        assert!(!handle.same_as(&Observable::new("hi".to_string())));
    }
}
