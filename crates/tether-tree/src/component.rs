#![forbid(unsafe_code)]

//! The component contract and injection slots.
//!
//! A [`Component`] is attached to a node of a [`Tree`](crate::Tree). It
//! describes itself to the tree through two hooks instead of runtime
//! introspection:
//!
//! - [`Component::expose`] publishes the component's observables by name.
//!   A component that exposes at least one observable is a *data source*
//!   and becomes visible to bindings from descendant nodes.
//! - [`Component::declare`] lists what the tree should wire up on every
//!   activation: injected references, observer bindings, proxies, change
//!   listeners and signal receivers (see [`Declarations`]).
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tether_reactive::{Observable, ObservableSet};
//! use tether_tree::{Component, Declarations, Observer, Tree};
//!
//! struct Model {
//!     message: Observable<String>,
//! }
//!
//! impl Component for Model {
//!     fn expose(&self, set: &mut ObservableSet) {
//!         set.expose("message", &self.message);
//!     }
//! }
//!
//! struct Label {
//!     message: Observer<String>,
//! }
//!
//! impl Component for Label {
//!     fn declare(&self, decl: &mut Declarations) {
//!         decl.bind(&self.message, "message");
//!     }
//! }
//!
//! let mut tree = Tree::new();
//! let root = tree.add_root("root");
//! let model = Rc::new(Model {
//!     message: Observable::with_dispatcher(tree.dispatcher(), "hi".to_string()),
//! });
//! tree.add_component(root, Rc::clone(&model)).unwrap();
//!
//! let leaf = tree.add_child(root, "leaf").unwrap();
//! let label = Rc::new(Label { message: Observer::new(String::new()) });
//! tree.add_component(leaf, Rc::clone(&label)).unwrap();
//!
//! assert!(label.message.is_connected());
//! model.message.set("hello".into());
//! assert_eq!(label.message.get(), "hello");
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tether_reactive::ObservableSet;

use crate::declare::Declarations;
use crate::tree::NodeId;

/// Behaviour attached to a tree node.
///
/// All hooks have empty defaults; implement only what the component needs.
pub trait Component: Any {
    /// Publish observables to descendants. Called once, when the component
    /// is added to the tree.
    fn expose(&self, _set: &mut ObservableSet) {}

    /// List the wiring to perform on activation. Called on every activation,
    /// so reparenting re-resolves everything declared here.
    fn declare(&self, _decl: &mut Declarations) {}

    /// Opt into replication: every live instance of the same concrete type
    /// in the tree mirrors its exposed values to the others.
    fn synced(&self) -> bool {
        false
    }
}

/// Identifies a component by owning node and position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentId {
    pub node: NodeId,
    pub index: usize,
}

/// A shared cell that receives an injected reference on activation.
///
/// The component keeps one handle; the declaration keeps another and fills
/// it. Before activation (or when the lookup found nothing) the slot is
/// empty.
pub struct Slot<T> {
    inner: Rc<RefCell<Option<T>>>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(None)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&self.inner.borrow()).finish()
    }
}

impl<T> Slot<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the slot currently holds a value.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.inner.borrow().is_some()
    }

    /// Borrow the current content.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.inner.borrow().as_ref())
    }

    pub(crate) fn fill(&self, value: Option<T>) {
        *self.inner.borrow_mut() = value;
    }
}

impl<T: Clone> Slot<T> {
    /// Clone of the current content.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.inner.borrow().clone()
    }
}

/// Last path segment of a Rust type name, for log paths.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
