#![forbid(unsafe_code)]

//! Component tree with scoped observable binding.
//!
//! A [`Tree`] holds nodes; nodes hold [`Component`]s. Components that
//! expose observables are *data sources* for their descendants. Components
//! declare what they need ([`Declarations`]): injected references, bindings
//! of [`Observer`]s to ancestor observables by name, change listeners and
//! signal receivers. The tree applies those declarations on activation and
//! releases them on deactivation, destruction and reparenting.
//!
//! # Resolution
//!
//! A binding for `name` starts at the parent of the component's node and
//! walks toward the root. At each level the node's data sources are checked
//! in insertion order; the first observable named `name` with the expected
//! value type wins. Unresolved bindings never fail activation: the observer
//! keeps working against its default value and one log line is emitted.
//!
//! # Replication
//!
//! Components returning `true` from [`Component::synced`] are kept in sync
//! with every other live instance of the same type in the same tree.

pub mod component;
pub mod declare;
pub mod error;
pub mod inspect;
pub mod observer;
pub mod scope;
mod sync;
pub mod tree;

pub use component::{Component, ComponentId, Slot};
pub use declare::{BindingStatus, Declarations, OnChange};
pub use error::{BindError, InspectError, TreeError};
pub use inspect::{ComponentReport, FieldReport, NodeReport};
pub use observer::{Observer, SignalObserver};
pub use scope::{Resolved, ResolvedErased, ScopeChain, ScopeLevel, SourceRef};
pub use tree::{NodeId, Tree};
