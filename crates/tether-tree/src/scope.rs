#![forbid(unsafe_code)]

//! Resolution context for bindings.
//!
//! When a component activates, the tree snapshots the data sources visible
//! to it into a [`ScopeChain`]: one [`ScopeLevel`] per ancestor, nearest
//! first, starting at the *parent* of the component's node. Bindings then
//! resolve against the chain without walking the tree again, and callbacks
//! that need to re-resolve later can keep a cheap clone of it.
//!
//! # Resolution rule
//!
//! For `resolve::<T>(name)`: walk levels nearest-first; within a level,
//! check data sources in insertion order; the first source exposing `name`
//! with value type `T` wins. A source exposing `name` with another type is
//! skipped. If nothing matches, the error is [`BindError::TypeMismatch`]
//! when some level had the name with the wrong type, else
//! [`BindError::NotFound`].

use std::rc::Rc;

use tether_reactive::{Dispatcher, ErasedObservable, Lookup, Observable, ObservableSet};

use crate::component::ComponentId;
use crate::error::BindError;
use crate::tree::NodeId;

/// One data source visible from a scope level.
#[derive(Clone, Debug)]
pub struct SourceRef {
    pub component: ComponentId,
    pub path: String,
    pub observables: Rc<ObservableSet>,
}

/// All data sources on one ancestor node.
#[derive(Clone, Debug)]
pub struct ScopeLevel {
    pub node: NodeId,
    pub sources: Vec<SourceRef>,
}

/// A successful typed resolution.
#[derive(Debug)]
pub struct Resolved<T> {
    pub observable: Observable<T>,
    pub source_path: String,
}

/// A successful name-only resolution.
#[derive(Clone)]
pub struct ResolvedErased {
    pub handle: ErasedObservable,
    pub source_path: String,
}

struct ScopeChainInner {
    origin: String,
    dispatcher: Dispatcher,
    levels: Vec<ScopeLevel>,
}

/// Snapshot of the data sources above a component. Cheap to clone.
#[derive(Clone)]
pub struct ScopeChain {
    inner: Rc<ScopeChainInner>,
}

impl ScopeChain {
    pub(crate) fn new(origin: String, dispatcher: Dispatcher, levels: Vec<ScopeLevel>) -> Self {
        Self {
            inner: Rc::new(ScopeChainInner {
                origin,
                dispatcher,
                levels,
            }),
        }
    }

    /// A chain with no levels: every resolution fails. Useful for observers
    /// used outside a tree.
    #[must_use]
    pub fn detached(origin: impl Into<String>, dispatcher: &Dispatcher) -> Self {
        Self::new(origin.into(), dispatcher.clone(), Vec::new())
    }

    /// Path of the component this chain was built for.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    /// Dispatcher of the owning tree.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Levels, nearest ancestor first.
    #[must_use]
    pub fn levels(&self) -> &[ScopeLevel] {
        &self.inner.levels
    }

    /// Find the nearest observable named `name` with value type `T`.
    pub fn resolve<T: Clone + PartialEq + 'static>(
        &self,
        name: &str,
    ) -> Result<Resolved<T>, BindError> {
        let mut mismatch = None;
        for source in self.sources() {
            match source.observables.typed::<T>(name) {
                Lookup::Found(observable) => {
                    tracing::trace!(
                        name,
                        source = %source.path,
                        origin = %self.origin(),
                        "resolved"
                    );
                    return Ok(Resolved {
                        observable,
                        source_path: source.path.clone(),
                    });
                }
                Lookup::TypeMismatch { found } => {
                    if mismatch.is_none() {
                        mismatch = Some((source.path.clone(), found));
                    }
                }
                Lookup::Missing => {}
            }
        }
        Err(match mismatch {
            Some((source_path, found)) => BindError::TypeMismatch {
                name: name.to_owned(),
                source_path,
                expected: std::any::type_name::<T>(),
                found,
            },
            None => BindError::NotFound {
                name: name.to_owned(),
                origin: self.origin().to_owned(),
            },
        })
    }

    /// Find the nearest observable named `name`, whatever its value type.
    #[must_use]
    pub fn resolve_erased(&self, name: &str) -> Option<ResolvedErased> {
        self.sources().find_map(|source| {
            source.observables.get(name).map(|entry| ResolvedErased {
                handle: Rc::clone(entry.handle()),
                source_path: source.path.clone(),
            })
        })
    }

    fn sources(&self) -> impl Iterator<Item = &SourceRef> {
        self.inner.levels.iter().flat_map(|level| level.sources.iter())
    }
}

impl std::fmt::Debug for ScopeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeChain")
            .field("origin", &self.inner.origin)
            .field("levels", &self.inner.levels.len())
            .finish()
    }
}
