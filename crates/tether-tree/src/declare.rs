#![forbid(unsafe_code)]

//! Declaration-driven wiring.
//!
//! [`Component::declare`](crate::Component::declare) fills a
//! [`Declarations`] list; the tree applies it every time the component
//! activates. Application order is fixed:
//!
//! 1. reference injection (slots are filled)
//! 2. observer and proxy binding
//! 3. change-listener subscription
//! 4. start observing: every bound observer runs its initial sync, then
//!    every change listener is called once with the current value
//! 5. signal receivers (subscribed, never called up front)
//!
//! Whatever steps 2 to 5 set up is owned by the resulting [`ActiveComponent`]
//! and released when the component deactivates.

use std::any::type_name;
use std::cell::RefCell;
use std::rc::Rc;

use tether_reactive::{
    BindingScope, Lookup, Observable, ObservableKind, ObservableSet, TwoWayBinding,
};

use crate::component::{Component, ComponentId, Slot};
use crate::observer::{Callback, Observer, SignalObserver};
use crate::scope::ScopeChain;
use crate::sync::SyncMembership;
use crate::tree::{NodeId, Tree};

type Injection = Box<dyn FnOnce(&Tree, NodeId)>;
type BindStep = Box<dyn FnOnce(&ScopeChain, &mut Activation)>;
type ListenStep = Box<dyn FnOnce(&ObservableSet, &mut Activation)>;

/// Binding state of one declared observer, proxy or receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingStatus {
    pub name: String,
    pub kind: ObservableKind,
    pub connected: bool,
    pub source_path: Option<String>,
}

/// Something the activation bound and must release again.
pub(crate) trait Bound {
    fn start(&self);
    fn release(&self);
    fn status(&self) -> BindingStatus;
}

impl<T: Clone + PartialEq + 'static> Bound for Observer<T> {
    fn start(&self) {
        self.start_observing();
    }

    fn release(&self) {
        self.disconnect();
    }

    fn status(&self) -> BindingStatus {
        BindingStatus {
            name: self.name().unwrap_or_default(),
            kind: ObservableKind::Value,
            connected: self.is_connected(),
            source_path: self.source_path(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Bound for SignalObserver<T> {
    fn start(&self) {
        self.start_observing();
    }

    fn release(&self) {
        self.disconnect();
    }

    fn status(&self) -> BindingStatus {
        let inner = self.as_observer();
        BindingStatus {
            name: inner.name().unwrap_or_default(),
            kind: ObservableKind::Signal,
            connected: inner.is_connected(),
            source_path: inner.source_path(),
        }
    }
}

/// Scratch state while a declaration list is applied.
pub(crate) struct Activation {
    origin: String,
    scope: BindingScope,
    bound: Vec<Rc<dyn Bound>>,
    mirrors: Vec<BindingStatus>,
    initial: Vec<Box<dyn FnOnce()>>,
}

impl Activation {
    fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_owned(),
            scope: BindingScope::new(),
            bound: Vec::new(),
            mirrors: Vec::new(),
            initial: Vec::new(),
        }
    }

    fn listen<T: Clone + PartialEq + 'static>(
        &mut self,
        observable: Observable<T>,
        callback: Callback<T>,
    ) {
        let forward = Rc::clone(&callback);
        self.scope.subscribe(&observable, move |v| forward(v));
        self.initial.push(Box::new(move || {
            let value = observable.get();
            callback(&value);
        }));
    }
}

/// Everything one activation of a component owns. Dropping it disconnects
/// the component's observers and releases its subscriptions.
pub(crate) struct ActiveComponent {
    scope: BindingScope,
    bound: Vec<Rc<dyn Bound>>,
    mirrors: Vec<BindingStatus>,
    pub(crate) sync: Option<SyncMembership>,
}

impl ActiveComponent {
    pub(crate) fn statuses(&self) -> Vec<BindingStatus> {
        self.bound
            .iter()
            .map(|b| b.status())
            .chain(self.mirrors.iter().cloned())
            .collect()
    }
}

impl Drop for ActiveComponent {
    fn drop(&mut self) {
        for bound in &self.bound {
            bound.release();
        }
        self.scope.clear();
    }
}

/// Handle returned by [`Declarations::bind`] to attach a change callback.
pub struct OnChange<T> {
    callback: Rc<RefCell<Option<Callback<T>>>>,
}

impl<T: 'static> OnChange<T> {
    /// Call `callback` once on activation and on every change of the bound
    /// observable while the component is active.
    pub fn on_change(self, callback: impl Fn(&T) + 'static) {
        *self.callback.borrow_mut() = Some(Rc::new(callback));
    }
}

/// The wiring a component asks for, collected by [`Component::declare`].
pub struct Declarations {
    node: NodeId,
    component: ComponentId,
    scope: ScopeChain,
    injections: Vec<Injection>,
    bindings: Vec<BindStep>,
    listeners: Vec<ListenStep>,
    receivers: Vec<BindStep>,
}

impl std::fmt::Debug for Declarations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Declarations")
            .field("component", &self.component)
            .field("injections", &self.injections.len())
            .field("bindings", &self.bindings.len())
            .field("listeners", &self.listeners.len())
            .field("receivers", &self.receivers.len())
            .finish()
    }
}

impl Declarations {
    pub(crate) fn new(component: ComponentId, scope: ScopeChain) -> Self {
        Self {
            node: component.node,
            component,
            scope,
            injections: Vec::new(),
            bindings: Vec::new(),
            listeners: Vec::new(),
            receivers: Vec::new(),
        }
    }

    /// The node the declaring component lives on.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The declaring component.
    #[must_use]
    pub fn component_id(&self) -> ComponentId {
        self.component
    }

    /// Resolution context of this activation. Keep a clone to bind
    /// observers later, e.g. when a field name only becomes known at runtime.
    #[must_use]
    pub fn scope(&self) -> &ScopeChain {
        &self.scope
    }

    // -----------------------------------------------------------------
    // Reference injection
    // -----------------------------------------------------------------

    /// Fill `slot` with whatever `lookup` returns for this component's node.
    pub fn inject<T: 'static>(
        &mut self,
        slot: &Slot<T>,
        lookup: impl FnOnce(&Tree, NodeId) -> Option<T> + 'static,
    ) -> &mut Self {
        let slot = slot.clone();
        self.injections.push(Box::new(move |tree, node| {
            let found = lookup(tree, node);
            if found.is_none() {
                tracing::debug!(node = ?node, target = type_name::<T>(), "injection found nothing");
            }
            slot.fill(found);
        }));
        self
    }

    /// Descendant at the relative `path` (`"a/b"`).
    pub fn find(&mut self, path: impl Into<String>, slot: &Slot<NodeId>) -> &mut Self {
        let path = path.into();
        self.inject(slot, move |tree, node| tree.find(node, &path))
    }

    /// First `C` on the descendant at the relative `path`.
    pub fn find_component<C: Component>(
        &mut self,
        path: impl Into<String>,
        slot: &Slot<Rc<C>>,
    ) -> &mut Self {
        let path = path.into();
        self.inject(slot, move |tree, node| {
            tree.find(node, &path).and_then(|n| tree.component::<C>(n))
        })
    }

    /// Direct child at `index`.
    pub fn child(&mut self, index: usize, slot: &Slot<NodeId>) -> &mut Self {
        self.inject(slot, move |tree, node| tree.child(node, index))
    }

    /// First `C` on this component's own node.
    pub fn component<C: Component>(&mut self, slot: &Slot<Rc<C>>) -> &mut Self {
        self.inject(slot, |tree, node| tree.component::<C>(node))
    }

    /// First `C` on this node or any descendant, depth first.
    pub fn component_in_children<C: Component>(
        &mut self,
        include_inactive: bool,
        slot: &Slot<Rc<C>>,
    ) -> &mut Self {
        self.inject(slot, move |tree, node| {
            tree.component_in_children::<C>(node, include_inactive)
        })
    }

    /// First `C` on this node or any ancestor, nearest first.
    pub fn component_in_parent<C: Component>(
        &mut self,
        include_inactive: bool,
        slot: &Slot<Rc<C>>,
    ) -> &mut Self {
        self.inject(slot, move |tree, node| {
            tree.component_in_parent::<C>(node, include_inactive)
        })
    }

    /// Every `C` on this node and its descendants.
    pub fn components_in_children<C: Component>(
        &mut self,
        include_inactive: bool,
        slot: &Slot<Vec<Rc<C>>>,
    ) -> &mut Self {
        self.inject(slot, move |tree, node| {
            Some(tree.components_in_children::<C>(node, include_inactive))
        })
    }

    /// Every `C` on this node and its ancestors.
    pub fn components_in_parent<C: Component>(
        &mut self,
        include_inactive: bool,
        slot: &Slot<Vec<Rc<C>>>,
    ) -> &mut Self {
        self.inject(slot, move |tree, node| {
            Some(tree.components_in_parent::<C>(node, include_inactive))
        })
    }

    // -----------------------------------------------------------------
    // Bindings
    // -----------------------------------------------------------------

    /// Bind `observer` to the nearest ancestor observable named `name`.
    pub fn bind<T: Clone + PartialEq + 'static>(
        &mut self,
        observer: &Observer<T>,
        name: impl Into<String>,
    ) -> OnChange<T> {
        let observer = observer.clone();
        let name = name.into();
        let callback = Rc::new(RefCell::new(None));
        let pending = Rc::clone(&callback);
        self.bindings.push(Box::new(move |scope, act| {
            let callback = pending.borrow_mut().take();
            // Failures are logged by the observer; the binding stays inactive.
            let _ = observer.connect_inner(scope, &name, callback);
            act.bound.push(Rc::new(observer));
        }));
        OnChange { callback }
    }

    /// Release `observer` with this activation without binding it. For
    /// observers the component connects by itself.
    pub fn adopt<T: Clone + PartialEq + 'static>(&mut self, observer: &Observer<T>) -> &mut Self {
        let observer = observer.clone();
        self.bindings
            .push(Box::new(move |_, act| act.bound.push(Rc::new(observer))));
        self
    }

    /// Bind `sender` to an ancestor signal for sending only.
    pub fn sender<T: Clone + PartialEq + 'static>(
        &mut self,
        sender: &SignalObserver<T>,
        name: impl Into<String>,
    ) -> &mut Self {
        let sender = sender.clone();
        let name = name.into();
        self.bindings.push(Box::new(move |scope, act| {
            let _ = sender.as_observer().connect_inner(scope, &name, None);
            act.bound.push(Rc::new(sender));
        }));
        self
    }

    /// Make the component-owned `proxy` mirror the nearest ancestor
    /// observable named `name` in both directions.
    pub fn mirror<T: Clone + PartialEq + 'static>(
        &mut self,
        proxy: &Observable<T>,
        name: impl Into<String>,
    ) -> &mut Self {
        let proxy = proxy.clone();
        let name = name.into();
        self.bindings.push(Box::new(move |scope, act| {
            let status = match scope.resolve::<T>(&name) {
                Ok(resolved) => {
                    act.scope
                        .hold_mirror(TwoWayBinding::new(&resolved.observable, &proxy));
                    BindingStatus {
                        name,
                        kind: ObservableKind::Value,
                        connected: true,
                        source_path: Some(resolved.source_path),
                    }
                }
                Err(err) => {
                    err.emit();
                    BindingStatus {
                        name,
                        kind: ObservableKind::Value,
                        connected: false,
                        source_path: None,
                    }
                }
            };
            act.mirrors.push(status);
        }));
        self
    }

    // -----------------------------------------------------------------
    // Change listeners
    // -----------------------------------------------------------------

    /// Call `callback` whenever the component's own `observable` changes,
    /// and once on activation.
    pub fn listen<T: Clone + PartialEq + 'static>(
        &mut self,
        observable: &Observable<T>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        let observable = observable.clone();
        let callback: Callback<T> = Rc::new(callback);
        self.listeners
            .push(Box::new(move |_, act| act.listen(observable, callback)));
        self
    }

    /// Like [`listen`](Self::listen), but names one of the component's own
    /// exposed observables.
    pub fn listen_named<T: Clone + PartialEq + 'static>(
        &mut self,
        field: impl Into<String>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        let field = field.into();
        let callback: Callback<T> = Rc::new(callback);
        self.listeners.push(Box::new(move |exposed, act| {
            match exposed.typed::<T>(&field) {
                Lookup::Found(observable) => act.listen(observable, callback),
                Lookup::TypeMismatch { found } => tracing::error!(
                    field = %field,
                    origin = %act.origin,
                    expected = type_name::<T>(),
                    found,
                    "change listener type mismatch"
                ),
                Lookup::Missing => tracing::error!(
                    field = %field,
                    origin = %act.origin,
                    "change listener target not found"
                ),
            }
        }));
        self
    }

    // -----------------------------------------------------------------
    // Signal receivers
    // -----------------------------------------------------------------

    /// Call `callback` for every payload sent on the nearest ancestor signal
    /// named `name`. Never called on activation.
    pub fn receive<T: Clone + PartialEq + Default + 'static>(
        &mut self,
        name: impl Into<String>,
        callback: impl Fn(&T) + 'static,
    ) -> &mut Self {
        let name = name.into();
        let callback: Callback<T> = Rc::new(callback);
        self.receivers.push(Box::new(move |scope, act| {
            let receiver = SignalObserver::<T>::new();
            match receiver.as_observer().attach(scope, &name, Some(callback)) {
                Ok(()) => receiver.start_observing(),
                Err(err) => tracing::warn!(
                    name = %name,
                    origin = %act.origin,
                    payload = type_name::<T>(),
                    error = %err,
                    "couldn't connect signal receiver; check the payload type"
                ),
            }
            act.bound.push(Rc::new(receiver));
        }));
        self
    }

    // -----------------------------------------------------------------
    // Application
    // -----------------------------------------------------------------

    pub(crate) fn apply(self, tree: &Tree, exposed: &ObservableSet) -> ActiveComponent {
        let Self {
            node,
            component,
            scope,
            injections,
            bindings,
            listeners,
            receivers,
        } = self;

        tracing::debug!(
            origin = %scope.origin(),
            injections = injections.len(),
            bindings = bindings.len(),
            listeners = listeners.len(),
            receivers = receivers.len(),
            "activating {component:?}"
        );

        for inject in injections {
            inject(tree, node);
        }

        let mut act = Activation::new(scope.origin());
        for bind in bindings {
            bind(&scope, &mut act);
        }
        for listen in listeners {
            listen(exposed, &mut act);
        }

        let observers: Vec<_> = act.bound.clone();
        for bound in &observers {
            bound.start();
        }
        for initial in std::mem::take(&mut act.initial) {
            initial();
        }

        for receive in receivers {
            receive(&scope, &mut act);
        }

        ActiveComponent {
            scope: act.scope,
            bound: act.bound,
            mirrors: act.mirrors,
            sync: None,
        }
    }
}
