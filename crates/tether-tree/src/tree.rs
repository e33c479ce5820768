#![forbid(unsafe_code)]

//! The component tree.
//!
//! Nodes live in a generational arena: a [`NodeId`] is an index plus a
//! generation, and destroying a node bumps its slot's generation so stale
//! ids are rejected instead of aliasing a recycled node.
//!
//! # Activation
//!
//! A node is *active in hierarchy* when it and every ancestor are locally
//! active. Components on such nodes are active: their declarations have been
//! applied and their observables count as data sources. Activation runs
//! pre-order (ancestors first, so their data sources are live before
//! descendants bind) and, within a node, in insertion order. Deactivation
//! runs in exactly the reverse order.
//!
//! Reparenting is a deactivate, move, reactivate sequence, so every binding
//! in the moved subtree re-resolves against its new ancestors.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tether_reactive::{Dispatcher, ObservableSet};

use crate::component::{Component, ComponentId, short_type_name};
use crate::declare::{ActiveComponent, Declarations};
use crate::error::TreeError;
use crate::scope::{ScopeChain, ScopeLevel, SourceRef};
use crate::sync::SyncRegistry;

/// Generational handle to a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Build an id from its raw parts. Mostly useful in tests; ids obtained
    /// this way are only valid if the tree actually issued them.
    #[must_use]
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

pub(crate) struct ComponentSlot {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) component: Rc<dyn Component>,
    any: Rc<dyn Any>,
    pub(crate) exposed: Rc<ObservableSet>,
    pub(crate) active: Option<ActiveComponent>,
}

impl ComponentSlot {
    fn downcast<C: Component>(&self) -> Option<Rc<C>> {
        if self.type_id != TypeId::of::<C>() {
            return None;
        }
        Rc::clone(&self.any).downcast::<C>().ok()
    }
}

struct Node {
    name: String,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    active_self: bool,
    components: Vec<ComponentSlot>,
}

struct Entry {
    generation: u32,
    node: Option<Node>,
}

/// Arena of nodes carrying components.
pub struct Tree {
    entries: Vec<Entry>,
    free: Vec<u32>,
    roots: Vec<NodeId>,
    dispatcher: Dispatcher,
    sync: SyncRegistry,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.len())
            .field("roots", &self.roots)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl Tree {
    /// Empty tree with its own dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dispatcher(Dispatcher::new())
    }

    /// Empty tree routing changes through `dispatcher`.
    #[must_use]
    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
            dispatcher,
            sync: SyncRegistry::default(),
        }
    }

    /// The dispatcher components of this tree should create observables on.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.node.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    // ------------------------------------------------------------------
    // Arena plumbing
    // ------------------------------------------------------------------

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.entries
            .get(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.node.as_mut())
    }

    fn require(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.node(id).ok_or(TreeError::UnknownNode(id))
    }

    fn require_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.node_mut(id).ok_or(TreeError::UnknownNode(id))
    }

    fn alloc(&mut self, name: String, parent: Option<NodeId>) -> NodeId {
        let node = Node {
            name,
            parent,
            children: SmallVec::new(),
            active_self: true,
            components: Vec::new(),
        };
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.node = Some(node);
            NodeId::from_raw(index, entry.generation)
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Entry {
                generation: 0,
                node: Some(node),
            });
            NodeId::from_raw(index, 0)
        }
    }

    fn release(&mut self, id: NodeId) {
        if let Some(entry) = self.entries.get_mut(id.index as usize) {
            if entry.generation == id.generation && entry.node.take().is_some() {
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(id.index);
            }
        }
    }

    pub(crate) fn slot(&self, id: ComponentId) -> Option<&ComponentSlot> {
        self.node(id.node).and_then(|n| n.components.get(id.index))
    }

    fn slot_mut(&mut self, id: ComponentId) -> Option<&mut ComponentSlot> {
        self.node_mut(id.node)
            .and_then(|n| n.components.get_mut(id.index))
    }

    pub(crate) fn slots(&self, node: NodeId) -> &[ComponentSlot] {
        self.node(node)
            .map(|n| n.components.as_slice())
            .unwrap_or(&[])
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Add a top-level node.
    pub fn add_root(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.alloc(name.into(), None);
        self.roots.push(id);
        id
    }

    /// Append a new, locally active child to `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
    ) -> Result<NodeId, TreeError> {
        self.require(parent)?;
        let id = self.alloc(name.into(), Some(parent));
        self.require_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Attach `component` to `node`. Its observables are collected once,
    /// here; if the node is active in hierarchy the component activates
    /// immediately.
    pub fn add_component<C: Component>(
        &mut self,
        node: NodeId,
        component: Rc<C>,
    ) -> Result<ComponentId, TreeError> {
        self.require(node)?;

        let mut exposed = ObservableSet::new();
        component.expose(&mut exposed);

        let any: Rc<dyn Any> = component.clone();
        let slot = ComponentSlot {
            type_id: TypeId::of::<C>(),
            type_name: type_name::<C>(),
            component,
            any,
            exposed: Rc::new(exposed),
            active: None,
        };
        let components = &mut self.require_mut(node)?.components;
        components.push(slot);
        let id = ComponentId {
            node,
            index: components.len() - 1,
        };

        if self.is_active_in_hierarchy(node) {
            self.activate_component(id);
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Set the local active flag of `node`, activating or deactivating the
    /// affected subtree.
    pub fn set_active(&mut self, node: NodeId, active: bool) -> Result<(), TreeError> {
        if self.require(node)?.active_self == active {
            return Ok(());
        }
        if active {
            self.require_mut(node)?.active_self = true;
            if self.is_active_in_hierarchy(node) {
                self.activate_subtree(node);
            }
        } else {
            if self.is_active_in_hierarchy(node) {
                self.deactivate_subtree(node);
            }
            self.require_mut(node)?.active_self = false;
        }
        Ok(())
    }

    pub fn activate(&mut self, node: NodeId) -> Result<(), TreeError> {
        self.set_active(node, true)
    }

    pub fn deactivate(&mut self, node: NodeId) -> Result<(), TreeError> {
        self.set_active(node, false)
    }

    /// Deactivate and remove `node` with its whole subtree.
    pub fn destroy(&mut self, node: NodeId) -> Result<(), TreeError> {
        let parent = self.require(node)?.parent;
        if self.is_active_in_hierarchy(node) {
            self.deactivate_subtree(node);
        }
        self.detach(node, parent);

        let doomed = self.subtree(node, |_| true);
        tracing::debug!(node = ?node, nodes = doomed.len(), "destroy");
        for id in doomed {
            self.release(id);
        }
        Ok(())
    }

    /// Move `node` under `new_parent` (or make it a root). Bindings in the
    /// moved subtree are released and resolved again from the new position.
    pub fn reparent(&mut self, node: NodeId, new_parent: Option<NodeId>) -> Result<(), TreeError> {
        let old_parent = self.require(node)?.parent;
        if let Some(parent) = new_parent {
            self.require(parent)?;
            if self.ancestors_inclusive(parent).contains(&node) {
                return Err(TreeError::Cycle { node, parent });
            }
        }

        let was_active = self.is_active_in_hierarchy(node);
        if was_active {
            self.deactivate_subtree(node);
        }

        self.detach(node, old_parent);
        match new_parent {
            Some(parent) => self.require_mut(parent)?.children.push(node),
            None => self.roots.push(node),
        }
        self.require_mut(node)?.parent = new_parent;
        tracing::debug!(node = ?node, from = ?old_parent, to = ?new_parent, "reparent");

        if self.is_active_in_hierarchy(node) {
            self.activate_subtree(node);
        }
        Ok(())
    }

    fn detach(&mut self, node: NodeId, parent: Option<NodeId>) {
        match parent.and_then(|p| self.node_mut(p)) {
            Some(parent) => parent.children.retain(|c| *c != node),
            None => self.roots.retain(|r| *r != node),
        }
    }

    fn activate_subtree(&mut self, root: NodeId) {
        for node in self.subtree(root, |n| n.active_self) {
            for index in 0..self.slots(node).len() {
                self.activate_component(ComponentId { node, index });
            }
        }
    }

    fn deactivate_subtree(&mut self, root: NodeId) {
        for node in self.subtree(root, |n| n.active_self).into_iter().rev() {
            for index in (0..self.slots(node).len()).rev() {
                self.deactivate_component(ComponentId { node, index });
            }
        }
    }

    fn activate_component(&mut self, id: ComponentId) {
        let Some(slot) = self.slot(id) else { return };
        if slot.active.is_some() {
            return;
        }
        let component = Rc::clone(&slot.component);
        let exposed = Rc::clone(&slot.exposed);
        let (type_id, type_name) = (slot.type_id, slot.type_name);

        let Some(scope) = self.component_scope(id) else { return };
        let mut decl = Declarations::new(id, scope.clone());
        component.declare(&mut decl);
        let mut active = decl.apply(self, &exposed);

        if component.synced() {
            if exposed.is_empty() {
                tracing::warn!(origin = %scope.origin(), "synced component exposes nothing");
            } else {
                active.sync = Some(self.sync.join(type_id, type_name, id, &exposed));
            }
        }

        if let Some(slot) = self.slot_mut(id) {
            slot.active = Some(active);
        }
    }

    fn deactivate_component(&mut self, id: ComponentId) {
        let active = self.slot_mut(id).and_then(|slot| slot.active.take());
        if active.is_some() {
            tracing::debug!(component = ?id, "deactivate");
        }
        drop(active);
    }

    /// Pre-order walk of `root`'s subtree, descending only into nodes that
    /// pass `enter`.
    fn subtree(&self, root: NodeId, enter: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            if !enter(node) {
                continue;
            }
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    fn ancestors_inclusive(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.node(id) else { break };
            out.push(id);
            current = n.parent;
        }
        out
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    #[must_use]
    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(|n| n.name.as_str())
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }

    /// Children in order; empty for unknown nodes.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn child(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.children(node).get(index).copied()
    }

    #[must_use]
    pub fn child_count(&self, node: NodeId) -> usize {
        self.children(node).len()
    }

    /// Absolute path such as `/root/child/leaf`.
    #[must_use]
    pub fn path(&self, node: NodeId) -> Option<String> {
        self.node(node)?;
        let names: Vec<&str> = self
            .ancestors_inclusive(node)
            .into_iter()
            .rev()
            .filter_map(|id| self.name(id))
            .collect();
        Some(format!("/{}", names.join("/")))
    }

    /// Descendant reached by following child names in the relative `path`
    /// (`"a/b"`). An empty path yields `node` itself.
    #[must_use]
    pub fn find(&self, node: NodeId, path: &str) -> Option<NodeId> {
        self.node(node)?;
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(node, |current, segment| {
                self.children(current)
                    .iter()
                    .copied()
                    .find(|c| self.name(*c) == Some(segment))
            })
    }

    #[must_use]
    pub fn is_active_self(&self, node: NodeId) -> bool {
        self.node(node).is_some_and(|n| n.active_self)
    }

    /// Whether `node` and all its ancestors are locally active.
    #[must_use]
    pub fn is_active_in_hierarchy(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            match self.node(id) {
                Some(n) if n.active_self => current = n.parent,
                _ => return false,
            }
        }
        true
    }

    /// Whether the component's declarations are currently applied.
    #[must_use]
    pub fn is_component_active(&self, id: ComponentId) -> bool {
        self.slot(id).is_some_and(|s| s.active.is_some())
    }

    /// Ids of every component on `node`, in insertion order.
    #[must_use]
    pub fn component_ids(&self, node: NodeId) -> Vec<ComponentId> {
        (0..self.slots(node).len())
            .map(|index| ComponentId { node, index })
            .collect()
    }

    /// Typed handle to the component at `id`.
    #[must_use]
    pub fn get_component<C: Component>(&self, id: ComponentId) -> Option<Rc<C>> {
        self.slot(id).and_then(ComponentSlot::downcast::<C>)
    }

    /// First `C` on `node`.
    #[must_use]
    pub fn component<C: Component>(&self, node: NodeId) -> Option<Rc<C>> {
        self.slots(node).iter().find_map(ComponentSlot::downcast::<C>)
    }

    /// Every `C` on `node`.
    #[must_use]
    pub fn components<C: Component>(&self, node: NodeId) -> Vec<Rc<C>> {
        self.slots(node)
            .iter()
            .filter_map(ComponentSlot::downcast::<C>)
            .collect()
    }

    /// First `C` on `node` or its descendants, depth first.
    #[must_use]
    pub fn component_in_children<C: Component>(
        &self,
        node: NodeId,
        include_inactive: bool,
    ) -> Option<Rc<C>> {
        self.subtree(node, |_| true)
            .into_iter()
            .filter(|n| include_inactive || self.is_active_in_hierarchy(*n))
            .find_map(|n| self.component::<C>(n))
    }

    #[must_use]
    pub fn components_in_children<C: Component>(
        &self,
        node: NodeId,
        include_inactive: bool,
    ) -> Vec<Rc<C>> {
        self.subtree(node, |_| true)
            .into_iter()
            .filter(|n| include_inactive || self.is_active_in_hierarchy(*n))
            .flat_map(|n| self.components::<C>(n))
            .collect()
    }

    /// First `C` on `node` or its ancestors, nearest first.
    #[must_use]
    pub fn component_in_parent<C: Component>(
        &self,
        node: NodeId,
        include_inactive: bool,
    ) -> Option<Rc<C>> {
        self.ancestors_inclusive(node)
            .into_iter()
            .filter(|n| include_inactive || self.is_active_in_hierarchy(*n))
            .find_map(|n| self.component::<C>(n))
    }

    #[must_use]
    pub fn components_in_parent<C: Component>(
        &self,
        node: NodeId,
        include_inactive: bool,
    ) -> Vec<Rc<C>> {
        self.ancestors_inclusive(node)
            .into_iter()
            .filter(|n| include_inactive || self.is_active_in_hierarchy(*n))
            .flat_map(|n| self.components::<C>(n))
            .collect()
    }

    /// Live synced instances of `C`.
    #[must_use]
    pub fn synced_instances<C: Component>(&self) -> usize {
        self.sync.instances(TypeId::of::<C>())
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Resolution context for bindings made on behalf of `node`.
    pub fn scope_for(&self, node: NodeId) -> Result<ScopeChain, TreeError> {
        let origin = self.path(node).ok_or(TreeError::UnknownNode(node))?;
        Ok(self.build_scope(node, origin))
    }

    fn component_scope(&self, id: ComponentId) -> Option<ScopeChain> {
        let slot = self.slot(id)?;
        let origin = format!(
            "{}/{}",
            self.path(id.node)?,
            short_type_name(slot.type_name)
        );
        Some(self.build_scope(id.node, origin))
    }

    fn build_scope(&self, node: NodeId, origin: String) -> ScopeChain {
        let mut levels = Vec::new();
        let mut current = self.parent(node);
        while let Some(id) = current {
            let sources: Vec<SourceRef> = self
                .slots(id)
                .iter()
                .enumerate()
                .filter(|(_, s)| s.active.is_some() && !s.exposed.is_empty())
                .map(|(index, s)| SourceRef {
                    component: ComponentId { node: id, index },
                    path: format!(
                        "{}/{}",
                        self.path(id).unwrap_or_default(),
                        short_type_name(s.type_name)
                    ),
                    observables: Rc::clone(&s.exposed),
                })
                .collect();
            if !sources.is_empty() {
                levels.push(ScopeLevel { node: id, sources });
            }
            current = self.parent(id);
        }
        ScopeChain::new(origin, self.dispatcher.clone(), levels)
    }

    // ------------------------------------------------------------------
    // Child-count management
    // ------------------------------------------------------------------

    /// Destroy the child at `index`. Out-of-range indices are ignored.
    pub fn destroy_child(&mut self, node: NodeId, index: usize) -> Result<bool, TreeError> {
        let Some(child) = self.require(node)?.children.get(index).copied() else {
            return Ok(false);
        };
        self.destroy(child)?;
        Ok(true)
    }

    /// Destroy every child of `node`, last first. Returns how many.
    pub fn destroy_children(&mut self, node: NodeId) -> Result<usize, TreeError> {
        let count = self.require(node)?.children.len();
        for index in (0..count).rev() {
            self.destroy_child(node, index)?;
        }
        Ok(count)
    }

    /// Destroy trailing children until at most `target` remain.
    pub fn decrease_child_count(&mut self, node: NodeId, target: usize) -> Result<(), TreeError> {
        let mut count = self.require(node)?.children.len();
        while count > target {
            self.destroy_child(node, count - 1)?;
            count -= 1;
        }
        Ok(())
    }

    /// Call `create(tree, node, index)` for every missing index up to
    /// `target`. The callback is expected to add one child per call.
    pub fn increase_child_count(
        &mut self,
        node: NodeId,
        target: usize,
        mut create: impl FnMut(&mut Tree, NodeId, usize),
    ) -> Result<(), TreeError> {
        let start = self.require(node)?.children.len();
        for index in start..target {
            create(self, node, index);
        }
        Ok(())
    }

    /// Destroy or create children until `node` has `target` of them.
    pub fn adjust_child_count(
        &mut self,
        node: NodeId,
        target: usize,
        create: impl FnMut(&mut Tree, NodeId, usize),
    ) -> Result<(), TreeError> {
        self.decrease_child_count(node, target)?;
        self.increase_child_count(node, target, create)
    }
}
