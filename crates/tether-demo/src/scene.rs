#![forbid(unsafe_code)]

//! TOML scene files.
//!
//! A scene is a forest of nodes. Each node has a name, a local active flag,
//! a list of components and a list of children:
//!
//! ```toml
//! [[nodes]]
//! name = "root"
//!
//! [[nodes.components]]
//! kind = "ModelDemo"
//! values = { message = "hello", items = ["a", "b"] }
//!
//! [[nodes.children]]
//! name = "controller"
//! active = false
//!
//! [[nodes.children.components]]
//! kind = "ControllerDemo"
//! ```
//!
//! Component kinds are looked up in a [`ComponentRegistry`]. The whole
//! scene is built while its roots are inactive; roots are activated last,
//! so every component activates after the complete structure exists.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;
use tether_reactive::Dispatcher;
use tether_tree::{Component, ComponentId, InspectError, NodeId, NodeReport, Tree, TreeError};

use crate::components::{
    BoundLabel, ControllerDemo, ControllerWithObservablesDemo, DataProxyDemo, ItemView, ModelDemo,
    SignalReceiverDemo, SignalSenderDemo, SyncedCounter,
};

/// Errors from loading or driving a scene.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("failed to read scene {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed scene: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown component kind `{kind}` on {node}")]
    UnknownKind { kind: String, node: String },
    #[error("`{kind}.{key}` must be {expected}")]
    InvalidValue {
        kind: String,
        key: String,
        expected: &'static str,
    },
    #[error("no node at {0}")]
    MissingNode(String),
    #[error("no {kind} on {node}")]
    MissingComponent { node: String, kind: &'static str },
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Inspect(#[from] InspectError),
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

/// Parsed scene file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneSpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default = "active_by_default")]
    pub active: bool,
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub kind: String,
    #[serde(default)]
    pub values: toml::Table,
}

impl SceneSpec {
    pub fn parse(text: &str) -> Result<Self, SceneError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let text = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Initial values of one component entry, with typed accessors.
pub struct Values<'a> {
    kind: &'a str,
    table: &'a toml::Table,
}

impl<'a> Values<'a> {
    #[must_use]
    pub fn new(kind: &'a str, table: &'a toml::Table) -> Self {
        Self { kind, table }
    }

    fn invalid(&self, key: &str, expected: &'static str) -> SceneError {
        SceneError::InvalidValue {
            kind: self.kind.to_owned(),
            key: key.to_owned(),
            expected,
        }
    }

    pub fn string(&self, key: &str, default: &str) -> Result<String, SceneError> {
        match self.table.get(key) {
            None => Ok(default.to_owned()),
            Some(value) => value
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| self.invalid(key, "a string")),
        }
    }

    pub fn integer(&self, key: &str, default: i64) -> Result<i64, SceneError> {
        match self.table.get(key) {
            None => Ok(default),
            Some(value) => value.as_integer().ok_or_else(|| self.invalid(key, "an integer")),
        }
    }

    pub fn strings(&self, key: &str) -> Result<Vec<String>, SceneError> {
        let Some(value) = self.table.get(key) else {
            return Ok(Vec::new());
        };
        let array = value
            .as_array()
            .ok_or_else(|| self.invalid(key, "an array of strings"))?;
        array
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| self.invalid(key, "an array of strings"))
            })
            .collect()
    }
}

type Factory = Box<dyn Fn(&mut Tree, NodeId, &Values<'_>) -> Result<ComponentId, SceneError>>;

/// Maps component kind names to constructors.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: BTreeMap<String, Factory>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `kind`. `build` receives the tree's dispatcher so the
    /// component's observables join its change blocks.
    pub fn register<C: Component>(
        &mut self,
        kind: impl Into<String>,
        build: impl Fn(&Dispatcher, &Values<'_>) -> Result<C, SceneError> + 'static,
    ) -> &mut Self {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            tracing::warn!(kind = %kind, "component kind registered twice; replacing");
        }
        let factory: Factory = Box::new(
            move |tree: &mut Tree,
                  node: NodeId,
                  values: &Values<'_>|
                  -> Result<ComponentId, SceneError> {
                let component = build(tree.dispatcher(), values)?;
                Ok(tree.add_component(node, Rc::new(component))?)
            },
        );
        self.factories.insert(kind, factory);
        self
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    fn create(
        &self,
        tree: &mut Tree,
        node: NodeId,
        spec: &ComponentSpec,
    ) -> Result<ComponentId, SceneError> {
        let factory = self.factories.get(&spec.kind).ok_or_else(|| SceneError::UnknownKind {
            kind: spec.kind.clone(),
            node: tree.path(node).unwrap_or_default(),
        })?;
        factory(tree, node, &Values::new(&spec.kind, &spec.values))
    }

    /// Every component in [`crate::components`].
    #[must_use]
    pub fn with_demo_components() -> Self {
        let mut registry = Self::new();
        registry
            .register("ModelDemo", |d, v| {
                Ok(ModelDemo::new(d, v.string("message", "")?, v.strings("items")?))
            })
            .register("ControllerDemo", |_, _| Ok(ControllerDemo::new()))
            .register("ControllerWithObservablesDemo", |d, v| {
                Ok(ControllerWithObservablesDemo::new(d, v.string("message", "")?))
            })
            .register("DataProxyDemo", |d, _| Ok(DataProxyDemo::new(d)))
            .register("SignalSenderDemo", |_, _| Ok(SignalSenderDemo::new()))
            .register("SignalReceiverDemo", |_, _| Ok(SignalReceiverDemo::default()))
            .register("BoundLabel", |d, v| {
                Ok(BoundLabel::new(d, v.string("field", "message")?))
            })
            .register("SyncedCounter", |d, v| {
                Ok(SyncedCounter::new(d, v.integer("count", 0)?))
            })
            .register("ItemView", |d, v| Ok(ItemView::new(d, v.string("label", "")?)));
        registry
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// A tree built from a [`SceneSpec`], with nodes addressable by path.
pub struct Scene {
    pub tree: Tree,
    nodes: BTreeMap<String, NodeId>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Scene {
    pub fn build(spec: &SceneSpec, registry: &ComponentRegistry) -> Result<Self, SceneError> {
        let mut scene = Self {
            tree: Tree::new(),
            nodes: BTreeMap::new(),
        };
        let mut roots = Vec::with_capacity(spec.nodes.len());
        for node in &spec.nodes {
            let root = scene.tree.add_root(node.name.as_str());
            scene.tree.set_active(root, false)?;
            scene.populate(root, node, registry)?;
            roots.push((root, node.active));
        }
        for (root, active) in roots {
            scene.tree.set_active(root, active)?;
        }
        tracing::debug!(nodes = scene.nodes.len(), "scene built");
        Ok(scene)
    }

    pub fn parse(text: &str, registry: &ComponentRegistry) -> Result<Self, SceneError> {
        Self::build(&SceneSpec::parse(text)?, registry)
    }

    pub fn load(path: &Path, registry: &ComponentRegistry) -> Result<Self, SceneError> {
        Self::build(&SceneSpec::load(path)?, registry)
    }

    fn populate(
        &mut self,
        node: NodeId,
        spec: &NodeSpec,
        registry: &ComponentRegistry,
    ) -> Result<(), SceneError> {
        let path = self.tree.path(node).ok_or(TreeError::UnknownNode(node))?;
        if self.nodes.insert(path.clone(), node).is_some() {
            tracing::warn!(path = %path, "duplicate node path; lookups find the last one");
        }
        for component in &spec.components {
            registry.create(&mut self.tree, node, component)?;
        }
        for child_spec in &spec.children {
            let child = self.tree.add_child(node, child_spec.name.as_str())?;
            if !child_spec.active {
                self.tree.set_active(child, false)?;
            }
            self.populate(child, child_spec, registry)?;
        }
        Ok(())
    }

    /// Node at the absolute `path` (`"/root/child"`).
    #[must_use]
    pub fn node(&self, path: &str) -> Option<NodeId> {
        self.nodes.get(path).copied()
    }

    pub fn require_node(&self, path: &str) -> Result<NodeId, SceneError> {
        self.node(path)
            .ok_or_else(|| SceneError::MissingNode(path.to_owned()))
    }

    /// First `C` on the node at `path`.
    pub fn component<C: Component>(&self, path: &str) -> Result<Rc<C>, SceneError> {
        let node = self.require_node(path)?;
        self.tree
            .component::<C>(node)
            .ok_or_else(|| SceneError::MissingComponent {
                node: path.to_owned(),
                kind: std::any::type_name::<C>(),
            })
    }

    /// Reports for every live node, depth first.
    pub fn reports(&self) -> Result<Vec<NodeReport>, SceneError> {
        let mut reports = Vec::new();
        let mut stack: Vec<NodeId> = self.tree.roots().iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            reports.push(self.tree.inspect(node)?);
            stack.extend(self.tree.children(node).iter().rev().copied());
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_report_wrong_types() {
        let table: toml::Table = toml::from_str("message = 3\nitems = [\"a\", 1]").unwrap();
        let values = Values::new("ModelDemo", &table);
        assert!(matches!(
            values.string("message", ""),
            Err(SceneError::InvalidValue { expected: "a string", .. })
        ));
        assert!(values.strings("items").is_err());
        assert_eq!(values.string("absent", "fallback").unwrap(), "fallback");
        assert_eq!(values.integer("absent", 4).unwrap(), 4);
    }

    #[test]
    fn registry_lists_kinds_sorted() {
        let registry = ComponentRegistry::with_demo_components();
        let kinds: Vec<_> = registry.kinds().collect();
        assert_eq!(kinds.first(), Some(&"BoundLabel"));
        assert!(kinds.contains(&"SyncedCounter"));
        let mut sorted = kinds.clone();
        sorted.sort_unstable();
        assert_eq!(kinds, sorted);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = SceneSpec::parse("[[nodes]]\nname = \"a\"\ncolour = \"red\"").unwrap_err();
        assert!(matches!(err, SceneError::Parse(_)));
    }
}
