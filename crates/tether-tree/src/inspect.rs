#![forbid(unsafe_code)]

//! Read/write hooks for tooling: what a component exposes, what it is bound
//! to, and a way to poke values from outside.

use std::any::Any;
use std::fmt;

use tether_reactive::ObservableKind;

use crate::component::{ComponentId, short_type_name};
use crate::declare::BindingStatus;
use crate::error::{InspectError, TreeError};
use crate::tree::{NodeId, Tree};

/// One exposed observable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldReport {
    pub name: String,
    pub kind: ObservableKind,
    pub type_name: &'static str,
    pub value: String,
    pub version: u64,
}

/// One component on a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentReport {
    pub id: ComponentId,
    pub type_name: &'static str,
    pub active: bool,
    pub synced: bool,
    pub fields: Vec<FieldReport>,
    pub bindings: Vec<BindingStatus>,
}

/// Snapshot of a node and its components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeReport {
    pub node: NodeId,
    pub path: String,
    pub active_in_hierarchy: bool,
    pub components: Vec<ComponentReport>,
}

impl fmt::Display for NodeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.active_in_hierarchy { "" } else { " (inactive)" };
        writeln!(f, "{}{state}", self.path)?;
        for component in &self.components {
            let sync = if component.synced { " [synced]" } else { "" };
            writeln!(f, "  {}{sync}", short_type_name(component.type_name))?;
            for field in &component.fields {
                let tag = match field.kind {
                    ObservableKind::Value => "",
                    ObservableKind::Signal => " (signal)",
                };
                writeln!(
                    f,
                    "    {}{tag} = {} (v{})",
                    field.name, field.value, field.version
                )?;
            }
            for binding in &component.bindings {
                match (&binding.source_path, binding.connected) {
                    (Some(source), true) => writeln!(f, "    <- {} @ {source}", binding.name)?,
                    _ => writeln!(f, "    <- {} (unbound)", binding.name)?,
                }
            }
        }
        Ok(())
    }
}

impl Tree {
    /// Describe `node`: every component's exposed values and bindings.
    pub fn inspect(&self, node: NodeId) -> Result<NodeReport, TreeError> {
        let path = self.path(node).ok_or(TreeError::UnknownNode(node))?;
        let components = self
            .slots(node)
            .iter()
            .enumerate()
            .map(|(index, slot)| ComponentReport {
                id: ComponentId { node, index },
                type_name: slot.type_name,
                active: slot.active.is_some(),
                synced: slot.component.synced(),
                fields: slot
                    .exposed
                    .iter()
                    .map(|entry| FieldReport {
                        name: entry.name().to_owned(),
                        kind: entry.kind(),
                        type_name: entry.handle().value_type_name(),
                        value: entry.handle().debug_value(),
                        version: entry.handle().version(),
                    })
                    .collect(),
                bindings: slot
                    .active
                    .as_ref()
                    .map(|active| active.statuses())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(NodeReport {
            node,
            path,
            active_in_hierarchy: self.is_active_in_hierarchy(node),
            components,
        })
    }

    /// Write `value` into the exposed observable `field` of `component`.
    /// Subscribers are always notified, even when the value is unchanged.
    pub fn write_value(
        &self,
        component: ComponentId,
        field: &str,
        value: Box<dyn Any>,
    ) -> Result<(), InspectError> {
        let slot = self
            .slot(component)
            .ok_or(TreeError::UnknownComponent(component))?;
        let entry = slot
            .exposed
            .get(field)
            .ok_or_else(|| InspectError::UnknownField {
                component,
                field: field.to_owned(),
            })?;
        entry
            .handle()
            .set_boxed(value, true)
            .map_err(|_| InspectError::WrongType {
                field: field.to_owned(),
                expected: entry.handle().value_type_name(),
            })?;
        tracing::debug!(component = ?component, field, "value written");
        Ok(())
    }

    /// Version counter of an exposed observable, for cheap change detection.
    pub fn field_version(&self, component: ComponentId, field: &str) -> Result<u64, InspectError> {
        let slot = self
            .slot(component)
            .ok_or(TreeError::UnknownComponent(component))?;
        slot.exposed
            .get(field)
            .map(|entry| entry.handle().version())
            .ok_or_else(|| InspectError::UnknownField {
                component,
                field: field.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Component, Declarations, Observer};
    use std::cell::Cell;
    use std::rc::Rc;
    use tether_reactive::{Observable, ObservableSet, Signal};

    struct Model {
        count: Observable<i32>,
        ping: Signal,
    }

    impl Component for Model {
        fn expose(&self, set: &mut ObservableSet) {
            set.expose("count", &self.count);
            set.expose_signal("ping", &self.ping);
        }
    }

    struct Reader {
        count: Observer<i32>,
        missing: Observer<String>,
    }

    impl Component for Reader {
        fn declare(&self, decl: &mut Declarations) {
            decl.bind(&self.count, "count");
            decl.bind(&self.missing, "nothing");
        }
    }

    fn setup() -> (Tree, NodeId, NodeId, ComponentId, Rc<Model>) {
        let mut tree = Tree::new();
        let root = tree.add_root("root");
        let model = Rc::new(Model {
            count: Observable::with_dispatcher(tree.dispatcher(), 3),
            ping: Signal::with_dispatcher(tree.dispatcher()),
        });
        let model_id = tree.add_component(root, Rc::clone(&model)).unwrap();
        let leaf = tree.add_child(root, "leaf").unwrap();
        tree.add_component(
            leaf,
            Rc::new(Reader {
                count: Observer::new(0),
                missing: Observer::new(String::new()),
            }),
        )
        .unwrap();
        (tree, root, leaf, model_id, model)
    }

    #[test]
    fn report_lists_fields_and_bindings() {
        let (tree, root, leaf, _, _) = setup();

        let report = tree.inspect(root).unwrap();
        assert_eq!(report.path, "/root");
        let fields = &report.components[0].fields;
        assert_eq!(fields[0].name, "count");
        assert_eq!(fields[0].value, "3");
        assert_eq!(fields[1].kind, ObservableKind::Signal);

        let report = tree.inspect(leaf).unwrap();
        let bindings = &report.components[0].bindings;
        assert_eq!(bindings.len(), 2);
        assert!(bindings[0].connected);
        assert_eq!(bindings[0].source_path.as_deref(), Some("/root/Model"));
        assert!(!bindings[1].connected);

        let text = report.to_string();
        assert!(text.contains("<- count @ /root/Model"));
        assert!(text.contains("<- nothing (unbound)"));
    }

    #[test]
    fn write_value_forces_dispatch() {
        let (tree, _, _, model_id, model) = setup();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = model.count.subscribe(move |_| h.set(h.get() + 1));

        tree.write_value(model_id, "count", Box::new(3)).unwrap();
        assert_eq!(hits.get(), 1, "same value still notifies");

        let before = tree.field_version(model_id, "count").unwrap();
        tree.write_value(model_id, "count", Box::new(8)).unwrap();
        assert_eq!(model.count.get(), 8);
        assert!(tree.field_version(model_id, "count").unwrap() > before);
    }

    #[test]
    fn write_value_errors() {
        let (tree, _, _, model_id, _) = setup();
        assert!(matches!(
            tree.write_value(model_id, "nope", Box::new(1)),
            Err(InspectError::UnknownField { .. })
        ));
        assert_eq!(
            tree.write_value(model_id, "count", Box::new("text")),
            Err(InspectError::WrongType {
                field: "count".into(),
                expected: "i32"
            })
        );
        let bogus = ComponentId {
            node: model_id.node,
            index: 9,
        };
        assert_eq!(
            tree.field_version(bogus, "count"),
            Err(InspectError::Tree(TreeError::UnknownComponent(bogus)))
        );
    }
}
