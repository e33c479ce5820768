#![forbid(unsafe_code)]

//! Built-in scenarios: a scene plus a short script driving it.

use std::rc::Rc;

use tether_tree::{NodeId, TreeError};

use crate::components::{
    BoundLabel, ControllerDemo, ControllerWithObservablesDemo, DataProxyDemo, ItemView, ModelDemo,
    SignalReceiverDemo, SignalSenderDemo, SyncedCounter,
};
use crate::scene::{ComponentRegistry, Scene, SceneError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Controllers following the nearest `message`.
    Basic,
    /// A proxy republishing an ancestor value.
    Proxy,
    /// Signal senders and receivers.
    Signals,
    /// A label whose binding name changes at runtime.
    Rebind,
    /// Replicated counters.
    Synced,
    /// Children generated from a list.
    List,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Basic,
        Scenario::Proxy,
        Scenario::Signals,
        Scenario::Rebind,
        Scenario::Synced,
        Scenario::List,
    ];

    /// TOML source of the scenario's scene.
    #[must_use]
    pub fn scene_source(self) -> &'static str {
        match self {
            Scenario::Basic => include_str!("../scenes/basic.toml"),
            Scenario::Proxy => include_str!("../scenes/proxy.toml"),
            Scenario::Signals => include_str!("../scenes/signals.toml"),
            Scenario::Rebind => include_str!("../scenes/rebind.toml"),
            Scenario::Synced => include_str!("../scenes/synced.toml"),
            Scenario::List => include_str!("../scenes/list.toml"),
        }
    }

    pub fn load(self, registry: &ComponentRegistry) -> Result<Scene, SceneError> {
        Scene::parse(self.scene_source(), registry)
    }

    /// Drive `scene`, which must have been built from
    /// [`scene_source`](Self::scene_source).
    pub fn run(self, scene: &mut Scene) -> Result<(), SceneError> {
        let _span = tracing::info_span!("scenario", name = ?self).entered();
        match self {
            Scenario::Basic => basic(scene),
            Scenario::Proxy => proxy(scene),
            Scenario::Signals => signals(scene),
            Scenario::Rebind => rebind(scene),
            Scenario::Synced => synced(scene),
            Scenario::List => list(scene),
        }
    }
}

fn basic(scene: &mut Scene) -> Result<(), SceneError> {
    let model = scene.component::<ModelDemo>("/root")?;
    let controller = scene.component::<ControllerDemo>("/root/controller")?;

    model.message.set("Updated".into());
    {
        let _block = scene.tree.dispatcher().begin_change_block();
        model.message.set("first".into());
        model.message.set("second".into());
        tracing::info!(
            delivered = controller.seen.borrow().len(),
            "two writes inside a change block"
        );
    }
    tracing::info!(seen = ?controller.seen.borrow(), "controller transcript");
    Ok(())
}

fn proxy(scene: &mut Scene) -> Result<(), SceneError> {
    let model = scene.component::<ModelDemo>("/root")?;
    let proxy = scene.component::<DataProxyDemo>("/root/proxy")?;
    let view = scene.component::<ControllerDemo>("/root/proxy/view")?;

    model.message.set("changed at the root".into());
    view.message.set("written by the view".into());
    tracing::info!(
        root = %model.message.get(),
        proxy = %proxy.message.get(),
        changes = proxy.changes.get(),
        "proxy in sync"
    );
    Ok(())
}

fn signals(scene: &mut Scene) -> Result<(), SceneError> {
    let hub = scene.component::<ControllerWithObservablesDemo>("/hub")?;
    let sender = scene.component::<SignalSenderDemo>("/hub/sender")?;
    let late = scene.component::<SignalReceiverDemo>("/hub/late")?;

    hub.announce("hello");
    sender.send("from a sibling");
    let late_node = scene.require_node("/hub/late")?;
    scene.tree.activate(late_node)?;
    hub.announce("hello again");
    tracing::info!(late = ?late.received.borrow(), "late receiver transcript");
    Ok(())
}

fn rebind(scene: &mut Scene) -> Result<(), SceneError> {
    let node = scene.require_node("/root/label")?;
    let label = scene.component::<BoundLabel>("/root/label")?;
    let id = scene
        .tree
        .component_ids(node)
        .first()
        .copied()
        .ok_or_else(|| SceneError::MissingComponent {
            node: "/root/label".into(),
            kind: std::any::type_name::<BoundLabel>(),
        })?;

    tracing::info!(text = %label.rendered(), "label before rebinding");
    scene
        .tree
        .write_value(id, "binding_field", Box::new(String::from("label")))?;
    tracing::info!(text = %label.rendered(), "label after rebinding");
    Ok(())
}

fn synced(scene: &mut Scene) -> Result<(), SceneError> {
    let a = scene.component::<SyncedCounter>("/root/a")?;
    let c = scene.component::<SyncedCounter>("/root/c")?;
    let a_node = scene.require_node("/root/a")?;
    let c_node = scene.require_node("/root/c")?;

    a.count.set(5);
    scene.tree.activate(c_node)?;
    tracing::info!(c = c.count.get(), "late member seeded");
    scene.tree.destroy(a_node)?;
    let b = scene.component::<SyncedCounter>("/root/b")?;
    b.count.set(9);
    tracing::info!(
        c = c.count.get(),
        members = scene.tree.synced_instances::<SyncedCounter>(),
        "after destroying a"
    );
    Ok(())
}

fn list(scene: &mut Scene) -> Result<(), SceneError> {
    let model = scene.component::<ModelDemo>("/root")?;
    let list = scene.require_node("/root/list")?;

    sync_items(scene, list, &model.items.get())?;
    model.items.update(|items| {
        items.truncate(1);
        items.push("delta".into());
    });
    sync_items(scene, list, &model.items.get())?;
    Ok(())
}

/// Make `list` have one [`ItemView`] child per entry of `items`, labelled
/// in order.
pub fn sync_items(scene: &mut Scene, list: NodeId, items: &[String]) -> Result<(), SceneError> {
    let mut failure: Option<TreeError> = None;
    scene
        .tree
        .adjust_child_count(list, items.len(), |tree, parent, index| {
            let created = tree.add_child(parent, format!("item{index}")).and_then(|child| {
                let view = ItemView::new(tree.dispatcher(), "");
                tree.add_component(child, Rc::new(view)).map(|_| ())
            });
            if let Err(err) = created {
                failure.get_or_insert(err);
            }
        })?;
    if let Some(err) = failure {
        return Err(err.into());
    }

    for (child, label) in scene.tree.children(list).iter().zip(items) {
        if let Some(view) = scene.tree.component::<ItemView>(*child) {
            view.label.set(label.clone());
        }
    }
    tracing::info!(count = items.len(), "list synchronized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_scene_parses() {
        let registry = ComponentRegistry::with_demo_components();
        for scenario in Scenario::ALL {
            let scene = scenario.load(&registry);
            assert!(scene.is_ok(), "{scenario:?}: {:?}", scene.err());
        }
    }
}
