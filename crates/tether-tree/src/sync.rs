#![forbid(unsafe_code)]

//! Replication between live instances of one synced component type.
//!
//! The registry lives in the [`Tree`](crate::Tree), so two trees never see
//! each other's instances. Each concrete type gets a [`SyncGroup`] with its
//! own re-entrancy flag: a broadcast for one type never suppresses another.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;
use tether_reactive::{ObservableSet, Subscription};

use crate::component::ComponentId;

struct Member {
    id: ComponentId,
    set: Rc<ObservableSet>,
}

/// Live instances of one synced type, in join order.
pub(crate) struct SyncGroup {
    type_name: &'static str,
    members: RefCell<Vec<Member>>,
    dispatching: Cell<bool>,
}

impl SyncGroup {
    fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            members: RefCell::new(Vec::new()),
            dispatching: Cell::new(false),
        }
    }

    fn snapshot(&self) -> Vec<(ComponentId, Rc<ObservableSet>)> {
        self.members
            .borrow()
            .iter()
            .map(|m| (m.id, Rc::clone(&m.set)))
            .collect()
    }

    /// Push `from`'s current value of `field` to every other member.
    fn broadcast(&self, from: ComponentId, field: &str) {
        if self.dispatching.get() {
            return;
        }
        let members = self.snapshot();
        let Some(source) = members
            .iter()
            .find(|(id, _)| *id == from)
            .and_then(|(_, set)| set.get(field))
            .map(|entry| Rc::clone(entry.handle()))
        else {
            return;
        };

        self.dispatching.set(true);
        for (id, set) in &members {
            if *id == from {
                continue;
            }
            if let Some(target) = set.get(field) {
                if !target.handle().copy_from(source.as_ref(), true) {
                    tracing::error!(
                        field,
                        synced = self.type_name,
                        "synced field has a different type on {id:?}"
                    );
                }
            }
        }
        self.dispatching.set(false);
        tracing::trace!(field, synced = self.type_name, from = ?from, "broadcast");
    }

    fn leave(&self, id: ComponentId) {
        self.members.borrow_mut().retain(|m| m.id != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.members.borrow().len()
    }
}

/// A registered instance. Dropping it stops broadcasting and unregisters.
pub(crate) struct SyncMembership {
    group: Rc<SyncGroup>,
    id: ComponentId,
    _subscriptions: Vec<Subscription>,
}

impl Drop for SyncMembership {
    fn drop(&mut self) {
        self.group.leave(self.id);
        tracing::trace!(synced = self.group.type_name, id = ?self.id, "left sync group");
    }
}

/// Per-type groups of synced instances.
#[derive(Default)]
pub(crate) struct SyncRegistry {
    groups: AHashMap<TypeId, Rc<SyncGroup>>,
}

impl SyncRegistry {
    /// Register `id`, seed it from the first live instance and start
    /// broadcasting its changes.
    pub(crate) fn join(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        id: ComponentId,
        set: &Rc<ObservableSet>,
    ) -> SyncMembership {
        let group = Rc::clone(
            self.groups
                .entry(type_id)
                .or_insert_with(|| Rc::new(SyncGroup::new(type_name))),
        );

        let first = group.members.borrow().first().map(|m| Rc::clone(&m.set));
        if let Some(first) = first {
            group.dispatching.set(true);
            for entry in set.iter() {
                if let Some(source) = first.get(entry.name()) {
                    entry.handle().copy_from(source.handle().as_ref(), true);
                }
            }
            group.dispatching.set(false);
        }

        group.members.borrow_mut().push(Member {
            id,
            set: Rc::clone(set),
        });

        let subscriptions = set
            .iter()
            .map(|entry| {
                let weak = Rc::downgrade(&group);
                let field = entry.name().to_owned();
                entry.handle().subscribe_untyped(Box::new(move || {
                    if let Some(group) = weak.upgrade() {
                        group.broadcast(id, &field);
                    }
                }))
            })
            .collect();

        tracing::debug!(synced = type_name, id = ?id, members = group.len(), "joined sync group");
        SyncMembership {
            group,
            id,
            _subscriptions: subscriptions,
        }
    }

    /// Number of live instances of the type with `type_id`.
    pub(crate) fn instances(&self, type_id: TypeId) -> usize {
        self.groups.get(&type_id).map_or(0, |g| g.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeId;
    use tether_reactive::Observable;

    struct A;
    struct B;

    fn member(index: u32, value: i32) -> (ComponentId, Observable<i32>, Rc<ObservableSet>) {
        let count = Observable::new(value);
        let mut set = ObservableSet::new();
        set.expose("count", &count);
        let id = ComponentId {
            node: NodeId::from_raw(index, 0),
            index: 0,
        };
        (id, count, Rc::new(set))
    }

    #[test]
    fn joiner_copies_from_first_instance() {
        let mut registry = SyncRegistry::default();
        let (a_id, a, a_set) = member(0, 5);
        let (b_id, b, b_set) = member(1, 0);

        let _ma = registry.join(TypeId::of::<A>(), "A", a_id, &a_set);
        let _mb = registry.join(TypeId::of::<A>(), "A", b_id, &b_set);
        assert_eq!(b.get(), 5);
        assert_eq!(a.get(), 5);
        assert_eq!(registry.instances(TypeId::of::<A>()), 2);
    }

    #[test]
    fn changes_broadcast_without_feedback() {
        let mut registry = SyncRegistry::default();
        let (a_id, a, a_set) = member(0, 0);
        let (b_id, b, b_set) = member(1, 0);
        let _ma = registry.join(TypeId::of::<A>(), "A", a_id, &a_set);
        let _mb = registry.join(TypeId::of::<A>(), "A", b_id, &b_set);

        let a_hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&a_hits);
        let _sub = a.subscribe(move |_| h.set(h.get() + 1));

        a.set(9);
        assert_eq!(b.get(), 9);
        assert_eq!(a_hits.get(), 1, "no echo back to the writer");

        b.set(3);
        assert_eq!(a.get(), 3);
        assert_eq!(a_hits.get(), 2);
    }

    #[test]
    fn types_do_not_mix_and_leaving_stops_updates() {
        let mut registry = SyncRegistry::default();
        let (a_id, a, a_set) = member(0, 1);
        let (b_id, b, b_set) = member(1, 2);
        let (c_id, c, c_set) = member(2, 0);

        let _ma = registry.join(TypeId::of::<A>(), "A", a_id, &a_set);
        let mb = registry.join(TypeId::of::<A>(), "A", b_id, &b_set);
        let _mc = registry.join(TypeId::of::<B>(), "B", c_id, &c_set);
        assert_eq!(c.get(), 0, "different type, no seed");

        a.set(4);
        assert_eq!(b.get(), 4);
        assert_eq!(c.get(), 0);

        drop(mb);
        assert_eq!(registry.instances(TypeId::of::<A>()), 1);
        a.set(6);
        assert_eq!(b.get(), 4);
    }
}
