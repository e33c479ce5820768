#![forbid(unsafe_code)]

//! Activation lifecycle: declaration order, injection, listeners, signal
//! receivers, proxies, replication, and teardown on deactivate, destroy and
//! reparent.
//!
//! Run: `cargo test -p tether-tree --test lifecycle`

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tether_reactive::{Dispatcher, Observable, ObservableSet, Signal};
use tether_tree::{Component, Declarations, NodeId, Observer, SignalObserver, Slot, Tree};
use tracing_test::traced_test;

type Log = Rc<RefCell<Vec<String>>>;

struct Model {
    message: Observable<String>,
    ping: Signal<String>,
}

impl Model {
    fn new(dispatcher: &Dispatcher, message: &str) -> Rc<Self> {
        Rc::new(Self {
            message: Observable::with_dispatcher(dispatcher, message.to_owned()),
            ping: Signal::with_dispatcher(dispatcher),
        })
    }
}

impl Component for Model {
    fn expose(&self, set: &mut ObservableSet) {
        set.expose("message", &self.message);
        set.expose_signal("ping", &self.ping);
    }
}

/// Records every callback in activation order.
struct Recorder {
    log: Log,
    message: Observer<String>,
    local: Observable<i32>,
    model: Slot<Rc<Model>>,
}

impl Recorder {
    fn new(log: &Log) -> Rc<Self> {
        Rc::new(Self {
            log: Rc::clone(log),
            message: Observer::new(String::new()),
            local: Observable::new(7),
            model: Slot::new(),
        })
    }
}

impl Component for Recorder {
    fn expose(&self, set: &mut ObservableSet) {
        set.expose("local", &self.local);
    }

    fn declare(&self, decl: &mut Declarations) {
        decl.component_in_parent(false, &self.model);

        let (log, model) = (Rc::clone(&self.log), self.model.clone());
        decl.bind(&self.message, "message").on_change(move |v: &String| {
            let injected = model.is_filled();
            log.borrow_mut().push(format!("observer {v} injected={injected}"));
        });

        let log = Rc::clone(&self.log);
        decl.listen_named("local", move |v: &i32| {
            log.borrow_mut().push(format!("listener {v}"));
        });

        let log = Rc::clone(&self.log);
        decl.receive("ping", move |v: &String| {
            log.borrow_mut().push(format!("ping {v}"));
        });
    }
}

fn setup() -> (Tree, NodeId, NodeId, Rc<Model>, Rc<Recorder>, Log) {
    let mut tree = Tree::new();
    let root = tree.add_root("root");
    let model = Model::new(tree.dispatcher(), "hi");
    tree.add_component(root, Rc::clone(&model)).unwrap();
    let leaf = tree.add_child(root, "leaf").unwrap();
    let log = Log::default();
    let recorder = Recorder::new(&log);
    tree.add_component(leaf, Rc::clone(&recorder)).unwrap();
    (tree, root, leaf, model, recorder, log)
}

#[test]
fn activation_order_is_fixed() {
    let (_tree, _, _, _, recorder, log) = setup();
    assert_eq!(*log.borrow(), ["observer hi injected=true", "listener 7"]);
    assert!(recorder.model.is_filled());
}

#[test]
fn listeners_and_receivers_fire_on_change() {
    let (_tree, _, _, model, recorder, log) = setup();
    log.borrow_mut().clear();

    recorder.local.set(8);
    model.ping.send("a".into());
    model.ping.send("a".into());
    assert_eq!(*log.borrow(), ["listener 8", "ping a", "ping a"]);
}

#[test]
fn deactivate_silences_every_callback() {
    let (mut tree, _, leaf, model, recorder, log) = setup();
    tree.deactivate(leaf).unwrap();
    log.borrow_mut().clear();

    model.message.set("changed".into());
    model.ping.send("x".into());
    recorder.local.set(1);
    assert!(log.borrow().is_empty());
    assert!(!recorder.message.is_connected());
    assert_eq!(recorder.message.get(), "", "reads fall back to the default");

    tree.activate(leaf).unwrap();
    assert_eq!(*log.borrow(), ["observer changed injected=true", "listener 1"]);
}

#[test]
fn destroy_tears_down_bindings() {
    let (mut tree, _, leaf, model, recorder, log) = setup();
    tree.destroy(leaf).unwrap();
    log.borrow_mut().clear();

    model.message.set("after".into());
    assert!(log.borrow().is_empty());
    assert!(!recorder.message.is_connected());
    assert!(!tree.contains(leaf));
}

#[test]
fn deactivating_an_ancestor_releases_descendants_first() {
    let (mut tree, root, _, model, recorder, _) = setup();
    tree.deactivate(root).unwrap();
    assert!(!recorder.message.is_connected());
    model.message.set("prune".into());
    assert_eq!(model.message.subscriber_count(), 0);
}

#[test]
fn reparent_rebinds_against_new_ancestors() {
    let mut tree = Tree::new();
    let root = tree.add_root("root");
    let a = tree.add_child(root, "a").unwrap();
    let b = tree.add_child(root, "b").unwrap();
    let model_a = Model::new(tree.dispatcher(), "from a");
    let model_b = Model::new(tree.dispatcher(), "from b");
    tree.add_component(a, Rc::clone(&model_a)).unwrap();
    tree.add_component(b, Rc::clone(&model_b)).unwrap();

    let leaf = tree.add_child(a, "leaf").unwrap();
    let log = Log::default();
    let recorder = Recorder::new(&log);
    tree.add_component(leaf, Rc::clone(&recorder)).unwrap();
    assert_eq!(recorder.message.get(), "from a");

    tree.reparent(leaf, Some(b)).unwrap();
    assert_eq!(recorder.message.get(), "from b");
    assert_eq!(recorder.message.source_path().as_deref(), Some("/root/b/Model"));
    assert!(recorder.model.get().is_some_and(|m| Rc::ptr_eq(&m, &model_b)));

    log.borrow_mut().clear();
    model_a.message.set("stale".into());
    assert!(log.borrow().is_empty());
    model_b.message.set("fresh".into());
    assert_eq!(*log.borrow(), ["observer fresh injected=true"]);
}

#[test]
#[traced_test]
fn unresolved_receiver_and_listener_are_logged() {
    struct Broken {
        local: Observable<i32>,
    }
    impl Component for Broken {
        fn expose(&self, set: &mut ObservableSet) {
            set.expose("local", &self.local);
        }
        fn declare(&self, decl: &mut Declarations) {
            decl.listen_named("missing", |_: &i32| {});
            decl.listen_named("local", |_: &String| {});
            decl.receive("ping", |_: &u64| {});
        }
    }

    let (mut tree, root, ..) = setup();
    let node = tree.add_child(root, "broken").unwrap();
    tree.add_component(
        node,
        Rc::new(Broken {
            local: Observable::new(0),
        }),
    )
    .unwrap();

    assert!(logs_contain("change listener target not found"));
    assert!(logs_contain("change listener type mismatch"));
    assert!(logs_contain("couldn't connect signal receiver"));
}

#[test]
fn signal_sender_reaches_ancestor_receivers() {
    struct Sender {
        ping: SignalObserver<String>,
    }
    impl Component for Sender {
        fn declare(&self, decl: &mut Declarations) {
            decl.sender(&self.ping, "ping");
        }
    }

    let (mut tree, root, _, model, _, log) = setup();
    let other = tree.add_child(root, "sender").unwrap();
    let sender = Rc::new(Sender {
        ping: SignalObserver::new(),
    });
    tree.add_component(other, Rc::clone(&sender)).unwrap();
    log.borrow_mut().clear();

    sender.ping.send("from sibling".into());
    assert_eq!(model.ping.last(), "from sibling");
    assert_eq!(*log.borrow(), ["ping from sibling"]);
}

#[test]
fn injection_variants() {
    struct Marker;
    impl Component for Marker {}

    struct Injected {
        found: Slot<NodeId>,
        first_child: Slot<NodeId>,
        own: Slot<Rc<Marker>>,
        below: Slot<Rc<Marker>>,
        all_below: Slot<Vec<Rc<Marker>>>,
        via_path: Slot<Rc<Marker>>,
        above: Slot<Vec<Rc<Marker>>>,
    }
    impl Component for Injected {
        fn declare(&self, decl: &mut Declarations) {
            decl.find("a/b", &self.found)
                .child(0, &self.first_child)
                .component(&self.own)
                .component_in_children(false, &self.below)
                .components_in_children(true, &self.all_below)
                .find_component("a/b", &self.via_path)
                .components_in_parent(false, &self.above);
        }
    }

    let mut tree = Tree::new();
    let root = tree.add_root("root");
    let host = tree.add_child(root, "host").unwrap();
    let a = tree.add_child(host, "a").unwrap();
    let b = tree.add_child(a, "b").unwrap();
    tree.add_component(root, Rc::new(Marker)).unwrap();
    tree.add_component(b, Rc::new(Marker)).unwrap();
    tree.deactivate(b).unwrap();

    let injected = Rc::new(Injected {
        found: Slot::new(),
        first_child: Slot::new(),
        own: Slot::new(),
        below: Slot::new(),
        all_below: Slot::new(),
        via_path: Slot::new(),
        above: Slot::new(),
    });
    tree.add_component(host, Rc::clone(&injected)).unwrap();

    assert_eq!(injected.found.get(), Some(b));
    assert_eq!(injected.first_child.get(), Some(a));
    assert!(!injected.own.is_filled());
    assert!(!injected.below.is_filled(), "b is inactive");
    assert_eq!(injected.all_below.with(|v| v.map(Vec::len)), Some(1));
    assert!(injected.via_path.is_filled());
    assert_eq!(injected.above.with(|v| v.map(Vec::len)), Some(1));
}

#[test]
fn proxy_mirrors_an_ancestor_observable() {
    /// Re-exposes the ancestor's `message` under its own name.
    struct Proxy {
        title: Observable<String>,
    }
    impl Component for Proxy {
        fn expose(&self, set: &mut ObservableSet) {
            set.expose("title", &self.title);
        }
        fn declare(&self, decl: &mut Declarations) {
            decl.mirror(&self.title, "message");
        }
    }
    struct Title {
        title: Observer<String>,
    }
    impl Component for Title {
        fn declare(&self, decl: &mut Declarations) {
            decl.bind(&self.title, "title");
        }
    }

    let mut tree = Tree::new();
    let root = tree.add_root("root");
    let model = Model::new(tree.dispatcher(), "origin");
    tree.add_component(root, Rc::clone(&model)).unwrap();
    let mid = tree.add_child(root, "proxy").unwrap();
    let proxy = Rc::new(Proxy {
        title: Observable::with_dispatcher(tree.dispatcher(), String::new()),
    });
    tree.add_component(mid, Rc::clone(&proxy)).unwrap();
    let leaf = tree.add_child(mid, "leaf").unwrap();
    let title = Rc::new(Title {
        title: Observer::new(String::new()),
    });
    tree.add_component(leaf, Rc::clone(&title)).unwrap();

    assert_eq!(title.title.get(), "origin");
    model.message.set("updated".into());
    assert_eq!(title.title.get(), "updated");
    title.title.set("from leaf".into());
    assert_eq!(model.message.get(), "from leaf");

    tree.deactivate(mid).unwrap();
    model.message.set("detached".into());
    assert_eq!(proxy.title.get(), "from leaf");
}

#[test]
fn proxy_and_ancestor_agree_inside_a_change_block() {
    struct Proxy {
        message: Observable<String>,
    }
    impl Component for Proxy {
        fn expose(&self, set: &mut ObservableSet) {
            set.expose("message", &self.message);
        }
        fn declare(&self, decl: &mut Declarations) {
            decl.mirror(&self.message, "message");
        }
    }

    let mut tree = Tree::new();
    let root = tree.add_root("root");
    let model = Model::new(tree.dispatcher(), "a");
    tree.add_component(root, Rc::clone(&model)).unwrap();
    let child = tree.add_child(root, "proxy").unwrap();
    let proxy = Rc::new(Proxy {
        message: Observable::with_dispatcher(tree.dispatcher(), String::new()),
    });
    tree.add_component(child, Rc::clone(&proxy)).unwrap();

    let heard: Log = Rc::default();
    let log = Rc::clone(&heard);
    let _sub = model
        .message
        .subscribe(move |v: &String| log.borrow_mut().push(v.clone()));

    let block = tree.dispatcher().begin_change_block();
    model.message.set("y".into());
    assert_eq!(proxy.message.get(), "y");
    proxy.message.set("z".into());
    assert_eq!(model.message.get(), "z");
    assert!(heard.borrow().is_empty());
    block.end();

    assert_eq!(model.message.get(), "z");
    assert_eq!(proxy.message.get(), "z");
    assert_eq!(*heard.borrow(), ["z", "z"]);
}

#[test]
fn synced_instances_replicate_without_feedback() {
    struct Counter {
        count: Observable<i32>,
    }
    impl Component for Counter {
        fn expose(&self, set: &mut ObservableSet) {
            set.expose("count", &self.count);
        }
        fn synced(&self) -> bool {
            true
        }
    }

    let mut tree = Tree::new();
    let root = tree.add_root("root");
    let left = tree.add_child(root, "left").unwrap();
    let right = tree.add_child(root, "right").unwrap();
    let a = Rc::new(Counter {
        count: Observable::with_dispatcher(tree.dispatcher(), 4),
    });
    let b = Rc::new(Counter {
        count: Observable::with_dispatcher(tree.dispatcher(), 0),
    });
    tree.add_component(left, Rc::clone(&a)).unwrap();
    tree.add_component(right, Rc::clone(&b)).unwrap();
    assert_eq!(b.count.get(), 4, "joiner copies from the first instance");
    assert_eq!(tree.synced_instances::<Counter>(), 2);

    let a_hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&a_hits);
    let _sub = a.count.subscribe(move |_| h.set(h.get() + 1));

    a.count.set(10);
    assert_eq!(b.count.get(), 10);
    assert_eq!(a_hits.get(), 1);

    tree.deactivate(right).unwrap();
    assert_eq!(tree.synced_instances::<Counter>(), 1);
    a.count.set(11);
    assert_eq!(b.count.get(), 10);
}
