#![forbid(unsafe_code)]

//! Full-stack scenarios: model mutation → bubbling → inventory →
//! bridge element callback, and UI writes travelling the other way.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use propwire_binding::{BindingInventory, BridgeElement, UiDispatcher};
use propwire_core::{Node, Schema, Value};

// ============================================================================
// Helpers
// ============================================================================

/// Collects values pushed into a bridge callback.
#[derive(Default)]
struct Sink {
    values: Mutex<Vec<Value>>,
}

impl Sink {
    fn push(&self, value: &Value) {
        self.values.lock().expect("sink lock").push(value.clone());
    }

    fn values(&self) -> Vec<Value> {
        self.values.lock().expect("sink lock").clone()
    }
}

fn dispatcher() -> Arc<UiDispatcher> {
    Arc::new(UiDispatcher::for_current_thread())
}

fn sink_element(dispatcher: &Arc<UiDispatcher>, path: &str) -> (Arc<Sink>, BridgeElement) {
    let sink = Arc::new(Sink::default());
    let s = Arc::clone(&sink);
    let element = BridgeElement::new(dispatcher, path, move |v| s.push(v));
    (sink, element)
}

/// Root "Vm" holding a "Contact" child under `Child`.
fn contact_graph() -> (Node, Node) {
    let contact = Schema::builder("Contact")
        .property("Name", Value::Null)
        .property("Age", Value::Int(0))
        .build();
    let vm = Schema::builder("Vm").property("Child", Value::Null).build();
    let root = Node::new(&vm);
    let child = Node::new(&contact);
    root.set("Child", child.clone());
    (root, child)
}

// ============================================================================
// Model-to-UI flow
// ============================================================================

#[test]
fn model_write_reaches_bound_element_with_resolved_value() {
    let (root, child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (sink, element) = sink_element(&dispatcher, "Child.Name");
    inventory.track(&element, "Child.Name");

    // Tracking alone pushes nothing.
    assert!(sink.values().is_empty());

    child.set("Name", "Camelot");
    assert_eq!(sink.values(), vec![Value::from("Camelot")]);
}

#[test]
fn whole_object_notify_refreshes_every_binding() {
    let (root, child) = contact_graph();
    child.set("Name", "initial");

    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (name_sink, name_el) = sink_element(&dispatcher, "Child.Name");
    let (age_sink, age_el) = sink_element(&dispatcher, "Child.Age");
    inventory.track(&name_el, "Child.Name");
    inventory.track(&age_el, "Child.Age");

    root.notify();
    assert_eq!(name_sink.values(), vec![Value::from("initial")]);
    assert_eq!(age_sink.values(), vec![Value::Int(0)]);
}

#[test]
fn structural_reassignment_refreshes_leaf_bindings() {
    let (root, _old_child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (sink, element) = sink_element(&dispatcher, "Child.Name");
    inventory.track(&element, "Child.Name");

    let replacement = Node::new(
        &Schema::builder("Contact")
            .property("Name", Value::from("fresh"))
            .property("Age", Value::Int(1))
            .build(),
    );
    // The "Child" event is a segment-prefix of "Child.Name": re-read.
    root.set("Child", replacement.clone());
    assert_eq!(sink.values(), vec![Value::from("fresh")]);

    replacement.set("Name", "updated");
    assert_eq!(sink.values(), vec![Value::from("fresh"), Value::from("updated")]);
}

#[test]
fn broken_path_binding_degrades_silently() {
    let (root, child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (sink, element) = sink_element(&dispatcher, "Child.Typo");
    inventory.track(&element, "Child.Typo");

    child.set("Name", "x");
    root.notify();
    assert!(sink.values().is_empty(), "unresolvable binding must stay silent");
}

#[test]
fn refresh_all_pushes_current_values() {
    let (root, child) = contact_graph();
    child.set("Name", "now");

    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (sink, element) = sink_element(&dispatcher, "Child.Name");
    inventory.track(&element, "Child.Name");

    inventory.refresh_all();
    assert_eq!(sink.values(), vec![Value::from("now")]);
}

#[test]
fn multi_path_element_receives_from_each_path() {
    let (root, child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let sink = Arc::new(Sink::default());
    let s = Arc::clone(&sink);
    let element = BridgeElement::with_paths(&dispatcher, &["Child.Name", "Child.Age"], move |v| {
        s.push(v)
    });
    inventory.track_element(&element);

    child.set("Name", "n");
    child.set("Age", 30);
    assert_eq!(sink.values(), vec![Value::from("n"), Value::Int(30)]);
}

// ============================================================================
// UI-to-model flow and echo suppression
// ============================================================================

#[test]
fn ui_write_lands_in_model_without_echoing_back() {
    let (root, child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (writer_sink, writer) = sink_element(&dispatcher, "Child.Name");
    let (observer_sink, observer) = sink_element(&dispatcher, "Child.Name");
    inventory.track(&writer, "Child.Name");
    inventory.track(&observer, "Child.Name");

    writer.send_update(Value::from("typed"));

    // The write reached the model and the other element...
    assert_eq!(child.get("Name"), Some(Value::from("typed")));
    assert_eq!(observer_sink.values(), vec![Value::from("typed")]);
    // ...but never echoed into the writer's own callback.
    assert!(writer_sink.values().is_empty());
    assert!(!writer.is_updating(), "guard released after send");

    // Later model-side writes reach the writer normally again.
    child.set("Name", "model");
    assert_eq!(writer_sink.values(), vec![Value::from("model")]);
}

#[test]
fn ui_write_through_broken_path_is_noop() {
    let (root, child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (_, element) = sink_element(&dispatcher, "Child.Typo");
    inventory.track(&element, "Child.Typo");

    element.send_update(Value::from("lost"));
    assert_eq!(child.get("Name"), Some(Value::Null));
    assert!(!element.is_updating());
}

#[test]
fn detached_element_receives_nothing() {
    let (root, child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (sink, element) = sink_element(&dispatcher, "Child.Name");
    inventory.track(&element, "Child.Name");

    child.set("Name", "one");
    inventory.detach(&element);
    child.set("Name", "two");

    assert_eq!(sink.values(), vec![Value::from("one")]);
    // Writes after detach are silent no-ops, not errors.
    element.send_update(Value::from("ignored"));
    assert_eq!(child.get("Name"), Some(Value::from("two")));
}

// ============================================================================
// Thread affinity
// ============================================================================

#[test]
fn background_mutation_defers_callback_to_owner_drain() {
    let (root, child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (sink, element) = sink_element(&dispatcher, "Child.Name");
    inventory.track(&element, "Child.Name");

    let worker_child = child.clone();
    thread::spawn(move || {
        // Notify runs synchronously on this thread; the callback must not.
        worker_child.set("Name", "from-worker");
    })
    .join()
    .expect("join");

    assert!(sink.values().is_empty(), "callback deferred until owner drains");
    assert_eq!(dispatcher.drain(), 1);
    assert_eq!(sink.values(), vec![Value::from("from-worker")]);
}

#[test]
fn owner_thread_mutation_completes_callback_synchronously() {
    let (root, child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let element = BridgeElement::new(&dispatcher, "Child.Name", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    inventory.track(&element, "Child.Name");

    child.set("Name", "inline");
    // Inline on the owning thread: done before set() returned.
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.drain(), 0);
}

// ============================================================================
// Context swap
// ============================================================================

#[test]
fn context_swap_moves_delivery_without_duplicates() {
    let (old_root, old_child) = contact_graph();
    let (new_root, new_child) = contact_graph();

    let inventory = BindingInventory::new();
    inventory.set_context(Some(&old_root));

    let dispatcher = dispatcher();
    let (sink, element) = sink_element(&dispatcher, "Child.Name");
    inventory.track(&element, "Child.Name");

    old_child.set("Name", "old");
    assert_eq!(sink.values().len(), 1);

    inventory.set_context(Some(&new_root));

    // The old graph no longer delivers; the new one does, exactly once.
    old_child.set("Name", "stale");
    assert_eq!(sink.values().len(), 1);

    new_child.set("Name", "new");
    let values = sink.values();
    assert_eq!(values.len(), 2);
    assert_eq!(values[1], Value::from("new"));
}

#[test]
fn clearing_context_silences_all_bindings() {
    let (root, child) = contact_graph();
    let inventory = BindingInventory::new();
    inventory.set_context(Some(&root));

    let dispatcher = dispatcher();
    let (sink, element) = sink_element(&dispatcher, "Child.Name");
    inventory.track(&element, "Child.Name");

    inventory.set_context(None);
    child.set("Name", "unheard");
    assert!(sink.values().is_empty());
    assert_eq!(root.listener_count(), 0);
}
