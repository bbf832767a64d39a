#![forbid(unsafe_code)]

//! Observable nodes: listener registry, reactions, and bubbling.
//!
//! # Design
//!
//! A [`Node`] is a shared handle (`Arc`) to one observable entity. Its
//! state — property slots, listener registry, reaction map — sits behind a
//! single per-node mutex; there is no global lock. Notification follows
//! snapshot-then-call: the listener vector is copied under the lock, the
//! lock is released, and callbacks run against the snapshot. A handler may
//! therefore mutate the registry or re-enter `notify*` on the same node
//! without deadlocking, and delivery never observes concurrent mutation.
//!
//! Bubbling is built out of the registry itself: assigning a node-valued
//! property registers the parent as a *parent link* on the child, tagged
//! with the property name. When the child notifies, the parent link
//! converts the event into an object-level notification on the parent with
//! the tag prefixed onto the accumulated path, and the climb repeats until
//! a terminal listener (typically the binding inventory) is reached.
//!
//! # Invariants
//!
//! 1. Registry mutation and slot access happen only under this node's own
//!    lock; callbacks always run with the lock released.
//! 2. One event is delivered per `(listener, tag)` registration entry, in
//!    registration order, carrying that entry's tag.
//! 3. Reactions for a trigger fire — recursively, registration order,
//!    depth-first — before the trigger's own listeners observe it.
//! 4. Reassignment to a reference-identical child (or a `PartialEq`-equal
//!    scalar) is a complete no-op: no rewiring, no notification.
//! 5. The pooled event carrier is checked back in before `notify*`
//!    returns, on every exit path including listener panics.
//!
//! # Failure Modes
//!
//! - **Listener panic**: propagates to the notifying caller. Earlier
//!   listeners in the same delivery pass keep their effects; later ones
//!   never run. The node itself stays consistent (no lock was held).
//! - **Reaction cycle**: `add_reaction("A", "B")` plus
//!   `add_reaction("B", "A")` recurses until stack exhaustion; declaring
//!   cycles is a caller bug.
//! - **Dead parent link**: a parent dropped without unwiring is pruned
//!   lazily at the next snapshot, like a dead subscriber.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::trace;

use crate::event::{ChangeEvent, ChangeKind, ChangeListener};
use crate::pool::ObjectPool;
use crate::property::PropertyStore;
use crate::schema::Schema;
use crate::value::Value;

/// Identity key for one registered listener (thin pointer address).
type ListenerKey = usize;

#[derive(Clone)]
enum ListenerRef {
    /// Externally registered listener; explicit unsubscribe contract.
    External(Arc<dyn ChangeListener>),
    /// Parent node wired by structural reassignment; weak so a child never
    /// keeps its parent alive, pruned lazily when dead.
    Parent(Weak<NodeInner>),
}

#[derive(Clone)]
struct ListenerEntry {
    key: ListenerKey,
    tag: String,
    target: ListenerRef,
}

struct NodeState {
    slots: Vec<Value>,
    /// One entry per registration — multiset semantics: the same listener
    /// may appear under several tags, the same tag more than once.
    listeners: Vec<ListenerEntry>,
    /// Trigger name/path → dependent local properties, registration order.
    reactions: Vec<(String, Vec<String>)>,
}

struct NodeInner {
    schema: Arc<Schema>,
    /// Optional delivery-identity delegate set at construction.
    delegate: Option<Weak<NodeInner>>,
    state: Mutex<NodeState>,
}

/// Shared handle to an observable node.
///
/// Cloning a `Node` clones the handle, not the node; all clones observe
/// and mutate the same state.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Non-owning handle to a [`Node`].
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

impl WeakNode {
    #[must_use]
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

/// Checked-out carrier that returns itself to the pool on drop, so the
/// "checked in before notify returns" invariant survives listener panics.
struct Carrier {
    event: Option<Box<ChangeEvent>>,
}

impl Carrier {
    fn check_out() -> Self {
        Self {
            event: Some(ObjectPool::global().check_out::<ChangeEvent>()),
        }
    }

    fn event(&mut self) -> &mut ChangeEvent {
        self.event.as_mut().expect("carrier present until drop")
    }
}

impl Drop for Carrier {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            ObjectPool::global().check_in(event);
        }
    }
}

impl Node {
    /// Create a node from a schema, slots initialized to the defaults.
    #[must_use]
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self::construct(schema, None)
    }

    /// Create a node whose outgoing events carry `delegate` as their
    /// source — used by composition wrappers that forward notification for
    /// a different logical owner.
    #[must_use]
    pub fn with_delegate(schema: &Arc<Schema>, delegate: &Node) -> Self {
        Self::construct(schema, Some(Arc::downgrade(&delegate.inner)))
    }

    fn construct(schema: &Arc<Schema>, delegate: Option<Weak<NodeInner>>) -> Self {
        let slots = schema.specs().iter().map(|s| s.default_value().clone()).collect();
        Self {
            inner: Arc::new(NodeInner {
                schema: Arc::clone(schema),
                delegate,
                state: Mutex::new(NodeState {
                    slots,
                    listeners: Vec::new(),
                    reactions: Vec::new(),
                }),
            }),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    /// Reference identity of two handles.
    #[must_use]
    pub fn same(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The logical identity outgoing events and property lookups use:
    /// the delegate set at construction, or this node itself when unset
    /// (or when the delegate is gone).
    #[must_use]
    pub fn delivery_identity(&self) -> Node {
        match &self.inner.delegate {
            Some(weak) => weak
                .upgrade()
                .map_or_else(|| self.clone(), |inner| Node { inner }),
            None => self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- property access ----------------------------------------------------

    /// Read a property through the store. Unknown names read as `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        let descriptor = PropertyStore::global().resolve(self.schema(), name)?;
        descriptor.get(self)
    }

    /// Write a property through the store, re-entering the notify
    /// pipeline. Unknown names and equal values are silent no-ops
    /// (returns `false`).
    pub fn set(&self, name: &str, value: impl Into<Value>) -> bool {
        match PropertyStore::global().resolve(self.schema(), name) {
            Some(descriptor) => descriptor.set(self, value.into()),
            None => false,
        }
    }

    pub(crate) fn slot_value(&self, slot: usize) -> Option<Value> {
        self.lock().slots.get(slot).cloned()
    }

    /// Store `value` into `slot`, rewiring parent links for node values,
    /// then notify `name`. Equal values (identity for nodes) are a no-op.
    pub(crate) fn apply_slot(&self, slot: usize, name: &str, value: Value) -> bool {
        let new_child = value.as_node().cloned();
        let old = {
            let mut state = self.lock();
            let Some(current) = state.slots.get_mut(slot) else {
                return false;
            };
            if *current == value {
                return false;
            }
            std::mem::replace(current, value)
        };
        if let Some(old_child) = old.as_node() {
            old_child.remove_parent_link(self, name);
        }
        if let Some(new_child) = &new_child {
            new_child.add_parent_link(self, name);
        }
        self.notify_property(name);
        true
    }

    // -- listener registry --------------------------------------------------

    /// Register `listener` under `tag`. Each call adds one registry entry;
    /// registering the same pair twice yields two deliveries per event.
    pub fn register_listener(&self, tag: &str, listener: &Arc<dyn ChangeListener>) {
        let key = Arc::as_ptr(listener) as *const () as usize;
        let mut state = self.lock();
        state.listeners.push(ListenerEntry {
            key,
            tag: tag.to_string(),
            target: ListenerRef::External(Arc::clone(listener)),
        });
    }

    /// Remove one occurrence of the `(listener, tag)` registration, if
    /// present. Removing an unregistered pair is a no-op.
    pub fn unregister_listener(&self, tag: &str, listener: &Arc<dyn ChangeListener>) {
        let key = Arc::as_ptr(listener) as *const () as usize;
        let mut state = self.lock();
        if let Some(pos) = state.listeners.iter().position(|e| {
            e.key == key && e.tag == tag && matches!(e.target, ListenerRef::External(_))
        }) {
            state.listeners.remove(pos);
        }
    }

    /// Current registry size (registrations, not distinct listeners),
    /// including parent links.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn add_parent_link(&self, parent: &Node, tag: &str) {
        let key = Arc::as_ptr(&parent.inner) as usize;
        let mut state = self.lock();
        state.listeners.push(ListenerEntry {
            key,
            tag: tag.to_string(),
            target: ListenerRef::Parent(Arc::downgrade(&parent.inner)),
        });
    }

    fn remove_parent_link(&self, parent: &Node, tag: &str) {
        let key = Arc::as_ptr(&parent.inner) as usize;
        let mut state = self.lock();
        if let Some(pos) = state.listeners.iter().position(|e| {
            e.key == key && e.tag == tag && matches!(e.target, ListenerRef::Parent(_))
        }) {
            state.listeners.remove(pos);
        }
    }

    // -- reactions ----------------------------------------------------------

    /// Declare that notifying `trigger` (a property name or an accumulated
    /// path) must also notify the local property `local`, before
    /// `trigger`'s own listeners observe the change.
    ///
    /// Dependents fire in registration order, depth-first. Declaring a
    /// cycle recurses unboundedly.
    pub fn add_reaction(&self, local: &str, trigger: &str) {
        let mut state = self.lock();
        if let Some((_, locals)) = state.reactions.iter_mut().find(|(t, _)| t == trigger) {
            locals.push(local.to_string());
        } else {
            state.reactions.push((trigger.to_string(), vec![local.to_string()]));
        }
    }

    /// Drop every declared reaction.
    pub fn clear_reactions(&self) {
        self.lock().reactions.clear();
    }

    /// Number of `(trigger → local)` reaction edges.
    #[must_use]
    pub fn reaction_count(&self) -> usize {
        self.lock().reactions.iter().map(|(_, l)| l.len()).sum()
    }

    // -- notification -------------------------------------------------------

    /// Notify a property change: fire reactions for `name`, then deliver
    /// one `PropertyChanged` per `(listener, tag)` registration. Returns
    /// after every transitively reachable listener has run.
    pub fn notify_property(&self, name: &str) {
        self.fire_reactions(name);

        let snapshot = self.snapshot_listeners();
        if snapshot.is_empty() {
            return;
        }
        let identity = self.delivery_identity();
        let descriptor = PropertyStore::global().resolve(identity.schema(), name);
        trace!(
            node = self.schema().name(),
            property = name,
            listeners = snapshot.len(),
            "notify property"
        );

        let mut carrier = Carrier::check_out();
        let event = carrier.event();
        event.kind = ChangeKind::Property;
        event.name.push_str(name);
        event.descriptor = descriptor;
        event.source = Some(identity);
        self.deliver(&snapshot, event);
    }

    /// Object-level notification with an empty path — the "refresh
    /// everything downstream" convention. Parent links climb from here,
    /// accumulating one path segment per hop.
    pub fn notify(&self) {
        self.notify_object("");
    }

    fn notify_object(&self, path: &str) {
        if !path.is_empty() {
            // Reactions may key on an accumulated path, not just a local name.
            self.fire_reactions(path);
        }

        let snapshot = self.snapshot_listeners();
        if snapshot.is_empty() {
            return;
        }
        let identity = self.delivery_identity();
        trace!(
            node = self.schema().name(),
            path,
            listeners = snapshot.len(),
            "notify object"
        );

        let mut carrier = Carrier::check_out();
        let event = carrier.event();
        event.kind = ChangeKind::Object;
        event.name.push_str(path);
        event.source = Some(identity);
        self.deliver(&snapshot, event);
    }

    /// Structural reassignment of a nested observable held under `name`:
    /// unwire the parent link on `old`, wire it on `new`, notify `name`.
    /// A reference-identical reassignment is a complete no-op.
    ///
    /// This is the wiring-only operation; [`Node::set`] stores the value
    /// and performs the same rewiring itself.
    pub fn reassign_child(&self, name: &str, old: Option<&Node>, new: Option<&Node>) {
        if let (Some(a), Some(b)) = (old, new) {
            if Node::same(a, b) {
                return;
            }
        }
        if let Some(old) = old {
            old.remove_parent_link(self, name);
        }
        if let Some(new) = new {
            new.add_parent_link(self, name);
        }
        self.notify_property(name);
    }

    fn fire_reactions(&self, trigger: &str) {
        let dependents: Vec<String> = {
            let state = self.lock();
            state
                .reactions
                .iter()
                .find(|(t, _)| t == trigger)
                .map(|(_, locals)| locals.clone())
                .unwrap_or_default()
        };
        for local in &dependents {
            self.notify_property(local);
        }
    }

    /// Copy the registry under the lock, pruning dead parent links, so
    /// delivery never observes concurrent mutation.
    fn snapshot_listeners(&self) -> Vec<ListenerEntry> {
        let mut state = self.lock();
        state.listeners.retain(|e| match &e.target {
            ListenerRef::Parent(weak) => weak.strong_count() > 0,
            ListenerRef::External(_) => true,
        });
        state.listeners.clone()
    }

    /// Deliver to each snapshot entry in registration order, rewriting the
    /// carrier's tag per entry. Runs with no lock held.
    fn deliver(&self, snapshot: &[ListenerEntry], event: &mut ChangeEvent) {
        for entry in snapshot {
            event.tag.clear();
            event.tag.push_str(&entry.tag);
            match &entry.target {
                ListenerRef::External(listener) => listener.on_change(event),
                ListenerRef::Parent(weak) => {
                    if let Some(inner) = weak.upgrade() {
                        Node { inner }.bubble_from_child(event);
                    }
                }
            }
        }
    }

    /// Parent-link conversion: prefix the tag (the property this child is
    /// held under) onto the child event's name/path and re-emit as an
    /// object-level notification on this node.
    fn bubble_from_child(&self, child_event: &ChangeEvent) {
        let tag = child_event.tag();
        let sub = child_event.name();
        let path = if sub.is_empty() {
            tag.to_string()
        } else {
            format!("{tag}.{sub}")
        };
        self.notify_object(&path);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Node")
            .field("schema", &self.inner.schema.name())
            .field("listeners", &state.listeners.len())
            .field("reactions", &state.reactions.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
