#![forbid(unsafe_code)]

//! Path resolution and the binding inventory.
//!
//! # Design
//!
//! The [`BindingInventory`] is the terminal listener of the bubbling
//! pipeline. It registers itself on the root context node; every bubbled
//! event's name/path is matched against the tracked bindings, and each
//! match triggers a re-read of the terminal value and a push to the
//! interested bridge elements. Writes travel the other way:
//! [`send_update_from_element`](BindingInventory::send_update_from_element)
//! resolves the element's path and invokes the property setter, which
//! re-enters the notify pipeline.
//!
//! Paths are externally authored strings, so every resolution failure —
//! unknown segment, non-node intermediate, no context — degrades silently.
//!
//! # Invariants
//!
//! 1. The inventory never holds its own lock while invoking element
//!    callbacks or node setters; matching is collected under the lock and
//!    delivered after release.
//! 2. A context swap unregisters from the old root before registering on
//!    the new one — no window where both roots deliver.
//! 3. Path matching: an empty event path matches every binding; otherwise
//!    equal paths match, as does either path being a dot-segment prefix of
//!    the other.

use std::sync::{Arc, Mutex};

use propwire_core::{ChangeEvent, ChangeListener, Node, PropertyDescriptor, PropertyStore, Value};
use tracing::trace;

use crate::bridge::BridgeElement;

/// Tag the inventory registers under on the root context node.
const ROOT_TAG: &str = "";

/// Resolve a dotted path against a root node.
///
/// Walks each segment, requiring every intermediate value to be a node;
/// returns the terminal property's owner and descriptor, or `None` on any
/// broken segment.
#[must_use]
pub fn resolve_path(root: &Node, path: &str) -> Option<(Node, Arc<PropertyDescriptor>)> {
    if path.is_empty() {
        return None;
    }
    let mut segments = path.split('.');
    let mut name = segments.next()?;
    let mut owner = root.clone();
    for next in segments {
        let value = owner.get(name)?;
        let child = value.as_node()?.clone();
        owner = child;
        name = next;
    }
    let descriptor = PropertyStore::global().resolve(owner.schema(), name)?;
    Some((owner, descriptor))
}

/// Whether a bubbled event path concerns a bound path.
fn paths_overlap(event_path: &str, bound: &str) -> bool {
    if event_path.is_empty() {
        return true;
    }
    if event_path == bound {
        return true;
    }
    // A structural change refreshes leaf bindings underneath it; a leaf
    // change refreshes object bindings above it.
    (bound.len() > event_path.len()
        && bound.starts_with(event_path)
        && bound.as_bytes()[event_path.len()] == b'.')
        || (event_path.len() > bound.len()
            && event_path.starts_with(bound)
            && event_path.as_bytes()[bound.len()] == b'.')
}

struct PathBinding {
    path: String,
    elements: Vec<BridgeElement>,
}

struct InventoryState {
    root: Option<Node>,
    bindings: Vec<PathBinding>,
}

pub(crate) struct InventoryInner {
    state: Mutex<InventoryState>,
}

/// Shared handle to a binding inventory.
#[derive(Clone)]
pub struct BindingInventory {
    inner: Arc<InventoryInner>,
}

impl BindingInventory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InventoryInner {
                state: Mutex::new(InventoryState {
                    root: None,
                    bindings: Vec::new(),
                }),
            }),
        }
    }

    /// Current root context.
    #[must_use]
    pub fn context(&self) -> Option<Node> {
        self.inner.lock().root.clone()
    }

    /// Swap the root context. Tracked bindings stay; the inventory's
    /// listener moves: unregistered from the old root first, then
    /// registered on the new one.
    pub fn set_context(&self, root: Option<&Node>) {
        let listener: Arc<dyn ChangeListener> = self.inner.clone();
        let old = self.inner.lock().root.take();
        if let Some(old_root) = &old {
            old_root.unregister_listener(ROOT_TAG, &listener);
        }
        if let Some(new_root) = root {
            new_root.register_listener(ROOT_TAG, &listener);
        }
        self.inner.lock().root = root.cloned();
    }

    /// Resolve `path` against the current context.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<(Node, Arc<PropertyDescriptor>)> {
        let root = self.context()?;
        resolve_path(&root, path)
    }

    /// Read the terminal value of `path`, if it resolves.
    #[must_use]
    pub fn read(&self, path: &str) -> Option<Value> {
        let (owner, descriptor) = self.resolve(path)?;
        descriptor.get(&owner)
    }

    /// Register `element`'s interest in `path`. Tracking the same
    /// (element, path) pair twice is a no-op.
    pub fn track(&self, element: &BridgeElement, path: &str) {
        element.attach(&self.inner);
        let mut state = self.inner.lock();
        if let Some(binding) = state.bindings.iter_mut().find(|b| b.path == path) {
            if !binding.elements.iter().any(|e| BridgeElement::same(e, element)) {
                binding.elements.push(element.clone());
            }
        } else {
            state.bindings.push(PathBinding {
                path: path.to_string(),
                elements: vec![element.clone()],
            });
        }
    }

    /// Track every path the element declares.
    pub fn track_element(&self, element: &BridgeElement) {
        for path in element.paths().to_vec() {
            self.track(element, &path);
        }
    }

    /// Remove `element` from every binding it appears in.
    pub fn detach(&self, element: &BridgeElement) {
        element.clear_attachment();
        let mut state = self.inner.lock();
        for binding in &mut state.bindings {
            binding.elements.retain(|e| !BridgeElement::same(e, element));
        }
        state.bindings.retain(|b| !b.elements.is_empty());
    }

    /// Number of live path bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.inner.lock().bindings.len()
    }

    /// Re-read every tracked path and push current values — the initial
    /// sync after wiring a view, equivalent to a whole-object refresh.
    pub fn refresh_all(&self) {
        self.inner.push_matching("");
    }

    /// Write `value` through `element`'s bound path(s). See
    /// [`BridgeElement::send_update`] for the guarded entry point.
    pub fn send_update_from_element(&self, element: &BridgeElement, value: Value) {
        self.inner.send_update_from_element(element, value);
    }
}

impl Default for BindingInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BindingInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("BindingInventory")
            .field("has_context", &state.root.is_some())
            .field("bindings", &state.bindings.len())
            .finish_non_exhaustive()
    }
}

impl InventoryInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, InventoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Collect matching (element, path) pairs under the lock, then re-read
    /// and push with the lock released.
    fn push_matching(&self, changed: &str) {
        let (root, targets) = {
            let state = self.lock();
            let Some(root) = state.root.clone() else {
                return;
            };
            let targets: Vec<(BridgeElement, String)> = state
                .bindings
                .iter()
                .filter(|b| paths_overlap(changed, &b.path))
                .flat_map(|b| b.elements.iter().map(|e| (e.clone(), b.path.clone())))
                .collect();
            (root, targets)
        };
        trace!(changed, pushes = targets.len(), "binding refresh");
        for (element, path) in targets {
            let Some((owner, descriptor)) = resolve_path(&root, &path) else {
                continue;
            };
            let Some(value) = descriptor.get(&owner) else {
                continue;
            };
            element.receive_update(&value);
        }
    }

    pub(crate) fn send_update_from_element(&self, element: &BridgeElement, value: Value) {
        let root = {
            let state = self.lock();
            state.root.clone()
        };
        let Some(root) = root else {
            return;
        };
        for path in element.paths() {
            let Some((owner, descriptor)) = resolve_path(&root, path) else {
                continue;
            };
            // Re-enters the notify pipeline; echo suppression is the
            // element's reentrancy guard, engaged by the caller.
            let _ = descriptor.set(&owner, value.clone());
        }
    }
}

impl ChangeListener for InventoryInner {
    fn on_change(&self, event: &ChangeEvent) {
        self.push_matching(event.name());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::UiDispatcher;
    use propwire_core::Schema;

    fn graph() -> (Node, Node) {
        let child_schema = Schema::builder("Contact").property("Name", Value::Null).build();
        let root_schema = Schema::builder("Vm").property("Child", Value::Null).build();
        let root = Node::new(&root_schema);
        let child = Node::new(&child_schema);
        root.set("Child", child.clone());
        (root, child)
    }

    #[test]
    fn resolve_walks_segments() {
        let (root, child) = graph();
        child.set("Name", "x");

        let (owner, descriptor) = resolve_path(&root, "Child.Name").expect("resolves");
        assert!(Node::same(&owner, &child));
        assert_eq!(descriptor.get(&owner), Some(Value::from("x")));
    }

    #[test]
    fn resolve_broken_segment_is_none() {
        let (root, _) = graph();
        assert!(resolve_path(&root, "").is_none());
        assert!(resolve_path(&root, "Nope").is_none());
        assert!(resolve_path(&root, "Nope.Name").is_none());
        assert!(resolve_path(&root, "Child.Nope").is_none());
        // Intermediate that is not a node.
        assert!(resolve_path(&root, "Child.Name.Deeper").is_none());
    }

    #[test]
    fn overlap_rules() {
        assert!(paths_overlap("", "A.B"));
        assert!(paths_overlap("A.B", "A.B"));
        assert!(paths_overlap("A", "A.B"));
        assert!(paths_overlap("A.B.C", "A.B"));
        assert!(!paths_overlap("A.BC", "A.B"));
        assert!(!paths_overlap("A.B", "A.BC"));
        assert!(!paths_overlap("X", "A.B"));
    }

    #[test]
    fn track_is_set_semantics_detach_removes() {
        let inventory = BindingInventory::new();
        let dispatcher = std::sync::Arc::new(UiDispatcher::for_current_thread());
        let element = BridgeElement::new(&dispatcher, "Child.Name", |_| {});

        inventory.track(&element, "Child.Name");
        inventory.track(&element, "Child.Name");
        assert_eq!(inventory.binding_count(), 1);

        inventory.detach(&element);
        assert_eq!(inventory.binding_count(), 0);
    }

    #[test]
    fn read_through_context() {
        let (root, child) = graph();
        child.set("Name", "val");

        let inventory = BindingInventory::new();
        assert_eq!(inventory.read("Child.Name"), None);

        inventory.set_context(Some(&root));
        assert_eq!(inventory.read("Child.Name"), Some(Value::from("val")));
        assert_eq!(inventory.read("Child.Missing"), None);
    }

    #[test]
    fn set_context_moves_listener_registration() {
        let (first_root, _) = graph();
        let (second_root, _) = graph();

        let inventory = BindingInventory::new();
        inventory.set_context(Some(&first_root));
        assert_eq!(first_root.listener_count(), 1);

        inventory.set_context(Some(&second_root));
        assert_eq!(first_root.listener_count(), 0);
        assert_eq!(second_root.listener_count(), 1);

        inventory.set_context(None);
        assert_eq!(second_root.listener_count(), 0);
    }
}
