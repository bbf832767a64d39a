#![forbid(unsafe_code)]

//! UI bridge elements: the boundary between bound paths and UI consumers.
//!
//! # Design
//!
//! A [`BridgeElement`] is a shared handle (clones address the same
//! element) holding one or more bound paths, a typed update callback, and
//! the reentrancy guard. Inventory pushes arrive via
//! [`receive_update`](BridgeElement::receive_update) and are forwarded to
//! the callback through the element's [`UiDispatcher`] — inline on the
//! owning thread, queued otherwise. Writes leave via
//! [`send_update`](BridgeElement::send_update), which sets the
//! `is-updating` flag for the duration of the forward so the write's own
//! bubbled notification is not echoed back into the callback.
//!
//! # Invariants
//!
//! 1. `receive_update` while `is-updating` is set drops the value
//!    silently.
//! 2. The `is-updating` flag is cleared on every exit path out of
//!    `send_update`, including listener panics (scope guard).
//! 3. The callback only ever runs on the owning thread.

use std::sync::{Arc, Mutex, Weak};

use propwire_core::Value;
use tracing::trace;

use crate::dispatch::UiDispatcher;
use crate::inventory::InventoryInner;

/// Callback receiving resolved values for a bound path.
pub type UpdateCallback = dyn Fn(&Value) + Send + Sync;

pub(crate) struct BridgeInner {
    paths: Vec<String>,
    dispatcher: Arc<UiDispatcher>,
    callback: Arc<UpdateCallback>,
    /// The reentrancy guard, under the element's own lock.
    updating: Mutex<bool>,
    /// Back-reference set by `BindingInventory::track`.
    inventory: Mutex<Weak<InventoryInner>>,
}

/// Shared handle to one UI bridge element.
#[derive(Clone)]
pub struct BridgeElement {
    pub(crate) inner: Arc<BridgeInner>,
}

impl BridgeElement {
    /// Element bound to a single path.
    #[must_use]
    pub fn new(
        dispatcher: &Arc<UiDispatcher>,
        path: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Self {
        Self::with_paths(dispatcher, &[path], callback)
    }

    /// Element fanning out over several paths; `send_update` writes all of
    /// them, and a change on any pushes to the same callback.
    #[must_use]
    pub fn with_paths(
        dispatcher: &Arc<UiDispatcher>,
        paths: &[&str],
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                paths: paths.iter().map(|p| (*p).to_string()).collect(),
                dispatcher: Arc::clone(dispatcher),
                callback: Arc::new(callback),
                updating: Mutex::new(false),
                inventory: Mutex::new(Weak::new()),
            }),
        }
    }

    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.inner.paths
    }

    /// Reference identity of two handles.
    #[must_use]
    pub fn same(a: &BridgeElement, b: &BridgeElement) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    #[must_use]
    pub fn is_updating(&self) -> bool {
        *self.inner.updating.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inventory-side push of a freshly resolved value.
    ///
    /// Dropped silently while this element's own write is in flight;
    /// otherwise dispatched to the callback on the owning thread.
    pub fn receive_update(&self, value: &Value) {
        if self.is_updating() {
            trace!(paths = ?self.inner.paths, "dropping echoed update");
            return;
        }
        let callback = Arc::clone(&self.inner.callback);
        let value = value.clone();
        self.inner.dispatcher.dispatch(move || callback(&value));
    }

    /// UI-side write: forward `value` to the tracked inventory with the
    /// reentrancy guard engaged. A no-op before `track` (or after the
    /// inventory is gone).
    pub fn send_update(&self, value: Value) {
        let inventory = {
            let backref = self.inner.inventory.lock().unwrap_or_else(|e| e.into_inner());
            backref.upgrade()
        };
        let Some(inventory) = inventory else {
            trace!(paths = ?self.inner.paths, "send_update on untracked element");
            return;
        };
        let _guard = UpdatingGuard::engage(&self.inner.updating);
        inventory.send_update_from_element(self, value);
    }

    pub(crate) fn attach(&self, inventory: &Arc<InventoryInner>) {
        *self.inner.inventory.lock().unwrap_or_else(|e| e.into_inner()) =
            Arc::downgrade(inventory);
    }

    pub(crate) fn clear_attachment(&self) {
        *self.inner.inventory.lock().unwrap_or_else(|e| e.into_inner()) = Weak::new();
    }
}

impl std::fmt::Debug for BridgeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeElement")
            .field("paths", &self.inner.paths)
            .field("updating", &self.is_updating())
            .finish_non_exhaustive()
    }
}

/// Sets the `is-updating` flag for a scope; releases on drop so the flag
/// clears on every exit path, unwinds included.
struct UpdatingGuard<'a> {
    flag: &'a Mutex<bool>,
}

impl<'a> UpdatingGuard<'a> {
    fn engage(flag: &'a Mutex<bool>) -> Self {
        *flag.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Self { flag }
    }
}

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        *self.flag.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
