#![forbid(unsafe_code)]

//! Change events and the listener trait.
//!
//! # Design
//!
//! One recyclable struct covers both notification shapes instead of a deep
//! event hierarchy:
//!
//! - [`ChangeKind::Property`] — a named property changed on the source
//!   node; `name` is the property name and `descriptor` the resolved
//!   accessor (when the schema defines it).
//! - [`ChangeKind::Object`] — object-level change; `name` is the
//!   accumulated dotted path, growing one segment per parent hop as the
//!   event bubbles ("" at the origin, `"mid.leaf"` two hops up).
//!
//! The `tag` field is rewritten per `(listener, tag)` delivery so each
//! registration sees the tag it registered under.
//!
//! Events are pooled: checked out of [`ObjectPool`](crate::pool::ObjectPool)
//! at the start of a notification, mutated, delivered synchronously, and
//! checked back in before the notifying call returns. Listeners receive
//! `&ChangeEvent` and must not retain it past the callback — clone the
//! fields they need instead.

use std::fmt;
use std::sync::Arc;

use crate::node::Node;
use crate::pool::Recyclable;
use crate::property::PropertyDescriptor;

/// Which shape of notification an event carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangeKind {
    #[default]
    Property,
    Object,
}

/// A pooled change notification payload.
#[derive(Default)]
pub struct ChangeEvent {
    pub(crate) kind: ChangeKind,
    /// Property name (`Property`) or accumulated dotted path (`Object`).
    pub(crate) name: String,
    /// Source tag of the registration currently being delivered to.
    pub(crate) tag: String,
    pub(crate) descriptor: Option<Arc<PropertyDescriptor>>,
    /// Delivery identity of the notifying node.
    pub(crate) source: Option<Node>,
}

impl ChangeEvent {
    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    #[must_use]
    pub fn is_property(&self) -> bool {
        self.kind == ChangeKind::Property
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        self.kind == ChangeKind::Object
    }

    /// Property name, or the accumulated path for object-level events.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tag this delivery's registration was made under.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Resolved descriptor for property events whose name the source
    /// schema defines.
    #[must_use]
    pub fn descriptor(&self) -> Option<&Arc<PropertyDescriptor>> {
        self.descriptor.as_ref()
    }

    /// The notifying node's delivery identity.
    #[must_use]
    pub fn source(&self) -> Option<&Node> {
        self.source.as_ref()
    }
}

impl Recyclable for ChangeEvent {
    fn reset(&mut self) {
        self.kind = ChangeKind::Property;
        // clear() keeps capacity — the point of pooling the carrier.
        self.name.clear();
        self.tag.clear();
        self.descriptor = None;
        self.source = None;
    }
}

impl fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("has_descriptor", &self.descriptor.is_some())
            .finish_non_exhaustive()
    }
}

/// Receiver of change notifications.
///
/// Implementations are registered on a node under one or more tags and are
/// invoked with the node's lock released — a listener may re-enter the
/// notify pipeline. Panics raised here propagate to the notifying caller.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
