#![forbid(unsafe_code)]

//! Observable nodes and change propagation for Propwire.
//!
//! # Role in Propwire
//! `propwire-core` is the model-side half of the binding engine: observable
//! [`Node`]s register listeners, fire derived-property reactions, and
//! bubble object-level changes through nested graphs with accumulated
//! dotted paths. `propwire-binding` sits on top, resolving paths for UI
//! bridge elements.
//!
//! # Primary responsibilities
//! - **Node**: listener registry (multiset of source tags), reaction map,
//!   structural reassignment, bubbling.
//! - **Schema/PropertyStore**: per-type property layout and the
//!   process-wide lazy descriptor cache.
//! - **ChangeEvent**: the pooled notification carrier.
//! - **ObjectPool**: recyclable-instance pool backing the notify hot path.
//!
//! # Concurrency
//! The notify pipeline is synchronous: `notify*` returns only after every
//! transitively reachable listener has run. Any thread may notify; each
//! node has exactly one lock, released before callbacks run
//! (snapshot-then-call), so handlers may re-enter freely.

pub mod event;
pub mod node;
pub mod pool;
pub mod property;
pub mod schema;
pub mod value;

pub use event::{ChangeEvent, ChangeKind, ChangeListener};
pub use node::{Node, WeakNode};
pub use pool::{ObjectPool, Recyclable};
pub use property::{PropertyDescriptor, PropertyStore};
pub use schema::{PropertySpec, Schema, SchemaBuilder, SchemaId};
pub use value::Value;
