#![forbid(unsafe_code)]

//! Property descriptors and the process-wide descriptor cache.
//!
//! # Design
//!
//! A [`PropertyDescriptor`] pairs a schema identity with a slot index and
//! exposes get/set accessors over any node instantiated from that schema.
//! Descriptors are built lazily by the [`PropertyStore`] the first time a
//! `(schema, name)` pair is requested and cached for the life of the
//! process — the cache is shared across node instances, never per-node
//! state.
//!
//! # Invariants
//!
//! 1. `resolve` for a given `(SchemaId, name)` returns the same `Arc`
//!    instance once cached, including under concurrent first-request races
//!    (losers of the race adopt the winner's entry).
//! 2. Unknown names resolve to `None`, never a panic; the miss is cached so
//!    repeated lookups of a typo'd binding path stay cheap.
//!
//! # Failure Modes
//!
//! - **Schema mismatch**: `get`/`set` through a descriptor against a node
//!   of a different schema is a silent no-op (`None` / `false`).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::trace;

use crate::node::Node;
use crate::schema::{Schema, SchemaId};
use crate::value::Value;

/// Accessor descriptor for one property of one model type.
#[derive(Debug)]
pub struct PropertyDescriptor {
    schema_id: SchemaId,
    slot: usize,
    name: String,
}

impl PropertyDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    /// Slot index within the owning schema's value vector.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Read the property from `node`.
    ///
    /// Returns `None` if `node` was not instantiated from this
    /// descriptor's schema.
    #[must_use]
    pub fn get(&self, node: &Node) -> Option<Value> {
        if node.schema().id() != self.schema_id {
            return None;
        }
        node.slot_value(self.slot)
    }

    /// Write the property on `node`, re-entering the notify pipeline.
    ///
    /// Returns `false` (no write, no notification) on schema mismatch or
    /// when the new value equals the current one.
    pub fn set(&self, node: &Node, value: Value) -> bool {
        if node.schema().id() != self.schema_id {
            return false;
        }
        node.apply_slot(self.slot, &self.name, value)
    }
}

type DescriptorEntry = Option<Arc<PropertyDescriptor>>;

/// Process-wide lazy descriptor cache.
pub struct PropertyStore {
    cache: RwLock<HashMap<SchemaId, HashMap<String, DescriptorEntry>>>,
}

impl PropertyStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The shared store used by the notify pipeline.
    #[must_use]
    pub fn global() -> &'static PropertyStore {
        static STORE: OnceLock<PropertyStore> = OnceLock::new();
        STORE.get_or_init(PropertyStore::new)
    }

    /// Resolve `(schema, name)` to its descriptor, building and caching it
    /// on first request. Unknown names return `None` (also cached).
    #[must_use]
    pub fn resolve(&self, schema: &Schema, name: &str) -> Option<Arc<PropertyDescriptor>> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(&schema.id()).and_then(|m| m.get(name)) {
                return entry.clone();
            }
        }

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let by_name = cache.entry(schema.id()).or_default();
        // Re-check: another thread may have populated the entry between the
        // read unlock and the write lock. The first insert wins so every
        // caller observes one descriptor instance.
        if let Some(entry) = by_name.get(name) {
            return entry.clone();
        }
        trace!(schema = schema.name(), property = name, "descriptor cache miss");
        let built = schema.slot_of(name).map(|slot| {
            Arc::new(PropertyDescriptor {
                schema_id: schema.id(),
                slot,
                name: name.to_string(),
            })
        });
        by_name.insert(name.to_string(), built.clone());
        built
    }

    /// Number of cached entries (hits and misses) for a schema.
    #[must_use]
    pub fn cached_count(&self, schema_id: SchemaId) -> usize {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(&schema_id).map_or(0, HashMap::len)
    }
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
