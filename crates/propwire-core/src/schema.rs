#![forbid(unsafe_code)]

//! Model type descriptions.
//!
//! A [`Schema`] is the static shape of a model type: an ordered list of
//! named properties with default values. Nodes are instantiated from an
//! `Arc<Schema>`; the schema's [`SchemaId`] is the "owner type" identity
//! that the property store keys its descriptor cache on.
//!
//! Schemas are built once per model type and shared; building is cheap but
//! not on any hot path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::Value;

/// Process-unique identity of a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(u64);

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(1);

/// One named property in a schema.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    name: String,
    default: Value,
}

impl PropertySpec {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value a fresh node starts with in this slot.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

/// Static description of a model type: name plus ordered property slots.
#[derive(Debug)]
pub struct Schema {
    id: SchemaId,
    name: String,
    specs: Vec<PropertySpec>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Start building a schema with the given type name.
    #[must_use]
    pub fn builder(name: &str) -> SchemaBuilder {
        SchemaBuilder {
            name: name.to_string(),
            specs: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> SchemaId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of property slots.
    #[must_use]
    pub fn property_count(&self) -> usize {
        self.specs.len()
    }

    /// Slot index of a property name, if defined.
    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Spec at a slot index.
    #[must_use]
    pub fn spec(&self, slot: usize) -> Option<&PropertySpec> {
        self.specs.get(slot)
    }

    /// All specs, in declaration order.
    #[must_use]
    pub fn specs(&self) -> &[PropertySpec] {
        &self.specs
    }
}

/// Builder returned by [`Schema::builder`].
pub struct SchemaBuilder {
    name: String,
    specs: Vec<PropertySpec>,
}

impl SchemaBuilder {
    /// Declare a property with a default value.
    ///
    /// # Panics
    ///
    /// Panics if the name was already declared on this builder.
    #[must_use]
    pub fn property(mut self, name: &str, default: Value) -> Self {
        assert!(
            !self.specs.iter().any(|s| s.name == name),
            "duplicate property {name:?} on schema {:?}",
            self.name
        );
        self.specs.push(PropertySpec {
            name: name.to_string(),
            default,
        });
        self
    }

    /// Finish, assigning a fresh process-unique [`SchemaId`].
    #[must_use]
    pub fn build(self) -> Arc<Schema> {
        let index = self
            .specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Arc::new(Schema {
            id: SchemaId(NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed)),
            name: self.name,
            specs: self.specs,
            index,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
