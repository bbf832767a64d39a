#![forbid(unsafe_code)]

//! Generic recyclable-instance pool.
//!
//! # Design
//!
//! The pool tracks instances per concrete type in two coarse sets:
//! *available* (idle, fields cleared) and *checked-out* (in flight,
//! identified by boxed address). A single pool-wide mutex serializes all
//! operations; acceptable because pooled payloads are short-lived — the
//! notify pipeline checks a carrier out, delivers it, and checks it back in
//! before the notifying call returns.
//!
//! Pooling here is an allocation-avoidance tactic, not a correctness
//! requirement: `check_out` falls back to constructing a fresh instance
//! whenever the available set is empty.
//!
//! # Invariants
//!
//! 1. `check_out` always returns an instance with freshly reset fields.
//! 2. `check_in` of an instance the pool is not tracking is a no-op, never
//!    an error.
//! 3. `clean` purges pooled instances only when nothing is checked out for
//!    any tracked type; otherwise it returns `false` and changes nothing.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

/// A payload the pool can recycle.
///
/// `reset` must return every field to its vacant state; capacity-retaining
/// clears (e.g. `String::clear`) are what make pooling pay off.
pub trait Recyclable: Any + Send {
    fn reset(&mut self);
}

#[derive(Default)]
struct Bucket {
    available: Vec<Box<dyn Recyclable>>,
    /// Boxed addresses of instances currently in flight.
    checked_out: HashSet<usize>,
}

#[derive(Default)]
struct PoolState {
    buckets: HashMap<TypeId, Bucket>,
}

/// Type-keyed pool of recyclable instances.
pub struct ObjectPool {
    state: Mutex<PoolState>,
}

fn address_of<T>(instance: &T) -> usize {
    std::ptr::from_ref(instance) as usize
}

impl ObjectPool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
        }
    }

    /// The shared pool backing the notification hot path.
    #[must_use]
    pub fn global() -> &'static ObjectPool {
        static POOL: OnceLock<ObjectPool> = OnceLock::new();
        POOL.get_or_init(ObjectPool::new)
    }

    /// Take an available instance of `T`, or construct one if none is
    /// pooled. The instance is reset and recorded as checked out.
    #[must_use]
    pub fn check_out<T: Recyclable + Default>(&self) -> Box<T> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = state.buckets.entry(TypeId::of::<T>()).or_default();
        let mut instance: Box<T> = match bucket.available.pop() {
            Some(recycled) => {
                let any: Box<dyn Any> = recycled;
                any.downcast().expect("bucket holds only its own type")
            }
            None => Box::new(T::default()),
        };
        instance.reset();
        bucket.checked_out.insert(address_of(&*instance));
        instance
    }

    /// Return an instance to the pool.
    ///
    /// If the instance is not currently checked out of this pool it is
    /// silently dropped.
    pub fn check_in<T: Recyclable>(&self, mut instance: Box<T>) {
        let addr = address_of(&*instance);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(bucket) = state.buckets.get_mut(&TypeId::of::<T>()) else {
            return;
        };
        if bucket.checked_out.remove(&addr) {
            instance.reset();
            bucket.available.push(instance);
        }
    }

    /// Purge every pooled instance.
    ///
    /// Fails (returns `false`, no change) while any instance of any tracked
    /// type is still checked out — purging would invalidate it in flight.
    pub fn clean(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.buckets.values().any(|b| !b.checked_out.is_empty()) {
            return false;
        }
        state.buckets.clear();
        true
    }

    /// Idle instances pooled for `T`.
    #[must_use]
    pub fn available_count<T: Recyclable>(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .buckets
            .get(&TypeId::of::<T>())
            .map_or(0, |b| b.available.len())
    }

    /// Instances of `T` currently in flight.
    #[must_use]
    pub fn checked_out_count<T: Recyclable>(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .buckets
            .get(&TypeId::of::<T>())
            .map_or(0, |b| b.checked_out.len())
    }
}

impl Default for ObjectPool {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
