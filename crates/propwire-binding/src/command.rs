#![forbid(unsafe_code)]

//! Command relay for UI-triggered actions.
//!
//! Distinct from the property-notify pipeline, which has no cancellation:
//! a [`CommandEvent`] carries an explicit cancelled flag that any handler
//! may set to stop delivery to subsequent matches within the same dispatch
//! call. Handlers fire in registration order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use propwire_core::Value;
use tracing::trace;

/// A named UI action with payload and cancellation flag.
pub struct CommandEvent {
    name: String,
    payload: Value,
    cancelled: AtomicBool,
}

impl CommandEvent {
    #[must_use]
    pub fn new(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            payload,
            cancelled: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Stop delivery to any handler after the current one.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handler invoked for a matching command.
pub type CommandHandler = dyn Fn(&CommandEvent) + Send + Sync;

/// Registry of command handlers keyed by command name.
pub struct CommandRelay {
    handlers: Mutex<Vec<(String, Arc<CommandHandler>)>>,
}

impl CommandRelay {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for `name`. Handlers fire in registration order.
    pub fn register(&self, name: &str, handler: impl Fn(&CommandEvent) + Send + Sync + 'static) {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.push((name.to_string(), Arc::new(handler)));
    }

    /// Drop every handler registered for `name`.
    pub fn unregister(&self, name: &str) {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.retain(|(n, _)| n != name);
    }

    /// Dispatch a command to every matching handler, stopping early if one
    /// cancels the event. Returns the number of handlers that ran.
    pub fn dispatch(&self, name: &str, payload: Value) -> usize {
        let matches: Vec<Arc<CommandHandler>> = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, h)| Arc::clone(h))
                .collect()
        };
        let event = CommandEvent::new(name, payload);
        let mut ran = 0;
        for handler in matches {
            if event.is_cancelled() {
                trace!(command = name, ran, "dispatch cancelled");
                break;
            }
            handler(&event);
            ran += 1;
        }
        ran
    }
}

impl Default for CommandRelay {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
