#![forbid(unsafe_code)]

//! Thread-affine task dispatch for UI bridge elements.
//!
//! # Design
//!
//! A [`UiDispatcher`] records the identity of the thread it was created on
//! (the owning thread — in an MVVM host, the UI thread). Dispatching from
//! the owning thread runs the task **inline, synchronously** — this is a
//! hard invariant, not an optimization: queueing same-thread dispatch
//! reorders a write-triggered refresh after the write's own guard scope and
//! reintroduces the feedback loops the inline rule exists to prevent.
//! Dispatching from any other thread enqueues onto the owner's task queue;
//! the owner executes queued tasks when it calls [`UiDispatcher::drain`].
//!
//! # Invariants
//!
//! 1. Same-thread dispatch completes the task before `dispatch` returns.
//! 2. Cross-thread tasks run only on the owning thread, in enqueue order.
//! 3. `drain` called off the owning thread runs nothing.

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use tracing::{debug, trace};

type Task = Box<dyn FnOnce() + Send>;

/// Task queue bound to the thread that constructed it.
pub struct UiDispatcher {
    owner: ThreadId,
    tx: mpsc::Sender<Task>,
    rx: Mutex<mpsc::Receiver<Task>>,
}

impl UiDispatcher {
    /// Create a dispatcher owned by the calling thread.
    #[must_use]
    pub fn for_current_thread() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            owner: thread::current().id(),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Identity of the owning thread.
    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Whether the calling thread is the owning thread.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Run `task` inline when called on the owning thread; otherwise
    /// enqueue it for the next [`drain`](UiDispatcher::drain).
    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
        if self.is_owner() {
            task();
        } else {
            trace!(owner = ?self.owner, "queueing cross-thread task");
            // The receiver lives as long as self, so send cannot fail.
            let _ = self.tx.send(Box::new(task));
        }
    }

    /// Execute every queued task. Must run on the owning thread; called
    /// anywhere else it runs nothing and returns 0, preserving affinity.
    pub fn drain(&self) -> usize {
        if !self.is_owner() {
            debug!(owner = ?self.owner, "drain called off the owning thread; skipped");
            return 0;
        }
        let mut ran = 0;
        loop {
            // Take one task with the receiver lock released before running
            // it, so a task may itself dispatch or drain.
            let next = {
                let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
                rx.try_recv()
            };
            match next {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }
}

impl std::fmt::Debug for UiDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiDispatcher")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
