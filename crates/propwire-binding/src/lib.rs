#![forbid(unsafe_code)]

//! Path binding and UI dispatch for Propwire.
//!
//! # Role in Propwire
//! `propwire-binding` is the UI-facing half of the binding engine. The
//! [`BindingInventory`] listens at the top of a `propwire-core` node graph,
//! resolving dotted paths and pushing values to [`BridgeElement`]s; writes
//! from the UI travel back through the inventory into property setters.
//! [`UiDispatcher`] pins callback delivery to the owning (UI) thread, and
//! [`CommandRelay`] carries cancellable UI-triggered actions.
//!
//! # Data flow
//! model mutation → node notify → bubbled path → inventory match →
//! re-read → `BridgeElement::receive_update` → callback on the owning
//! thread. Opposite direction: `BridgeElement::send_update` (reentrancy
//! guard engaged) → inventory → property setter → back into notify.

pub mod bridge;
pub mod command;
pub mod dispatch;
pub mod inventory;

pub use bridge::{BridgeElement, UpdateCallback};
pub use command::{CommandEvent, CommandHandler, CommandRelay};
pub use dispatch::UiDispatcher;
pub use inventory::{BindingInventory, resolve_path};
