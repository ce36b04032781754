#![forbid(unsafe_code)]

//! Observable records and collections with owner-scoped bindings.
//!
//! - [`HookObject`]: a record wrapper that notifies per-key subscribers on
//!   every successful write.
//! - [`HookArray`], [`HookMap`], [`HookSet`]: collection wrappers that turn
//!   each mutation into `add` / `set` / `delete` events.
//! - [`Derivation`]: a value computed from one or more record keys, consumed
//!   through a [`MirrorBinding`] or a [`CallbackBinding`].
//! - [`CollectionBinding`]: a subscription to structural collection events.
//! - [`Owner`]: RAII holder whose drop retires every binding it claimed once
//!   no other owner still claims it.
//!
//! # Architecture
//!
//! All state is single-threaded (`Rc<RefCell<..>>`). A store holds its
//! subscribers strongly; a subscriber holds its handler weakly and pins it
//! with one strong reference until it is bound to an owner, at which point the
//! owner's claim carries the strong reference instead.
//!
//! Notifications are synchronous: every mutating call returns only after all
//! subscribers have observed it. Subscriber lists are snapshotted before
//! dispatch, so no store borrow is held while user code runs.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. A rejected write (see [`Record::set`]) emits nothing.
//! 3. A binding claimed by N owners is destroyed on the Nth release, not the
//!    first.
//! 4. `destroy()` is idempotent and cancels every outstanding owner claim.
//! 5. A panicking handler never unwinds into the mutating call.

pub mod array;
pub mod boundary;
pub mod collection;
pub mod config;
pub mod derive;
pub mod dispose;
pub mod error;
pub mod leak;
pub mod map;
pub mod object;
pub mod set;

pub use array::{HookArray, wrap_array};
pub use collection::{
    ArrayHandlers, BindOptions, Cleanup, CollectionBinding, MapHandlers, Observe, SetHandlers,
    bind_collection,
};
pub use config::RuntimeConfig;
pub use derive::{Assign, CallbackBinding, Derivation, MirrorBinding, MirrorTarget, OwnedRecord};
pub use dispose::{BindingId, Hook, Owner};
pub use error::HookError;
pub use map::{HookMap, wrap_map};
pub use object::{Frozen, HookObject, Record, wrap_object};
pub use set::{HookSet, wrap_set};
