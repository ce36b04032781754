#![forbid(unsafe_code)]

//! hookwire public facade crate.
//!
//! Re-exports the store and binding surface of `hookwire-core` and, with the
//! `list` feature (on by default), the list reconciler.

pub use hookwire_core::*;

#[cfg(feature = "list")]
pub use hookwire_list as list;

pub mod prelude {
    pub use hookwire_core as core;
    pub use hookwire_core::{
        ArrayHandlers, BindOptions, Hook, HookArray, HookMap, HookObject, HookSet, MapHandlers,
        Observe, Owner, SetHandlers, wrap_array, wrap_map, wrap_object, wrap_set,
    };

    #[cfg(feature = "list")]
    pub use hookwire_list::{ListHost, build_list};
}
