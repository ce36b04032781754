#![forbid(unsafe_code)]

//! Error boundary shared by every emission site.
//!
//! A mutation is committed before any subscriber runs, so a panicking
//! handler must not unwind back into the mutating call. Every call into user
//! code (emit handlers, combinators, mirror targets, cleanups, list builders)
//! goes through [`guard`], which catches the panic and logs it.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Handler panics | Logged at `error`, notification lost, `None` returned |
//! | Replay handler panics | Logged at `warn`, remaining replay skipped |
//!
//! The process panic hook still runs, so the default hook prints the panic
//! message to stderr in addition to the `tracing` event.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::dispose::BindingId;

/// Run `f`, converting a panic into a logged `None`.
///
/// `site` names the call site (e.g. `"callback.emit"`) and `binding` the
/// subscriber the call belongs to, when there is one.
pub fn guard<R>(site: &'static str, binding: Option<BindingId>, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                site,
                binding = binding.map(BindingId::get),
                panic = message,
                "binding handler panicked"
            );
            None
        }
    }
}

/// Like [`guard`], but logs at `warn`. Used for best-effort replays where a
/// failure only means the consumer starts from partial state.
pub(crate) fn guard_replay(binding: BindingId, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(
                site = "collection.replay",
                binding = binding.get(),
                panic = message,
                "replay of existing entries aborted"
            );
            false
        }
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_passes_values_through() {
        assert_eq!(guard("test", None, || 7), Some(7));
    }

    #[test]
    fn guard_swallows_panics() {
        let out: Option<u32> = guard("test", None, || panic!("boom"));
        assert_eq!(out, None);
    }

    #[test]
    fn replay_guard_reports_abort() {
        let id = BindingId::next();
        assert!(guard_replay(id, || {}));
        assert!(!guard_replay(id, || panic!("replay failed")));
    }

    #[test]
    fn panic_message_handles_both_string_kinds() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("static");
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "static");
        assert_eq!(panic_message(other.as_ref()), "<non-string panic payload>");
    }
}
