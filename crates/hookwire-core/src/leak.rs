#![forbid(unsafe_code)]

//! Development aid: track bindings that were never bound to an owner.
//!
//! A callback or collection binding that is neither owner-bound nor destroyed
//! lives as long as its source store. That is sometimes intended, but more
//! often a forgotten `bind_to_owner`. When tracking is enabled, every such
//! binding is listed by [`unbound`] until it is bound or destroyed.
//!
//! Tracking is thread-local and off by default. It starts enabled when
//! [`RuntimeConfig::track_unbound`](crate::RuntimeConfig) is set through the
//! environment. The registry is diagnostic only: nothing in the runtime reads
//! it to make decisions.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::config::RuntimeConfig;
use crate::dispose::BindingId;

thread_local! {
    static TRACKER: RefCell<Tracker> = RefCell::new(Tracker::new(RuntimeConfig::from_env()));
}

struct Tracker {
    enabled: bool,
    pending: BTreeMap<BindingId, &'static str>,
}

impl Tracker {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            enabled: config.track_unbound,
            pending: BTreeMap::new(),
        }
    }
}

/// A binding that is still waiting for an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnboundBinding {
    pub id: BindingId,
    /// Binding kind, e.g. `"callback"` or `"array"`.
    pub kind: &'static str,
}

/// Start tracking unbound bindings on this thread.
pub fn enable() {
    TRACKER.with(|t| t.borrow_mut().enabled = true);
}

/// Stop tracking and forget everything recorded so far.
pub fn disable() {
    TRACKER.with(|t| {
        let mut t = t.borrow_mut();
        t.enabled = false;
        t.pending.clear();
    });
}

/// Whether tracking is active on this thread.
#[must_use]
pub fn is_enabled() -> bool {
    TRACKER.with(|t| t.borrow().enabled)
}

/// Bindings created since tracking was enabled that are neither owner-bound
/// nor destroyed, oldest first.
#[must_use]
pub fn unbound() -> Vec<UnboundBinding> {
    TRACKER.with(|t| {
        t.borrow()
            .pending
            .iter()
            .map(|(&id, &kind)| UnboundBinding { id, kind })
            .collect()
    })
}

/// Number of entries [`unbound`] would return.
#[must_use]
pub fn unbound_count() -> usize {
    TRACKER.with(|t| t.borrow().pending.len())
}

pub(crate) fn track(id: BindingId, kind: &'static str) {
    TRACKER.with(|t| {
        let mut t = t.borrow_mut();
        if t.enabled {
            t.pending.insert(id, kind);
        }
    });
}

pub(crate) fn forget(id: BindingId) {
    // try_with: bindings can be dropped during thread-local teardown.
    let _ = TRACKER.try_with(|t| {
        if let Ok(mut t) = t.try_borrow_mut() {
            t.pending.remove(&id);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tracker_records_nothing() {
        disable();
        track(BindingId::next(), "callback");
        assert_eq!(unbound_count(), 0);
    }

    #[test]
    fn enabled_tracker_lists_until_forgotten() {
        enable();
        let a = BindingId::next();
        let b = BindingId::next();
        track(a, "callback");
        track(b, "array");
        assert_eq!(
            unbound(),
            vec![
                UnboundBinding { id: a, kind: "callback" },
                UnboundBinding { id: b, kind: "array" },
            ]
        );
        forget(a);
        assert_eq!(unbound_count(), 1);
        disable();
        assert_eq!(unbound_count(), 0);
        assert!(!is_enabled());
    }
}
