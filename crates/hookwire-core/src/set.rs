#![forbid(unsafe_code)]

//! Observable insertion-ordered set.
//!
//! Sets have no replace event: `insert` emits `add` for new values only,
//! `remove` emits `delete` only for present values, and `clear` emits one
//! `delete` per previous value in insertion order.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::collection::{BindOptions, CollectionBinding, Observe, SetHandlers, SubscriberList};
use crate::error::HookError;

struct SetInner<T: 'static> {
    values: RefCell<IndexSet<T>>,
    subs: Rc<SubscriberList<SetHandlers<T>>>,
}

/// Observable wrapper around an [`IndexSet`].
pub struct HookSet<T: 'static> {
    inner: Rc<SetInner<T>>,
}

/// Wrap `values` in a [`HookSet`].
pub fn wrap_set<T: Eq + Hash + Clone + 'static>(values: IndexSet<T>) -> HookSet<T> {
    HookSet::new(values)
}

impl<T: Eq + Hash + Clone + 'static> HookSet<T> {
    pub fn new(values: IndexSet<T>) -> Self {
        Self {
            inner: Rc::new(SetInner {
                values: RefCell::new(values),
                subs: SubscriberList::new("set"),
            }),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.values.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.values.borrow().is_empty()
    }

    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.inner.values.borrow().contains(value)
    }

    pub fn with<R>(&self, f: impl FnOnce(&IndexSet<T>) -> R) -> R {
        f(&*self.inner.values.borrow())
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.len()
    }

    /// Insert `value`. Returns whether it was new.
    pub fn insert(&self, value: T) -> bool {
        let added = self.inner.values.borrow_mut().insert(value.clone());
        if added {
            self.inner.subs.emit("add", |id, h| h.add(id, &value));
        }
        added
    }

    /// Remove `value`, keeping the order of the remaining values. Returns
    /// whether it was present.
    pub fn remove(&self, value: &T) -> bool {
        let removed = self.inner.values.borrow_mut().shift_remove(value);
        if removed {
            self.inner.subs.emit("delete", |id, h| h.delete(id, value));
        }
        removed
    }

    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.inner.values.borrow_mut());
        for value in &old {
            self.inner.subs.emit("delete", |id, h| h.delete(id, value));
        }
    }

    /// Subscribe; `replay_existing` replays current values as `add` before
    /// registering.
    pub(crate) fn subscribe(
        &self,
        handlers: SetHandlers<T>,
        replay_existing: bool,
    ) -> CollectionBinding<SetHandlers<T>> {
        if !replay_existing {
            return self.inner.subs.subscribe(handlers, None);
        }
        let snapshot = self.inner.values.borrow().clone();
        let replay = move |h: &mut SetHandlers<T>| {
            for value in &snapshot {
                h.replay_add(value);
            }
        };
        self.inner
            .subs
            .subscribe(handlers, Some(&replay as &dyn Fn(&mut SetHandlers<T>)))
    }
}

impl<T: Eq + Hash + Clone + 'static> Observe for HookSet<T> {
    type Handlers = SetHandlers<T>;

    /// `no_set` is accepted and has no effect: set handler tables have no
    /// replace slot to conflict with.
    fn bind(
        &self,
        handlers: SetHandlers<T>,
        options: BindOptions,
    ) -> Result<CollectionBinding<SetHandlers<T>>, HookError> {
        Ok(self.subscribe(handlers, options.add_existing))
    }
}

impl<T: 'static> Clone for HookSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for HookSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSet")
            .field("values", &*self.inner.values.borrow())
            .field("subscribers", &self.inner.subs.len())
            .finish()
    }
}
