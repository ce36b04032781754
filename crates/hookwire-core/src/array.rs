#![forbid(unsafe_code)]

//! Observable vector.
//!
//! [`HookArray`] owns a `Vec<T>` and re-expresses each mutation as a sequence
//! of positional `add` / `set` / `delete` events. Consumers that mirror the
//! array with a parallel index-addressed structure can apply the events in
//! order and stay aligned.
//!
//! # Event shapes
//!
//! | Operation | Events |
//! |-----------|--------|
//! | `push`, `extend` | `add(len + k)` per item |
//! | `unshift` | `add(k)` per item, front to back |
//! | `pop` / `shift` | `delete(len - 1)` / `delete(0)`; nothing when empty |
//! | `splice` | `delete` descending over the removed range, then `add` ascending |
//! | `set(i)` past the end | `add` for each gap slot, then `add(i)` |
//! | `set(i)` in bounds | `set(i)` |
//! | `set_len` | `delete` descending or `add` ascending |
//! | `reverse`, `sort*` | `delete` every index descending, `add` every index ascending |
//! | `fill`, `copy_within` | `set` per written index |
//! | `clear_index(i)` | `set(i, default)` when in bounds |
//! | `clear` | `delete` every index descending |
//!
//! Reads never emit.

use std::cell::RefCell;
use std::ops::{Bound, Range, RangeBounds};
use std::rc::Rc;

use crate::collection::{ArrayHandlers, BindOptions, CollectionBinding, Observe, SubscriberList};
use crate::error::HookError;

struct ArrayInner<T: 'static> {
    items: RefCell<Vec<T>>,
    subs: Rc<SubscriberList<ArrayHandlers<T>>>,
}

/// Observable wrapper around a `Vec<T>`.
///
/// Cloning yields another handle to the same array.
pub struct HookArray<T: 'static> {
    inner: Rc<ArrayInner<T>>,
}

/// Wrap `items` in a [`HookArray`].
pub fn wrap_array<T: Clone + 'static>(items: Vec<T>) -> HookArray<T> {
    HookArray::new(items)
}

impl<T: Clone + 'static> HookArray<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                subs: SubscriberList::new("array"),
            }),
        }
    }

    // -- reads ---------------------------------------------------------------

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Run `f` against the current contents.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(self.inner.items.borrow().as_slice())
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    /// Number of live collection bindings.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.len()
    }

    // -- appends and removals ------------------------------------------------

    /// Append `value`. Returns the new length.
    pub fn push(&self, value: T) -> usize {
        self.extend([value])
    }

    /// Append every item. Returns the new length.
    pub fn extend(&self, values: impl IntoIterator<Item = T>) -> usize {
        let added: Vec<T> = values.into_iter().collect();
        let (start, len) = {
            let mut items = self.inner.items.borrow_mut();
            let start = items.len();
            items.extend(added.iter().cloned());
            (start, items.len())
        };
        for (k, value) in added.iter().enumerate() {
            self.emit_add(start + k, value);
        }
        len
    }

    /// Insert every item at the front, preserving their order. Returns the
    /// new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = T>) -> usize {
        let added: Vec<T> = values.into_iter().collect();
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.splice(0..0, added.iter().cloned());
            items.len()
        };
        for (k, value) in added.iter().enumerate() {
            self.emit_add(k, value);
        }
        len
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<T> {
        let (value, index) = {
            let mut items = self.inner.items.borrow_mut();
            let value = items.pop()?;
            (value, items.len())
        };
        self.emit_delete(index);
        Some(value)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<T> {
        let value = {
            let mut items = self.inner.items.borrow_mut();
            if items.is_empty() {
                return None;
            }
            items.remove(0)
        };
        self.emit_delete(0);
        Some(value)
    }

    /// Remove `delete_count` elements starting at `start` and insert `items`
    /// in their place. Returns the removed elements.
    ///
    /// A negative `start` counts from the end. Both arguments are clamped to
    /// the array bounds; `None` deletes through the end.
    pub fn splice(
        &self,
        start: isize,
        delete_count: Option<usize>,
        values: impl IntoIterator<Item = T>,
    ) -> Vec<T> {
        let added: Vec<T> = values.into_iter().collect();
        let (at, removed) = {
            let mut items = self.inner.items.borrow_mut();
            let len = items.len();
            let at = clamp_start(start, len);
            let count = delete_count.unwrap_or(usize::MAX).min(len - at);
            let removed: Vec<T> = items.splice(at..at + count, added.iter().cloned()).collect();
            (at, removed)
        };
        for i in (0..removed.len()).rev() {
            self.emit_delete(at + i);
        }
        for (k, value) in added.iter().enumerate() {
            self.emit_add(at + k, value);
        }
        removed
    }

    /// Remove every element.
    pub fn clear(&self) {
        let old_len = {
            let mut items = self.inner.items.borrow_mut();
            let n = items.len();
            items.clear();
            n
        };
        for i in (0..old_len).rev() {
            self.emit_delete(i);
        }
    }

    // -- in-place writes -----------------------------------------------------

    /// Replace the element at `index`, growing the array with default values
    /// if `index` is past the end.
    pub fn set(&self, index: usize, value: T)
    where
        T: Default,
    {
        let old_len = {
            let mut items = self.inner.items.borrow_mut();
            let old_len = items.len();
            if index < old_len {
                items[index] = value.clone();
            } else {
                items.resize_with(index, T::default);
                items.push(value.clone());
            }
            old_len
        };
        if index < old_len {
            self.emit_set(index, &value);
            return;
        }
        let gap = T::default();
        for i in old_len..index {
            self.emit_add(i, &gap);
        }
        self.emit_add(index, &value);
    }

    /// Truncate or grow (with default values) to `new_len`.
    pub fn set_len(&self, new_len: usize)
    where
        T: Default,
    {
        let old_len = {
            let mut items = self.inner.items.borrow_mut();
            let old_len = items.len();
            items.resize_with(new_len, T::default);
            old_len
        };
        if new_len < old_len {
            for i in (new_len..old_len).rev() {
                self.emit_delete(i);
            }
        } else {
            let gap = T::default();
            for i in old_len..new_len {
                self.emit_add(i, &gap);
            }
        }
    }

    /// Reset the element at `index` to its default value. Out-of-bounds
    /// indices are ignored.
    pub fn clear_index(&self, index: usize)
    where
        T: Default,
    {
        {
            let mut items = self.inner.items.borrow_mut();
            match items.get_mut(index) {
                Some(slot) => *slot = T::default(),
                None => return,
            }
        }
        self.emit_set(index, &T::default());
    }

    /// Overwrite every element in `range` (clamped) with `value`.
    pub fn fill(&self, value: T, range: impl RangeBounds<usize>) {
        let written = {
            let mut items = self.inner.items.borrow_mut();
            let written = clamp_range(&range, items.len());
            items[written.clone()].fill(value.clone());
            written
        };
        for i in written {
            self.emit_set(i, &value);
        }
    }

    /// Copy `src` (clamped) onto the elements starting at `dest`. Elements
    /// that would land past the end are dropped, so the length never changes.
    pub fn copy_within(&self, src: impl RangeBounds<usize>, dest: usize) {
        let writes: Vec<(usize, T)> = {
            let mut items = self.inner.items.borrow_mut();
            let len = items.len();
            if dest >= len {
                return;
            }
            let src = clamp_range(&src, len);
            let count = src.len().min(len - dest);
            let copied: Vec<T> = items[src.start..src.start + count].to_vec();
            let mut writes = Vec::with_capacity(count);
            for (k, value) in copied.into_iter().enumerate() {
                items[dest + k] = value.clone();
                writes.push((dest + k, value));
            }
            writes
        };
        for (index, value) in &writes {
            self.emit_set(*index, value);
        }
    }

    // -- reorders ------------------------------------------------------------

    pub fn reverse(&self) {
        self.reorder(|items| items.reverse());
    }

    pub fn sort(&self)
    where
        T: Ord,
    {
        self.reorder(|items| items.sort());
    }

    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        self.reorder(|items| items.sort_by(compare));
    }

    pub fn sort_by_key<K: Ord>(&self, key: impl FnMut(&T) -> K) {
        self.reorder(|items| items.sort_by_key(key));
    }

    /// Apply `f`, then announce a full rebuild.
    fn reorder(&self, f: impl FnOnce(&mut Vec<T>)) {
        let snapshot = {
            let mut items = self.inner.items.borrow_mut();
            f(&mut *items);
            items.clone()
        };
        for i in (0..snapshot.len()).rev() {
            self.emit_delete(i);
        }
        for (i, value) in snapshot.iter().enumerate() {
            self.emit_add(i, value);
        }
    }

    // -- bindings ------------------------------------------------------------

    /// Subscribe with `set` delivered as-is; `replay_existing` replays
    /// current elements as `add` before registering. Public only for
    /// `hookwire-list`; use [`Observe::bind`] instead.
    #[doc(hidden)]
    pub fn subscribe(
        &self,
        handlers: ArrayHandlers<T>,
        replay_existing: bool,
    ) -> CollectionBinding<ArrayHandlers<T>> {
        if !replay_existing {
            return self.inner.subs.subscribe(handlers, None);
        }
        let snapshot = self.to_vec();
        let replay = move |h: &mut ArrayHandlers<T>| {
            for (i, value) in snapshot.iter().enumerate() {
                h.replay_add(i, value);
            }
        };
        self.inner.subs.subscribe(handlers, Some(&replay as &dyn Fn(&mut ArrayHandlers<T>)))
    }

    // -- emission ------------------------------------------------------------

    fn emit_add(&self, index: usize, value: &T) {
        self.inner.subs.emit("add", |id, h| h.add(id, index, value));
    }

    fn emit_set(&self, index: usize, value: &T) {
        self.inner.subs.emit("set", |id, h| h.set(id, index, value));
    }

    fn emit_delete(&self, index: usize) {
        self.inner.subs.emit("delete", |id, h| h.delete(id, index));
    }
}

impl<T: Clone + 'static> Observe for HookArray<T> {
    type Handlers = ArrayHandlers<T>;

    fn bind(
        &self,
        mut handlers: ArrayHandlers<T>,
        options: BindOptions,
    ) -> Result<CollectionBinding<ArrayHandlers<T>>, HookError> {
        if options.no_set {
            if handlers.has_set() {
                return Err(HookError::SetHandlerWithNoSet { store: "array" });
            }
            handlers.remount_on_set();
        }
        Ok(self.subscribe(handlers, options.add_existing))
    }
}

impl<T: 'static> Clone for HookArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for HookArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookArray")
            .field("items", &*self.inner.items.borrow())
            .field("subscribers", &self.inner.subs.len())
            .finish()
    }
}

fn clamp_start(start: isize, len: usize) -> usize {
    if start >= 0 {
        start.unsigned_abs().min(len)
    } else {
        len.saturating_sub(start.unsigned_abs())
    }
}

fn clamp_range(range: &impl RangeBounds<usize>, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    start.min(end)..end
}
