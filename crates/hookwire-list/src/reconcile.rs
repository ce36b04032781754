#![forbid(unsafe_code)]

//! Keep a host's artifacts aligned with a [`HookArray`].
//!
//! The reconciler keeps one slot per source element. A slot is either an
//! artifact that lives in the host or a *hole* (the builder returned `None`
//! or panicked). Structural array events update the slots and translate into
//! the fewest host operations the placement rule allows.
//!
//! # Placement
//!
//! A newly filled slot at index `i` (of `len` slots) goes:
//!
//! 1. to the front when `i == 0`;
//! 2. to the back when `i == len - 1`;
//! 3. after the nearest filled slot before it when `i` is in the first half
//!    (front if there is none);
//! 4. otherwise before the nearest filled slot after it (back if none).
//!
//! # Invariants
//!
//! 1. `slots.len()` equals the source array length after every event.
//! 2. The host holds exactly the filled slots, in slot order.

use std::cell::RefCell;
use std::rc::Rc;

use hookwire_core::boundary::guard;
use hookwire_core::{ArrayHandlers, CollectionBinding, Hook, HookArray, Owner};

use crate::host::ListHost;

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

struct Slots<H: ListHost> {
    host: Rc<RefCell<H>>,
    slots: Vec<Option<H::Item>>,
}

impl<H: ListHost> Slots<H> {
    fn add(&mut self, index: usize, item: Option<H::Item>) {
        let index = index.min(self.slots.len());
        self.slots.insert(index, item);
        self.place(index);
    }

    fn set(&mut self, index: usize, item: Option<H::Item>) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        let old = std::mem::replace(slot, item.clone());
        match (old, item) {
            (Some(old), Some(new)) => self.host.borrow_mut().replace(&old, new),
            (Some(old), None) => self.host.borrow_mut().remove(&old),
            (None, Some(_)) => self.place(index),
            (None, None) => {}
        }
    }

    fn delete(&mut self, index: usize) {
        if index >= self.slots.len() {
            return;
        }
        if let Some(old) = self.slots.remove(index) {
            self.host.borrow_mut().remove(&old);
        }
    }

    /// Insert the artifact in slot `index` into the host.
    fn place(&self, index: usize) {
        let Some(item) = self.slots[index].clone() else {
            return;
        };
        let len = self.slots.len();
        let mut host = self.host.borrow_mut();
        if index == 0 {
            host.insert_first(item);
        } else if index == len - 1 {
            host.append(item);
        } else if index * 2 < len {
            match self.slots[..index].iter().rev().flatten().next() {
                Some(anchor) => host.insert_after(anchor, item),
                None => host.insert_first(item),
            }
        } else {
            match self.slots[index + 1..].iter().flatten().next() {
                Some(anchor) => host.insert_before(anchor, item),
                None => host.append(item),
            }
        }
    }

    fn holes(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }
}

fn build_guarded<T, A>(build: &dyn Fn(&T) -> Option<A>, index: usize, value: &T) -> Option<A> {
    let built = guard("list.build", None, || build(value)).flatten();
    if built.is_none() {
        tracing::trace!(index, "list slot left empty");
    }
    built
}

// ---------------------------------------------------------------------------
// ListView
// ---------------------------------------------------------------------------

/// A host kept in sync with a source array.
///
/// Dropping the view destroys its binding; the host keeps whatever it held
/// at that point.
pub struct ListView<T: 'static, H: ListHost + 'static> {
    // Declared first so the binding is released before the slots go.
    owner: Owner,
    binding: CollectionBinding<ArrayHandlers<T>>,
    slots: Rc<RefCell<Slots<H>>>,
    host: Rc<RefCell<H>>,
}

/// Render `source` into `host`, one `build` result per element.
///
/// Existing elements are built immediately, in order. From then on every
/// array mutation is reflected in the host before the mutating call returns.
pub fn build_list<T, H, F>(source: &HookArray<T>, build: F, host: H) -> ListView<T, H>
where
    T: Clone + 'static,
    H: ListHost + 'static,
    F: Fn(&T) -> Option<H::Item> + 'static,
{
    let host = Rc::new(RefCell::new(host));
    let slots = Rc::new(RefCell::new(Slots {
        host: Rc::clone(&host),
        slots: Vec::new(),
    }));
    let build: Rc<dyn Fn(&T) -> Option<H::Item>> = Rc::new(build);

    let (add_slots, add_build) = (Rc::clone(&slots), Rc::clone(&build));
    let (set_slots, set_build) = (Rc::clone(&slots), Rc::clone(&build));
    let del_slots = Rc::clone(&slots);
    let handlers = ArrayHandlers::new()
        .on_add(move |index, value: &T| {
            let item = build_guarded(&*add_build, index, value);
            add_slots.borrow_mut().add(index, item);
        })
        .on_set(move |index, value: &T| {
            let item = build_guarded(&*set_build, index, value);
            set_slots.borrow_mut().set(index, item);
        })
        .on_delete(move |index| del_slots.borrow_mut().delete(index));

    let owner = Owner::new();
    let binding = source.subscribe(handlers, true).bind_to_owner(&owner);
    tracing::debug!(binding = %binding.id(), len = source.len(), "list view built");
    ListView {
        owner,
        binding,
        slots,
        host,
    }
}

impl<T: 'static, H: ListHost + 'static> ListView<T, H> {
    /// Run `f` against the host.
    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&*self.host.borrow())
    }

    /// Run `f` with mutable access to the host. Must not be called from a
    /// build function of this view.
    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut *self.host.borrow_mut())
    }

    /// Number of slots, equal to the source length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.borrow().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots without an artifact.
    #[must_use]
    pub fn hole_count(&self) -> usize {
        self.slots.borrow().holes()
    }

    /// The subscription feeding this view.
    #[must_use]
    pub fn binding(&self) -> &CollectionBinding<ArrayHandlers<T>> {
        &self.binding
    }

    /// Owner holding the view's binding. Other bindings can be tied to the
    /// view's lifetime by binding them here.
    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Stop following the source and return the host.
    pub fn into_host(self) -> Rc<RefCell<H>> {
        self.binding.destroy();
        Rc::clone(&self.host)
    }
}

impl<T: 'static, H: ListHost + 'static> std::fmt::Debug for ListView<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListView")
            .field("len", &self.len())
            .field("holes", &self.hole_count())
            .field("binding", &self.binding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::VecHost;
    use hookwire_core::wrap_array;

    fn doubled(items: Vec<i32>) -> (HookArray<i32>, ListView<i32, VecHost<i32>>) {
        let source = wrap_array(items);
        let view = build_list(&source, |v: &i32| Some(v * 2), VecHost::new());
        (source, view)
    }

    #[test]
    fn initial_build_follows_source_order() {
        let (_source, view) = doubled(vec![1, 2, 3]);
        view.with_host(|h| assert_eq!(h.items(), &[2, 4, 6]));
        assert_eq!(view.len(), 3);
        assert_eq!(view.hole_count(), 0);
    }

    #[test]
    fn first_half_insert_anchors_after_predecessor() {
        let (source, view) = doubled(vec![1, 2, 3, 4, 5]);
        source.splice(1, Some(0), [10]);
        view.with_host(|h| {
            assert_eq!(h.items(), &[2, 20, 4, 6, 8, 10]);
            assert!(matches!(
                h.ops().last(),
                Some(crate::host::HostOp::InsertAfter { anchor: 2, item: 20 })
            ));
        });
    }

    #[test]
    fn second_half_insert_anchors_before_successor() {
        let (source, view) = doubled(vec![1, 2, 3, 4]);
        source.splice(3, Some(0), [7]);
        view.with_host(|h| {
            assert_eq!(h.items(), &[2, 4, 6, 14, 8]);
            assert!(matches!(
                h.ops().last(),
                Some(crate::host::HostOp::InsertBefore { anchor: 8, item: 14 })
            ));
        });
    }

    #[test]
    fn holes_are_skipped_when_anchoring() {
        let source = wrap_array(vec![1, -1, -2, 4, 5, 6]);
        let view = build_list(&source, |v: &i32| (*v > 0).then_some(*v), VecHost::new());
        assert_eq!(view.hole_count(), 2);
        source.splice(2, Some(0), [9]);
        view.with_host(|h| assert_eq!(h.items(), &[1, 9, 4, 5, 6]));
    }

    #[test]
    fn set_transitions_between_hole_and_artifact() {
        let source = wrap_array(vec![1, 2, 3]);
        let view = build_list(&source, |v: &i32| (*v > 0).then_some(*v), VecHost::new());
        source.set(1, -5);
        view.with_host(|h| assert_eq!(h.items(), &[1, 3]));
        assert_eq!(view.hole_count(), 1);
        source.set(1, 7);
        view.with_host(|h| assert_eq!(h.items(), &[1, 7, 3]));
        source.set(1, 8);
        view.with_host(|h| assert_eq!(h.items(), &[1, 8, 3]));
    }

    #[test]
    fn delete_removes_the_slot() {
        let (source, view) = doubled(vec![1, 2, 3]);
        source.shift();
        assert_eq!(view.len(), 2);
        source.push(4);
        view.with_host(|h| assert_eq!(h.items(), &[4, 6, 8]));
    }

    #[test]
    fn panicking_builder_leaves_a_hole() {
        let source = wrap_array(vec![1, 2, 3]);
        let view = build_list(
            &source,
            |v: &i32| {
                assert!(*v != 2, "cannot build 2");
                Some(*v)
            },
            VecHost::new(),
        );
        assert_eq!(view.len(), 3);
        assert_eq!(view.hole_count(), 1);
        view.with_host(|h| assert_eq!(h.items(), &[1, 3]));
    }

    #[test]
    fn dropping_the_view_unsubscribes() {
        let (source, view) = doubled(vec![1]);
        assert_eq!(source.subscriber_count(), 1);
        drop(view);
        assert_eq!(source.subscriber_count(), 0);
        source.push(2);
    }

    #[test]
    fn into_host_detaches() {
        let (source, view) = doubled(vec![1, 2]);
        let host = view.into_host();
        source.push(3);
        assert_eq!(host.borrow().items(), &[2, 4]);
    }
}
