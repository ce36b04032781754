#![forbid(unsafe_code)]

//! Derived values and their two consumers.
//!
//! A [`Derivation`] describes a value computed from one or more keys of a
//! [`HookObject`](crate::HookObject). It is not itself subscribed to
//! anything; subscriptions are created by consuming it:
//!
//! - [`Derivation::to_mirror`] copies the value into a key of another record
//!   on every change and lives exactly as long as that record.
//! - [`Derivation::to_callback`] calls a function with the value on every
//!   change and lives until destroyed or released by its owners.
//!
//! Neither consumer fires on creation; call `emit()` to push the current
//! value once.
//!
//! # Invariants
//!
//! 1. [`Derivation::get_value`] recomputes on every call; nothing is cached.
//! 2. A binding keeps its source alive only through the source's own
//!    subscriber table: dropping every store handle drops the bindings.
//! 3. A destroyed binding no longer reacts to writes, but `emit()` still
//!    fires it while its source (and, for mirrors, its target) exists.
//!    `emit()` with the source or target gone does nothing.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::boundary::guard;
use crate::dispose::{BindingId, Disposable, Hook, Lifecycle, Owner};
use crate::object::{HookObject, ObjectInner, Record, ValueHook};

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// A value computed on demand from keys of a record store.
pub struct Derivation<R: Record, T> {
    source: Rc<ObjectInner<R>>,
    keys: Rc<[R::Key]>,
    compute: Rc<dyn Fn(&R) -> T>,
}

impl<R: Record, T: 'static> Derivation<R, T> {
    pub(crate) fn new(
        source: Rc<ObjectInner<R>>,
        keys: Rc<[R::Key]>,
        compute: Rc<dyn Fn(&R) -> T>,
    ) -> Self {
        Self {
            source,
            keys,
            compute,
        }
    }

    /// Keys this derivation reads, in argument order.
    #[must_use]
    pub fn keys(&self) -> &[R::Key] {
        &self.keys
    }

    /// Compute the value from the record's current state.
    pub fn get_value(&self) -> T {
        (self.compute)(&*self.source.record.borrow())
    }

    /// Mirror the value into `key` of `target` on every change.
    ///
    /// The binding is claimed by the target's [`Owner`] before it is
    /// returned, so it is destroyed together with the target.
    pub fn to_mirror<M>(&self, target: &M, key: M::Key) -> MirrorBinding
    where
        M: MirrorTarget<T>,
    {
        let read = self.reader();
        let sink = target.sink();
        let write = move || {
            let Some(target) = sink.upgrade() else {
                return;
            };
            if let Some(value) = read() {
                target.assign(&key, value);
            }
        };
        let inner = Rc::new(MirrorInner {
            life: Lifecycle::new("mirror"),
            write: Box::new(write),
            detach: self.detacher(),
        });
        self.subscribe(Rc::clone(&inner) as Rc<dyn ValueHook>);
        MirrorBinding { inner }.bind_to_owner(target.owner())
    }

    /// Call `f` with the value on every change.
    ///
    /// The binding keeps `f` alive by itself until it is first bound to an
    /// owner; from then on the owners keep it alive.
    pub fn to_callback(&self, f: impl Fn(T) + 'static) -> CallbackBinding<T> {
        let handler: Rc<dyn Fn(T)> = Rc::new(f);
        let inner = Rc::new(CallbackInner {
            life: Lifecycle::new("callback"),
            read: Box::new(self.reader()),
            handler: Rc::downgrade(&handler),
            pinned: RefCell::new(Some(handler)),
            detach: self.detacher(),
        });
        self.subscribe(Rc::clone(&inner) as Rc<dyn ValueHook>);
        CallbackBinding { inner }
    }

    fn subscribe(&self, hook: Rc<dyn ValueHook>) {
        self.source.hooks.borrow_mut().add(&self.keys, &hook);
    }

    /// Weak evaluator: `None` once the source is gone or busy.
    fn reader(&self) -> impl Fn() -> Option<T> + 'static {
        let source = Rc::downgrade(&self.source);
        let compute = Rc::clone(&self.compute);
        move || {
            let source = source.upgrade()?;
            let record = source.record.try_borrow().ok()?;
            Some(compute(&*record))
        }
    }

    fn detacher(&self) -> Box<dyn Fn(BindingId)> {
        let source = Rc::downgrade(&self.source);
        let keys = Rc::clone(&self.keys);
        Box::new(move |id| {
            if let Some(source) = source.upgrade() {
                let removed = source.hooks.borrow_mut().remove(&keys, id);
                drop(removed);
            }
        })
    }
}

impl<R: Record, T> Clone for Derivation<R, T> {
    fn clone(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
            keys: Rc::clone(&self.keys),
            compute: Rc::clone(&self.compute),
        }
    }
}

impl<R: Record, T> std::fmt::Debug for Derivation<R, T>
where
    R::Key: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derivation")
            .field("keys", &&*self.keys)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Mirror targets
// ---------------------------------------------------------------------------

/// Something a mirror binding can write into.
pub trait Assign<K, T> {
    fn assign(&self, key: &K, value: T);
}

/// A record that mirror bindings can target.
///
/// The target is held weakly; its [`Owner`] claims every mirror writing
/// into it.
pub trait MirrorTarget<T> {
    type Key: 'static;

    fn sink(&self) -> Weak<dyn Assign<Self::Key, T>>;

    fn owner(&self) -> &Owner;
}

impl<R: Record> MirrorTarget<R::Value> for HookObject<R> {
    type Key = R::Key;

    fn sink(&self) -> Weak<dyn Assign<R::Key, R::Value>> {
        let strong: Rc<dyn Assign<R::Key, R::Value>> = Rc::clone(self.inner()) as _;
        Rc::downgrade(&strong)
    }

    fn owner(&self) -> &Owner {
        HookObject::owner(self)
    }
}

struct OwnedInner<R> {
    record: RefCell<R>,
    owner: Owner,
}

impl<R: Record> Assign<R::Key, R::Value> for OwnedInner<R> {
    fn assign(&self, key: &R::Key, value: R::Value) {
        self.record.borrow_mut().set(key.clone(), value);
    }
}

/// A plain (unobserved) record that owns the mirrors writing into it.
///
/// Dropping the last handle destroys every mirror bound to it.
pub struct OwnedRecord<R> {
    inner: Rc<OwnedInner<R>>,
}

impl<R: Record> OwnedRecord<R> {
    pub fn new(record: R) -> Self {
        Self {
            inner: Rc::new(OwnedInner {
                record: RefCell::new(record),
                owner: Owner::new(),
            }),
        }
    }

    #[must_use]
    pub fn get(&self, key: &R::Key) -> Option<R::Value>
    where
        R::Value: Clone,
    {
        self.inner.record.borrow().get(key).cloned()
    }

    pub fn with<U>(&self, f: impl FnOnce(&R) -> U) -> U {
        f(&*self.inner.record.borrow())
    }

    /// Write directly, bypassing any mirror.
    pub fn set(&self, key: R::Key, value: R::Value) -> bool {
        self.inner.record.borrow_mut().set(key, value)
    }

    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.inner.owner
    }
}

impl<R> Clone for OwnedRecord<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R: Record> MirrorTarget<R::Value> for OwnedRecord<R> {
    type Key = R::Key;

    fn sink(&self) -> Weak<dyn Assign<R::Key, R::Value>> {
        let strong: Rc<dyn Assign<R::Key, R::Value>> = Rc::clone(&self.inner) as _;
        Rc::downgrade(&strong)
    }

    fn owner(&self) -> &Owner {
        &self.inner.owner
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for OwnedRecord<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedRecord")
            .field("record", &*self.inner.record.borrow())
            .field("owner", &self.inner.owner)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MirrorBinding
// ---------------------------------------------------------------------------

struct MirrorInner {
    life: Lifecycle,
    write: Box<dyn Fn()>,
    detach: Box<dyn Fn(BindingId)>,
}

impl MirrorInner {
    fn fire(&self) {
        guard("mirror.emit", Some(self.life.id()), || (self.write)());
    }

    fn destroy(&self, reason: &'static str) {
        if self.life.mark_destroyed(reason) {
            (self.detach)(self.life.id());
        }
    }
}

impl ValueHook for MirrorInner {
    fn id(&self) -> BindingId {
        self.life.id()
    }

    fn notify(&self) {
        if self.life.is_destroyed() {
            return;
        }
        self.fire();
    }

    fn force_destroy(&self, reason: &'static str) {
        self.destroy(reason);
    }
}

impl Disposable for MirrorInner {
    fn release_claim(&self, owner: &Owner) {
        if self.life.release(owner) {
            self.destroy("owners_released");
        }
    }
}

/// A binding that copies a derived value into a target record key.
pub struct MirrorBinding {
    inner: Rc<MirrorInner>,
}

impl MirrorBinding {
    /// Write the current value into the target now. Works after
    /// [`destroy`](Hook::destroy) too, as long as source and target exist.
    pub fn emit(&self) {
        self.inner.fire();
    }
}

impl Clone for MirrorBinding {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Hook for MirrorBinding {
    fn id(&self) -> BindingId {
        self.inner.life.id()
    }

    fn destroy(&self) {
        self.inner.destroy("explicit");
    }

    fn is_destroyed(&self) -> bool {
        self.inner.life.is_destroyed()
    }

    fn owner_count(&self) -> usize {
        self.inner.life.claims()
    }

    fn bind_to_owner(self, owner: &Owner) -> Self {
        let target: Weak<dyn Disposable> = Rc::downgrade(&self.inner) as Weak<dyn Disposable>;
        self.inner.life.attach(owner, target, None);
        self
    }
}

impl std::fmt::Debug for MirrorBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorBinding")
            .field("id", &self.inner.life.id())
            .field("destroyed", &self.inner.life.is_destroyed())
            .field("owners", &self.inner.life.claims())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CallbackBinding
// ---------------------------------------------------------------------------

struct CallbackInner<T> {
    life: Lifecycle,
    read: Box<dyn Fn() -> Option<T>>,
    handler: Weak<dyn Fn(T)>,
    /// Strong handler reference held until the first `bind_to_owner`.
    pinned: RefCell<Option<Rc<dyn Fn(T)>>>,
    detach: Box<dyn Fn(BindingId)>,
}

impl<T> CallbackInner<T> {
    fn fire(&self) {
        let Some(handler) = self.handler.upgrade() else {
            return;
        };
        let id = self.life.id();
        let Some(Some(value)) = guard("callback.compute", Some(id), || (self.read)()) else {
            return;
        };
        guard("callback.emit", Some(id), || handler(value));
    }

    /// Unsubscribe and cancel claims. The handler is re-pinned first so the
    /// binding handle can still be fired manually.
    fn destroy(&self, reason: &'static str) {
        if self.life.is_destroyed() {
            return;
        }
        if let Some(handler) = self.handler.upgrade() {
            *self.pinned.borrow_mut() = Some(handler);
        }
        if self.life.mark_destroyed(reason) {
            (self.detach)(self.life.id());
        }
    }
}

impl<T> ValueHook for CallbackInner<T> {
    fn id(&self) -> BindingId {
        self.life.id()
    }

    fn notify(&self) {
        if self.life.is_destroyed() {
            return;
        }
        self.fire();
    }

    fn force_destroy(&self, reason: &'static str) {
        self.destroy(reason);
    }
}

impl<T> Disposable for CallbackInner<T> {
    fn release_claim(&self, owner: &Owner) {
        if self.life.release(owner) {
            self.destroy("owners_released");
        }
    }
}

/// A binding that calls a function with a derived value.
pub struct CallbackBinding<T: 'static> {
    inner: Rc<CallbackInner<T>>,
}

impl<T: 'static> CallbackBinding<T> {
    /// Call the handler with the current value now. Works after
    /// [`destroy`](Hook::destroy) too, as long as the source exists.
    pub fn emit(&self) {
        self.inner.fire();
    }

    /// Whether the handler is still reachable.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.handler.strong_count() > 0
    }
}

impl<T: 'static> Clone for CallbackBinding<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Hook for CallbackBinding<T> {
    fn id(&self) -> BindingId {
        self.inner.life.id()
    }

    fn destroy(&self) {
        self.inner.destroy("explicit");
    }

    fn is_destroyed(&self) -> bool {
        self.inner.life.is_destroyed()
    }

    fn owner_count(&self) -> usize {
        self.inner.life.claims()
    }

    fn bind_to_owner(self, owner: &Owner) -> Self {
        let keep_alive = self
            .inner
            .handler
            .upgrade()
            .map(|h| Box::new(h) as Box<dyn Any>);
        let target: Weak<dyn Disposable> = Rc::downgrade(&self.inner) as Weak<dyn Disposable>;
        self.inner.life.attach(owner, target, keep_alive);
        if !self.inner.life.is_destroyed() {
            self.inner.pinned.borrow_mut().take();
        }
        self
    }
}

impl<T: 'static> std::fmt::Debug for CallbackBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackBinding")
            .field("id", &self.inner.life.id())
            .field("destroyed", &self.inner.life.is_destroyed())
            .field("owners", &self.inner.life.claims())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::wrap_object;
    use std::cell::Cell;
    use std::collections::HashMap;

    type Map = HashMap<&'static str, i32>;

    fn store() -> HookObject<Map> {
        wrap_object(HashMap::from([("w", 2), ("h", 3)]))
    }

    #[test]
    fn get_value_recomputes() {
        let obj = store();
        let area = obj
            .derive_with(["w", "h"], |v| v[0].copied().unwrap_or(0) * v[1].copied().unwrap_or(0))
            .unwrap();
        assert_eq!(area.get_value(), 6);
        obj.set("w", 5);
        assert_eq!(area.get_value(), 15);
        assert_eq!(area.keys(), &["w", "h"]);
    }

    #[test]
    fn callback_receives_combined_value_in_key_order() {
        let obj = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _b = obj
            .derive_with(["h", "w"], |v| (v[0].copied(), v[1].copied()))
            .unwrap()
            .to_callback(move |pair| s.borrow_mut().push(pair));
        obj.set("w", 7);
        assert_eq!(*seen.borrow(), vec![(Some(3), Some(7))]);
    }

    #[test]
    fn callback_does_not_fire_on_creation_but_emit_pushes() {
        let obj = store();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let binding = obj.derive("w").to_callback(move |_| h.set(h.get() + 1));
        assert_eq!(hits.get(), 0);
        binding.emit();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn mirror_copies_into_owned_record() {
        let obj = store();
        let target = OwnedRecord::new(Map::new());
        let mirror = obj.derive_map("w", |v| v.copied().unwrap_or(0) * 10).to_mirror(&target, "w10");
        assert_eq!(mirror.owner_count(), 1);
        assert!(target.owner().holds(mirror.id()));

        obj.set("w", 4);
        assert_eq!(target.get(&"w10"), Some(40));
        mirror.emit();
        assert_eq!(target.get(&"w10"), Some(40));
    }

    #[test]
    fn mirror_dies_with_its_target() {
        let obj = store();
        let target = OwnedRecord::new(Map::new());
        let mirror = obj.derive_map("w", |v| v.copied().unwrap_or(0)).to_mirror(&target, "copy");
        assert_eq!(obj.subscriber_count(&"w"), 1);

        drop(target);
        assert!(mirror.is_destroyed());
        assert_eq!(obj.subscriber_count(&"w"), 0);
        mirror.emit();
    }

    #[test]
    fn mirror_into_hook_object_notifies_its_subscribers() {
        let source = store();
        let target: HookObject<Map> = wrap_object(Map::new());
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let _downstream = target.derive("copy").to_callback(move |v| s.set(v.unwrap_or(-1)));
        let _mirror = source
            .derive_map("h", |v| v.copied().unwrap_or(0))
            .to_mirror(&target, "copy");

        source.set("h", 9);
        assert_eq!(target.get(&"copy"), Some(9));
        assert_eq!(seen.get(), 9);
    }

    #[test]
    fn unbound_callback_keeps_its_handler() {
        let obj = store();
        let binding = obj.derive("w").to_callback(|_| {});
        assert!(binding.is_live());
        assert_eq!(binding.owner_count(), 0);
    }

    #[test]
    fn owner_release_keeps_handler_for_manual_emit() {
        let obj = store();
        let owner = Owner::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let binding = obj
            .derive("w")
            .to_callback(move |_| h.set(h.get() + 1))
            .bind_to_owner(&owner);
        owner.clear();
        assert!(binding.is_destroyed());
        assert_eq!(obj.subscriber_count(&"w"), 0);

        obj.set("w", 1);
        assert_eq!(hits.get(), 0);
        assert!(binding.is_live());
        binding.emit();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn destroyed_handler_is_freed_with_the_last_handle() {
        let obj = store();
        let token = Rc::new(());
        let t = Rc::clone(&token);
        let binding = obj.derive("w").to_callback(move |_| {
            let _keep = &t;
        });
        binding.destroy();
        assert_eq!(Rc::strong_count(&token), 2);
        drop(binding);
        assert_eq!(Rc::strong_count(&token), 1);
    }

    #[test]
    fn destroyed_callback_ignores_writes_but_fires_on_emit() {
        let obj = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let binding = obj.derive("w").to_callback(move |v| s.borrow_mut().push(v));
        binding.destroy();
        binding.destroy();
        obj.set("w", 7);
        assert!(seen.borrow().is_empty());

        binding.emit();
        assert_eq!(*seen.borrow(), vec![Some(7)]);
    }

    #[test]
    fn destroyed_mirror_ignores_writes_but_fires_on_emit() {
        let obj = store();
        let target = OwnedRecord::new(Map::new());
        let mirror = obj.derive_map("w", |v| v.copied().unwrap_or(0)).to_mirror(&target, "copy");
        mirror.destroy();
        assert!(target.owner().is_empty());

        obj.set("w", 42);
        assert_eq!(target.get(&"copy"), None);
        mirror.emit();
        assert_eq!(target.get(&"copy"), Some(42));
    }

    #[test]
    fn emit_after_source_is_gone_does_nothing() {
        let obj = store();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let binding = obj.derive("w").to_callback(move |_| h.set(h.get() + 1));
        binding.destroy();
        drop(obj);
        binding.emit();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn panicking_combinator_is_contained() {
        let obj = store();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _bad = obj.derive_map("w", |_| -> i32 { panic!("bad combinator") }).to_callback(|_| {});
        let _good = obj.derive("w").to_callback(move |_| h.set(h.get() + 1));
        assert!(obj.set("w", 1));
        assert_eq!(hits.get(), 1);
    }
}
