#![forbid(unsafe_code)]

//! Structural subscriptions to [`HookArray`], [`HookMap`] and [`HookSet`].
//!
//! A [`CollectionBinding`] delivers three kinds of event to a handler table:
//! `add` (a new element/entry appeared), `set` (an element/entry was replaced
//! in place) and `delete` (an element/entry disappeared). Handler tables are
//! built per store kind: [`ArrayHandlers`], [`MapHandlers`], [`SetHandlers`].
//!
//! # Options
//!
//! - [`BindOptions::no_set`]: the consumer has no dedicated replace logic;
//!   every `set` is delivered as `delete` followed by `add`. Supplying a `set`
//!   handler as well is a usage error.
//! - [`BindOptions::add_existing`]: replay every entry already present as an
//!   `add`, in order, before `bind` returns.
//!
//! # Keyed cleanups
//!
//! Map and set `add`/`set` handlers may return a [`Cleanup`]. The binding
//! keeps it under that key and runs it right before the key is next replaced
//! or deleted. Array positions shift, so array handlers have no cleanups.
//!
//! # Failure Modes
//!
//! - Handler panics: caught and logged; the store mutation stands.
//! - Replay panics: logged at `warn`; remaining replay entries are skipped.
//! - Handler dropped (binding owner-bound, owner gone): events are ignored.
//!
//! [`HookArray`]: crate::HookArray
//! [`HookMap`]: crate::HookMap
//! [`HookSet`]: crate::HookSet

use std::any::Any;
use std::cell::RefCell;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::boundary::{guard, guard_replay};
use crate::dispose::{BindingId, Disposable, Hook, Lifecycle, Owner};
use crate::error::HookError;

/// Deferred teardown returned by a keyed `add`/`set` handler.
pub type Cleanup = Box<dyn FnOnce()>;

/// Options for [`Observe::bind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindOptions {
    /// Synthesize `set` as `delete` + `add`.
    pub no_set: bool,
    /// Replay existing entries as `add` at bind time.
    pub add_existing: bool,
}

impl BindOptions {
    /// Default options: no replay, `set` delivered as-is.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn no_set(mut self, enabled: bool) -> Self {
        self.no_set = enabled;
        self
    }

    #[must_use]
    pub fn add_existing(mut self, enabled: bool) -> Self {
        self.add_existing = enabled;
        self
    }
}

/// Stores that accept collection bindings.
pub trait Observe {
    /// Handler table type for this store.
    type Handlers: 'static;

    /// Subscribe `handlers` with `options`.
    ///
    /// # Errors
    ///
    /// [`HookError::SetHandlerWithNoSet`] when `options.no_set` is combined
    /// with a custom `set` handler.
    fn bind(
        &self,
        handlers: Self::Handlers,
        options: BindOptions,
    ) -> Result<CollectionBinding<Self::Handlers>, HookError>;
}

/// Free-function form of [`Observe::bind`].
///
/// # Errors
///
/// See [`Observe::bind`].
pub fn bind_collection<S: Observe>(
    store: &S,
    handlers: S::Handlers,
    options: BindOptions,
) -> Result<CollectionBinding<S::Handlers>, HookError> {
    store.bind(handlers, options)
}

// ---------------------------------------------------------------------------
// Handler tables
// ---------------------------------------------------------------------------

type IndexFn<T> = Box<dyn FnMut(usize, &T)>;

/// Handlers for [`HookArray`](crate::HookArray) events.
///
/// Omitted handlers are no-ops.
pub struct ArrayHandlers<T> {
    add: IndexFn<T>,
    set: Option<IndexFn<T>>,
    delete: Box<dyn FnMut(usize)>,
    remount_on_set: bool,
}

impl<T> ArrayHandlers<T> {
    /// Handler table with every event ignored.
    #[must_use]
    pub fn new() -> Self {
        Self {
            add: Box::new(|_, _| {}),
            set: None,
            delete: Box::new(|_| {}),
            remount_on_set: false,
        }
    }

    /// Called with the index and value of each added element.
    #[must_use]
    pub fn on_add(mut self, f: impl FnMut(usize, &T) + 'static) -> Self {
        self.add = Box::new(f);
        self
    }

    /// Called with the index and new value of each replaced element.
    #[must_use]
    pub fn on_set(mut self, f: impl FnMut(usize, &T) + 'static) -> Self {
        self.set = Some(Box::new(f));
        self
    }

    /// Called with the index of each removed element.
    #[must_use]
    pub fn on_delete(mut self, f: impl FnMut(usize) + 'static) -> Self {
        self.delete = Box::new(f);
        self
    }

    pub(crate) fn has_set(&self) -> bool {
        self.set.is_some()
    }

    pub(crate) fn remount_on_set(&mut self) {
        self.remount_on_set = true;
    }

    pub(crate) fn replay_add(&mut self, index: usize, value: &T) {
        (self.add)(index, value);
    }

    pub(crate) fn add(&mut self, id: BindingId, index: usize, value: &T) {
        guard("array.add", Some(id), || (self.add)(index, value));
    }

    pub(crate) fn set(&mut self, id: BindingId, index: usize, value: &T) {
        match self.set.as_mut() {
            Some(set) => {
                guard("array.set", Some(id), || set(index, value));
            }
            None if self.remount_on_set => {
                self.delete(id, index);
                self.add(id, index, value);
            }
            None => {}
        }
    }

    pub(crate) fn delete(&mut self, id: BindingId, index: usize) {
        guard("array.delete", Some(id), || (self.delete)(index));
    }
}

impl<T> Default for ArrayHandlers<T> {
    fn default() -> Self {
        Self::new()
    }
}

type KeyedFn<K, V> = Box<dyn FnMut(&K, &V) -> Option<Cleanup>>;

/// Handlers for [`HookMap`](crate::HookMap) events.
pub struct MapHandlers<K, V> {
    add: KeyedFn<K, V>,
    set: Option<KeyedFn<K, V>>,
    delete: Box<dyn FnMut(&K)>,
    cleanups: AHashMap<K, Cleanup>,
    remount_on_set: bool,
}

impl<K: Eq + Hash + Clone, V> MapHandlers<K, V> {
    /// Handler table with every event ignored.
    #[must_use]
    pub fn new() -> Self {
        Self {
            add: Box::new(|_, _| None),
            set: None,
            delete: Box::new(|_| {}),
            cleanups: AHashMap::new(),
            remount_on_set: false,
        }
    }

    /// Called for each newly inserted key.
    #[must_use]
    pub fn on_add(mut self, mut f: impl FnMut(&K, &V) + 'static) -> Self {
        self.add = Box::new(move |k, v| {
            f(k, v);
            None
        });
        self
    }

    /// Like [`on_add`](Self::on_add); the returned cleanup runs when the key
    /// is next replaced or removed.
    #[must_use]
    pub fn on_add_scoped<C>(mut self, mut f: impl FnMut(&K, &V) -> C + 'static) -> Self
    where
        C: FnOnce() + 'static,
    {
        self.add = Box::new(move |k, v| Some(Box::new(f(k, v)) as Cleanup));
        self
    }

    /// Called when an existing key receives a new value.
    #[must_use]
    pub fn on_set(mut self, mut f: impl FnMut(&K, &V) + 'static) -> Self {
        self.set = Some(Box::new(move |k, v| {
            f(k, v);
            None
        }));
        self
    }

    /// Like [`on_set`](Self::on_set), returning a cleanup for the new value.
    #[must_use]
    pub fn on_set_scoped<C>(mut self, mut f: impl FnMut(&K, &V) -> C + 'static) -> Self
    where
        C: FnOnce() + 'static,
    {
        self.set = Some(Box::new(move |k, v| Some(Box::new(f(k, v)) as Cleanup)));
        self
    }

    /// Called for each removed key.
    #[must_use]
    pub fn on_delete(mut self, f: impl FnMut(&K) + 'static) -> Self {
        self.delete = Box::new(f);
        self
    }

    pub(crate) fn has_set(&self) -> bool {
        self.set.is_some()
    }

    pub(crate) fn remount_on_set(&mut self) {
        self.remount_on_set = true;
    }

    pub(crate) fn replay_add(&mut self, key: &K, value: &V) {
        if let Some(cleanup) = (self.add)(key, value) {
            self.cleanups.insert(key.clone(), cleanup);
        }
    }

    pub(crate) fn add(&mut self, id: BindingId, key: &K, value: &V) {
        if let Some(Some(cleanup)) = guard("map.add", Some(id), || (self.add)(key, value)) {
            self.cleanups.insert(key.clone(), cleanup);
        }
    }

    pub(crate) fn set(&mut self, id: BindingId, key: &K, value: &V) {
        self.run_cleanup(id, key);
        match self.set.as_mut() {
            Some(set) => {
                if let Some(Some(cleanup)) = guard("map.set", Some(id), || set(key, value)) {
                    self.cleanups.insert(key.clone(), cleanup);
                }
            }
            None if self.remount_on_set => {
                guard("map.delete", Some(id), || (self.delete)(key));
                self.add(id, key, value);
            }
            None => {}
        }
    }

    pub(crate) fn delete(&mut self, id: BindingId, key: &K) {
        self.run_cleanup(id, key);
        guard("map.delete", Some(id), || (self.delete)(key));
    }

    fn run_cleanup(&mut self, id: BindingId, key: &K) {
        if let Some(cleanup) = self.cleanups.remove(key) {
            guard("map.cleanup", Some(id), cleanup);
        }
    }
}

impl<K: Eq + Hash + Clone, V> Default for MapHandlers<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handlers for [`HookSet`](crate::HookSet) events. Sets have no replace
/// event, so there is no `set` handler.
pub struct SetHandlers<T> {
    add: Box<dyn FnMut(&T) -> Option<Cleanup>>,
    delete: Box<dyn FnMut(&T)>,
    cleanups: AHashMap<T, Cleanup>,
}

impl<T: Eq + Hash + Clone> SetHandlers<T> {
    /// Handler table with every event ignored.
    #[must_use]
    pub fn new() -> Self {
        Self {
            add: Box::new(|_| None),
            delete: Box::new(|_| {}),
            cleanups: AHashMap::new(),
        }
    }

    /// Called for each newly inserted value.
    #[must_use]
    pub fn on_add(mut self, mut f: impl FnMut(&T) + 'static) -> Self {
        self.add = Box::new(move |v| {
            f(v);
            None
        });
        self
    }

    /// Like [`on_add`](Self::on_add); the returned cleanup runs when the
    /// value is removed.
    #[must_use]
    pub fn on_add_scoped<C>(mut self, mut f: impl FnMut(&T) -> C + 'static) -> Self
    where
        C: FnOnce() + 'static,
    {
        self.add = Box::new(move |v| Some(Box::new(f(v)) as Cleanup));
        self
    }

    /// Called for each removed value.
    #[must_use]
    pub fn on_delete(mut self, f: impl FnMut(&T) + 'static) -> Self {
        self.delete = Box::new(f);
        self
    }

    pub(crate) fn replay_add(&mut self, value: &T) {
        if let Some(cleanup) = (self.add)(value) {
            self.cleanups.insert(value.clone(), cleanup);
        }
    }

    pub(crate) fn add(&mut self, id: BindingId, value: &T) {
        if let Some(Some(cleanup)) = guard("set.add", Some(id), || (self.add)(value)) {
            self.cleanups.insert(value.clone(), cleanup);
        }
    }

    pub(crate) fn delete(&mut self, id: BindingId, value: &T) {
        if let Some(cleanup) = self.cleanups.remove(value) {
            guard("set.cleanup", Some(id), cleanup);
        }
        guard("set.delete", Some(id), || (self.delete)(value));
    }
}

impl<T: Eq + Hash + Clone> Default for SetHandlers<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Subscriber list
// ---------------------------------------------------------------------------

/// Ordered subscribers of one collection store.
pub(crate) struct SubscriberList<H: 'static> {
    store: &'static str,
    entries: RefCell<Vec<Rc<CollectionInner<H>>>>,
}

impl<H: 'static> SubscriberList<H> {
    pub(crate) fn new(store: &'static str) -> Rc<Self> {
        Rc::new(Self {
            store,
            entries: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Deliver one event to every live subscriber, in registration order.
    ///
    /// The list is snapshotted first; subscribers destroyed by an earlier
    /// handler in the same round are skipped.
    pub(crate) fn emit(&self, event: &'static str, mut deliver: impl FnMut(BindingId, &mut H)) {
        let snapshot: Vec<Rc<CollectionInner<H>>> = self.entries.borrow().iter().cloned().collect();
        if snapshot.is_empty() {
            return;
        }
        tracing::trace!(store = self.store, event, subscribers = snapshot.len(), "emit");
        for sub in snapshot {
            sub.dispatch(&mut deliver);
        }
    }

    /// Create a binding around `handlers`, optionally replaying existing
    /// entries through `replay` before registering it.
    pub(crate) fn subscribe(
        self: &Rc<Self>,
        handlers: H,
        replay: Option<&dyn Fn(&mut H)>,
    ) -> CollectionBinding<H> {
        let handler = Rc::new(RefCell::new(handlers));
        let inner = Rc::new(CollectionInner {
            life: Lifecycle::new(self.store),
            handler: Rc::downgrade(&handler),
            pinned: RefCell::new(Some(Rc::clone(&handler))),
            list: Rc::downgrade(self),
        });
        if let Some(replay) = replay {
            let id = inner.life.id();
            guard_replay(id, || replay(&mut *handler.borrow_mut()));
        }
        self.entries.borrow_mut().push(Rc::clone(&inner));
        CollectionBinding { inner }
    }

    fn remove(&self, id: BindingId) {
        let removed: Vec<Rc<CollectionInner<H>>> = {
            let mut entries = self.entries.borrow_mut();
            let (gone, kept): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|e| e.life.id() == id);
            *entries = kept;
            gone
        };
        drop(removed);
    }
}

// ---------------------------------------------------------------------------
// CollectionBinding
// ---------------------------------------------------------------------------

struct CollectionInner<H: 'static> {
    life: Lifecycle,
    handler: Weak<RefCell<H>>,
    /// Strong handler reference held until the first `bind_to_owner`.
    pinned: RefCell<Option<Rc<RefCell<H>>>>,
    list: Weak<SubscriberList<H>>,
}

impl<H: 'static> CollectionInner<H> {
    fn dispatch(&self, deliver: &mut impl FnMut(BindingId, &mut H)) {
        if self.life.is_destroyed() {
            return;
        }
        let Some(handler) = self.handler.upgrade() else {
            return;
        };
        let id = self.life.id();
        match handler.try_borrow_mut() {
            Ok(mut h) => deliver(id, &mut *h),
            Err(_) => {
                tracing::error!(binding = id.get(), "re-entrant collection event dropped");
            }
        };
    }

    fn destroy(&self, reason: &'static str) {
        if self.life.mark_destroyed(reason) {
            self.pinned.borrow_mut().take();
            if let Some(list) = self.list.upgrade() {
                list.remove(self.life.id());
            }
        }
    }
}

impl<H: 'static> Disposable for CollectionInner<H> {
    fn release_claim(&self, owner: &Owner) {
        if self.life.release(owner) {
            self.destroy("owners_released");
        }
    }
}

/// A live subscription to a collection store.
///
/// Cloning yields another handle to the same subscription.
pub struct CollectionBinding<H: 'static> {
    inner: Rc<CollectionInner<H>>,
}

impl<H: 'static> CollectionBinding<H> {
    /// Whether the handler table is still reachable (pinned by this binding
    /// or by an owner claim).
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.handler.strong_count() > 0
    }
}

impl<H: 'static> Clone for CollectionBinding<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: 'static> Hook for CollectionBinding<H> {
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

impl<H: 'static> std::fmt::Debug for CollectionBinding<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionBinding")
            .field("id", &self.inner.life.id())
            .field("destroyed", &self.inner.life.is_destroyed())
            .field("owners", &self.inner.life.claims())
            .finish()
    }
}
