#![forbid(unsafe_code)]

//! Observable record store with per-key subscribers.
//!
//! [`HookObject`] wraps any [`Record`] (a key/value container) and keeps, for
//! every key, the ordered list of value bindings derived from it. Reads pass
//! straight through. A write that the record accepts notifies every binding on
//! that key; removing a key destroys them.
//!
//! # Invariants
//!
//! 1. A key present in the subscriber table has at least one subscriber.
//! 2. A rejected write ([`Record::set`] returned `false`) notifies nobody.
//! 3. No record or table borrow is held while subscriber code runs.
//!
//! # Failure Modes
//!
//! - A subscriber that panics is logged (see [`crate::boundary`]); the write
//!   stands and later subscribers still run.
//! - Removing a key nobody subscribed to is silent.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::derive::{Assign, Derivation};
use crate::dispose::{BindingId, Owner};
use crate::error::HookError;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A key/value container a [`HookObject`] can wrap.
pub trait Record: 'static {
    type Key: Eq + Hash + Clone + 'static;
    type Value: 'static;

    fn get(&self, key: &Self::Key) -> Option<&Self::Value>;

    /// Assign `value` to `key`. Returns whether the assignment took effect.
    fn set(&mut self, key: Self::Key, value: Self::Value) -> bool;

    /// Delete `key`. Returns whether the deletion was permitted; deleting an
    /// absent key is permitted.
    fn remove(&mut self, key: &Self::Key) -> bool;
}

impl<K, V, S> Record for HashMap<K, V, S>
where
    K: Eq + Hash + Clone + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    type Key = K;
    type Value = V;

    fn get(&self, key: &K) -> Option<&V> {
        HashMap::get(self, key)
    }

    fn set(&mut self, key: K, value: V) -> bool {
        self.insert(key, value);
        true
    }

    fn remove(&mut self, key: &K) -> bool {
        HashMap::remove(self, key);
        true
    }
}

impl<K, V> Record for BTreeMap<K, V>
where
    K: Ord + Hash + Clone + 'static,
    V: 'static,
{
    type Key = K;
    type Value = V;

    fn get(&self, key: &K) -> Option<&V> {
        BTreeMap::get(self, key)
    }

    fn set(&mut self, key: K, value: V) -> bool {
        self.insert(key, value);
        true
    }

    fn remove(&mut self, key: &K) -> bool {
        BTreeMap::remove(self, key);
        true
    }
}

impl<K, V, S> Record for IndexMap<K, V, S>
where
    K: Eq + Hash + Clone + 'static,
    V: 'static,
    S: BuildHasher + 'static,
{
    type Key = K;
    type Value = V;

    fn get(&self, key: &K) -> Option<&V> {
        IndexMap::get(self, key)
    }

    fn set(&mut self, key: K, value: V) -> bool {
        self.insert(key, value);
        true
    }

    fn remove(&mut self, key: &K) -> bool {
        self.shift_remove(key);
        true
    }
}

/// Read-only view of a record: every write and delete is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frozen<R>(R);

impl<R> Frozen<R> {
    #[must_use]
    pub fn new(record: R) -> Self {
        Self(record)
    }

    #[must_use]
    pub fn as_inner(&self) -> &R {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: Record> Record for Frozen<R> {
    type Key = R::Key;
    type Value = R::Value;

    fn get(&self, key: &Self::Key) -> Option<&Self::Value> {
        self.0.get(key)
    }

    fn set(&mut self, _key: Self::Key, _value: Self::Value) -> bool {
        false
    }

    fn remove(&mut self, _key: &Self::Key) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Per-key subscriber table
// ---------------------------------------------------------------------------

/// A value binding as seen by the store that feeds it.
pub(crate) trait ValueHook {
    fn id(&self) -> BindingId;
    /// Recompute and deliver.
    fn notify(&self);
    /// Destroy the binding (the store has already dropped it for this key).
    fn force_destroy(&self, reason: &'static str);
}

pub(crate) struct KeyHooks<K> {
    by_key: AHashMap<K, Vec<Rc<dyn ValueHook>>>,
}

impl<K: Eq + Hash + Clone> KeyHooks<K> {
    fn new() -> Self {
        Self {
            by_key: AHashMap::new(),
        }
    }

    /// Subscribe `hook` to each distinct key in `keys`.
    pub(crate) fn add(&mut self, keys: &[K], hook: &Rc<dyn ValueHook>) {
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                continue;
            }
            self.by_key
                .entry(key.clone())
                .or_default()
                .push(Rc::clone(hook));
        }
    }

    /// Unsubscribe `id` from `keys`, dropping emptied entries. Returns the
    /// removed handles so the caller drops them outside the borrow.
    pub(crate) fn remove(&mut self, keys: &[K], id: BindingId) -> Vec<Rc<dyn ValueHook>> {
        let mut removed = Vec::new();
        for key in keys {
            let Some(list) = self.by_key.get_mut(key) else {
                continue;
            };
            list.retain(|h| {
                if h.id() == id {
                    removed.push(Rc::clone(h));
                    false
                } else {
                    true
                }
            });
            if list.is_empty() {
                self.by_key.remove(key);
            }
        }
        removed
    }

    fn snapshot(&self, key: &K) -> Vec<Rc<dyn ValueHook>> {
        self.by_key.get(key).cloned().unwrap_or_default()
    }

    fn take(&mut self, key: &K) -> Vec<Rc<dyn ValueHook>> {
        self.by_key.remove(key).unwrap_or_default()
    }

    fn count(&self, key: &K) -> usize {
        self.by_key.get(key).map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// HookObject
// ---------------------------------------------------------------------------

pub(crate) struct ObjectInner<R: Record> {
    pub(crate) record: RefCell<R>,
    pub(crate) hooks: RefCell<KeyHooks<R::Key>>,
    owner: Owner,
}

impl<R: Record> ObjectInner<R> {
    fn set(&self, key: R::Key, value: R::Value) -> bool {
        let applied = self.record.borrow_mut().set(key.clone(), value);
        if !applied {
            return false;
        }
        let hooks = self.hooks.borrow().snapshot(&key);
        if !hooks.is_empty() {
            tracing::trace!(store = "object", event = "set", subscribers = hooks.len(), "emit");
        }
        for hook in hooks {
            hook.notify();
        }
        true
    }

    fn remove(&self, key: &R::Key) -> bool {
        if !self.record.borrow_mut().remove(key) {
            return false;
        }
        let hooks = self.hooks.borrow_mut().take(key);
        for hook in hooks {
            hook.force_destroy("key_removed");
        }
        true
    }
}

impl<R: Record> Assign<R::Key, R::Value> for ObjectInner<R> {
    fn assign(&self, key: &R::Key, value: R::Value) {
        self.set(key.clone(), value);
    }
}

/// Observable wrapper around a [`Record`].
///
/// Cloning yields another handle to the same store. A `HookObject` is not a
/// `Record` itself, so it cannot be wrapped twice.
///
/// # Example
///
/// ```ignore
/// let user = wrap_object(HashMap::from([("name", "ada".to_string())]));
/// let greeting = user
///     .derive_map("name", |name| format!("hello {}", name.map_or("", String::as_str)))
///     .to_callback(|text| println!("{text}"));
/// user.set("name", "grace".to_string()); // prints "hello grace"
/// ```
pub struct HookObject<R: Record> {
    inner: Rc<ObjectInner<R>>,
}

/// Wrap `record` in a [`HookObject`].
pub fn wrap_object<R: Record>(record: R) -> HookObject<R> {
    HookObject::new(record)
}

impl<R: Record> HookObject<R> {
    pub fn new(record: R) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                record: RefCell::new(record),
                hooks: RefCell::new(KeyHooks::new()),
                owner: Owner::new(),
            }),
        }
    }

    /// Current value of `key`.
    #[must_use]
    pub fn get(&self, key: &R::Key) -> Option<R::Value>
    where
        R::Value: Clone,
    {
        self.inner.record.borrow().get(key).cloned()
    }

    /// Run `f` against the wrapped record. Never notifies.
    pub fn with<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&*self.inner.record.borrow())
    }

    /// Write `value` to `key` and notify that key's subscribers if the
    /// record accepted it.
    pub fn set(&self, key: R::Key, value: R::Value) -> bool {
        self.inner.set(key, value)
    }

    /// Delete `key`. If the record permits it, every binding subscribed to
    /// `key` is destroyed.
    pub fn remove(&self, key: &R::Key) -> bool {
        self.inner.remove(key)
    }

    /// Derivation yielding a clone of the current value of `key`.
    pub fn derive(&self, key: R::Key) -> Derivation<R, Option<R::Value>>
    where
        R::Value: Clone,
    {
        let read = key.clone();
        Derivation::new(
            Rc::clone(&self.inner),
            Rc::from([key]),
            Rc::new(move |record: &R| record.get(&read).cloned()),
        )
    }

    /// Derivation mapping the current value of `key` through `f`.
    pub fn derive_map<T, F>(&self, key: R::Key, f: F) -> Derivation<R, T>
    where
        T: 'static,
        F: Fn(Option<&R::Value>) -> T + 'static,
    {
        let read = key.clone();
        Derivation::new(
            Rc::clone(&self.inner),
            Rc::from([key]),
            Rc::new(move |record: &R| f(record.get(&read))),
        )
    }

    /// Derivation combining several keys. `f` receives the values in the
    /// order the keys were given.
    ///
    /// # Errors
    ///
    /// [`HookError::EmptyKeys`] when `keys` yields nothing.
    pub fn derive_with<T, F>(
        &self,
        keys: impl IntoIterator<Item = R::Key>,
        f: F,
    ) -> Result<Derivation<R, T>, HookError>
    where
        T: 'static,
        F: Fn(&[Option<&R::Value>]) -> T + 'static,
    {
        let keys: Rc<[R::Key]> = keys.into_iter().collect();
        if keys.is_empty() {
            return Err(HookError::EmptyKeys);
        }
        let read = Rc::clone(&keys);
        Ok(Derivation::new(
            Rc::clone(&self.inner),
            keys,
            Rc::new(move |record: &R| {
                let values: Vec<Option<&R::Value>> = read.iter().map(|k| record.get(k)).collect();
                f(&values)
            }),
        ))
    }

    /// Number of bindings subscribed to `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &R::Key) -> usize {
        self.inner.hooks.borrow().count(key)
    }

    /// Keys with at least one subscriber, in no particular order.
    #[must_use]
    pub fn watched_keys(&self) -> Vec<R::Key> {
        self.inner.hooks.borrow().by_key.keys().cloned().collect()
    }

    /// Owner for bindings whose lifetime should follow this store, such as
    /// mirrors writing into it.
    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.inner.owner
    }

    pub(crate) fn inner(&self) -> &Rc<ObjectInner<R>> {
        &self.inner
    }
}

impl<R: Record> Clone for HookObject<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R: Record + std::fmt::Debug> std::fmt::Debug for HookObject<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookObject")
            .field("record", &*self.inner.record.borrow())
            .field("watched_keys", &self.inner.hooks.borrow().by_key.len())
            .finish()
    }
}
