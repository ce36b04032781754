#![forbid(unsafe_code)]

//! Observable insertion-ordered map.
//!
//! `insert` on a new key emits `add`, on a present key `set`; `remove` emits
//! `delete` only when the key existed; `clear` emits one `delete` per key in
//! insertion order. Iteration order (and therefore replay order) is insertion
//! order.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::collection::{BindOptions, CollectionBinding, MapHandlers, Observe, SubscriberList};
use crate::error::HookError;

struct MapInner<K: 'static, V: 'static> {
    entries: RefCell<IndexMap<K, V>>,
    subs: Rc<SubscriberList<MapHandlers<K, V>>>,
}

/// Observable wrapper around an [`IndexMap`].
pub struct HookMap<K: 'static, V: 'static> {
    inner: Rc<MapInner<K, V>>,
}

/// Wrap `entries` in a [`HookMap`].
pub fn wrap_map<K, V>(entries: IndexMap<K, V>) -> HookMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    HookMap::new(entries)
}

impl<K, V> HookMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    pub fn new(entries: IndexMap<K, V>) -> Self {
        Self {
            inner: Rc::new(MapInner {
                entries: RefCell::new(entries),
                subs: SubscriberList::new("map"),
            }),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.entries.borrow().get(key).cloned()
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.entries.borrow().contains_key(key)
    }

    pub fn with<R>(&self, f: impl FnOnce(&IndexMap<K, V>) -> R) -> R {
        f(&*self.inner.entries.borrow())
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.len()
    }

    /// Insert or replace. Returns the previous value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let previous = self
            .inner
            .entries
            .borrow_mut()
            .insert(key.clone(), value.clone());
        let event = if previous.is_some() { "set" } else { "add" };
        self.inner.subs.emit(event, |id, h| {
            if previous.is_some() {
                h.set(id, &key, &value);
            } else {
                h.add(id, &key, &value);
            }
        });
        previous
    }

    /// Remove `key`, keeping the order of the remaining entries.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.inner.entries.borrow_mut().shift_remove(key)?;
        self.inner.subs.emit("delete", |id, h| h.delete(id, key));
        Some(removed)
    }

    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.inner.entries.borrow_mut());
        for key in old.keys() {
            self.inner.subs.emit("delete", |id, h| h.delete(id, key));
        }
    }

    /// Subscribe with `set` delivered as-is; `replay_existing` replays
    /// current entries as `add` before registering.
    pub(crate) fn subscribe(
        &self,
        handlers: MapHandlers<K, V>,
        replay_existing: bool,
    ) -> CollectionBinding<MapHandlers<K, V>> {
        if !replay_existing {
            return self.inner.subs.subscribe(handlers, None);
        }
        let snapshot = self.inner.entries.borrow().clone();
        let replay = move |h: &mut MapHandlers<K, V>| {
            for (key, value) in &snapshot {
                h.replay_add(key, value);
            }
        };
        self.inner
            .subs
            .subscribe(handlers, Some(&replay as &dyn Fn(&mut MapHandlers<K, V>)))
    }
}

impl<K, V> Observe for HookMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    type Handlers = MapHandlers<K, V>;

    fn bind(
        &self,
        mut handlers: MapHandlers<K, V>,
        options: BindOptions,
    ) -> Result<CollectionBinding<MapHandlers<K, V>>, HookError> {
        if options.no_set {
            if handlers.has_set() {
                return Err(HookError::SetHandlerWithNoSet { store: "map" });
            }
            handlers.remount_on_set();
        }
        Ok(self.subscribe(handlers, options.add_existing))
    }
}

impl<K: 'static, V: 'static> Clone for HookMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: std::fmt::Debug + 'static, V: std::fmt::Debug + 'static> std::fmt::Debug for HookMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookMap")
            .field("entries", &*self.inner.entries.borrow())
            .field("subscribers", &self.inner.subs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded() -> (HookMap<&'static str, u32>, Rc<RefCell<Vec<String>>>, CollectionBinding<MapHandlers<&'static str, u32>>) {
        let map = wrap_map(IndexMap::from([("a", 1)]));
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2, l3) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&log));
        let binding = map
            .bind(
                MapHandlers::new()
                    .on_add(move |k, v| l1.borrow_mut().push(format!("add {k}={v}")))
                    .on_set(move |k, v| l2.borrow_mut().push(format!("set {k}={v}")))
                    .on_delete(move |k| l3.borrow_mut().push(format!("del {k}"))),
                BindOptions::new(),
            )
            .unwrap();
        (map, log, binding)
    }

    #[test]
    fn insert_distinguishes_add_from_set() {
        let (map, log, _b) = recorded();
        assert_eq!(map.insert("b", 2), None);
        assert_eq!(map.insert("a", 5), Some(1));
        assert_eq!(*log.borrow(), vec!["add b=2", "set a=5"]);
    }

    #[test]
    fn remove_only_emits_for_present_keys() {
        let (map, log, _b) = recorded();
        assert_eq!(map.remove(&"zz"), None);
        assert_eq!(map.remove(&"a"), Some(1));
        assert_eq!(*log.borrow(), vec!["del a"]);
    }

    #[test]
    fn clear_deletes_in_insertion_order() {
        let (map, log, _b) = recorded();
        map.insert("c", 3);
        map.insert("b", 2);
        log.borrow_mut().clear();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(*log.borrow(), vec!["del a", "del c", "del b"]);
    }

    #[test]
    fn add_existing_replays_in_order() {
        let map = wrap_map(IndexMap::from([("x", 1), ("y", 2)]));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _b = map
            .bind(
                MapHandlers::new().on_add(move |k: &&str, v: &u32| s.borrow_mut().push((*k, *v))),
                BindOptions::new().add_existing(true),
            )
            .unwrap();
        assert_eq!(*seen.borrow(), vec![("x", 1), ("y", 2)]);
    }

    #[test]
    fn no_set_rejects_custom_set_handler() {
        let map: HookMap<u8, u8> = wrap_map(IndexMap::new());
        let err = map
            .bind(MapHandlers::new().on_set(|_, _| {}), BindOptions::new().no_set(true))
            .unwrap_err();
        assert_eq!(err, HookError::SetHandlerWithNoSet { store: "map" });
    }

    #[test]
    fn scoped_add_cleanup_runs_on_replace() {
        let map: HookMap<&str, u32> = wrap_map(IndexMap::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let _b = map
            .bind(
                MapHandlers::new().on_add_scoped(move |k: &&str, v: &u32| {
                    l.borrow_mut().push(format!("mount {k}={v}"));
                    let l = Rc::clone(&l);
                    let label = format!("{k}={v}");
                    move || l.borrow_mut().push(format!("unmount {label}"))
                }),
                BindOptions::new().no_set(true),
            )
            .unwrap();
        map.insert("k", 1);
        map.insert("k", 2);
        map.remove(&"k");
        assert_eq!(
            *log.borrow(),
            vec!["mount k=1", "unmount k=1", "mount k=2", "unmount k=2"]
        );
    }
}
