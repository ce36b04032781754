//! Owner-scoped disposal across binding kinds.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use hookwire_core::{
    ArrayHandlers, BindOptions, Hook, HookObject, Observe, OwnedRecord, Owner, leak, wrap_array,
    wrap_object,
};

type Props = HashMap<&'static str, i32>;

fn counter() -> (Rc<Cell<u32>>, impl Fn(Option<i32>) + 'static) {
    let hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&hits);
    (hits, move |_| h.set(h.get() + 1))
}

#[test]
fn binding_with_two_owners_survives_the_first_drop() {
    let obj: HookObject<Props> = wrap_object(HashMap::from([("x", 0)]));
    let (hits, handler) = counter();
    let first = Owner::new();
    let second = Owner::new();
    let binding = obj
        .derive("x")
        .to_callback(handler)
        .bind_to_owner(&first)
        .bind_to_owner(&second);
    assert_eq!(binding.owner_count(), 2);

    drop(first);
    assert!(!binding.is_destroyed());
    obj.set("x", 1);
    assert_eq!(hits.get(), 1);

    drop(second);
    assert!(binding.is_destroyed());
    obj.set("x", 2);
    assert_eq!(hits.get(), 1);
    assert_eq!(obj.subscriber_count(&"x"), 0);
}

#[test]
fn explicit_destroy_releases_owner_claims() {
    let obj: HookObject<Props> = wrap_object(HashMap::new());
    let owner = Owner::new();
    let hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&hits);
    let binding = obj
        .derive("x")
        .to_callback(move |_| h.set(h.get() + 1))
        .bind_to_owner(&owner);
    assert_eq!(owner.claim_count(), 1);

    binding.destroy();
    assert!(owner.is_empty());
    binding.destroy();
    obj.set("x", 1);
    assert_eq!(hits.get(), 0);
    binding.emit();
    assert_eq!(hits.get(), 1);
}

#[test]
fn key_removal_destroys_owner_bound_bindings() {
    let obj: HookObject<Props> = wrap_object(HashMap::from([("x", 1)]));
    let owner = Owner::new();
    let binding = obj.derive("x").to_callback(|_| {}).bind_to_owner(&owner);

    obj.remove(&"x");
    assert!(binding.is_destroyed());
    assert!(owner.is_empty());
}

#[test]
fn mirror_stops_when_target_record_is_dropped() {
    let source: HookObject<Props> = wrap_object(HashMap::from([("x", 1)]));
    let target = OwnedRecord::new(Props::new());
    let mirror = source
        .derive_map("x", |v| v.copied().unwrap_or_default())
        .to_mirror(&target, "mirrored");
    source.set("x", 5);
    assert_eq!(target.get(&"mirrored"), Some(5));

    let second_owner = Owner::new();
    let mirror = mirror.bind_to_owner(&second_owner);
    drop(target);
    assert!(!mirror.is_destroyed());
    source.set("x", 6);

    drop(second_owner);
    assert!(mirror.is_destroyed());
    assert_eq!(source.subscriber_count(&"x"), 0);
}

#[test]
fn dropping_the_store_drops_unbound_handlers() {
    let captured = Rc::new(());
    let weak = Rc::downgrade(&captured);
    {
        let obj: HookObject<Props> = wrap_object(HashMap::new());
        let _binding = obj.derive("x").to_callback(move |_| {
            let _keep = &captured;
        });
    }
    assert!(weak.upgrade().is_none());
}

#[test]
fn collection_binding_follows_its_owner() {
    let arr = wrap_array(vec![1, 2]);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    let owner = Owner::new();
    let binding = arr
        .bind(
            ArrayHandlers::new().on_add(move |i, v: &i32| s.borrow_mut().push((i, *v))),
            BindOptions::new(),
        )
        .expect("valid options")
        .bind_to_owner(&owner);

    arr.push(3);
    drop(owner);
    arr.push(4);
    assert!(binding.is_destroyed());
    assert_eq!(*seen.borrow(), vec![(2, 3)]);
    assert_eq!(arr.subscriber_count(), 0);
}

#[test]
fn leak_tracker_lists_only_unbound_bindings() {
    leak::enable();
    let obj: HookObject<Props> = wrap_object(HashMap::new());
    let owner = Owner::new();

    let loose = obj.derive("x").to_callback(|_| {});
    let held = obj.derive("y").to_callback(|_| {}).bind_to_owner(&owner);
    let target = OwnedRecord::new(Props::new());
    let _mirror = obj
        .derive_map("z", |v| v.copied().unwrap_or_default())
        .to_mirror(&target, "z");

    let ids: Vec<_> = leak::unbound().into_iter().map(|u| u.id).collect();
    assert!(ids.contains(&loose.id()));
    assert!(!ids.contains(&held.id()));
    assert_eq!(leak::unbound_count(), 1);

    loose.destroy();
    assert_eq!(leak::unbound_count(), 0);
    leak::disable();
}
