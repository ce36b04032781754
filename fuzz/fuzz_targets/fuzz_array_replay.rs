#![no_main]

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use hookwire_core::{ArrayHandlers, BindOptions, Observe, wrap_array};
use hookwire_list::{Node, VecHost, build_list};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Push(i16),
    Unshift(Vec<i16>),
    Pop,
    Shift,
    Splice { start: i8, delete: Option<u8>, items: Vec<i16> },
    Set { index: u8, value: i16 },
    SetLen(u8),
    ClearIndex(u8),
    Fill { value: i16, from: u8, to: u8 },
    CopyWithin { from: u8, to: u8, dest: u8 },
    Reverse,
    Sort,
    Clear,
}

fuzz_target!(|input: (Vec<i16>, Vec<FuzzOp>)| {
    let (initial, ops) = input;
    if initial.len() > 64 || ops.len() > 256 {
        return;
    }

    let source = wrap_array(initial);
    let shadow = Rc::new(RefCell::new(Vec::new()));
    let (a, s, d) = (Rc::clone(&shadow), Rc::clone(&shadow), Rc::clone(&shadow));
    let _binding = source
        .bind(
            ArrayHandlers::new()
                .on_add(move |i, v: &i16| a.borrow_mut().insert(i, *v))
                .on_set(move |i, v: &i16| s.borrow_mut()[i] = *v)
                .on_delete(move |i| {
                    d.borrow_mut().remove(i);
                }),
            BindOptions::new().add_existing(true),
        )
        .expect("no conflicting options");
    let view = build_list(
        &source,
        |v: &i16| (*v % 3 != 0).then(|| Node::new(*v)),
        VecHost::new(),
    );

    for op in ops {
        match op {
            FuzzOp::Push(v) => {
                source.push(v);
            }
            FuzzOp::Unshift(items) => {
                source.unshift(items.into_iter().take(8));
            }
            FuzzOp::Pop => {
                source.pop();
            }
            FuzzOp::Shift => {
                source.shift();
            }
            FuzzOp::Splice { start, delete, items } => {
                source.splice(
                    isize::from(start),
                    delete.map(usize::from),
                    items.into_iter().take(8),
                );
            }
            FuzzOp::Set { index, value } => source.set(usize::from(index % 96), value),
            FuzzOp::SetLen(n) => source.set_len(usize::from(n % 96)),
            FuzzOp::ClearIndex(i) => source.clear_index(usize::from(i)),
            FuzzOp::Fill { value, from, to } => {
                let (lo, hi) = (from.min(to), from.max(to));
                source.fill(value, usize::from(lo)..usize::from(hi));
            }
            FuzzOp::CopyWithin { from, to, dest } => {
                let (lo, hi) = (from.min(to), from.max(to));
                source.copy_within(usize::from(lo)..usize::from(hi), usize::from(dest));
            }
            FuzzOp::Reverse => source.reverse(),
            FuzzOp::Sort => source.sort(),
            FuzzOp::Clear => source.clear(),
        }

        let current = source.to_vec();
        assert_eq!(*shadow.borrow(), current);
        assert_eq!(view.len(), current.len());
        let expected: Vec<i16> = current.into_iter().filter(|v| v % 3 != 0).collect();
        let rendered: Vec<i16> = view.with_host(|h| h.items().iter().map(|n| *n.get()).collect());
        assert_eq!(rendered, expected);
    }
});
