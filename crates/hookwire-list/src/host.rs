#![forbid(unsafe_code)]

//! Artifact containers a list view renders into.

use std::fmt;
use std::rc::Rc;

/// Ordered container of artifacts (child nodes, rows, widgets).
///
/// Anchors are artifacts previously inserted into this host and not yet
/// removed; hosts locate them by identity or equality, whichever suits the
/// artifact type.
pub trait ListHost {
    type Item: Clone;

    /// Insert at the very front.
    fn insert_first(&mut self, item: Self::Item);

    /// Insert at the very end.
    fn append(&mut self, item: Self::Item);

    /// Insert immediately after `anchor`.
    fn insert_after(&mut self, anchor: &Self::Item, item: Self::Item);

    /// Insert immediately before `anchor`.
    fn insert_before(&mut self, anchor: &Self::Item, item: Self::Item);

    /// Put `new` where `old` is.
    fn replace(&mut self, old: &Self::Item, new: Self::Item);

    fn remove(&mut self, item: &Self::Item);
}

/// One operation applied to a [`VecHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp<A> {
    InsertFirst(A),
    Append(A),
    InsertAfter { anchor: A, item: A },
    InsertBefore { anchor: A, item: A },
    Replace { old: A, new: A },
    Remove(A),
}

impl<A> HostOp<A> {
    /// Whether this operation placed an item anywhere but the tail.
    #[must_use]
    pub fn is_relocation(&self) -> bool {
        matches!(
            self,
            Self::InsertFirst(_) | Self::InsertAfter { .. } | Self::InsertBefore { .. }
        )
    }
}

/// `Vec`-backed host that records every operation applied to it.
///
/// Anchors are found by `PartialEq`; wrap values in [`Node`] when equal
/// values must stay distinguishable.
#[derive(Debug, Clone)]
pub struct VecHost<A> {
    items: Vec<A>,
    ops: Vec<HostOp<A>>,
}

impl<A: PartialEq + Clone> VecHost<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Current contents, front to back.
    #[must_use]
    pub fn items(&self) -> &[A] {
        &self.items
    }

    /// Every operation applied since creation or the last [`take_ops`](Self::take_ops).
    #[must_use]
    pub fn ops(&self) -> &[HostOp<A>] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp<A>> {
        std::mem::take(&mut self.ops)
    }

    /// Number of recorded operations that inserted somewhere other than the
    /// tail.
    #[must_use]
    pub fn relocations(&self) -> usize {
        self.ops.iter().filter(|op| op.is_relocation()).count()
    }

    fn position(&self, anchor: &A) -> Option<usize> {
        self.items.iter().position(|a| a == anchor)
    }
}

impl<A: PartialEq + Clone> Default for VecHost<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: PartialEq + Clone + fmt::Debug> ListHost for VecHost<A> {
    type Item = A;

    fn insert_first(&mut self, item: A) {
        self.ops.push(HostOp::InsertFirst(item.clone()));
        self.items.insert(0, item);
    }

    fn append(&mut self, item: A) {
        self.ops.push(HostOp::Append(item.clone()));
        self.items.push(item);
    }

    fn insert_after(&mut self, anchor: &A, item: A) {
        self.ops.push(HostOp::InsertAfter {
            anchor: anchor.clone(),
            item: item.clone(),
        });
        match self.position(anchor) {
            Some(at) => self.items.insert(at + 1, item),
            None => {
                tracing::warn!(anchor = ?anchor, "insert_after: anchor not in host, appending");
                self.items.push(item);
            }
        }
    }

    fn insert_before(&mut self, anchor: &A, item: A) {
        self.ops.push(HostOp::InsertBefore {
            anchor: anchor.clone(),
            item: item.clone(),
        });
        match self.position(anchor) {
            Some(at) => self.items.insert(at, item),
            None => {
                tracing::warn!(anchor = ?anchor, "insert_before: anchor not in host, appending");
                self.items.push(item);
            }
        }
    }

    fn replace(&mut self, old: &A, new: A) {
        self.ops.push(HostOp::Replace {
            old: old.clone(),
            new: new.clone(),
        });
        if let Some(at) = self.position(old) {
            self.items[at] = new;
        }
    }

    fn remove(&mut self, item: &A) {
        self.ops.push(HostOp::Remove(item.clone()));
        if let Some(at) = self.position(item) {
            self.items.remove(at);
        }
    }
}

/// Shared handle compared by identity rather than by value.
pub struct Node<T>(Rc<T>);

impl<T> Node<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(value))
    }

    #[must_use]
    pub fn get(&self) -> &T {
        &self.0
    }
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for Node<T> {}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Node").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchored_inserts_land_next_to_anchor() {
        let mut host = VecHost::new();
        host.append('a');
        host.append('d');
        host.insert_after(&'a', 'b');
        host.insert_before(&'d', 'c');
        host.insert_first('_');
        assert_eq!(host.items(), &['_', 'a', 'b', 'c', 'd']);
        assert_eq!(host.relocations(), 3);
    }

    #[test]
    fn replace_and_remove() {
        let mut host = VecHost::new();
        host.append(1);
        host.append(2);
        host.replace(&1, 10);
        host.remove(&2);
        assert_eq!(host.items(), &[10]);
        assert_eq!(host.take_ops().len(), 4);
        assert!(host.ops().is_empty());
    }

    #[test]
    fn nodes_compare_by_identity() {
        let a = Node::new(1);
        let b = Node::new(1);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(*b.get(), 1);
    }
}
