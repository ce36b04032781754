#![forbid(unsafe_code)]

//! Owner-scoped disposal shared by every binding kind.
//!
//! A binding is created active. Calling [`Hook::bind_to_owner`] adds a
//! *claim* on the binding to an [`Owner`]: the claim carries the strong
//! reference to the binding's handler and counts toward the binding's owner
//! total. When an owner is dropped (or [`Owner::clear`]ed), each of its claims
//! is released once; the binding is destroyed when its last claim goes.
//!
//! # Usage
//!
//! ```ignore
//! let owner = Owner::new();
//! let name = wrap_object(HashMap::from([("name", "a")]));
//! name.derive("name")
//!     .to_callback(|v| println!("{v:?}"))
//!     .bind_to_owner(&owner);
//!
//! // When owner drops, the callback binding is destroyed.
//! ```
//!
//! # Invariants
//!
//! 1. A binding with N claims survives N−1 releases.
//! 2. Claiming the same binding twice from one owner counts as two claims;
//!    dropping that owner releases both.
//! 3. Explicit destroy cancels every outstanding claim, so no release can
//!    reach an already destroyed binding through a stale owner.
//! 4. Claims are released in registration order.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::leak;

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

/// Identity of a binding, unique per thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    pub(crate) fn next() -> Self {
        NEXT_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            Self(id)
        })
    }

    /// Raw numeric id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Hook
// ---------------------------------------------------------------------------

/// Lifecycle operations common to every binding.
pub trait Hook {
    /// Identity of this binding.
    fn id(&self) -> BindingId;

    /// Detach from the source immediately and cancel all owner claims.
    /// Calling it again is a no-op.
    fn destroy(&self);

    /// Whether the binding has been destroyed (explicitly, by its owners, or
    /// by removal of the key it observes).
    fn is_destroyed(&self) -> bool;

    /// Number of owner claims currently held on this binding.
    fn owner_count(&self) -> usize;

    /// Tie this binding's lifetime to `owner`. The binding survives until the
    /// last of its owners releases it. Returns `self` for chaining.
    fn bind_to_owner(self, owner: &Owner) -> Self
    where
        Self: Sized;
}

/// What an owner needs to reach the binding behind a claim.
pub(crate) trait Disposable {
    /// `owner` let go of one of its claims on this binding.
    fn release_claim(&self, owner: &Owner);
}

// ---------------------------------------------------------------------------
// Owner
// ---------------------------------------------------------------------------

struct Claim {
    binding: BindingId,
    target: Weak<dyn Disposable>,
    /// Strong handler reference; released together with the claim.
    _keep_alive: Option<Box<dyn Any>>,
}

pub(crate) struct OwnerInner {
    claims: RefCell<Vec<Claim>>,
}

impl OwnerInner {
    /// Remove every claim on `binding`, returning them so the caller can drop
    /// them outside the borrow.
    fn cancel(&self, binding: BindingId) -> Vec<Claim> {
        let mut claims = self.claims.borrow_mut();
        let (cancelled, kept): (Vec<Claim>, Vec<Claim>) =
            claims.drain(..).partition(|c| c.binding == binding);
        *claims = kept;
        cancelled
    }
}

/// Lifetime anchor for bindings.
///
/// Typically embedded in whatever object a binding serves (a widget, a list
/// view, a mirror target). When the owner is dropped, every claim it holds is
/// released; bindings whose last claim that was are destroyed.
///
/// # Invariants
///
/// 1. After drop, no binding is kept alive by this owner.
/// 2. `clear()` releases all claims immediately; the owner stays reusable.
/// 3. `claim_count()` always equals the number of live claims.
pub struct Owner {
    inner: Rc<OwnerInner>,
}

impl Owner {
    /// Create an owner with no claims.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(OwnerInner {
                claims: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Number of claims currently held.
    #[must_use]
    pub fn claim_count(&self) -> usize {
        self.inner.claims.borrow().len()
    }

    /// Whether this owner holds no claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.claims.borrow().is_empty()
    }

    /// Whether this owner holds at least one claim on `binding`.
    #[must_use]
    pub fn holds(&self, binding: BindingId) -> bool {
        self.inner
            .claims
            .borrow()
            .iter()
            .any(|c| c.binding == binding)
    }

    /// Release all claims now, exactly as dropping the owner would.
    pub fn clear(&self) {
        let claims = std::mem::take(&mut *self.inner.claims.borrow_mut());
        if !claims.is_empty() {
            tracing::debug!(claims = claims.len(), "owner released");
        }
        for claim in &claims {
            if let Some(target) = claim.target.upgrade() {
                target.release_claim(self);
            }
        }
        drop(claims);
    }

    fn add_claim(&self, claim: Claim) {
        self.inner.claims.borrow_mut().push(claim);
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owner")
            .field("claim_count", &self.claim_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Disposal bookkeeping embedded in every binding.
pub(crate) struct Lifecycle {
    id: BindingId,
    kind: &'static str,
    destroyed: Cell<bool>,
    claims: Cell<usize>,
    owners: RefCell<Vec<Weak<OwnerInner>>>,
}

impl Lifecycle {
    pub(crate) fn new(kind: &'static str) -> Self {
        let id = BindingId::next();
        leak::track(id, kind);
        Self {
            id,
            kind,
            destroyed: Cell::new(false),
            claims: Cell::new(0),
            owners: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn id(&self) -> BindingId {
        self.id
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub(crate) fn claims(&self) -> usize {
        self.claims.get()
    }

    /// Register a claim of `owner` on the binding behind `target`.
    pub(crate) fn attach(
        &self,
        owner: &Owner,
        target: Weak<dyn Disposable>,
        keep_alive: Option<Box<dyn Any>>,
    ) {
        if self.destroyed.get() {
            tracing::debug!(binding = self.id.get(), kind = self.kind, "bind_to_owner after destroy ignored");
            return;
        }
        self.owners.borrow_mut().retain(|w| w.strong_count() > 0);
        owner.add_claim(Claim {
            binding: self.id,
            target,
            _keep_alive: keep_alive,
        });
        self.claims.set(self.claims.get() + 1);
        self.owners.borrow_mut().push(Rc::downgrade(&owner.inner));
        leak::forget(self.id);
    }

    /// Count down one claim. Returns `true` when that was the last one and
    /// the binding must now be destroyed.
    pub(crate) fn release(&self, owner: &Owner) -> bool {
        if self.destroyed.get() {
            return false;
        }
        {
            let mut owners = self.owners.borrow_mut();
            let releasing = Rc::as_ptr(&owner.inner);
            if let Some(at) = owners.iter().position(|w| std::ptr::eq(w.as_ptr(), releasing)) {
                owners.swap_remove(at);
            }
            owners.retain(|w| w.strong_count() > 0);
        }
        let remaining = self.claims.get().saturating_sub(1);
        self.claims.set(remaining);
        remaining == 0
    }

    /// Flip to destroyed and cancel outstanding claims. Returns `false` if
    /// the binding was already destroyed.
    pub(crate) fn mark_destroyed(&self, reason: &'static str) -> bool {
        if self.destroyed.replace(true) {
            return false;
        }
        self.claims.set(0);
        let owners = std::mem::take(&mut *self.owners.borrow_mut());
        for owner in owners {
            if let Some(owner) = owner.upgrade() {
                let cancelled = owner.cancel(self.id);
                drop(cancelled);
            }
        }
        leak::forget(self.id);
        tracing::debug!(binding = self.id.get(), kind = self.kind, reason, "binding destroyed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        life: Lifecycle,
        destroyed_by_owner: Cell<u32>,
    }

    impl Disposable for Dummy {
        fn release_claim(&self, owner: &Owner) {
            if self.life.release(owner) && self.life.mark_destroyed("owners_released") {
                self.destroyed_by_owner.set(self.destroyed_by_owner.get() + 1);
            }
        }
    }

    fn dummy() -> Rc<Dummy> {
        Rc::new(Dummy {
            life: Lifecycle::new("dummy"),
            destroyed_by_owner: Cell::new(0),
        })
    }

    fn claim(p: &Rc<Dummy>, owner: &Owner) {
        let weak: Weak<dyn Disposable> = Rc::downgrade(p) as Weak<dyn Disposable>;
        p.life.attach(owner, weak, None);
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = BindingId::next();
        let b = BindingId::next();
        assert!(b > a);
        assert_eq!(format!("{a}"), format!("#{}", a.get()));
    }

    #[test]
    fn single_owner_drop_destroys() {
        let p = dummy();
        {
            let owner = Owner::new();
            claim(&p, &owner);
            assert_eq!(owner.claim_count(), 1);
            assert!(owner.holds(p.life.id()));
        }
        assert!(p.life.is_destroyed());
        assert_eq!(p.destroyed_by_owner.get(), 1);
    }

    #[test]
    fn last_of_two_owners_destroys() {
        let p = dummy();
        let first = Owner::new();
        let second = Owner::new();
        claim(&p, &first);
        claim(&p, &second);
        assert_eq!(p.life.claims(), 2);

        drop(first);
        assert!(!p.life.is_destroyed());
        assert_eq!(p.life.claims(), 1);

        drop(second);
        assert!(p.life.is_destroyed());
    }

    #[test]
    fn same_owner_twice_counts_twice() {
        let p = dummy();
        let owner = Owner::new();
        claim(&p, &owner);
        claim(&p, &owner);
        assert_eq!(p.life.claims(), 2);
        assert_eq!(owner.claim_count(), 2);
        drop(owner);
        assert!(p.life.is_destroyed());
        assert_eq!(p.destroyed_by_owner.get(), 1);
    }

    #[test]
    fn explicit_destroy_cancels_claims() {
        let p = dummy();
        let owner = Owner::new();
        claim(&p, &owner);
        assert!(p.life.mark_destroyed("explicit"));
        assert!(owner.is_empty());
        assert!(!p.life.mark_destroyed("explicit"));
        drop(owner);
        assert_eq!(p.destroyed_by_owner.get(), 0);
    }

    #[test]
    fn clear_keeps_owner_reusable() {
        let owner = Owner::new();
        let first = dummy();
        claim(&first, &owner);
        owner.clear();
        assert!(first.life.is_destroyed());
        assert!(owner.is_empty());

        let second = dummy();
        claim(&second, &owner);
        assert!(!second.life.is_destroyed());
        assert_eq!(owner.claim_count(), 1);
    }

    #[test]
    fn attach_after_destroy_is_ignored() {
        let p = dummy();
        p.life.mark_destroyed("explicit");
        let owner = Owner::new();
        claim(&p, &owner);
        assert!(owner.is_empty());
        assert_eq!(p.life.claims(), 0);
    }

    #[test]
    fn keep_alive_lives_exactly_as_long_as_the_claim() {
        let p = dummy();
        let payload = Rc::new(5u8);
        let weak_payload = Rc::downgrade(&payload);
        let owner = Owner::new();
        let weak: Weak<dyn Disposable> = Rc::downgrade(&p) as Weak<dyn Disposable>;
        p.life.attach(&owner, weak, Some(Box::new(payload) as Box<dyn Any>));
        assert!(weak_payload.upgrade().is_some());
        drop(owner);
        assert!(weak_payload.upgrade().is_none());
    }

    #[test]
    fn released_owners_are_forgotten() {
        let p = dummy();
        let keeper = Owner::new();
        claim(&p, &keeper);
        for _ in 0..1_000 {
            let temp = Owner::new();
            claim(&p, &temp);
            assert_eq!(p.life.owners.borrow().len(), 2);
        }
        assert!(!p.life.is_destroyed());
        assert_eq!(p.life.claims(), 1);
        assert_eq!(p.life.owners.borrow().len(), 1);
    }

    #[test]
    fn same_owner_twice_leaves_one_entry_per_claim() {
        let p = dummy();
        let keeper = Owner::new();
        let twice = Owner::new();
        claim(&p, &keeper);
        claim(&p, &twice);
        claim(&p, &twice);
        assert_eq!(p.life.owners.borrow().len(), 3);
        drop(twice);
        assert_eq!(p.life.claims(), 1);
        assert_eq!(p.life.owners.borrow().len(), 1);
        assert!(keeper.holds(p.life.id()));
    }

    #[test]
    fn owner_debug_format() {
        let owner = Owner::default();
        assert!(format!("{owner:?}").contains("claim_count: 0"));
    }
}
