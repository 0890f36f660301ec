//! Epoch-managed value slots.
//!
//! A slot holds an optional value behind a `crossbeam-epoch` atomic pointer.
//! A null pointer is the absent value (a deleted entry). Writers replace
//! slots only while holding the record lock; displaced values are retired to
//! the epoch collector, so optimistic readers holding a pinned guard may
//! still dereference them.

#![allow(unsafe_code)]

use crate::types::Value;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::sync::atomic::Ordering;

/// One value slot of a record's version ring.
#[derive(Debug)]
pub(crate) struct ValueSlot {
    ptr: Atomic<Value>,
}

impl ValueSlot {
    /// Creates an empty (absent) slot.
    pub(crate) fn empty() -> Self {
        Self { ptr: Atomic::null() }
    }

    /// Clones the value currently in the slot.
    ///
    /// The result may be torn with respect to the record's timestamps unless
    /// the caller validates the record header afterwards.
    pub(crate) fn load(&self, guard: &Guard) -> Option<Value> {
        let shared = self.ptr.load(Ordering::Acquire, guard);
        // SAFETY: non-null pointers in a slot come from `Owned::new` in
        // `store`. A pointer displaced from the slot is only destroyed through
        // `defer_destroy`, which waits until every guard pinned at or before
        // the displacement (including `guard`) is dropped.
        unsafe { shared.as_ref() }.cloned()
    }

    /// Replaces the slot contents, retiring the displaced value.
    ///
    /// Must only be called while holding the owning record's lock.
    pub(crate) fn store(&self, value: Option<Value>, guard: &Guard) {
        let new = match value {
            Some(v) => Owned::new(v).into_shared(guard),
            None => Shared::null(),
        };
        let old = self.ptr.swap(new, Ordering::AcqRel, guard);
        if !old.is_null() {
            // SAFETY: `old` was unlinked from the slot by the swap above and
            // the record lock guarantees no other writer observed it as its
            // own to retire. Readers reach it only through pinned guards.
            unsafe { guard.defer_destroy(old) };
        }
    }
}

impl Drop for ValueSlot {
    fn drop(&mut self) {
        // SAFETY: `&mut self` proves no reader or writer can reach the slot.
        unsafe {
            let guard = epoch::unprotected();
            let shared = self.ptr.load(Ordering::Relaxed, guard);
            if !shared.is_null() {
                drop(shared.into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_is_absent() {
        let slot = ValueSlot::empty();
        let guard = epoch::pin();
        assert_eq!(slot.load(&guard), None);
    }

    #[test]
    fn store_then_load() {
        let slot = ValueSlot::empty();
        let guard = epoch::pin();
        slot.store(Some(Value::from_static(b"a")), &guard);
        assert_eq!(slot.load(&guard), Some(Value::from_static(b"a")));
        slot.store(None, &guard);
        assert_eq!(slot.load(&guard), None);
    }

    #[test]
    fn loaded_value_survives_replacement() {
        let slot = ValueSlot::empty();
        let guard = epoch::pin();
        slot.store(Some(Value::from(vec![1, 2, 3])), &guard);
        let before = slot.load(&guard);
        slot.store(Some(Value::from(vec![4])), &guard);
        assert_eq!(before.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(slot.load(&guard).as_deref(), Some(&[4u8][..]));
    }
}
