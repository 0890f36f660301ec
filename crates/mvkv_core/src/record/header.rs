//! Packed record header word.
//!
//! ```text
//! [ locked | count | head | stamp ]
//! [  0..1  | 1..5  | 5..9 | 9..64 ]
//! ```
//!
//! `count` is the number of populated version slots, `head` the ring-buffer
//! slot of the oldest version. `stamp` is bumped on every unlock and only
//! serves to detect that the record changed under an optimistic reader.

use std::fmt;

/// Number of versions a record retains.
pub const NUM_VERSIONS: usize = 15;

const LOCKED_MASK: u64 = 0x1;

const COUNT_SHIFT: u32 = 1;
const COUNT_MASK: u64 = 0xf << COUNT_SHIFT;

const HEAD_SHIFT: u32 = 5;
const HEAD_MASK: u64 = 0xf << HEAD_SHIFT;

const STAMP_SHIFT: u32 = 9;
const STAMP_MASK: u64 = u64::MAX << STAMP_SHIFT;

/// A snapshot of a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderWord(u64);

impl HeaderWord {
    /// Header of a fresh record: unlocked, one version at slot 0, stamp 0.
    pub const INITIAL: HeaderWord = HeaderWord(1 << COUNT_SHIFT);

    /// Wraps a raw header word.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw header word.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether the lock bit is set.
    #[must_use]
    pub const fn is_locked(self) -> bool {
        self.0 & LOCKED_MASK != 0
    }

    /// Number of populated version slots.
    #[must_use]
    pub const fn count(self) -> usize {
        ((self.0 & COUNT_MASK) >> COUNT_SHIFT) as usize
    }

    /// Ring-buffer slot of the oldest version.
    #[must_use]
    pub const fn head(self) -> usize {
        ((self.0 & HEAD_MASK) >> HEAD_SHIFT) as usize
    }

    /// Change-detection stamp.
    #[must_use]
    pub const fn stamp(self) -> u64 {
        (self.0 & STAMP_MASK) >> STAMP_SHIFT
    }

    /// Physical slot holding the `i`-th oldest version.
    #[must_use]
    pub const fn slot(self, i: usize) -> usize {
        (self.head() + i) % NUM_VERSIONS
    }

    /// Returns this word with the lock bit set.
    #[must_use]
    pub const fn locked(self) -> Self {
        Self(self.0 | LOCKED_MASK)
    }

    /// Returns this word with the given count.
    #[must_use]
    pub fn with_count(self, count: usize) -> Self {
        debug_assert!(count > 0 && count <= NUM_VERSIONS, "count {count} out of range");
        Self((self.0 & !COUNT_MASK) | ((count as u64) << COUNT_SHIFT))
    }

    /// Returns this word with the given head slot.
    #[must_use]
    pub fn with_head(self, head: usize) -> Self {
        debug_assert!(head < NUM_VERSIONS, "head {head} out of range");
        Self((self.0 & !HEAD_MASK) | ((head as u64) << HEAD_SHIFT))
    }

    /// Returns the word published by an unlock: stamp bumped, lock cleared.
    #[must_use]
    pub const fn unlocked_next(self) -> Self {
        let stamp = self.stamp().wrapping_add(1);
        let v = (self.0 & !STAMP_MASK) | ((stamp << STAMP_SHIFT) & STAMP_MASK);
        Self(v & !LOCKED_MASK)
    }
}

impl fmt::Display for HeaderWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} | {} | {} | {}]",
            if self.is_locked() { "LOCKED" } else { "-" },
            self.count(),
            self.head(),
            self.stamp()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_word() {
        let h = HeaderWord::INITIAL;
        assert!(!h.is_locked());
        assert_eq!(h.count(), 1);
        assert_eq!(h.head(), 0);
        assert_eq!(h.stamp(), 0);
    }

    #[test]
    fn fields_do_not_overlap() {
        let h = HeaderWord::INITIAL
            .locked()
            .with_count(NUM_VERSIONS)
            .with_head(NUM_VERSIONS - 1);
        assert!(h.is_locked());
        assert_eq!(h.count(), NUM_VERSIONS);
        assert_eq!(h.head(), NUM_VERSIONS - 1);
        assert_eq!(h.stamp(), 0);
    }

    #[test]
    fn unlock_bumps_stamp_and_keeps_layout() {
        let h = HeaderWord::INITIAL.with_count(3).with_head(7).locked();
        let u = h.unlocked_next();
        assert!(!u.is_locked());
        assert_eq!(u.count(), 3);
        assert_eq!(u.head(), 7);
        assert_eq!(u.stamp(), 1);
        assert_eq!(u.locked().unlocked_next().stamp(), 2);
    }

    #[test]
    fn stamp_wraps_without_touching_low_bits() {
        let max_stamp = HeaderWord::from_raw(STAMP_MASK | (2 << COUNT_SHIFT)).locked();
        let u = max_stamp.unlocked_next();
        assert_eq!(u.stamp(), 0);
        assert_eq!(u.count(), 2);
        assert!(!u.is_locked());
    }

    #[test]
    fn slot_wraps_around_ring() {
        let h = HeaderWord::INITIAL.with_head(13).with_count(4);
        assert_eq!(h.slot(0), 13);
        assert_eq!(h.slot(1), 14);
        assert_eq!(h.slot(2), 0);
        assert_eq!(h.slot(3), 1);
    }

    #[test]
    fn display_format() {
        let h = HeaderWord::INITIAL.locked();
        assert_eq!(h.to_string(), "[LOCKED | 1 | 0 | 0]");
    }
}
