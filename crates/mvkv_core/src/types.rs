//! Core type definitions for mvkv.

use bytes::Bytes;
use std::fmt;
use std::ops::Bound;

/// Value payload stored in a record version.
///
/// Values are opaque byte strings. Cloning is cheap (reference counted).
pub type Value = Bytes;

/// Logical timestamp ("tid") used for snapshots and commit versions.
///
/// Tids are produced by the [`GlobalClock`](crate::GlobalClock) and are
/// totally ordered. They are not wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tid(u64);

impl Tid {
    /// The beginning of time. Every record starts with a deleted entry here.
    pub const MIN: Tid = Tid(0);

    /// Creates a new tid.
    #[must_use]
    pub const fn new(tid: u64) -> Self {
        Self(tid)
    }

    /// Returns the raw tid value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next tid.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}

/// An opaque, totally ordered key.
///
/// Keys compare lexicographically by their bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Key(Bytes);

impl Key {
    /// Creates a key from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the key in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty key (the smallest key).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the smallest key strictly greater than this one.
    ///
    /// `[k, k.successor())` is the half-open range holding exactly `k`.
    #[must_use]
    pub fn successor(&self) -> Key {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(&self.0);
        bytes.push(0);
        Key(Bytes::from(bytes))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(Bytes::from(s.into_bytes()))
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Key(Bytes::from(b))
    }
}

impl From<Bytes> for Key {
    fn from(b: Bytes) -> Self {
        Key(b)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Printable ASCII renders as text, anything else escaped.
        write!(f, "\"")?;
        for &b in self.0.iter() {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        write!(f, "\"")
    }
}

/// A half-open key range `[start, end)`; `end == None` means `+inf`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub start: Key,
    /// Exclusive upper bound, or `None` for an unbounded range.
    pub end: Option<Key>,
}

impl KeyRange {
    /// Creates the range `[start, end)`.
    pub fn new(start: impl Into<Key>, end: impl Into<Key>) -> Self {
        Self {
            start: start.into(),
            end: Some(end.into()),
        }
    }

    /// Creates the range `[start, +inf)`.
    pub fn unbounded(start: impl Into<Key>) -> Self {
        Self {
            start: start.into(),
            end: None,
        }
    }

    /// Creates the range holding exactly `key`.
    pub fn point(key: &Key) -> Self {
        Self {
            start: key.clone(),
            end: Some(key.successor()),
        }
    }

    /// Creates the range covering every key.
    pub fn all() -> Self {
        Self::unbounded(Key::default())
    }

    /// Whether the range contains no key.
    #[must_use]
    pub fn is_empty_range(&self) -> bool {
        matches!(&self.end, Some(end) if *end <= self.start)
    }

    /// Whether `key` falls inside the range.
    #[must_use]
    pub fn contains_key(&self, key: &Key) -> bool {
        *key >= self.start && self.end.as_ref().map_or(true, |end| key < end)
    }

    /// Whether `other` is a subrange of this range. Empty ranges are
    /// contained in everything.
    #[must_use]
    pub fn contains(&self, other: &KeyRange) -> bool {
        if other.is_empty_range() {
            return true;
        }
        other.start >= self.start
            && match (&self.end, &other.end) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(end), Some(other_end)) => other_end <= end,
            }
    }

    /// Borrowed bounds, suitable for `BTreeMap::range`.
    #[must_use]
    pub fn bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        (
            Bound::Included(&self.start),
            self.end.as_ref().map_or(Bound::Unbounded, Bound::Excluded),
        )
    }
}

impl From<Key> for KeyRange {
    fn from(start: Key) -> Self {
        Self::unbounded(start)
    }
}

impl fmt::Debug for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyRange{self}")
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.end {
            Some(end) => write!(f, "[{}, {})", self.start, end),
            None => write!(f, "[{}, +inf)", self.start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tid_ordering() {
        let t1 = Tid::new(1);
        let t2 = Tid::new(2);
        assert!(t1 < t2);
        assert!(Tid::MIN < t1);
    }

    #[test]
    fn tid_next() {
        assert_eq!(Tid::new(5).next(), Tid::new(6));
        assert_eq!(Tid::new(5).next().as_u64(), 6);
        assert_eq!(Tid::default(), Tid::MIN);
    }

    #[test]
    fn tid_display() {
        assert_eq!(format!("{}", Tid::new(42)), "tid:42");
    }

    #[test]
    fn key_ordering_is_bytewise() {
        assert!(Key::from("a") < Key::from("b"));
        assert!(Key::from("a") < Key::from("aa"));
        assert!(Key::from("") < Key::from("a"));
    }

    #[test]
    fn successor_is_tight() {
        let k = Key::from("c");
        let s = k.successor();
        assert!(k < s);
        assert!(s < Key::from("c\x01"));
        assert!(s < Key::from("d"));
    }

    #[test]
    fn key_display_escapes_binary() {
        let k = Key::from(vec![b'a', 0xff]);
        assert_eq!(format!("{k}"), "\"a\\xff\"");
    }

    #[test]
    fn key_range_membership() {
        let r = KeyRange::new("b", "d");
        assert!(!r.contains_key(&Key::from("a")));
        assert!(r.contains_key(&Key::from("b")));
        assert!(r.contains_key(&Key::from("cz")));
        assert!(!r.contains_key(&Key::from("d")));

        let open = KeyRange::unbounded("b");
        assert!(open.contains_key(&Key::from("zzzz")));
    }

    #[test]
    fn point_range_holds_one_key() {
        let k = Key::from("c");
        let r = KeyRange::point(&k);
        assert!(r.contains_key(&k));
        assert!(!r.contains_key(&Key::from("c\x01")));
        assert!(!r.contains_key(&Key::from("b")));
    }

    #[test]
    fn empty_and_subranges() {
        assert!(KeyRange::new("d", "b").is_empty_range());
        assert!(KeyRange::new("b", "b").is_empty_range());
        assert!(!KeyRange::unbounded("z").is_empty_range());

        let outer = KeyRange::new("a", "m");
        assert!(outer.contains(&KeyRange::new("b", "c")));
        assert!(outer.contains(&KeyRange::new("a", "m")));
        assert!(!outer.contains(&KeyRange::new("b", "n")));
        assert!(!outer.contains(&KeyRange::unbounded("b")));
        assert!(KeyRange::all().contains(&KeyRange::unbounded("b")));
        assert!(outer.contains(&KeyRange::new("x", "x")));
    }

    #[test]
    fn key_range_display() {
        assert_eq!(KeyRange::new("b", "d").to_string(), "[\"b\", \"d\")");
        assert_eq!(KeyRange::unbounded("b").to_string(), "[\"b\", +inf)");
    }
}
