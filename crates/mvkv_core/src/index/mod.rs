//! Key-to-record index.
//!
//! The transactional layer reaches records only through [`RecordIndex`]: point
//! lookup, get-or-create insert, and ordered range scans. Records are never
//! removed from the index; a deleted key keeps its record with a deleted
//! newest version.
//!
//! [`BTreeRecordIndex`] is the default ordered in-memory implementation.

mod btree;
mod traits;

pub use btree::BTreeRecordIndex;
pub use traits::RecordIndex;
