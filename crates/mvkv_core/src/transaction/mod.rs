//! Optimistic multi-version transactions.
//!
//! Transactions provide serializable snapshot isolation:
//! - **Snapshot reads**: every read sees the store as of the snapshot tid
//! - **Buffered writes**: nothing is visible to others before commit
//! - **Validation**: commit fails if a read went stale or a key appeared in a
//!   range the transaction observed as empty
//! - **All or nothing**: a failed commit installs no version

mod manager;
mod range_set;
mod state;

pub use manager::TransactionManager;
pub use range_set::AbsentRangeSet;
pub use state::{PendingWrite, ReadRecord, Transaction, TransactionState};
