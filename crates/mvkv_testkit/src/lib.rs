//! # mvkv Testkit
//!
//! Test utilities for mvkv.
//!
//! This crate provides:
//! - Test fixtures, database helpers and log capture
//! - Property-based test generators using proptest
//! - End-to-end transaction scenarios
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mvkv_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_memory_db(|db| {
//!         db.transaction(|txn| txn.put("k", "v")).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
