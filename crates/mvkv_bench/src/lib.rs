//! Shared helpers for the mvkv benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
