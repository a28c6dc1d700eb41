//! In-memory reference implementation of the gleaner state-store traits.
//!
//! Stands in for the external partitioned columnar store in tests and the
//! playground. Write paths follow the same bucketing discipline a real
//! backend would: cardinality-sensitive collections go through the
//! [`gleaner_common::bucket::BucketAllocator`].

mod db;
mod trait_impl;

pub use db::MemoryStateStore;
