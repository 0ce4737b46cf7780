//! MelloFS Disk Filesystem
//!
//! Persistent Copy-on-Write filesystem with B-tree indexing.

#[path = "super.rs"]
pub mod super_;
pub mod super_impl;
pub mod btree;
pub mod keys;
pub mod extent;
pub mod allocator;
pub mod txg;
pub mod checksum;
pub mod replay;
pub mod compress;

// Re-export main types
pub use super_impl::MfsDiskType;
