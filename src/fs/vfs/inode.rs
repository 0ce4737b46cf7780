//! Inode Trait and Types
//!
//! This module defines the core Inode trait that all filesystem implementations must provide,
//! along with associated types for file metadata, directory entries, and operations.

// TODO: Implement without alloc crate
// Keep trait definitions but remove Arc/Vec/String dependencies
