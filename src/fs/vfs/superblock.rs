//! Superblock Trait and Types
//!
//! This module defines the SuperBlock and FsType traits that filesystem implementations
//! must provide, along with associated types for filesystem features and mount options.

// TODO: Implement without alloc - keep trait definitions only for now
