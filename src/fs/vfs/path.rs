//! Path Resolution
//!
//! This module implements path resolution with symlink loop detection.
//! It handles absolute and relative paths, "." and ".." components,
//! and integrates with the dentry cache for fast lookups.

// TODO: Implement path resolution without alloc crate
// The kernel doesn't have alloc, so we need to use static buffers instead of String/Vec
