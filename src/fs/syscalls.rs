//! Filesystem System Calls
//!
//! This module implements POSIX-compatible filesystem syscalls for MelloOS.
//! It provides the interface between userspace and the VFS layer.

// TODO: Implement filesystem syscalls
// Currently stubbed - requires VFS implementation without alloc
