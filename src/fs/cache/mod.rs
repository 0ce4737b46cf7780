//! Filesystem caching subsystem
//!
//! This module provides caching mechanisms for filesystem data and metadata:
//! - Page cache: Caches file data pages with adaptive read-ahead
//! - Buffer cache: Caches filesystem metadata blocks
//! - Writeback: Write-back coalescing and dirty page flushing
//! - Throttle: Dirty page throttling

pub mod buffer_cache;
pub mod page_cache;
pub mod throttle;
pub mod writeback;
