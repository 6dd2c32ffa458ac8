//! Buffer pool management for OxbowDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable frame count
//! - Clock eviction policy for cache management
//! - Pin counting so in-use pages are never evicted
//! - Dirty page tracking for write-back

mod frame;
mod page_table;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, EvictedPage};
pub use replacer::ClockReplacer;
