//! Storage engine for OxbowDB.
//!
//! This crate provides:
//! - Paged file abstraction for page-level file I/O
//! - Buffer manager routing page access through the buffer pool
//! - Relation files holding fixed-size records, with a sequential scanner
//! - B+ tree secondary index over a single integer attribute

mod bufmgr;
mod btree;
mod file;
mod relation;

pub use btree::{BTreeIndex, RangeOp, LEAF_CAPACITY, NODE_CAPACITY};
pub use bufmgr::BufferManager;
pub use file::PagedFile;
pub use relation::{RelationFile, RelationScan, Rid};
