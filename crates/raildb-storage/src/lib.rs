//! Storage engine for RailDB.
//!
//! This crate provides:
//! - Page store for fixed-size page file I/O
//! - Typed page references with write-back-on-drop
//! - Persistent counter slab for restart-surviving scalars
//! - Disk-resident B+ tree index
//! - Typed map adapters over the B+ tree

mod maps;
mod meta;
mod node;
mod page_ref;
mod store;
mod tree;

pub use maps::{HashedMap, HashedMultiMap};
pub use meta::{MetaFile, MetaSlot, META_SLAB_SIZE};
pub use node::{Node, NODE_HEADER_LEN};
pub use page_ref::PageRef;
pub use store::PageStore;
pub use tree::{BPlusTree, TreeConfig};
