//! Typed map adapters over the B+ tree.
//!
//! Thin layers that turn the raw ordered index into the shapes the
//! domain needs: a single-value map keyed by the hash of a string, and
//! an ordered multimap keyed by `(hash, value)` with a unit payload.

use crate::meta::MetaFile;
use crate::tree::BPlusTree;
use raildb_common::{djb2, FixedCodec, Result};
use std::path::Path;

/// Single-value map keyed by `djb2(key)`.
///
/// Hash collisions are not resolved; the identifier domains stored here
/// (usernames, train ids) are treated as hash-unique.
pub struct HashedMap<V> {
    tree: BPlusTree<u64, V>,
}

impl<V: FixedCodec + Clone + Default> HashedMap<V> {
    /// Opens or creates the map backed by the file at `path`.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool, meta: &MetaFile) -> Result<Self> {
        Ok(Self {
            tree: BPlusTree::open(path, fsync_enabled, meta)?,
        })
    }

    pub fn insert(&mut self, key: &str, value: V) -> Result<()> {
        self.tree.insert(djb2(key.as_bytes()), value)
    }

    pub fn erase(&mut self, key: &str) -> Result<bool> {
        self.tree.erase(&djb2(key.as_bytes()))
    }

    pub fn find(&self, key: &str) -> Result<Option<V>> {
        self.find_by_hash(djb2(key.as_bytes()))
    }

    pub fn find_by_hash(&self, hash: u64) -> Result<Option<V>> {
        self.tree.find(&hash)
    }

    pub fn modify(&mut self, key: &str, f: impl FnOnce(&mut V)) -> Result<bool> {
        self.modify_by_hash(djb2(key.as_bytes()), f)
    }

    pub fn modify_by_hash(&mut self, hash: u64, f: impl FnOnce(&mut V)) -> Result<bool> {
        self.tree.modify(&hash, f)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.tree.clear()
    }

    pub fn flush(&self) -> Result<()> {
        self.tree.flush()
    }
}

/// Ordered multimap from a hashed key to many values.
///
/// Stored as `(hash, value) -> ()` so the values under one hash sit in
/// one contiguous key range; lookups scan `(h, min) ..= (h + 1, min)`
/// and filter to the exact hash, the `h + 1` endpoint closing the range.
pub struct HashedMultiMap<V> {
    tree: BPlusTree<(u64, V), ()>,
}

impl<V> HashedMultiMap<V>
where
    V: FixedCodec + Ord + Clone + Default,
{
    /// Opens or creates the multimap backed by the file at `path`.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool, meta: &MetaFile) -> Result<Self> {
        Ok(Self {
            tree: BPlusTree::open(path, fsync_enabled, meta)?,
        })
    }

    pub fn insert(&mut self, hash: u64, value: V) -> Result<()> {
        self.tree.insert((hash, value), ())
    }

    pub fn erase(&mut self, hash: u64, value: &V) -> Result<bool> {
        self.tree.erase(&(hash, value.clone()))
    }

    /// Every value stored under `hash`, in value order.
    pub fn find(&self, hash: u64) -> Result<Vec<V>> {
        let lo = (hash, V::default());
        let hi = (hash.wrapping_add(1), V::default());
        let scanned = self.tree.range_find(&lo, &hi)?;
        Ok(scanned
            .into_iter()
            .filter(|((h, _), _)| *h == hash)
            .map(|((_, v), _)| v)
            .collect())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.tree.clear()
    }

    pub fn flush(&self) -> Result<()> {
        self.tree.flush()
    }
}
