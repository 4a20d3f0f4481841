//! Disk-resident B+ tree.
//!
//! An ordered map from a fixed-width key to a fixed-width value, one
//! node per page. The tree is seeded with a sentinel entry at
//! `K::default()` so routing always succeeds; every key type stored in a
//! tree must order its default value at-or-below all live keys.
//!
//! During insert and erase the descent keeps only the suffix of parent
//! nodes that might actually need restructuring: whenever a visited node
//! is safe for the operation (cannot split, respectively cannot merge),
//! the parents collected so far are discarded. This bounds the write set
//! of each operation to the nodes it can touch.

use crate::meta::{MetaFile, MetaSlot};
use crate::node::Node;
use crate::page_ref::PageRef;
use crate::store::PageStore;
use raildb_common::{FixedCodec, PageId, Result, INVALID_PAGE_ID};
use std::marker::PhantomData;
use std::path::Path;

/// Persistent root bookkeeping for one tree, kept in the meta slab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeConfig {
    pub initialized: bool,
    pub layer: u32,
    pub root: PageId,
}

impl FixedCodec for TreeConfig {
    const ENCODED_LEN: usize = 9;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0] = u8::from(self.initialized);
        self.layer.encode_into(&mut buf[1..5]);
        self.root.encode_into(&mut buf[5..9]);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self {
            initialized: buf[0] != 0,
            layer: u32::decode_from(&buf[1..5]),
            root: PageId::decode_from(&buf[5..9]),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Access {
    Find,
    Insert,
    Erase,
}

type InnerRef<'s, K> = PageRef<'s, Node<K, PageId>>;
type LeafRef<'s, K, V> = PageRef<'s, Node<K, V>>;

/// A paged B+ tree over one store file.
///
/// `layer` counts inner levels above the leaves; `layer == 0` means the
/// root's children are leaves. Root id and layer persist through a
/// [`MetaSlot`] so the tree survives restart.
pub struct BPlusTree<K, V> {
    store: PageStore,
    config: MetaSlot<TreeConfig>,
    root: PageId,
    layer: u32,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> BPlusTree<K, V>
where
    K: FixedCodec + Ord + Clone + Default,
    V: FixedCodec + Clone + Default,
{
    /// Opens or creates a tree backed by the file at `path`, with root
    /// bookkeeping in `meta`.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool, meta: &MetaFile) -> Result<Self> {
        assert!(
            Node::<K, V>::SIZE_MAX >= 8 && Node::<K, PageId>::SIZE_MAX >= 8,
            "key/value too large for a page"
        );
        let store = PageStore::open(path, fsync_enabled)?;
        let config = meta.slot(TreeConfig::default())?;

        let mut tree = Self {
            store,
            config,
            root: INVALID_PAGE_ID,
            layer: 0,
            _types: PhantomData,
        };

        let saved = tree.config.get();
        if saved.initialized {
            tree.root = saved.root;
            tree.layer = saved.layer;
        } else {
            tree.init_empty()?;
        }
        Ok(tree)
    }

    /// Number of inner levels above the leaves.
    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Point lookup.
    pub fn find(&self, key: &K) -> Result<Option<V>> {
        let (leaf, slot, _) = Self::descend(&self.store, self.root, self.layer, key, Access::Find)?;
        if let Some(i) = slot {
            if leaf.entries[i].0 == *key {
                return Ok(Some(leaf.entries[i].1.clone()));
            }
        }
        Ok(None)
    }

    /// Inserts `key -> value`, overwriting the value if the key exists.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        let (mut leaf, slot, mut parents) =
            Self::descend(&self.store, self.root, self.layer, &key, Access::Insert)?;

        if let Some(i) = slot {
            if leaf.entries[i].0 == key {
                leaf.entries[i].1 = value;
                return Ok(());
            }
        }

        let at = slot.map_or(0, |i| i + 1);
        leaf.entries.insert(at, (key, value));

        if parents.is_empty() || leaf.len() < Node::<K, V>::SPLIT_T {
            return Ok(());
        }

        // Split the leaf and push the boundary up.
        let new_id = self.store.new_page();
        let new_leaf = leaf.split(new_id);
        if new_leaf.next_id != INVALID_PAGE_ID {
            let mut next: LeafRef<'_, K, V> = PageRef::load(&self.store, new_leaf.next_id)?;
            next.prev_id = new_id;
        }
        let mut promoted = new_leaf.first_key();
        let mut child_id = new_id;
        PageRef::create(&self.store, new_id, new_leaf)?;
        drop(leaf);

        while let Some((mut parent, slot)) = parents.pop() {
            parent.entries.insert(slot + 1, (promoted.clone(), child_id));
            if parent.len() < Node::<K, PageId>::SPLIT_T {
                return Ok(());
            }

            let new_id = self.store.new_page();
            let new_inner = parent.split(new_id);
            if new_inner.next_id != INVALID_PAGE_ID {
                let mut next: InnerRef<'_, K> = PageRef::load(&self.store, new_inner.next_id)?;
                next.prev_id = new_id;
            }
            promoted = new_inner.first_key();
            child_id = new_id;
            PageRef::create(&self.store, new_id, new_inner)?;
        }

        // The root itself split: grow the tree by one level.
        let new_root_id = self.store.new_page();
        let new_root = Node::with_entries(
            new_root_id,
            vec![(K::default(), self.root), (promoted, child_id)],
        );
        PageRef::create(&self.store, new_root_id, new_root)?;
        self.root = new_root_id;
        self.layer += 1;
        Self::save_config(&mut self.config, self.root, self.layer)
    }

    /// Removes `key`. Returns false if the key was absent.
    pub fn erase(&mut self, key: &K) -> Result<bool> {
        let (mut leaf, slot, mut parents) =
            Self::descend(&self.store, self.root, self.layer, key, Access::Erase)?;

        let Some(i) = slot else { return Ok(false) };
        if leaf.entries[i].0 != *key {
            return Ok(false);
        }
        leaf.entries.remove(i);

        if parents.is_empty() {
            return Ok(true);
        }
        if leaf.len() > Node::<K, V>::MERGE_T {
            return Ok(true);
        }

        // The immediate parent is the last retained entry; the slot
        // recorded with it is this leaf's position among its children.
        let (leaf_slot, parent_len) = {
            let (parent, slot) = parents.last().expect("unsafe leaf retains its parent");
            (*slot, parent.len())
        };
        let Some(mut erase_at) = Self::merge_node(&self.store, leaf, leaf_slot, parent_len)?
        else {
            return Ok(true);
        };

        // Erase the merged-away child from each retained parent, merging
        // parents that underflow in turn.
        while let Some((mut parent, _)) = parents.pop() {
            parent.entries.remove(erase_at);

            if parent.page_id() == self.root {
                if parent.len() == 1 && self.layer > 0 && parent.entries[0].0 == K::default() {
                    let new_root = parent.entries[0].1;
                    self.store.delete_page(parent.page_id());
                    parent.discard();
                    self.root = new_root;
                    self.layer -= 1;
                    Self::save_config(&mut self.config, self.root, self.layer)?;
                }
                return Ok(true);
            }

            if parent.len() > Node::<K, PageId>::MERGE_T {
                return Ok(true);
            }
            let (parent_slot, grandparent_len) = match parents.last() {
                Some((grandparent, slot)) => (*slot, grandparent.len()),
                None => return Ok(true),
            };
            match Self::merge_node(&self.store, parent, parent_slot, grandparent_len)? {
                Some(at) => erase_at = at,
                None => return Ok(true),
            }
        }
        Ok(true)
    }

    /// Collects every `(key, value)` with `lo <= key <= hi`, ascending.
    pub fn range_find(&self, lo: &K, hi: &K) -> Result<Vec<(K, V)>> {
        let mut out = Vec::new();
        let (mut leaf, slot, _) = Self::descend(&self.store, self.root, self.layer, lo, Access::Find)?;
        let mut idx = slot.unwrap_or(0);

        loop {
            while idx < leaf.len() {
                let (key, value) = &leaf.entries[idx];
                if key > hi {
                    return Ok(out);
                }
                if key >= lo {
                    out.push((key.clone(), value.clone()));
                }
                idx += 1;
            }
            if leaf.next_id == INVALID_PAGE_ID {
                return Ok(out);
            }
            let next_id = leaf.next_id;
            drop(leaf);
            leaf = PageRef::load(&self.store, next_id)?;
            idx = 0;
        }
    }

    /// Applies `f` to the value at `key` in place. Returns false if the
    /// key was absent.
    pub fn modify(&mut self, key: &K, f: impl FnOnce(&mut V)) -> Result<bool> {
        let (mut leaf, slot, _) = Self::descend(&self.store, self.root, self.layer, key, Access::Find)?;
        if let Some(i) = slot {
            if leaf.entries[i].0 == *key {
                f(&mut leaf.entries[i].1);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Applies `f` to every value with `lo <= key <= hi`. Returns true
    /// if anything was visited.
    pub fn range_modify(&mut self, lo: &K, hi: &K, mut f: impl FnMut(&mut V)) -> Result<bool> {
        let mut modified = false;
        let (mut leaf, slot, _) = Self::descend(&self.store, self.root, self.layer, lo, Access::Find)?;
        let mut idx = slot.unwrap_or(0);

        loop {
            while idx < leaf.len() {
                if leaf.entries[idx].0 > *hi {
                    return Ok(modified);
                }
                if leaf.entries[idx].0 >= *lo {
                    f(&mut leaf.entries[idx].1);
                    modified = true;
                }
                idx += 1;
            }
            if leaf.next_id == INVALID_PAGE_ID {
                return Ok(modified);
            }
            let next_id = leaf.next_id;
            drop(leaf);
            leaf = PageRef::load(&self.store, next_id)?;
            idx = 0;
        }
    }

    /// Discards every entry and resets the tree to its initial state.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()?;
        self.init_empty()
    }

    /// Flushes the backing store (allocation cursor included).
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    fn init_empty(&mut self) -> Result<()> {
        let root_id = self.store.new_page();
        let leaf_id = self.store.new_page();

        let leaf = Node::with_entries(leaf_id, vec![(K::default(), V::default())]);
        PageRef::create(&self.store, leaf_id, leaf)?;

        let root = Node::with_entries(root_id, vec![(K::default(), leaf_id)]);
        PageRef::create(&self.store, root_id, root)?;

        self.root = root_id;
        self.layer = 0;
        Self::save_config(&mut self.config, self.root, self.layer)
    }

    fn save_config(config: &mut MetaSlot<TreeConfig>, root: PageId, layer: u32) -> Result<()> {
        config.set(TreeConfig {
            initialized: true,
            layer,
            root,
        })
    }

    /// Merges an underfull node with a sibling.
    ///
    /// A node with a same-parent left sibling folds into it; a first
    /// child among several absorbs its right sibling instead, so the
    /// separator erased above belongs to the parent at hand and routing
    /// stays exact. An only child folds into its chain predecessor
    /// across the parent boundary; that leaves the parent empty, and an
    /// empty node's own merge never fails, so the stale separator above
    /// it is gone before the operation returns.
    ///
    /// Returns the parent index to erase, or `None` when no merge was
    /// possible (the node stays underfull, which is tolerated).
    fn merge_node<W: FixedCodec + Clone>(
        store: &PageStore,
        mut node: PageRef<'_, Node<K, W>>,
        slot: usize,
        parent_len: usize,
    ) -> Result<Option<usize>> {
        if slot > 0 || (parent_len == 1 && node.prev_id != INVALID_PAGE_ID) {
            debug_assert!(node.prev_id != INVALID_PAGE_ID);
            let mut prev: PageRef<'_, Node<K, W>> = PageRef::load(store, node.prev_id)?;
            if prev.len() + node.len() >= Node::<K, W>::SIZE_MAX - 1 {
                return Ok(None);
            }
            if node.next_id != INVALID_PAGE_ID {
                let mut next: PageRef<'_, Node<K, W>> = PageRef::load(store, node.next_id)?;
                next.prev_id = prev.page_id();
            }
            prev.absorb(&mut node);
            store.delete_page(node.page_id());
            node.discard();
            Ok(Some(slot))
        } else if parent_len >= 2 && node.next_id != INVALID_PAGE_ID {
            let mut next: PageRef<'_, Node<K, W>> = PageRef::load(store, node.next_id)?;
            if node.len() + next.len() >= Node::<K, W>::SIZE_MAX - 1 {
                return Ok(None);
            }
            if next.next_id != INVALID_PAGE_ID {
                let mut after: PageRef<'_, Node<K, W>> = PageRef::load(store, next.next_id)?;
                after.prev_id = node.page_id();
            }
            node.absorb(&mut next);
            store.delete_page(next.page_id());
            next.discard();
            Ok(Some(slot + 1))
        } else {
            Ok(None)
        }
    }

    /// Walks from the root to the leaf responsible for `key`, recording
    /// the unsafe suffix of parents for structural operations.
    #[allow(clippy::type_complexity)]
    fn descend<'s>(
        store: &'s PageStore,
        root: PageId,
        layer: u32,
        key: &K,
        access: Access,
    ) -> Result<(
        LeafRef<'s, K, V>,
        Option<usize>,
        Vec<(InnerRef<'s, K>, usize)>,
    )> {
        let mut parents: Vec<(InnerRef<'s, K>, usize)> = Vec::new();
        let mut next_id = root;

        for _ in 0..=layer {
            let inner: InnerRef<'s, K> = PageRef::load(store, next_id)?;
            let slot = inner.search(key).unwrap_or(0);
            next_id = inner.entries[slot].1;

            match access {
                Access::Find => {}
                Access::Insert => {
                    if inner.is_upper_safe() {
                        parents.clear();
                    }
                    parents.push((inner, slot));
                }
                Access::Erase => {
                    if inner.is_lower_safe() {
                        parents.clear();
                    }
                    parents.push((inner, slot));
                }
            }
        }

        let leaf: LeafRef<'s, K, V> = PageRef::load(store, next_id)?;
        let leaf_safe = match access {
            Access::Find => false,
            Access::Insert => leaf.is_upper_safe(),
            Access::Erase => leaf.is_lower_safe(),
        };
        if leaf_safe {
            parents.clear();
        }

        let slot = leaf.search(key);
        Ok((leaf, slot, parents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raildb_common::FixedStr;
    use rand::seq::SliceRandom;
    use tempfile::tempdir;

    type SmallTree = BPlusTree<u64, u64>;
    // A fat key shrinks SIZE_MAX to 8 at every level, so splits, merges
    // and root growth trigger after a handful of entries.
    type FatKey = FixedStr<496>;
    type FatTree = BPlusTree<FatKey, u64>;

    fn fat(k: u64) -> FatKey {
        FixedStr::new(&format!("{:010}", k))
    }

    fn open_small(dir: &std::path::Path) -> SmallTree {
        let meta = MetaFile::open(dir.join("meta.bin")).unwrap();
        SmallTree::open(dir.join("tree.dat"), false, &meta).unwrap()
    }

    fn open_fat(dir: &std::path::Path) -> FatTree {
        let meta = MetaFile::open(dir.join("meta.bin")).unwrap();
        FatTree::open(dir.join("tree.dat"), false, &meta).unwrap()
    }

    #[test]
    fn test_fat_tree_geometry() {
        assert_eq!(Node::<FatKey, u64>::SIZE_MAX, 8);
        assert_eq!(Node::<FatKey, u64>::SPLIT_T, 5);
        assert_eq!(Node::<FatKey, u64>::MERGE_T, 1);
        assert_eq!(Node::<FatKey, PageId>::SIZE_MAX, 8);
    }

    #[test]
    fn test_insert_find_small() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(dir.path());

        assert_eq!(tree.find(&42).unwrap(), None);
        tree.insert(42, 420).unwrap();
        tree.insert(7, 70).unwrap();
        assert_eq!(tree.find(&42).unwrap(), Some(420));
        assert_eq!(tree.find(&7).unwrap(), Some(70));
        assert_eq!(tree.find(&8).unwrap(), None);
    }

    #[test]
    fn test_insert_overwrites_existing() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(dir.path());
        tree.insert(1, 10).unwrap();
        tree.insert(1, 11).unwrap();
        assert_eq!(tree.find(&1).unwrap(), Some(11));
    }

    #[test]
    fn test_erase() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(dir.path());
        tree.insert(1, 10).unwrap();
        assert!(tree.erase(&1).unwrap());
        assert!(!tree.erase(&1).unwrap());
        assert_eq!(tree.find(&1).unwrap(), None);
    }

    #[test]
    fn test_modify_in_place() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(dir.path());
        tree.insert(5, 100).unwrap();
        assert!(tree.modify(&5, |v| *v -= 30).unwrap());
        assert_eq!(tree.find(&5).unwrap(), Some(70));
        assert!(!tree.modify(&6, |v| *v += 1).unwrap());
    }

    #[test]
    fn test_range_find_and_modify() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(dir.path());
        for k in [10u64, 20, 30, 40, 50] {
            tree.insert(k, k).unwrap();
        }

        let hits = tree.range_find(&15, &45).unwrap();
        assert_eq!(hits, vec![(20, 20), (30, 30), (40, 40)]);

        tree.range_modify(&20, &40, |v| *v += 1).unwrap();
        assert_eq!(tree.find(&30).unwrap(), Some(31));
        assert_eq!(tree.find(&50).unwrap(), Some(50));
    }

    #[test]
    fn test_splits_grow_layers() {
        let dir = tempdir().unwrap();
        let mut tree = open_fat(dir.path());

        assert_eq!(tree.layer(), 0);
        for k in 1..=200u64 {
            tree.insert(fat(k), k).unwrap();
        }
        assert!(tree.layer() >= 2, "tree should have grown taller");
        for k in 1..=200u64 {
            assert_eq!(tree.find(&fat(k)).unwrap(), Some(k), "lost key {}", k);
        }

        let scanned = tree.range_find(&fat(1), &fat(200)).unwrap();
        let values: Vec<u64> = scanned.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, (1..=200).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_then_erase_returns_to_initial_height() {
        let dir = tempdir().unwrap();
        let mut tree = open_fat(dir.path());

        let n = 10 * Node::<FatKey, u64>::SIZE_MAX as u64;
        for k in 1..=n {
            tree.insert(fat(k), k).unwrap();
        }
        let scanned = tree.range_find(&fat(1), &fat(n)).unwrap();
        assert_eq!(scanned.len(), n as usize);
        assert!(scanned.windows(2).all(|w| w[0].0 < w[1].0));

        for k in (1..=n).rev() {
            assert!(tree.erase(&fat(k)).unwrap());
        }
        assert_eq!(tree.layer(), 0);
        assert!(tree.range_find(&fat(1), &fat(n)).unwrap().is_empty());
    }

    #[test]
    fn test_random_order_stress() {
        let dir = tempdir().unwrap();
        let mut tree = open_fat(dir.path());

        let n = 40 * Node::<FatKey, u64>::SIZE_MAX as u64;
        let mut keys: Vec<u64> = (1..=n).collect();
        keys.shuffle(&mut rand::thread_rng());

        for &k in &keys {
            tree.insert(fat(k), k * 2).unwrap();
        }
        let scanned = tree.range_find(&fat(1), &fat(n)).unwrap();
        assert_eq!(scanned.len(), n as usize);
        for (i, (_, v)) in scanned.iter().enumerate() {
            assert_eq!(*v, (i as u64 + 1) * 2);
        }

        keys.shuffle(&mut rand::thread_rng());
        for (done, &k) in keys.iter().enumerate() {
            assert!(tree.erase(&fat(k)).unwrap(), "erase lost key {}", k);
            // Spot-check that everything not yet erased stays findable.
            if done % 37 == 0 {
                for &probe in &keys[done + 1..] {
                    assert_eq!(
                        tree.find(&fat(probe)).unwrap(),
                        Some(probe * 2),
                        "key {} unreachable after {} erases",
                        probe,
                        done + 1
                    );
                }
            }
        }
        assert!(tree.range_find(&fat(1), &fat(n)).unwrap().is_empty());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut tree = open_fat(dir.path());
            for k in 1..=100u64 {
                tree.insert(fat(k), k).unwrap();
            }
        }
        {
            let tree = open_fat(dir.path());
            assert!(tree.layer() >= 1);
            for k in 1..=100u64 {
                assert_eq!(tree.find(&fat(k)).unwrap(), Some(k));
            }
        }
    }

    #[test]
    fn test_clear_resets_tree() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(dir.path());
        for k in 1..=500u64 {
            tree.insert(k, k).unwrap();
        }
        tree.clear().unwrap();
        assert_eq!(tree.layer(), 0);
        assert_eq!(tree.find(&1).unwrap(), None);
        assert!(tree.range_find(&1, &500).unwrap().is_empty());

        // clear twice behaves like clear once
        tree.clear().unwrap();
        assert_eq!(tree.find(&1).unwrap(), None);

        tree.insert(3, 33).unwrap();
        assert_eq!(tree.find(&3).unwrap(), Some(33));
    }

    #[test]
    fn test_sentinel_does_not_leak_into_scans() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(dir.path());
        tree.insert(10, 1).unwrap();
        let all = tree.range_find(&1, &u64::MAX).unwrap();
        assert_eq!(all, vec![(10, 1)]);
    }
}
