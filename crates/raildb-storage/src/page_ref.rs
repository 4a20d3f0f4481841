//! Typed page references with write-back-on-drop.

use crate::store::PageStore;
use raildb_common::{FixedCodec, PageId, Result, PAGE_SIZE};
use std::ops::{Deref, DerefMut};

/// An exclusive reference to the decoded record on one page.
///
/// Reading goes through `Deref`; any mutable access sets the dirty bit
/// and the record is encoded and written back when the reference drops.
/// References are move-only, and at most one reference to a given page
/// may be live at a time (operations are written to uphold this; the
/// store does not arbitrate).
pub struct PageRef<'s, T: FixedCodec> {
    store: &'s PageStore,
    page_id: PageId,
    record: T,
    dirty: bool,
}

impl<'s, T: FixedCodec> PageRef<'s, T> {
    /// Loads the record stored on page `page_id`.
    pub fn load(store: &'s PageStore, page_id: PageId) -> Result<Self> {
        debug_assert!(T::ENCODED_LEN <= PAGE_SIZE);
        let raw = store.read_page(page_id)?;
        Ok(Self {
            store,
            page_id,
            record: T::decode_from(&raw[..]),
            dirty: false,
        })
    }

    /// Writes `record` to page `page_id` and returns a clean reference
    /// to it.
    pub fn create(store: &'s PageStore, page_id: PageId, record: T) -> Result<Self> {
        let mut this = Self {
            store,
            page_id,
            record,
            dirty: false,
        };
        this.write_back()?;
        Ok(this)
    }

    /// The page this reference points at.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Encodes the record and writes it to its page.
    pub fn write_back(&mut self) -> Result<()> {
        let mut raw = [0u8; PAGE_SIZE];
        self.record.encode_into(&mut raw[..]);
        self.store.write_page(self.page_id, &raw)?;
        self.dirty = false;
        Ok(())
    }

    /// Drops the reference without writing back, even if dirty. Used
    /// when the page has been logically deleted.
    pub fn discard(mut self) {
        self.dirty = false;
    }
}

impl<T: FixedCodec> Deref for PageRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

impl<T: FixedCodec> DerefMut for PageRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.record
    }
}

impl<T: FixedCodec> Drop for PageRef<'_, T> {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(err) = self.write_back() {
                log::warn!("page {} write-back on drop failed: {}", self.page_id, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_then_load() {
        let dir = tempdir().unwrap();
        let store = PageStore::open(dir.path().join("pages.dat"), false).unwrap();
        let id = store.new_page();

        let page = PageRef::create(&store, id, 0xDEAD_BEEFu64).unwrap();
        drop(page);

        let page = PageRef::<u64>::load(&store, id).unwrap();
        assert_eq!(*page, 0xDEAD_BEEF);
    }

    #[test]
    fn test_mutation_writes_back_on_drop() {
        let dir = tempdir().unwrap();
        let store = PageStore::open(dir.path().join("pages.dat"), false).unwrap();
        let id = store.new_page();
        PageRef::create(&store, id, 1u64).unwrap();

        {
            let mut page = PageRef::<u64>::load(&store, id).unwrap();
            *page = 42;
        }

        assert_eq!(*PageRef::<u64>::load(&store, id).unwrap(), 42);
    }

    #[test]
    fn test_read_only_access_does_not_write() {
        let dir = tempdir().unwrap();
        let store = PageStore::open(dir.path().join("pages.dat"), false).unwrap();
        let id = store.new_page();
        PageRef::create(&store, id, 7u64).unwrap();

        {
            let page = PageRef::<u64>::load(&store, id).unwrap();
            assert_eq!(*page, 7);
            assert!(!page.dirty);
        }

        // Corrupting the in-file copy after a read-only drop is
        // observable: the clean ref must not have rewritten it.
        let mut raw = *store.read_page(id).unwrap();
        raw[0] = 9;
        store.write_page(id, &raw).unwrap();
        assert_eq!(*PageRef::<u64>::load(&store, id).unwrap(), 9);
    }

    #[test]
    fn test_discard_suppresses_write_back() {
        let dir = tempdir().unwrap();
        let store = PageStore::open(dir.path().join("pages.dat"), false).unwrap();
        let id = store.new_page();
        PageRef::create(&store, id, 5u64).unwrap();

        let mut page = PageRef::<u64>::load(&store, id).unwrap();
        *page = 99;
        page.discard();

        assert_eq!(*PageRef::<u64>::load(&store, id).unwrap(), 5);
    }
}
