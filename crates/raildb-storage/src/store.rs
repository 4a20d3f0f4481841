//! Page store: fixed-size page I/O over a single file.

use parking_lot::Mutex;
use raildb_common::{PageId, RailError, Result, INVALID_PAGE_ID, PAGE_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Manages reading and writing fixed-size pages in one file.
///
/// Page 0 holds the store header (the `next_page_id` allocation cursor);
/// data pages start at id 1. Ids are strictly increasing and never
/// recycled: `delete_page` is a no-op and freed pages simply become
/// unreachable.
pub struct PageStore {
    path: PathBuf,
    fsync_enabled: bool,
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    file: File,
    next_page_id: PageId,
}

impl PageStore {
    /// Opens or creates a page store at `path`.
    ///
    /// An existing file restores its allocation cursor from page 0; a
    /// fresh file starts allocating at page 1.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let next_page_id = if file.metadata()?.len() >= PAGE_SIZE as u64 {
            file.seek(SeekFrom::Start(0))?;
            let mut raw = [0u8; 4];
            file.read_exact(&mut raw)?;
            PageId::from_le_bytes(raw).max(1)
        } else {
            1
        };

        log::debug!(
            "opened page store {:?}, next_page_id = {}",
            path,
            next_page_id
        );

        Ok(Self {
            path,
            fsync_enabled,
            inner: Mutex::new(StoreInner { file, next_page_id }),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allocates a new page id. The page itself is materialized by the
    /// first write.
    pub fn new_page(&self) -> PageId {
        let mut inner = self.inner.lock();
        let id = inner.next_page_id;
        inner.next_page_id += 1;
        id
    }

    /// Reads page `id` into a fresh buffer.
    pub fn read_page(&self, id: PageId) -> Result<Box<[u8; PAGE_SIZE]>> {
        if id == INVALID_PAGE_ID {
            return Err(RailError::InvalidPageId(id));
        }
        let mut inner = self.inner.lock();
        inner
            .file
            .seek(SeekFrom::Start(u64::from(id) * PAGE_SIZE as u64))?;

        let mut buffer = Box::new([0u8; PAGE_SIZE]);
        let mut got = 0;
        while got < PAGE_SIZE {
            match inner.file.read(&mut buffer[got..])? {
                0 => {
                    return Err(RailError::ShortRead {
                        page_id: id,
                        got,
                        expected: PAGE_SIZE,
                    })
                }
                n => got += n,
            }
        }
        Ok(buffer)
    }

    /// Writes page `id` from `data`.
    pub fn write_page(&self, id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        if id == INVALID_PAGE_ID {
            return Err(RailError::InvalidPageId(id));
        }
        let mut inner = self.inner.lock();
        inner
            .file
            .seek(SeekFrom::Start(u64::from(id) * PAGE_SIZE as u64))?;
        inner.file.write_all(data)?;
        if self.fsync_enabled {
            inner.file.sync_data()?;
        }
        Ok(())
    }

    /// Logically frees a page. No-op: ids are not recycled.
    pub fn delete_page(&self, _id: PageId) {}

    /// Resets the allocation cursor. Previously written pages remain in
    /// the file but become unreachable.
    pub fn clear(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            inner.next_page_id = 1;
        }
        self.flush()
    }

    /// Persists the allocation cursor into page 0 and flushes the file.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut header = [0u8; PAGE_SIZE];
        header[..4].copy_from_slice(&inner.next_page_id.to_le_bytes());
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.write_all(&header)?;
        inner.file.flush()?;
        if self.fsync_enabled {
            inner.file.sync_data()?;
        }
        Ok(())
    }
}

impl Drop for PageStore {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            log::warn!("page store {:?} flush on drop failed: {}", self.path, err);
        }
    }
}
