//! Persistent counter slab.
//!
//! A handful of scalars must survive restart without deserving a tree of
//! their own: each B+ tree's root and layer, the first-user flag. They
//! live in one fixed-size file, with offsets handed out in registration
//! order at startup. Registration order therefore has to be identical on
//! every run; the database facade registers its slots in one fixed
//! sequence.

use parking_lot::Mutex;
use raildb_common::{FixedCodec, RailError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// Size of the counter slab in bytes.
pub const META_SLAB_SIZE: usize = 4096;

struct MetaInner {
    file: File,
    cursor: usize,
    fresh: bool,
}

/// The slab file. Cheap to clone; all clones share the handle.
#[derive(Clone)]
pub struct MetaFile {
    inner: Arc<Mutex<MetaInner>>,
}

impl MetaFile {
    /// Opens or creates the slab at `path`. A file that did not exist
    /// (or was empty) is fresh: slots registered against it keep their
    /// defaults instead of loading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;

        let fresh = file.metadata()?.len() == 0;
        if file.metadata()?.len() < META_SLAB_SIZE as u64 {
            file.set_len(META_SLAB_SIZE as u64)?;
        }
        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(MetaInner {
                file,
                cursor: 0,
                fresh,
            })),
        })
    }

    /// Registers the next slot, loading its persisted value unless the
    /// slab is fresh.
    pub fn slot<T: FixedCodec>(&self, default: T) -> Result<MetaSlot<T>> {
        let mut inner = self.inner.lock();
        let offset = inner.cursor;
        if offset + T::ENCODED_LEN > META_SLAB_SIZE {
            return Err(RailError::MetaSlabFull {
                offset,
                len: T::ENCODED_LEN,
            });
        }
        inner.cursor += T::ENCODED_LEN;

        let value = if inner.fresh {
            default
        } else {
            let mut raw = vec![0u8; T::ENCODED_LEN];
            inner.file.seek(SeekFrom::Start(offset as u64))?;
            inner.file.read_exact(&mut raw)?;
            T::decode_from(&raw)
        };

        Ok(MetaSlot {
            file: Arc::clone(&self.inner),
            offset,
            value,
        })
    }
}

/// One registered scalar in the slab. Writes go straight to the file.
pub struct MetaSlot<T: FixedCodec> {
    file: Arc<Mutex<MetaInner>>,
    offset: usize,
    value: T,
}

impl<T: FixedCodec + Clone> MetaSlot<T> {
    /// Current value.
    pub fn get(&self) -> T {
        self.value.clone()
    }

    /// Replaces the value and persists it immediately.
    pub fn set(&mut self, value: T) -> Result<()> {
        let mut raw = vec![0u8; T::ENCODED_LEN];
        value.encode_into(&mut raw);

        let mut inner = self.file.lock();
        inner.file.seek(SeekFrom::Start(self.offset as u64))?;
        inner.file.write_all(&raw)?;
        inner.file.flush()?;
        drop(inner);

        self.value = value;
        Ok(())
    }
}
