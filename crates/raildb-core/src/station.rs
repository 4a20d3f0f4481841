//! Station dictionary: name to dense id interning.
//!
//! Station names appear in every train route; the rest of the system
//! works on dense integer ids instead. The dictionary is held in memory
//! and written to a flat file on clean exit: `next_id: u32`,
//! `count: u64`, then per name `len: u64` + bytes, little-endian.

use bytes::{Buf, BufMut, BytesMut};
use raildb_common::{djb2, RailError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Dense station id; ids are assigned in first-occurrence order and
/// never reused.
pub type StationId = u32;

/// Bidirectional station-name mapping.
pub struct StationDir {
    path: PathBuf,
    name_to_id: HashMap<u64, StationId>,
    id_to_name: Vec<String>,
    next_id: StationId,
}

impl StationDir {
    /// Loads the dictionary from `path`, or starts empty when the file
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut dir = Self {
            path,
            name_to_id: HashMap::new(),
            id_to_name: Vec::new(),
            next_id: 0,
        };

        let raw = match fs::read(&dir.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(dir),
            Err(err) => return Err(err.into()),
        };

        let mut buf = &raw[..];
        if buf.remaining() < 12 {
            return Err(RailError::StationCorrupted(
                "dictionary file shorter than its header".to_string(),
            ));
        }
        dir.next_id = buf.get_u32_le();
        let count = buf.get_u64_le() as usize;

        for id in 0..count {
            if buf.remaining() < 8 {
                return Err(RailError::StationCorrupted(format!(
                    "truncated length for station {}",
                    id
                )));
            }
            let len = buf.get_u64_le() as usize;
            if buf.remaining() < len {
                return Err(RailError::StationCorrupted(format!(
                    "truncated name for station {}",
                    id
                )));
            }
            let name = String::from_utf8(buf.copy_to_bytes(len).to_vec()).map_err(|_| {
                RailError::StationCorrupted(format!("station {} name is not UTF-8", id))
            })?;
            dir.name_to_id.insert(djb2(name.as_bytes()), id as StationId);
            dir.id_to_name.push(name);
        }

        log::debug!("loaded {} stations from {:?}", count, dir.path);
        Ok(dir)
    }

    /// Writes the dictionary to its file.
    pub fn save(&self) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.next_id);
        buf.put_u64_le(self.id_to_name.len() as u64);
        for name in &self.id_to_name {
            buf.put_u64_le(name.len() as u64);
            buf.put_slice(name.as_bytes());
        }
        fs::write(&self.path, &buf)?;
        Ok(())
    }

    /// Returns the id for `name`, assigning the next dense id on first
    /// occurrence.
    pub fn intern(&mut self, name: &str) -> StationId {
        let hash = djb2(name.as_bytes());
        if let Some(&id) = self.name_to_id.get(&hash) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.name_to_id.insert(hash, id);
        self.id_to_name.push(name.to_string());
        id
    }

    /// Returns the id for `name` without interning.
    pub fn lookup(&self, name: &str) -> Option<StationId> {
        self.name_to_id.get(&djb2(name.as_bytes())).copied()
    }

    /// Returns the name for `id`.
    pub fn name(&self, id: StationId) -> Option<&str> {
        self.id_to_name.get(id as usize).map(String::as_str)
    }

    /// Number of interned stations.
    pub fn len(&self) -> usize {
        self.id_to_name.len()
    }

    /// Returns true when no station has been interned.
    pub fn is_empty(&self) -> bool {
        self.id_to_name.is_empty()
    }

    /// Forgets every station and rewrites the file.
    pub fn clear(&mut self) -> Result<()> {
        self.name_to_id.clear();
        self.id_to_name.clear();
        self.next_id = 0;
        self.save()
    }
}
