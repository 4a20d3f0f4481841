//! Seat inventory engine.
//!
//! Remaining seats are tracked per train, per origin-departure date,
//! per route edge. A cell exists only once a booking has touched its
//! edge; an absent cell means the edge still has full capacity. Most
//! trains sell over two hundred dates across dozens of edges, so cells
//! materialize lazily instead of being pre-allocated.

use crate::train::TrainRecord;
use raildb_common::{DateTime, FixedCodec, RailError, Result};
use raildb_storage::{BPlusTree, MetaFile};
use std::path::Path;

/// Key of one seat cell: the edge `seg -> seg + 1` of a train run.
///
/// Ordered by date first, then train, then edge, so one run's edges sit
/// in a contiguous key range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeatKey {
    pub date: DateTime,
    pub train_hash: u64,
    pub seg: u16,
}

impl FixedCodec for SeatKey {
    const ENCODED_LEN: usize = 14;

    fn encode_into(&self, buf: &mut [u8]) {
        self.date.encode_into(&mut buf[0..4]);
        self.train_hash.encode_into(&mut buf[4..12]);
        self.seg.encode_into(&mut buf[12..14]);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self {
            date: DateTime::decode_from(&buf[0..4]),
            train_hash: u64::decode_from(&buf[4..12]),
            seg: u16::decode_from(&buf[12..14]),
        }
    }
}

/// Per-date per-segment remaining-seat counts for every train.
pub struct SeatEngine {
    cells: BPlusTree<SeatKey, i32>,
}

impl SeatEngine {
    /// Opens the engine's tree inside `dir`.
    pub fn open(dir: &Path, fsync_enabled: bool, meta: &MetaFile) -> Result<Self> {
        Ok(Self {
            cells: BPlusTree::open(dir.join("seats.dat"), fsync_enabled, meta)?,
        })
    }

    fn range(train: &TrainRecord, date: DateTime, from_idx: u16, to_idx: u16) -> (SeatKey, SeatKey) {
        debug_assert!(from_idx < to_idx);
        (
            SeatKey {
                date,
                train_hash: train.train_hash,
                seg: from_idx,
            },
            SeatKey {
                date,
                train_hash: train.train_hash,
                seg: to_idx - 1,
            },
        )
    }

    /// Seats available over every edge of `[from_idx, to_idx)` on the
    /// run starting `date`. Unmaterialized edges count as full capacity.
    pub fn available(
        &self,
        train: &TrainRecord,
        date: DateTime,
        from_idx: u16,
        to_idx: u16,
    ) -> Result<i32> {
        let (lo, hi) = Self::range(train, date, from_idx, to_idx);
        let mut seats = train.seat_capacity;
        for (_, remaining) in self.cells.range_find(&lo, &hi)? {
            seats = seats.min(remaining);
        }
        Ok(seats)
    }

    /// Takes `tickets` seats from every edge of `[from_idx, to_idx)`,
    /// materializing any edge the range scan did not find.
    pub fn reserve(
        &mut self,
        train: &TrainRecord,
        date: DateTime,
        from_idx: u16,
        to_idx: u16,
        tickets: i32,
    ) -> Result<()> {
        let (lo, hi) = Self::range(train, date, from_idx, to_idx);

        let present = self.cells.range_find(&lo, &hi)?;
        let mut found = present.iter().map(|(key, _)| key.seg).peekable();
        for seg in from_idx..to_idx {
            if found.peek() == Some(&seg) {
                found.next();
            } else {
                self.cells.insert(
                    SeatKey {
                        date,
                        train_hash: train.train_hash,
                        seg,
                    },
                    train.seat_capacity,
                )?;
            }
        }

        self.cells
            .range_modify(&lo, &hi, |remaining| *remaining -= tickets)?;
        Ok(())
    }

    /// Returns `tickets` seats to every edge of `[from_idx, to_idx)`.
    ///
    /// Every edge must already be materialized (a refund follows a
    /// reservation) and no edge may exceed capacity; either violation
    /// means the inventory is corrupt.
    pub fn release(
        &mut self,
        train: &TrainRecord,
        date: DateTime,
        from_idx: u16,
        to_idx: u16,
        tickets: i32,
    ) -> Result<()> {
        let (lo, hi) = Self::range(train, date, from_idx, to_idx);
        let capacity = train.seat_capacity;

        let mut touched = 0u16;
        let mut overflow = false;
        self.cells.range_modify(&lo, &hi, |remaining| {
            *remaining += tickets;
            if *remaining > capacity {
                overflow = true;
            }
            touched += 1;
        })?;

        if overflow {
            return Err(RailError::SeatCorrupted(format!(
                "edge on train {} exceeds capacity {} after release",
                train.train_id, capacity
            )));
        }
        if touched != to_idx - from_idx {
            return Err(RailError::SeatCorrupted(format!(
                "release touched {} of {} edges on train {}",
                touched,
                to_idx - from_idx,
                train.train_id
            )));
        }
        Ok(())
    }

    /// Remaining seats per edge over the whole route of one run, with
    /// unmaterialized edges reported at capacity.
    pub fn per_edge(&self, train: &TrainRecord, date: DateTime) -> Result<Vec<i32>> {
        let edges = train.station_count as usize - 1;
        let mut seats = vec![train.seat_capacity; edges];
        let (lo, hi) = Self::range(train, date, 0, train.station_count - 1);
        for (key, remaining) in self.cells.range_find(&lo, &hi)? {
            seats[key.seg as usize] = remaining;
        }
        Ok(seats)
    }

    /// Drops every cell.
    pub fn clear(&mut self) -> Result<()> {
        self.cells.clear()
    }

    /// Flushes the backing tree.
    pub fn flush(&self) -> Result<()> {
        self.cells.flush()
    }
}
