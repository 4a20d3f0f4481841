//! Train catalog: master records, schedule arithmetic, segment index.

use crate::station::{StationDir, StationId};
use raildb_common::{djb2, DateTime, FixedCodec, FixedStr, Result};
use raildb_storage::{HashedMap, HashedMultiMap, MetaFile};
use std::path::Path;

/// Route length cap. The master record is a B+ tree value and must fit
/// a page alongside its key.
pub const MAX_STATIONS: usize = 25;

/// Identifier length cap for train ids.
pub const TRAIN_ID_LEN: usize = 20;

/// One train's master record. Immutable once `released` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainRecord {
    pub train_id: FixedStr<TRAIN_ID_LEN>,
    pub train_hash: u64,
    pub station_count: u16,
    pub seat_capacity: i32,
    /// Daily departure from the origin, minutes into the day.
    pub start_time: i32,
    /// Inclusive origin-departure sale window.
    pub sale_start: DateTime,
    pub sale_end: DateTime,
    pub train_type: u8,
    pub released: bool,
    /// Dense station id per stop.
    pub stations: [StationId; MAX_STATIONS],
    /// Fare of edge `i -> i+1`.
    pub prices: [i32; MAX_STATIONS - 1],
    /// Running minutes of edge `i -> i+1`.
    pub travel_times: [i32; MAX_STATIONS - 1],
    /// Stop minutes at intermediate station `i + 1`.
    pub stopover_times: [i32; MAX_STATIONS - 2],
}

impl Default for TrainRecord {
    fn default() -> Self {
        Self {
            train_id: FixedStr::default(),
            train_hash: 0,
            station_count: 0,
            seat_capacity: 0,
            start_time: 0,
            sale_start: DateTime::default(),
            sale_end: DateTime::default(),
            train_type: 0,
            released: false,
            stations: [0; MAX_STATIONS],
            prices: [0; MAX_STATIONS - 1],
            travel_times: [0; MAX_STATIONS - 1],
            stopover_times: [0; MAX_STATIONS - 2],
        }
    }
}

impl TrainRecord {
    /// Position of `station` along the route.
    pub fn station_index(&self, station: StationId) -> Option<u16> {
        self.stations[..self.station_count as usize]
            .iter()
            .position(|&s| s == station)
            .map(|i| i as u16)
    }

    /// Positions of an ordered station pair; `None` unless both stations
    /// are on the route with the origin side first.
    pub fn segment_indices(&self, from: StationId, to: StationId) -> Option<(u16, u16)> {
        let from_idx = self.station_index(from)?;
        let to_idx = self.station_index(to)?;
        (from_idx < to_idx).then_some((from_idx, to_idx))
    }

    /// Minutes from origin-date midnight to arrival at stop `idx`.
    pub fn arrive_offset(&self, idx: u16) -> i32 {
        debug_assert!(idx >= 1 && idx < self.station_count);
        let idx = idx as usize;
        let travelled: i32 = self.travel_times[..idx].iter().sum();
        let stopped: i32 = self.stopover_times[..idx - 1].iter().sum();
        self.start_time + travelled + stopped
    }

    /// Minutes from origin-date midnight to departure from stop `idx`.
    pub fn leave_offset(&self, idx: u16) -> i32 {
        if idx == 0 {
            self.start_time
        } else if idx + 1 < self.station_count {
            self.arrive_offset(idx) + self.stopover_times[idx as usize - 1]
        } else {
            self.arrive_offset(idx)
        }
    }

    /// Fare over `[from_idx, to_idx)`.
    pub fn price_between(&self, from_idx: u16, to_idx: u16) -> i32 {
        self.prices[from_idx as usize..to_idx as usize].iter().sum()
    }

    /// Riding time from departure at `from_idx` to arrival at `to_idx`.
    /// Depends only on the schedule, not on the date.
    pub fn duration_between(&self, from_idx: u16, to_idx: u16) -> i32 {
        self.arrive_offset(to_idx) - self.leave_offset(from_idx)
    }

    /// Origin-departure date whose departure from `from_idx` is the
    /// earliest at or after `min_depart`.
    pub fn origin_date_for(&self, from_idx: u16, min_depart: DateTime) -> DateTime {
        (min_depart - self.leave_offset(from_idx)).round_up_to_date()
    }

    /// Whether `date` is a sellable origin-departure date.
    pub fn sale_covers(&self, date: DateTime) -> bool {
        date.is_valid() && self.sale_start <= date && date <= self.sale_end
    }

    /// Snaps a candidate origin date up into the sale window, or `None`
    /// when the window has already closed.
    pub fn snap_to_sale(&self, date: DateTime) -> Option<DateTime> {
        if date > self.sale_end {
            None
        } else {
            Some(date.max(self.sale_start))
        }
    }
}

impl FixedCodec for TrainRecord {
    const ENCODED_LEN: usize = 48 + 4 * MAX_STATIONS + 4 * (MAX_STATIONS - 1) * 2
        + 4 * (MAX_STATIONS - 2);

    fn encode_into(&self, buf: &mut [u8]) {
        self.train_id.encode_into(&mut buf[0..20]);
        self.train_hash.encode_into(&mut buf[20..28]);
        self.station_count.encode_into(&mut buf[28..30]);
        self.seat_capacity.encode_into(&mut buf[30..34]);
        self.start_time.encode_into(&mut buf[34..38]);
        self.sale_start.encode_into(&mut buf[38..42]);
        self.sale_end.encode_into(&mut buf[42..46]);
        buf[46] = self.train_type;
        buf[47] = u8::from(self.released);

        let mut at = 48;
        for station in &self.stations {
            station.encode_into(&mut buf[at..at + 4]);
            at += 4;
        }
        for price in &self.prices {
            price.encode_into(&mut buf[at..at + 4]);
            at += 4;
        }
        for travel in &self.travel_times {
            travel.encode_into(&mut buf[at..at + 4]);
            at += 4;
        }
        for stopover in &self.stopover_times {
            stopover.encode_into(&mut buf[at..at + 4]);
            at += 4;
        }
    }

    fn decode_from(buf: &[u8]) -> Self {
        let mut record = Self {
            train_id: FixedStr::decode_from(&buf[0..20]),
            train_hash: u64::decode_from(&buf[20..28]),
            station_count: u16::decode_from(&buf[28..30]),
            seat_capacity: i32::decode_from(&buf[30..34]),
            start_time: i32::decode_from(&buf[34..38]),
            sale_start: DateTime::decode_from(&buf[38..42]),
            sale_end: DateTime::decode_from(&buf[42..46]),
            train_type: buf[46],
            released: buf[47] != 0,
            ..Default::default()
        };

        let mut at = 48;
        for station in &mut record.stations {
            *station = StationId::decode_from(&buf[at..at + 4]);
            at += 4;
        }
        for price in &mut record.prices {
            *price = i32::decode_from(&buf[at..at + 4]);
            at += 4;
        }
        for travel in &mut record.travel_times {
            *travel = i32::decode_from(&buf[at..at + 4]);
            at += 4;
        }
        for stopover in &mut record.stopover_times {
            *stopover = i32::decode_from(&buf[at..at + 4]);
            at += 4;
        }
        record
    }
}

/// Segment index entry: a released train crossing one station pair,
/// with the pair's positions along its route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegEntry {
    pub train_hash: u64,
    pub from_idx: u16,
    pub to_idx: u16,
}

impl FixedCodec for SegEntry {
    const ENCODED_LEN: usize = 12;

    fn encode_into(&self, buf: &mut [u8]) {
        self.train_hash.encode_into(&mut buf[0..8]);
        self.from_idx.encode_into(&mut buf[8..10]);
        self.to_idx.encode_into(&mut buf[10..12]);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self {
            train_hash: u64::decode_from(&buf[0..8]),
            from_idx: u16::decode_from(&buf[8..10]),
            to_idx: u16::decode_from(&buf[10..12]),
        }
    }
}

/// Key of a station pair in the segment index.
pub fn seg_key(from: StationId, to: StationId) -> u64 {
    (u64::from(from) << 32) | u64::from(to)
}

/// Raw `add_train` arguments as they arrive from the command stream.
pub struct AddTrainArgs<'a> {
    pub train_id: &'a str,
    pub station_count: &'a str,
    pub seat_count: &'a str,
    pub stations: &'a str,
    pub prices: &'a str,
    pub start_time: &'a str,
    pub travel_times: &'a str,
    pub stopover_times: &'a str,
    pub sale_dates: &'a str,
    pub train_type: &'a str,
}

fn parse_pipe_ints(raw: &str, expect: usize) -> Option<Vec<i32>> {
    let parts: Vec<&str> = raw.split('|').collect();
    if parts.len() != expect {
        return None;
    }
    parts.iter().map(|p| p.parse().ok()).collect()
}

/// Builds a master record from raw arguments, interning station names.
/// Returns `None` on malformed input.
pub fn parse_add_train(stations: &mut StationDir, args: &AddTrainArgs<'_>) -> Option<TrainRecord> {
    let count: usize = args.station_count.parse().ok()?;
    if !(2..=MAX_STATIONS).contains(&count) {
        return None;
    }
    let capacity: i32 = args.seat_count.parse().ok()?;
    if capacity <= 0 {
        return None;
    }

    let names: Vec<&str> = args.stations.split('|').collect();
    if names.len() != count {
        return None;
    }

    let prices = parse_pipe_ints(args.prices, count - 1)?;
    let travels = parse_pipe_ints(args.travel_times, count - 1)?;
    let stopovers = if count == 2 {
        if args.stopover_times != "_" {
            return None;
        }
        Vec::new()
    } else {
        parse_pipe_ints(args.stopover_times, count - 2)?
    };

    let start_time = raildb_common::time::minutes_in_day_from_time(args.start_time)?;

    let (sale_start_raw, sale_end_raw) = args.sale_dates.split_once('|')?;
    let sale_start = DateTime::from_date(sale_start_raw)?;
    let sale_end = DateTime::from_date(sale_end_raw)?;
    if sale_end < sale_start {
        return None;
    }

    let mut type_chars = args.train_type.bytes();
    let train_type = type_chars.next()?;
    if type_chars.next().is_some() {
        return None;
    }

    let mut record = TrainRecord {
        train_id: FixedStr::new(args.train_id),
        train_hash: djb2(args.train_id.as_bytes()),
        station_count: count as u16,
        seat_capacity: capacity,
        start_time,
        sale_start,
        sale_end,
        train_type,
        released: false,
        ..Default::default()
    };
    for (i, name) in names.iter().enumerate() {
        record.stations[i] = stations.intern(name);
    }
    record.prices[..count - 1].copy_from_slice(&prices);
    record.travel_times[..count - 1].copy_from_slice(&travels);
    record.stopover_times[..stopovers.len()].copy_from_slice(&stopovers);
    Some(record)
}

/// The train catalog: master records plus the station-pair index that
/// released trains are published into.
pub struct TrainCatalog {
    trains: HashedMap<TrainRecord>,
    segments: HashedMultiMap<SegEntry>,
}

impl TrainCatalog {
    /// Opens the catalog's two trees inside `dir`.
    pub fn open(dir: &Path, fsync_enabled: bool, meta: &MetaFile) -> Result<Self> {
        Ok(Self {
            trains: HashedMap::open(dir.join("trains.dat"), fsync_enabled, meta)?,
            segments: HashedMultiMap::open(dir.join("segments.dat"), fsync_enabled, meta)?,
        })
    }

    /// Stores a new train. Fails on duplicate id or malformed input.
    pub fn add_train(
        &mut self,
        stations: &mut StationDir,
        args: &AddTrainArgs<'_>,
    ) -> Result<bool> {
        if self.trains.find(args.train_id)?.is_some() {
            return Ok(false);
        }
        let Some(record) = parse_add_train(stations, args) else {
            return Ok(false);
        };
        self.trains.insert(args.train_id, record)?;
        Ok(true)
    }

    /// Removes a train; only legal before release.
    pub fn delete_train(&mut self, train_id: &str) -> Result<bool> {
        match self.trains.find(train_id)? {
            Some(record) if !record.released => self.trains.erase(train_id),
            _ => Ok(false),
        }
    }

    /// Publishes a train: every ordered pair of its stops goes into the
    /// segment index, then the record is frozen.
    pub fn release_train(&mut self, train_id: &str) -> Result<bool> {
        let Some(record) = self.trains.find(train_id)? else {
            return Ok(false);
        };
        if record.released {
            return Ok(false);
        }

        let count = record.station_count as usize;
        for i in 0..count {
            for j in i + 1..count {
                self.segments.insert(
                    seg_key(record.stations[i], record.stations[j]),
                    SegEntry {
                        train_hash: record.train_hash,
                        from_idx: i as u16,
                        to_idx: j as u16,
                    },
                )?;
            }
        }
        self.trains
            .modify_by_hash(record.train_hash, |train| train.released = true)?;
        Ok(true)
    }

    /// Master record by train id.
    pub fn find(&self, train_id: &str) -> Result<Option<TrainRecord>> {
        self.trains.find(train_id)
    }

    /// Master record by id hash.
    pub fn find_by_hash(&self, hash: u64) -> Result<Option<TrainRecord>> {
        self.trains.find_by_hash(hash)
    }

    /// Released trains serving the ordered pair `(from, to)`.
    pub fn released_on_segment(
        &self,
        from: StationId,
        to: StationId,
    ) -> Result<Vec<(TrainRecord, SegEntry)>> {
        let mut out = Vec::new();
        for entry in self.segments.find(seg_key(from, to))? {
            if let Some(record) = self.trains.find_by_hash(entry.train_hash)? {
                if record.released {
                    out.push((record, entry));
                }
            }
        }
        Ok(out)
    }

    /// Drops every train and segment entry.
    pub fn clear(&mut self) -> Result<()> {
        self.trains.clear()?;
        self.segments.clear()
    }

    /// Flushes both trees.
    pub fn flush(&self) -> Result<()> {
        self.trains.flush()?;
        self.segments.flush()
    }
}
