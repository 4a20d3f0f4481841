//! Order log and waitlist.

use crate::station::StationId;
use raildb_common::{djb2, DateTime, FixedCodec, FixedStr, Result};
use raildb_storage::{BPlusTree, HashedMultiMap, MetaFile};
use std::path::Path;

/// Lifecycle of one order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderStatus {
    #[default]
    Success,
    Pending,
    Refunded,
}

impl OrderStatus {
    /// Bracketed tag used in `query_order` output.
    pub fn tag(self) -> &'static str {
        match self {
            OrderStatus::Success => "[success]",
            OrderStatus::Pending => "[pending]",
            OrderStatus::Refunded => "[refunded]",
        }
    }
}

impl FixedCodec for OrderStatus {
    const ENCODED_LEN: usize = 1;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0] = match self {
            OrderStatus::Success => b'S',
            OrderStatus::Pending => b'P',
            OrderStatus::Refunded => b'R',
        };
    }

    fn decode_from(buf: &[u8]) -> Self {
        match buf[0] {
            b'P' => OrderStatus::Pending,
            b'R' => OrderStatus::Refunded,
            _ => OrderStatus::Success,
        }
    }
}

/// One purchase, successful or queued. Append-only except for `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Order {
    pub command_ts: i64,
    pub status: OrderStatus,
    pub train_id: FixedStr<20>,
    pub train_hash: u64,
    pub from_station: StationId,
    pub to_station: StationId,
    pub from_idx: u16,
    pub to_idx: u16,
    pub origin_date: DateTime,
    pub leave_time: DateTime,
    pub arrive_time: DateTime,
    /// Per-ticket fare.
    pub price: i32,
    pub tickets: i32,
}

impl FixedCodec for Order {
    const ENCODED_LEN: usize = 69;

    fn encode_into(&self, buf: &mut [u8]) {
        self.command_ts.encode_into(&mut buf[0..8]);
        self.status.encode_into(&mut buf[8..9]);
        self.train_id.encode_into(&mut buf[9..29]);
        self.train_hash.encode_into(&mut buf[29..37]);
        self.from_station.encode_into(&mut buf[37..41]);
        self.to_station.encode_into(&mut buf[41..45]);
        self.from_idx.encode_into(&mut buf[45..47]);
        self.to_idx.encode_into(&mut buf[47..49]);
        self.origin_date.encode_into(&mut buf[49..53]);
        self.leave_time.encode_into(&mut buf[53..57]);
        self.arrive_time.encode_into(&mut buf[57..61]);
        self.price.encode_into(&mut buf[61..65]);
        self.tickets.encode_into(&mut buf[65..69]);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self {
            command_ts: i64::decode_from(&buf[0..8]),
            status: OrderStatus::decode_from(&buf[8..9]),
            train_id: FixedStr::decode_from(&buf[9..29]),
            train_hash: u64::decode_from(&buf[29..37]),
            from_station: StationId::decode_from(&buf[37..41]),
            to_station: StationId::decode_from(&buf[41..45]),
            from_idx: u16::decode_from(&buf[45..47]),
            to_idx: u16::decode_from(&buf[47..49]),
            origin_date: DateTime::decode_from(&buf[49..53]),
            leave_time: DateTime::decode_from(&buf[53..57]),
            arrive_time: DateTime::decode_from(&buf[57..61]),
            price: i32::decode_from(&buf[61..65]),
            tickets: i32::decode_from(&buf[65..69]),
        }
    }
}

/// Primary key of an order: owner hash plus the command timestamp that
/// created it (unique per user).
pub type OrderKey = (u64, i64);

/// Waitlist bucket: one train run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitKey {
    pub train_hash: u64,
    pub origin_date: DateTime,
}

impl WaitKey {
    /// Bucket hash for the waitlist multimap.
    pub fn hash(&self) -> u64 {
        let mut raw = [0u8; 12];
        self.train_hash.encode_into(&mut raw[0..8]);
        self.origin_date.encode_into(&mut raw[8..12]);
        djb2(&raw)
    }
}

/// One queued purchase awaiting seats. Ordered by `command_ts`, so a
/// bucket scan yields promotion order directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct WaitEntry {
    pub command_ts: i64,
    pub user_hash: u64,
    pub from_idx: u16,
    pub to_idx: u16,
    pub tickets: i32,
}

impl FixedCodec for WaitEntry {
    const ENCODED_LEN: usize = 24;

    fn encode_into(&self, buf: &mut [u8]) {
        self.command_ts.encode_into(&mut buf[0..8]);
        self.user_hash.encode_into(&mut buf[8..16]);
        self.from_idx.encode_into(&mut buf[16..18]);
        self.to_idx.encode_into(&mut buf[18..20]);
        self.tickets.encode_into(&mut buf[20..24]);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self {
            command_ts: i64::decode_from(&buf[0..8]),
            user_hash: u64::decode_from(&buf[8..16]),
            from_idx: u16::decode_from(&buf[16..18]),
            to_idx: u16::decode_from(&buf[18..20]),
            tickets: i32::decode_from(&buf[20..24]),
        }
    }
}

/// Per-user order log plus the per-run waitlist.
pub struct OrderStore {
    orders: BPlusTree<OrderKey, Order>,
    waitlist: HashedMultiMap<WaitEntry>,
}

impl OrderStore {
    /// Opens the store's two trees inside `dir`.
    pub fn open(dir: &Path, fsync_enabled: bool, meta: &MetaFile) -> Result<Self> {
        Ok(Self {
            orders: BPlusTree::open(dir.join("orders.dat"), fsync_enabled, meta)?,
            waitlist: HashedMultiMap::open(dir.join("waitlist.dat"), fsync_enabled, meta)?,
        })
    }

    /// Appends an order; a pending order also joins its run's waitlist.
    pub fn record(&mut self, user_hash: u64, order: Order) -> Result<()> {
        let entry = WaitEntry {
            command_ts: order.command_ts,
            user_hash,
            from_idx: order.from_idx,
            to_idx: order.to_idx,
            tickets: order.tickets,
        };
        let wait_key = WaitKey {
            train_hash: order.train_hash,
            origin_date: order.origin_date,
        };
        let pending = order.status == OrderStatus::Pending;

        self.orders.insert((user_hash, order.command_ts), order)?;
        if pending {
            self.waitlist.insert(wait_key.hash(), entry)?;
        }
        Ok(())
    }

    /// Every order of one user, ascending by command timestamp.
    pub fn orders_of(&self, user_hash: u64) -> Result<Vec<Order>> {
        let scanned = self
            .orders
            .range_find(&(user_hash, i64::MIN), &(user_hash, i64::MAX))?;
        Ok(scanned.into_iter().map(|(_, order)| order).collect())
    }

    /// The `n`-th most recent order of one user (1-based), counting
    /// refunded orders too.
    pub fn nth_newest(&self, user_hash: u64, n: usize) -> Result<Option<Order>> {
        let orders = self.orders_of(user_hash)?;
        if n == 0 || n > orders.len() {
            return Ok(None);
        }
        Ok(Some(orders[orders.len() - n].clone()))
    }

    /// Rewrites one order's status in place.
    pub fn set_status(&mut self, key: OrderKey, status: OrderStatus) -> Result<bool> {
        self.orders.modify(&key, |order| order.status = status)
    }

    /// Queued entries for one run, in promotion (timestamp) order.
    pub fn waitlist_for(&self, key: WaitKey) -> Result<Vec<WaitEntry>> {
        self.waitlist.find(key.hash())
    }

    /// Drops one waitlist entry (promotion or refund of a pending
    /// order).
    pub fn remove_from_waitlist(&mut self, key: WaitKey, entry: &WaitEntry) -> Result<bool> {
        self.waitlist.erase(key.hash(), entry)
    }

    /// Drops every order and waitlist entry.
    pub fn clear(&mut self) -> Result<()> {
        self.orders.clear()?;
        self.waitlist.clear()
    }

    /// Flushes both trees.
    pub fn flush(&self) -> Result<()> {
        self.orders.flush()?;
        self.waitlist.flush()
    }
}
