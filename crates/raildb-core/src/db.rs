//! The database facade: owns every store and orchestrates the
//! reservation state machine.

use crate::order::{Order, OrderStatus, OrderStore, WaitEntry, WaitKey};
use crate::query::{self, SortPref};
use crate::seat::SeatEngine;
use crate::station::StationDir;
use crate::train::{AddTrainArgs, TrainCatalog, TrainRecord};
use crate::user::{ProfileUpdate, UserStore};
use raildb_common::{djb2, DateTime, RailError, Result, StorageConfig};
use raildb_storage::MetaFile;
use std::fs;

/// Result of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyOutcome {
    /// Seats reserved; carries the total price.
    Booked(i64),
    /// Not enough seats; the order joined the waitlist.
    Queued,
    /// Refused outright.
    Refused,
}

/// The whole reservation system behind one data directory.
pub struct RailDb {
    stations: StationDir,
    users: UserStore,
    catalog: TrainCatalog,
    seats: SeatEngine,
    orders: OrderStore,
}

impl RailDb {
    /// Opens (or creates) the database under `config.data_dir`.
    ///
    /// Construction order is load-bearing: each store registers meta
    /// slots in sequence, and the slab maps slots to offsets by
    /// registration order.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let meta = MetaFile::open(config.data_dir.join("meta.bin"))?;
        let dir = config.data_dir.as_path();
        let fsync = config.fsync_enabled;

        let db = Self {
            stations: StationDir::load(dir.join("stations.dat"))?,
            users: UserStore::open(dir, fsync, &meta)?,
            catalog: TrainCatalog::open(dir, fsync, &meta)?,
            seats: SeatEngine::open(dir, fsync, &meta)?,
            orders: OrderStore::open(dir, fsync, &meta)?,
        };
        log::debug!("database open at {:?}", dir);
        Ok(db)
    }

    // --- accounts ---

    pub fn add_user(
        &mut self,
        cur_username: &str,
        username: &str,
        password: &str,
        name: &str,
        mail_addr: &str,
        privilege: i32,
    ) -> Result<bool> {
        self.users
            .add_user(cur_username, username, password, name, mail_addr, privilege)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<bool> {
        self.users.login(username, password)
    }

    pub fn logout(&mut self, username: &str) -> bool {
        self.users.logout(username)
    }

    pub fn query_profile(&self, cur_username: &str, username: &str) -> Result<Option<String>> {
        self.users.query_profile(cur_username, username)
    }

    pub fn modify_profile(
        &mut self,
        cur_username: &str,
        username: &str,
        update: &ProfileUpdate<'_>,
    ) -> Result<Option<String>> {
        self.users.modify_profile(cur_username, username, update)
    }

    // --- catalog ---

    pub fn add_train(&mut self, args: &AddTrainArgs<'_>) -> Result<bool> {
        self.catalog.add_train(&mut self.stations, args)
    }

    pub fn delete_train(&mut self, train_id: &str) -> Result<bool> {
        self.catalog.delete_train(train_id)
    }

    pub fn release_train(&mut self, train_id: &str) -> Result<bool> {
        self.catalog.release_train(train_id)
    }

    pub fn query_train(&self, train_id: &str, date: &str) -> Result<String> {
        query::query_train(&self.catalog, &self.seats, &self.stations, train_id, date)
    }

    // --- search ---

    pub fn query_ticket(&self, from: &str, to: &str, date: &str, pref: SortPref) -> Result<String> {
        query::query_ticket(
            &self.catalog,
            &self.seats,
            &self.stations,
            from,
            to,
            date,
            pref,
        )
    }

    pub fn query_transfer(
        &self,
        from: &str,
        to: &str,
        date: &str,
        pref: SortPref,
    ) -> Result<String> {
        query::query_transfer(
            &self.catalog,
            &self.seats,
            &self.stations,
            from,
            to,
            date,
            pref,
        )
    }

    // --- reservations ---

    /// Attempts a purchase. `date` is the passenger's departure date at
    /// `from`, not necessarily the train's origin date.
    #[allow(clippy::too_many_arguments)]
    pub fn buy_ticket(
        &mut self,
        command_ts: i64,
        username: &str,
        train_id: &str,
        date: &str,
        tickets: i32,
        from: &str,
        to: &str,
        queue: bool,
    ) -> Result<BuyOutcome> {
        if !self.users.is_logged_in(username) || tickets <= 0 {
            return Ok(BuyOutcome::Refused);
        }
        let (Some(from_id), Some(to_id)) = (self.stations.lookup(from), self.stations.lookup(to))
        else {
            return Ok(BuyOutcome::Refused);
        };
        let Some(train) = self.catalog.find(train_id)? else {
            return Ok(BuyOutcome::Refused);
        };
        if !train.released {
            return Ok(BuyOutcome::Refused);
        }
        let Some((from_idx, to_idx)) = train.segment_indices(from_id, to_id) else {
            return Ok(BuyOutcome::Refused);
        };
        let Some(depart) = DateTime::from_date(date) else {
            return Ok(BuyOutcome::Refused);
        };
        let origin_date = train.origin_date_for(from_idx, depart);
        if !train.sale_covers(origin_date) {
            return Ok(BuyOutcome::Refused);
        }

        let available = self.seats.available(&train, origin_date, from_idx, to_idx)?;
        let price = train.price_between(from_idx, to_idx);
        let user_hash = djb2(username.as_bytes());
        let order = Order {
            command_ts,
            status: OrderStatus::Success,
            train_id: train.train_id,
            train_hash: train.train_hash,
            from_station: from_id,
            to_station: to_id,
            from_idx,
            to_idx,
            origin_date,
            leave_time: origin_date + train.leave_offset(from_idx),
            arrive_time: origin_date + train.arrive_offset(to_idx),
            price,
            tickets,
        };

        if available >= tickets {
            self.seats
                .reserve(&train, origin_date, from_idx, to_idx, tickets)?;
            self.orders.record(user_hash, order)?;
            Ok(BuyOutcome::Booked(i64::from(price) * i64::from(tickets)))
        } else if queue {
            if tickets > train.seat_capacity {
                return Ok(BuyOutcome::Refused);
            }
            self.orders.record(
                user_hash,
                Order {
                    status: OrderStatus::Pending,
                    ..order
                },
            )?;
            Ok(BuyOutcome::Queued)
        } else {
            Ok(BuyOutcome::Refused)
        }
    }

    /// Lists the user's orders, newest first. `None` when the user is
    /// not logged in.
    pub fn query_order(&self, username: &str) -> Result<Option<String>> {
        if !self.users.is_logged_in(username) {
            return Ok(None);
        }
        let orders = self.orders.orders_of(djb2(username.as_bytes()))?;
        let mut out = orders.len().to_string();
        for order in orders.iter().rev() {
            out.push('\n');
            out.push_str(&self.format_order(order)?);
        }
        Ok(Some(out))
    }

    /// Refunds the user's `n`-th most recent order (1-based). A refund
    /// of a successful order returns its seats and replays the run's
    /// waitlist.
    pub fn refund_ticket(&mut self, username: &str, n: usize) -> Result<bool> {
        if !self.users.is_logged_in(username) {
            return Ok(false);
        }
        let user_hash = djb2(username.as_bytes());
        let Some(order) = self.orders.nth_newest(user_hash, n)? else {
            return Ok(false);
        };
        if order.status == OrderStatus::Refunded {
            return Ok(false);
        }

        // Flip the status first; the seat release below must never run
        // twice for one order.
        let prior = order.status;
        if !self
            .orders
            .set_status((user_hash, order.command_ts), OrderStatus::Refunded)?
        {
            return Err(RailError::OrderCorrupted(format!(
                "order ({}, {}) vanished during refund",
                user_hash, order.command_ts
            )));
        }

        match prior {
            OrderStatus::Success => {
                let train = self.catalog.find_by_hash(order.train_hash)?.ok_or_else(|| {
                    RailError::OrderCorrupted(format!(
                        "order references unknown train {}",
                        order.train_id
                    ))
                })?;
                self.seats.release(
                    &train,
                    order.origin_date,
                    order.from_idx,
                    order.to_idx,
                    order.tickets,
                )?;
                self.promote_waitlist(&train, order.origin_date)?;
            }
            OrderStatus::Pending => {
                let key = WaitKey {
                    train_hash: order.train_hash,
                    origin_date: order.origin_date,
                };
                let entry = WaitEntry {
                    command_ts: order.command_ts,
                    user_hash,
                    from_idx: order.from_idx,
                    to_idx: order.to_idx,
                    tickets: order.tickets,
                };
                self.orders.remove_from_waitlist(key, &entry)?;
            }
            OrderStatus::Refunded => {}
        }
        Ok(true)
    }

    /// Replays one run's waitlist in timestamp order after seats came
    /// back. Entries that fit are promoted; entries that do not are
    /// skipped, not blocked on, so a later smaller request may succeed
    /// where an earlier larger one could not.
    fn promote_waitlist(&mut self, train: &TrainRecord, origin_date: DateTime) -> Result<()> {
        let key = WaitKey {
            train_hash: train.train_hash,
            origin_date,
        };
        for entry in self.orders.waitlist_for(key)? {
            let available =
                self.seats
                    .available(train, origin_date, entry.from_idx, entry.to_idx)?;
            if available < entry.tickets {
                continue;
            }
            self.seats
                .reserve(train, origin_date, entry.from_idx, entry.to_idx, entry.tickets)?;
            self.orders
                .set_status((entry.user_hash, entry.command_ts), OrderStatus::Success)?;
            self.orders.remove_from_waitlist(key, &entry)?;
        }
        Ok(())
    }

    // --- lifecycle ---

    /// Drops every record in every store.
    pub fn clean(&mut self) -> Result<()> {
        self.users.clear()?;
        self.catalog.clear()?;
        self.seats.clear()?;
        self.orders.clear()?;
        self.stations.clear()
    }

    /// Clean exit: closes sessions and persists everything that lives
    /// outside the page files.
    pub fn shutdown(&mut self) -> Result<()> {
        self.users.close_sessions();
        self.stations.save()?;
        self.users.flush()?;
        self.catalog.flush()?;
        self.seats.flush()?;
        self.orders.flush()
    }

    fn format_order(&self, order: &Order) -> Result<String> {
        let from = self.stations.name(order.from_station).ok_or_else(|| {
            RailError::OrderCorrupted(format!("bad station id {} in order", order.from_station))
        })?;
        let to = self.stations.name(order.to_station).ok_or_else(|| {
            RailError::OrderCorrupted(format!("bad station id {} in order", order.to_station))
        })?;
        Ok(format!(
            "{} {} {} {} -> {} {} {} {}",
            order.status.tag(),
            order.train_id,
            from,
            order.leave_time.full_string(),
            to,
            order.arrive_time.full_string(),
            order.price,
            order.tickets
        ))
    }
}
