//! Domain layer for RailDB.
//!
//! This crate provides:
//! - Station dictionary (name to dense id interning)
//! - Train catalog and segment index
//! - Seat inventory engine
//! - Order store and waitlist
//! - User accounts and the session table
//! - Reservation logic and the ticket/transfer query engine
//! - The `RailDb` facade that owns all of the above

pub mod db;
pub mod order;
pub mod query;
pub mod seat;
pub mod station;
pub mod train;
pub mod user;

pub use db::{BuyOutcome, RailDb};
pub use order::{Order, OrderStatus, WaitEntry, WaitKey};
pub use query::{SortPref, TicketInfo};
pub use seat::SeatKey;
pub use station::{StationDir, StationId};
pub use train::{SegEntry, TrainRecord, MAX_STATIONS};
pub use user::UserRecord;
