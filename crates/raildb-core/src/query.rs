//! Ticket and one-transfer search.

use crate::seat::SeatEngine;
use crate::station::{StationDir, StationId};
use crate::train::{SegEntry, TrainCatalog, TrainRecord};
use raildb_common::{DateTime, RailError, Result};

/// Result ordering for ticket queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPref {
    Time,
    Cost,
}

impl SortPref {
    /// Parses the `-p` flag; anything but `cost` means `time` (the
    /// command default).
    pub fn parse(raw: &str) -> Self {
        if raw == "cost" {
            SortPref::Cost
        } else {
            SortPref::Time
        }
    }
}

/// One purchasable ticket: a released train, a station pair, a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketInfo {
    pub train_id: String,
    pub from: String,
    pub leave: DateTime,
    pub to: String,
    pub arrive: DateTime,
    pub price: i32,
    pub seats: i32,
    pub duration: i32,
}

impl TicketInfo {
    /// Output row shared by `query_ticket` and `query_transfer`.
    pub fn line(&self) -> String {
        format!(
            "{} {} {} -> {} {} {} {}",
            self.train_id,
            self.from,
            self.leave.full_string(),
            self.to,
            self.arrive.full_string(),
            self.price,
            self.seats
        )
    }
}

fn station_name(stations: &StationDir, id: StationId) -> Result<String> {
    stations
        .name(id)
        .map(str::to_string)
        .ok_or_else(|| RailError::StationCorrupted(format!("no name for station id {}", id)))
}

/// Builds the ticket for one candidate train over one segment, or
/// `None` when no origin-departure date fits.
///
/// With `snap` unset the computed origin date must itself be sellable
/// (direct queries: the passenger named the departure date). With
/// `snap` set the date may move later into the sale window (transfer
/// leg two: any departure at or after the connection works).
fn ticket_for(
    seats: &SeatEngine,
    stations: &StationDir,
    train: &TrainRecord,
    seg: &SegEntry,
    min_depart: DateTime,
    snap: bool,
) -> Result<Option<TicketInfo>> {
    let candidate = train.origin_date_for(seg.from_idx, min_depart);
    let origin_date = if snap {
        match train.snap_to_sale(candidate) {
            Some(date) => date,
            None => return Ok(None),
        }
    } else {
        if !train.sale_covers(candidate) {
            return Ok(None);
        }
        candidate
    };

    Ok(Some(TicketInfo {
        train_id: train.train_id.as_str().to_string(),
        from: station_name(stations, train.stations[seg.from_idx as usize])?,
        leave: origin_date + train.leave_offset(seg.from_idx),
        to: station_name(stations, train.stations[seg.to_idx as usize])?,
        arrive: origin_date + train.arrive_offset(seg.to_idx),
        price: train.price_between(seg.from_idx, seg.to_idx),
        seats: seats.available(train, origin_date, seg.from_idx, seg.to_idx)?,
        duration: train.duration_between(seg.from_idx, seg.to_idx),
    }))
}

fn direct_tickets(
    catalog: &TrainCatalog,
    seats: &SeatEngine,
    stations: &StationDir,
    from: StationId,
    to: StationId,
    min_depart: DateTime,
    snap: bool,
) -> Result<Vec<TicketInfo>> {
    let mut tickets = Vec::new();
    for (train, seg) in catalog.released_on_segment(from, to)? {
        if let Some(ticket) = ticket_for(seats, stations, &train, &seg, min_depart, snap)? {
            tickets.push(ticket);
        }
    }
    Ok(tickets)
}

/// `query_ticket`: all direct trains for a station pair and date,
/// sorted by the requested preference with train id as tie-break.
pub fn query_ticket(
    catalog: &TrainCatalog,
    seats: &SeatEngine,
    stations: &StationDir,
    from: &str,
    to: &str,
    date: &str,
    pref: SortPref,
) -> Result<String> {
    let (Some(from_id), Some(to_id)) = (stations.lookup(from), stations.lookup(to)) else {
        return Ok("0".to_string());
    };
    let Some(depart) = DateTime::from_date(date) else {
        return Ok("0".to_string());
    };

    let mut tickets = direct_tickets(catalog, seats, stations, from_id, to_id, depart, false)?;
    match pref {
        SortPref::Time => {
            tickets.sort_by(|a, b| (a.duration, &a.train_id).cmp(&(b.duration, &b.train_id)))
        }
        SortPref::Cost => {
            tickets.sort_by(|a, b| (a.price, &a.train_id).cmp(&(b.price, &b.train_id)))
        }
    }

    let mut out = tickets.len().to_string();
    for ticket in &tickets {
        out.push('\n');
        out.push_str(&ticket.line());
    }
    Ok(out)
}

fn transfer_beats(
    pref: SortPref,
    challenger: (&TicketInfo, &TicketInfo),
    champion: (&TicketInfo, &TicketInfo),
) -> bool {
    let key = |pair: (&TicketInfo, &TicketInfo)| {
        let duration = pair.1.arrive - pair.0.leave;
        let price = pair.0.price + pair.1.price;
        (duration, price)
    };
    let (ch_dur, ch_price) = key(challenger);
    let (cu_dur, cu_price) = key(champion);

    let primary = match pref {
        SortPref::Time => (ch_dur, ch_price).cmp(&(cu_dur, cu_price)),
        SortPref::Cost => (ch_price, ch_dur).cmp(&(cu_price, cu_dur)),
    };
    primary
        .then_with(|| challenger.0.train_id.cmp(&champion.0.train_id))
        .then_with(|| challenger.1.train_id.cmp(&champion.1.train_id))
        .is_lt()
}

/// `query_transfer`: the best two-leg journey through any intermediate
/// station, or `0` when none connects.
pub fn query_transfer(
    catalog: &TrainCatalog,
    seats: &SeatEngine,
    stations: &StationDir,
    from: &str,
    to: &str,
    date: &str,
    pref: SortPref,
) -> Result<String> {
    let (Some(from_id), Some(to_id)) = (stations.lookup(from), stations.lookup(to)) else {
        return Ok("0".to_string());
    };
    let Some(depart) = DateTime::from_date(date) else {
        return Ok("0".to_string());
    };

    let mut best: Option<(TicketInfo, TicketInfo)> = None;
    for mid in 0..stations.len() as StationId {
        if mid == from_id || mid == to_id {
            continue;
        }

        let leg1_tickets =
            direct_tickets(catalog, seats, stations, from_id, mid, depart, false)?;
        if leg1_tickets.is_empty() {
            continue;
        }
        let leg2_candidates = catalog.released_on_segment(mid, to_id)?;

        for leg1 in &leg1_tickets {
            for (train, seg) in &leg2_candidates {
                let Some(leg2) = ticket_for(seats, stations, train, seg, leg1.arrive, true)?
                else {
                    continue;
                };
                if leg2.train_id == leg1.train_id {
                    continue;
                }
                let replace = match &best {
                    None => true,
                    Some((b1, b2)) => transfer_beats(pref, (leg1, &leg2), (b1, b2)),
                };
                if replace {
                    best = Some((leg1.clone(), leg2));
                }
            }
        }
    }

    Ok(match best {
        Some((leg1, leg2)) => format!("{}\n{}", leg1.line(), leg2.line()),
        None => "0".to_string(),
    })
}

/// `query_train`: the full timetable of one train on one origin date,
/// released or not.
pub fn query_train(
    catalog: &TrainCatalog,
    seats: &SeatEngine,
    stations: &StationDir,
    train_id: &str,
    date: &str,
) -> Result<String> {
    let Some(train) = catalog.find(train_id)? else {
        return Ok("-1".to_string());
    };
    let Some(origin_date) = DateTime::from_date(date) else {
        return Ok("-1".to_string());
    };
    if !train.sale_covers(origin_date) {
        return Ok("-1".to_string());
    }

    let per_edge = seats.per_edge(&train, origin_date)?;
    let count = train.station_count;

    let mut out = format!("{} {}", train.train_id, train.train_type as char);
    let mut cumulative_price: i64 = 0;
    for idx in 0..count {
        let name = station_name(stations, train.stations[idx as usize])?;
        let arrive = if idx == 0 {
            "xx-xx xx:xx".to_string()
        } else {
            (origin_date + train.arrive_offset(idx)).full_string()
        };
        let leave = if idx + 1 == count {
            "xx-xx xx:xx".to_string()
        } else {
            (origin_date + train.leave_offset(idx)).full_string()
        };
        if idx > 0 {
            cumulative_price += i64::from(train.prices[idx as usize - 1]);
        }
        let seat = if idx + 1 == count {
            "x".to_string()
        } else {
            per_edge[idx as usize].to_string()
        };
        out.push_str(&format!(
            "\n{} {} -> {} {} {}",
            name, arrive, leave, cumulative_price, seat
        ));
    }
    Ok(out)
}
