//! Fixed-epoch calendar arithmetic.
//!
//! All schedules live inside a single fixed year. The epoch is
//! 2025-06-01 00:00 and the scope runs through the end of 2025, so every
//! timestamp is a minute count in `[0, SCOPE_MINUTES)`. Dates print as
//! `MM-DD`, times as `hh:mm`.

use crate::page::FixedCodec;
use std::fmt;
use std::ops::{Add, Sub};

/// Minutes in one hour.
pub const MINUTES_PER_HOUR: i32 = 60;

/// Minutes in one day.
pub const MINUTES_PER_DAY: i32 = 24 * MINUTES_PER_HOUR;

/// Epoch month (June), 1-indexed.
pub const EPOCH_MONTH: u32 = 6;

/// Epoch day of month, 1-indexed.
pub const EPOCH_DAY: u32 = 1;

/// Days per month in 2025 (not a leap year). Index 0 unused.
const DAYS_IN_MONTH: [u32; 13] = [0, 31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Days from the epoch through the end of the year: June..December.
pub const SCOPE_DAYS: i32 = 30 + 31 + 31 + 30 + 31 + 30 + 31;

/// Exclusive upper bound on valid minute values.
pub const SCOPE_MINUTES: i32 = SCOPE_DAYS * MINUTES_PER_DAY;

/// A point in time, stored as minutes since the epoch.
///
/// Values outside `[0, SCOPE_MINUTES)` are representable but invalid;
/// arithmetic is allowed to pass through them (an origin-date computation
/// may briefly go negative before validation).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(i32);

impl DateTime {
    /// Creates a datetime from raw minutes since the epoch.
    pub fn from_minutes(minutes: i32) -> Self {
        Self(minutes)
    }

    /// Parses `"MM-DD"` at midnight. Returns `None` for malformed input
    /// or dates outside the scope.
    pub fn from_date(date: &str) -> Option<Self> {
        Self::from_strings(date, "00:00")
    }

    /// Parses `"MM-DD"` plus `"hh:mm"`. Returns `None` for malformed
    /// input or values outside the scope.
    pub fn from_strings(date: &str, time: &str) -> Option<Self> {
        let day_index = day_index_from_date(date)?;
        let in_day = minutes_in_day_from_time(time)?;
        Some(Self(day_index * MINUTES_PER_DAY + in_day))
    }

    /// Raw minutes since the epoch.
    pub fn minutes(self) -> i32 {
        self.0
    }

    /// Days since the epoch. Only meaningful for valid datetimes.
    pub fn day_index(self) -> i32 {
        self.0.div_euclid(MINUTES_PER_DAY)
    }

    /// Returns true if this datetime falls inside the calendar scope.
    pub fn is_valid(self) -> bool {
        self.0 >= 0 && self.0 < SCOPE_MINUTES
    }

    /// Midnight of the same day.
    pub fn round_down_to_date(self) -> Self {
        Self(self.day_index() * MINUTES_PER_DAY)
    }

    /// Midnight of the next day, unless already at midnight.
    pub fn round_up_to_date(self) -> Self {
        if self.0.rem_euclid(MINUTES_PER_DAY) == 0 {
            self
        } else {
            Self((self.day_index() + 1) * MINUTES_PER_DAY)
        }
    }

    /// Formats the date part as `MM-DD`, or `xx-xx` when invalid.
    pub fn date_string(self) -> String {
        match date_from_day_index(self.day_index()) {
            Some((m, d)) if self.is_valid() => format!("{:02}-{:02}", m, d),
            _ => "xx-xx".to_string(),
        }
    }

    /// Formats the time part as `hh:mm`, or `xx:xx` when invalid.
    pub fn time_string(self) -> String {
        if !self.is_valid() {
            return "xx:xx".to_string();
        }
        let in_day = self.0.rem_euclid(MINUTES_PER_DAY);
        format!(
            "{:02}:{:02}",
            in_day / MINUTES_PER_HOUR,
            in_day % MINUTES_PER_HOUR
        )
    }

    /// Formats as `MM-DD hh:mm`.
    pub fn full_string(self) -> String {
        format!("{} {}", self.date_string(), self.time_string())
    }
}

impl Add<i32> for DateTime {
    type Output = DateTime;

    fn add(self, minutes: i32) -> DateTime {
        DateTime(self.0 + minutes)
    }
}

impl Sub<i32> for DateTime {
    type Output = DateTime;

    fn sub(self, minutes: i32) -> DateTime {
        DateTime(self.0 - minutes)
    }
}

impl Sub for DateTime {
    type Output = i32;

    fn sub(self, other: DateTime) -> i32 {
        self.0 - other.0
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_string())
    }
}

impl FixedCodec for DateTime {
    const ENCODED_LEN: usize = 4;

    fn encode_into(&self, buf: &mut [u8]) {
        self.0.encode_into(buf);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self(i32::decode_from(buf))
    }
}

fn parse_two_digits(s: &str) -> Option<u32> {
    if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parses `"MM-DD"` into month and day, validated against the 2025
/// month lengths.
pub fn parse_mmdd(date: &str) -> Option<(u32, u32)> {
    let (m, d) = date.split_once('-')?;
    let month = parse_two_digits(m)?;
    let day = parse_two_digits(d)?;
    if !(1..=12).contains(&month) || day < 1 || day > DAYS_IN_MONTH[month as usize] {
        return None;
    }
    Some((month, day))
}

/// Parses `"hh:mm"` into hour and minute.
pub fn parse_hhmm(time: &str) -> Option<(u32, u32)> {
    let (h, m) = time.split_once(':')?;
    let hour = parse_two_digits(h)?;
    let minute = parse_two_digits(m)?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Converts `"MM-DD"` to days since the epoch. Dates before the epoch
/// are rejected.
pub fn day_index_from_date(date: &str) -> Option<i32> {
    let (month, day) = parse_mmdd(date)?;
    if month < EPOCH_MONTH || (month == EPOCH_MONTH && day < EPOCH_DAY) {
        return None;
    }
    let mut index = 0i32;
    let mut m = EPOCH_MONTH;
    while m < month {
        index += DAYS_IN_MONTH[m as usize] as i32;
        m += 1;
    }
    index += day as i32 - EPOCH_DAY as i32;
    if index >= SCOPE_DAYS {
        return None;
    }
    Some(index)
}

/// Converts days since the epoch back to `(month, day)`.
pub fn date_from_day_index(day_index: i32) -> Option<(u32, u32)> {
    if day_index < 0 || day_index >= SCOPE_DAYS {
        return None;
    }
    let mut month = EPOCH_MONTH;
    let mut remaining = day_index as u32 + (EPOCH_DAY - 1);
    while remaining >= DAYS_IN_MONTH[month as usize] {
        remaining -= DAYS_IN_MONTH[month as usize];
        month += 1;
    }
    Some((month, remaining + 1))
}

/// Converts `"hh:mm"` to minutes since midnight.
pub fn minutes_in_day_from_time(time: &str) -> Option<i32> {
    let (hour, minute) = parse_hhmm(time)?;
    Some((hour * 60 + minute) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_constants() {
        assert_eq!(SCOPE_DAYS, 214);
        assert_eq!(SCOPE_MINUTES, 214 * 1440);
    }

    #[test]
    fn test_parse_mmdd_valid() {
        assert_eq!(parse_mmdd("06-01"), Some((6, 1)));
        assert_eq!(parse_mmdd("12-31"), Some((12, 31)));
        assert_eq!(parse_mmdd("02-28"), Some((2, 28)));
    }

    #[test]
    fn test_parse_mmdd_rejects_malformed() {
        assert_eq!(parse_mmdd("6-1"), None);
        assert_eq!(parse_mmdd("06/01"), None);
        assert_eq!(parse_mmdd("ab-cd"), None);
        assert_eq!(parse_mmdd("13-01"), None);
        assert_eq!(parse_mmdd("02-29"), None);
        assert_eq!(parse_mmdd("04-31"), None);
        assert_eq!(parse_mmdd(""), None);
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("00:00"), Some((0, 0)));
        assert_eq!(parse_hhmm("23:59"), Some((23, 59)));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("10:60"), None);
        assert_eq!(parse_hhmm("1000"), None);
    }

    #[test]
    fn test_day_index_epoch() {
        assert_eq!(day_index_from_date("06-01"), Some(0));
        assert_eq!(day_index_from_date("06-30"), Some(29));
        assert_eq!(day_index_from_date("07-01"), Some(30));
        assert_eq!(day_index_from_date("12-31"), Some(213));
    }

    #[test]
    fn test_day_index_before_epoch() {
        assert_eq!(day_index_from_date("05-31"), None);
        assert_eq!(day_index_from_date("01-01"), None);
    }

    #[test]
    fn test_date_from_day_index_roundtrip() {
        for index in 0..SCOPE_DAYS {
            let (m, d) = date_from_day_index(index).unwrap();
            let date = format!("{:02}-{:02}", m, d);
            assert_eq!(day_index_from_date(&date), Some(index));
        }
        assert_eq!(date_from_day_index(-1), None);
        assert_eq!(date_from_day_index(SCOPE_DAYS), None);
    }

    #[test]
    fn test_datetime_parse_and_format() {
        let dt = DateTime::from_strings("06-03", "10:30").unwrap();
        assert_eq!(dt.minutes(), 2 * 1440 + 10 * 60 + 30);
        assert_eq!(dt.date_string(), "06-03");
        assert_eq!(dt.time_string(), "10:30");
        assert_eq!(dt.full_string(), "06-03 10:30");
    }

    #[test]
    fn test_datetime_arithmetic() {
        let dt = DateTime::from_strings("06-01", "23:30").unwrap();
        let later = dt + 45;
        assert_eq!(later.full_string(), "06-02 00:15");
        assert_eq!(later - dt, 45);
        assert_eq!((later - 45).full_string(), "06-01 23:30");
    }

    #[test]
    fn test_datetime_invalid_values() {
        assert!(!DateTime::from_minutes(-1).is_valid());
        assert!(!DateTime::from_minutes(SCOPE_MINUTES).is_valid());
        assert!(DateTime::from_minutes(0).is_valid());
        assert_eq!(DateTime::from_minutes(-5).full_string(), "xx-xx xx:xx");
    }

    #[test]
    fn test_round_to_date() {
        let dt = DateTime::from_strings("06-05", "00:01").unwrap();
        assert_eq!(dt.round_down_to_date().full_string(), "06-05 00:00");
        assert_eq!(dt.round_up_to_date().full_string(), "06-06 00:00");

        let midnight = DateTime::from_date("06-05").unwrap();
        assert_eq!(midnight.round_up_to_date(), midnight);
        assert_eq!(midnight.round_down_to_date(), midnight);
    }

    #[test]
    fn test_round_up_negative_minutes() {
        // An origin-date candidate may dip below the epoch before
        // validation; rounding must still behave.
        let dt = DateTime::from_minutes(-30);
        assert_eq!(dt.round_up_to_date().minutes(), 0);
    }

    #[test]
    fn test_datetime_codec_roundtrip() {
        let dt = DateTime::from_strings("08-17", "06:45").unwrap();
        let mut buf = [0u8; 4];
        dt.encode_into(&mut buf);
        assert_eq!(DateTime::decode_from(&buf), dt);
    }

    #[test]
    fn test_datetime_ordering() {
        let a = DateTime::from_strings("06-01", "10:00").unwrap();
        let b = DateTime::from_strings("06-01", "10:01").unwrap();
        let c = DateTime::from_strings("06-02", "00:00").unwrap();
        assert!(a < b && b < c);
        assert!(DateTime::default() <= a);
    }
}
