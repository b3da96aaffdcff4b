//! MinuteBar: one price sample on the regular-session minute grid.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::series::MINUTES_PER_DAY;

/// Session open as minutes after midnight (09:30).
pub const SESSION_OPEN_MINUTE: u32 = 9 * 60 + 30;

/// A single minute sample for one instrument.
///
/// `minute` is the offset from the session open, `0..MINUTES_PER_DAY`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinuteBar {
    pub date: NaiveDate,
    pub minute: u32,
    pub price: f64,
}

impl MinuteBar {
    /// Returns true if the price is missing (NaN or infinite).
    pub fn is_void(&self) -> bool {
        !self.price.is_finite()
    }

    /// Returns true if the sample sits inside the session and carries a positive price.
    pub fn is_sane(&self) -> bool {
        !self.is_void() && self.price > 0.0 && (self.minute as usize) < MINUTES_PER_DAY
    }

    /// Wall-clock timestamp of this sample.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        session_timestamp(self.date, self.minute)
    }
}

/// Wall-clock timestamp of `minute` minutes after the session open on `date`.
pub fn session_timestamp(date: NaiveDate, minute: u32) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight + Duration::minutes(i64::from(SESSION_OPEN_MINUTE + minute)))
}

/// Inverse of [`session_timestamp`]: the session minute of a wall-clock timestamp.
///
/// Returns `None` for timestamps outside the regular session.
pub fn session_minute(timestamp: NaiveDateTime) -> Option<u32> {
    use chrono::Timelike;
    let minute_of_day = timestamp.hour() * 60 + timestamp.minute();
    let offset = minute_of_day.checked_sub(SESSION_OPEN_MINUTE)?;
    ((offset as usize) < MINUTES_PER_DAY).then_some(offset)
}
