//! Time source used for relative dates, curfew checks and timestamps.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Wall-clock time at the given UTC offset.
    fn local_now(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        self.now().with_timezone(&offset)
    }

    fn today(&self, offset: FixedOffset) -> NaiveDate {
        self.local_now(offset).date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant. Used by tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Build a `FixedOffset` from whole hours, clamping to the valid range.
pub fn offset_from_hours(hours: i32) -> FixedOffset {
    let seconds = hours.clamp(-23, 23) * 3600;
    FixedOffset::east_opt(seconds).unwrap_or(Utc.fix())
}
