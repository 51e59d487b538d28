//! Half-open time windows and display-time-zone day boundaries.
//!
//! All computed windows resolve day boundaries in the configured display time
//! zone and compare absolute UTC instants. A window is always `[start, end)`.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::types::TimeOfDay;

/// A half-open UTC window: start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Build a window, rejecting `end <= start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if end > start {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// UTC instant of local midnight for `date` in `tz`. Around DST transitions
/// where midnight does not exist, the earliest valid instant is used.
fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => {
            // Spring-forward gap: fall back to one hour past midnight
            let shifted = date.and_hms_opt(1, 0, 0).expect("1am is always valid");
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

/// The local calendar day containing `instant`: `[startOfDay, startOfNextDay)`.
pub fn day_window(instant: DateTime<Utc>, tz: Tz) -> Window {
    let local_date = instant.with_timezone(&tz).date_naive();
    let next = local_date.succ_opt().expect("date overflow");
    Window {
        start: local_midnight(local_date, tz),
        end: local_midnight(next, tz),
    }
}

/// `days` local calendar days starting at the day containing `instant`.
pub fn days_window(instant: DateTime<Utc>, days: u32, tz: Tz) -> Window {
    let local_date = instant.with_timezone(&tz).date_naive();
    let end_date = local_date + Duration::days(days.max(1) as i64);
    Window {
        start: local_midnight(local_date, tz),
        end: local_midnight(end_date, tz),
    }
}

/// Split a window into contiguous chunks of at most `chunk_days` days.
/// Chunks are exclusive on the right and cover the input exactly.
pub fn chunk_window(window: Window, chunk_days: u32) -> Vec<Window> {
    let step = Duration::days(chunk_days.max(1) as i64);
    let mut chunks = Vec::new();
    let mut cursor = window.start;
    while cursor < window.end {
        let end = (cursor + step).min(window.end);
        chunks.push(Window { start: cursor, end });
        cursor = end;
    }
    chunks
}

/// Bucket an instant by local clock: 06-12 morning, 12-18 afternoon,
/// 18-22 evening, else night.
pub fn time_of_day(instant: DateTime<Utc>, tz: Tz) -> TimeOfDay {
    TimeOfDay::from_hour(chrono::Timelike::hour(&instant.with_timezone(&tz)))
}
