//! Timezone-aware day boundaries and fire-time computation.
//!
//! Window endpoints are always derived by taking local midnight and adding
//! one local *calendar* day, then converting back to UTC.  A fixed 86400
//! offset would drift on DST-transition days (23h/25h local days).

use chrono::{DateTime, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Half-open UTC epoch interval covering one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive.
    pub start_epoch: i64,
    /// Exclusive.
    pub end_epoch: i64,
}

impl TimeWindow {
    pub fn contains(&self, epoch: i64) -> bool {
        self.start_epoch <= epoch && epoch < self.end_epoch
    }

    pub fn len_secs(&self) -> i64 {
        self.end_epoch - self.start_epoch
    }
}

/// Resolve a naive local time against `tz`.
///
/// Ambiguous times (fall-back overlap) map to the earliest instant.
/// Nonexistent times (spring-forward gap) scan forward in 30-minute steps
/// to the first local time that exists; DST gaps are whole multiples of
/// 30 minutes in every IANA zone.
fn resolve_local(naive: NaiveDateTime, tz: Tz) -> DateTime<Tz> {
    let mut candidate = naive;
    loop {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(instant) => return instant,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => candidate += Duration::minutes(30),
        }
    }
}

fn local_day_start(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    // Zones like America/Santiago skip midnight on spring-forward days; the
    // day then starts at the first instant after the gap.
    resolve_local(date.and_time(NaiveTime::MIN), tz)
}

/// Bounds of the local calendar day containing `reference`, as UTC epochs.
///
/// `end - start` equals the true elapsed seconds of that local day: 86400
/// normally, 82800 or 90000 when the day crosses a DST shift.
pub fn today_bounds(reference: DateTime<Utc>, tz: Tz) -> TimeWindow {
    let local_date = reference.with_timezone(&tz).date_naive();
    let start = local_day_start(local_date, tz);
    let end = local_day_start(local_date + Days::new(1), tz);
    TimeWindow {
        start_epoch: start.timestamp(),
        end_epoch: end.timestamp(),
    }
}

/// Next instant the daily trigger fires, given a local wall-clock target.
///
/// Returns today's local target when `reference` is strictly before it;
/// otherwise advances by exactly one local calendar day (never a fixed
/// offset), which guarantees a strictly-future result.
pub fn next_fire_time(
    hour: u32,
    minute: u32,
    second: u32,
    tz: Tz,
    reference: DateTime<Utc>,
) -> DateTime<Utc> {
    let target = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), second.min(59))
        .unwrap_or(NaiveTime::MIN);
    let local_date = reference.with_timezone(&tz).date_naive();
    let today = resolve_local(local_date.and_time(target), tz).with_timezone(&Utc);
    if reference < today {
        return today;
    }
    resolve_local((local_date + Days::new(1)).and_time(target), tz).with_timezone(&Utc)
}

/// Human-readable local timestamp for diagnostics (`YYYY-MM-DD HH:MM`).
pub fn local_timestamp_label(epoch: i64, tz: Tz) -> String {
    DateTime::from_timestamp(epoch, 0)
        .unwrap_or_default()
        .with_timezone(&tz)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}
