use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use serde::Serialize;

/// Cutoffs for the three recency windows, all derived from one `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Windows {
    pub seven_day_cutoff: DateTime<Utc>,
    pub thirty_day_cutoff: DateTime<Utc>,
    pub month_start_cutoff: DateTime<Utc>,
}

/// Month start is taken in `now`'s own timezone.
pub fn windows<Tz: TimeZone>(now: &DateTime<Tz>) -> Windows {
    let now_utc = now.with_timezone(&Utc);

    Windows {
        seven_day_cutoff: now_utc - Duration::days(7),
        thirty_day_cutoff: now_utc - Duration::days(30),
        month_start_cutoff: month_start(now),
    }
}

fn month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let first = now
        .date_naive()
        .with_day(1)
        .unwrap_or_else(|| now.date_naive());
    let midnight = first.and_time(NaiveTime::MIN);

    let tz = now.timezone();
    if let Some(local) = tz.from_local_datetime(&midnight).earliest() {
        return local.with_timezone(&Utc);
    }

    // Midnight skipped by a DST transition: take the first instant after the
    // gap, i.e. midnight under the offset in force just before it.
    let hour = Duration::hours(1);
    match tz.from_local_datetime(&(midnight - hour)).latest() {
        Some(before) => (before + hour).with_timezone(&Utc),
        None => Utc.from_utc_datetime(&midnight),
    }
}
