//! Pure scheduling policy
//!
//! Due-ness is a function of the configured schedule, the last run timestamp
//! and the current time only. The running-state check lives in
//! [`Crawler::check_due`](crate::Crawler::check_due), which queries the job
//! store before consulting this policy.

use crate::config::Schedule;
use chrono::{DateTime, Utc};

/// Decides whether a crawler with the given schedule is due at `now`
///
/// - `disabled` is never due
/// - a crawler that never ran is always due
/// - otherwise due iff `now` is past the last run plus the interval
///
/// Deterministic: identical inputs always produce the identical answer.
pub fn is_due(schedule: Schedule, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let interval = match schedule.interval() {
        Some(interval) => interval,
        None => return false,
    };

    match last_run {
        None => true,
        Some(last_run) => now > last_run + interval,
    }
}
